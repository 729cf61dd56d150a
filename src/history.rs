use std::sync::Arc;

use serde_json::Value;

use crate::{
    error::HistoryError,
    models::{NormalizedTransaction, Page},
    normalize::{normalize_batch, BatchContext, Thresholds},
    price::SOLANA_ASSET_ID,
    sources::{ActivitySource, PriceFeed, TokenMetadataSource},
};

pub const DEFAULT_PAGE_LIMIT: usize = 20;

#[derive(Debug, Clone)]
pub struct HistoryRequest {
    pub wallet: String,
    pub limit: usize,
    pub cursor: Option<String>,
    pub thresholds: Thresholds,
}

impl HistoryRequest {
    pub fn new(wallet: impl Into<String>) -> Self {
        Self {
            wallet: wallet.into(),
            limit: DEFAULT_PAGE_LIMIT,
            cursor: None,
            thresholds: Thresholds::default(),
        }
    }
}

/// Builds pages of normalized history by over-fetching from the indexer
/// until enough records survive dust filtering.
#[derive(Clone)]
pub struct HistoryService {
    activity: Arc<dyn ActivitySource>,
    metadata: Arc<dyn TokenMetadataSource>,
    prices: Arc<dyn PriceFeed>,
    batch_size: usize,
}

impl HistoryService {
    pub fn new(
        activity: Arc<dyn ActivitySource>,
        metadata: Arc<dyn TokenMetadataSource>,
        prices: Arc<dyn PriceFeed>,
        batch_size: usize,
    ) -> Self {
        Self {
            activity,
            metadata,
            prices,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn fetch_page(&self, request: &HistoryRequest) -> Result<Page, HistoryError> {
        let limit = request.limit;
        if limit == 0 {
            return Ok(Page::default());
        }

        let batch_size = self.batch_size.max(limit);
        let ctx = BatchContext {
            wallet: &request.wallet,
            thresholds: request.thresholds,
            native_price_usd: self.native_price().await,
            metadata: self.metadata.as_ref(),
        };

        let mut collected: Vec<NormalizedTransaction> = Vec::new();
        let mut before = request.cursor.clone();
        let mut last_raw_signature: Option<String> = None;
        let mut exhausted = false;
        let mut batches = 0usize;

        loop {
            let batch = self
                .activity
                .fetch_activity(&request.wallet, before.as_deref(), batch_size)
                .await?;
            batches += 1;

            if batch.is_empty() {
                exhausted = true;
                break;
            }

            let fetched = batch.len();
            if let Some(signature) = last_signature(&batch) {
                last_raw_signature = Some(signature);
            }
            collected.extend(normalize_batch(&batch, &ctx).await);

            if fetched < batch_size {
                exhausted = true;
                break;
            }
            if collected.len() >= limit {
                break;
            }

            match &last_raw_signature {
                Some(signature) if before.as_deref() != Some(signature.as_str()) => {
                    before = Some(signature.clone());
                }
                // No way to move the window forward.
                _ => {
                    exhausted = true;
                    break;
                }
            }
        }

        let truncated = collected.len() > limit;
        collected.truncate(limit);

        let cursor = if truncated {
            // Resume right after the last record handed out so the records
            // cut off here appear on the next page.
            collected.last().map(|tx| tx.signature.clone())
        } else if collected.len() == limit && !exhausted {
            last_raw_signature
        } else {
            None
        };

        tracing::info!(
            "history page for {}: {} records from {} batches, more={}",
            request.wallet,
            collected.len(),
            batches,
            cursor.is_some()
        );

        Ok(Page {
            transactions: collected,
            cursor,
        })
    }

    async fn native_price(&self) -> Option<f64> {
        match self.prices.usd_price(SOLANA_ASSET_ID).await {
            Ok(price) => Some(price),
            Err(err) => {
                tracing::warn!("native price unavailable, skipping USD values: {:#}", err);
                None
            }
        }
    }
}

fn last_signature(batch: &[Value]) -> Option<String> {
    batch
        .iter()
        .rev()
        .find_map(|record| record.get("signature")?.as_str())
        .filter(|sig| !sig.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TokenMetadata;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const WALLET: &str = "W";

    /// Newest-first history of `total` native transfers where every
    /// `dust_every`-th record (starting at index 0) is below threshold.
    struct SyntheticSource {
        total: usize,
        dust_every: usize,
        calls: AtomicUsize,
    }

    impl SyntheticSource {
        fn new(total: usize, dust_every: usize) -> Self {
            Self {
                total,
                dust_every,
                calls: AtomicUsize::new(0),
            }
        }

        fn record(&self, index: usize) -> Value {
            let lamports: u64 = if index % self.dust_every == 0 {
                1
            } else {
                1_000_000_000
            };
            json!({
                "signature": format!("sig-{}", index),
                "timestamp": 1_700_000_000 - index as i64,
                "nativeTransfers": [{
                    "fromUserAccount": WALLET,
                    "toUserAccount": "X",
                    "amount": lamports,
                }],
            })
        }
    }

    #[async_trait]
    impl ActivitySource for SyntheticSource {
        async fn fetch_activity(
            &self,
            _wallet: &str,
            before: Option<&str>,
            limit: usize,
        ) -> Result<Vec<Value>, HistoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let start = match before {
                Some(sig) => sig.trim_start_matches("sig-").parse::<usize>().unwrap() + 1,
                None => 0,
            };
            let end = (start + limit).min(self.total);
            Ok((start.min(end)..end).map(|i| self.record(i)).collect())
        }
    }

    struct RateLimitedSource;

    #[async_trait]
    impl ActivitySource for RateLimitedSource {
        async fn fetch_activity(
            &self,
            _wallet: &str,
            _before: Option<&str>,
            _limit: usize,
        ) -> Result<Vec<Value>, HistoryError> {
            Err(HistoryError::RateLimitExceeded { attempts: 5 })
        }
    }

    struct NoMetadata;

    #[async_trait]
    impl TokenMetadataSource for NoMetadata {
        async fn lookup(&self, _ids: &[String]) -> anyhow::Result<Vec<TokenMetadata>> {
            Ok(Vec::new())
        }
    }

    struct CountingPrice {
        calls: AtomicUsize,
        price: Option<f64>,
    }

    #[async_trait]
    impl PriceFeed for CountingPrice {
        async fn usd_price(&self, _asset_id: &str) -> anyhow::Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.price.ok_or_else(|| anyhow::anyhow!("feed offline"))
        }
    }

    fn service(
        source: Arc<dyn ActivitySource>,
        price: Arc<CountingPrice>,
        batch_size: usize,
    ) -> HistoryService {
        HistoryService::new(source, Arc::new(NoMetadata), price, batch_size)
    }

    fn price(value: Option<f64>) -> Arc<CountingPrice> {
        Arc::new(CountingPrice {
            calls: AtomicUsize::new(0),
            price: value,
        })
    }

    fn request(limit: usize, cursor: Option<String>) -> HistoryRequest {
        HistoryRequest {
            limit,
            cursor,
            ..HistoryRequest::new(WALLET)
        }
    }

    #[tokio::test]
    async fn fills_page_despite_dust_and_returns_cursor() {
        // 50-record batches, 10 of them dust.
        let source = Arc::new(SyntheticSource::new(500, 5));
        let svc = service(source.clone(), price(Some(100.0)), 50);

        let page = svc.fetch_page(&request(20, None)).await.unwrap();

        assert_eq!(page.transactions.len(), 20);
        assert!(page.cursor.is_some());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(page
            .transactions
            .iter()
            .all(|tx| tx.value_usd == Some(100.0)));
    }

    #[tokio::test]
    async fn keeps_fetching_when_a_batch_is_mostly_dust() {
        // Half of every 20-record batch is dust, so a page needs two batches.
        let source = Arc::new(SyntheticSource::new(500, 2));
        let prices = price(Some(1.0));
        let svc = service(source.clone(), prices.clone(), 20);

        let page = svc.fetch_page(&request(20, None)).await.unwrap();

        assert_eq!(page.transactions.len(), 20);
        assert_eq!(page.cursor.as_deref(), Some("sig-39"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(prices.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn short_final_page_has_no_cursor() {
        let source = Arc::new(SyntheticSource::new(12, 5));
        let svc = service(source, price(None), 50);

        let page = svc.fetch_page(&request(20, None)).await.unwrap();

        assert_eq!(page.transactions.len(), 9);
        assert!(page.cursor.is_none());
        assert!(page.transactions.iter().all(|tx| tx.value_usd.is_none()));
    }

    #[tokio::test]
    async fn empty_upstream_yields_empty_page() {
        let source = Arc::new(SyntheticSource::new(0, 5));
        let svc = service(source, price(None), 50);

        let page = svc.fetch_page(&request(20, None)).await.unwrap();

        assert!(page.transactions.is_empty());
        assert!(page.cursor.is_none());
    }

    #[tokio::test]
    async fn walking_cursors_visits_every_record_once() {
        let source = Arc::new(SyntheticSource::new(200, 5));
        let svc = service(source, price(None), 50);

        let mut seen = Vec::new();
        let mut cursor = None;
        let mut pages = 0;
        loop {
            let page = svc.fetch_page(&request(20, cursor)).await.unwrap();
            pages += 1;
            seen.extend(page.transactions.into_iter().map(|tx| tx.signature));
            cursor = page.cursor;
            if cursor.is_none() || pages > 20 {
                break;
            }
        }

        let expected: Vec<String> = (0..200)
            .filter(|i| i % 5 != 0)
            .map(|i| format!("sig-{}", i))
            .collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn upstream_errors_fail_the_whole_page() {
        let svc = service(Arc::new(RateLimitedSource), price(Some(1.0)), 50);

        let err = svc.fetch_page(&request(20, None)).await.unwrap_err();

        assert!(matches!(err, HistoryError::RateLimitExceeded { attempts: 5 }));
    }

    #[tokio::test]
    async fn zero_limit_skips_upstream() {
        let source = Arc::new(SyntheticSource::new(100, 5));
        let svc = service(source.clone(), price(None), 50);

        let page = svc.fetch_page(&request(0, None)).await.unwrap();

        assert!(page.transactions.is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn last_signature_skips_records_without_one() {
        let batch = vec![json!({ "signature": "a" }), json!({ "oops": true })];
        assert_eq!(last_signature(&batch).as_deref(), Some("a"));
    }
}

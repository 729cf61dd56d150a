use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use crate::{
    error::HistoryError,
    models::{scale_amount, TokenBalance, TokenMetadata, WalletBalances},
    normalize::NATIVE_DECIMALS,
    retry::{retry_with_backoff, RetryError, RetryPolicy},
    sources::{ActivitySource, BalanceSource, TokenMetadataSource},
    upstream_stats::UPSTREAM_STATS,
};

/// Client for the indexer's REST API and its DAS JSON-RPC endpoint.
#[derive(Clone)]
pub struct HeliusClient {
    http: Client,
    api_base: Url,
    rpc_url: Url,
    api_key: String,
    retry: RetryPolicy,
}

#[derive(Debug)]
enum RequestError {
    RateLimited,
    Failed(HistoryError),
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestError::RateLimited => write!(f, "rate limited by indexer"),
            RequestError::Failed(err) => write!(f, "{}", err),
        }
    }
}

impl HeliusClient {
    pub fn new(api_url: &str, rpc_url: &str, api_key: &str, retry: RetryPolicy) -> Result<Self> {
        let http = Client::builder()
            .no_proxy()
            .build()
            .context("failed to build reqwest client")?;
        let api_base = Url::parse(api_url).context("invalid HELIUS_API_URL")?;
        let rpc_url = Url::parse(rpc_url).context("invalid HELIUS_RPC_URL")?;
        if api_base.cannot_be_a_base() {
            anyhow::bail!("HELIUS_API_URL must be a hierarchical URL");
        }
        Ok(Self {
            http,
            api_base,
            rpc_url,
            api_key: api_key.to_string(),
            retry,
        })
    }

    fn address_url(&self, wallet: &str, resource: &str) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v0", "addresses", wallet, resource]);
        }
        url.query_pairs_mut().append_pair("api-key", &self.api_key);
        url
    }

    async fn get_json(&self, url: Url) -> Result<Value, HistoryError> {
        retry_with_backoff(
            self.retry,
            |err: &RequestError| matches!(err, RequestError::RateLimited),
            || self.send_once(url.clone()),
        )
        .await
        .map_err(|err| match err {
            RetryError::Exhausted { attempts, .. } => HistoryError::RateLimitExceeded { attempts },
            RetryError::Permanent(RequestError::Failed(err)) => err,
            RetryError::Permanent(RequestError::RateLimited) => HistoryError::RateLimitExceeded {
                attempts: self.retry.max_attempts,
            },
        })
    }

    async fn send_once(&self, url: Url) -> Result<Value, RequestError> {
        UPSTREAM_STATS.inc_requests();

        let response = self.http.get(url).send().await.map_err(|err| {
            UPSTREAM_STATS.inc_failures();
            RequestError::Failed(err.into())
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            UPSTREAM_STATS.inc_rate_limited();
            return Err(RequestError::RateLimited);
        }
        if !status.is_success() {
            UPSTREAM_STATS.inc_failures();
            let body = response.text().await.unwrap_or_default();
            return Err(RequestError::Failed(HistoryError::UpstreamFetch(format!(
                "HTTP {}: {}",
                status, body
            ))));
        }

        let body = response.bytes().await.map_err(|err| {
            UPSTREAM_STATS.inc_failures();
            RequestError::Failed(err.into())
        })?;
        serde_json::from_slice(&body).map_err(|_| RequestError::Failed(HistoryError::InvalidResponseFormat))
    }
}

#[async_trait]
impl ActivitySource for HeliusClient {
    async fn fetch_activity(
        &self,
        wallet: &str,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Value>, HistoryError> {
        let mut url = self.address_url(wallet, "transactions");
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.to_string());
            if let Some(before) = before {
                query.append_pair("before", before);
            }
        }

        tracing::debug!(
            "fetching up to {} records for {} before {:?}",
            limit,
            wallet,
            before
        );

        match self.get_json(url).await? {
            Value::Array(records) => Ok(records),
            other => {
                tracing::warn!(
                    "unexpected indexer response shape for {}: {}",
                    wallet,
                    truncate_for_log(&other.to_string())
                );
                Err(HistoryError::InvalidResponseFormat)
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalancesResponse {
    #[serde(default)]
    native_balance: f64,
    #[serde(default)]
    tokens: Vec<TokenBalance>,
}

#[async_trait]
impl BalanceSource for HeliusClient {
    async fn fetch_balances(&self, wallet: &str) -> Result<WalletBalances, HistoryError> {
        let url = self.address_url(wallet, "balances");
        let body = self.get_json(url).await?;
        let parsed: BalancesResponse =
            serde_json::from_value(body).map_err(|_| HistoryError::InvalidResponseFormat)?;

        Ok(WalletBalances {
            sol_balance: scale_amount(parsed.native_balance, NATIVE_DECIMALS),
            tokens: parsed
                .tokens
                .into_iter()
                .filter(|token| token.amount > 0.0)
                .collect(),
        })
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Vec<Option<Asset>>>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize)]
struct Asset {
    id: String,
    #[serde(default)]
    content: Option<AssetContent>,
    #[serde(default)]
    token_info: Option<AssetTokenInfo>,
}

#[derive(Deserialize)]
struct AssetContent {
    #[serde(default)]
    metadata: Option<AssetMetadata>,
}

#[derive(Deserialize)]
struct AssetMetadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
}

#[derive(Deserialize)]
struct AssetTokenInfo {
    #[serde(default)]
    symbol: Option<String>,
}

impl From<Asset> for TokenMetadata {
    fn from(asset: Asset) -> Self {
        let metadata = asset.content.and_then(|c| c.metadata);
        let (name, symbol) = match metadata {
            Some(m) => (m.name, m.symbol),
            None => (None, None),
        };
        let symbol = non_empty(symbol).or_else(|| non_empty(asset.token_info.and_then(|t| t.symbol)));
        TokenMetadata {
            id: asset.id,
            name: non_empty(name),
            symbol,
        }
    }
}

#[async_trait]
impl TokenMetadataSource for HeliusClient {
    async fn lookup(&self, ids: &[String]) -> Result<Vec<TokenMetadata>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut url = self.rpc_url.clone();
        url.query_pairs_mut().append_pair("api-key", &self.api_key);

        let payload = json!({
            "jsonrpc": "2.0",
            "id": "wallet-tracker",
            "method": "getAssetBatch",
            "params": { "ids": ids },
        });

        let response = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await
            .context("getAssetBatch request failed")?
            .error_for_status()
            .context("getAssetBatch returned an error status")?;

        let body: RpcResponse = response
            .json()
            .await
            .context("failed to decode getAssetBatch response")?;

        if let Some(err) = body.error {
            anyhow::bail!("getAssetBatch error: {}", err);
        }

        Ok(body
            .result
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .map(TokenMetadata::from)
            .collect())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn truncate_for_log(raw: &str) -> String {
    raw.chars().take(300).collect()
}

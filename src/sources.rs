//! Upstream capabilities the pipeline depends on. The HTTP clients in
//! `helius` and `price` implement them; tests substitute fakes.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{HistoryError, TokenPriceError};
use crate::models::{TokenMetadata, TokenPrice, WalletBalances};

#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Fetch up to `limit` raw activity records older than `before`,
    /// newest first. Records are left undecoded so a single malformed one
    /// cannot fail the whole batch.
    async fn fetch_activity(
        &self,
        wallet: &str,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Value>, HistoryError>;
}

#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn fetch_balances(&self, wallet: &str) -> Result<WalletBalances, HistoryError>;
}

#[async_trait]
pub trait TokenMetadataSource: Send + Sync {
    async fn lookup(&self, ids: &[String]) -> anyhow::Result<Vec<TokenMetadata>>;
}

#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Current USD price for an asset id such as `solana` or `bitcoin`.
    async fn usd_price(&self, asset_id: &str) -> anyhow::Result<f64>;
}

#[async_trait]
pub trait TokenPriceSource: Send + Sync {
    /// USD price of a single token by mint address; `Ok(None)` when the
    /// provider has no data for it.
    async fn token_price(&self, address: &str) -> Result<Option<TokenPrice>, TokenPriceError>;
}

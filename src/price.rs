use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use url::Url;

use crate::{
    error::TokenPriceError,
    models::TokenPrice,
    sources::{PriceFeed, TokenPriceSource},
};

pub const SOLANA_ASSET_ID: &str = "solana";
pub const BITCOIN_ASSET_ID: &str = "bitcoin";

/// Spot prices from a CoinGecko-compatible `simple/price` endpoint.
#[derive(Clone)]
pub struct CoinGeckoClient {
    http: Client,
    base: Url,
}

impl CoinGeckoClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .no_proxy()
            .build()
            .context("failed to build reqwest client")?;
        let base = Url::parse(base_url).context("invalid PRICE_API_URL")?;
        if base.cannot_be_a_base() {
            anyhow::bail!("PRICE_API_URL must be a hierarchical URL");
        }
        Ok(Self { http, base })
    }

    fn simple_price_url(&self, asset_id: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["simple", "price"]);
        }
        url.query_pairs_mut()
            .append_pair("ids", asset_id)
            .append_pair("vs_currencies", "usd");
        url
    }
}

#[async_trait]
impl PriceFeed for CoinGeckoClient {
    async fn usd_price(&self, asset_id: &str) -> Result<f64> {
        let body: Value = self
            .http
            .get(self.simple_price_url(asset_id))
            .send()
            .await
            .with_context(|| format!("price request for {} failed", asset_id))?
            .error_for_status()
            .with_context(|| format!("price feed rejected request for {}", asset_id))?
            .json()
            .await
            .context("failed to decode price response")?;

        extract_usd(&body, asset_id)
            .with_context(|| format!("no USD price for {} in response", asset_id))
    }
}

/// Per-token USD prices from Birdeye's `defi/price` endpoint. Requests
/// fail with `MissingApiKey` when no key is configured.
#[derive(Clone)]
pub struct BirdeyeClient {
    http: Client,
    base: Url,
    api_key: Option<String>,
}

impl BirdeyeClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .no_proxy()
            .build()
            .context("failed to build reqwest client")?;
        let base = Url::parse(base_url).context("invalid BIRDEYE_API_URL")?;
        if base.cannot_be_a_base() {
            anyhow::bail!("BIRDEYE_API_URL must be a hierarchical URL");
        }
        Ok(Self {
            http,
            base,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    fn price_url(&self, address: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["defi", "price"]);
        }
        url.query_pairs_mut().append_pair("address", address);
        url
    }
}

#[async_trait]
impl TokenPriceSource for BirdeyeClient {
    async fn token_price(&self, address: &str) -> Result<Option<TokenPrice>, TokenPriceError> {
        let api_key = self.api_key.as_deref().ok_or(TokenPriceError::MissingApiKey)?;

        let body: Value = self
            .http
            .get(self.price_url(address))
            .header("X-API-KEY", api_key)
            .header("x-chain", "solana")
            .send()
            .await
            .with_context(|| format!("token price request for {} failed", address))?
            .error_for_status()
            .with_context(|| format!("token price rejected for {}", address))?
            .json()
            .await
            .context("failed to decode token price response")?;

        Ok(extract_token_price(&body, address))
    }
}

fn extract_token_price(body: &Value, address: &str) -> Option<TokenPrice> {
    let data = body.get("data").filter(|d| !d.is_null())?;
    let price = data.get("value")?.as_f64().filter(|p| p.is_finite())?;
    Some(TokenPrice {
        address: address.to_string(),
        price,
        symbol: data
            .get("symbol")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn extract_usd(body: &Value, asset_id: &str) -> Option<f64> {
    body.get(asset_id)?
        .get("usd")?
        .as_f64()
        .filter(|price| price.is_finite())
}

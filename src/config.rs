use std::env;
use std::time::Duration;

use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub helius_api_key: String,
    pub helius_api_url: String,
    pub helius_rpc_url: String,
    pub price_api_url: String,
    pub birdeye_api_url: String,
    pub birdeye_api_key: Option<String>,
    pub http_bind_addr: String,
    pub history_batch_size: usize,
    pub rate_limit: RetryPolicy,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing HELIUS_API_KEY env var")]
    MissingApiKey,
    #[error("{var} must be a positive integer")]
    InvalidNumber { var: &'static str },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let helius_api_key = env::var("HELIUS_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let helius_api_url =
            env::var("HELIUS_API_URL").unwrap_or_else(|_| "https://api.helius.xyz".to_string());
        let helius_rpc_url = env::var("HELIUS_RPC_URL")
            .unwrap_or_else(|_| "https://mainnet.helius-rpc.com".to_string());
        let price_api_url = env::var("PRICE_API_URL")
            .unwrap_or_else(|_| "https://api.coingecko.com/api/v3".to_string());
        let birdeye_api_url = env::var("BIRDEYE_API_URL")
            .unwrap_or_else(|_| "https://public-api.birdeye.so".to_string());
        let birdeye_api_key = env::var("BIRDEYE_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        let http_bind_addr = env::var("HTTP_BIND").unwrap_or_else(|_| "127.0.0.1:3001".to_string());

        let history_batch_size = parse_positive("HISTORY_BATCH_SIZE", 100)?;
        let max_attempts = parse_positive("RATE_LIMIT_MAX_ATTEMPTS", 5)?;
        let base_delay_ms = parse_positive("RATE_LIMIT_BASE_DELAY_MS", 1000)?;

        Ok(Self {
            helius_api_key,
            helius_api_url: trim_base(helius_api_url),
            helius_rpc_url,
            price_api_url: trim_base(price_api_url),
            birdeye_api_url: trim_base(birdeye_api_url),
            birdeye_api_key,
            http_bind_addr,
            history_batch_size,
            rate_limit: RetryPolicy {
                max_attempts: max_attempts as u32,
                base_delay: Duration::from_millis(base_delay_ms as u64),
            },
        })
    }
}

fn parse_positive(var: &'static str, default: usize) -> Result<usize, ConfigError> {
    match env::var(var) {
        Ok(raw) => match raw.trim().parse::<usize>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(ConfigError::InvalidNumber { var }),
        },
        Err(_) => Ok(default),
    }
}

fn trim_base(raw: String) -> String {
    raw.trim_end_matches('/').to_string()
}

/// Failures of the transaction-history pipeline.
///
/// Only the first three variants ever reach a caller; `Normalization` is
/// logged by the normalizer and the offending record is skipped.
#[derive(thiserror::Error, Debug)]
pub enum HistoryError {
    #[error("rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },
    #[error("upstream fetch failed: {0}")]
    UpstreamFetch(String),
    #[error("invalid response format from indexer API")]
    InvalidResponseFormat,
    #[error("failed to normalize record: {0}")]
    Normalization(String),
}

impl From<reqwest::Error> for HistoryError {
    fn from(err: reqwest::Error) -> Self {
        HistoryError::UpstreamFetch(err.to_string())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TokenPriceError {
    #[error("API key not configured")]
    MissingApiKey,
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

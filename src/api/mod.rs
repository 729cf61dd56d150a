use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    history::{HistoryRequest, HistoryService, DEFAULT_PAGE_LIMIT},
    error::TokenPriceError,
    models::{Page, TokenMetadata, TokenPrice, WalletBalances},
    normalize::Thresholds,
    price::{BITCOIN_ASSET_ID, SOLANA_ASSET_ID},
    sources::{BalanceSource, PriceFeed, TokenMetadataSource, TokenPriceSource},
    upstream_stats::{UpstreamSnapshot, UPSTREAM_STATS},
};

#[derive(Clone)]
pub struct AppState {
    pub history: HistoryService,
    pub balances: Arc<dyn BalanceSource>,
    pub metadata: Arc<dyn TokenMetadataSource>,
    pub prices: Arc<dyn PriceFeed>,
    pub token_prices: Arc<dyn TokenPriceSource>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn internal(error: &'static str, message: impl ToString) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorBody {
                error,
                message: Some(message.to_string()),
            },
        }
    }

    fn bad_request(error: &'static str, message: Option<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody { error, message },
        }
    }

    fn not_found(error: &'static str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: ErrorBody {
                error,
                message: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryQuery {
    limit: Option<usize>,
    cursor: Option<String>,
    min_sol_amount: Option<f64>,
    min_token_amount: Option<f64>,
}

impl HistoryQuery {
    fn into_request(self, wallet: String) -> HistoryRequest {
        let defaults = Thresholds::default();
        HistoryRequest {
            wallet,
            limit: self.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
            cursor: self.cursor.filter(|c| !c.is_empty()),
            thresholds: Thresholds {
                min_native_amount: self.min_sol_amount.unwrap_or(defaults.min_native_amount),
                min_token_amount: self.min_token_amount.unwrap_or(defaults.min_token_amount),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenPriceQuery {
    address: Option<String>,
}

#[derive(Serialize)]
struct PriceResponse {
    price: f64,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn transaction_history(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<Page>, ApiError> {
    let Query(query) = query.map_err(|rejection| {
        ApiError::bad_request("Invalid query parameters", Some(rejection.body_text()))
    })?;
    let request = query.into_request(wallet);
    tracing::info!(
        "transaction history request for {} (limit {}, cursor {:?})",
        request.wallet,
        request.limit,
        request.cursor
    );

    state
        .history
        .fetch_page(&request)
        .await
        .map(Json)
        .map_err(|err| {
            tracing::error!("transaction history for {} failed: {}", request.wallet, err);
            ApiError::internal("Failed to fetch transaction history", err)
        })
}

async fn wallet_balances(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
) -> Result<Json<WalletBalances>, ApiError> {
    state.balances.fetch_balances(&wallet).await.map(Json).map_err(|err| {
        tracing::error!("balances for {} failed: {}", wallet, err);
        ApiError::internal("Failed to fetch wallet data", err)
    })
}

async fn token_metadata(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Vec<TokenMetadata>>, ApiError> {
    let Some(ids) = mint_addresses(&body) else {
        return Err(ApiError::bad_request("mintAddresses must be an array", None));
    };

    tracing::info!("fetching metadata for {} tokens", ids.len());
    state.metadata.lookup(&ids).await.map(Json).map_err(|err| {
        tracing::error!("token metadata lookup failed: {:#}", err);
        ApiError::internal("Failed to fetch token metadata", format!("{:#}", err))
    })
}

fn mint_addresses(body: &Value) -> Option<Vec<String>> {
    body.get("mintAddresses")?
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

async fn crypto_price(
    State(state): State<AppState>,
    Path(asset): Path<String>,
) -> Result<Json<PriceResponse>, ApiError> {
    let asset_id = match asset.as_str() {
        "sol" => SOLANA_ASSET_ID,
        "btc" => BITCOIN_ASSET_ID,
        _ => return Err(ApiError::not_found("Unsupported asset")),
    };

    state
        .prices
        .usd_price(asset_id)
        .await
        .map(|price| Json(PriceResponse { price }))
        .map_err(|err| {
            tracing::error!("price lookup for {} failed: {:#}", asset_id, err);
            ApiError::internal("Failed to retrieve price", format!("{:#}", err))
        })
}

async fn token_price(
    State(state): State<AppState>,
    Query(query): Query<TokenPriceQuery>,
) -> Result<Json<TokenPrice>, ApiError> {
    let Some(address) = query.address.filter(|a| !a.trim().is_empty()) else {
        return Err(ApiError::bad_request("Token address required", None));
    };

    match state.token_prices.token_price(&address).await {
        Ok(Some(price)) => Ok(Json(price)),
        Ok(None) => Err(ApiError::not_found("Token data not found")),
        Err(TokenPriceError::MissingApiKey) => {
            tracing::error!("token price requested for {} without an API key", address);
            Err(ApiError::internal(
                "API key not configured",
                TokenPriceError::MissingApiKey,
            ))
        }
        Err(err) => {
            tracing::error!("token price lookup for {} failed: {:#}", address, err);
            Err(ApiError::internal(
                "Failed to retrieve token price",
                format!("{:#}", err),
            ))
        }
    }
}

async fn upstream_stats() -> Json<UpstreamSnapshot> {
    Json(UPSTREAM_STATS.snapshot())
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/transaction-history/transactions/:wallet",
            get(transaction_history),
        )
        .route("/wallet/:wallet", get(wallet_balances))
        .route("/token-metadata", post(token_metadata))
        .route("/crypto-price/birdeye/single", get(token_price))
        .route("/crypto-price/:asset", get(crypto_price))
        .route("/stats/upstream", get(upstream_stats))
        .with_state(state)
}

pub async fn run_http_server(addr: &str, state: AppState) -> Result<()> {
    let app = app_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

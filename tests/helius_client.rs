use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use wallet_tracker::error::HistoryError;
use wallet_tracker::helius::HeliusClient;
use wallet_tracker::retry::RetryPolicy;
use wallet_tracker::sources::{ActivitySource, BalanceSource, TokenMetadataSource};
use wallet_tracker::upstream_stats::UPSTREAM_STATS;

#[derive(Clone, Copy)]
enum Mode {
    AlwaysRateLimited,
    RateLimitedThenOk(usize),
    NotAList,
    ServerError,
}

#[derive(Clone)]
struct FakeIndexer {
    mode: Mode,
    hits: Arc<AtomicUsize>,
    last_query: Arc<Mutex<HashMap<String, String>>>,
}

async fn transactions(
    State(fake): State<FakeIndexer>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let hit = fake.hits.fetch_add(1, Ordering::SeqCst) + 1;
    *fake.last_query.lock().unwrap() = query;

    match fake.mode {
        Mode::AlwaysRateLimited => (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response(),
        Mode::RateLimitedThenOk(limited) if hit <= limited => {
            (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response()
        }
        Mode::RateLimitedThenOk(_) => Json(json!([
            { "signature": "s1", "timestamp": 1_700_000_000 },
            { "signature": "s2", "timestamp": 1_699_999_000 },
        ]))
        .into_response(),
        Mode::NotAList => Json(json!({ "error": "unexpected" })).into_response(),
        Mode::ServerError => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
    }
}

async fn balances(State(fake): State<FakeIndexer>) -> Json<Value> {
    fake.hits.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "nativeBalance": 2_500_000_000u64,
        "tokens": [
            { "mint": "MintA", "amount": 10, "decimals": 0, "tokenAccount": "Acc1" },
            { "mint": "MintEmpty", "amount": 0, "decimals": 6 },
        ],
    }))
}

async fn rpc(Json(body): Json<Value>) -> Json<Value> {
    assert_eq!(body["method"], "getAssetBatch");
    Json(json!({
        "jsonrpc": "2.0",
        "id": body["id"],
        "result": [
            {
                "id": "MintA",
                "content": { "metadata": { "name": "Token A", "symbol": "TKA" } },
            },
            null,
        ],
    }))
}

async fn spawn_fake_indexer(mode: Mode) -> (String, FakeIndexer, JoinHandle<()>) {
    let fake = FakeIndexer {
        mode,
        hits: Arc::new(AtomicUsize::new(0)),
        last_query: Arc::new(Mutex::new(HashMap::new())),
    };
    let app = Router::new()
        .route("/v0/addresses/:wallet/transactions", get(transactions))
        .route("/v0/addresses/:wallet/balances", get(balances))
        .route("/rpc", post(rpc))
        .with_state(fake.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let base_url = format!("http://{}", addr);
    let server = axum::serve(listener, app);
    let handle = tokio::spawn(async move {
        let _ = server.await;
    });

    (base_url, fake, handle)
}

fn client_for(base_url: &str) -> HeliusClient {
    HeliusClient::new(
        base_url,
        &format!("{}/rpc", base_url),
        "test-key",
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
        },
    )
    .unwrap()
}

#[tokio::test]
async fn rate_limit_exhaustion_is_reported_after_five_attempts() {
    let (base_url, fake, handle) = spawn_fake_indexer(Mode::AlwaysRateLimited).await;
    let client = client_for(&base_url);

    let err = client.fetch_activity("W", None, 100).await.unwrap_err();

    assert!(matches!(err, HistoryError::RateLimitExceeded { attempts: 5 }));
    assert_eq!(fake.hits.load(Ordering::SeqCst), 5);
    handle.abort();
}

#[tokio::test]
async fn rate_limited_attempts_are_counted() {
    let (base_url, _fake, handle) = spawn_fake_indexer(Mode::AlwaysRateLimited).await;
    let client = client_for(&base_url);

    // Counters are process-wide and other tests run concurrently.
    let before = UPSTREAM_STATS.snapshot();
    let _ = client.fetch_activity("W", None, 100).await.unwrap_err();
    let after = UPSTREAM_STATS.snapshot();

    assert!(after.requests - before.requests >= 5);
    assert!(after.rate_limited - before.rate_limited >= 5);
    handle.abort();
}

#[tokio::test]
async fn rate_limited_requests_recover_within_budget() {
    let (base_url, fake, handle) = spawn_fake_indexer(Mode::RateLimitedThenOk(2)).await;
    let client = client_for(&base_url);

    let records = client
        .fetch_activity("W", Some("cursor-sig"), 25)
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(fake.hits.load(Ordering::SeqCst), 3);
    let query = fake.last_query.lock().unwrap().clone();
    assert_eq!(query.get("api-key").map(String::as_str), Some("test-key"));
    assert_eq!(query.get("limit").map(String::as_str), Some("25"));
    assert_eq!(query.get("before").map(String::as_str), Some("cursor-sig"));
    handle.abort();
}

#[tokio::test]
async fn non_list_body_is_an_invalid_response() {
    let (base_url, fake, handle) = spawn_fake_indexer(Mode::NotAList).await;
    let client = client_for(&base_url);

    let err = client.fetch_activity("W", None, 100).await.unwrap_err();

    assert!(matches!(err, HistoryError::InvalidResponseFormat));
    assert_eq!(fake.hits.load(Ordering::SeqCst), 1);
    handle.abort();
}

#[tokio::test]
async fn server_errors_fail_without_retry() {
    let (base_url, fake, handle) = spawn_fake_indexer(Mode::ServerError).await;
    let client = client_for(&base_url);

    let err = client.fetch_activity("W", None, 100).await.unwrap_err();

    match err {
        HistoryError::UpstreamFetch(message) => assert!(message.contains("500")),
        other => panic!("expected upstream fetch error, got {:?}", other),
    }
    assert_eq!(fake.hits.load(Ordering::SeqCst), 1);
    handle.abort();
}

#[tokio::test]
async fn balances_drop_empty_tokens_and_scale_native() {
    let (base_url, _fake, handle) = spawn_fake_indexer(Mode::ServerError).await;
    let client = client_for(&base_url);

    let balances = client.fetch_balances("W").await.unwrap();

    assert!((balances.sol_balance - 2.5).abs() < 1e-12);
    assert_eq!(balances.tokens.len(), 1);
    assert_eq!(balances.tokens[0].mint, "MintA");
    handle.abort();
}

#[tokio::test]
async fn metadata_lookup_skips_unknown_assets() {
    let (base_url, _fake, handle) = spawn_fake_indexer(Mode::ServerError).await;
    let client = client_for(&base_url);

    let found = client
        .lookup(&["MintA".to_string(), "MintMissing".to_string()])
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "MintA");
    assert_eq!(found[0].symbol.as_deref(), Some("TKA"));
    assert_eq!(found[0].name.as_deref(), Some("Token A"));
    handle.abort();
}

//! Flipside client against an in-process JSON-RPC double

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use solana_transfers_ingest::fetcher::flipside::FlipsideClient;
use solana_transfers_ingest::fetcher::{FetcherError, QueryApi};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Scripted behavior of the double
#[derive(Clone, Copy)]
enum Script {
    /// Succeed after one RUNNING poll
    Succeed,
    /// Finish in QUERY_STATE_FAILED
    FailQuery,
    /// Answer every results request with 429
    ThrottleResults,
    /// Answer the first createQueryRun with 502, later ones normally
    CreateBadGatewayOnce,
}

struct Double {
    script: Script,
    polls: AtomicUsize,
    creates: AtomicUsize,
    api_keys: std::sync::Mutex<Vec<String>>,
}

async fn rpc(
    State(double): State<Arc<Double>>,
    headers: axum::http::HeaderMap,
    Json(request): Json<Value>,
) -> Response {
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        double.api_keys.lock().unwrap().push(key.to_string());
    }
    let id = request["id"].clone();
    let method = request["method"].as_str().unwrap_or_default();
    let params = &request["params"][0];

    let result = match method {
        "createQueryRun" => {
            let creates = double.creates.fetch_add(1, Ordering::SeqCst);
            if let (Script::CreateBadGatewayOnce, 0) = (double.script, creates) {
                return (StatusCode::BAD_GATEWAY, "upstream reset").into_response();
            }
            assert!(params["sql"].as_str().is_some());
            json!({ "queryRun": { "id": "qr-1", "state": "QUERY_STATE_READY" } })
        }
        "getQueryRun" => {
            let polls = double.polls.fetch_add(1, Ordering::SeqCst);
            let state = match (double.script, polls) {
                (_, 0) => "QUERY_STATE_RUNNING",
                (Script::FailQuery, _) => "QUERY_STATE_FAILED",
                _ => "QUERY_STATE_SUCCESS",
            };
            let error_message = match state {
                "QUERY_STATE_FAILED" => json!("invalid identifier 'FOO'"),
                _ => Value::Null,
            };
            json!({ "queryRun": {
                "id": "qr-1",
                "state": state,
                "errorName": "SqlCompilationError",
                "errorMessage": error_message,
            }})
        }
        "getQueryRunResults" => {
            if let Script::ThrottleResults = double.script {
                return (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response();
            }
            let number = params["page"]["number"].as_u64().unwrap_or(1);
            let size = params["page"]["size"].as_u64().unwrap_or(1);
            let total = 3u64;
            let start = (number - 1) * size;
            let rows: Vec<Value> = (start..(start + size).min(total))
                .map(|i| json!([format!("tx{i}"), i, null, 1.5]))
                .collect();
            json!({
                "columnNames": ["tx_id", "block_id", "mint", "amount"],
                "columnTypes": ["string", "number", "string", "number"],
                "rows": rows,
                "page": { "currentPageNumber": number, "currentPageSize": size, "totalRows": total, "totalPages": total.div_ceil(size) },
            })
        }
        other => {
            return Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": format!("method {other} not found") },
            }))
            .into_response()
        }
    };

    Json(json!({ "jsonrpc": "2.0", "id": id, "result": result })).into_response()
}

async fn spawn_double(script: Script) -> (String, Arc<Double>) {
    let double = Arc::new(Double {
        script,
        polls: AtomicUsize::new(0),
        creates: AtomicUsize::new(0),
        api_keys: std::sync::Mutex::new(Vec::new()),
    });
    let app = Router::new()
        .route("/json-rpc", post(rpc))
        .with_state(double.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), double)
}

fn client(base_url: &str) -> FlipsideClient {
    FlipsideClient::new(base_url, "test-key")
        .with_poll_interval(Duration::from_millis(10))
        .with_max_retries(0)
}

#[tokio::test]
async fn test_submit_polls_until_success() {
    let (url, double) = spawn_double(Script::Succeed).await;
    let submitted = client(&url)
        .submit("SELECT 1", 1, 1, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(submitted.query_id, "qr-1");
    assert_eq!(submitted.total_rows, 3);
    assert_eq!(submitted.columns, vec!["tx_id", "block_id", "mint", "amount"]);
    assert!(double.polls.load(Ordering::SeqCst) >= 2);
    assert!(double.api_keys.lock().unwrap().iter().all(|k| k == "test-key"));
}

#[tokio::test]
async fn test_fetch_page_returns_raw_cells() {
    let (url, _double) = spawn_double(Script::Succeed).await;
    let rows = client(&url).fetch_page("qr-1", 2, 2).await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0],
        vec![
            Some("tx2".to_string()),
            Some("2".to_string()),
            None,
            Some("1.5".to_string())
        ]
    );
}

#[tokio::test]
async fn test_failed_query_is_execution_failure() {
    let (url, _double) = spawn_double(Script::FailQuery).await;
    let err = client(&url)
        .submit("SELECT foo", 1, 1, Duration::from_secs(5))
        .await
        .unwrap_err();

    match err {
        FetcherError::ExecutionFailed(message) => assert!(message.contains("invalid identifier")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_http_429_maps_to_rate_limited() {
    let (url, _double) = spawn_double(Script::ThrottleResults).await;
    let err = client(&url).fetch_page("qr-1", 1, 100).await.unwrap_err();
    assert!(err.is_rate_limit(), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_poll_timeout() {
    let (url, _double) = spawn_double(Script::Succeed).await;
    let api = client(&url).with_poll_interval(Duration::from_millis(200));
    let err = api
        .wait_for_success("qr-1", Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, FetcherError::Timeout(_)));
}

#[tokio::test]
async fn test_unreachable_service_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{addr}"))
        .fetch_page("qr-1", 1, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, FetcherError::NetworkError(_)));
}

#[tokio::test]
async fn test_query_creation_is_never_resent() {
    let (url, double) = spawn_double(Script::CreateBadGatewayOnce).await;
    let err = client(&url)
        .with_max_retries(3)
        .submit("SELECT 1", 1, 1, Duration::from_secs(5))
        .await
        .unwrap_err();

    assert!(matches!(err, FetcherError::ExecutionFailed(_)), "unexpected error: {err:?}");
    assert_eq!(double.creates.load(Ordering::SeqCst), 1);
    assert_eq!(double.polls.load(Ordering::SeqCst), 0);
}

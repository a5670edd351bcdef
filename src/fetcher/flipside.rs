//! Flipside JSON-RPC query client
//!
//! Speaks JSON-RPC 2.0 to `{base_url}/json-rpc`:
//! - `createQueryRun` submits SQL
//! - `getQueryRun` is polled until the run reaches a terminal state
//! - `getQueryRunResults` returns one page of rows plus result metadata
//!
//! Transport failures (network errors, 5xx) on the read methods are retried
//! with exponential backoff; `createQueryRun` is never resent. HTTP 429 is
//! returned immediately as [`FetcherError::RateLimited`]: what to do about a throttled page is the
//! session's decision, not the transport's.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::shared_resources::global_http_client;
use super::{FetcherError, FetcherResult, QueryApi, SubmittedQuery};
use crate::config::{calculate_backoff, MAX_RETRIES, QUERY_POLL_INTERVAL};
use crate::RawRow;

const STATE_SUCCESS: &str = "QUERY_STATE_SUCCESS";
const STATE_FAILED: &str = "QUERY_STATE_FAILED";
const STATE_CANCELED: &str = "QUERY_STATE_CANCELED";

#[derive(Serialize)]
struct RpcRequest<'a, P: Serialize> {
    jsonrpc: &'static str,
    method: &'a str,
    params: [P; 1],
    id: u64,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateQueryRunParams<'a> {
    #[serde(rename = "resultTTLHours")]
    result_ttl_hours: u32,
    max_age_minutes: u32,
    sql: &'a str,
    tags: QueryTags,
    data_source: &'static str,
    data_provider: &'static str,
}

#[derive(Serialize)]
struct QueryTags {
    sdk_package: &'static str,
    sdk_version: &'static str,
    sdk_language: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRunIdParams<'a> {
    query_run_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryResultsParams<'a> {
    query_run_id: &'a str,
    format: &'static str,
    page: PageParams,
}

#[derive(Serialize)]
struct PageParams {
    number: u64,
    size: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryRunEnvelope {
    query_run: QueryRun,
}

/// State of a submitted query run
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRun {
    /// Run identifier
    pub id: String,
    /// `QUERY_STATE_*` string
    pub state: String,
    /// Error class when the run failed
    #[serde(default)]
    pub error_name: Option<String>,
    /// Error message when the run failed
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResults {
    #[serde(default)]
    column_names: Option<Vec<String>>,
    #[serde(default)]
    column_types: Option<Vec<String>>,
    #[serde(default)]
    rows: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    page: Option<PageStats>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageStats {
    #[serde(default)]
    total_rows: u64,
}

/// Flipside JSON-RPC client
pub struct FlipsideClient {
    client: Arc<Client>,
    rpc_url: String,
    api_key: String,
    poll_interval: Duration,
    max_retries: u32,
}

impl FlipsideClient {
    /// Create a client on the shared HTTP connection pool
    ///
    /// # Arguments
    /// * `base_url` - API base URL (e.g., "<https://api-v2.flipsidecrypto.xyz>")
    /// * `api_key` - Value sent in the `x-api-key` header
    pub fn new(base_url: impl AsRef<str>, api_key: impl Into<String>) -> Self {
        Self::with_client(global_http_client(), base_url, api_key)
    }

    /// Create a client on a caller-provided HTTP client
    pub fn with_client(
        client: Arc<Client>,
        base_url: impl AsRef<str>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            rpc_url: format!("{}/json-rpc", base_url.as_ref().trim_end_matches('/')),
            api_key: api_key.into(),
            poll_interval: QUERY_POLL_INTERVAL,
            max_retries: MAX_RETRIES,
        }
    }

    /// Override the interval between query-state polls
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Override the number of transport retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// JSON-RPC endpoint this client posts to
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Submit SQL and return the query run id
    ///
    /// Sent exactly once; any failure is [`FetcherError::ExecutionFailed`].
    pub async fn create_query_run(&self, sql: &str) -> FetcherResult<String> {
        let params = CreateQueryRunParams {
            result_ttl_hours: 1,
            max_age_minutes: 0,
            sql,
            tags: QueryTags {
                sdk_package: env!("CARGO_PKG_NAME"),
                sdk_version: env!("CARGO_PKG_VERSION"),
                sdk_language: "rust",
            },
            data_source: "snowflake-default",
            data_provider: "flipside",
        };
        // Sent once: createQueryRun is not idempotent
        let envelope: QueryRunEnvelope = self
            .call_with_retries("createQueryRun", params, 0)
            .await
            .map_err(|e| match e {
                FetcherError::ApiError { message, .. } => FetcherError::ExecutionFailed(message),
                other => FetcherError::ExecutionFailed(format!("createQueryRun: {other}")),
            })?;
        Ok(envelope.query_run.id)
    }

    /// Current state of a query run
    pub async fn get_query_run(&self, query_run_id: &str) -> FetcherResult<QueryRun> {
        let envelope: QueryRunEnvelope = self
            .call("getQueryRun", QueryRunIdParams { query_run_id })
            .await?;
        Ok(envelope.query_run)
    }

    /// Poll a query run until it succeeds, fails, or `timeout` elapses
    pub async fn wait_for_success(&self, query_run_id: &str, timeout: Duration) -> FetcherResult<()> {
        let started = Instant::now();

        loop {
            let run = self.get_query_run(query_run_id).await?;
            match run.state.as_str() {
                STATE_SUCCESS => {
                    debug!(query_run_id, elapsed = ?started.elapsed(), "Query run succeeded");
                    return Ok(());
                }
                STATE_FAILED => {
                    let message = run
                        .error_message
                        .or(run.error_name)
                        .unwrap_or_else(|| "unknown error".to_string());
                    return Err(FetcherError::ExecutionFailed(message));
                }
                STATE_CANCELED => {
                    return Err(FetcherError::ExecutionFailed(format!(
                        "query run {query_run_id} was canceled"
                    )));
                }
                state => debug!(query_run_id, state, "Query run still executing"),
            }

            if started.elapsed() + self.poll_interval > timeout {
                return Err(FetcherError::Timeout(timeout));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn get_query_run_results(
        &self,
        query_run_id: &str,
        page_number: u64,
        page_size: u64,
    ) -> FetcherResult<QueryResults> {
        let params = QueryResultsParams {
            query_run_id,
            format: "json",
            page: PageParams {
                number: page_number,
                size: page_size,
            },
        };
        self.call("getQueryRunResults", params).await
    }

    /// Issue one JSON-RPC call with transport retries
    ///
    /// Retries on network errors and 5xx responses; fails fast on 429 and
    /// other 4xx responses.
    async fn call<P, T>(&self, method: &str, params: P) -> FetcherResult<T>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        self.call_with_retries(method, params, self.max_retries).await
    }

    async fn call_with_retries<P, T>(&self, method: &str, params: P, max_retries: u32) -> FetcherResult<T>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params: [params],
            id: 1,
        };
        let mut last_error = None;

        for attempt in 0..=max_retries {
            let response = match self
                .client
                .post(&self.rpc_url)
                .header("x-api-key", &self.api_key)
                .header("Accept", "application/json")
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(
                        method,
                        "Network error on attempt {}/{}: {}",
                        attempt + 1,
                        max_retries + 1,
                        e
                    );
                    last_error = Some(FetcherError::NetworkError(e.to_string()));
                    if attempt < max_retries {
                        tokio::time::sleep(calculate_backoff(attempt)).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 {
                let body = response.text().await.unwrap_or_default();
                return Err(FetcherError::RateLimited(format!("{method}: {body}")));
            }

            if status.is_server_error() {
                warn!(
                    method,
                    "Server error {} on attempt {}/{}",
                    status,
                    attempt + 1,
                    max_retries + 1
                );
                last_error = Some(FetcherError::HttpError(format!("Server error: {status}")));
                if attempt < max_retries {
                    tokio::time::sleep(calculate_backoff(attempt)).await;
                    continue;
                }
                break;
            }

            if status.is_client_error() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(FetcherError::HttpError(format!(
                    "Client error {status}: {error_text}"
                )));
            }

            let body: RpcResponse<T> = response
                .json()
                .await
                .map_err(|e| FetcherError::ParseError(format!("{method}: {e}")))?;

            if let Some(err) = body.error {
                if err.message.to_lowercase().contains("rate limit") {
                    return Err(FetcherError::RateLimited(err.message));
                }
                return Err(FetcherError::ApiError {
                    code: err.code,
                    message: err.message,
                });
            }

            return body.result.ok_or_else(|| {
                FetcherError::ParseError(format!("{method}: response has neither result nor error"))
            });
        }

        Err(last_error
            .unwrap_or_else(|| FetcherError::NetworkError("All retries exhausted".to_string())))
    }
}

#[async_trait]
impl QueryApi for FlipsideClient {
    async fn submit(
        &self,
        sql: &str,
        page_number: u64,
        page_size: u64,
        timeout: Duration,
    ) -> FetcherResult<SubmittedQuery> {
        let query_id = self.create_query_run(sql).await?;
        info!(query_id = %query_id, "Query run created");

        self.wait_for_success(&query_id, timeout).await?;

        let results = self
            .get_query_run_results(&query_id, page_number, page_size)
            .await?;

        Ok(SubmittedQuery {
            query_id,
            columns: results.column_names.unwrap_or_default(),
            column_types: results.column_types.unwrap_or_default(),
            total_rows: results.page.map(|p| p.total_rows).unwrap_or(0),
        })
    }

    async fn fetch_page(
        &self,
        query_id: &str,
        page_number: u64,
        page_size: u64,
    ) -> FetcherResult<Vec<RawRow>> {
        let results = self
            .get_query_run_results(query_id, page_number, page_size)
            .await?;
        let columns = results.column_names.unwrap_or_default();

        results
            .rows
            .unwrap_or_default()
            .into_iter()
            .map(|row| json_row(row, &columns))
            .collect()
    }
}

/// Convert one JSON result row (array or object keyed by column) into raw cells
fn json_row(row: serde_json::Value, columns: &[String]) -> FetcherResult<RawRow> {
    match row {
        serde_json::Value::Array(cells) => Ok(cells.into_iter().map(json_cell).collect()),
        serde_json::Value::Object(mut fields) => Ok(columns
            .iter()
            .map(|c| fields.remove(c).and_then(json_cell))
            .collect()),
        other => Err(FetcherError::ParseError(format!(
            "unexpected row shape: {other}"
        ))),
    }
}

fn json_cell(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

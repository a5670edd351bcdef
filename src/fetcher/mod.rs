//! Remote query API access
//!
//! [`QueryApi`] is the seam between the ingestion engine and the remote
//! analytical query service. The production implementation is
//! [`flipside::FlipsideClient`]; tests substitute in-memory doubles.

use async_trait::async_trait;
use std::time::Duration;

use crate::RawRow;

pub mod flipside;
pub mod shared_resources;

/// Fetcher errors
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// HTTP request error
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Response parse error
    #[error("parse error: {0}")]
    ParseError(String),

    /// JSON-RPC error object returned by the service
    #[error("API error {code}: {message}")]
    ApiError {
        /// JSON-RPC error code
        code: i64,
        /// Error message
        message: String,
    },

    /// Rate limit exceeded
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    /// Query was rejected or failed while executing
    #[error("query execution failed: {0}")]
    ExecutionFailed(String),

    /// Query did not finish in time
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    /// Network error
    #[error("network error: {0}")]
    NetworkError(String),
}

impl FetcherError {
    /// Whether the error is a rate-limit rejection
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, FetcherError::RateLimited(_))
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Metadata returned by a probe submission
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedQuery {
    /// Identifier of the finished query run
    pub query_id: String,
    /// Column names in API order
    pub columns: Vec<String>,
    /// Column type names in API order
    pub column_types: Vec<String>,
    /// Total rows the query produced
    pub total_rows: u64,
}

/// Remote query-execution API
#[async_trait]
pub trait QueryApi: Send + Sync {
    /// Submit SQL, wait for it to finish and return result metadata
    ///
    /// # Arguments
    /// * `sql` - SQL text
    /// * `page_number` - 1-based page to request with the metadata
    /// * `page_size` - Rows per page for that request
    /// * `timeout` - Ceiling for execution
    ///
    /// # Errors
    /// [`FetcherError::ExecutionFailed`] if the service rejects the query,
    /// [`FetcherError::Timeout`] if it does not finish in time.
    async fn submit(
        &self,
        sql: &str,
        page_number: u64,
        page_size: u64,
        timeout: Duration,
    ) -> FetcherResult<SubmittedQuery>;

    /// Fetch one page of a finished query run
    ///
    /// # Errors
    /// [`FetcherError::RateLimited`] when the service throttles the request.
    async fn fetch_page(
        &self,
        query_id: &str,
        page_number: u64,
        page_size: u64,
    ) -> FetcherResult<Vec<RawRow>>;
}

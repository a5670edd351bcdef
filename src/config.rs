//! Ingestion configuration constants

use std::time::Duration;

/// Default number of rows requested per page.
/// 100,000 rows keeps each `getQueryRunResults` response well under the
/// service's payload ceiling while keeping the page count for a day of
/// transfers in the low hundreds.
pub const DEFAULT_PAGE_SIZE: u64 = 100_000;

/// Default number of page fetches allowed in flight at once.
/// Matches the concurrent-request limit observed on the query service.
pub const DEFAULT_MAX_CONCURRENT: usize = 15;

/// Ceiling for submitting the probe query and waiting for it to finish.
pub const SUBMIT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Interval between query-state polls while a submitted query runs.
pub const QUERY_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default Flipside API base URL.
pub const DEFAULT_API_URL: &str = "https://api-v2.flipsidecrypto.xyz";

/// Default DuckDB database file.
pub const DEFAULT_DB_FILE: &str = "solana.duckdb";

/// Default intermediate Parquet file.
pub const DEFAULT_PARQUET_FILE: &str = "output.parquet";

/// Default file holding the API key.
pub const DEFAULT_API_KEY_FILE: &str = "api.key";

/// Maximum number of retries for transport failures (network errors, 5xx).
pub const MAX_RETRIES: u32 = 5;

/// Default number of retries for a rate-limited page under the retry policy.
pub const DEFAULT_PAGE_MAX_RETRIES: u32 = 5;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1000; // 1 second

/// Maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30000; // 30 seconds

/// Calculate exponential backoff delay
pub fn calculate_backoff(retry_count: u32) -> Duration {
    let delay_ms = INITIAL_BACKOFF_MS.saturating_mul(2u64.saturating_pow(retry_count));
    let delay_ms = delay_ms.min(MAX_BACKOFF_MS);
    Duration::from_millis(delay_ms)
}

//! Single-page fetch with gate admission and rate-limit policy

use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::gate::ConcurrencyGate;
use crate::config::{calculate_backoff, DEFAULT_PAGE_MAX_RETRIES};
use crate::fetcher::{FetcherError, QueryApi};
use crate::metrics;
use crate::RawRow;

/// What to do with a page the service throttled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RateLimitPolicy {
    /// Log the page and leave its rows out of the run
    #[default]
    Abandon,
    /// Back off exponentially and retry, abandoning after `max_retries`
    Retry {
        /// Retries after the first attempt
        max_retries: u32,
    },
}

impl FromStr for RateLimitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abandon" => Ok(RateLimitPolicy::Abandon),
            "retry" => Ok(RateLimitPolicy::Retry {
                max_retries: DEFAULT_PAGE_MAX_RETRIES,
            }),
            _ => Err(format!(
                "Invalid rate limit policy: {s}. Valid options: abandon, retry"
            )),
        }
    }
}

/// How one page fetch ended
#[derive(Debug)]
pub enum PageStatus {
    /// Rows retrieved
    Fetched(Vec<RawRow>),
    /// Throttled and given up on; rows absent from the run
    Abandoned {
        /// Last rate-limit message
        reason: String,
        /// Attempts made
        attempts: u32,
    },
    /// Failed for a reason other than rate limiting
    Failed(FetcherError),
}

/// Outcome of one page fetch task
#[derive(Debug)]
pub struct PageFetchResult {
    /// 1-based page number
    pub page_number: u64,
    /// Rows or failure
    pub status: PageStatus,
}

/// Fetches single pages through a shared gate
#[derive(Clone)]
pub struct PageFetcher {
    api: Arc<dyn QueryApi>,
    gate: ConcurrencyGate,
    policy: RateLimitPolicy,
}

impl PageFetcher {
    /// Create a page fetcher
    pub fn new(api: Arc<dyn QueryApi>, gate: ConcurrencyGate, policy: RateLimitPolicy) -> Self {
        Self { api, gate, policy }
    }

    /// Gate shared by all fetches from this fetcher
    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// Fetch one page; never returns an error, failures are reported in the result
    ///
    /// The gate slot is held only for the remote call itself and is released
    /// before any backoff sleep.
    pub async fn fetch(&self, query_id: &str, page_number: u64, page_size: u64) -> PageFetchResult {
        let mut attempt: u32 = 0;

        let status = loop {
            let response = match self.gate.acquire().await {
                Ok(permit) => {
                    metrics::record_gate_wait(permit.waited());
                    let response = self.api.fetch_page(query_id, page_number, page_size).await;
                    drop(permit);
                    response
                }
                Err(e) => break PageStatus::Failed(FetcherError::NetworkError(e.to_string())),
            };
            attempt += 1;

            match response {
                Ok(rows) => {
                    debug!(page_number, rows = rows.len(), attempt, "Page fetched");
                    break PageStatus::Fetched(rows);
                }
                Err(FetcherError::RateLimited(reason)) => {
                    metrics::record_page_rate_limited();
                    match self.policy {
                        RateLimitPolicy::Retry { max_retries } if attempt <= max_retries => {
                            let backoff = calculate_backoff(attempt - 1);
                            warn!(
                                page_number,
                                attempt,
                                backoff_ms = backoff.as_millis() as u64,
                                "Rate limit hit, retrying page"
                            );
                            tokio::time::sleep(backoff).await;
                        }
                        _ => {
                            error!(
                                page_number,
                                attempts = attempt,
                                "Rate limit ({}) was hit for page {}: {}",
                                self.gate.capacity(),
                                page_number,
                                reason
                            );
                            break PageStatus::Abandoned {
                                reason,
                                attempts: attempt,
                            };
                        }
                    }
                }
                Err(e) => {
                    error!(page_number, error = %e, "Page fetch failed");
                    break PageStatus::Failed(e);
                }
            }
        };

        PageFetchResult {
            page_number,
            status,
        }
    }
}

/// Rows the query service should return for `page_number`
///
/// Every page holds `page_size` rows except the last, which holds the remainder.
pub fn expected_page_rows(total_rows: u64, page_size: u64, page_number: u64) -> u64 {
    if page_size == 0 || page_number == 0 {
        return 0;
    }
    let offset = (page_number - 1).saturating_mul(page_size);
    total_rows.saturating_sub(offset).min(page_size)
}

//! Query session: submission, page fan-out and row accumulation
//!
//! A [`QuerySession`] is created by [`QuerySession::submit`], which runs the
//! SQL with a one-row probe page to learn the result's size and columns. The
//! resulting [`QueryDescriptor`] fixes the page count for the rest of the run.
//!
//! [`QuerySession::run`] then:
//!
//! 1. Spawns one task per page up front onto a [`JoinSet`]
//! 2. Each task waits on the shared [`ConcurrencyGate`] before calling the API
//! 3. Tasks hand their [`PageFetchResult`] back to the coordinator, which is
//!    the only place rows are appended
//! 4. Once every task has finished, the rows are assembled into an
//!    [`AssembledTable`]
//!
//! Rate-limited pages are handled by the configured [`RateLimitPolicy`] and
//! never abort the run. Any other page failure aborts it: the join set is
//! dropped, which cancels the remaining tasks.

pub mod gate;
pub mod page;

use indicatif::ProgressBar;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_MAX_CONCURRENT, DEFAULT_PAGE_SIZE, SUBMIT_TIMEOUT};
use crate::fetcher::{FetcherError, QueryApi};
use crate::metrics;
use crate::table::{assemble, AssembleError, AssembledTable, FixedSchema};
use crate::RawRow;

pub use gate::{ConcurrencyGate, GateError, GatePermit};
pub use page::{expected_page_rows, PageFetchResult, PageFetcher, PageStatus, RateLimitPolicy};

/// Session errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The service rejected the query or it failed while executing
    #[error("query submission failed: {0}")]
    QuerySubmission(FetcherError),

    /// The probe query did not finish within the ceiling
    #[error("query did not finish within {0:?}")]
    QueryTimeout(Duration),

    /// Page size of zero
    #[error("page size must be at least 1")]
    InvalidPageSize,

    /// Concurrency gate could not be built
    #[error("concurrency gate error: {0}")]
    Gate(#[from] GateError),

    /// A page failed for a reason other than rate limiting
    #[error("page {page_number} failed: {source}")]
    PageFailed {
        /// 1-based page number
        page_number: u64,
        /// Underlying fetch error
        source: FetcherError,
    },

    /// A fetch task panicked or was cancelled
    #[error("fetch task failed: {0}")]
    TaskFailed(String),

    /// Rows could not be assembled into the fixed schema
    #[error("assembly error: {0}")]
    Assemble(#[from] AssembleError),
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Number of pages needed to cover `total_rows`; a partial last page counts
pub fn total_pages(total_rows: u64, page_size: u64) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total_rows.div_ceil(page_size)
}

/// Rows to reserve before any page arrives
///
/// Bounded by what one wave of in-flight pages can deliver, so a bogus
/// declared row count cannot force a huge allocation up front.
fn initial_row_capacity(total_rows: u64, page_size: u64, max_concurrent: usize) -> usize {
    let wave = page_size.saturating_mul(max_concurrent as u64);
    usize::try_from(total_rows.min(wave)).unwrap_or(0)
}

/// Metadata of a submitted query, fixed for the rest of the run
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    /// SQL text
    pub sql: String,
    /// Rows per page
    pub page_size: u64,
    /// Rows the query produced
    pub total_rows: u64,
    /// `ceil(total_rows / page_size)`
    pub total_pages: u64,
    /// Query run identifier issued by the service
    pub query_id: String,
    /// Column names in API order
    pub columns: Vec<String>,
    /// Column type names in API order
    pub column_types: Vec<String>,
}

impl QueryDescriptor {
    /// Rows expected on a given page
    pub fn expected_page_rows(&self, page_number: u64) -> u64 {
        expected_page_rows(self.total_rows, self.page_size, page_number)
    }
}

/// Tunables for a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Rows per page
    pub page_size: u64,
    /// Concurrent page fetches
    pub max_concurrent: usize,
    /// Handling of rate-limited pages
    pub rate_limit_policy: RateLimitPolicy,
    /// Ceiling for the probe submission
    pub submit_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            rate_limit_policy: RateLimitPolicy::default(),
            submit_timeout: SUBMIT_TIMEOUT,
        }
    }
}

/// Summary of a completed fetch phase
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Pages scheduled
    pub total_pages: u64,
    /// Pages whose rows were merged
    pub pages_fetched: u64,
    /// Pages abandoned after rate limiting, ascending
    pub abandoned_pages: Vec<u64>,
    /// Rows merged into the buffer
    pub rows_fetched: u64,
    /// Rows the query declared
    pub rows_expected: u64,
    /// Wall time of the fetch phase
    pub elapsed: Duration,
}

impl RunReport {
    /// Whether every page was merged
    pub fn is_complete(&self) -> bool {
        self.abandoned_pages.is_empty()
    }

    /// Rows declared by the query but absent from the buffer
    pub fn missing_rows(&self) -> u64 {
        self.rows_expected.saturating_sub(self.rows_fetched)
    }
}

/// Raw rows of every merged page, in completion order
#[derive(Debug)]
pub struct FetchedRows {
    /// Accumulated row buffer
    pub rows: Vec<RawRow>,
    /// Fetch summary
    pub report: RunReport,
}

/// Output of [`QuerySession::run`]
#[derive(Debug)]
pub struct SessionRun {
    /// Typed, sorted table
    pub table: AssembledTable,
    /// Fetch summary
    pub report: RunReport,
}

/// One ingestion run against a submitted query
pub struct QuerySession {
    descriptor: QueryDescriptor,
    fetcher: PageFetcher,
    schema: &'static FixedSchema,
    progress: Option<ProgressBar>,
}

impl QuerySession {
    /// Submit `sql` with a one-row probe page and derive the page layout
    ///
    /// # Errors
    /// Submission and timeout errors are fatal for the run and are never
    /// retried.
    pub async fn submit(
        api: Arc<dyn QueryApi>,
        sql: &str,
        schema: &'static FixedSchema,
        options: SessionOptions,
    ) -> SessionResult<Self> {
        if options.page_size == 0 {
            return Err(SessionError::InvalidPageSize);
        }
        let gate = ConcurrencyGate::new(options.max_concurrent)?;

        let started = Instant::now();
        let submitted = tokio::time::timeout(
            options.submit_timeout,
            api.submit(sql, 1, 1, options.submit_timeout),
        )
        .await
        .map_err(|_| SessionError::QueryTimeout(options.submit_timeout))?
        .map_err(|e| match e {
            FetcherError::Timeout(limit) => SessionError::QueryTimeout(limit),
            other => SessionError::QuerySubmission(other),
        })?;

        let descriptor = QueryDescriptor {
            sql: sql.to_string(),
            page_size: options.page_size,
            total_rows: submitted.total_rows,
            total_pages: total_pages(submitted.total_rows, options.page_size),
            query_id: submitted.query_id,
            columns: submitted.columns,
            column_types: submitted.column_types,
        };

        info!(
            query_id = %descriptor.query_id,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Query will return {} rows across {} pages",
            descriptor.total_rows,
            descriptor.total_pages
        );

        Ok(Self {
            descriptor,
            fetcher: PageFetcher::new(api, gate, options.rate_limit_policy),
            schema,
            progress: None,
        })
    }

    /// Report page completion on a progress bar
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        progress.set_length(self.descriptor.total_pages);
        self.progress = Some(progress);
        self
    }

    /// Query metadata
    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    /// Fetch every page and assemble the result
    pub async fn run(&self) -> SessionResult<SessionRun> {
        let FetchedRows { rows, report } = self.fetch_all().await?;

        let started = Instant::now();
        let table = assemble(rows, &self.descriptor.columns, self.schema)?;
        info!(
            rows = table.num_rows(),
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Assembled table '{}'",
            self.schema.table
        );

        Ok(SessionRun { table, report })
    }

    /// Fetch every page into one row buffer without assembling it
    pub async fn fetch_all(&self) -> SessionResult<FetchedRows> {
        let started = Instant::now();
        let desc = &self.descriptor;

        let mut tasks = JoinSet::new();
        for page_number in 1..=desc.total_pages {
            let fetcher = self.fetcher.clone();
            let query_id = desc.query_id.clone();
            let page_size = desc.page_size;
            tasks.spawn(async move { fetcher.fetch(&query_id, page_number, page_size).await });
        }
        debug!(pages = desc.total_pages, "Scheduled page fetches");

        let mut rows: Vec<RawRow> = Vec::with_capacity(initial_row_capacity(
            desc.total_rows,
            desc.page_size,
            self.fetcher.gate().capacity(),
        ));
        let mut pages_fetched = 0;
        let mut abandoned_pages = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(|e| SessionError::TaskFailed(e.to_string()))?;
            if let Some(pb) = &self.progress {
                pb.inc(1);
            }

            match result.status {
                PageStatus::Fetched(page_rows) => {
                    let expected = desc.expected_page_rows(result.page_number);
                    if page_rows.len() as u64 != expected {
                        warn!(
                            page_number = result.page_number,
                            rows = page_rows.len(),
                            expected,
                            "Page row count differs from declared layout"
                        );
                    }
                    info!(
                        "Page number {} retrieved {} rows.",
                        result.page_number,
                        page_rows.len()
                    );
                    metrics::record_page_fetched(page_rows.len() as u64);
                    pages_fetched += 1;
                    rows.extend(page_rows);
                }
                PageStatus::Abandoned { .. } => {
                    metrics::record_page_abandoned();
                    abandoned_pages.push(result.page_number);
                }
                PageStatus::Failed(source) => {
                    if let Some(pb) = &self.progress {
                        pb.abandon();
                    }
                    return Err(SessionError::PageFailed {
                        page_number: result.page_number,
                        source,
                    });
                }
            }
        }

        if let Some(pb) = &self.progress {
            pb.finish();
        }

        abandoned_pages.sort_unstable();
        let report = RunReport {
            total_pages: desc.total_pages,
            pages_fetched,
            abandoned_pages,
            rows_fetched: rows.len() as u64,
            rows_expected: desc.total_rows,
            elapsed: started.elapsed(),
        };

        if report.is_complete() {
            info!(
                rows = report.rows_fetched,
                pages = report.pages_fetched,
                elapsed_secs = report.elapsed.as_secs_f64(),
                "Fetched all pages"
            );
        } else {
            warn!(
                rows = report.rows_fetched,
                missing_rows = report.missing_rows(),
                abandoned = ?report.abandoned_pages,
                elapsed_secs = report.elapsed.as_secs_f64(),
                "Fetch finished with abandoned pages"
            );
        }

        Ok(FetchedRows { rows, report })
    }
}

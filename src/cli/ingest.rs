//! Ingest command: query → pages → assembled table → Parquet → DuckDB

use chrono::{DateTime, Utc};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::CliError;
use crate::config::{
    DEFAULT_API_KEY_FILE, DEFAULT_API_URL, DEFAULT_DB_FILE, DEFAULT_MAX_CONCURRENT,
    DEFAULT_PAGE_MAX_RETRIES, DEFAULT_PAGE_SIZE, DEFAULT_PARQUET_FILE, SUBMIT_TIMEOUT,
};
use crate::fetcher::flipside::FlipsideClient;
use crate::fetcher::QueryApi;
use crate::metrics;
use crate::output::{ParquetTableWriter, TableWriter, WriteSummary};
use crate::session::{QuerySession, RateLimitPolicy, RunReport, SessionOptions};
use crate::store::{LoadReport, Store, StoreError};
use crate::table::{parse_timestamp_utc, FixedSchema, TRANSFERS};

/// Maximum allowed concurrency to keep well clear of the service's limits
const MAX_CONCURRENCY: usize = 64;

/// Source table of the transfers query
const SOURCE_TABLE: &str = "SOLANA.CORE.FACT_TRANSFERS";

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Ingest command arguments; every flag can also come from the environment
#[derive(Args, Debug, Clone)]
pub struct IngestCommand {
    /// Flipside API base URL
    #[arg(long, env = "API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// File containing the API key
    #[arg(long, env = "API_KEY_FILE", default_value = DEFAULT_API_KEY_FILE)]
    pub api_key_file: PathBuf,

    /// Rows per page
    #[arg(long, env = "PAGE_SIZE", default_value_t = DEFAULT_PAGE_SIZE,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub page_size: u64,

    /// Lower block_timestamp bound (inclusive)
    #[arg(long, env = "LOW_TS")]
    pub low_ts: Option<String>,

    /// Upper block_timestamp bound (inclusive)
    #[arg(long, env = "HIGH_TS")]
    pub high_ts: Option<String>,

    /// DuckDB database file
    #[arg(long, env = "DB_FILE", default_value = DEFAULT_DB_FILE)]
    pub db_file: PathBuf,

    /// Intermediate Parquet file
    #[arg(long, env = "PARQUET_FILE", default_value = DEFAULT_PARQUET_FILE)]
    pub parquet_file: PathBuf,

    /// Concurrent page fetches (max: 64)
    #[arg(long, env = "MAX_CONCURRENT", default_value_t = DEFAULT_MAX_CONCURRENT,
          value_parser = parse_concurrency)]
    pub max_concurrent: usize,

    /// Rate-limited page handling: abandon or retry
    #[arg(long, env = "RATE_LIMIT_POLICY", default_value = "abandon")]
    pub rate_limit_policy: RateLimitPolicy,

    /// Retries per rate-limited page under the retry policy
    #[arg(long, env = "PAGE_MAX_RETRIES", default_value_t = DEFAULT_PAGE_MAX_RETRIES)]
    pub page_max_retries: u32,

    /// Address for the Prometheus scrape endpoint
    #[arg(long, env = "METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

/// Inclusive block_timestamp window of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// Lower bound
    pub low: DateTime<Utc>,
    /// Upper bound
    pub high: DateTime<Utc>,
}

/// Everything a pipeline run needs besides the API client
#[derive(Debug, Clone)]
pub struct IngestPlan {
    /// SQL to submit
    pub sql: String,
    /// Target schema
    pub schema: &'static FixedSchema,
    /// Session tunables
    pub options: SessionOptions,
    /// Intermediate Parquet file
    pub parquet_file: PathBuf,
    /// DuckDB database file
    pub db_file: PathBuf,
    /// Draw a page progress bar
    pub show_progress: bool,
}

/// Outcome of a pipeline run
#[derive(Debug, Clone)]
pub struct IngestSummary {
    /// Fetch summary
    pub report: RunReport,
    /// Rows in the assembled table
    pub rows_assembled: usize,
    /// Parquet write summary
    pub write: WriteSummary,
    /// Store load summary
    pub load: LoadReport,
}

impl IngestCommand {
    /// Execute the ingest command
    pub async fn execute(&self) -> Result<IngestSummary, CliError> {
        let window = match resolve_time_window(self.low_ts.as_deref(), self.high_ts.as_deref()) {
            Ok(window) => window,
            Err(e) => {
                error!("{e}");
                return Err(e);
            }
        };

        if let Some(addr) = self.metrics_addr {
            metrics::init_metrics(addr)
                .map_err(|e| CliError::ConfigurationError(e.to_string()))?;
        }

        info!("Fetching API key...");
        let api_key = read_api_key(&self.api_key_file)?;

        info!("Creating connection to Flipside API at {}", self.api_url);
        let api = Arc::new(FlipsideClient::new(&self.api_url, api_key));

        let plan = IngestPlan {
            sql: transfers_sql(&window),
            schema: &TRANSFERS,
            options: self.session_options(),
            parquet_file: self.parquet_file.clone(),
            db_file: self.db_file.clone(),
            show_progress: true,
        };
        run_ingest(api, &plan).await
    }

    /// Session options derived from the arguments
    pub fn session_options(&self) -> SessionOptions {
        let rate_limit_policy = match self.rate_limit_policy {
            RateLimitPolicy::Retry { .. } => RateLimitPolicy::Retry {
                max_retries: self.page_max_retries,
            },
            RateLimitPolicy::Abandon => RateLimitPolicy::Abandon,
        };
        SessionOptions {
            page_size: self.page_size,
            max_concurrent: self.max_concurrent,
            rate_limit_policy,
            submit_timeout: SUBMIT_TIMEOUT,
        }
    }
}

/// Validate the LOW_TS / HIGH_TS bounds
///
/// Both must be present and parse as timestamps; naive values are UTC.
pub fn resolve_time_window(low: Option<&str>, high: Option<&str>) -> Result<TimeWindow, CliError> {
    let (Some(low), Some(high)) = (low, high) else {
        return Err(CliError::MissingTimestampBounds);
    };

    let parse = |label: &str, input: &str| {
        parse_timestamp_utc(input)
            .ok_or_else(|| CliError::InvalidArgument(format!("Invalid {label} timestamp: {input}")))
    };
    let window = TimeWindow {
        low: parse("low", low)?,
        high: parse("high", high)?,
    };

    if window.low > window.high {
        return Err(CliError::InvalidArgument(format!(
            "low timestamp {} is after high timestamp {}",
            window.low, window.high
        )));
    }
    Ok(window)
}

/// SQL selecting the transfers schema's columns within `window`
pub fn transfers_sql(window: &TimeWindow) -> String {
    const FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
    format!(
        "SELECT\n    {}\nFROM {}\nWHERE block_timestamp BETWEEN '{}' AND '{}'",
        TRANSFERS.column_names().join(",\n    "),
        SOURCE_TABLE,
        window.low.format(FORMAT),
        window.high.format(FORMAT)
    )
}

/// Read the API key file, trimming surrounding whitespace
pub fn read_api_key(path: &Path) -> Result<String, CliError> {
    let key = std::fs::read_to_string(path).map_err(|e| {
        CliError::ConfigurationError(format!(
            "Failed to read API key file {}: {e}",
            path.display()
        ))
    })?;
    let key = key.trim();
    if key.is_empty() {
        return Err(CliError::ConfigurationError(format!(
            "API key file {} is empty",
            path.display()
        )));
    }
    Ok(key.to_string())
}

/// Submit, fetch, assemble, write Parquet and load into DuckDB
pub async fn run_ingest(api: Arc<dyn QueryApi>, plan: &IngestPlan) -> Result<IngestSummary, CliError> {
    info!("Running query...");
    let session = QuerySession::submit(api, &plan.sql, plan.schema, plan.options.clone())
        .await?
        .with_progress(create_progress_bar(plan.show_progress));

    info!("Fetching results...");
    let run = session.run().await?;
    let report = run.report;
    let table = run.table;
    let rows_assembled = table.num_rows();
    if !report.is_complete() {
        warn!(
            abandoned = ?report.abandoned_pages,
            missing_rows = report.missing_rows(),
            "Loading a partial result set"
        );
    }

    info!("Outputting Parquet...");
    let started = Instant::now();
    let parquet_file = plan.parquet_file.clone();
    let write = tokio::task::spawn_blocking(move || {
        ParquetTableWriter::new().write_table(&table, &parquet_file)
    })
    .await
    .map_err(|e| CliError::TaskError(e.to_string()))??;
    info!(
        rows = write.rows,
        elapsed_secs = started.elapsed().as_secs_f64(),
        "Parquet written to {}",
        plan.parquet_file.display()
    );

    info!("Loading Parquet into DuckDB...");
    let started = Instant::now();
    let schema = plan.schema;
    let db_file = plan.db_file.clone();
    let parquet_file = plan.parquet_file.clone();
    let load = tokio::task::spawn_blocking(move || -> Result<LoadReport, StoreError> {
        let mut store = Store::open(&db_file)?;
        store.create_table(schema)?;
        store.load_parquet(schema, &parquet_file)
    })
    .await
    .map_err(|e| CliError::TaskError(e.to_string()))??;
    metrics::record_rows_loaded(load.rows_inserted);
    info!(
        inserted = load.rows_inserted,
        skipped = load.rows_skipped,
        elapsed_secs = started.elapsed().as_secs_f64(),
        "Loaded into {}",
        plan.db_file.display()
    );

    Ok(IngestSummary {
        report,
        rows_assembled,
        write,
        load,
    })
}

/// Page progress bar; hidden when not requested
fn create_progress_bar(visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} pages ({percent}%)",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

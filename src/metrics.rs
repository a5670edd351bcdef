//! Ingestion metrics
//!
//! Counters and histograms are recorded through the `metrics` facade and are
//! no-ops unless a recorder is installed. [`init_metrics`] installs the
//! Prometheus exporter with a scrape listener.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: later calls are ignored.
///
/// # Arguments
/// * `addr` - Socket address for the scrape endpoint (e.g., "0.0.0.0:9090")
pub fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "pages_fetched_total",
        Unit::Count,
        "Pages whose rows were merged into the run"
    );
    describe_counter!(
        "pages_abandoned_total",
        Unit::Count,
        "Pages abandoned after rate limiting"
    );
    describe_counter!(
        "page_rate_limited_total",
        Unit::Count,
        "Page requests rejected with a rate limit"
    );
    describe_counter!(
        "rows_fetched_total",
        Unit::Count,
        "Rows merged from fetched pages"
    );
    describe_counter!(
        "rows_loaded_total",
        Unit::Count,
        "Rows inserted into the store"
    );
    describe_histogram!(
        "gate_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for a concurrency gate slot"
    );

    info!("Metrics system initialized on {}", addr);
    Ok(())
}

/// Record a merged page
pub fn record_page_fetched(rows: u64) {
    counter!("pages_fetched_total").increment(1);
    counter!("rows_fetched_total").increment(rows);
}

/// Record an abandoned page
pub fn record_page_abandoned() {
    counter!("pages_abandoned_total").increment(1);
}

/// Record a rate-limited page request
pub fn record_page_rate_limited() {
    counter!("page_rate_limited_total").increment(1);
}

/// Record time spent waiting on the concurrency gate
pub fn record_gate_wait(waited: Duration) {
    histogram!("gate_wait_seconds").record(waited.as_secs_f64());
}

/// Record rows inserted by a load
pub fn record_rows_loaded(rows: u64) {
    counter!("rows_loaded_total").increment(rows);
}

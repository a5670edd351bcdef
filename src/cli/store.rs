//! Store commands: create the transfers table and summarize its contents

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::DEFAULT_DB_FILE;
use crate::store::Store;
use crate::table::TRANSFERS;

/// Create the transfers table if it does not exist
#[derive(Debug, Args)]
pub struct InitCommand {
    /// DuckDB database file
    #[arg(long, env = "DB_FILE", default_value = DEFAULT_DB_FILE)]
    pub db_file: PathBuf,
}

/// Print row count, most frequent mints and rows per hour
#[derive(Debug, Args)]
pub struct VerifyCommand {
    /// DuckDB database file
    #[arg(long, env = "DB_FILE", default_value = DEFAULT_DB_FILE)]
    pub db_file: PathBuf,

    /// Number of mints to list
    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    /// Output format
    #[arg(long, default_value = "human")]
    pub format: OutputFormat,
}

/// Output format for the verify command
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

/// Snapshot of the stored transfers
#[derive(Debug, Clone, Serialize)]
pub struct StoreSummary {
    /// Rows in the table
    pub row_count: u64,
    /// Most frequent mints with their row counts
    pub top_mints: Vec<(Option<String>, i64)>,
    /// Rows per hour of block_timestamp; absent when the query is unsupported
    pub hourly: Option<Vec<(String, i64)>>,
}

impl InitCommand {
    /// Execute the init command
    pub async fn execute(&self) -> Result<()> {
        let db_file = self.db_file.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let store = Store::open(&db_file)
                .with_context(|| format!("Failed to open {}", db_file.display()))?;
            store.create_table(&TRANSFERS)?;
            Ok(())
        })
        .await
        .context("init task panicked")??;

        info!("Database {} initialized", self.db_file.display());
        Ok(())
    }
}

impl VerifyCommand {
    /// Execute the verify command
    pub async fn execute(&self) -> Result<()> {
        let db_file = self.db_file.clone();
        let limit = self.limit;
        let summary = tokio::task::spawn_blocking(move || summarize(&db_file, limit))
            .await
            .context("verify task panicked")??;

        match self.format {
            OutputFormat::Human => print!("{}", render_human(&summary)),
            OutputFormat::Json => {
                let output = json!({
                    "db_file": self.db_file.display().to_string(),
                    "table": TRANSFERS.table,
                    "summary": summary,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
        }
        Ok(())
    }
}

/// Collect the verify summary from a database file
pub fn summarize(db_file: &std::path::Path, limit: usize) -> Result<StoreSummary> {
    let store = Store::open(db_file)
        .with_context(|| format!("Failed to open {}", db_file.display()))?;
    store.create_table(&TRANSFERS)?;

    let row_count = store.row_count(&TRANSFERS)?;
    let top_mints = store.top_values(&TRANSFERS, "mint", limit)?;
    let hourly = match store.hourly_counts(&TRANSFERS) {
        Ok(hourly) => Some(hourly),
        Err(e) => {
            warn!("Hourly breakdown unavailable: {}", e);
            None
        }
    };

    Ok(StoreSummary {
        row_count,
        top_mints,
        hourly,
    })
}

fn render_human(summary: &StoreSummary) -> String {
    let mut out = format!("Rows: {}\n", summary.row_count);

    out.push_str("\nTop mints:\n");
    for (mint, count) in &summary.top_mints {
        out.push_str(&format!("  {:<48} {}\n", mint.as_deref().unwrap_or("<null>"), count));
    }

    if let Some(hourly) = &summary.hourly {
        out.push_str("\nRows per hour:\n");
        for (hour, count) in hourly {
            out.push_str(&format!("  {hour}  {count}\n"));
        }
    }
    out
}

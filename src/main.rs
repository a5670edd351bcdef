//! Main entry point for the solana-transfers-ingest CLI

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use solana_transfers_ingest::cli::{Cli, Commands};

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    // Check if JSON output is requested via environment variable
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("solana_transfers_ingest=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let command = Cli::parse().into_command().unwrap_or_else(|e| e.exit());

    let result = match command {
        Commands::Init(cmd) => cmd.execute().await,
        Commands::Ingest(cmd) => cmd
            .execute()
            .await
            .map(|summary| {
                info!(
                    pages = summary.report.total_pages,
                    abandoned = summary.report.abandoned_pages.len(),
                    rows = summary.rows_assembled,
                    inserted = summary.load.rows_inserted,
                    "Ingest finished"
                );
            })
            .map_err(|e| anyhow::anyhow!(e)),
        Commands::Verify(cmd) => cmd.execute().await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}

//! # Solana Transfers Ingest Library
//!
//! Extracts a large, page-paginated result set from the Flipside query API,
//! reassembles the pages into one typed, time-ordered table and loads it
//! idempotently into a local DuckDB database.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use solana_transfers_ingest::fetcher::flipside::FlipsideClient;
//! use solana_transfers_ingest::session::{QuerySession, SessionOptions};
//! use solana_transfers_ingest::table::TRANSFERS;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let api = Arc::new(FlipsideClient::new("https://api-v2.flipsidecrypto.xyz", "my-key"));
//! let session = QuerySession::submit(
//!     api,
//!     "SELECT * FROM solana.core.fact_transfers LIMIT 10",
//!     &TRANSFERS,
//!     SessionOptions::default(),
//! )
//! .await?;
//!
//! let run = session.run().await?;
//! println!("{} rows, complete: {}", run.table.num_rows(), run.report.is_complete());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`fetcher`] - Remote query API seam and the Flipside JSON-RPC client
//! - [`session`] - Query submission, bounded page fan-out, row accumulation
//! - [`table`] - Fixed schemas and assembly of raw rows into typed tables
//! - [`output`] - Intermediate Parquet file
//! - [`store`] - Idempotent DuckDB loads
//! - [`cli`] - `init`, `ingest` and `verify` commands

#![warn(missing_docs)]
#![warn(clippy::all)]

/// CLI command implementations
pub mod cli;

/// Configuration constants
pub mod config;

/// Remote query API access
pub mod fetcher;

/// Ingestion metrics
pub mod metrics;

/// Intermediate columnar output
pub mod output;

/// Query sessions and page fan-out
pub mod session;

/// DuckDB store
pub mod store;

/// Fixed schemas and table assembly
pub mod table;

/// One row as returned by the query API: untyped cells aligned to the
/// declared column list, `None` for nulls
pub type RawRow = Vec<Option<String>>;

// Re-export commonly used types
pub use session::{QueryDescriptor, QuerySession, RunReport, SessionOptions};
pub use table::{AssembledTable, FixedSchema, TRANSFERS};

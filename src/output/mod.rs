//! Intermediate columnar output for assembled tables

use std::path::Path;

use crate::table::AssembledTable;

pub mod parquet_writer;

pub use parquet_writer::ParquetTableWriter;

/// Output writer errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Arrow conversion error
    #[error("arrow error: {0}")]
    ArrowError(String),

    /// Parquet write error
    #[error("parquet error: {0}")]
    ParquetError(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Summary of a written file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    /// Rows written
    pub rows: usize,
    /// File size on disk, if it could be read back
    pub bytes_written: Option<u64>,
}

/// Writer that persists a whole assembled table to a file
pub trait TableWriter {
    /// Write `table` to `path`, replacing any existing file
    fn write_table(&self, table: &AssembledTable, path: &Path) -> OutputResult<WriteSummary>;
}

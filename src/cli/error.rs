//! CLI error types and conversions

use crate::output::OutputError;
use crate::session::SessionError;
use crate::store::StoreError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Session error (submission, fetch, assembly)
    #[error("session error: {0}")]
    SessionError(#[from] SessionError),

    /// Output error
    #[error("output error: {0}")]
    OutputError(#[from] OutputError),

    /// Store error
    #[error("store error: {0}")]
    StoreError(#[from] StoreError),

    /// LOW_TS / HIGH_TS not provided
    #[error("Please provide a low and high timestamp (LOW_TS and HIGH_TS)")]
    MissingTimestampBounds,

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Blocking task failed to complete
    #[error("task error: {0}")]
    TaskError(String),
}

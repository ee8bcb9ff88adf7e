//! CLI error types and conversions

use crate::metrics::MetricsError;
use crate::pipeline::BackfillError;
use crate::store::StoreError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Backfill halted
    #[error("backfill error: {0}")]
    BackfillError(#[from] BackfillError),

    /// Store query failed
    #[error("store error: {0}")]
    StoreError(#[from] StoreError),

    /// Metrics exporter could not start
    #[error("metrics error: {0}")]
    MetricsError(#[from] MetricsError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

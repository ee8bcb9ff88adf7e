//! Column store access
//!
//! The store is a ClickHouse server reached over its HTTP interface. Every
//! statement goes through [`KlineStore::execute`], which makes the client easy
//! to replace with an in-memory fake in tests.
//!
//! # Thread safety
//!
//! [`ClickHouseClient`] wraps a pooled `reqwest::Client` and is `Send + Sync`.
//! The download phase never touches the store; the load phase uses it from a
//! single task, so no statement is ever in flight concurrently with another.

use async_trait::async_trait;

pub mod clickhouse;
pub mod partition;
pub mod weekly;

pub use clickhouse::ClickHouseClient;
pub use partition::{drop_partition_sql, insert_sql, replace_partition, ReplaceOutcome};
pub use weekly::{weekly_bars, WeeklyBar};

/// Destination columns, in the order rows are serialized
pub const INSERT_COLUMNS: [&str; 13] = [
    "symbol",
    "open_ts",
    "ts_unit",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "close_ts",
    "quote_volume",
    "trade_count",
    "taker_buy_base_volume",
    "taker_buy_quote_volume",
];

/// Response bodies are cut to this many characters in errors
pub const MAX_ERROR_BODY_CHARS: usize = 700;

/// Store error messages that mean "nothing to drop"
const MISSING_PARTITION_MARKERS: [&str; 3] =
    ["doesn't exist", "does not exist", "No such partition"];

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Non-success HTTP status
    #[error("store returned HTTP {status}: {body}")]
    Http {
        /// Status code
        status: u16,
        /// Response body, truncated
        body: String,
    },

    /// Connection, timeout or body read failure
    #[error("store network error: {0}")]
    Network(String),

    /// A success response whose body could not be decoded
    #[error("invalid store response: {0}")]
    InvalidResponse(String),
}

impl StoreError {
    /// Build an HTTP error, truncating the body
    pub fn http(status: u16, body: &str) -> Self {
        StoreError::Http {
            status,
            body: truncate_chars(body, MAX_ERROR_BODY_CHARS),
        }
    }

    /// Whether the store reported that the partition (or table) does not exist
    pub fn is_missing_partition(&self) -> bool {
        match self {
            StoreError::Http { body, .. } => {
                MISSING_PARTITION_MARKERS.iter().any(|m| body.contains(m))
            }
            _ => false,
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Statement execution against the column store
#[async_trait]
pub trait KlineStore: Send + Sync {
    /// Run `query` against the configured database.
    ///
    /// `body` is sent as the request payload (insert rows); the response body
    /// is returned on success.
    async fn execute(&self, query: &str, body: Option<String>) -> StoreResult<String>;

    /// Destination table name
    fn table(&self) -> &str;
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

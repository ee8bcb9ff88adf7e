//! # Kline Backfill Library
//!
//! Bulk historical ingestion of Binance Vision monthly 1-minute spot kline
//! archives into a ClickHouse table.
//!
//! ## Pipeline
//!
//! 1. **Plan**: every `(symbol, month)` from the configured start up to the
//!    last fully elapsed calendar month becomes a [`plan::WorkUnit`].
//! 2. **Download**: archives are fetched concurrently into a local cache.
//!    Months that do not exist upstream are skipped silently, other failures
//!    are collected without aborting the run.
//! 3. **Load**: units are processed one at a time in plan order. Each unit
//!    drops its `(symbol, yyyymm)` partition and re-inserts the archive rows in
//!    bounded batches.
//!
//! ```no_run
//! use kline_backfill::config::BackfillConfig;
//! use kline_backfill::pipeline::BackfillExecutor;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BackfillConfig::default();
//! let executor = BackfillExecutor::from_config(&config)?;
//! let months = kline_backfill::plan::plan(config.start);
//! let summary = executor.run(&config.symbols, &months).await?;
//! println!("inserted {} rows", summary.total_inserted);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`plan`] - month range planning and partition keys
//! - [`fetcher`] - archive location and cached downloads
//! - [`downloader`] - concurrent download coordination
//! - [`transcode`] - archive decoding into [`KlineRecord`]s
//! - [`loader`] - batched inserts
//! - [`store`] - ClickHouse HTTP client and partition replacement
//! - [`pipeline`] - end-to-end orchestration

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::str::FromStr;

/// CLI command implementations
pub mod cli;

/// Typed runtime configuration
pub mod config;

/// Concurrent archive downloads
pub mod downloader;

/// Archive location and fetching
pub mod fetcher;

/// Batched loading into the store
pub mod loader;

/// Prometheus metrics
pub mod metrics;

/// Backfill orchestration
pub mod pipeline;

/// Month range planning
pub mod plan;

/// Graceful shutdown coordination
pub mod shutdown;

/// Column store client
pub mod store;

/// Archive transcoding
pub mod transcode;

/// Open timestamps at or above this value are microseconds.
pub const MICROS_THRESHOLD: i64 = 100_000_000_000_000;

/// Precision of the timestamps in one archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimestampUnit {
    /// Milliseconds since epoch
    #[serde(rename = "ms")]
    Millis,
    /// Microseconds since epoch
    #[serde(rename = "us")]
    Micros,
}

impl TimestampUnit {
    /// Classify an open timestamp by magnitude.
    pub fn detect(open_ts: i64) -> Self {
        if open_ts >= MICROS_THRESHOLD {
            TimestampUnit::Micros
        } else {
            TimestampUnit::Millis
        }
    }

    /// Store tag for this unit ("ms" or "us")
    pub fn as_str(&self) -> &'static str {
        match self {
            TimestampUnit::Millis => "ms",
            TimestampUnit::Micros => "us",
        }
    }
}

impl fmt::Display for TimestampUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimestampUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ms" => Ok(TimestampUnit::Millis),
            "us" => Ok(TimestampUnit::Micros),
            _ => Err(format!("Invalid timestamp unit: {s}")),
        }
    }
}

/// One normalized 1-minute kline row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KlineRecord {
    /// Trading symbol (e.g., "BTCUSDT")
    pub symbol: String,
    /// Open time, in `ts_unit`
    pub open_ts: i64,
    /// Unit of `open_ts` and `close_ts`
    pub ts_unit: TimestampUnit,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
    /// Base asset volume
    pub volume: f64,
    /// Close time, in `ts_unit`
    pub close_ts: i64,
    /// Quote asset volume
    pub quote_volume: f64,
    /// Number of trades
    pub trade_count: u64,
    /// Taker buy base asset volume
    pub taker_buy_base_volume: f64,
    /// Taker buy quote asset volume
    pub taker_buy_quote_volume: f64,
}

impl KlineRecord {
    /// Append this record as one tab-separated, newline-terminated row.
    ///
    /// Field order matches [`store::INSERT_COLUMNS`].
    pub fn write_tsv(&self, out: &mut String) {
        // Writing into a String cannot fail.
        let _ = writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.symbol,
            self.open_ts,
            self.ts_unit,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
            self.close_ts,
            self.quote_volume,
            self.trade_count,
            self.taker_buy_base_volume,
            self.taker_buy_quote_volume,
        );
    }

    /// Serialize to a standalone TSV row.
    pub fn to_tsv(&self) -> String {
        let mut row = String::with_capacity(160);
        self.write_tsv(&mut row);
        row
    }
}

//! Runtime configuration and defaults

use crate::plan::YearMonth;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Binance Vision monthly spot klines root
pub const DEFAULT_ARCHIVE_BASE_URL: &str = "https://data.binance.vision/data/spot/monthly/klines";

/// Kline interval of every archive this tool ingests
pub const INTERVAL: &str = "1m";

/// Default symbol list
pub const DEFAULT_SYMBOLS: &str = "BTCUSDT,ETHUSDT";

/// Default number of concurrent downloads
pub const DEFAULT_WORKERS: usize = 8;

/// Upper bound on concurrent downloads
pub const MAX_WORKERS: usize = 64;

/// Default HTTP timeout in seconds, applied to archive and store calls
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Default rows per insert
pub const DEFAULT_BATCH_LINES: usize = 80_000;

/// Download failures listed individually in the run summary
pub const MAX_REPORTED_FAILURES: usize = 20;

/// ClickHouse HTTP endpoint settings
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Host name
    pub host: String,
    /// HTTP port
    pub port: u16,
    /// Database the queries are scoped to
    pub database: String,
    /// Destination table
    pub table: String,
    /// Optional user name
    pub user: Option<String>,
    /// Optional password
    pub password: Option<String>,
}

impl StoreConfig {
    /// Base URL of the HTTP interface
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "clickhouse".to_string(),
            port: 8123,
            database: "crypto".to_string(),
            table: "spot_klines_1m".to_string(),
            user: None,
            password: None,
        }
    }
}

/// Everything a backfill run needs
#[derive(Debug, Clone)]
pub struct BackfillConfig {
    /// Symbols in processing order
    pub symbols: Vec<String>,
    /// Archive root, without symbol or interval
    pub archive_base_url: String,
    /// First month to ingest
    pub start: YearMonth,
    /// Concurrent downloads
    pub workers: usize,
    /// Timeout for every network call
    pub http_timeout: Duration,
    /// Local archive cache directory
    pub download_dir: PathBuf,
    /// Rows per insert call
    pub batch_lines: usize,
    /// Verify archives against their published CHECKSUM files
    pub verify_checksum: bool,
    /// Prometheus exporter listen address
    pub metrics_addr: Option<SocketAddr>,
    /// Store endpoint
    pub store: StoreConfig,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            symbols: parse_symbols(DEFAULT_SYMBOLS),
            archive_base_url: DEFAULT_ARCHIVE_BASE_URL.to_string(),
            start: YearMonth {
                year: 2017,
                month: 1,
            },
            workers: DEFAULT_WORKERS,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            download_dir: PathBuf::from("/data/downloads"),
            batch_lines: DEFAULT_BATCH_LINES,
            verify_checksum: false,
            metrics_addr: None,
            store: StoreConfig::default(),
        }
    }
}

/// Split a comma-separated symbol list: trimmed, upper-cased, empties and
/// repeats dropped. First occurrence keeps its position.
pub fn parse_symbols(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}

//! Argument groups shared between commands

use clap::Args;

use super::CliError;
use crate::config::{
    parse_symbols, StoreConfig, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_SYMBOLS, MAX_WORKERS,
};
use crate::plan::YearMonth;

/// Parse and validate the download worker count
pub fn parse_workers(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("workers must be at least 1".to_string());
    }
    if value > MAX_WORKERS {
        return Err(format!("workers {value} exceeds maximum of {MAX_WORKERS}"));
    }
    Ok(value)
}

/// Parse a strictly positive integer
pub fn parse_positive(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("value must be at least 1".to_string()),
        Ok(v) => Ok(v),
        Err(_) => Err(format!("'{s}' is not a valid number")),
    }
}

/// Symbols and start month
#[derive(Args, Debug, Clone)]
pub struct RangeArgs {
    /// Comma-separated symbols, processed in this order
    #[arg(long, env = "SYMBOLS", default_value = DEFAULT_SYMBOLS)]
    pub symbols: String,

    /// First year to backfill
    #[arg(long, env = "START_YEAR", default_value_t = 2017)]
    pub start_year: i32,

    /// First month to backfill (1-12)
    #[arg(
        long,
        env = "START_MONTH",
        default_value_t = 1,
        value_parser = clap::value_parser!(u32).range(1..=12)
    )]
    pub start_month: u32,
}

impl RangeArgs {
    /// Normalized symbol list; empty is an error
    pub fn symbols(&self) -> Result<Vec<String>, CliError> {
        let symbols = parse_symbols(&self.symbols);
        if symbols.is_empty() {
            return Err(CliError::InvalidArgument(
                "at least one symbol is required".to_string(),
            ));
        }
        Ok(symbols)
    }

    /// Start month
    pub fn start(&self) -> Result<YearMonth, CliError> {
        YearMonth::new(self.start_year, self.start_month).ok_or_else(|| {
            CliError::InvalidArgument(format!("invalid start month: {}", self.start_month))
        })
    }
}

/// ClickHouse connection
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// ClickHouse host
    #[arg(long, env = "CLICKHOUSE_HOST", default_value = "clickhouse")]
    pub clickhouse_host: String,

    /// ClickHouse HTTP port
    #[arg(long, env = "CLICKHOUSE_HTTP_PORT", default_value_t = 8123)]
    pub clickhouse_port: u16,

    /// Database
    #[arg(long, env = "CLICKHOUSE_DB", default_value = "crypto")]
    pub clickhouse_db: String,

    /// Destination table
    #[arg(long, env = "CLICKHOUSE_TABLE", default_value = "spot_klines_1m")]
    pub clickhouse_table: String,

    /// User name (sent as X-ClickHouse-User)
    #[arg(long, env = "CLICKHOUSE_USER")]
    pub clickhouse_user: Option<String>,

    /// Password (sent as X-ClickHouse-Key)
    #[arg(long, env = "CLICKHOUSE_PASSWORD", hide_env_values = true)]
    pub clickhouse_password: Option<String>,

    /// HTTP timeout in seconds for archive and store calls
    #[arg(
        long,
        env = "HTTP_TIMEOUT",
        default_value_t = DEFAULT_HTTP_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub http_timeout: u64,
}

impl StoreArgs {
    /// Store endpoint configuration
    pub fn to_config(&self) -> StoreConfig {
        StoreConfig {
            host: self.clickhouse_host.clone(),
            port: self.clickhouse_port,
            database: self.clickhouse_db.clone(),
            table: self.clickhouse_table.clone(),
            user: self.clickhouse_user.clone().filter(|u| !u.is_empty()),
            password: self.clickhouse_password.clone().filter(|p| !p.is_empty()),
        }
    }
}

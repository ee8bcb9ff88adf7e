//! Weekly report command

use clap::Args;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::warn;

use super::args::StoreArgs;
use super::{Cli, CliError, OutputFormat};
use crate::store::weekly::{DEFAULT_WEEKS, MAX_WEEKS, MIN_WEEKS};
use crate::store::{weekly_bars, ClickHouseClient, WeeklyBar};

/// Rows shown by the human table
const HUMAN_TAIL_ROWS: usize = 50;

/// Weekly command arguments
#[derive(Args, Debug, Clone)]
pub struct WeeklyArgs {
    /// Symbol to aggregate
    #[arg(long, env = "SYMBOL", default_value = "BTCUSDT")]
    pub symbol: String,

    /// Weeks to show (20-400)
    #[arg(
        long,
        default_value_t = DEFAULT_WEEKS,
        value_parser = clap::value_parser!(u32).range(MIN_WEEKS as i64..=MAX_WEEKS as i64)
    )]
    pub weeks: u32,

    /// ClickHouse connection
    #[command(flatten)]
    pub store: StoreArgs,
}

impl WeeklyArgs {
    /// Query and print weekly bars
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let symbol = self.symbol.trim().to_uppercase();
        let client = ClickHouseClient::new(
            &self.store.to_config(),
            Duration::from_secs(self.store.http_timeout),
        )?;

        let bars = weekly_bars(&client, &symbol, self.weeks).await?;

        match cli.output_format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(&bars)
                    .map_err(|e| CliError::ConfigurationError(e.to_string()))?;
                println!("{json}");
            }
            OutputFormat::Human => {
                if bars.is_empty() {
                    warn!("No data returned. Check symbol/table and ClickHouse connection.");
                    println!("No data returned for {symbol}.");
                } else {
                    print!("{}", render_table(&symbol, &bars));
                }
            }
        }
        Ok(())
    }
}

/// Most recent weeks as a fixed-width table, oldest first
pub fn render_table(symbol: &str, bars: &[WeeklyBar]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{symbol} weekly OHLCV ({} weeks)", bars.len());
    let _ = writeln!(
        out,
        "{:<10} {:>14} {:>14} {:>14} {:>14} {:>18} {:>12}",
        "week", "open", "high", "low", "close", "volume", "trades"
    );
    let skip = bars.len().saturating_sub(HUMAN_TAIL_ROWS);
    for bar in &bars[skip..] {
        let _ = writeln!(
            out,
            "{:<10} {:>14.2} {:>14.2} {:>14.2} {:>14.2} {:>18.4} {:>12}",
            bar.week_start, bar.open, bar.high, bar.low, bar.close, bar.volume, bar.trades
        );
    }
    out
}

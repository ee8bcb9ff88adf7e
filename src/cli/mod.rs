//! CLI command implementations
//!
//! Every option can also be supplied through the environment variable named
//! in its help text; flags win over the environment.

use clap::{Parser, Subcommand};
use std::str::FromStr;

pub mod args;
pub mod backfill;
pub mod error;
pub mod plan;
pub mod weekly;

pub use args::{RangeArgs, StoreArgs};
pub use backfill::BackfillArgs;
pub use error::CliError;
pub use plan::PlanArgs;
pub use weekly::WeeklyArgs;

/// Kline backfill CLI
#[derive(Parser, Debug)]
#[command(name = "kline-backfill")]
#[command(
    about = "Backfill Binance Vision monthly 1m spot klines into ClickHouse",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download archives and load them into ClickHouse
    Backfill(BackfillArgs),

    /// Print the months and work units a backfill would process
    Plan(PlanArgs),

    /// Print weekly OHLCV aggregated from the loaded table
    Weekly(WeeklyArgs),
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

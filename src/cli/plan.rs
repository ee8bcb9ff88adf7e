//! Plan command: show what a backfill would do, without network access

use clap::Args;
use serde::Serialize;
use std::fmt::Write as _;

use super::args::RangeArgs;
use super::{Cli, CliError, OutputFormat};
use crate::plan::{self, work_units, YearMonth};

/// Plan command arguments
#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    /// Symbols and start month
    #[command(flatten)]
    pub range: RangeArgs,
}

/// Planned work, as printed
#[derive(Debug, Serialize)]
pub struct PlanReport {
    /// Symbols in processing order
    pub symbols: Vec<String>,
    /// First planned month
    pub first: Option<YearMonth>,
    /// Last planned month
    pub last: Option<YearMonth>,
    /// Number of months
    pub months: usize,
    /// Number of `(symbol, month)` units
    pub units: usize,
}

impl PlanReport {
    /// Build the report for `symbols` over `months`
    pub fn new(symbols: Vec<String>, months: &[YearMonth]) -> Self {
        let units = work_units(&symbols, months).len();
        Self {
            symbols,
            first: months.first().copied(),
            last: months.last().copied(),
            months: months.len(),
            units,
        }
    }

    /// Human-readable rendering
    pub fn render_human(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Symbols: {}", self.symbols.join(", "));
        match (self.first, self.last) {
            (Some(first), Some(last)) => {
                let _ = writeln!(out, "Months: {} ({first}..{last})", self.months);
            }
            _ => {
                let _ = writeln!(out, "Months: 0 (start is after the last completed month)");
            }
        }
        let _ = writeln!(out, "Work units: {}", self.units);
        out
    }
}

impl PlanArgs {
    /// Print the plan
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let symbols = self.range.symbols()?;
        let months = plan::plan(self.range.start()?);
        let report = PlanReport::new(symbols, &months);

        match cli.output_format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(&report)
                    .map_err(|e| CliError::ConfigurationError(e.to_string()))?;
                println!("{json}");
            }
            OutputFormat::Human => print!("{}", report.render_human()),
        }
        Ok(())
    }
}

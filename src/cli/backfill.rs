//! Backfill command implementation

use clap::Args;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use super::args::{parse_positive, parse_workers, RangeArgs, StoreArgs};
use super::{Cli, CliError, OutputFormat};
use crate::config::{
    BackfillConfig, DEFAULT_ARCHIVE_BASE_URL, DEFAULT_BATCH_LINES, DEFAULT_WORKERS,
    MAX_REPORTED_FAILURES,
};
use crate::pipeline::{BackfillExecutor, BackfillSummary, UnitFailure};
use crate::plan;
use crate::shutdown::SharedShutdown;

/// Backfill command arguments
#[derive(Args, Debug, Clone)]
pub struct BackfillArgs {
    /// Symbols and start month
    #[command(flatten)]
    pub range: RangeArgs,

    /// ClickHouse connection
    #[command(flatten)]
    pub store: StoreArgs,

    /// Archive root URL (without symbol and interval)
    #[arg(long, env = "ARCHIVE_BASE_URL", default_value = DEFAULT_ARCHIVE_BASE_URL)]
    pub archive_base_url: String,

    /// Concurrent downloads (1-64)
    #[arg(long, env = "DL_WORKERS", default_value_t = DEFAULT_WORKERS, value_parser = parse_workers)]
    pub workers: usize,

    /// Local archive cache directory
    #[arg(long, env = "DOWNLOAD_DIR", default_value = "/data/downloads")]
    pub download_dir: PathBuf,

    /// Rows per insert
    #[arg(long, env = "BATCH_LINES", default_value_t = DEFAULT_BATCH_LINES, value_parser = parse_positive)]
    pub batch_lines: usize,

    /// Verify fresh downloads against their published CHECKSUM files
    #[arg(long, env = "VERIFY_CHECKSUM")]
    pub verify_checksum: bool,

    /// Serve Prometheus metrics on this address (e.g. 0.0.0.0:9090)
    #[arg(long, env = "METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,

    /// Show a progress bar during downloads
    #[arg(long)]
    pub progress: bool,
}

impl BackfillArgs {
    /// Typed configuration for this run
    pub fn to_config(&self) -> Result<BackfillConfig, CliError> {
        Ok(BackfillConfig {
            symbols: self.range.symbols()?,
            archive_base_url: self.archive_base_url.clone(),
            start: self.range.start()?,
            workers: self.workers,
            http_timeout: Duration::from_secs(self.store.http_timeout),
            download_dir: self.download_dir.clone(),
            batch_lines: self.batch_lines,
            verify_checksum: self.verify_checksum,
            metrics_addr: self.metrics_addr,
            store: self.store.to_config(),
        })
    }

    /// Execute the backfill.
    ///
    /// Download and decode failures are reported but leave the exit status
    /// clean; only a store failure returns an error.
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let config = self.to_config()?;

        std::fs::create_dir_all(&config.download_dir).map_err(|e| {
            CliError::ConfigurationError(format!(
                "cannot create download directory {}: {e}",
                config.download_dir.display()
            ))
        })?;

        if let Some(addr) = config.metrics_addr {
            crate::metrics::init_metrics(addr)?;
        }

        let months = plan::plan(config.start);
        if months.is_empty() {
            warn!(start = %config.start, "Start month is after the last completed month");
        }
        info!(
            symbols = ?config.symbols,
            months = months.len(),
            units = config.symbols.len() * months.len(),
            store = %config.store.endpoint(),
            table = %config.store.table,
            "Starting backfill"
        );

        let executor = BackfillExecutor::from_config(&config)?
            .with_shutdown(shutdown)
            .with_progress(self.progress);
        let summary = executor.run(&config.symbols, &months).await?;

        match cli.output_format {
            OutputFormat::Json => output_json(&summary),
            OutputFormat::Human => print!("{}", render_human(&summary)),
        }
        Ok(())
    }
}

fn output_json(summary: &BackfillSummary) {
    match serde_json::to_string_pretty(summary) {
        Ok(json) => println!("{json}"),
        Err(e) => warn!(error = %e, "Failed to serialize summary"),
    }
}

fn write_failures(out: &mut String, failures: &[UnitFailure]) {
    for failure in failures.iter().take(MAX_REPORTED_FAILURES) {
        let _ = writeln!(
            out,
            "  - {} {}: {}",
            failure.unit.symbol, failure.unit.month, failure.error
        );
    }
    if failures.len() > MAX_REPORTED_FAILURES {
        let _ = writeln!(out, "  ... and {} more", failures.len() - MAX_REPORTED_FAILURES);
    }
}

/// Human-readable run summary
pub fn render_human(summary: &BackfillSummary) -> String {
    let mut out = String::new();
    let headline = if summary.cancelled {
        "Backfill cancelled (rerun to continue)"
    } else {
        "Backfill completed"
    };
    let _ = writeln!(out, "\n{headline}");
    let _ = writeln!(out, "Planned units: {}", summary.planned);
    let _ = writeln!(out, "Downloaded: {}", summary.downloaded);
    let _ = writeln!(out, "Not published (404): {}", summary.absent);
    let _ = writeln!(out, "Download failures: {}", summary.download_failures.len());
    write_failures(&mut out, &summary.download_failures);
    let _ = writeln!(out, "Partitions loaded: {}", summary.partitions_loaded);
    if !summary.load_failures.is_empty() {
        let _ = writeln!(out, "Load failures: {}", summary.load_failures.len());
        write_failures(&mut out, &summary.load_failures);
    }
    let _ = writeln!(out, "Total inserted: {}", summary.total_inserted);
    out
}

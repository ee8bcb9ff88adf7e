//! Bounded fan-out over the fetcher

use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info};

use super::DownloadReport;
use crate::fetcher::{ArchiveFetcher, ArchiveHandle, FetcherResult};
use crate::metrics;
use crate::plan::WorkUnit;

/// Runs fetches for many units with a fixed concurrency width
#[derive(Debug, Clone)]
pub struct DownloadCoordinator {
    fetcher: ArchiveFetcher,
    workers: usize,
    show_progress: bool,
}

impl DownloadCoordinator {
    /// Create a coordinator; a zero width is treated as 1.
    pub fn new(fetcher: ArchiveFetcher, workers: usize) -> Self {
        Self {
            fetcher,
            workers: workers.max(1),
            show_progress: false,
        }
    }

    /// Show a terminal progress bar while downloading
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    /// Concurrency width
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Fetch every unit, at most `workers` at a time, and collect all outcomes.
    pub async fn download_all(&self, units: &[WorkUnit]) -> DownloadReport {
        info!(
            units = units.len(),
            workers = self.workers,
            "Starting downloads (missing months are skipped)"
        );

        let progress = self.show_progress.then(|| create_progress_bar(units.len() as u64));

        let outcomes: Vec<(WorkUnit, FetcherResult<ArchiveHandle>)> =
            stream::iter(units.iter().cloned())
                .map(|unit| {
                    let fetcher = self.fetcher.clone();
                    async move {
                        let outcome = fetcher.fetch(&unit).await;
                        (unit, outcome)
                    }
                })
                .buffer_unordered(self.workers)
                .inspect(|(unit, outcome)| {
                    log_outcome(unit, outcome);
                    if let Some(pb) = &progress {
                        pb.set_message(unit.to_string());
                        pb.inc(1);
                    }
                })
                .collect()
                .await;

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        let mut report = DownloadReport::default();
        for (unit, outcome) in outcomes {
            report.record(unit, outcome);
        }
        report.sort_failures();

        info!(
            total = report.total(),
            downloaded = report.downloaded(),
            absent = report.absent(),
            failed = report.failed(),
            "Downloads finished"
        );
        report
    }
}

fn log_outcome(unit: &WorkUnit, outcome: &FetcherResult<ArchiveHandle>) {
    match outcome {
        Ok(handle) => {
            metrics::record_download("downloaded");
            info!(
                symbol = %unit.symbol,
                month = %unit.month,
                bytes = handle.size(),
                "Downloaded"
            );
        }
        Err(e) if e.is_not_found() => {
            metrics::record_download("absent");
            debug!(symbol = %unit.symbol, month = %unit.month, "Archive not published, skipping");
        }
        Err(e) => {
            metrics::record_download("failed");
            error!(symbol = %unit.symbol, month = %unit.month, error = %e, "Download failed");
        }
    }
}

fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

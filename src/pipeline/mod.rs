//! Backfill orchestration
//!
//! # Unit lifecycle
//!
//! ```text
//! PLANNED -> DOWNLOADING -> SKIPPED_ABSENT
//!                        -> DOWNLOAD_FAILED
//!                        -> DOWNLOADED -> REPLACING_PARTITION -> LOADING -> DONE
//!                                                                        -> LOAD_FAILED
//! ```
//!
//! Downloads run concurrently across all units. Replace and load run strictly
//! one unit at a time, symbols in configured order and months in calendar
//! order, so no two partitions are ever mutated concurrently and only one
//! store statement is in flight.
//!
//! # Failure policy
//!
//! | Failure | Effect |
//! |---|---|
//! | archive absent upstream | unit skipped |
//! | other download error | unit skipped, reported in the summary |
//! | archive cannot be decoded | unit marked `LOAD_FAILED`, run continues |
//! | store error (drop or insert) | run halts with [`BackfillError::Store`] |

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{BackfillConfig, MAX_REPORTED_FAILURES};
use crate::downloader::{DownloadCoordinator, DownloadReport};
use crate::fetcher::{ArchiveFetcher, ArchiveHandle, ArchiveLocator, ReqwestTransport};
use crate::loader::{BatchedLoader, LoadError};
use crate::metrics::UnitLoadMetrics;
use crate::plan::{work_units, WorkUnit, YearMonth};
use crate::shutdown::SharedShutdown;
use crate::store::{replace_partition, ClickHouseClient, KlineStore, StoreError};

/// Errors that stop a backfill run
#[derive(Debug, thiserror::Error)]
pub enum BackfillError {
    /// Clients could not be constructed
    #[error("setup failed: {0}")]
    Setup(String),

    /// The store rejected a drop or insert; the load phase stops here
    #[error("store error while loading {unit} ({inserted} rows inserted before): {source}")]
    Store {
        /// Unit being loaded
        unit: WorkUnit,
        /// Rows inserted by earlier units in this run
        inserted: u64,
        /// Store failure
        #[source]
        source: StoreError,
    },
}

/// Per-unit state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitState {
    /// Generated by the planner
    Planned,
    /// Fetch submitted
    Downloading,
    /// Archive does not exist upstream
    SkippedAbsent,
    /// Fetch failed
    DownloadFailed,
    /// Archive cached
    Downloaded,
    /// Dropping the unit's partition
    ReplacingPartition,
    /// Inserting rows
    Loading,
    /// Loaded
    Done,
    /// Archive could not be decoded
    LoadFailed,
}

impl UnitState {
    /// Whether `next` directly follows `self` in the lifecycle
    pub fn can_transition_to(self, next: UnitState) -> bool {
        use UnitState::*;
        matches!(
            (self, next),
            (Planned, Downloading)
                | (Downloading, SkippedAbsent | DownloadFailed | Downloaded)
                | (Downloaded, ReplacingPartition)
                | (ReplacingPartition, Loading)
                | (Loading, Done | LoadFailed)
        )
    }

    /// Whether no further transition can happen
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UnitState::SkippedAbsent
                | UnitState::DownloadFailed
                | UnitState::Done
                | UnitState::LoadFailed
        )
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnitState::Planned => "PLANNED",
            UnitState::Downloading => "DOWNLOADING",
            UnitState::SkippedAbsent => "SKIPPED_ABSENT",
            UnitState::DownloadFailed => "DOWNLOAD_FAILED",
            UnitState::Downloaded => "DOWNLOADED",
            UnitState::ReplacingPartition => "REPLACING_PARTITION",
            UnitState::Loading => "LOADING",
            UnitState::Done => "DONE",
            UnitState::LoadFailed => "LOAD_FAILED",
        };
        f.write_str(name)
    }
}

/// Where one unit ended up
#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    /// The unit
    #[serde(flatten)]
    pub unit: WorkUnit,
    /// Last state reached
    pub state: UnitState,
    /// Rows inserted for this unit
    pub rows: u64,
}

impl UnitReport {
    fn new(unit: WorkUnit) -> Self {
        Self {
            unit,
            state: UnitState::Planned,
            rows: 0,
        }
    }

    fn advance(&mut self, next: UnitState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        debug!(unit = %self.unit, from = %self.state, to = %next, "Unit state");
        self.state = next;
    }
}

/// A unit that failed, with its error text
#[derive(Debug, Clone, Serialize)]
pub struct UnitFailure {
    /// The unit
    #[serde(flatten)]
    pub unit: WorkUnit,
    /// Error message
    pub error: String,
}

/// Result of a completed (or cancelled) run
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackfillSummary {
    /// Units planned
    pub planned: usize,
    /// Units with a cached archive
    pub downloaded: usize,
    /// Units absent upstream
    pub absent: usize,
    /// Units whose download failed
    pub download_failures: Vec<UnitFailure>,
    /// Partitions replaced and loaded
    pub partitions_loaded: usize,
    /// Units whose archive could not be decoded
    pub load_failures: Vec<UnitFailure>,
    /// Rows inserted across all units
    pub total_inserted: u64,
    /// Whether the load phase stopped early on shutdown
    pub cancelled: bool,
    /// Every unit in load order
    pub units: Vec<UnitReport>,
}

/// Runs download and load phases
pub struct BackfillExecutor {
    coordinator: DownloadCoordinator,
    store: Arc<dyn KlineStore>,
    loader: BatchedLoader,
    shutdown: Option<SharedShutdown>,
}

impl fmt::Debug for BackfillExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackfillExecutor")
            .field("coordinator", &self.coordinator)
            .field("loader", &self.loader)
            .finish_non_exhaustive()
    }
}

impl BackfillExecutor {
    /// Assemble an executor from its parts
    pub fn new(
        coordinator: DownloadCoordinator,
        store: Arc<dyn KlineStore>,
        batch_lines: usize,
    ) -> Self {
        let loader = BatchedLoader::new(store.clone(), batch_lines);
        Self {
            coordinator,
            store,
            loader,
            shutdown: None,
        }
    }

    /// Build HTTP clients for the archive source and ClickHouse from `config`
    pub fn from_config(config: &BackfillConfig) -> Result<Self, BackfillError> {
        let transport = ReqwestTransport::new(config.http_timeout)
            .map_err(|e| BackfillError::Setup(e.to_string()))?;
        let fetcher = ArchiveFetcher::new(
            Arc::new(transport),
            ArchiveLocator::new(&config.archive_base_url, &config.download_dir),
        )
        .with_checksum_verification(config.verify_checksum);
        let coordinator = DownloadCoordinator::new(fetcher, config.workers);

        let store = ClickHouseClient::new(&config.store, config.http_timeout)
            .map_err(|e| BackfillError::Setup(e.to_string()))?;

        Ok(Self::new(coordinator, Arc::new(store), config.batch_lines))
    }

    /// Stop the load phase between units once shutdown is requested
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Show a progress bar during downloads
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.coordinator = self.coordinator.with_progress(enabled);
        self
    }

    /// Run the download phase, or `None` if shutdown is requested first.
    ///
    /// In-flight fetches are dropped on shutdown. Only renamed archives count
    /// as cached, so a dropped fetch is simply repeated by the next run.
    async fn download_or_cancel(&self, units: &[WorkUnit]) -> Option<DownloadReport> {
        let Some(shutdown) = &self.shutdown else {
            return Some(self.coordinator.download_all(units).await);
        };
        tokio::select! {
            biased;
            _ = shutdown.wait_for_shutdown() => None,
            report = self.coordinator.download_all(units) => Some(report),
        }
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|s| s.is_shutdown_requested())
    }

    /// Backfill every `(symbol, month)` pair.
    pub async fn run(
        &self,
        symbols: &[String],
        months: &[YearMonth],
    ) -> Result<BackfillSummary, BackfillError> {
        let units = work_units(symbols, months);
        match (months.first(), months.last()) {
            (Some(first), Some(last)) => info!(
                symbols = ?symbols,
                months = months.len(),
                first = %first,
                last = %last,
                workers = self.coordinator.workers(),
                "Backfill planned"
            ),
            _ => warn!(symbols = ?symbols, "No months to backfill"),
        }

        let mut summary = BackfillSummary {
            planned: units.len(),
            units: units.iter().cloned().map(UnitReport::new).collect(),
            ..Default::default()
        };

        for report in &mut summary.units {
            report.advance(UnitState::Downloading);
        }
        let Some(mut downloads) = self.download_or_cancel(&units).await else {
            warn!(planned = units.len(), "Shutdown requested during downloads, nothing loaded");
            summary.cancelled = true;
            return Ok(summary);
        };

        summary.downloaded = downloads.downloaded();
        summary.absent = downloads.absent();
        for report in &mut summary.units {
            let next = if downloads.handle(&report.unit).is_some() {
                UnitState::Downloaded
            } else if downloads.absences.contains(&report.unit) {
                UnitState::SkippedAbsent
            } else {
                UnitState::DownloadFailed
            };
            report.advance(next);
        }

        if !downloads.failures.is_empty() {
            warn!(
                failed = downloads.failed(),
                "Some downloads failed (not 404), those months are skipped"
            );
            for (unit, e) in downloads.failures.iter().take(MAX_REPORTED_FAILURES) {
                warn!(symbol = %unit.symbol, month = %unit.month, error = %e, "Download failure");
            }
        }
        summary.download_failures = downloads
            .failures
            .drain(..)
            .map(|(unit, e)| UnitFailure {
                unit,
                error: e.to_string(),
            })
            .collect();

        for idx in 0..summary.units.len() {
            if summary.units[idx].state != UnitState::Downloaded {
                continue;
            }
            if self.shutdown_requested() {
                warn!(
                    total_inserted = summary.total_inserted,
                    "Shutdown requested, stopping before next unit"
                );
                summary.cancelled = true;
                break;
            }

            let unit = summary.units[idx].unit.clone();
            let Some(handle) = downloads.handle(&unit) else {
                continue;
            };

            let outcome = self.load_unit(&mut summary.units[idx], handle).await;
            match outcome {
                Ok(rows) => {
                    summary.total_inserted += rows;
                    summary.partitions_loaded += 1;
                    info!(
                        symbol = %unit.symbol,
                        month = %unit.month,
                        rows,
                        cumulative = summary.total_inserted,
                        "Inserted"
                    );
                }
                Err(LoadError::Store(source)) => {
                    error!(unit = %unit, error = %source, "Store error, stopping load phase");
                    return Err(BackfillError::Store {
                        unit,
                        inserted: summary.total_inserted,
                        source,
                    });
                }
                Err(e) => {
                    error!(symbol = %unit.symbol, month = %unit.month, error = %e, "Load failed");
                    summary.load_failures.push(UnitFailure {
                        unit,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            total_inserted = summary.total_inserted,
            partitions = summary.partitions_loaded,
            load_failures = summary.load_failures.len(),
            "Backfill done"
        );
        Ok(summary)
    }

    /// Replace one partition and load its archive
    async fn load_unit(
        &self,
        report: &mut UnitReport,
        handle: &ArchiveHandle,
    ) -> Result<u64, LoadError> {
        let unit = report.unit.clone();
        let metrics = UnitLoadMetrics::start(&unit.symbol);
        info!(symbol = %unit.symbol, month = %unit.month, "Loading (drop partition, then insert)");

        report.advance(UnitState::ReplacingPartition);
        if let Err(e) = replace_partition(self.store.as_ref(), &unit.partition_key()).await {
            metrics.record_failed();
            return Err(e.into());
        }

        report.advance(UnitState::Loading);
        match self.loader.load_archive(handle, &unit.symbol).await {
            Ok(rows) => {
                report.advance(UnitState::Done);
                report.rows = rows;
                metrics.record_done();
                Ok(rows)
            }
            Err(e) => {
                if !e.is_fatal() {
                    report.advance(UnitState::LoadFailed);
                }
                metrics.record_failed();
                Err(e)
            }
        }
    }
}

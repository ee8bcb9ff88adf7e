//! Concurrent archive downloads
//!
//! The download phase fans every [`WorkUnit`] out to an [`ArchiveFetcher`]
//! with bounded concurrency and gathers every outcome before returning.
//!
//! # Outcomes
//!
//! - **downloaded**: the archive is cached and an [`ArchiveHandle`] is kept
//! - **absent**: upstream answered 404; the unit is skipped without noise
//! - **failed**: any other error; logged and collected, never fatal
//!
//! One unit's failure never cancels or delays another unit. Completion order
//! is whatever the scheduler produces; the report is keyed by unit, so
//! aggregation does not depend on it.
//!
//! [`ArchiveFetcher`]: crate::fetcher::ArchiveFetcher

use std::collections::{BTreeSet, HashMap};

use crate::fetcher::{ArchiveHandle, FetcherError};
use crate::plan::WorkUnit;

pub mod coordinator;

pub use coordinator::DownloadCoordinator;

/// Aggregated result of the download phase
#[derive(Debug, Default)]
pub struct DownloadReport {
    /// Units whose archive is cached
    pub handles: HashMap<WorkUnit, ArchiveHandle>,
    /// Units whose archive does not exist upstream
    pub absences: BTreeSet<WorkUnit>,
    /// Units that failed for any other reason
    pub failures: Vec<(WorkUnit, FetcherError)>,
}

impl DownloadReport {
    /// Record one fetch outcome
    pub fn record(&mut self, unit: WorkUnit, outcome: Result<ArchiveHandle, FetcherError>) {
        match outcome {
            Ok(handle) => {
                self.handles.insert(unit, handle);
            }
            Err(e) if e.is_not_found() => {
                self.absences.insert(unit);
            }
            Err(e) => self.failures.push((unit, e)),
        }
    }

    /// Number of units with a cached archive
    pub fn downloaded(&self) -> usize {
        self.handles.len()
    }

    /// Number of expected absences
    pub fn absent(&self) -> usize {
        self.absences.len()
    }

    /// Number of hard failures
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Total outcomes recorded
    pub fn total(&self) -> usize {
        self.downloaded() + self.absent() + self.failed()
    }

    /// Handle for `unit`, if it was downloaded
    pub fn handle(&self, unit: &WorkUnit) -> Option<&ArchiveHandle> {
        self.handles.get(unit)
    }

    /// Sort failures in plan order for stable reporting
    pub fn sort_failures(&mut self) {
        self.failures.sort_by(|a, b| a.0.cmp(&b.0));
    }
}

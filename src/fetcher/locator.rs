//! Archive naming and cache layout
//!
//! URL pattern:
//! `{base}/{SYMBOL}/1m/{SYMBOL}-1m-{YYYY}-{MM}.zip`
//!
//! Cache files use the same canonical name, flat inside the cache directory.

use crate::config::INTERVAL;
use crate::plan::WorkUnit;
use std::path::PathBuf;

/// Where one monthly archive lives remotely and locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLocation {
    /// Remote archive URL
    pub remote_url: String,
    /// Local cache file
    pub cache_path: PathBuf,
    /// File name shared by both (e.g., "BTCUSDT-1m-2024-01.zip")
    pub canonical_name: String,
}

/// Pure mapping from work units to archive locations
#[derive(Debug, Clone)]
pub struct ArchiveLocator {
    base_url: String,
    cache_dir: PathBuf,
}

impl ArchiveLocator {
    /// Create a locator; a trailing slash on `base_url` is ignored.
    pub fn new(base_url: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            cache_dir: cache_dir.into(),
        }
    }

    /// Cache directory
    pub fn cache_dir(&self) -> &std::path::Path {
        &self.cache_dir
    }

    /// Locate the archive for `unit`
    pub fn locate(&self, unit: &WorkUnit) -> ArchiveLocation {
        let canonical_name = format!(
            "{}-{}-{:04}-{:02}.zip",
            unit.symbol, INTERVAL, unit.month.year, unit.month.month
        );
        let remote_url = format!(
            "{}/{}/{}/{}",
            self.base_url, unit.symbol, INTERVAL, canonical_name
        );
        let cache_path = self.cache_dir.join(&canonical_name);

        ArchiveLocation {
            remote_url,
            cache_path,
            canonical_name,
        }
    }
}

/// CHECKSUM companion URL of an archive
pub fn checksum_url(archive_url: &str) -> String {
    format!("{archive_url}.CHECKSUM")
}

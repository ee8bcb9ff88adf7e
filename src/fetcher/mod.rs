//! Archive fetching
//!
//! - [`locator`] derives the remote URL and cache path of a monthly archive
//! - [`archive`] guarantees an archive is present in the local cache
//! - [`http`] is the `reqwest` implementation of [`ArchiveTransport`]

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

pub mod archive;
pub mod http;
pub mod locator;

pub use archive::ArchiveFetcher;
pub use http::ReqwestTransport;
pub use locator::{ArchiveLocation, ArchiveLocator};

/// Fetcher errors
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// The archive does not exist upstream. Expected for months before a
    /// symbol was listed; callers skip the unit.
    #[error("archive not found: {url}")]
    NotFound {
        /// Requested URL
        url: String,
    },

    /// Non-success HTTP status other than 404
    #[error("HTTP {status} for {url}")]
    Http {
        /// Requested URL
        url: String,
        /// Response status code
        status: u16,
    },

    /// Connection, timeout or body read failure
    #[error("network error for {url}: {message}")]
    Network {
        /// Requested URL
        url: String,
        /// Underlying error
        message: String,
    },

    /// Cache file IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Upstream answered with an empty body
    #[error("empty archive body: {url}")]
    EmptyArchive {
        /// Requested URL
        url: String,
    },

    /// CHECKSUM file could not be fetched or parsed
    #[error("checksum error: {0}")]
    Checksum(String),

    /// Checksum validation failed
    #[error("checksum validation failed for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Archive URL
        url: String,
        /// Published SHA-256
        expected: String,
        /// SHA-256 of the downloaded bytes
        actual: String,
    },
}

impl FetcherError {
    /// Whether this is the expected "does not exist upstream" outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetcherError::NotFound { .. })
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Raw HTTP response handed back by a transport
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Full response body
    pub body: Bytes,
}

impl TransportResponse {
    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP GET seam used by the fetcher.
///
/// Implementations only report transport-level failures as errors; status
/// classification happens in [`ArchiveFetcher`].
#[async_trait]
pub trait ArchiveTransport: Send + Sync {
    /// GET `url` and return its status and body
    async fn get(&self, url: &str) -> FetcherResult<TransportResponse>;
}

/// A locally cached archive known to exist with positive size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHandle {
    path: PathBuf,
    size: u64,
}

impl ArchiveHandle {
    /// Build a handle from an existing file, `None` if missing or empty.
    pub async fn from_existing(path: &Path) -> Option<Self> {
        let metadata = tokio::fs::metadata(path).await.ok()?;
        (metadata.is_file() && metadata.len() > 0).then(|| Self {
            path: path.to_path_buf(),
            size: metadata.len(),
        })
    }

    /// Cached archive path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }
}

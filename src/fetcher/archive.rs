//! Cached archive fetcher
//!
//! Guarantees a monthly archive is present in the local cache:
//!
//! 1. A cache file that exists with positive size is reused, no network call.
//! 2. Otherwise the archive is downloaded in full. 404 maps to
//!    [`FetcherError::NotFound`], any other non-2xx status to
//!    [`FetcherError::Http`].
//! 3. When verification is enabled, the body is checked against the published
//!    `.CHECKSUM` file before anything touches the cache.
//! 4. The body is written to `<name>.part` and renamed into place, so an
//!    interrupted write never leaves a file the cache check would accept.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::locator::{checksum_url, ArchiveLocator};
use super::{ArchiveHandle, ArchiveTransport, FetcherError, FetcherResult, TransportResponse};
use crate::plan::WorkUnit;

/// Downloads archives into the cache directory
#[derive(Clone)]
pub struct ArchiveFetcher {
    transport: Arc<dyn ArchiveTransport>,
    locator: ArchiveLocator,
    verify_checksum: bool,
}

impl std::fmt::Debug for ArchiveFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveFetcher")
            .field("locator", &self.locator)
            .field("verify_checksum", &self.verify_checksum)
            .finish_non_exhaustive()
    }
}

impl ArchiveFetcher {
    /// Create a fetcher without checksum verification
    pub fn new(transport: Arc<dyn ArchiveTransport>, locator: ArchiveLocator) -> Self {
        Self {
            transport,
            locator,
            verify_checksum: false,
        }
    }

    /// Enable or disable CHECKSUM verification of fresh downloads
    pub fn with_checksum_verification(mut self, enabled: bool) -> Self {
        self.verify_checksum = enabled;
        self
    }

    /// Ensure the archive for `unit` is cached and return its handle.
    pub async fn fetch(&self, unit: &WorkUnit) -> FetcherResult<ArchiveHandle> {
        let location = self.locator.locate(unit);

        if let Some(handle) = ArchiveHandle::from_existing(&location.cache_path).await {
            debug!(
                unit = %unit,
                path = %location.cache_path.display(),
                bytes = handle.size(),
                "Archive already cached"
            );
            return Ok(handle);
        }

        let response = self.transport.get(&location.remote_url).await?;
        let body = classify(&location.remote_url, response)?;

        if body.is_empty() {
            return Err(FetcherError::EmptyArchive {
                url: location.remote_url,
            });
        }

        if self.verify_checksum {
            let expected = self.download_checksum(&location.remote_url).await?;
            validate_checksum(&location.remote_url, &expected, &body)?;
        }

        write_atomically(&location.cache_path, &body).await?;

        info!(
            unit = %unit,
            path = %location.cache_path.display(),
            bytes = body.len(),
            "Archive downloaded"
        );

        ArchiveHandle::from_existing(&location.cache_path)
            .await
            .ok_or_else(|| {
                FetcherError::Io(format!(
                    "archive missing after write: {}",
                    location.cache_path.display()
                ))
            })
    }

    /// Fetch and parse the CHECKSUM companion file.
    ///
    /// Format is `"<sha256>  <filename>"` or just `"<sha256>"`.
    async fn download_checksum(&self, archive_url: &str) -> FetcherResult<String> {
        let url = checksum_url(archive_url);
        debug!(url = %url, "Downloading CHECKSUM");

        let response = self.transport.get(&url).await?;
        let body = classify(&url, response)
            .map_err(|e| FetcherError::Checksum(format!("CHECKSUM download failed: {e}")))?;

        let text = String::from_utf8_lossy(&body);
        let hash = text
            .split_whitespace()
            .next()
            .ok_or_else(|| FetcherError::Checksum(format!("empty CHECKSUM file: {url}")))?
            .to_lowercase();

        Ok(hash)
    }
}

/// Map a response status to the body or a typed error
fn classify(url: &str, response: TransportResponse) -> FetcherResult<bytes::Bytes> {
    match response.status {
        404 => Err(FetcherError::NotFound {
            url: url.to_string(),
        }),
        _ if response.is_success() => Ok(response.body),
        status => Err(FetcherError::Http {
            url: url.to_string(),
            status,
        }),
    }
}

/// Hex SHA-256 of `data`
pub fn compute_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn validate_checksum(url: &str, expected: &str, data: &[u8]) -> FetcherResult<()> {
    let actual = compute_sha256(data);
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(FetcherError::ChecksumMismatch {
            url: url.to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    debug!(url = %url, "Checksum validation passed");
    Ok(())
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn write_atomically(path: &Path, data: &[u8]) -> FetcherResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| FetcherError::Io(format!("create {}: {e}", parent.display())))?;
    }

    let tmp = part_path(path);
    if let Err(e) = tokio::fs::write(&tmp, data).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(FetcherError::Io(format!("write {}: {e}", tmp.display())));
    }

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        warn!(path = %tmp.display(), error = %e, "Failed to move archive into place");
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(FetcherError::Io(format!("rename {}: {e}", tmp.display())));
    }

    Ok(())
}

//! `reqwest` transport for archive downloads
//!
//! One client is built per run and shared by every download task; the client
//! pools connections internally, so clones are cheap.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::{ArchiveTransport, FetcherError, FetcherResult, TransportResponse};

/// Connect timeout, bounded by the overall request timeout
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;

/// HTTP GET transport backed by a pooled [`reqwest::Client`]
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> FetcherResult<Self> {
        let connect_timeout = timeout.min(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS));
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| FetcherError::Network {
                url: String::new(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArchiveTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> FetcherResult<TransportResponse> {
        let network = |e: reqwest::Error| FetcherError::Network {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(network)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(network)?;

        debug!(url = %url, status, bytes = body.len(), "GET completed");
        Ok(TransportResponse { status, body })
    }
}

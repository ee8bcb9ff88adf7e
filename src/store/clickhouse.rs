//! ClickHouse HTTP interface client
//!
//! Statements are POSTed to the server root with `database` and `query` URL
//! parameters; insert rows travel in the request body.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::{KlineStore, StoreError, StoreResult};
use crate::config::StoreConfig;

/// ClickHouse client bound to one database and table
#[derive(Debug, Clone)]
pub struct ClickHouseClient {
    client: Client,
    endpoint: String,
    database: String,
    table: String,
    user: Option<String>,
    password: Option<String>,
}

impl ClickHouseClient {
    /// Build a client whose calls time out after `timeout`.
    pub fn new(config: &StoreConfig, timeout: Duration) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint(),
            database: config.database.clone(),
            table: config.table.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }
}

#[async_trait]
impl KlineStore for ClickHouseClient {
    async fn execute(&self, query: &str, body: Option<String>) -> StoreResult<String> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .query(&[("database", self.database.as_str()), ("query", query)]);

        if let Some(user) = &self.user {
            request = request.header("X-ClickHouse-User", user);
        }
        if let Some(password) = &self.password {
            request = request.header("X-ClickHouse-Key", password);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(StoreError::http(status.as_u16(), &text));
        }

        debug!(status = status.as_u16(), bytes = text.len(), "Store statement completed");
        Ok(text)
    }

    fn table(&self) -> &str {
        &self.table
    }
}

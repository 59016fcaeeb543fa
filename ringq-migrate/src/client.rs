//! Upstream migration endpoint client
//!
//! `POST {backend}{migrate_path}` with a JSON body; the backend answers with
//! a chunked `text/event-stream` body which is handed to the relay as raw
//! byte chunks.

use crate::error::{RelayError, RelayResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, info};

/// Raw body chunks of one migration response
pub type MigrationStream = BoxStream<'static, RelayResult<Bytes>>;

/// Longest slice of an error response body kept in the error message
const MAX_ERROR_BODY: usize = 512;

/// Opens migration streams
///
/// The run controller only depends on this trait; tests substitute
/// scripted streams.
#[async_trait]
pub trait MigrationTransport: Send + Sync {
    /// Start a migration and return its response body stream
    ///
    /// Connection failures and non-2xx statuses are `RelayError::Transport`.
    async fn open(&self, request: &serde_json::Value) -> RelayResult<MigrationStream>;
}

/// reqwest-based client for the backend migration endpoint
#[derive(Clone)]
pub struct MigrationClient {
    client: reqwest::Client,
    endpoint: String,
}

impl MigrationClient {
    /// `timeout` is the caller-supplied deadline for a whole migration
    /// request; `None` leaves the stream unbounded.
    pub fn new(base_url: &str, migrate_path: &str, timeout: Option<Duration>) -> RelayResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: join_url(base_url, migrate_path),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl MigrationTransport for MigrationClient {
    async fn open(&self, request: &serde_json::Value) -> RelayResult<MigrationStream> {
        info!(endpoint = %self.endpoint, "Starting backend migration");

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut text = response.text().await.unwrap_or_default();
            if text.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
            }
            return Err(RelayError::Transport(format!(
                "backend returned {}: {}",
                status,
                text.trim()
            )));
        }

        debug!(endpoint = %self.endpoint, %status, "Migration stream opened");

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(RelayError::from))
            .boxed())
    }
}

fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

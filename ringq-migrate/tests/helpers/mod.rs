//! Shared fixtures for ringq-migrate integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use ringq_migrate::client::{MigrationStream, MigrationTransport};
use ringq_migrate::config::Settings;
use ringq_migrate::milestones::MilestoneTable;
use ringq_migrate::{AppState, RelayError, RelayResult};
use std::sync::{Arc, Mutex};

/// A complete, successful backend run
pub const SUCCESSFUL_RUN: &[&str] = &[
    "data: Connecting to Google API...\n\n",
    "data: Starting parallel data loading (3 sheets)\n\n",
    "data: Loaded sheet 'Überweisungen' ✓\n\n",
    "data: Starting merge\n\n",
    "data: Copying 1204 records to DB\n\n",
    "data: Updating existing records: 17\n\n",
    "data: Inserting new records: 5\n\n",
    "data: Migration completed successfully!\n\n",
];

/// Transport replaying fixed chunks and recording every request body
pub struct ScriptedTransport {
    chunks: Vec<Bytes>,
    hang_after: bool,
    pub requests: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl ScriptedTransport {
    pub fn new(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks
                .iter()
                .map(|c| Bytes::copy_from_slice(c.as_bytes()))
                .collect(),
            hang_after: false,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Keep the stream open after the last chunk
    pub fn hanging(mut self) -> Self {
        self.hang_after = true;
        self
    }
}

#[async_trait]
impl MigrationTransport for ScriptedTransport {
    async fn open(&self, request: &serde_json::Value) -> RelayResult<MigrationStream> {
        self.requests.lock().unwrap().push(request.clone());
        let items: Vec<RelayResult<Bytes>> = self.chunks.iter().cloned().map(Ok).collect();
        let stream = futures::stream::iter(items);
        if self.hang_after {
            Ok(stream.chain(futures::stream::pending()).boxed())
        } else {
            Ok(stream.boxed())
        }
    }
}

/// Transport whose backend is unreachable
pub struct RefusingTransport;

#[async_trait]
impl MigrationTransport for RefusingTransport {
    async fn open(&self, _request: &serde_json::Value) -> RelayResult<MigrationStream> {
        Err(RelayError::Transport("connection refused".to_string()))
    }
}

pub fn test_settings() -> Settings {
    Settings {
        backend_url: "http://127.0.0.1:9".to_string(),
        migrate_path: "/migrate".to_string(),
        timeout: None,
        port: 0,
        event_capacity: 256,
        milestones: MilestoneTable::builtin(),
    }
}

pub fn app_state(transport: impl MigrationTransport + 'static) -> AppState {
    AppState::with_transport(Arc::new(transport), &test_settings())
}

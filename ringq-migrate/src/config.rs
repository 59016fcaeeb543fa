//! Runtime settings for ringq-migrate
//!
//! Resolves every value with CLI → ENV → TOML → default priority (see
//! [`ringq_common::config::resolve_value`]) and validates the result once,
//! at startup.

use crate::error::{RelayError, RelayResult};
use crate::milestones::MilestoneTable;
use ringq_common::config::{
    resolve_value, TomlConfig, DEFAULT_BACKEND_URL, DEFAULT_EVENT_CAPACITY, DEFAULT_MIGRATE_PATH,
    DEFAULT_PORT, ENV_BACKEND_URL, ENV_PORT, ENV_TIMEOUT_SECS,
};
use std::time::Duration;
use tracing::info;

/// Values given on the command line (all optional)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub backend_url: Option<String>,
    pub port: Option<u16>,
    pub timeout_secs: Option<u64>,
}

/// Fully resolved settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub backend_url: String,
    pub migrate_path: String,
    /// Deadline for one whole migration request; `None` waits indefinitely
    pub timeout: Option<Duration>,
    pub port: u16,
    pub event_capacity: usize,
    pub milestones: MilestoneTable,
}

impl Settings {
    pub fn resolve(toml: &TomlConfig, cli: &CliOverrides) -> RelayResult<Self> {
        let backend_url = resolve_value(
            cli.backend_url.clone(),
            ENV_BACKEND_URL,
            toml.backend.url.clone(),
            DEFAULT_BACKEND_URL.to_string(),
        );
        if !(backend_url.starts_with("http://") || backend_url.starts_with("https://")) {
            return Err(RelayError::Config(format!(
                "backend URL must start with http:// or https://, got {:?}",
                backend_url
            )));
        }

        let migrate_path = toml
            .backend
            .migrate_path
            .clone()
            .unwrap_or_else(|| DEFAULT_MIGRATE_PATH.to_string());

        // 0 means no deadline
        let timeout_secs: u64 =
            resolve_value(cli.timeout_secs, ENV_TIMEOUT_SECS, toml.backend.timeout_secs, 0);
        let timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));

        let port = resolve_value(cli.port, ENV_PORT, toml.server.port, DEFAULT_PORT);

        let event_capacity = toml.server.event_capacity.unwrap_or(DEFAULT_EVENT_CAPACITY);
        if event_capacity == 0 {
            return Err(RelayError::Config("event_capacity must be at least 1".to_string()));
        }

        let milestones = MilestoneTable::resolve(toml.milestones.as_ref())?;

        info!(
            backend_url = %backend_url,
            migrate_path = %migrate_path,
            timeout_secs,
            port,
            milestone_table = milestones.version(),
            "Settings resolved"
        );

        Ok(Self {
            backend_url,
            migrate_path,
            timeout,
            port,
            event_capacity,
            milestones,
        })
    }
}

//! Bootstrap configuration loading and value resolution
//!
//! Configuration values are resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing or unreadable TOML file never prevents startup: a warning is
//! logged and compiled defaults apply.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Default backend base URL
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:5000";
/// Default path of the backend migration endpoint
pub const DEFAULT_MIGRATE_PATH: &str = "/migrate";
/// Default port of the local relay API
pub const DEFAULT_PORT: u16 = 5780;
/// Default EventBus capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 1000;

/// Environment variable overriding the backend base URL
pub const ENV_BACKEND_URL: &str = "RINGQ_BACKEND_URL";
/// Environment variable overriding the local API port
pub const ENV_PORT: &str = "RINGQ_PORT";
/// Environment variable overriding the migration deadline (seconds, 0 = none)
pub const ENV_TIMEOUT_SECS: &str = "RINGQ_TIMEOUT_SECS";

/// Bootstrap configuration loaded from TOML file
///
/// Every section is optional; absent values fall back to compiled defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Upstream migration backend
    #[serde(default)]
    pub backend: BackendConfig,

    /// Local relay API
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Milestone table override (built-in table is used when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestones: Option<MilestoneTableConfig>,
}

/// Upstream backend settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL, e.g. `http://127.0.0.1:5000`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Path of the migration endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrate_path: Option<String>,

    /// Deadline for a whole migration request, in seconds (none by default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Local relay API settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Number of relay events buffered for slow subscribers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_capacity: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Milestone table as written in the TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneTableConfig {
    pub version: u32,
    pub error_token: String,
    #[serde(default)]
    pub milestones: Vec<MilestoneConfig>,
}

/// One `pattern = percent` row of the milestone table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneConfig {
    pub pattern: String,
    pub percent: u8,
}

/// Platform config file location: `<config_dir>/ringq/ringq-migrate.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ringq").join("ringq-migrate.toml"))
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load config from `path` (or the platform default location)
///
/// Never fails: a missing file yields defaults silently, an unreadable or
/// malformed file yields defaults with a warning.
pub fn load_or_default(path: Option<&Path>) -> TomlConfig {
    let path = match path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(p) => p,
        None => {
            warn!("Could not determine config directory, using defaults");
            return TomlConfig::default();
        }
    };

    if !path.exists() {
        debug!("No config file at {}, using defaults", path.display());
        return TomlConfig::default();
    }

    match load_toml_config(&path) {
        Ok(config) => {
            info!("Loaded configuration from {}", path.display());
            config
        }
        Err(e) => {
            warn!("{}; using defaults", e);
            TomlConfig::default()
        }
    }
}

/// Write config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Resolve one configuration value by priority: CLI → ENV → TOML → default
///
/// An environment value that fails to parse is ignored with a warning.
pub fn resolve_value<T>(cli: Option<T>, env_var_name: &str, toml: Option<T>, default: T) -> T
where
    T: FromStr,
{
    if let Some(value) = cli {
        debug!("{}: using command-line value", env_var_name);
        return value;
    }

    if let Ok(raw) = std::env::var(env_var_name) {
        match raw.parse::<T>() {
            Ok(value) => {
                debug!("{}: using environment value", env_var_name);
                return value;
            }
            Err(_) => warn!("Ignoring unparseable {}={:?}", env_var_name, raw),
        }
    }

    if let Some(value) = toml {
        debug!("{}: using TOML value", env_var_name);
        return value;
    }

    default
}

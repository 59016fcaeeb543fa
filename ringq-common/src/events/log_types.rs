//! Log and terminal types carried by relay events

use serde::{Deserialize, Serialize};

/// One message extracted from a migration stream frame
///
/// Created once per surfaced frame and never mutated afterwards; a run's
/// log only ever grows by appending entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Wall-clock time of receipt (RFC 3339, UTC)
    pub timestamp: String,
    /// Frame payload text
    pub message: String,
}

impl LogEntry {
    /// Create an entry stamped with the current wall-clock time
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            timestamp: crate::time::wall_clock(),
            message: message.into(),
        }
    }
}

/// How a migration run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalState {
    Completed,
    Failed,
}

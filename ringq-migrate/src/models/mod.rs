//! Data models for ringq-migrate
//!
//! Migration run state machine and the per-run log.

pub mod run_state;

pub use ringq_common::events::{LogEntry, TerminalState};
pub use run_state::{MigrationRunState, RunStatus};

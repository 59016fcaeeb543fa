//! Migration run state machine
//!
//! Idle → Running → Completed | Failed. Completed and Failed are terminal;
//! the only way back to Running is a fresh run replacing the state.

use chrono::{DateTime, Utc};
use ringq_common::events::{LogEntry, RelayEvent, TerminalState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a migration run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    /// No run started yet
    Idle,
    /// Stream is being consumed
    Running,
    /// Stream ended cleanly without an error frame
    Completed,
    /// Error frame, transport failure or cancellation
    Failed,
}

/// State of one migration run
///
/// Owned by whoever drives the run: passed into the relay, mutated per
/// frame, and handed back when the run ends. Starting a new run builds a
/// new value; nothing carries over from the previous run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRunState {
    /// Unique run identifier
    pub run_id: Uuid,

    /// Current lifecycle status
    pub status: RunStatus,

    /// Coarse progress (0-100), never decreases within a run
    pub progress: u8,

    /// Log entries in frame arrival order
    pub log: Vec<LogEntry>,

    /// True while the run is Running
    pub running: bool,

    /// Failure description once the run failed
    pub error: Option<String>,

    /// Run start time
    pub started_at: Option<DateTime<Utc>>,

    /// Run end time (if completed/failed)
    pub ended_at: Option<DateTime<Utc>>,
}

impl Default for MigrationRunState {
    fn default() -> Self {
        Self::idle()
    }
}

impl MigrationRunState {
    /// State before any run has started
    pub fn idle() -> Self {
        Self {
            run_id: Uuid::nil(),
            status: RunStatus::Idle,
            progress: 0,
            log: Vec::new(),
            running: false,
            error: None,
            started_at: None,
            ended_at: None,
        }
    }

    /// Fresh Running state for a new run (progress 0, empty log)
    pub fn start(run_id: Uuid) -> Self {
        Self {
            run_id,
            status: RunStatus::Running,
            running: true,
            started_at: Some(Utc::now()),
            ..Self::idle()
        }
    }

    /// Check if run is terminal (finished)
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, RunStatus::Completed | RunStatus::Failed)
    }

    /// True once an error was recorded; progress is frozen from then on
    pub fn has_failed(&self) -> bool {
        self.status == RunStatus::Failed
    }

    /// Append an entry to the log
    pub fn append_log(&mut self, entry: LogEntry) {
        self.log.push(entry);
    }

    /// Raise progress to `candidate` if that is an increase
    ///
    /// Ignored outside Running, so nothing after a failure can suggest
    /// success. Returns whether progress changed.
    pub fn advance_progress(&mut self, candidate: u8) -> bool {
        if self.status != RunStatus::Running {
            return false;
        }
        let candidate = candidate.min(100);
        if candidate > self.progress {
            self.progress = candidate;
            true
        } else {
            false
        }
    }

    /// Running → Failed
    ///
    /// Returns false (and keeps the first error) if the run was not Running.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.status != RunStatus::Running {
            return false;
        }
        self.status = RunStatus::Failed;
        self.running = false;
        self.error = Some(error.into());
        self.ended_at = Some(Utc::now());
        true
    }

    /// Running → Completed, forcing progress to 100
    ///
    /// Returns false if the run was not Running.
    pub fn complete(&mut self) -> bool {
        if self.status != RunStatus::Running {
            return false;
        }
        self.status = RunStatus::Completed;
        self.running = false;
        self.progress = 100;
        self.error = None;
        self.ended_at = Some(Utc::now());
        true
    }

    /// Terminal kind, if the run has ended
    pub fn terminal(&self) -> Option<TerminalState> {
        match self.status {
            RunStatus::Completed => Some(TerminalState::Completed),
            RunStatus::Failed => Some(TerminalState::Failed),
            RunStatus::Idle | RunStatus::Running => None,
        }
    }

    /// Build the downstream event describing the current state
    pub fn event(
        &self,
        new_log_entry: Option<LogEntry>,
        terminal: Option<TerminalState>,
    ) -> RelayEvent {
        RelayEvent {
            run_id: self.run_id,
            progress: self.progress,
            new_log_entry,
            terminal,
            error: self.error.clone(),
        }
    }

    /// Fold one relay event into this state
    ///
    /// Lets an observer (status endpoint, UI store) mirror a run from its
    /// event stream alone. An event from a different run replaces the state.
    pub fn apply(&mut self, event: &RelayEvent) {
        if event.run_id != self.run_id || self.status == RunStatus::Idle {
            *self = Self::start(event.run_id);
        }

        if let Some(entry) = &event.new_log_entry {
            self.log.push(entry.clone());
        }

        if let Some(error) = &event.error {
            self.fail(error.clone());
        } else if self.status == RunStatus::Running {
            self.advance_progress(event.progress);
        }

        if event.terminal == Some(TerminalState::Completed) {
            self.complete();
        }
    }
}

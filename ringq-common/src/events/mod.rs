//! Relay event types and EventBus
//!
//! The relay publishes one [`RelayEvent`] per processed frame plus one per
//! terminal transition. Subscribers (a UI log panel, the local SSE endpoint,
//! the CLI renderer) receive them through [`EventBus`].

mod log_types;

pub use log_types::{LogEntry, TerminalState};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Incremental update delivered to whatever renders migration progress
///
/// Serialized in camelCase with absent optionals omitted:
/// `{"runId":…,"progress":50,"newLogEntry":{…}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayEvent {
    /// Run this event belongs to
    pub run_id: Uuid,

    /// Progress after this event (0-100)
    pub progress: u8,

    /// Log entry appended by this event, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_log_entry: Option<LogEntry>,

    /// Set once, on the event that ends the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal: Option<TerminalState>,

    /// Run error, present from the moment the run failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RelayEvent {
    /// SSE event name: `terminal` for the final event, `progress` otherwise
    pub fn event_type(&self) -> &'static str {
        if self.terminal.is_some() {
            "terminal"
        } else {
            "progress"
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }
}

/// Broadcast bus for relay events
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block the relay)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RelayEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use ringq_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(1000);
    /// assert_eq!(event_bus.capacity(), 1000);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all current subscribers
    ///
    /// Having no subscribers is not an error; the event is simply dropped.
    pub fn emit_lossy(&self, event: RelayEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

//! Migration run controller
//!
//! Owns the single active migration run. Starting a run while another is
//! still active is rejected with [`RelayError::RunInProgress`]; the caller
//! must cancel (or wait for) the active run first.

use crate::client::MigrationTransport;
use crate::error::{RelayError, RelayResult};
use crate::models::MigrationRunState;
use crate::relay::StreamRelay;
use ringq_common::events::RelayEvent;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

const LOST_RUN_TASK: &str = "Migration run task ended without a result";

/// Handle on the most recently started run
struct RunHandle {
    run_id: Uuid,
    cancel: CancellationToken,
    /// `Some(final state)` once the run task finished
    done: watch::Receiver<Option<MigrationRunState>>,
}

impl RunHandle {
    fn is_active(&self) -> bool {
        // A closed channel without a result means the run task panicked
        self.done.borrow().is_none() && self.done.has_changed().is_ok()
    }
}

/// Starts, cancels and observes migration runs, one at a time
#[derive(Clone)]
pub struct MigrationController {
    transport: Arc<dyn MigrationTransport>,
    relay: StreamRelay,
    current: Arc<Mutex<Option<RunHandle>>>,
    /// Live view of the current run, folded from relay events
    mirror: Arc<RwLock<MigrationRunState>>,
}

impl MigrationController {
    /// Must be called inside a tokio runtime (spawns the mirror task)
    pub fn new(transport: Arc<dyn MigrationTransport>, relay: StreamRelay) -> Self {
        let mirror = Arc::new(RwLock::new(MigrationRunState::idle()));
        tokio::spawn(mirror_events(relay.events().subscribe(), Arc::clone(&mirror)));

        Self {
            transport,
            relay,
            current: Arc::new(Mutex::new(None)),
            mirror,
        }
    }

    /// Subscribe to relay events of all future runs
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.relay.events().subscribe()
    }

    /// Start a new run; rejected while another run is active
    pub async fn start(&self, request: serde_json::Value) -> RelayResult<Uuid> {
        let mut current = self.current.lock().await;
        if let Some(handle) = current.as_ref() {
            if handle.is_active() {
                warn!(active_run = %handle.run_id, "Rejected migration start: run in progress");
                return Err(RelayError::RunInProgress(handle.run_id));
            }
        }

        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(None);

        *current = Some(RunHandle {
            run_id,
            cancel: cancel.clone(),
            done: done_rx,
        });
        drop(current);

        info!(run_id = %run_id, "Migration run started");

        let transport = Arc::clone(&self.transport);
        let relay = self.relay.clone();
        tokio::spawn(async move {
            let final_state = execute_run(transport, relay, run_id, request, cancel).await;
            info!(
                run_id = %run_id,
                status = ?final_state.status,
                progress = final_state.progress,
                "Migration run finished"
            );
            let _ = done_tx.send(Some(final_state));
        });

        Ok(run_id)
    }

    /// Cancel the active run
    pub async fn cancel(&self) -> RelayResult<Uuid> {
        let current = self.current.lock().await;
        match current.as_ref() {
            Some(handle) if handle.is_active() => {
                info!(run_id = %handle.run_id, "Cancelling migration run");
                handle.cancel.cancel();
                Ok(handle.run_id)
            }
            _ => Err(RelayError::NoActiveRun),
        }
    }

    /// Wait for the most recent run to finish and return its final state
    pub async fn wait(&self) -> RelayResult<MigrationRunState> {
        let mut done = {
            let current = self.current.lock().await;
            match current.as_ref() {
                Some(handle) => handle.done.clone(),
                None => return Err(RelayError::NoActiveRun),
            }
        };

        let final_state = done
            .wait_for(Option::is_some)
            .await
            .map_err(|_| {
                RelayError::Common(ringq_common::Error::Internal(LOST_RUN_TASK.to_string()))
            })?
            .clone();

        final_state.ok_or_else(|| {
            RelayError::Common(ringq_common::Error::Internal(
                "Migration run finished without state".to_string(),
            ))
        })
    }

    /// True while a run is in progress
    pub async fn is_active(&self) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .map(RunHandle::is_active)
            .unwrap_or(false)
    }

    /// Snapshot of the current or most recent run, `None` before the first run
    ///
    /// A finished run reports its authoritative final state; an active run
    /// reports the live view built from its events.
    pub async fn status(&self) -> Option<MigrationRunState> {
        let (run_id, active) = {
            let current = self.current.lock().await;
            let handle = current.as_ref()?;
            if let Some(final_state) = handle.done.borrow().as_ref() {
                return Some(final_state.clone());
            }
            (handle.run_id, handle.is_active())
        };

        let mirror = self.mirror.read().await;
        let mut state = if mirror.run_id == run_id {
            mirror.clone()
        } else {
            // Run task has not published its first event yet
            MigrationRunState::start(run_id)
        };
        if !active {
            state.fail(LOST_RUN_TASK);
        }
        Some(state)
    }
}

async fn execute_run(
    transport: Arc<dyn MigrationTransport>,
    relay: StreamRelay,
    run_id: Uuid,
    request: serde_json::Value,
    cancel: CancellationToken,
) -> MigrationRunState {
    let mut state = MigrationRunState::start(run_id);

    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RelayError::Cancelled),
        opened = transport.open(&request) => opened,
    };

    match opened {
        Ok(stream) => relay.run(state, stream, &cancel).await,
        Err(e) => {
            relay.terminate(&mut state, &e);
            state
        }
    }
}

async fn mirror_events(
    mut rx: broadcast::Receiver<RelayEvent>,
    mirror: Arc<RwLock<MigrationRunState>>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => mirror.write().await.apply(&event),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Status mirror lagged behind relay events");
            }
            Err(RecvError::Closed) => {
                debug!("Relay event bus closed, status mirror stopping");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MigrationStream;
    use crate::milestones::MilestoneTable;
    use crate::models::RunStatus;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::StreamExt;
    use ringq_common::events::EventBus;

    /// Transport replaying fixed chunks, optionally never finishing
    struct ScriptedTransport {
        chunks: Vec<&'static str>,
        hang_after: bool,
    }

    #[async_trait]
    impl MigrationTransport for ScriptedTransport {
        async fn open(&self, _request: &serde_json::Value) -> RelayResult<MigrationStream> {
            let items: Vec<RelayResult<Bytes>> = self
                .chunks
                .iter()
                .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                .collect();
            let stream = futures::stream::iter(items);
            if self.hang_after {
                Ok(stream.chain(futures::stream::pending()).boxed())
            } else {
                Ok(stream.boxed())
            }
        }
    }

    struct RefusingTransport;

    #[async_trait]
    impl MigrationTransport for RefusingTransport {
        async fn open(&self, _request: &serde_json::Value) -> RelayResult<MigrationStream> {
            Err(RelayError::Transport("backend returned 503 Service Unavailable".to_string()))
        }
    }

    /// Transport whose run task never produces a result
    struct PanickingTransport;

    #[async_trait]
    impl MigrationTransport for PanickingTransport {
        async fn open(&self, _request: &serde_json::Value) -> RelayResult<MigrationStream> {
            panic!("transport blew up");
        }
    }

    fn controller(transport: impl MigrationTransport + 'static) -> MigrationController {
        let relay = StreamRelay::new(Arc::new(MilestoneTable::builtin()), EventBus::new(256));
        MigrationController::new(Arc::new(transport), relay)
    }

    #[tokio::test]
    async fn test_run_completes_and_status_reports_final_state() {
        let controller = controller(ScriptedTransport {
            chunks: vec!["data: Starting merge\n\n", "data: Migration completed successfully!\n\n"],
            hang_after: false,
        });

        assert!(controller.status().await.is_none());

        let run_id = controller.start(serde_json::json!({})).await.unwrap();
        let final_state = controller.wait().await.unwrap();

        assert_eq!(final_state.run_id, run_id);
        assert_eq!(final_state.status, RunStatus::Completed);
        assert_eq!(final_state.progress, 100);
        assert_eq!(final_state.log.len(), 2);
        assert_eq!(controller.status().await.unwrap(), final_state);
        assert!(!controller.is_active().await);
    }

    #[tokio::test]
    async fn test_concurrent_start_is_rejected() {
        let controller = controller(ScriptedTransport {
            chunks: vec!["data: Connecting to Google API\n\n"],
            hang_after: true,
        });

        let first = controller.start(serde_json::json!({})).await.unwrap();
        let second = controller.start(serde_json::json!({})).await;
        assert!(matches!(second, Err(RelayError::RunInProgress(id)) if id == first));

        controller.cancel().await.unwrap();
        let final_state = controller.wait().await.unwrap();
        assert_eq!(final_state.status, RunStatus::Failed);
        assert_eq!(final_state.error.as_deref(), Some("cancelled"));

        // A fresh run may start once the previous one is terminal
        let third = controller.start(serde_json::json!({})).await.unwrap();
        assert_ne!(third, first);
        controller.cancel().await.unwrap();
        let third_state = controller.wait().await.unwrap();
        assert_eq!(third_state.run_id, third);
        // No carry-over from the previous run: exactly one cancellation entry
        assert_eq!(third_state.log.last().unwrap().message, "cancelled");
        assert_eq!(
            third_state.log.iter().filter(|e| e.message == "cancelled").count(),
            1
        );
    }

    #[tokio::test]
    async fn test_transport_failure_before_data() {
        let controller = controller(RefusingTransport);

        controller.start(serde_json::json!({})).await.unwrap();
        let final_state = controller.wait().await.unwrap();

        assert_eq!(final_state.status, RunStatus::Failed);
        assert!(!final_state.running);
        assert_eq!(final_state.log.len(), 1);
        assert!(final_state.error.as_deref().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_cancel_without_active_run() {
        let controller = controller(RefusingTransport);
        assert!(matches!(controller.cancel().await, Err(RelayError::NoActiveRun)));
        assert!(matches!(controller.wait().await, Err(RelayError::NoActiveRun)));
    }

    #[tokio::test]
    async fn test_error_frame_on_open_stream_frees_the_controller() {
        let controller = controller(ScriptedTransport {
            chunks: vec!["data: Starting merge\n\ndata: ERROR: connection refused\n\n"],
            hang_after: true,
        });

        let first = controller.start(serde_json::json!({})).await.unwrap();
        let final_state = tokio::time::timeout(std::time::Duration::from_secs(5), controller.wait())
            .await
            .expect("error frame should end the run")
            .unwrap();

        assert_eq!(final_state.status, RunStatus::Failed);
        assert_eq!(final_state.error.as_deref(), Some("ERROR: connection refused"));
        assert!(!controller.is_active().await);
        assert!(matches!(controller.cancel().await, Err(RelayError::NoActiveRun)));

        let second = controller.start(serde_json::json!({})).await.unwrap();
        assert_ne!(second, first);
    }

    #[tokio::test]
    async fn test_panicked_run_task_is_not_active() {
        let controller = controller(PanickingTransport);

        let first = controller.start(serde_json::json!({})).await.unwrap();
        assert!(controller.wait().await.is_err());
        assert!(!controller.is_active().await);
        assert!(matches!(controller.cancel().await, Err(RelayError::NoActiveRun)));

        let status = controller.status().await.unwrap();
        assert_eq!(status.run_id, first);
        assert_eq!(status.status, RunStatus::Failed);
        assert!(!status.running);

        let second = controller.start(serde_json::json!({})).await.unwrap();
        assert_ne!(second, first);
    }
}

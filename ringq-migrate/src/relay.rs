//! Stream relay: migration stream bytes → log entries, progress, events
//!
//! One relay call consumes one migration response body. Chunks are
//! processed strictly in arrival order; every complete frame is turned into
//! a [`LogEntry`], classified against the milestone table, and published on
//! the [`EventBus`] before the next chunk is read.

use crate::error::RelayError;
use crate::frame::{flush_leftover, parse_frame, FrameDecoder};
use crate::milestones::{Classification, ProgressClassifier};
use crate::models::{MigrationRunState, RunStatus};
use futures::{Stream, StreamExt};
use ringq_common::events::{EventBus, LogEntry, TerminalState};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Translates a raw migration stream into run state and relay events
#[derive(Clone)]
pub struct StreamRelay {
    classifier: Arc<dyn ProgressClassifier>,
    events: EventBus,
}

impl StreamRelay {
    pub fn new(classifier: Arc<dyn ProgressClassifier>, events: EventBus) -> Self {
        Self { classifier, events }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Consume `stream` until it ends, fails or `cancel` fires
    ///
    /// `state` must be Running (see [`MigrationRunState::start`]); any other
    /// state is returned untouched. The returned state is terminal unless
    /// the input state was not Running.
    pub async fn run<S, B, E>(
        &self,
        mut state: MigrationRunState,
        stream: S,
        cancel: &CancellationToken,
    ) -> MigrationRunState
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: Into<RelayError>,
    {
        if state.status != RunStatus::Running {
            warn!(
                run_id = %state.run_id,
                status = ?state.status,
                "Relay refused to process a run that is not Running"
            );
            return state;
        }

        info!(run_id = %state.run_id, "Relaying migration stream");
        self.events.emit_lossy(state.event(None, None));

        let mut decoder = FrameDecoder::new();
        tokio::pin!(stream);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.discard_leftover(&state, &mut decoder);
                    self.terminate(&mut state, &RelayError::Cancelled);
                    return state;
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    let chunk = chunk.as_ref();
                    for raw in decoder.push(chunk) {
                        match parse_frame(&raw) {
                            Some(message) => self.process_message(&mut state, message),
                            None => trace!(run_id = %state.run_id, "Ignoring frame without data line"),
                        }

                        if state.has_failed() {
                            // Nothing after an error frame is read; dropping the stream closes it
                            self.discard_leftover(&state, &mut decoder);
                            info!(run_id = %state.run_id, "Abandoning migration stream after backend error");
                            return state;
                        }
                    }
                    trace!(
                        run_id = %state.run_id,
                        bytes = chunk.len(),
                        buffered = decoder.buffered_len(),
                        "Chunk processed"
                    );
                }
                Some(Err(e)) => {
                    self.discard_leftover(&state, &mut decoder);
                    self.terminate(&mut state, &e.into());
                    return state;
                }
                None => break,
            }
        }

        self.flush_leftover(&mut state, &mut decoder);

        if state.complete() {
            info!(run_id = %state.run_id, entries = state.log.len(), "Migration stream completed");
            self.events
                .emit_lossy(state.event(None, Some(TerminalState::Completed)));
        } else {
            debug!(
                run_id = %state.run_id,
                error = ?state.error,
                "Migration stream closed after failure"
            );
        }

        state
    }

    /// Fail the run because of `err`, recording one synthetic log entry
    ///
    /// Used for transport failures and cancellation. If the run already
    /// failed, the first error is kept and only the entry is added.
    pub fn terminate(&self, state: &mut MigrationRunState, err: &RelayError) {
        let description = err.to_string();
        let entry = LogEntry::now(description.clone());
        state.append_log(entry.clone());

        let terminal = if state.fail(description.clone()) {
            warn!(run_id = %state.run_id, error = %description, "Migration run failed");
            Some(TerminalState::Failed)
        } else {
            debug!(run_id = %state.run_id, error = %description, "Run already terminal");
            None
        };

        self.events.emit_lossy(state.event(Some(entry), terminal));
    }

    fn process_message(&self, state: &mut MigrationRunState, message: String) {
        let entry = LogEntry::now(message);
        state.append_log(entry.clone());

        let mut terminal = None;
        if !state.has_failed() {
            match self.classifier.classify(&entry.message) {
                Classification::Error => {
                    let err = RelayError::Upstream(entry.message.clone());
                    warn!(run_id = %state.run_id, error = %err, "Backend reported an error");
                    if state.fail(entry.message.clone()) {
                        terminal = Some(TerminalState::Failed);
                    }
                }
                Classification::Milestone(percent) => {
                    if state.advance_progress(percent) {
                        debug!(run_id = %state.run_id, progress = state.progress, "Milestone reached");
                    }
                }
                Classification::Plain => {}
            }
        }

        self.events.emit_lossy(state.event(Some(entry), terminal));
    }

    /// Interrupted stream: an unterminated frame is reported but never recorded
    fn discard_leftover(&self, state: &MigrationRunState, decoder: &mut FrameDecoder) {
        if let Some(leftover) = decoder.finish() {
            if !leftover.trim().is_empty() {
                warn!(
                    run_id = %state.run_id,
                    leftover = %leftover.escape_debug(),
                    "Discarding unterminated frame of an interrupted stream"
                );
            }
        }
    }

    fn flush_leftover(&self, state: &mut MigrationRunState, decoder: &mut FrameDecoder) {
        let Some(leftover) = decoder.finish() else {
            return;
        };

        match flush_leftover(&leftover) {
            Some(message) => {
                let err = RelayError::Protocol(format!(
                    "stream ended inside a frame ({} bytes unterminated)",
                    leftover.len()
                ));
                warn!(run_id = %state.run_id, error = %err, "Flushing unterminated frame");
                self.process_message(state, message);
            }
            None => trace!(run_id = %state.run_id, "Dropping whitespace/comment leftover"),
        }
    }
}

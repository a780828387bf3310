//! Session runtime executor

use super::{Command, SessionSnapshot, SubmitOutcome};
use crate::config::ClientConfig;
use crate::protocol::{chat_stream_url, CheckpointId, StreamEvent};
use crate::state_machine::{transition, Effect, Event, SessionContext, SessionState, TransitionError};
use crate::transcript::{Transcript, TurnId};
use crate::transport::StreamTransport;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Owns the transcript and the controller state for one conversation
pub struct SessionRuntime<T>
where
    T: StreamTransport + 'static,
{
    context: SessionContext,
    base_url: Url,
    state: SessionState,
    transcript: Transcript,
    /// Last checkpoint issued by the peer, sent with the next turn
    checkpoint: Option<CheckpointId>,
    transport: Arc<T>,
    command_rx: mpsc::Receiver<Command>,
    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    /// Token to stop the reader task of the open stream
    stream_cancel: Option<CancellationToken>,
    /// Token to cancel the pending writing stage timer
    writing_timer: Option<CancellationToken>,
}

impl<T> SessionRuntime<T>
where
    T: StreamTransport + 'static,
{
    pub fn new(
        config: &ClientConfig,
        transport: T,
        command_rx: mpsc::Receiver<Command>,
        snapshot_tx: watch::Sender<SessionSnapshot>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(64);
        Self {
            context: SessionContext {
                writing_delay: config.writing_delay,
            },
            base_url: config.api_url.clone(),
            state: SessionState::Idle,
            transcript: Transcript::new(),
            checkpoint: None,
            transport: Arc::new(transport),
            command_rx,
            event_rx,
            event_tx,
            snapshot_tx,
            stream_cancel: None,
            writing_timer: None,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(base_url = %self.base_url, "Starting chat session runtime");

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(Command::Submit { utterance, reply }) => {
                        let outcome = self.handle_submit(&utterance);
                        self.publish();
                        let _ = reply.send(outcome);
                    }
                    // Handle dropped or explicit shutdown: behave like unmount
                    Some(Command::Shutdown) | None => {
                        self.process_event(Event::Shutdown);
                        self.publish();
                        break;
                    }
                },
                Some(event) = self.event_rx.recv() => {
                    self.process_event(event);
                    self.publish();
                }
            }
        }

        tracing::info!("Chat session runtime stopped");
    }

    /// Turn orchestration: record the exchange, then hand off to the controller
    fn handle_submit(&mut self, utterance: &str) -> SubmitOutcome {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return SubmitOutcome::Ignored;
        }

        self.transcript.append_user_turn(utterance);
        let turn_id = self.transcript.append_assistant_placeholder().id;
        tracing::info!(
            turn_id = %turn_id,
            has_checkpoint = self.checkpoint.is_some(),
            "Starting turn"
        );

        self.process_event(Event::TurnStarted {
            turn_id,
            utterance: utterance.to_string(),
            checkpoint: self.checkpoint.clone(),
        });
        SubmitOutcome::Accepted(turn_id)
    }

    fn process_event(&mut self, event: Event) {
        // Effects may generate follow-up events; handle them before returning
        let mut events_to_process = vec![event];

        while let Some(current_event) = events_to_process.pop() {
            let target = current_event.turn_id();
            let result = match transition(&self.state, &self.context, current_event) {
                Ok(r) => r,
                Err(e @ TransitionError::StaleTurn(_)) => {
                    tracing::debug!(error = %e, "Dropping event for inactive turn");
                    continue;
                }
                Err(e) => {
                    tracing::debug!(turn_id = ?target, error = %e, "Dropping event");
                    continue;
                }
            };

            let old_state = std::mem::replace(&mut self.state, result.new_state);
            if old_state.name() != self.state.name() {
                self.log_state_change(&old_state);
            }

            for effect in result.effects {
                if let Some(generated_event) = self.execute_effect(effect) {
                    events_to_process.push(generated_event);
                }
            }
        }
    }

    fn log_state_change(&self, old_state: &SessionState) {
        match &self.state {
            SessionState::Completed { turn_id, .. } => {
                tracing::info!(turn_id = %turn_id, "Turn completed");
            }
            SessionState::Failed { turn_id, reason } => {
                tracing::warn!(turn_id = %turn_id, reason = %reason, "Turn failed");
            }
            state => {
                tracing::debug!(from = old_state.name(), to = state.name(), "Session state changed");
            }
        }
    }

    fn execute_effect(&mut self, effect: Effect) -> Option<Event> {
        let target = effect.target();
        let applied = match effect {
            Effect::OpenStream {
                turn_id,
                utterance,
                checkpoint,
            } => {
                return self.open_stream(turn_id, &utterance, checkpoint.as_ref());
            }

            Effect::CloseStream => {
                if let Some(token) = self.stream_cancel.take() {
                    token.cancel();
                }
                Ok(())
            }

            Effect::StoreCheckpoint { checkpoint } => {
                tracing::debug!(checkpoint = %checkpoint, "Checkpoint received");
                self.checkpoint = Some(checkpoint);
                Ok(())
            }

            Effect::AppendContent { turn_id, delta } => {
                self.transcript.append_content(turn_id, &delta)
            }

            Effect::SetStage { turn_id, snapshot } => self.transcript.set_stage(turn_id, snapshot),

            Effect::SetSourceUrls { turn_id, urls } => {
                self.transcript.set_source_urls(turn_id, urls)
            }

            Effect::Finalize { turn_id } => self.transcript.finalize(turn_id),

            Effect::ArmWritingTimer { turn_id, delay } => {
                self.arm_writing_timer(turn_id, delay);
                Ok(())
            }

            Effect::CancelWritingTimer => {
                if let Some(token) = self.writing_timer.take() {
                    token.cancel();
                }
                Ok(())
            }
        };

        if let Err(e) = applied {
            tracing::warn!(turn_id = ?target, error = %e, "Transcript update rejected");
        }
        None
    }

    /// Spawn the reader task for a turn's stream
    fn open_stream(
        &mut self,
        turn_id: TurnId,
        utterance: &str,
        checkpoint: Option<&CheckpointId>,
    ) -> Option<Event> {
        let url = match chat_stream_url(&self.base_url, utterance, checkpoint) {
            Ok(url) => url,
            Err(e) => {
                return Some(Event::StreamFailed {
                    turn_id,
                    message: e.to_string(),
                });
            }
        };

        // Only one stream may feed the transcript
        if let Some(previous) = self.stream_cancel.take() {
            previous.cancel();
        }
        let token = CancellationToken::new();
        self.stream_cancel = Some(token.clone());

        tracing::debug!(turn_id = %turn_id, url = %url, "Opening event stream");
        let transport = Arc::clone(&self.transport);
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {
                    tracing::debug!(turn_id = %turn_id, "Event stream closed");
                }
                () = read_stream(transport, url, turn_id, event_tx) => {}
            }
        });
        None
    }

    fn arm_writing_timer(&mut self, turn_id: TurnId, delay: Duration) {
        if let Some(previous) = self.writing_timer.take() {
            previous.cancel();
        }
        let token = CancellationToken::new();
        self.writing_timer = Some(token.clone());

        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let _ = event_tx.send(Event::WritingDue { turn_id }).await;
                }
            }
        });
    }

    fn publish(&self) {
        let next = SessionSnapshot {
            transcript: self.transcript.snapshot(),
            busy: self.state.is_busy(),
            checkpoint: self.checkpoint.clone(),
            phase: self.state.name(),
        };
        self.snapshot_tx.send_if_modified(|current| {
            let unchanged = current.transcript.version() == next.transcript.version()
                && current.busy == next.busy
                && current.checkpoint == next.checkpoint
                && current.phase == next.phase;
            if unchanged {
                return false;
            }
            *current = next;
            true
        });
    }
}

/// Forward a turn's frames to the runtime until the stream ends
///
/// Frames that do not decode are dropped here; the stream keeps going.
async fn read_stream<T: StreamTransport>(
    transport: Arc<T>,
    url: Url,
    turn_id: TurnId,
    event_tx: mpsc::Sender<Event>,
) {
    let mut frames = match transport.open(&url).await {
        Ok(frames) => frames,
        Err(e) => {
            let _ = event_tx
                .send(Event::StreamFailed {
                    turn_id,
                    message: e.to_string(),
                })
                .await;
            return;
        }
    };

    while let Some(frame) = frames.next().await {
        let data = match frame {
            Ok(data) => data,
            Err(e) => {
                let _ = event_tx
                    .send(Event::StreamFailed {
                        turn_id,
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        match StreamEvent::decode(&data) {
            Ok(event) => {
                tracing::debug!(turn_id = %turn_id, kind = event.kind(), "Frame received");
                if event_tx.send(Event::Frame { turn_id, event }).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(turn_id = %turn_id, error = %e, "Dropping malformed frame");
            }
        }
    }

    let _ = event_tx.send(Event::StreamClosed { turn_id }).await;
}

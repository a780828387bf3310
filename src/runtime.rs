//! Session runtime and turn orchestration
//!
//! [`ChatHandle`] is the front of the session: it accepts utterances, exposes
//! render-ready snapshots and the derived busy flag. All state lives in a
//! single [`SessionRuntime`] task that processes one message at a time.

mod executor;


pub use executor::SessionRuntime;

use crate::config::ClientConfig;
use crate::protocol::CheckpointId;
use crate::transcript::{TranscriptSnapshot, TurnId};
use crate::transport::StreamTransport;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Requests from the input surface to the runtime
#[derive(Debug)]
pub enum Command {
    Submit {
        utterance: String,
        reply: oneshot::Sender<SubmitOutcome>,
    },
    Shutdown,
}

/// What happened to a submitted utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A turn was started; the id is the assistant record's
    Accepted(TurnId),
    /// Blank input, nothing happened
    Ignored,
}

/// Everything the rendering layer reads, published after every handled event
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub transcript: TranscriptSnapshot,
    pub busy: bool,
    pub checkpoint: Option<CheckpointId>,
    pub phase: &'static str,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("chat session has stopped")]
    Closed,
}

/// Handle to a running chat session
pub struct ChatHandle {
    command_tx: mpsc::Sender<Command>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    task: JoinHandle<()>,
}

impl ChatHandle {
    /// Start a session runtime on the current tokio runtime
    pub fn spawn<T: StreamTransport + 'static>(config: &ClientConfig, transport: T) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot {
            phase: "idle",
            ..SessionSnapshot::default()
        });
        let runtime = SessionRuntime::new(config, transport, command_rx, snapshot_tx);
        let task = tokio::spawn(runtime.run());
        Self {
            command_tx,
            snapshot_rx,
            task,
        }
    }

    /// Submit an utterance
    ///
    /// Surrounding whitespace is trimmed and blank input is ignored. When a
    /// turn is accepted this resolves after the runtime has published the
    /// busy snapshot for it.
    pub async fn submit(&self, utterance: &str) -> Result<SubmitOutcome, SessionError> {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Ok(SubmitOutcome::Ignored);
        }
        let (reply, outcome) = oneshot::channel();
        self.command_tx
            .send(Command::Submit {
                utterance: utterance.to_string(),
                reply,
            })
            .await
            .map_err(|_| SessionError::Closed)?;
        outcome.await.map_err(|_| SessionError::Closed)
    }

    /// True between an accepted submit and the turn completing or failing
    pub fn busy(&self) -> bool {
        self.snapshot_rx.borrow().busy
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Wait until no turn is in flight and return that snapshot
    pub async fn wait_until_idle(&self) -> Result<SessionSnapshot, SessionError> {
        let mut rx = self.snapshot_rx.clone();
        let snapshot = rx
            .wait_for(|snapshot| !snapshot.busy)
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok(snapshot.clone())
    }

    /// Close any open stream, cancel timers and stop the runtime
    pub async fn shutdown(self) -> Result<SessionSnapshot, SessionError> {
        self.command_tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| SessionError::Closed)?;
        self.task.await.map_err(|_| SessionError::Closed)?;
        let snapshot = self.snapshot_rx.borrow().clone();
        Ok(snapshot)
    }
}

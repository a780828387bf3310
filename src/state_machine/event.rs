//! Events that drive the session controller

use crate::protocol::{CheckpointId, StreamEvent};
use crate::transcript::TurnId;

/// Events that trigger state transitions
///
/// Every event except `TurnStarted` and `Shutdown` names the turn it belongs
/// to, so that events from a superseded stream or an already scheduled timer
/// can be told apart from the active turn's.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    // Orchestrator events
    TurnStarted {
        turn_id: TurnId,
        utterance: String,
        checkpoint: Option<CheckpointId>,
    },
    Shutdown,

    // Stream events
    Frame {
        turn_id: TurnId,
        event: StreamEvent,
    },
    /// The peer closed the stream
    StreamClosed {
        turn_id: TurnId,
    },
    StreamFailed {
        turn_id: TurnId,
        message: String,
    },

    // Timer events
    WritingDue {
        turn_id: TurnId,
    },
}

impl Event {
    /// The turn this event is addressed to, if any
    pub fn turn_id(&self) -> Option<TurnId> {
        match self {
            Event::TurnStarted { turn_id, .. }
            | Event::Frame { turn_id, .. }
            | Event::StreamClosed { turn_id }
            | Event::StreamFailed { turn_id, .. }
            | Event::WritingDue { turn_id } => Some(*turn_id),
            Event::Shutdown => None,
        }
    }
}

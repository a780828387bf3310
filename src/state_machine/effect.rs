//! Effects produced by state transitions

use crate::protocol::CheckpointId;
use crate::stage::StageSnapshot;
use crate::transcript::TurnId;
use std::time::Duration;

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Open the turn's event stream (spawns a reader task)
    OpenStream {
        turn_id: TurnId,
        utterance: String,
        checkpoint: Option<CheckpointId>,
    },

    /// Close the currently open stream, if any
    CloseStream,

    /// Remember the checkpoint for the next turn
    StoreCheckpoint { checkpoint: CheckpointId },

    /// Append an answer delta to the record
    AppendContent { turn_id: TurnId, delta: String },

    /// Replace the record's stage snapshot
    SetStage {
        turn_id: TurnId,
        snapshot: StageSnapshot,
    },

    /// Set the record's source list
    SetSourceUrls { turn_id: TurnId, urls: Vec<String> },

    /// Mark the record as no longer streaming
    Finalize { turn_id: TurnId },

    /// Schedule the inferred writing stage
    ArmWritingTimer { turn_id: TurnId, delay: Duration },

    /// Cancel the writing stage timer, if armed
    CancelWritingTimer,
}

impl Effect {
    /// The record this effect mutates, for transcript effects
    pub fn target(&self) -> Option<TurnId> {
        match self {
            Effect::AppendContent { turn_id, .. }
            | Effect::SetStage { turn_id, .. }
            | Effect::SetSourceUrls { turn_id, .. }
            | Effect::Finalize { turn_id } => Some(*turn_id),
            Effect::OpenStream { .. }
            | Effect::CloseStream
            | Effect::StoreCheckpoint { .. }
            | Effect::ArmWritingTimer { .. }
            | Effect::CancelWritingTimer => None,
        }
    }
}

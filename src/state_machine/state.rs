//! Session controller state types

use crate::stage::{StageSnapshot, StageTracker};
use crate::transcript::TurnId;
use std::time::Duration;

/// Delay between search results and the inferred writing stage
pub const WRITING_STAGE_DELAY: Duration = Duration::from_millis(1500);

/// The turn whose stream is currently open
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveTurn {
    pub turn_id: TurnId,
    pub stages: StageTracker,
    /// Whether a `WritingDue` for this turn is expected
    pub writing_timer_armed: bool,
}

impl ActiveTurn {
    pub fn new(turn_id: TurnId) -> Self {
        Self {
            turn_id,
            stages: StageTracker::new(),
            writing_timer_armed: false,
        }
    }
}

/// State of the stream session for the latest turn
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    /// No turn started yet, or the session was shut down
    #[default]
    Idle,

    /// Stream requested, no frame received yet
    Connecting { turn: ActiveTurn },

    /// At least one frame received
    Streaming { turn: ActiveTurn },

    /// The peer sent `end`
    Completed {
        turn_id: TurnId,
        stages: StageSnapshot,
    },

    /// The stream broke off before `end`
    Failed { turn_id: TurnId, reason: String },
}

impl SessionState {
    /// A turn is in flight; the input surface should not accept another
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting { .. } | SessionState::Streaming { .. }
        )
    }

    pub fn active_turn(&self) -> Option<&ActiveTurn> {
        match self {
            SessionState::Connecting { turn } | SessionState::Streaming { turn } => Some(turn),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting { .. } => "connecting",
            SessionState::Streaming { .. } => "streaming",
            SessionState::Completed { .. } => "completed",
            SessionState::Failed { .. } => "failed",
        }
    }
}

/// Configuration for a session (immutable)
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub writing_delay: Duration,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            writing_delay: WRITING_STAGE_DELAY,
        }
    }
}

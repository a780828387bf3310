//! Pure state transition function

use super::{ActiveTurn, Effect, Event, SessionContext, SessionState};
use crate::protocol::StreamEvent;
use crate::transcript::TurnId;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: SessionState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SessionState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Events the controller refuses to apply. None of these are fatal: the
/// runtime logs and drops the event.
#[derive(Debug, Error, PartialEq)]
pub enum TransitionError {
    #[error("event for turn {0} arrived but it is not the active turn")]
    StaleTurn(TurnId),
    #[error("writing stage timer for turn {0} is not armed")]
    TimerNotArmed(TurnId),
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs; all I/O and
/// all transcript mutation is expressed as effects.
pub fn transition(
    state: &SessionState,
    context: &SessionContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Turn start: supersedes any turn still in flight
        // ============================================================
        (
            _,
            Event::TurnStarted {
                turn_id,
                utterance,
                checkpoint,
            },
        ) => {
            let teardown = state.active_turn().map(close_turn).unwrap_or_default();
            Ok(
                TransitionResult::new(SessionState::Connecting {
                    turn: ActiveTurn::new(turn_id),
                })
                .with_effects(teardown)
                .with_effect(Effect::OpenStream {
                    turn_id,
                    utterance,
                    checkpoint,
                }),
            )
        }

        (_, Event::Shutdown) => {
            let teardown = state.active_turn().map(close_turn).unwrap_or_default();
            Ok(TransitionResult::new(SessionState::Idle).with_effects(teardown))
        }

        // ============================================================
        // Frames for the active turn
        // ============================================================
        (
            SessionState::Connecting { turn } | SessionState::Streaming { turn },
            Event::Frame { turn_id, event },
        ) if turn.turn_id == turn_id => Ok(apply_frame(turn.clone(), context, event)),

        // ============================================================
        // Inferred writing stage
        // ============================================================
        (
            SessionState::Connecting { turn } | SessionState::Streaming { turn },
            Event::WritingDue { turn_id },
        ) if turn.turn_id == turn_id => {
            if !turn.writing_timer_armed {
                return Err(TransitionError::TimerNotArmed(turn_id));
            }
            let mut turn = turn.clone();
            turn.writing_timer_armed = false;
            let snapshot = turn.stages.writing_due();
            let result = TransitionResult::new(SessionState::Streaming { turn });
            Ok(match snapshot {
                Some(snapshot) => result.with_effect(Effect::SetStage { turn_id, snapshot }),
                None => result,
            })
        }

        // ============================================================
        // Transport termination without `end`
        // ============================================================
        (
            SessionState::Connecting { turn } | SessionState::Streaming { turn },
            Event::StreamClosed { turn_id },
        ) if turn.turn_id == turn_id => Ok(fail_turn(turn, "stream closed before end of turn")),

        (
            SessionState::Connecting { turn } | SessionState::Streaming { turn },
            Event::StreamFailed { turn_id, message },
        ) if turn.turn_id == turn_id => Ok(fail_turn(turn, &message)),

        // ============================================================
        // Anything else belongs to a turn that is no longer active
        // ============================================================
        (
            _,
            Event::Frame { turn_id, .. }
            | Event::WritingDue { turn_id }
            | Event::StreamClosed { turn_id }
            | Event::StreamFailed { turn_id, .. },
        ) => Err(TransitionError::StaleTurn(turn_id)),
    }
}

fn apply_frame(mut turn: ActiveTurn, context: &SessionContext, event: StreamEvent) -> TransitionResult {
    let turn_id = turn.turn_id;
    match event {
        StreamEvent::Checkpoint { checkpoint_id } => {
            TransitionResult::new(SessionState::Streaming { turn })
                .with_effect(Effect::StoreCheckpoint {
                    checkpoint: checkpoint_id,
                })
        }

        StreamEvent::Content { content } if content.is_empty() => {
            TransitionResult::new(SessionState::Streaming { turn })
        }

        StreamEvent::Content { content } => TransitionResult::new(SessionState::Streaming { turn })
            .with_effect(Effect::AppendContent {
                turn_id,
                delta: content,
            }),

        StreamEvent::SearchStart { query } => {
            let snapshot = turn.stages.search_start(query);
            let result = TransitionResult::new(SessionState::Streaming { turn });
            match snapshot {
                Some(snapshot) => result.with_effect(Effect::SetStage { turn_id, snapshot }),
                None => result,
            }
        }

        StreamEvent::SearchResults { urls } => match turn.stages.search_results(urls.clone()) {
            Some(snapshot) => {
                turn.writing_timer_armed = true;
                TransitionResult::new(SessionState::Streaming { turn })
                    .with_effect(Effect::SetStage { turn_id, snapshot })
                    .with_effect(Effect::SetSourceUrls { turn_id, urls })
                    .with_effect(Effect::ArmWritingTimer {
                        turn_id,
                        delay: context.writing_delay,
                    })
            }
            None => TransitionResult::new(SessionState::Streaming { turn }),
        },

        StreamEvent::Error { message } => {
            let mut effects = Vec::new();
            if let Some(snapshot) = turn.stages.fail(message) {
                effects.push(Effect::SetStage { turn_id, snapshot });
            }
            if turn.writing_timer_armed {
                turn.writing_timer_armed = false;
                effects.push(Effect::CancelWritingTimer);
            }
            TransitionResult::new(SessionState::Streaming { turn }).with_effects(effects)
        }

        StreamEvent::End => {
            let effects = close_turn(&turn);
            let stages = turn.stages.finish();
            TransitionResult::new(SessionState::Completed { turn_id, stages }).with_effects(effects)
        }
    }
}

fn fail_turn(turn: &ActiveTurn, reason: &str) -> TransitionResult {
    TransitionResult::new(SessionState::Failed {
        turn_id: turn.turn_id,
        reason: reason.to_string(),
    })
    .with_effects(close_turn(turn))
}

/// Teardown shared by every path that leaves a turn
fn close_turn(turn: &ActiveTurn) -> Vec<Effect> {
    let mut effects = Vec::with_capacity(3);
    if turn.writing_timer_armed {
        effects.push(Effect::CancelWritingTimer);
    }
    effects.push(Effect::CloseStream);
    effects.push(Effect::Finalize {
        turn_id: turn.turn_id,
    });
    effects
}

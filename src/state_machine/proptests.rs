//! Property-based tests for the session controller
//!
//! A small simulator plays the role of the runtime: it applies effects to a
//! real [`Transcript`], keeps track of which stream and timer are live, and
//! delivers arbitrary interleavings of frames, timer firings and transport
//! failures, including late deliveries for turns that were superseded.

use super::*;
use crate::protocol::{CheckpointId, StreamEvent};
use crate::stage::Stage;
use crate::transcript::{Transcript, TurnId, TurnRecord};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// Simulator
// ============================================================================

struct Simulator {
    state: SessionState,
    context: SessionContext,
    transcript: Transcript,
    turns: Vec<TurnId>,
    open_stream: Option<TurnId>,
    pending_timer: Option<TurnId>,
    checkpoint: Option<CheckpointId>,
}

impl Simulator {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
            context: SessionContext::default(),
            transcript: Transcript::new(),
            turns: Vec::new(),
            open_stream: None,
            pending_timer: None,
            checkpoint: None,
        }
    }

    fn start_turn(&mut self, utterance: &str) -> TurnId {
        self.transcript.append_user_turn(utterance);
        let turn_id = self.transcript.append_assistant_placeholder().id;
        self.turns.push(turn_id);
        self.deliver(Event::TurnStarted {
            turn_id,
            utterance: utterance.to_string(),
            checkpoint: self.checkpoint.clone(),
        });
        turn_id
    }

    /// Feed one event; rejected events are dropped like the runtime does
    fn deliver(&mut self, event: Event) {
        let Ok(result) = transition(&self.state, &self.context, event) else {
            return;
        };
        self.state = result.new_state;
        for effect in result.effects {
            self.apply(effect);
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::OpenStream { turn_id, .. } => self.open_stream = Some(turn_id),
            Effect::CloseStream => self.open_stream = None,
            Effect::StoreCheckpoint { checkpoint } => self.checkpoint = Some(checkpoint),
            Effect::AppendContent { turn_id, delta } => {
                self.transcript.append_content(turn_id, &delta).unwrap();
            }
            Effect::SetStage { turn_id, snapshot } => {
                self.transcript.set_stage(turn_id, snapshot).unwrap();
            }
            Effect::SetSourceUrls { turn_id, urls } => {
                self.transcript.set_source_urls(turn_id, urls).unwrap();
            }
            Effect::Finalize { turn_id } => self.transcript.finalize(turn_id).unwrap(),
            Effect::ArmWritingTimer { turn_id, .. } => self.pending_timer = Some(turn_id),
            Effect::CancelWritingTimer => self.pending_timer = None,
        }
    }

    fn active(&self) -> Option<TurnId> {
        self.state.active_turn().map(|turn| turn.turn_id)
    }

    /// Resolve a target selector to a turn id: 0 is the latest turn, higher
    /// values reach back to older (possibly superseded) turns
    fn pick(&self, back: usize) -> Option<TurnId> {
        let len = self.turns.len();
        if len == 0 {
            return None;
        }
        Some(self.turns[len - 1 - back % len])
    }

    fn step(&mut self, op: Op) {
        match op {
            Op::Start(utterance) => {
                self.start_turn(&utterance);
            }
            Op::Frame { back, event } => {
                if let Some(turn_id) = self.pick(back) {
                    self.deliver(Event::Frame { turn_id, event });
                }
            }
            Op::FireTimer => {
                if let Some(turn_id) = self.pending_timer.take() {
                    self.deliver(Event::WritingDue { turn_id });
                }
            }
            Op::LateTimer { back } => {
                if let Some(turn_id) = self.pick(back) {
                    self.deliver(Event::WritingDue { turn_id });
                }
            }
            Op::Close { back } => {
                if let Some(turn_id) = self.pick(back) {
                    self.deliver(Event::StreamClosed { turn_id });
                }
            }
            Op::Fail { back, message } => {
                if let Some(turn_id) = self.pick(back) {
                    self.deliver(Event::StreamFailed { turn_id, message });
                }
            }
        }
    }

    fn records(&self) -> Vec<Arc<TurnRecord>> {
        self.transcript.snapshot().records().to_vec()
    }
}

#[derive(Debug, Clone)]
enum Op {
    Start(String),
    Frame { back: usize, event: StreamEvent },
    FireTimer,
    LateTimer { back: usize },
    Close { back: usize },
    Fail { back: usize, message: String },
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_stream_event() -> impl Strategy<Value = StreamEvent> {
    prop_oneof![
        "[a-z0-9]{6}".prop_map(|id| StreamEvent::Checkpoint {
            checkpoint_id: CheckpointId::new(id)
        }),
        "[a-zA-Z ,.]{0,12}".prop_map(|content| StreamEvent::Content { content }),
        "[a-z ]{1,12}".prop_map(|query| StreamEvent::SearchStart { query }),
        proptest::collection::vec("https://[a-z]{3,8}\\.com", 0..3)
            .prop_map(|urls| StreamEvent::SearchResults { urls }),
        "[a-z ]{0,12}".prop_map(|message| StreamEvent::Error { message }),
        Just(StreamEvent::End),
    ]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => "[a-z ]{1,10}".prop_map(Op::Start),
        6 => (0usize..3, arb_stream_event()).prop_map(|(back, event)| Op::Frame { back, event }),
        2 => Just(Op::FireTimer),
        1 => (0usize..3).prop_map(|back| Op::LateTimer { back }),
        1 => (0usize..3).prop_map(|back| Op::Close { back }),
        1 => (0usize..3, "[a-z]{1,8}").prop_map(|(back, message)| Op::Fail { back, message }),
    ]
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    // Always begin with a turn so frames have somewhere to go
    ("[a-z]{1,10}", proptest::collection::vec(arb_op(), 0..40))
        .prop_map(|(first, rest)| std::iter::once(Op::Start(first)).chain(rest).collect())
}

/// Frames for a single turn that never end it early
fn arb_turn_body() -> impl Strategy<Value = Vec<StreamEvent>> {
    proptest::collection::vec(
        prop_oneof![
            3 => "[a-zA-Z ,.]{0,12}".prop_map(|content| StreamEvent::Content { content }),
            1 => "[a-z ]{1,12}".prop_map(|query| StreamEvent::SearchStart { query }),
            1 => proptest::collection::vec("https://[a-z]{3,8}\\.com", 0..3)
                .prop_map(|urls| StreamEvent::SearchResults { urls }),
            1 => "[a-z0-9]{6}".prop_map(|id| StreamEvent::Checkpoint {
                checkpoint_id: CheckpointId::new(id)
            }),
        ],
        0..30,
    )
}

fn stages_are_well_formed(stages: &[Stage]) -> bool {
    const ORDER: [Stage; 3] = [Stage::Searching, Stage::Reading, Stage::Writing];
    stages == [Stage::Error] || (stages.len() <= ORDER.len() && stages == &ORDER[..stages.len()])
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// The answer is the in-order concatenation of every content delta
    #[test]
    fn prop_content_is_concatenation(body in arb_turn_body()) {
        let mut sim = Simulator::new();
        let turn_id = sim.start_turn("question");

        let mut expected = String::new();
        for event in body {
            if let StreamEvent::Content { content } = &event {
                expected.push_str(content);
            }
            sim.deliver(Event::Frame { turn_id, event });
        }
        sim.deliver(Event::Frame { turn_id, event: StreamEvent::End });

        let record = sim.transcript.get(turn_id).unwrap();
        prop_assert_eq!(&record.content, &expected);
        prop_assert!(!record.streaming);
        let completed = matches!(sim.state, SessionState::Completed { .. });
        prop_assert!(completed, "turn did not complete: {:?}", sim.state);
    }

    /// Stages only grow along searching, reading, writing, or collapse to error
    #[test]
    fn prop_stages_well_formed_and_monotonic(ops in arb_ops()) {
        let mut sim = Simulator::new();
        let mut seen: HashMap<TurnId, Vec<Stage>> = HashMap::new();

        for op in ops {
            sim.step(op);
            for record in sim.records() {
                let Some(info) = &record.stage_info else { continue };
                prop_assert!(stages_are_well_formed(&info.stages), "bad stages {:?}", info.stages);

                let previous = seen.entry(record.id).or_default();
                if !info.is_failed() {
                    prop_assert!(
                        info.stages.starts_with(previous.as_slice()),
                        "stages shrank from {:?} to {:?}", previous, info.stages
                    );
                }
                previous.clone_from(&info.stages);
            }
        }
    }

    /// A record that stopped streaming never changes again, whatever arrives
    /// late for its turn
    #[test]
    fn prop_finalized_records_are_frozen(ops in arb_ops()) {
        let mut sim = Simulator::new();
        let mut finalized: HashMap<TurnId, Arc<TurnRecord>> = HashMap::new();

        for op in ops {
            sim.step(op);
            for record in sim.records() {
                if record.is_user() || record.streaming {
                    continue;
                }
                if let Some(frozen) = finalized.get(&record.id) {
                    prop_assert_eq!(frozen.as_ref(), record.as_ref());
                } else {
                    finalized.insert(record.id, record);
                }
            }
        }
    }

    /// The writing stage only ever lands on the turn that is active when the
    /// timer fires
    #[test]
    fn prop_writing_only_for_active_turn(ops in arb_ops()) {
        let mut sim = Simulator::new();

        for op in ops {
            let active_before = sim.active();
            let writing_before: Vec<TurnId> = sim
                .records()
                .iter()
                .filter(|r| r.stage_info.as_ref().is_some_and(|s| s.contains(Stage::Writing)))
                .map(|r| r.id)
                .collect();

            sim.step(op);

            for record in sim.records() {
                let has_writing = record
                    .stage_info
                    .as_ref()
                    .is_some_and(|s| s.contains(Stage::Writing));
                if has_writing && !writing_before.contains(&record.id) {
                    prop_assert_eq!(Some(record.id), active_before);
                }
            }
        }
    }

    /// At most one record streams, and it belongs to the active turn
    #[test]
    fn prop_single_streaming_record(ops in arb_ops()) {
        let mut sim = Simulator::new();

        for op in ops {
            sim.step(op);
            let streaming: Vec<TurnId> = sim
                .records()
                .iter()
                .filter(|r| r.streaming)
                .map(|r| r.id)
                .collect();
            prop_assert!(streaming.len() <= 1, "streaming records: {:?}", streaming);
            if let Some(id) = streaming.first() {
                prop_assert_eq!(Some(*id), sim.active());
                prop_assert_eq!(Some(*id), sim.open_stream);
            }
            prop_assert_eq!(sim.state.is_busy(), !streaming.is_empty());
        }
    }

    /// Garbage payloads never decode into events
    #[test]
    fn prop_malformed_frames_rejected(raw in "[^{\\[]{0,40}") {
        prop_assert!(StreamEvent::decode(&raw).is_err());
    }

    /// Objects without a known `type` are rejected rather than guessed at
    #[test]
    fn prop_unknown_types_rejected(kind in "[a-z_]{1,12}", content in "[a-z ]{0,10}") {
        let known = matches!(
            kind.as_str(),
            "checkpoint" | "content" | "search_start" | "search_results" | "error" | "end"
        );
        prop_assume!(!known);
        let raw = serde_json::json!({ "type": kind, "content": content }).to_string();
        prop_assert!(StreamEvent::decode(&raw).is_err());
    }
}

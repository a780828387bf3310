//! Search progress tracking for a single assistant turn
//!
//! The peer announces when it starts searching and when results arrive.
//! The writing stage is never announced: it is inferred a fixed delay after
//! results, which the session controller schedules as a timer and feeds back
//! through [`StageTracker::writing_due`].

use serde::{Deserialize, Serialize};

/// A named phase of assistant progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Searching,
    Reading,
    Writing,
    /// Terminal and exclusive: replaces every other stage
    Error,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Searching => "searching",
            Stage::Reading => "reading",
            Stage::Writing => "writing",
            Stage::Error => "error",
        }
    }
}

/// Render-ready view of a turn's search progress
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StageSnapshot {
    /// Stages reached so far, in order. Either a prefix of
    /// `[Searching, Reading, Writing]` or exactly `[Error]`.
    pub stages: Vec<Stage>,
    pub query: Option<String>,
    pub urls: Vec<String>,
    pub error: Option<String>,
}

impl StageSnapshot {
    pub fn contains(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    pub fn is_failed(&self) -> bool {
        self.contains(Stage::Error)
    }

    /// The most advanced stage reached, if any
    pub fn current(&self) -> Option<Stage> {
        self.stages.last().copied()
    }
}

/// Per-turn stage state machine
///
/// Each input returns `Some(snapshot)` with the complete next snapshot when it
/// changed anything, or `None` when the input does not apply in the current
/// stage (duplicates, out-of-order inputs, anything after a failure or after
/// the turn finished).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StageTracker {
    snapshot: StageSnapshot,
    frozen: bool,
}

impl StageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> &StageSnapshot {
        &self.snapshot
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn accepts_input(&self) -> bool {
        !self.frozen && !self.snapshot.is_failed()
    }

    /// `{}` -> `{searching}`; the query is recorded once
    pub fn search_start(&mut self, query: String) -> Option<StageSnapshot> {
        if !self.accepts_input() || !self.snapshot.stages.is_empty() {
            return None;
        }
        self.snapshot.stages.push(Stage::Searching);
        self.snapshot.query = Some(query);
        Some(self.snapshot.clone())
    }

    /// `{searching}` -> `{searching, reading}`
    ///
    /// Results without a preceding search start still imply a search, so the
    /// searching stage is filled in with no query.
    pub fn search_results(&mut self, urls: Vec<String>) -> Option<StageSnapshot> {
        if !self.accepts_input() || self.snapshot.contains(Stage::Reading) {
            return None;
        }
        if !self.snapshot.contains(Stage::Searching) {
            self.snapshot.stages.push(Stage::Searching);
        }
        self.snapshot.stages.push(Stage::Reading);
        self.snapshot.urls = urls;
        Some(self.snapshot.clone())
    }

    /// `{searching, reading}` -> `{searching, reading, writing}`
    pub fn writing_due(&mut self) -> Option<StageSnapshot> {
        if !self.accepts_input()
            || !self.snapshot.contains(Stage::Reading)
            || self.snapshot.contains(Stage::Writing)
        {
            return None;
        }
        self.snapshot.stages.push(Stage::Writing);
        Some(self.snapshot.clone())
    }

    /// Any stage -> `{error}`
    pub fn fail(&mut self, message: String) -> Option<StageSnapshot> {
        if !self.accepts_input() {
            return None;
        }
        self.snapshot.stages = vec![Stage::Error];
        self.snapshot.error = Some(message);
        Some(self.snapshot.clone())
    }

    /// Freeze the tracker at the end of the turn and return the final snapshot
    pub fn finish(&mut self) -> StageSnapshot {
        self.frozen = true;
        self.snapshot.clone()
    }
}

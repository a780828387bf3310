//! Transcript store
//!
//! An ordered, append-only log of turn records. Records are shared as
//! `Arc<TurnRecord>` and copied on write, so a snapshot taken before a
//! mutation is never affected by it and unchanged rows keep their pointer
//! identity across snapshots. Renderers can detect changed rows with
//! [`Arc::ptr_eq`] and changed transcripts with [`TranscriptSnapshot::version`].

use crate::stage::StageSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier of a turn record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(Uuid);

impl TurnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One side of a user/assistant exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub id: TurnId,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// True while an assistant record is still receiving stream events
    pub streaming: bool,
    pub stage_info: Option<StageSnapshot>,
    pub source_urls: Vec<String>,
}

impl TurnRecord {
    fn new(role: Role, content: String, streaming: bool) -> Self {
        Self {
            id: TurnId::new(),
            role,
            content,
            created_at: Utc::now(),
            streaming,
            stage_info: None,
            source_urls: Vec::new(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptError {
    #[error("no turn record with id {0}")]
    NotFound(TurnId),
    #[error("source urls for turn {0} were already set")]
    SourcesAlreadySet(TurnId),
}

/// Mutable owner of the conversation history
#[derive(Debug, Default)]
pub struct Transcript {
    records: Vec<Arc<TurnRecord>>,
    /// Position of each record in `records`; records are never removed
    index: HashMap<TurnId, usize>,
    version: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, id: TurnId) -> Option<&Arc<TurnRecord>> {
        self.index.get(&id).map(|&idx| &self.records[idx])
    }

    /// Append a finalized user record
    pub fn append_user_turn(&mut self, content: impl Into<String>) -> Arc<TurnRecord> {
        self.push(TurnRecord::new(Role::User, content.into(), false))
    }

    /// Append an empty, streaming assistant record
    pub fn append_assistant_placeholder(&mut self) -> Arc<TurnRecord> {
        self.push(TurnRecord::new(Role::Assistant, String::new(), true))
    }

    pub fn append_content(&mut self, id: TurnId, delta: &str) -> Result<(), TranscriptError> {
        self.update(id, |record| {
            record.content.push_str(delta);
            Ok(())
        })
    }

    /// Replace the record's stage info wholesale
    pub fn set_stage(&mut self, id: TurnId, snapshot: StageSnapshot) -> Result<(), TranscriptError> {
        self.update(id, |record| {
            record.stage_info = Some(snapshot);
            Ok(())
        })
    }

    pub fn set_source_urls(&mut self, id: TurnId, urls: Vec<String>) -> Result<(), TranscriptError> {
        self.update(id, |record| {
            if !record.source_urls.is_empty() {
                return Err(TranscriptError::SourcesAlreadySet(id));
            }
            record.source_urls = urls;
            Ok(())
        })
    }

    /// Mark the record as no longer streaming. Finalizing twice is a no-op.
    pub fn finalize(&mut self, id: TurnId) -> Result<(), TranscriptError> {
        let record = self.get(id).ok_or(TranscriptError::NotFound(id))?;
        if !record.streaming {
            return Ok(());
        }
        self.update(id, |record| {
            record.streaming = false;
            Ok(())
        })
    }

    /// Immutable view of the current transcript
    pub fn snapshot(&self) -> TranscriptSnapshot {
        TranscriptSnapshot {
            records: self.records.iter().cloned().collect(),
            version: self.version,
        }
    }

    fn push(&mut self, record: TurnRecord) -> Arc<TurnRecord> {
        let record = Arc::new(record);
        self.index.insert(record.id, self.records.len());
        self.records.push(Arc::clone(&record));
        self.version += 1;
        record
    }

    fn update(
        &mut self,
        id: TurnId,
        f: impl FnOnce(&mut TurnRecord) -> Result<(), TranscriptError>,
    ) -> Result<(), TranscriptError> {
        let idx = *self.index.get(&id).ok_or(TranscriptError::NotFound(id))?;
        // Clones the record only if a snapshot still holds it
        let record = Arc::make_mut(&mut self.records[idx]);
        f(record)?;
        self.version += 1;
        Ok(())
    }
}

/// Cheap-to-clone, immutable view of the transcript at one version
#[derive(Debug, Clone)]
pub struct TranscriptSnapshot {
    records: Arc<[Arc<TurnRecord>]>,
    version: u64,
}

impl Default for TranscriptSnapshot {
    fn default() -> Self {
        Self {
            records: Arc::from(Vec::new()),
            version: 0,
        }
    }
}

impl TranscriptSnapshot {
    pub fn records(&self) -> &[Arc<TurnRecord>] {
        &self.records
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: TurnId) -> Option<&Arc<TurnRecord>> {
        self.records.iter().find(|record| record.id == id)
    }

    pub fn last_assistant(&self) -> Option<&Arc<TurnRecord>> {
        self.records.iter().rev().find(|record| !record.is_user())
    }

    pub fn streaming_count(&self) -> usize {
        self.records.iter().filter(|record| record.streaming).count()
    }
}

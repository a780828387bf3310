//! Wire protocol spoken by the search agent
//!
//! Each turn is a `GET {base}/chat_stream/{utterance}` server-sent event
//! stream. Every `data:` payload is a JSON object tagged by `type`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Opaque continuity token issued by the peer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(String);

impl CheckpointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A decoded stream frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Continuity token for the next turn
    Checkpoint { checkpoint_id: CheckpointId },
    /// Answer text delta
    Content { content: String },
    SearchStart { query: String },
    SearchResults {
        #[serde(default, deserialize_with = "null_as_empty")]
        urls: Vec<String>,
    },
    /// Search failure reported by the peer; the turn still ends with `end`
    Error {
        #[serde(default)]
        message: String,
    },
    End,
}

/// `null` and a missing field both mean "no urls"
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

const KNOWN_TYPES: &[&str] = &[
    "checkpoint",
    "content",
    "search_start",
    "search_results",
    "error",
    "end",
];

impl StreamEvent {
    /// Decode one SSE `data:` payload
    pub fn decode(data: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(data).map_err(FrameError::Json)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(FrameError::MissingType)?;
        if !KNOWN_TYPES.contains(&kind) {
            return Err(FrameError::UnknownType(kind.to_string()));
        }
        serde_json::from_value(value).map_err(FrameError::Json)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Checkpoint { .. } => "checkpoint",
            StreamEvent::Content { .. } => "content",
            StreamEvent::SearchStart { .. } => "search_start",
            StreamEvent::SearchResults { .. } => "search_results",
            StreamEvent::Error { .. } => "error",
            StreamEvent::End => "end",
        }
    }
}

/// A frame that could not be turned into a [`StreamEvent`]
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Json(#[source] serde_json::Error),
    #[error("frame has no string `type` field")]
    MissingType,
    #[error("unknown frame type `{0}`")]
    UnknownType(String),
}

#[derive(Debug, Error)]
pub enum UrlError {
    #[error("base url `{0}` cannot carry a path")]
    CannotBeABase(Url),
}

/// Build the stream URL for one turn
///
/// The utterance is pushed as a single path segment, so `/`, `?`, `#` and
/// whitespace are percent-encoded. Any path prefix on `base` is kept.
pub fn chat_stream_url(
    base: &Url,
    utterance: &str,
    checkpoint: Option<&CheckpointId>,
) -> Result<Url, UrlError> {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|()| UrlError::CannotBeABase(base.clone()))?
        .pop_if_empty()
        .push("chat_stream")
        .push(utterance);
    if let Some(checkpoint) = checkpoint {
        url.query_pairs_mut()
            .append_pair("checkpoint_id", checkpoint.as_str());
    }
    Ok(url)
}

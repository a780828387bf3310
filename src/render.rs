//! Terminal rendering of session snapshots
//!
//! Purely a reader of [`SessionSnapshot`]s. [`TerminalRenderer`] prints only
//! what changed since the previous snapshot, comparing row pointers and
//! lengths rather than whole records.

use crate::protocol::CheckpointId;
use crate::runtime::SessionSnapshot;
use crate::stage::{Stage, StageSnapshot};
use crate::transcript::{TurnId, TurnRecord};
use chrono::{DateTime, Local, Utc};
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;
use url::Url;

/// Characters of a malformed URL shown in place of its hostname
const URL_FALLBACK_CHARS: usize = 30;
/// Sources are listed only once the answer has some substance
const SOURCES_MIN_CONTENT_CHARS: usize = 10;
const SESSION_LABEL_CHARS: usize = 8;
const DEFAULT_STAGE_ERROR: &str = "An error occurred during search.";

/// Hostname of `url`, or its first characters if it does not parse
pub fn hostname_label(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => host.to_string(),
            None => truncate(url, URL_FALLBACK_CHARS),
        },
        Err(_) => truncate(url, URL_FALLBACK_CHARS),
    }
}

/// Short label for the conversation, e.g. `Session: abc12345...`
pub fn session_label(checkpoint: &CheckpointId) -> String {
    format!(
        "Session: {}...",
        truncate(checkpoint.as_str(), SESSION_LABEL_CHARS)
    )
}

pub fn timestamp_label(created_at: DateTime<Utc>) -> String {
    created_at.with_timezone(&Local).format("%H:%M").to_string()
}

/// One line for `stage` as it appears in `snapshot`
pub fn stage_line(stage: Stage, snapshot: &StageSnapshot) -> String {
    match stage {
        Stage::Searching => match &snapshot.query {
            Some(query) => format!("● Searching the web: {query}"),
            None => "● Searching the web".to_string(),
        },
        Stage::Reading => {
            if snapshot.urls.is_empty() {
                "● Reading".to_string()
            } else {
                let hosts: Vec<String> = snapshot.urls.iter().map(|u| hostname_label(u)).collect();
                format!("● Reading: {}", hosts.join(", "))
            }
        }
        Stage::Writing => "● Writing answer".to_string(),
        Stage::Error => format!(
            "✖ Search error: {}",
            snapshot.error.as_deref().unwrap_or(DEFAULT_STAGE_ERROR)
        ),
    }
}

/// Whether the source list should be shown under this record
pub fn shows_sources(record: &TurnRecord) -> bool {
    !record.source_urls.is_empty() && record.content.chars().count() > SOURCES_MIN_CONTENT_CHARS
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// What has already been printed for one assistant record
#[derive(Debug, Default)]
struct RowProgress {
    last_seen: Option<Arc<TurnRecord>>,
    stages_printed: usize,
    error_printed: bool,
    /// Byte length of the content already printed
    content_printed: usize,
    finished: bool,
}

/// Incremental, append-only terminal output
#[derive(Debug, Default)]
pub struct TerminalRenderer {
    rows: HashMap<TurnId, RowProgress>,
    session_announced: bool,
}

impl TerminalRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, snapshot: &SessionSnapshot, out: &mut impl Write) -> io::Result<()> {
        if let (false, Some(checkpoint)) = (self.session_announced, &snapshot.checkpoint) {
            writeln!(out, "[{}]", session_label(checkpoint))?;
            self.session_announced = true;
        }

        for record in snapshot.transcript.records() {
            if record.is_user() {
                continue;
            }
            let row = self.rows.entry(record.id).or_default();
            if row.finished {
                continue;
            }
            if row
                .last_seen
                .as_ref()
                .is_some_and(|seen| Arc::ptr_eq(seen, record))
            {
                continue;
            }
            render_row(row, record, out)?;
            row.last_seen = Some(Arc::clone(record));
        }
        out.flush()
    }
}

fn render_row(row: &mut RowProgress, record: &TurnRecord, out: &mut impl Write) -> io::Result<()> {
    if let Some(stage_info) = &record.stage_info {
        let mut lines = Vec::new();
        if stage_info.is_failed() {
            // The error replaces the whole stage list
            if !row.error_printed {
                lines.push(stage_line(Stage::Error, stage_info));
                row.error_printed = true;
            }
        } else {
            for stage in stage_info.stages.iter().skip(row.stages_printed) {
                lines.push(stage_line(*stage, stage_info));
            }
            row.stages_printed = stage_info.stages.len();
        }
        if !lines.is_empty() && row.content_printed > 0 {
            writeln!(out)?;
        }
        for line in lines {
            writeln!(out, "{line}")?;
        }
    }

    if let Some(new_text) = record.content.get(row.content_printed..) {
        if !new_text.is_empty() {
            write!(out, "{new_text}")?;
            row.content_printed = record.content.len();
        }
    }

    if !record.streaming {
        writeln!(out)?;
        if shows_sources(record) {
            writeln!(out, "Sources:")?;
            for url in &record.source_urls {
                writeln!(out, "  - {} ({url})", hostname_label(url))?;
            }
        }
        writeln!(out, "{}", timestamp_label(record.created_at))?;
        row.finished = true;
    }
    Ok(())
}

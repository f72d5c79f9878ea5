//! Independent expectation of the slot layout each turn should produce.
//!
//! The recorder looks only at record kinds and part types, never at what the
//! reconstructor wrote, and keeps a cumulative record for the whole session in
//! `validation.json` (structured) and `validation.md` (for humans). Any
//! disagreement between this record and the interaction directories points at
//! a reconstruction bug. Recording is advisory: failures are logged and
//! swallowed.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use agent_provider::{MessageRecord, ResponsePart};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SessionStoreError;
use crate::paths::{
    interaction_dir_name, request_file_name, response_file_name, VALIDATION_JSON_FILE,
    VALIDATION_MARKDOWN_FILE,
};
use crate::sequencer::InteractionKind;
use crate::store::Session;
use crate::writer::now_rfc3339;

pub const PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedSlot {
    pub number: u32,
    pub kind: InteractionKind,
    pub directory: String,
    pub request_file: String,
    pub response_file: String,
    pub preview: String,
}

impl ExpectedSlot {
    fn new(number: u32, kind: InteractionKind, preview: &str) -> Self {
        Self {
            number,
            kind,
            directory: interaction_dir_name(number, kind),
            request_file: request_file_name(number),
            response_file: response_file_name(number),
            preview: truncate_preview(preview),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationTurn {
    pub turn: u32,
    pub recorded_at: String,
    pub history_len: usize,
    /// Index of the first history record this turn covers.
    pub first_record: usize,
    pub slots: Vec<ExpectedSlot>,
}

/// Cumulative record persisted as `validation.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub session: u32,
    pub turns: Vec<ValidationTurn>,
}

impl ValidationRecord {
    pub fn load(session_dir: &Path) -> Result<Self, SessionStoreError> {
        let path = session_dir.join(VALIDATION_JSON_FILE);
        let raw = fs::read_to_string(&path)
            .map_err(|source| SessionStoreError::io("reading validation record", &path, source))?;
        serde_json::from_str(&raw).map_err(|source| SessionStoreError::json_parse(&path, source))
    }

    /// Every expected slot across all turns, in order.
    pub fn slots(&self) -> impl Iterator<Item = &ExpectedSlot> {
        self.turns.iter().flat_map(|turn| turn.slots.iter())
    }
}

#[derive(Debug, Default)]
pub struct ValidationRecorder {
    consumed: usize,
    record: ValidationRecord,
}

impl ValidationRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn record(&self) -> &ValidationRecord {
        &self.record
    }

    /// Restarts prefix tracking; recorded turns are kept.
    pub fn reset(&mut self) {
        self.consumed = 0;
    }

    /// Appends this turn's expected slots and rewrites both summaries.
    ///
    /// Slot numbers continue from the session's current interaction counter,
    /// so call this before the reconstructor allocates anything for the turn.
    pub fn record_turn(&mut self, session: &Session, history: &[MessageRecord]) {
        if history.len() < self.consumed {
            warn!(
                consumed = self.consumed,
                supplied = history.len(),
                "history shorter than already recorded prefix; turn not recorded"
            );
            return;
        }

        let (slots, consumed) =
            expected_slots(history, self.consumed, session.interaction_count());
        let recorded_at = now_rfc3339().unwrap_or_else(|error| {
            warn!(%error, "validation timestamp unavailable");
            String::new()
        });

        let turn = ValidationTurn {
            turn: self.record.turns.len() as u32 + 1,
            recorded_at,
            history_len: history.len(),
            first_record: self.consumed,
            slots,
        };
        debug!(turn = turn.turn, slots = turn.slots.len(), "validation turn recorded");

        self.consumed = consumed;
        self.record.session = session.number();
        self.record.turns.push(turn);

        if let Err(error) = self.persist(session.dir()) {
            warn!(%error, "failed to persist validation record");
        }
    }

    fn persist(&self, session_dir: &Path) -> Result<(), SessionStoreError> {
        let json_path = session_dir.join(VALIDATION_JSON_FILE);
        let mut body = serde_json::to_string_pretty(&self.record)
            .map_err(|source| SessionStoreError::json_serialize(&json_path, source))?;
        body.push('\n');
        fs::write(&json_path, body).map_err(|source| {
            SessionStoreError::io("writing validation record", &json_path, source)
        })?;

        let markdown_path = session_dir.join(VALIDATION_MARKDOWN_FILE);
        fs::write(&markdown_path, render_markdown(&self.record)).map_err(|source| {
            SessionStoreError::io("writing validation summary", &markdown_path, source)
        })
    }
}

/// Expected slots for `history[from..]`, numbered after `last_number`.
///
/// Returns the slots and the index up to which records are accounted for. A
/// trailing request without a response is not accounted for yet.
#[must_use]
pub fn expected_slots(
    history: &[MessageRecord],
    from: usize,
    last_number: u32,
) -> (Vec<ExpectedSlot>, usize) {
    let mut slots = Vec::new();
    let mut number = last_number;
    let mut cursor = from;

    while cursor < history.len() {
        match (&history[cursor], history.get(cursor + 1)) {
            (MessageRecord::Request(_), Some(MessageRecord::Response(response))) => {
                number += 1;
                slots.push(ExpectedSlot::new(
                    number,
                    InteractionKind::Llm,
                    &llm_preview(&response.parts),
                ));

                for part in &response.parts {
                    if let ResponsePart::ToolCall { tool_name, .. } = part {
                        number += 1;
                        slots.push(ExpectedSlot::new(number, InteractionKind::Tool, tool_name));
                    }
                }
                cursor += 2;
            }
            (MessageRecord::Request(_), None) => break,
            _ => cursor += 1,
        }
    }

    (slots, cursor)
}

fn llm_preview(parts: &[ResponsePart]) -> String {
    let mut tool_calls = 0usize;
    for part in parts {
        match part {
            ResponsePart::Text { content } if !content.trim().is_empty() => {
                return content.clone();
            }
            ResponsePart::Text { .. } => {}
            ResponsePart::ToolCall { .. } => tool_calls += 1,
        }
    }

    if tool_calls > 0 {
        format!("[{tool_calls} tool call(s)]")
    } else {
        "[empty response]".to_string()
    }
}

fn truncate_preview(text: &str) -> String {
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= PREVIEW_CHARS {
        return flattened;
    }

    let mut truncated = flattened.chars().take(PREVIEW_CHARS).collect::<String>();
    truncated.push_str("...");
    truncated
}

fn render_markdown(record: &ValidationRecord) -> String {
    let mut out = String::new();
    let total = record.turns.iter().map(|turn| turn.slots.len()).sum::<usize>();
    let _ = writeln!(out, "# Validation record: session {:03}\n", record.session);
    let _ = writeln!(
        out,
        "Turns recorded: {}. Expected llm/tool interactions: {total}.",
        record.turns.len()
    );

    for turn in &record.turns {
        let _ = writeln!(out, "\n## Turn {}\n", turn.turn);
        let _ = writeln!(
            out,
            "History records {}..{} recorded at {}.\n",
            turn.first_record,
            turn.history_len,
            if turn.recorded_at.is_empty() {
                "unknown time"
            } else {
                turn.recorded_at.as_str()
            }
        );

        if turn.slots.is_empty() {
            out.push_str("No new interactions.\n");
            continue;
        }

        out.push_str("| # | kind | directory | request | response | preview |\n");
        out.push_str("|---|---|---|---|---|---|\n");
        for slot in &turn.slots {
            let _ = writeln!(
                out,
                "| {:03} | {} | {} | {} | {} | {} |",
                slot.number,
                slot.kind.as_str(),
                slot.directory,
                slot.request_file,
                slot.response_file,
                slot.preview.replace('|', "\\|")
            );
        }
    }

    out
}

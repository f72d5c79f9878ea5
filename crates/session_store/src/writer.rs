use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::Path;

use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;

use crate::error::SessionStoreError;
use crate::sequencer::InteractionSlot;

/// Persists interaction payloads into the slots the sequencer allocated.
///
/// Payloads are written as pretty-printed JSON with a trailing newline. Each
/// file is created exactly once; writing an existing file is an error.
pub struct TranscriptWriter;

impl TranscriptWriter {
    pub fn write_request<T: Serialize>(
        slot: &InteractionSlot,
        payload: &T,
    ) -> Result<(), SessionStoreError> {
        write_once(&slot.request_path(), payload)
    }

    pub fn write_response<T: Serialize>(
        slot: &InteractionSlot,
        payload: &T,
    ) -> Result<(), SessionStoreError> {
        write_once(&slot.response_path(), payload)
    }
}

fn write_once<T: Serialize>(path: &Path, payload: &T) -> Result<(), SessionStoreError> {
    let mut body = serde_json::to_string_pretty(payload)
        .map_err(|source| SessionStoreError::json_serialize(path, source))?;
    body.push('\n');

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|source| match source.kind() {
            ErrorKind::AlreadyExists => SessionStoreError::AlreadyWritten {
                path: path.to_path_buf(),
            },
            _ => SessionStoreError::io("creating interaction file", path, source),
        })?;

    file.write_all(body.as_bytes())
        .map_err(|source| SessionStoreError::io("writing interaction file", path, source))?;

    debug!(path = %path.display(), bytes = body.len(), "interaction file written");
    Ok(())
}

pub(crate) fn now_rfc3339() -> Result<String, SessionStoreError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(SessionStoreError::ClockFormat)
}

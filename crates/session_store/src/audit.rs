use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use tracing::info;

use crate::error::SessionStoreError;
use crate::validation::ValidationRecord;

/// One disagreement between the validation record and the session directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Divergence {
    MissingDirectory { number: u32, directory: String },
    MissingRequest { number: u32, file: String },
    MissingResponse { number: u32, file: String },
    Unexpected { directory: String },
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDirectory { number, directory } => {
                write!(f, "interaction {number:03}: directory {directory} is missing")
            }
            Self::MissingRequest { number, file } => {
                write!(f, "interaction {number:03}: request file {file} is missing")
            }
            Self::MissingResponse { number, file } => {
                write!(f, "interaction {number:03}: response file {file} is missing")
            }
            Self::Unexpected { directory } => {
                write!(f, "directory {directory} is not in the validation record")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub expected: usize,
    pub divergences: Vec<Divergence>,
}

impl AuditReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.divergences.is_empty()
    }
}

/// Compares a session directory with its `validation.json`.
///
/// Only `llm` and `tool` interactions are covered; `user` directories are ignored.
pub fn audit_session(session_dir: &Path) -> Result<AuditReport, SessionStoreError> {
    let record = ValidationRecord::load(session_dir)?;
    let mut report = AuditReport::default();
    let mut known = HashSet::new();

    for slot in record.slots() {
        report.expected += 1;
        known.insert(slot.directory.clone());

        let dir = session_dir.join(&slot.directory);
        if !dir.is_dir() {
            report.divergences.push(Divergence::MissingDirectory {
                number: slot.number,
                directory: slot.directory.clone(),
            });
            continue;
        }
        if !dir.join(&slot.request_file).is_file() {
            report.divergences.push(Divergence::MissingRequest {
                number: slot.number,
                file: slot.request_file.clone(),
            });
        }
        if slot.kind.has_response() && !dir.join(&slot.response_file).is_file() {
            report.divergences.push(Divergence::MissingResponse {
                number: slot.number,
                file: slot.response_file.clone(),
            });
        }
    }

    let entries = fs::read_dir(session_dir)
        .map_err(|source| SessionStoreError::io("listing session directory", session_dir, source))?;
    let mut unexpected = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| {
            SessionStoreError::io("listing session directory", session_dir, source)
        })?;
        let name = entry.file_name().to_string_lossy().to_string();
        let audited = name.ends_with("-llm") || name.ends_with("-tool");
        if audited && entry.path().is_dir() && !known.contains(&name) {
            unexpected.push(name);
        }
    }
    unexpected.sort();
    report
        .divergences
        .extend(unexpected.into_iter().map(|directory| Divergence::Unexpected { directory }));

    info!(
        dir = %session_dir.display(),
        expected = report.expected,
        divergences = report.divergences.len(),
        "session audited"
    );
    Ok(report)
}

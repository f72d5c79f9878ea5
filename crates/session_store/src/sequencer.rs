use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SessionStoreError;
use crate::paths::{interaction_dir_name, request_file_name, response_file_name};
use crate::store::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    User,
    Llm,
    Tool,
}

impl InteractionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Llm => "llm",
            Self::Tool => "tool",
        }
    }

    /// `user` interactions record a request only.
    #[must_use]
    pub fn has_response(self) -> bool {
        !matches!(self, Self::User)
    }
}

/// Storage location allocated for one interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionSlot {
    pub number: u32,
    pub kind: InteractionKind,
    pub dir: PathBuf,
}

impl InteractionSlot {
    #[must_use]
    pub fn request_file_name(&self) -> String {
        request_file_name(self.number)
    }

    #[must_use]
    pub fn response_file_name(&self) -> String {
        response_file_name(self.number)
    }

    #[must_use]
    pub fn request_path(&self) -> PathBuf {
        self.dir.join(self.request_file_name())
    }

    #[must_use]
    pub fn response_path(&self) -> PathBuf {
        self.dir.join(self.response_file_name())
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Session {
    /// Issues the next interaction number and creates its directory.
    ///
    /// Numbers are issued 1, 2, 3, ... regardless of kind. The response number
    /// of an `llm`/`tool` slot (N + 1) is derived, never issued here.
    pub fn next_slot(&mut self, kind: InteractionKind) -> Result<InteractionSlot, SessionStoreError> {
        let number = self.interaction_counter + 1;
        let dir = self.dir.join(interaction_dir_name(number, kind));
        fs::create_dir_all(&dir).map_err(|source| {
            SessionStoreError::io("creating interaction directory", &dir, source)
        })?;

        self.interaction_counter = number;
        debug!(number, kind = kind.as_str(), "interaction slot allocated");
        Ok(InteractionSlot { number, kind, dir })
    }
}

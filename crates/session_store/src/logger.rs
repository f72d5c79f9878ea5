use std::path::Path;

use agent_provider::MessageRecord;
use tracing::info;

use crate::error::SessionStoreError;
use crate::reconstruct::{HistoryReconstructor, TurnReport};
use crate::schema::UserInputRecord;
use crate::sequencer::{InteractionKind, InteractionSlot};
use crate::store::{Session, SessionStore};
use crate::validation::{ValidationRecord, ValidationRecorder};
use crate::writer::{now_rfc3339, TranscriptWriter};

/// One session's logger: the session itself plus the per-turn walkers over its history.
#[derive(Debug)]
pub struct SessionLogger {
    session: Session,
    reconstructor: HistoryReconstructor,
    validation: ValidationRecorder,
}

impl SessionLogger {
    /// Starts a new numbered session under `base_dir`.
    pub fn create(base_dir: &Path) -> Result<Self, SessionStoreError> {
        Ok(Self::for_session(SessionStore::create_new(base_dir)?))
    }

    #[must_use]
    pub fn for_session(session: Session) -> Self {
        Self {
            session,
            reconstructor: HistoryReconstructor::new(),
            validation: ValidationRecorder::new(),
        }
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn validation_record(&self) -> &ValidationRecord {
        self.validation.record()
    }

    /// Records what the user typed as a request-only `user` interaction.
    pub fn log_user_input(&mut self, text: &str) -> Result<InteractionSlot, SessionStoreError> {
        let slot = self.session.next_slot(InteractionKind::User)?;
        TranscriptWriter::write_request(
            &slot,
            &UserInputRecord {
                role: "user".to_string(),
                content: text.to_string(),
                timestamp: now_rfc3339()?,
            },
        )?;
        Ok(slot)
    }

    /// Logs the model and tool calls of the latest turn.
    ///
    /// `history` is the runtime's full history so far; earlier turns are not
    /// logged again. The validation record is updated first, from the same
    /// history, before any slot is allocated. A rewritten history is rejected
    /// before either is touched.
    pub fn log_turn(
        &mut self,
        history: &[MessageRecord],
        model_name: &str,
        system_prompt: &str,
    ) -> Result<TurnReport, SessionStoreError> {
        self.reconstructor.resume_index(history)?;
        self.validation.record_turn(&self.session, history);
        self.reconstructor
            .reconstruct_turn(&mut self.session, history, model_name, system_prompt)
    }

    /// Starts a fresh conversation within the same session.
    pub fn reset_history(&mut self) {
        self.reconstructor.reset();
        self.validation.reset();
        info!(session = self.session.number(), "conversation history reset");
    }
}

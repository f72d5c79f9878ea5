//! Glass-box session logging for a terminal coding agent.
//!
//! Every run gets a numbered session directory. Inside it, each user input,
//! model call and tool call becomes a numbered interaction directory holding
//! its request and response, reconstructed from the agent runtime's message
//! history. A cumulative validation record, derived independently from the
//! same history, lets [`audit_session`] check the two against each other.

mod audit;
mod error;
mod logger;
mod paths;
mod reconstruct;
mod schema;
mod sequencer;
mod store;
mod validation;
mod writer;

pub use audit::{audit_session, AuditReport, Divergence};
pub use error::SessionStoreError;
pub use logger::SessionLogger;
pub use paths::{
    interaction_dir_name, request_file_name, response_file_name, session_dir_name, COUNTER_FILE,
    VALIDATION_JSON_FILE, VALIDATION_MARKDOWN_FILE,
};
pub use reconstruct::{HistoryReconstructor, TurnReport, NO_COMMAND, NO_OUTPUT};
pub use schema::{
    ChatChoice, ChatMessage, ChatRequest, ChatResponse, FunctionCall, TokenUsage,
    ToolCallDescriptor, ToolRequestRecord, ToolResponseRecord, UserInputRecord,
};
pub use sequencer::{InteractionKind, InteractionSlot};
pub use store::{Session, SessionStore};
pub use validation::{
    expected_slots, ExpectedSlot, ValidationRecord, ValidationRecorder, ValidationTurn,
    PREVIEW_CHARS,
};
pub use writer::TranscriptWriter;

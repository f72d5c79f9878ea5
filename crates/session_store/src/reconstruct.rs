//! Rebuilds per-call chat transcripts from the runtime's message history.
//!
//! The runtime hands over its full history after every turn. Each request
//! record followed by a response record is one model call and becomes one
//! `llm` interaction; each tool call in that response becomes one `tool`
//! interaction, paired with the tool return found in the requests that follow.

use agent_provider::{MessageRecord, ModelRequest, ModelResponse, RequestPart, ToolCallRef};
use tracing::{debug, info, warn};

use crate::error::SessionStoreError;
use crate::schema::{
    ChatMessage, ChatRequest, ChatResponse, ToolCallDescriptor, ToolRequestRecord,
    ToolResponseRecord,
};
use crate::sequencer::{InteractionKind, InteractionSlot};
use crate::store::Session;
use crate::writer::TranscriptWriter;

pub const NO_OUTPUT: &str = "<no output>";
pub const NO_COMMAND: &str = "<no command>";
const DEFAULT_FINISH_REASON: &str = "stop";

/// Slots emitted while reconstructing one turn, in allocation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnReport {
    pub slots: Vec<InteractionSlot>,
}

impl TurnReport {
    #[must_use]
    pub fn count(&self, kind: InteractionKind) -> usize {
        self.slots.iter().filter(|slot| slot.kind == kind).count()
    }

    #[must_use]
    pub fn numbers(&self) -> Vec<u32> {
        self.slots.iter().map(|slot| slot.number).collect()
    }
}

/// Stateful walker over a growing message history.
///
/// Keeps the records already logged so a resupplied history only emits what
/// is new, and the transcript of the last model call so a turn that opens
/// without a system prompt continues from the right context.
#[derive(Debug, Default)]
pub struct HistoryReconstructor {
    consumed: Vec<MessageRecord>,
    transcript: Vec<ChatMessage>,
}

impl HistoryReconstructor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of history records already logged.
    #[must_use]
    pub fn consumed_len(&self) -> usize {
        self.consumed.len()
    }

    /// Transcript as of the last logged model call, including its assistant message.
    #[must_use]
    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    /// Forgets everything logged so far; the next history starts from scratch.
    pub fn reset(&mut self) {
        self.consumed.clear();
        self.transcript.clear();
    }

    /// Logs every model call and tool call in `history` not logged by an earlier turn.
    ///
    /// A history that no longer starts with the records already logged is
    /// rejected before anything is written.
    pub fn reconstruct_turn(
        &mut self,
        session: &mut Session,
        history: &[MessageRecord],
        model_name: &str,
        system_prompt: &str,
    ) -> Result<TurnReport, SessionStoreError> {
        let mut cursor = self.resume_index(history)?;
        let mut report = TurnReport::default();

        while cursor < history.len() {
            let request = match &history[cursor] {
                MessageRecord::Request(request) => request,
                MessageRecord::Response(_) => {
                    warn!(index = cursor, "response without a preceding request; skipping");
                    self.consume(&history[cursor..=cursor]);
                    cursor += 1;
                    continue;
                }
            };

            let Some(response) = history.get(cursor + 1).and_then(MessageRecord::as_response)
            else {
                if cursor + 1 == history.len() {
                    // Left unconsumed so its response can pair with it on resupply.
                    debug!(index = cursor, "trailing request has no response yet");
                    break;
                }
                debug!(index = cursor, "request has no response; not logged");
                self.consume(&history[cursor..=cursor]);
                cursor += 1;
                continue;
            };

            let pair = &history[cursor..cursor + 2];
            let slot =
                self.log_model_call(session, pair, request, response, model_name, system_prompt)?;
            report.slots.push(slot);

            for call in response.tool_calls() {
                let output = find_tool_return(history, cursor + 2, call.tool_call_id);
                let slot = log_tool_call(session, call, output)?;
                report.slots.push(slot);
            }
            cursor += 2;
        }

        info!(
            llm = report.count(InteractionKind::Llm),
            tool = report.count(InteractionKind::Tool),
            consumed = self.consumed.len(),
            "turn reconstructed"
        );
        Ok(report)
    }

    /// Index where `history` continues past the logged prefix, or why it cannot.
    pub(crate) fn resume_index(
        &self,
        history: &[MessageRecord],
    ) -> Result<usize, SessionStoreError> {
        let divergence = self
            .consumed
            .iter()
            .zip(history)
            .position(|(logged, supplied)| logged != supplied);

        let index = match divergence {
            Some(index) => index,
            None if history.len() < self.consumed.len() => history.len(),
            None => return Ok(self.consumed.len()),
        };

        Err(SessionStoreError::HistoryRewritten {
            index,
            consumed: self.consumed.len(),
            supplied: history.len(),
        })
    }

    fn consume(&mut self, records: &[MessageRecord]) {
        self.consumed.extend_from_slice(records);
    }

    /// Logs one request/response pair as an `llm` interaction.
    ///
    /// The pair is consumed and the transcript advanced as soon as its slot is
    /// allocated, so a failed write is never logged a second time on resupply.
    fn log_model_call(
        &mut self,
        session: &mut Session,
        pair: &[MessageRecord],
        request: &ModelRequest,
        response: &ModelResponse,
        model_name: &str,
        system_prompt: &str,
    ) -> Result<InteractionSlot, SessionStoreError> {
        let mut messages = if request.has_system_prompt() {
            vec![ChatMessage::system(system_prompt)]
        } else {
            self.transcript.clone()
        };
        append_request_parts(&mut messages, request);
        let assistant = assistant_message(response);

        let slot = session.next_slot(InteractionKind::Llm)?;
        let chat_request = ChatRequest {
            model: model_name.to_string(),
            messages,
        };
        let mut transcript = chat_request.messages.clone();
        transcript.push(assistant.clone());
        self.transcript = transcript;
        self.consume(pair);

        TranscriptWriter::write_request(&slot, &chat_request)?;
        let chat_response = ChatResponse::single_choice(
            response.model_name.as_deref().unwrap_or(model_name),
            assistant,
            response
                .finish_reason
                .as_deref()
                .unwrap_or(DEFAULT_FINISH_REASON),
            response.usage.map(Into::into),
        );
        TranscriptWriter::write_response(&slot, &chat_response)?;

        Ok(slot)
    }
}

fn append_request_parts(messages: &mut Vec<ChatMessage>, request: &ModelRequest) {
    for part in &request.parts {
        match part {
            RequestPart::SystemPrompt { .. } => {}
            RequestPart::UserPrompt { content } => messages.push(ChatMessage::user(content)),
            RequestPart::ToolReturn {
                tool_call_id,
                content,
                ..
            } => messages.push(ChatMessage::tool(tool_call_id, content)),
        }
    }
}

fn assistant_message(response: &ModelResponse) -> ChatMessage {
    let texts = response.texts().collect::<Vec<_>>();
    let content = (!texts.is_empty()).then(|| texts.join("\n"));

    let tool_calls = response
        .tool_calls()
        .map(|call| {
            ToolCallDescriptor::function(call.tool_call_id, call.tool_name, call.args.to_object())
        })
        .collect();

    ChatMessage::Assistant {
        content,
        tool_calls,
    }
}

/// Finds the return for `tool_call_id` in the requests that follow a response.
///
/// The search stops at the next response: a return arriving after the model
/// has answered again does not belong to this call.
fn find_tool_return<'a>(
    history: &'a [MessageRecord],
    from: usize,
    tool_call_id: &str,
) -> Option<&'a str> {
    history
        .get(from..)
        .unwrap_or_default()
        .iter()
        .map_while(MessageRecord::as_request)
        .find_map(|request| request.tool_return(tool_call_id))
}

fn log_tool_call(
    session: &mut Session,
    call: ToolCallRef<'_>,
    output: Option<&str>,
) -> Result<InteractionSlot, SessionStoreError> {
    if output.is_none() {
        warn!(
            tool_call_id = call.tool_call_id,
            tool = call.tool_name,
            "tool call has no matching return"
        );
    }

    let slot = session.next_slot(InteractionKind::Tool)?;
    TranscriptWriter::write_request(
        &slot,
        &ToolRequestRecord {
            tool_call_id: call.tool_call_id.to_string(),
            tool_name: call.tool_name.to_string(),
            content: call.args.command().unwrap_or(NO_COMMAND).to_string(),
            arguments: call.args.to_object(),
        },
    )?;

    let content = match output {
        Some(text) if !text.is_empty() => text,
        _ => NO_OUTPUT,
    };
    TranscriptWriter::write_response(
        &slot,
        &ToolResponseRecord {
            tool_call_id: call.tool_call_id.to_string(),
            content: content.to_string(),
            matched: output.is_some(),
        },
    )?;

    Ok(slot)
}

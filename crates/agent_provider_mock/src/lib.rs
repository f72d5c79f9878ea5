//! Deterministic scripted implementation of the shared `agent_provider` contract.
//!
//! This crate contains no transport/protocol logic and is intended for local
//! runs of the driver and for contract-level integration testing.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};

use agent_provider::{
    CancelSignal, MessageRecord, ModelCall, ModelProvider, ModelResponse, ProviderError,
    ProviderProfile, RequestPart, ResponsePart, ToolArguments, Usage,
};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

/// Stable provider identifier used for explicit startup selection.
pub const MOCK_PROVIDER_ID: &str = "mock";

/// Prefix that makes the fallback script answer a user prompt with a shell tool call.
pub const SHELL_PROMPT_PREFIX: &str = "$ ";

/// Name of the single tool the fallback script knows how to call.
pub const SHELL_TOOL_NAME: &str = "shell";

/// Scripted provider used by `coding_agent` tests and local runs.
///
/// Queued responses are returned first, in order. Once the queue is empty the
/// provider falls back to a fixed script: a user prompt starting with `$ `
/// becomes a `shell` tool call, tool returns are acknowledged, and any other
/// prompt is echoed back.
#[derive(Debug)]
pub struct ScriptedProvider {
    model_id: String,
    queued: Mutex<VecDeque<ModelResponse>>,
}

impl ScriptedProvider {
    #[must_use]
    pub fn new(model_id: impl Into<String>) -> Self {
        Self::with_responses(model_id, Vec::new())
    }

    /// Creates a provider that replays `responses` before falling back to the default script.
    #[must_use]
    pub fn with_responses(model_id: impl Into<String>, responses: Vec<ModelResponse>) -> Self {
        Self {
            model_id: sanitize_model_id(model_id.into()),
            queued: Mutex::new(responses.into()),
        }
    }

    #[must_use]
    pub fn queued_len(&self) -> usize {
        lock_unpoisoned(&self.queued).len()
    }

    fn scripted_reply(&self, history: &[MessageRecord]) -> ModelResponse {
        let last_request = history.iter().rev().find_map(MessageRecord::as_request);
        let Some(request) = last_request else {
            return self.finish(vec![ResponsePart::Text {
                content: "Nothing to respond to.".to_string(),
            }]);
        };

        let mut parts = Vec::new();
        let mut tool_returns = 0usize;
        for part in &request.parts {
            match part {
                RequestPart::SystemPrompt { .. } => {}
                RequestPart::UserPrompt { content } => {
                    match content.trim_start().strip_prefix(SHELL_PROMPT_PREFIX) {
                        Some(command) => parts.push(shell_call(command.trim())),
                        None => parts.push(ResponsePart::Text {
                            content: format!("You said: {}", content.trim()),
                        }),
                    }
                }
                RequestPart::ToolReturn { .. } => tool_returns += 1,
            }
        }

        if parts.is_empty() && tool_returns > 0 {
            parts.push(ResponsePart::Text {
                content: format!("Received output from {tool_returns} tool call(s)."),
            });
        }

        self.finish(parts)
    }

    fn finish(&self, parts: Vec<ResponsePart>) -> ModelResponse {
        let has_tool_calls = parts
            .iter()
            .any(|part| matches!(part, ResponsePart::ToolCall { .. }));
        let output_tokens = parts.len() as u64;

        ModelResponse {
            parts,
            model_name: Some(self.model_id.clone()),
            finish_reason: Some(if has_tool_calls { "tool_calls" } else { "stop" }.to_string()),
            usage: Some(Usage {
                input_tokens: 0,
                output_tokens,
            }),
        }
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new(MOCK_PROVIDER_ID)
    }
}

impl ModelProvider for ScriptedProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: MOCK_PROVIDER_ID.to_string(),
            model_id: self.model_id.clone(),
        }
    }

    fn complete(
        &self,
        call: ModelCall<'_>,
        cancel: &CancelSignal,
    ) -> Result<ModelResponse, ProviderError> {
        if cancel.load(Ordering::SeqCst) {
            return Err(ProviderError::Cancelled);
        }

        let queued = lock_unpoisoned(&self.queued).pop_front();
        let response = match queued {
            Some(response) => response,
            None => self.scripted_reply(call.history),
        };

        debug!(
            model = call.model,
            history_len = call.history.len(),
            parts = response.parts.len(),
            "scripted provider produced response"
        );
        Ok(response)
    }
}

fn shell_call(command: &str) -> ResponsePart {
    let mut arguments = Map::new();
    arguments.insert("command".to_string(), Value::String(command.to_string()));

    ResponsePart::ToolCall {
        tool_call_id: format!("call_{}", Uuid::new_v4().simple()),
        tool_name: SHELL_TOOL_NAME.to_string(),
        args: ToolArguments::Structured(arguments),
    }
}

fn sanitize_model_id(model_id: String) -> String {
    let trimmed = model_id.trim();
    if trimmed.is_empty() {
        MOCK_PROVIDER_ID.to_string()
    } else {
        trimmed.to_string()
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use super::*;

    fn complete(provider: &ScriptedProvider, history: &[MessageRecord]) -> ModelResponse {
        let cancel = Arc::new(AtomicBool::new(false));
        provider
            .complete(
                ModelCall {
                    model: "mock",
                    system_prompt: "system",
                    history,
                },
                &cancel,
            )
            .expect("scripted provider should respond")
    }

    fn user(content: &str) -> MessageRecord {
        MessageRecord::request(vec![RequestPart::UserPrompt {
            content: content.to_string(),
        }])
    }

    #[test]
    fn profile_exposes_explicit_mock_provider_identity() {
        let profile = ScriptedProvider::default().profile();

        assert_eq!(profile.provider_id, MOCK_PROVIDER_ID);
        assert_eq!(profile.model_id, "mock");
    }

    #[test]
    fn blank_model_id_falls_back_to_mock() {
        assert_eq!(ScriptedProvider::new("  ").profile().model_id, "mock");
    }

    #[test]
    fn queued_responses_are_replayed_in_order() {
        let provider = ScriptedProvider::with_responses(
            "mock",
            vec![
                ModelResponse::new(vec![ResponsePart::Text {
                    content: "first".to_string(),
                }]),
                ModelResponse::new(vec![ResponsePart::Text {
                    content: "second".to_string(),
                }]),
            ],
        );

        let history = [user("hi")];
        assert_eq!(complete(&provider, &history).texts().next(), Some("first"));
        assert_eq!(complete(&provider, &history).texts().next(), Some("second"));
        assert_eq!(provider.queued_len(), 0);
    }

    #[test]
    fn shell_prefixed_prompt_becomes_tool_call() {
        let provider = ScriptedProvider::default();
        let response = complete(&provider, &[user("$ ls -la")]);

        let call = response.tool_calls().next().expect("tool call expected");
        assert_eq!(call.tool_name, SHELL_TOOL_NAME);
        assert_eq!(call.args.command(), Some("ls -la"));
        assert!(call.tool_call_id.starts_with("call_"));
        assert_eq!(response.finish_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn tool_returns_are_acknowledged_with_text() {
        let provider = ScriptedProvider::default();
        let history = [MessageRecord::request(vec![RequestPart::ToolReturn {
            tool_call_id: "call-1".to_string(),
            tool_name: SHELL_TOOL_NAME.to_string(),
            content: "file1".to_string(),
        }])];

        let response = complete(&provider, &history);
        assert_eq!(
            response.texts().next(),
            Some("Received output from 1 tool call(s).")
        );
        assert_eq!(response.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn cancelled_call_returns_error() {
        let provider = ScriptedProvider::default();
        let cancel = Arc::new(AtomicBool::new(true));
        let history = [user("hi")];

        let error = provider
            .complete(
                ModelCall {
                    model: "mock",
                    system_prompt: "system",
                    history: &history,
                },
                &cancel,
            )
            .expect_err("cancelled call must fail");
        assert_eq!(error, ProviderError::Cancelled);
    }
}

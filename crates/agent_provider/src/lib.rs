//! Provider-neutral contract for the conversation history an agent runtime emits.
//!
//! The runtime produces an append-only sequence of [`MessageRecord`]s: requests
//! sent to the model and responses it returned. This crate only defines those
//! record shapes and the model-call boundary ([`ModelProvider`]). It excludes
//! provider transport details and any logging policy.

use std::sync::{atomic::AtomicBool, Arc};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

/// Shared cancellation flag for one model call.
pub type CancelSignal = Arc<AtomicBool>;

/// One record of the runtime's message history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageRecord {
    Request(ModelRequest),
    Response(ModelResponse),
}

impl MessageRecord {
    #[must_use]
    pub fn request(parts: Vec<RequestPart>) -> Self {
        Self::Request(ModelRequest { parts })
    }

    #[must_use]
    pub fn response(parts: Vec<ResponsePart>) -> Self {
        Self::Response(ModelResponse::new(parts))
    }

    #[must_use]
    pub fn as_request(&self) -> Option<&ModelRequest> {
        match self {
            Self::Request(request) => Some(request),
            Self::Response(_) => None,
        }
    }

    #[must_use]
    pub fn as_response(&self) -> Option<&ModelResponse> {
        match self {
            Self::Request(_) => None,
            Self::Response(response) => Some(response),
        }
    }
}

/// Input sent to the model for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub parts: Vec<RequestPart>,
}

impl ModelRequest {
    /// Returns true when this request opens a conversation with a system prompt.
    #[must_use]
    pub fn has_system_prompt(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, RequestPart::SystemPrompt { .. }))
    }

    /// Returns the tool-return part answering `tool_call_id`, if this request carries one.
    #[must_use]
    pub fn tool_return(&self, tool_call_id: &str) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            RequestPart::ToolReturn {
                tool_call_id: id,
                content,
                ..
            } if id == tool_call_id => Some(content.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "part_kind", rename_all = "kebab-case")]
pub enum RequestPart {
    SystemPrompt {
        content: String,
    },
    UserPrompt {
        content: String,
    },
    ToolReturn {
        tool_call_id: String,
        #[serde(default)]
        tool_name: String,
        content: String,
    },
}

/// Output the model produced for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub parts: Vec<ResponsePart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ModelResponse {
    #[must_use]
    pub fn new(parts: Vec<ResponsePart>) -> Self {
        Self {
            parts,
            model_name: None,
            finish_reason: None,
            usage: None,
        }
    }

    /// Text parts in response order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|part| match part {
            ResponsePart::Text { content } => Some(content.as_str()),
            ResponsePart::ToolCall { .. } => None,
        })
    }

    /// Tool-call parts in response order.
    pub fn tool_calls(&self) -> impl Iterator<Item = ToolCallRef<'_>> {
        self.parts.iter().filter_map(|part| match part {
            ResponsePart::ToolCall {
                tool_call_id,
                tool_name,
                args,
            } => Some(ToolCallRef {
                tool_call_id,
                tool_name,
                args,
            }),
            ResponsePart::Text { .. } => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "part_kind", rename_all = "kebab-case")]
pub enum ResponsePart {
    Text {
        content: String,
    },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        args: ToolArguments,
    },
}

/// Borrowed view of one tool-call part.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolCallRef<'a> {
    pub tool_call_id: &'a str,
    pub tool_name: &'a str,
    pub args: &'a ToolArguments,
}

/// Tool-call argument payload, resolved once when the record is decoded.
///
/// Providers send either a JSON object or a string that may itself encode one.
/// A string that does not parse to an object stays [`ToolArguments::Raw`].
#[derive(Debug, Clone, PartialEq)]
pub enum ToolArguments {
    Structured(Map<String, Value>),
    Raw(String),
}

impl ToolArguments {
    /// Resolves a raw argument string, preferring a nested JSON object.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Self::Structured(map),
            _ => Self::Raw(raw.to_string()),
        }
    }

    /// Returns the string-valued `command` argument when present.
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        match self {
            Self::Structured(map) => map.get("command").and_then(Value::as_str),
            Self::Raw(_) => None,
        }
    }

    /// Arguments as an object; raw payloads are kept under a single `raw` key.
    #[must_use]
    pub fn to_object(&self) -> Map<String, Value> {
        match self {
            Self::Structured(map) => map.clone(),
            Self::Raw(raw) => {
                let mut map = Map::new();
                map.insert("raw".to_string(), Value::String(raw.clone()));
                map
            }
        }
    }
}

impl From<Value> for ToolArguments {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Structured(map),
            Value::String(raw) => Self::parse(&raw),
            other => Self::Raw(other.to_string()),
        }
    }
}

impl From<ToolArguments> for Value {
    fn from(arguments: ToolArguments) -> Self {
        match arguments {
            ToolArguments::Structured(map) => Value::Object(map),
            ToolArguments::Raw(raw) => Value::String(raw),
        }
    }
}

impl Serialize for ToolArguments {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Structured(map) => map.serialize(serializer),
            Self::Raw(raw) => raw.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ToolArguments {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from)
    }
}

/// Token counts reported by a provider for one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Decodes a JSON history array, skipping records that do not match the contract.
///
/// One malformed record never discards the rest of the history; each skipped
/// record is reported at `warn` level with its index.
#[must_use]
pub fn decode_history(value: Value) -> Vec<MessageRecord> {
    let Value::Array(items) = value else {
        warn!("message history is not a JSON array; nothing to decode");
        return Vec::new();
    };

    items
        .into_iter()
        .enumerate()
        .filter_map(
            |(index, item)| match serde_json::from_value::<MessageRecord>(item) {
                Ok(record) => Some(record),
                Err(error) => {
                    warn!(index, %error, "skipping malformed message record");
                    None
                }
            },
        )
        .collect()
}

/// Immutable metadata describing a model provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider_id: String,
    pub model_id: String,
}

/// Input for one model call: the rolling history the runtime has built so far.
#[derive(Debug, Clone, Copy)]
pub struct ModelCall<'a> {
    pub model: &'a str,
    pub system_prompt: &'a str,
    pub history: &'a [MessageRecord],
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("model call was cancelled")]
    Cancelled,

    #[error("model call failed: {0}")]
    Failed(String),
}

/// Model-call boundary. Given the history so far, returns the next response.
pub trait ModelProvider: Send + Sync + 'static {
    /// Returns provider/model identity metadata.
    fn profile(&self) -> ProviderProfile;

    /// Produces the response to the last request in `call.history`.
    fn complete(
        &self,
        call: ModelCall<'_>,
        cancel: &CancelSignal,
    ) -> Result<ModelResponse, ProviderError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn records_decode_from_tagged_json() {
        let history = decode_history(json!([
            {
                "kind": "request",
                "parts": [
                    { "part_kind": "system-prompt", "content": "be brief" },
                    { "part_kind": "user-prompt", "content": "list files" }
                ]
            },
            {
                "kind": "response",
                "parts": [
                    { "part_kind": "text", "content": "Listing." },
                    {
                        "part_kind": "tool-call",
                        "tool_call_id": "call-1",
                        "tool_name": "shell",
                        "args": { "command": "ls" }
                    }
                ],
                "finish_reason": "tool_calls"
            }
        ]));

        assert_eq!(history.len(), 2);
        let request = history[0].as_request().expect("first record is a request");
        assert!(request.has_system_prompt());

        let response = history[1].as_response().expect("second record is a response");
        assert_eq!(response.texts().collect::<Vec<_>>(), vec!["Listing."]);
        let call = response.tool_calls().next().expect("one tool call");
        assert_eq!(call.tool_call_id, "call-1");
        assert_eq!(call.args.command(), Some("ls"));
        assert_eq!(response.finish_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn string_arguments_resolve_to_nested_object_when_possible() {
        let nested = ToolArguments::from(json!("{\"command\": \"pwd\"}"));
        assert_eq!(nested.command(), Some("pwd"));

        let raw = ToolArguments::from(json!("not json"));
        assert_eq!(raw, ToolArguments::Raw("not json".to_string()));
        assert_eq!(raw.command(), None);
        assert_eq!(Value::Object(raw.to_object()), json!({ "raw": "not json" }));

        let array = ToolArguments::from(json!([1, 2]));
        assert_eq!(array, ToolArguments::Raw("[1,2]".to_string()));
    }

    #[test]
    fn structured_command_must_be_a_string() {
        let arguments = ToolArguments::from(json!({ "command": 42 }));
        assert_eq!(arguments.command(), None);
    }

    #[test]
    fn decode_history_skips_malformed_records() {
        let history = decode_history(json!([
            { "kind": "request", "parts": [{ "part_kind": "user-prompt", "content": "hi" }] },
            { "kind": "mystery" },
            { "kind": "response", "parts": [{ "part_kind": "text", "content": "hello" }] }
        ]));

        assert_eq!(history.len(), 2);
        assert!(history[0].as_request().is_some());
        assert!(history[1].as_response().is_some());
    }

    #[test]
    fn decode_history_rejects_non_array_payloads() {
        assert!(decode_history(json!({ "kind": "request" })).is_empty());
    }

    #[test]
    fn tool_return_lookup_matches_by_call_id() {
        let request = ModelRequest {
            parts: vec![
                RequestPart::ToolReturn {
                    tool_call_id: "a".to_string(),
                    tool_name: "shell".to_string(),
                    content: "first".to_string(),
                },
                RequestPart::ToolReturn {
                    tool_call_id: "b".to_string(),
                    tool_name: "shell".to_string(),
                    content: "second".to_string(),
                },
            ],
        };

        assert_eq!(request.tool_return("b"), Some("second"));
        assert_eq!(request.tool_return("c"), None);
    }

    #[test]
    fn usage_total_sums_input_and_output() {
        let usage = Usage {
            input_tokens: 12,
            output_tokens: 30,
        };
        assert_eq!(usage.total_tokens(), 42);
    }

    #[test]
    fn usage_total_saturates_on_huge_counts() {
        let usage = Usage {
            input_tokens: u64::MAX,
            output_tokens: 1,
        };
        assert_eq!(usage.total_tokens(), u64::MAX);
    }

    #[test]
    fn provider_error_messages_are_descriptive() {
        assert_eq!(ProviderError::Cancelled.to_string(), "model call was cancelled");
        assert_eq!(
            ProviderError::Failed("timeout".to_string()).to_string(),
            "model call failed: timeout"
        );
    }
}

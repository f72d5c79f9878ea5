//! Payload shapes written into interaction files.
//!
//! Model calls are stored in the OpenAI chat-completions shape so a logged
//! request can be replayed against a provider API unchanged.

use agent_provider::Usage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One role-tagged message of a chat transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallDescriptor>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    #[must_use]
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

impl ToolCallDescriptor {
    #[must_use]
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Map<String, Value>,
}

/// Request half of an `llm` interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

/// Response half of an `llm` interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub model: String,
    pub choices: Vec<ChatChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl ChatResponse {
    #[must_use]
    pub fn single_choice(
        model: impl Into<String>,
        message: ChatMessage,
        finish_reason: impl Into<String>,
        usage: Option<TokenUsage>,
    ) -> Self {
        Self {
            model: model.into(),
            choices: vec![ChatChoice {
                index: 0,
                message,
                finish_reason: finish_reason.into(),
            }],
            usage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl From<Usage> for TokenUsage {
    fn from(usage: Usage) -> Self {
        Self {
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            total_tokens: usage.total_tokens(),
        }
    }
}

/// Request half of a `tool` interaction; `content` is the command that ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequestRecord {
    pub tool_call_id: String,
    pub tool_name: String,
    pub content: String,
    pub arguments: Map<String, Value>,
}

/// Response half of a `tool` interaction; `content` is the tool output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponseRecord {
    pub tool_call_id: String,
    pub content: String,
    /// False when no tool return with this call id followed the call.
    pub matched: bool,
}

/// The single file of a `user` interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInputRecord {
    pub role: String,
    pub content: String,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn assistant_without_content_or_calls_serializes_bare() {
        let message = ChatMessage::Assistant {
            content: None,
            tool_calls: Vec::new(),
        };

        assert_eq!(
            serde_json::to_value(&message).expect("message should serialize"),
            json!({ "role": "assistant" })
        );
    }

    #[test]
    fn tool_call_descriptor_uses_openai_function_shape() {
        let mut arguments = Map::new();
        arguments.insert("command".to_string(), json!("ls"));
        let message = ChatMessage::Assistant {
            content: Some("Listing.".to_string()),
            tool_calls: vec![ToolCallDescriptor::function("abc123", "shell", arguments)],
        };

        assert_eq!(
            serde_json::to_value(&message).expect("message should serialize"),
            json!({
                "role": "assistant",
                "content": "Listing.",
                "tool_calls": [{
                    "id": "abc123",
                    "type": "function",
                    "function": { "name": "shell", "arguments": { "command": "ls" } }
                }]
            })
        );
    }

    #[test]
    fn usage_maps_to_prompt_and_completion_tokens() {
        let usage = TokenUsage::from(Usage {
            input_tokens: 10,
            output_tokens: 5,
        });

        assert_eq!(
            usage,
            TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }
        );
    }

    #[test]
    fn tool_message_carries_call_id() {
        assert_eq!(
            serde_json::to_value(ChatMessage::tool("abc123", "file1")).expect("serialize"),
            json!({ "role": "tool", "tool_call_id": "abc123", "content": "file1" })
        );
    }
}

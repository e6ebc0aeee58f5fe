//! Anthropic `/v1/messages` non-streaming response and error envelope.

use super::ContentBlock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub id: String,
    #[serde(rename = "type", default = "default_message_type")]
    pub kind: String,
    pub role: String,
    pub content: Vec<ContentBlock>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequence: Option<String>,
    pub usage: Usage,
}

fn default_message_type() -> String {
    "message".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicErrorBody {
    #[serde(rename = "type", default = "default_error_envelope_type")]
    pub kind: String,
    pub error: AnthropicErrorObject,
}

fn default_error_envelope_type() -> String {
    "error".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicErrorObject {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl AnthropicErrorBody {
    /// `kind` is one of Anthropic's documented error types, e.g.
    /// `overloaded_error`, `rate_limit_error`, `api_error`.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: default_error_envelope_type(),
            error: AnthropicErrorObject {
                kind: kind.into(),
                message: message.into(),
                extra: BTreeMap::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_body_shape() {
        let body = AnthropicErrorBody::new("overloaded_error", "try again");
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["type"], json!("error"));
        assert_eq!(value["error"]["type"], json!("overloaded_error"));
        assert_eq!(value["error"]["message"], json!("try again"));
    }

    #[test]
    fn response_with_tool_use_deserializes() {
        let value = json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "model": "claude-sonnet-4-5",
            "content": [{"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {}}],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        });
        let resp: MessagesResponse = serde_json::from_value(value).unwrap();
        assert_eq!(resp.stop_reason.as_deref(), Some("tool_use"));
        assert_eq!(resp.content.len(), 1);
    }
}

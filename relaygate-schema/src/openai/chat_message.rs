//! OpenAI chat-completions message schema.
//!
//! Reference: <https://platform.openai.com/docs/api-reference/chat/create>

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A single `messages[]` entry.
///
/// `content` is kept as a raw `Value` because OpenAI accepts both a plain
/// string and an array of typed parts (text / image_url / input_audio); the
/// transformer layer normalizes it, this schema only preserves shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system` | `user` | `assistant` | `tool`.
    pub role: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,

    /// Present on `role: "assistant"` messages that invoked tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// Present on `role: "tool"` messages; references the originating call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,

    #[serde(rename = "type", default = "default_function_type")]
    pub kind: String,

    pub function: ToolCallFunction,
}

fn default_function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,

    /// JSON-encoded arguments string, passed through verbatim.
    pub arguments: String,
}

impl ChatMessage {
    /// Best-effort extraction of the plain-text portion of `content`.
    ///
    /// Handles both the plain-string shape and the typed-parts array shape
    /// (concatenating `type: "text"` parts with newlines).
    pub fn text_content(&self) -> String {
        match &self.content {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(parts)) => parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_string_content_roundtrips() {
        let msg: ChatMessage =
            serde_json::from_value(json!({"role": "user", "content": "hi"})).unwrap();
        assert_eq!(msg.text_content(), "hi");
        assert_eq!(serde_json::to_value(&msg).unwrap()["content"], json!("hi"));
    }

    #[test]
    fn typed_parts_are_concatenated() {
        let msg: ChatMessage = serde_json::from_value(json!({
            "role": "user",
            "content": [
                {"type": "text", "text": "first"},
                {"type": "image_url", "image_url": {"url": "https://x"}},
                {"type": "text", "text": "second"}
            ]
        }))
        .unwrap();
        assert_eq!(msg.text_content(), "first\nsecond");
    }

    #[test]
    fn tool_call_roundtrips() {
        let input = json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": "get_weather", "arguments": "{\"city\":\"nyc\"}"}
            }]
        });
        let msg: ChatMessage = serde_json::from_value(input.clone()).unwrap();
        assert_eq!(msg.tool_calls.as_ref().unwrap()[0].id, "call_1");
        assert_eq!(serde_json::to_value(&msg).unwrap(), input);
    }
}

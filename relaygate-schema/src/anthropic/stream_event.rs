//! Payload shapes for each `event:`/`data:` pair of a Anthropic messages stream.
//!
//! These are serialized straight onto the wire by the streaming emitter; they
//! don't need to round-trip through deserialization in normal operation, but
//! tests exercise both directions so the emitter and a hypothetical upstream
//! parser agree on shape.

use super::{ContentBlock, Usage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        message: MessageStart,
    },
    ContentBlockStart {
        index: u32,
        content_block: ContentBlockStart,
    },
    ContentBlockDelta {
        index: u32,
        delta: ContentBlockDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        delta: MessageDeltaInner,
        usage: Usage,
    },
    MessageStop,
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageStart {
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

/// The opening shell of a content block; text/tool_use blocks start empty
/// and are filled in by subsequent deltas, thinking blocks start empty too.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlockStart {
    Text { text: String },
    Thinking { thinking: String },
    ToolUse { id: String, name: String, input: serde_json::Value },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlockDelta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    SignatureDelta { signature: String },
    InputJsonDelta { partial_json: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessageDeltaInner {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequence: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDelta {
    pub delta: MessageDeltaInner,
    pub usage: Usage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_block_delta_tags_by_variant() {
        let delta = ContentBlockDelta::TextDelta {
            text: "hi".to_string(),
        };
        let value = serde_json::to_value(&delta).unwrap();
        assert_eq!(value, json!({"type": "text_delta", "text": "hi"}));
    }

    #[test]
    fn message_stop_has_no_payload_fields() {
        let event = StreamEvent::MessageStop;
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"type": "message_stop"}));
    }

    #[test]
    fn content_block_start_tool_use_roundtrips() {
        let event = StreamEvent::ContentBlockStart {
            index: 1,
            content_block: ContentBlockStart::ToolUse {
                id: "toolu_1".to_string(),
                name: "get_weather".to_string(),
                input: json!({}),
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], json!("content_block_start"));
        assert_eq!(value["content_block"]["type"], json!("tool_use"));
    }
}

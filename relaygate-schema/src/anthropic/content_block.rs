//! `/v1/messages` content block schema, shared by requests and responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Anthropic's prompt-caching marker. Forwarded opaquely; the gateway never
/// inspects `ttl`, it only decides whether to attach one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheControl {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
}

impl CacheControl {
    pub fn ephemeral() -> Self {
        Self {
            kind: "ephemeral".to_string(),
            ttl: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

/// A single block of a `content` array, on either the request or response side.
///
/// Unknown block types are not representable here; upstreams that invent new
/// block shapes fail deserialization rather than silently dropping data,
/// which matches how the rest of this schema treats `extra` as the
/// forward-compat escape hatch instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    Image {
        source: ImageSource,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    Thinking {
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    RedactedThinking {
        data: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<ToolResultContent>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
}

/// `tool_result.content` accepts either a plain string or a list of blocks
/// (almost always text/image), mirroring the same plain-vs-typed duality
/// the OpenAI dialect has for `message.content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<ToolResultBlock>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResultBlock {
    Text { text: String },
    Image { source: ImageSource },
    #[serde(other)]
    Unknown,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            cache_control: None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text, .. } => Some(text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_block_roundtrips_with_cache_control() {
        let value = json!({
            "type": "text",
            "text": "hello",
            "cache_control": {"type": "ephemeral"}
        });
        let block: ContentBlock = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(block.as_text(), Some("hello"));
        assert_eq!(serde_json::to_value(&block).unwrap(), value);
    }

    #[test]
    fn tool_result_accepts_plain_string_content() {
        let value = json!({
            "type": "tool_result",
            "tool_use_id": "toolu_1",
            "content": "ok"
        });
        let block: ContentBlock = serde_json::from_value(value).unwrap();
        match block {
            ContentBlock::ToolResult { content: Some(ToolResultContent::Text(s)), .. } => {
                assert_eq!(s, "ok");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn redacted_thinking_roundtrips() {
        let value = json!({"type": "redacted_thinking", "data": "opaque"});
        let block: ContentBlock = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(serde_json::to_value(&block).unwrap(), value);
    }
}

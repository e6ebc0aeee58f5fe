//! Payload shapes scanned out of a Kiro response body.
//!
//! Kiro doesn't send a real AWS event-stream framing; the gateway scans the
//! raw body for known JSON prefixes and extracts a balanced `{...}` object
//! for each one (see the streaming module). These types are what each
//! extracted object deserializes into.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{"content": "..."}` — a chunk of assistant text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentFrame {
    pub content: String,
}

/// `{"name": ..., "toolUseId": ..., "input": ..., "stop": ...}` — tool-use
/// open/update/close. All fields except `name`/`toolUseId` are optional:
/// the open frame carries neither `input` nor `stop`, update frames carry
/// partial `input` (a JSON-fragment string, not parsed JSON), and the
/// closing frame carries `stop: true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUseFrame {
    pub name: String,
    pub tool_use_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<bool>,
}

/// `{"followupPrompt": {...}}` — ignored by the gateway but recognized so it
/// doesn't fall through to the unknown-frame path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowupPromptFrame {
    pub followup_prompt: Value,
}

/// `{"unit": ..., "usage"/"usageCredits": ...}` — Kiro's credit-denominated
/// usage report, emitted once near the end of a stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageFrame {
    pub unit: String,
    #[serde(alias = "usage")]
    pub usage_credits: f64,
}

/// `{"contextUsagePercentage": ...}` — fraction of the context window
/// consumed by the prompt, used for credit→token reconstruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextUsageFrame {
    pub context_usage_percentage: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_use_open_frame_has_no_input_or_stop() {
        let frame: ToolUseFrame = serde_json::from_value(json!({
            "name": "get_weather",
            "toolUseId": "toolu_1"
        }))
        .unwrap();
        assert!(frame.input.is_none());
        assert!(frame.stop.is_none());
    }

    #[test]
    fn usage_frame_accepts_usage_alias() {
        let frame: UsageFrame =
            serde_json::from_value(json!({"unit": "credits", "usage": 1.5})).unwrap();
        assert_eq!(frame.usage_credits, 1.5);
    }
}

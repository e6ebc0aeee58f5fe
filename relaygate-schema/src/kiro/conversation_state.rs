//! CodeWhisperer `conversationState` request schema, used by both
//! `generateAssistantResponse` (Claude models) and `SendMessageStreaming`
//! (Amazon Q models).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationStateRequest {
    pub conversation_state: ConversationState,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    pub chat_trigger_type: String,
    pub conversation_id: String,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    pub current_message: CurrentMessage,
}

/// Externally tagged so each entry serializes as `{"userInputMessage": {...}}`
/// or `{"assistantResponseMessage": {...}}`, matching CodeWhisperer's wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HistoryEntry {
    UserInputMessage(UserInputMessage),
    AssistantResponseMessage(AssistantResponseMessage),
}

impl HistoryEntry {
    pub fn user(message: UserInputMessage) -> Self {
        HistoryEntry::UserInputMessage(message)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        HistoryEntry::AssistantResponseMessage(AssistantResponseMessage {
            content: content.into(),
            tool_uses: None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInputMessage {
    pub content: String,
    pub model_id: String,
    pub origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input_message_context: Option<UserInputMessageContext>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserInputMessageContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<ToolResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpecification>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub tool_use_id: String,
    pub content: Vec<ToolResultContentBlock>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultContentBlock {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpecification {
    pub tool_specification: ToolSpecificationInner,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpecificationInner {
    pub name: String,
    pub description: String,
    pub input_schema: ToolInputSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInputSchema {
    pub json: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantResponseMessage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_uses: Option<Vec<AssistantToolUse>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantToolUse {
    pub tool_use_id: String,
    pub name: String,
    pub input: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentMessage {
    pub user_input_message: UserInputMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn history_entry_user_variant_uses_tagged_key() {
        let entry = HistoryEntry::user(UserInputMessage {
            content: "hi".to_string(),
            model_id: "CLAUDE_SONNET_4_5".to_string(),
            origin: "AI_EDITOR".to_string(),
            user_input_message_context: None,
        });
        let value = serde_json::to_value(&entry).unwrap();
        assert!(value.get("userInputMessage").is_some());
        assert_eq!(value["userInputMessage"]["content"], json!("hi"));
    }

    #[test]
    fn history_entry_assistant_variant_uses_tagged_key() {
        let entry = HistoryEntry::assistant("Continue");
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            value["assistantResponseMessage"]["content"],
            json!("Continue")
        );
    }
}

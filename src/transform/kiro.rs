use relaygate_schema::kiro::{
    AssistantResponseMessage, AssistantToolUse, ConversationState, ConversationStateRequest,
    CurrentMessage, HistoryEntry, ToolResult, ToolResultContentBlock, UserInputMessage,
    UserInputMessageContext,
};
use relaygate_schema::openai::ChatCompletionRequest;

use crate::error::GatewayError;

const TRUNCATION_ARTIFACT: &str = "{";
const CONTINUE_PLACEHOLDER: &str = "Continue";

#[derive(Debug, Clone)]
enum Turn {
    User {
        content: String,
        tool_results: Vec<ToolResult>,
    },
    Assistant {
        content: String,
        tool_uses: Vec<AssistantToolUse>,
    },
}

/// Builds a CodeWhisperer `conversationState` from an OpenAI chat request
/// (§4.4). Pure function: no I/O, no account/credential knowledge.
pub fn openai_to_kiro_conversation_state(
    req: &ChatCompletionRequest,
    conversation_id: impl Into<String>,
    model_id: &str,
) -> Result<ConversationStateRequest, GatewayError> {
    let system_text = req
        .messages
        .iter()
        .filter(|m| m.role == "system")
        .map(|m| m.text_content())
        .collect::<Vec<_>>()
        .join("\n");

    let mut turns = collect_turns(req);
    drop_trailing_truncation_artifact(&mut turns);
    prepend_system_text(&mut turns, &system_text);
    let merged = merge_adjacent_same_role(turns);

    let mut merged = merged;
    let Some(current) = merged.pop() else {
        return Err(GatewayError::Validation(
            "conversation has no messages to send".to_string(),
        ));
    };

    if matches!(merged.last(), Some(Turn::User { .. })) {
        merged.push(Turn::Assistant {
            content: CONTINUE_PLACEHOLDER.to_string(),
            tool_uses: Vec::new(),
        });
    }

    let history = merged
        .into_iter()
        .map(|t| turn_to_history_entry(t, model_id))
        .collect();

    let current_message = match current {
        Turn::User {
            content,
            tool_results,
        } => user_input_message(content, model_id, tool_results),
        Turn::Assistant { content, .. } => {
            // A request should always end on a user turn; fall back to
            // wrapping the content verbatim rather than dropping it.
            user_input_message(content, model_id, Vec::new())
        }
    };

    Ok(ConversationStateRequest {
        conversation_state: ConversationState {
            chat_trigger_type: "MANUAL".to_string(),
            conversation_id: conversation_id.into(),
            history,
            current_message: CurrentMessage {
                user_input_message: current_message,
            },
        },
        extra: Default::default(),
    })
}

fn collect_turns(req: &ChatCompletionRequest) -> Vec<Turn> {
    let mut turns = Vec::new();
    let mut pending_tool_results: Vec<ToolResult> = Vec::new();

    for message in &req.messages {
        match message.role.as_str() {
            "system" => continue,
            "user" => turns.push(Turn::User {
                content: message.text_content(),
                tool_results: std::mem::take(&mut pending_tool_results),
            }),
            "assistant" => {
                let tool_uses = message
                    .tool_calls
                    .as_ref()
                    .map(|calls| {
                        calls
                            .iter()
                            .map(|call| AssistantToolUse {
                                tool_use_id: call.id.clone(),
                                name: call.function.name.clone(),
                                input: serde_json::from_str(&call.function.arguments)
                                    .unwrap_or(serde_json::Value::Null),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                turns.push(Turn::Assistant {
                    content: message.text_content(),
                    tool_uses,
                });
            }
            "tool" => {
                let tool_use_id = message.tool_call_id.clone().unwrap_or_default();
                pending_tool_results.push(ToolResult {
                    tool_use_id,
                    content: vec![ToolResultContentBlock {
                        text: message.text_content(),
                    }],
                    status: "success".to_string(),
                });
            }
            _ => {}
        }
    }

    // Tool results with no following user message become their own turn.
    if !pending_tool_results.is_empty() {
        turns.push(Turn::User {
            content: String::new(),
            tool_results: pending_tool_results,
        });
    }

    turns
}

fn drop_trailing_truncation_artifact(turns: &mut Vec<Turn>) {
    if let Some(Turn::Assistant { content, .. }) = turns.last() {
        if content == TRUNCATION_ARTIFACT {
            turns.pop();
        }
    }
}

fn prepend_system_text(turns: &mut [Turn], system_text: &str) {
    if system_text.is_empty() {
        return;
    }
    if let Some(Turn::User { content, .. }) = turns.first_mut() {
        *content = if content.is_empty() {
            system_text.to_string()
        } else {
            format!("{system_text}\n\n{content}")
        };
    }
}

fn merge_adjacent_same_role(turns: Vec<Turn>) -> Vec<Turn> {
    let mut merged: Vec<Turn> = Vec::with_capacity(turns.len());
    for turn in turns {
        match (merged.last_mut(), &turn) {
            (
                Some(Turn::User {
                    content: prev_content,
                    tool_results: prev_results,
                }),
                Turn::User {
                    content,
                    tool_results,
                },
            ) => {
                if !content.is_empty() {
                    if prev_content.is_empty() {
                        *prev_content = content.clone();
                    } else {
                        prev_content.push('\n');
                        prev_content.push_str(content);
                    }
                }
                prev_results.extend(tool_results.clone());
            }
            (
                Some(Turn::Assistant {
                    content: prev_content,
                    tool_uses: prev_uses,
                }),
                Turn::Assistant { content, tool_uses },
            ) => {
                if !content.is_empty() {
                    prev_content.push('\n');
                    prev_content.push_str(content);
                }
                prev_uses.extend(tool_uses.clone());
            }
            _ => merged.push(turn),
        }
    }
    merged
}

fn user_input_message(
    content: String,
    model_id: &str,
    tool_results: Vec<ToolResult>,
) -> UserInputMessage {
    let context = if tool_results.is_empty() {
        None
    } else {
        Some(UserInputMessageContext {
            tool_results: Some(tool_results),
            tools: None,
        })
    };
    UserInputMessage {
        content,
        model_id: model_id.to_string(),
        origin: "AI_EDITOR".to_string(),
        user_input_message_context: context,
    }
}

fn turn_to_history_entry(turn: Turn, model_id: &str) -> HistoryEntry {
    match turn {
        Turn::User {
            content,
            tool_results,
        } => HistoryEntry::user(user_input_message(content, model_id, tool_results)),
        Turn::Assistant { content, tool_uses } => {
            HistoryEntry::AssistantResponseMessage(AssistantResponseMessage {
                content,
                tool_uses: if tool_uses.is_empty() {
                    None
                } else {
                    Some(tool_uses)
                },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(messages: serde_json::Value) -> ChatCompletionRequest {
        serde_json::from_value(json!({
            "model": "claude-sonnet-4-5",
            "messages": messages
        }))
        .unwrap()
    }

    #[test]
    fn system_message_is_prepended_to_first_user_turn() {
        let req = request(json!([
            {"role": "system", "content": "be terse"},
            {"role": "user", "content": "hi"}
        ]));
        let out = openai_to_kiro_conversation_state(&req, "conv-1", "CLAUDE_SONNET_4_5").unwrap();
        assert!(out
            .conversation_state
            .current_message
            .user_input_message
            .content
            .starts_with("be terse"));
    }

    #[test]
    fn adjacent_user_messages_are_merged() {
        let req = request(json!([
            {"role": "user", "content": "first"},
            {"role": "user", "content": "second"}
        ]));
        let out = openai_to_kiro_conversation_state(&req, "conv-1", "m").unwrap();
        assert!(out.conversation_state.history.is_empty());
        assert_eq!(
            out.conversation_state.current_message.user_input_message.content,
            "first\nsecond"
        );
    }

    #[test]
    fn trailing_literal_brace_assistant_message_is_discarded() {
        let req = request(json!([
            {"role": "user", "content": "hi"},
            {"role": "assistant", "content": "{"},
            {"role": "user", "content": "continue please"}
        ]));
        let out = openai_to_kiro_conversation_state(&req, "conv-1", "m").unwrap();
        // The discarded assistant "{" plus merge means history should just be one user turn.
        assert_eq!(out.conversation_state.history.len(), 1);
    }

    #[test]
    fn history_ending_on_user_gets_synthetic_continue() {
        let req = request(json!([
            {"role": "user", "content": "a"},
            {"role": "assistant", "content": "b"},
            {"role": "user", "content": "c"},
            {"role": "user", "content": "d"}
        ]));
        // "c" and "d" merge into one user turn that becomes currentMessage,
        // leaving history = [user(a), assistant(b)] which already alternates correctly.
        let out = openai_to_kiro_conversation_state(&req, "conv-1", "m").unwrap();
        assert_eq!(out.conversation_state.history.len(), 2);
    }

    #[test]
    fn tool_message_becomes_tool_result_on_next_user_turn() {
        let req = request(json!([
            {"role": "user", "content": "run it"},
            {"role": "assistant", "content": "", "tool_calls": [{
                "id": "call_1", "type": "function",
                "function": {"name": "search", "arguments": "{}"}
            }]},
            {"role": "tool", "tool_call_id": "call_1", "content": "result text"},
            {"role": "user", "content": "thanks"}
        ]));
        let out = openai_to_kiro_conversation_state(&req, "conv-1", "m").unwrap();
        let ctx = out
            .conversation_state
            .current_message
            .user_input_message
            .user_input_message_context
            .as_ref()
            .expect("tool results must be attached");
        let results = ctx.tool_results.as_ref().unwrap();
        assert_eq!(results[0].tool_use_id, "call_1");
    }
}

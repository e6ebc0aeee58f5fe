use relaygate_schema::anthropic::{ContentBlock, MessagesRequest, Message, MessageContent, SystemPrompt, Tool as AnthropicTool, ToolResultContent};
use relaygate_schema::openai::{ChatCompletionRequest, ChatMessage, ChatTool, ChatToolFunction, ToolCall, ToolCallFunction};

const DEFAULT_ANTHROPIC_MAX_TOKENS: u32 = 4096;

/// OpenAI chat-completions request → Anthropic messages request (§4.4,
/// supplemental). Lets the OpenAI-dialect endpoints also route to
/// Claude/Factory/Antigravity accounts.
pub fn openai_to_anthropic(req: &ChatCompletionRequest) -> MessagesRequest {
    let system_text = req
        .messages
        .iter()
        .filter(|m| m.role == "system")
        .map(|m| m.text_content())
        .collect::<Vec<_>>()
        .join("\n");

    let mut turns: Vec<(String, Vec<ContentBlock>)> = Vec::new();
    for message in &req.messages {
        let (role, blocks): (&str, Vec<ContentBlock>) = match message.role.as_str() {
            "system" => continue,
            "user" => ("user", vec![ContentBlock::text(message.text_content())]),
            "assistant" => {
                let mut blocks = Vec::new();
                let text = message.text_content();
                if !text.is_empty() {
                    blocks.push(ContentBlock::text(text));
                }
                if let Some(tool_calls) = &message.tool_calls {
                    for call in tool_calls {
                        blocks.push(ContentBlock::ToolUse {
                            id: call.id.clone(),
                            name: call.function.name.clone(),
                            input: serde_json::from_str(&call.function.arguments)
                                .unwrap_or(serde_json::Value::Null),
                            cache_control: None,
                        });
                    }
                }
                ("assistant", blocks)
            }
            "tool" => (
                "user",
                vec![ContentBlock::ToolResult {
                    tool_use_id: message.tool_call_id.clone().unwrap_or_default(),
                    content: Some(ToolResultContent::Text(message.text_content())),
                    is_error: None,
                    cache_control: None,
                }],
            ),
            _ => continue,
        };
        append_turn(&mut turns, role, blocks);
    }

    let messages = turns
        .into_iter()
        .map(|(role, blocks)| Message {
            role,
            content: MessageContent::Blocks(blocks),
        })
        .collect();

    let tools = req.tools.as_ref().map(|tools| {
        tools
            .iter()
            .map(|tool| AnthropicTool {
                name: tool.function.name.clone(),
                description: tool.function.description.clone(),
                input_schema: tool
                    .function
                    .parameters
                    .clone()
                    .unwrap_or_else(|| serde_json::json!({"type": "object"})),
                cache_control: None,
            })
            .collect()
    });

    MessagesRequest {
        model: req.model.clone(),
        messages,
        system: (!system_text.is_empty()).then(|| SystemPrompt::Text(system_text)),
        max_tokens: req.effective_max_tokens().unwrap_or(DEFAULT_ANTHROPIC_MAX_TOKENS),
        temperature: req.temperature,
        top_p: req.top_p,
        top_k: None,
        stop_sequences: None,
        stream: req.stream,
        tools,
        tool_choice: None,
        thinking: None,
        extra: Default::default(),
    }
}

fn append_turn(turns: &mut Vec<(String, Vec<ContentBlock>)>, role: &str, blocks: Vec<ContentBlock>) {
    if blocks.is_empty() {
        return;
    }
    if let Some((last_role, last_blocks)) = turns.last_mut() {
        if last_role == role {
            last_blocks.extend(blocks);
            return;
        }
    }
    turns.push((role.to_string(), blocks));
}

/// Anthropic messages request → OpenAI chat-completions request (§4.4,
/// supplemental; inverse of [`openai_to_anthropic`]). Lets the Anthropic
/// dialect route to pools whose transform chain starts from OpenAI shape
/// (Kiro).
pub fn anthropic_to_openai(req: &MessagesRequest) -> ChatCompletionRequest {
    let mut messages = Vec::new();
    if let Some(system) = &req.system {
        let text = system.as_plain_text();
        if !text.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: Some(serde_json::Value::String(text)),
                tool_calls: None,
                tool_call_id: None,
                name: None,
                extra: Default::default(),
            });
        }
    }

    for message in &req.messages {
        let blocks = message.content.as_blocks();
        let mut text_parts = Vec::new();
        let mut tool_calls = Vec::new();

        for block in &blocks {
            match block {
                ContentBlock::Text { text, .. } => text_parts.push(text.clone()),
                ContentBlock::ToolUse { id, name, input, .. } if message.role == "assistant" => {
                    tool_calls.push(ToolCall {
                        id: id.clone(),
                        kind: "function".to_string(),
                        function: ToolCallFunction {
                            name: name.clone(),
                            arguments: input.to_string(),
                        },
                    });
                }
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } => {
                    messages.push(ChatMessage {
                        role: "tool".to_string(),
                        content: Some(serde_json::Value::String(tool_result_text(content))),
                        tool_calls: None,
                        tool_call_id: Some(tool_use_id.clone()),
                        name: None,
                        extra: Default::default(),
                    });
                }
                _ => {}
            }
        }

        if text_parts.is_empty() && tool_calls.is_empty() {
            continue;
        }
        messages.push(ChatMessage {
            role: message.role.clone(),
            content: (!text_parts.is_empty())
                .then(|| serde_json::Value::String(text_parts.join("\n"))),
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            tool_call_id: None,
            name: None,
            extra: Default::default(),
        });
    }

    let tools = req.tools.as_ref().map(|tools| {
        tools
            .iter()
            .map(|tool| ChatTool {
                kind: "function".to_string(),
                function: ChatToolFunction {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: Some(tool.input_schema.clone()),
                },
            })
            .collect()
    });

    ChatCompletionRequest {
        model: req.model.clone(),
        messages,
        tools,
        tool_choice: None,
        stream: req.stream,
        stream_options: None,
        max_tokens: Some(req.max_tokens),
        max_completion_tokens: None,
        temperature: req.temperature,
        top_p: req.top_p,
        prompt_cache_key: None,
        user: None,
        extra: Default::default(),
    }
}

fn tool_result_text(content: &Option<ToolResultContent>) -> String {
    match content {
        Some(ToolResultContent::Text(text)) => text.clone(),
        Some(ToolResultContent::Blocks(blocks)) => blocks
            .iter()
            .filter_map(|b| match b {
                relaygate_schema::anthropic::ToolResultBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        None => String::new(),
    }
}

/// Anthropic `stop_reason` → OpenAI `finish_reason` (§4.4).
pub fn anthropic_stop_reason_to_openai_finish_reason(stop_reason: &str) -> &'static str {
    match stop_reason {
        "end_turn" => "stop",
        "max_tokens" => "length",
        "tool_use" => "tool_calls",
        _ => "stop",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: serde_json::Value) -> ChatCompletionRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn system_messages_collapse_into_anthropic_system() {
        let req = request(json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "system", "content": "be terse"},
                {"role": "user", "content": "hi"}
            ]
        }));
        let out = openai_to_anthropic(&req);
        assert_eq!(out.system.unwrap().as_plain_text(), "be terse");
        assert_eq!(out.messages.len(), 1);
    }

    #[test]
    fn missing_max_tokens_defaults_to_4096() {
        let req = request(json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "hi"}]
        }));
        let out = openai_to_anthropic(&req);
        assert_eq!(out.max_tokens, 4096);
    }

    #[test]
    fn tool_calls_map_to_tool_use_blocks_by_id() {
        let req = request(json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "user", "content": "search it"},
                {"role": "assistant", "content": null, "tool_calls": [{
                    "id": "call_1", "type": "function",
                    "function": {"name": "search", "arguments": "{\"q\":\"rust\"}"}
                }]},
                {"role": "tool", "tool_call_id": "call_1", "content": "results here"}
            ]
        }));
        let out = openai_to_anthropic(&req);
        assert_eq!(out.messages.len(), 3);
        let assistant_blocks = out.messages[1].content.as_blocks();
        match &assistant_blocks[0] {
            ContentBlock::ToolUse { id, name, .. } => {
                assert_eq!(id, "call_1");
                assert_eq!(name, "search");
            }
            other => panic!("expected tool_use, got {other:?}"),
        }
        let tool_result_blocks = out.messages[2].content.as_blocks();
        match &tool_result_blocks[0] {
            ContentBlock::ToolResult { tool_use_id, .. } => assert_eq!(tool_use_id, "call_1"),
            other => panic!("expected tool_result, got {other:?}"),
        }
    }

    #[test]
    fn anthropic_system_becomes_openai_system_message() {
        let req: MessagesRequest = serde_json::from_value(json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 256,
            "system": "be terse",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();
        let out = anthropic_to_openai(&req);
        assert_eq!(out.messages[0].role, "system");
        assert_eq!(out.messages[0].text_content(), "be terse");
    }

    #[test]
    fn anthropic_tool_use_becomes_openai_tool_call() {
        let req: MessagesRequest = serde_json::from_value(json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 256,
            "messages": [
                {"role": "user", "content": "search it"},
                {"role": "assistant", "content": [
                    {"type": "tool_use", "id": "toolu_1", "name": "search", "input": {"q": "rust"}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_1", "content": "results here"}
                ]}
            ]
        }))
        .unwrap();
        let out = anthropic_to_openai(&req);
        let assistant = out.messages.iter().find(|m| m.role == "assistant").unwrap();
        assert_eq!(assistant.tool_calls.as_ref().unwrap()[0].id, "toolu_1");
        let tool_msg = out.messages.iter().find(|m| m.role == "tool").unwrap();
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("toolu_1"));
    }

    #[test]
    fn finish_reason_mapping_matches_table() {
        assert_eq!(anthropic_stop_reason_to_openai_finish_reason("end_turn"), "stop");
        assert_eq!(anthropic_stop_reason_to_openai_finish_reason("max_tokens"), "length");
        assert_eq!(anthropic_stop_reason_to_openai_finish_reason("tool_use"), "tool_calls");
    }
}

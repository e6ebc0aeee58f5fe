use std::collections::HashMap;

use serde_json::{Value, json};

use relaygate_schema::anthropic::{
    ContentBlock, ImageSource, MessagesRequest, ToolResultBlock, ToolResultContent,
};
use relaygate_schema::gemini::{
    Content, FunctionDeclaration, GeminiGenerateContentRequest, GenerationConfig, Part, Tool,
    ToolConfig,
};

use crate::transform::cache_control::apply_cache_point;

const DEFAULT_TEMPERATURE: f64 = 0.4;
const DEFAULT_TOP_P: f64 = 1.0;
const DEFAULT_TOP_K: u32 = 40;
const STOP_SEQUENCES: &[&str] = &[
    "<|user|>",
    "<|bot|>",
    "<|context_request|>",
    "<|endoftext|>",
    "<|end_of_turn|>",
];

struct FlatEntry {
    role: &'static str,
    part: Part,
    function_call_id: Option<String>,
    function_response_id: Option<String>,
}

/// Anthropic `/v1/messages` request → Gemini `generateContent` request (§4.4).
pub fn anthropic_to_gemini(req: &MessagesRequest) -> GeminiGenerateContentRequest {
    let tool_use_names = collect_tool_use_names(req);
    let mut flat = flatten_messages(req, &tool_use_names);
    reorganize_tool_pairs(&mut flat);

    let contents = flat
        .into_iter()
        .map(|entry| Content {
            role: Some(entry.role.to_string()),
            parts: vec![entry.part],
            extra: Default::default(),
        })
        .collect();

    let system_instruction = req.system.as_ref().map(|system| Content {
        role: Some("user".to_string()),
        parts: vec![Part {
            text: Some(system.as_plain_text()),
            ..Default::default()
        }],
        extra: Default::default(),
    });

    let tools = build_tools(req);
    let tool_config = tools.as_ref().map(|_| ToolConfig {
        function_calling_config: Some(json!({"mode": "VALIDATED"})),
        retrieval_config: None,
        extra: Default::default(),
    });

    GeminiGenerateContentRequest {
        contents,
        system_instruction,
        generation_config: Some(build_generation_config(req)),
        tools,
        tool_config,
        extra: Default::default(),
    }
}

fn collect_tool_use_names(req: &MessagesRequest) -> HashMap<String, String> {
    let mut names = HashMap::new();
    for message in &req.messages {
        for block in message.content.as_blocks() {
            if let ContentBlock::ToolUse { id, name, .. } = block {
                names.insert(id, name);
            }
        }
    }
    names
}

fn flatten_messages(req: &MessagesRequest, tool_use_names: &HashMap<String, String>) -> Vec<FlatEntry> {
    let mut flat = Vec::new();
    for message in &req.messages {
        let role: &'static str = if message.role == "assistant" { "model" } else { "user" };
        for block in message.content.as_blocks() {
            if let Some(entry) = block_to_entry(role, block, tool_use_names) {
                flat.push(entry);
            }
        }
    }
    flat
}

fn block_to_entry(
    role: &'static str,
    block: ContentBlock,
    tool_use_names: &HashMap<String, String>,
) -> Option<FlatEntry> {
    match block {
        ContentBlock::Text { text, cache_control } => {
            let mut part = Part {
                text: Some(text),
                ..Default::default()
            };
            apply_cache_point(&mut part, cache_control.is_some());
            Some(FlatEntry {
                role,
                part,
                function_call_id: None,
                function_response_id: None,
            })
        }
        ContentBlock::Image { source, cache_control } => {
            let mut part = match source {
                ImageSource::Base64 { media_type, data } => Part {
                    inline_data: Some(json!({"mimeType": media_type, "data": data})),
                    ..Default::default()
                },
                ImageSource::Url { url } => Part {
                    file_data: Some(json!({"fileUri": url})),
                    ..Default::default()
                },
            };
            apply_cache_point(&mut part, cache_control.is_some());
            Some(FlatEntry {
                role,
                part,
                function_call_id: None,
                function_response_id: None,
            })
        }
        ContentBlock::Thinking { thinking, signature } => {
            let signature = signature.filter(|s| !s.is_empty())?;
            Some(FlatEntry {
                role,
                part: Part {
                    text: Some(thinking),
                    thought: Some(true),
                    thought_signature: Some(signature),
                    ..Default::default()
                },
                function_call_id: None,
                function_response_id: None,
            })
        }
        // Redacted thinking never carries a reusable signature, so per §4.4
        // it has no Gemini representation.
        ContentBlock::RedactedThinking { .. } => None,
        ContentBlock::ToolUse {
            id,
            name,
            input,
            cache_control,
        } => {
            let mut part = Part {
                function_call: Some(json!({"id": id, "name": name, "args": input})),
                ..Default::default()
            };
            apply_cache_point(&mut part, cache_control.is_some());
            Some(FlatEntry {
                role,
                part,
                function_call_id: Some(id),
                function_response_id: None,
            })
        }
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            cache_control,
            ..
        } => {
            let name = tool_use_names
                .get(&tool_use_id)
                .cloned()
                .unwrap_or_default();
            let output = tool_result_text(content);
            let mut part = Part {
                function_response: Some(
                    json!({"id": tool_use_id, "name": name, "response": {"output": output}}),
                ),
                ..Default::default()
            };
            apply_cache_point(&mut part, cache_control.is_some());
            Some(FlatEntry {
                role,
                part,
                function_call_id: None,
                function_response_id: Some(tool_use_id),
            })
        }
    }
}

fn tool_result_text(content: Option<ToolResultContent>) -> String {
    match content {
        Some(ToolResultContent::Text(text)) => text,
        Some(ToolResultContent::Blocks(blocks)) => blocks
            .into_iter()
            .filter_map(|block| match block {
                ToolResultBlock::Text { text } => Some(text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        None => String::new(),
    }
}

/// Moves each `functionResponse` entry to immediately follow the
/// `functionCall` entry it answers, matched by id (§4.4, P8).
fn reorganize_tool_pairs(flat: &mut Vec<FlatEntry>) {
    let mut i = 0;
    while i < flat.len() {
        if let Some(id) = flat[i].function_call_id.clone() {
            let found = flat
                .iter()
                .skip(i + 1)
                .position(|entry| entry.function_response_id.as_deref() == Some(id.as_str()))
                .map(|offset| offset + i + 1);
            if let Some(j) = found {
                if j != i + 1 {
                    let entry = flat.remove(j);
                    flat.insert(i + 1, entry);
                }
            }
        }
        i += 1;
    }
}

fn build_tools(req: &MessagesRequest) -> Option<Vec<Tool>> {
    let tools = req.tools.as_ref()?;
    if tools.is_empty() {
        return None;
    }
    let declarations = tools
        .iter()
        .map(|tool| FunctionDeclaration {
            name: tool.name.clone(),
            description: tool.description.clone().unwrap_or_default(),
            behavior: None,
            parameters: Some(tool.input_schema.clone()),
            parameters_json_schema: None,
            response: None,
            response_json_schema: None,
            extra: Default::default(),
        })
        .collect();
    Some(vec![Tool {
        function_declarations: Some(declarations),
        extra: Default::default(),
    }])
}

fn build_generation_config(req: &MessagesRequest) -> GenerationConfig {
    let mut config = GenerationConfig {
        temperature: Some(req.temperature.map(f64::from).unwrap_or(DEFAULT_TEMPERATURE)),
        top_p: Some(DEFAULT_TOP_P),
        top_k: Some(DEFAULT_TOP_K),
        max_output_tokens: Some(req.max_tokens),
        thinking_config: None,
        image_config: None,
        extra: Default::default(),
    };

    config.extra.insert("candidateCount".to_string(), json!(1));
    config.extra.insert(
        "stopSequences".to_string(),
        json!(STOP_SEQUENCES),
    );

    if let Some(thinking) = &req.thinking {
        config.thinking_config = Some(build_thinking_config(thinking, req.max_tokens));
    }

    config
}

fn build_thinking_config(thinking: &Value, max_tokens: u32) -> Value {
    let requested_budget = thinking
        .get("budget_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(u64::from(max_tokens.saturating_sub(1)));

    let budget = if max_tokens > 0 && requested_budget >= u64::from(max_tokens) {
        u64::from(max_tokens.saturating_sub(1))
    } else {
        requested_budget
    };

    json!({
        "includeThoughts": true,
        "thinkingBudget": budget,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: Value) -> MessagesRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn text_message_maps_to_single_part_content() {
        let req = request(json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 100,
            "messages": [{"role": "user", "content": "hi"}]
        }));
        let out = anthropic_to_gemini(&req);
        assert_eq!(out.contents.len(), 1);
        assert_eq!(out.contents[0].role.as_deref(), Some("user"));
        assert_eq!(out.contents[0].parts[0].text.as_deref(), Some("hi"));
    }

    #[test]
    fn system_text_collapses_into_system_instruction() {
        let req = request(json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 100,
            "system": "be terse",
            "messages": [{"role": "user", "content": "hi"}]
        }));
        let out = anthropic_to_gemini(&req);
        let instr = out.system_instruction.unwrap();
        assert_eq!(instr.role.as_deref(), Some("user"));
        assert_eq!(instr.parts[0].text.as_deref(), Some("be terse"));
    }

    #[test]
    fn tool_use_is_immediately_followed_by_matching_tool_result() {
        let req = request(json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 100,
            "messages": [
                {"role": "user", "content": "what's the weather"},
                {"role": "assistant", "content": [
                    {"type": "text", "text": "let me check"},
                    {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"city": "nyc"}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_1", "content": "sunny"}
                ]}
            ]
        }));
        let out = anthropic_to_gemini(&req);
        // [user text, model text, model functionCall, user functionResponse]
        assert_eq!(out.contents.len(), 4);
        assert!(out.contents[2].parts[0].function_call.is_some());
        assert!(out.contents[3].parts[0].function_response.is_some());
    }

    #[test]
    fn reorganization_pass_moves_out_of_order_tool_result_next_to_its_call() {
        let req = request(json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 100,
            "messages": [
                {"role": "user", "content": "do two things"},
                {"role": "assistant", "content": [
                    {"type": "tool_use", "id": "toolu_1", "name": "a", "input": {}},
                    {"type": "tool_use", "id": "toolu_2", "name": "b", "input": {}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_2", "content": "b done"},
                    {"type": "tool_result", "tool_use_id": "toolu_1", "content": "a done"}
                ]}
            ]
        }));
        let out = anthropic_to_gemini(&req);
        // call(1), response(1), call(2), response(2)
        let fr = |c: &Content| c.parts[0].function_response.clone();
        let fc = |c: &Content| c.parts[0].function_call.clone();
        assert!(fc(&out.contents[1]).unwrap()["id"] == json!("toolu_1"));
        assert!(fr(&out.contents[2]).unwrap()["id"] == json!("toolu_1"));
        assert!(fc(&out.contents[3]).unwrap()["id"] == json!("toolu_2"));
        assert!(fr(&out.contents[4]).unwrap()["id"] == json!("toolu_2"));
    }

    #[test]
    fn thinking_budget_is_clamped_below_max_tokens() {
        let req = request(json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 100,
            "thinking": {"type": "enabled", "budget_tokens": 500},
            "messages": [{"role": "user", "content": "hi"}]
        }));
        let out = anthropic_to_gemini(&req);
        let thinking_config = out.generation_config.unwrap().thinking_config.unwrap();
        assert_eq!(thinking_config["thinkingBudget"], json!(99));
    }

    #[test]
    fn redacted_thinking_block_is_dropped() {
        let req = request(json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 100,
            "messages": [{"role": "assistant", "content": [
                {"type": "redacted_thinking", "data": "opaque"}
            ]}]
        }));
        let out = anthropic_to_gemini(&req);
        assert!(out.contents.is_empty());
    }

    #[test]
    fn tools_become_single_tool_with_validated_mode() {
        let req = request(json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 100,
            "messages": [{"role": "user", "content": "hi"}],
            "tools": [{"name": "search", "description": "search the web", "input_schema": {"type": "object"}}]
        }));
        let out = anthropic_to_gemini(&req);
        let tools = out.tools.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].function_declarations.as_ref().unwrap().len(), 1);
        assert_eq!(
            out.tool_config.unwrap().function_calling_config,
            Some(json!({"mode": "VALIDATED"}))
        );
    }
}

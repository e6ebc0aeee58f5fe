use relaygate_schema::anthropic::{ContentBlock, MessageContent, MessagesRequest, SystemPrompt};
use relaygate_schema::gemini::GeminiGenerateContentRequest;

use crate::tokenizer::Tokenizer;

const IMAGE_TOKEN_COST: u64 = 300;

/// Text-estimate fallback used when an upstream response omits usage (§4.7).
/// Sums every text-ish field plus a flat per-image cost; floors at 1 so a
/// request is never logged with zero input tokens.
pub fn estimate_anthropic_input_tokens(req: &MessagesRequest, tokenizer: &dyn Tokenizer) -> u64 {
    let mut tokens = 0u64;
    let mut images = 0u64;

    if let Some(system) = &req.system {
        tokens += tokenizer.count_tokens(&system.as_plain_text());
        if let SystemPrompt::Blocks(blocks) = system {
            images += blocks.iter().filter(|b| matches!(b, ContentBlock::Image { .. })).count() as u64;
        }
    }

    for message in &req.messages {
        let blocks = match &message.content {
            MessageContent::Text(text) => {
                tokens += tokenizer.count_tokens(text);
                continue;
            }
            MessageContent::Blocks(blocks) => blocks,
        };
        for block in blocks {
            match block {
                ContentBlock::Text { text, .. } => tokens += tokenizer.count_tokens(text),
                ContentBlock::Thinking { thinking, .. } => tokens += tokenizer.count_tokens(thinking),
                ContentBlock::ToolUse { input, .. } => {
                    tokens += tokenizer.count_tokens(&input.to_string())
                }
                ContentBlock::ToolResult { content, .. } => {
                    if let Some(content) = content {
                        tokens += tokenizer.count_tokens(&tool_result_text(content));
                    }
                }
                ContentBlock::Image { .. } => images += 1,
                ContentBlock::RedactedThinking { .. } => {}
            }
        }
    }

    (tokens + images * IMAGE_TOKEN_COST).max(1)
}

fn tool_result_text(content: &relaygate_schema::anthropic::ToolResultContent) -> String {
    use relaygate_schema::anthropic::ToolResultContent;
    match content {
        ToolResultContent::Text(text) => text.clone(),
        ToolResultContent::Blocks(_) => String::new(),
    }
}

/// Gemini-dialect counterpart: sums `contents[].text|thinking|functionCall`
/// (serialized) across every turn, plus `systemInstruction`, plus 300 per
/// inline image part.
pub fn estimate_gemini_input_tokens(req: &GeminiGenerateContentRequest, tokenizer: &dyn Tokenizer) -> u64 {
    let mut tokens = 0u64;
    let mut images = 0u64;

    let all_contents = req.system_instruction.iter().chain(req.contents.iter());
    for content in all_contents {
        for part in &content.parts {
            if let Some(text) = &part.text {
                tokens += tokenizer.count_tokens(text);
            }
            if let Some(call) = &part.function_call {
                tokens += tokenizer.count_tokens(&call.to_string());
            }
            if let Some(response) = &part.function_response {
                tokens += tokenizer.count_tokens(&response.to_string());
            }
            if part.inline_data.is_some() {
                images += 1;
            }
        }
    }

    (tokens + images * IMAGE_TOKEN_COST).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::NaiveTokenizer;
    use serde_json::json;

    #[test]
    fn empty_request_still_floors_to_one_token() {
        let req: MessagesRequest = serde_json::from_value(json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 10,
            "messages": []
        }))
        .unwrap();
        assert_eq!(estimate_anthropic_input_tokens(&req, &NaiveTokenizer), 1);
    }

    #[test]
    fn images_add_flat_per_image_cost() {
        let req: MessagesRequest = serde_json::from_value(json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 10,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "abc"}}
                ]
            }]
        }))
        .unwrap();
        assert_eq!(estimate_anthropic_input_tokens(&req, &NaiveTokenizer), 300);
    }

    #[test]
    fn gemini_system_instruction_and_contents_are_summed() {
        let req: GeminiGenerateContentRequest = serde_json::from_value(json!({
            "systemInstruction": {"parts": [{"text": "be terse"}]},
            "contents": [{"role": "user", "parts": [{"text": "hello there"}]}]
        }))
        .unwrap();
        let tokens = estimate_gemini_input_tokens(&req, &NaiveTokenizer);
        assert!(tokens > 0);
    }
}

use relaygate_schema::gemini::GeminiResponseBody;

/// A single function call extracted from a Gemini candidate.
pub struct ExtractedToolCall {
    pub name: String,
    pub args: serde_json::Value,
}

/// Flattened view of a Gemini response's first candidate, independent of
/// whether it arrived as one aggregate body or one `GeminiArrayParser`
/// object in a stream. Anthropic- and OpenAI-dialect response/stream
/// builders both drive off this shape rather than walking `Content`/`Part`
/// directly.
#[derive(Default)]
pub struct GeminiExtractedParts {
    pub text: String,
    pub thinking: String,
    pub thinking_signature: Option<String>,
    pub tool_calls: Vec<ExtractedToolCall>,
    pub finish_reason: Option<String>,
}

/// Extracts text/thinking/tool-call parts from the first candidate of a
/// Gemini response body (§4.5). Gemini-Antigravity marks thought parts with
/// `part.thought == Some(true)`; everything else with a non-empty `text` is
/// ordinary output.
pub fn extract_gemini_parts(body: &GeminiResponseBody) -> GeminiExtractedParts {
    let mut out = GeminiExtractedParts::default();

    let Some(candidate) = body.candidates.first() else {
        return out;
    };
    out.finish_reason = candidate.finish_reason.clone();

    let Some(content) = &candidate.content else {
        return out;
    };

    for part in &content.parts {
        if let Some(text) = &part.text {
            if part.thought == Some(true) {
                out.thinking.push_str(text);
                if out.thinking_signature.is_none() {
                    out.thinking_signature = part.thought_signature.clone();
                }
            } else {
                out.text.push_str(text);
            }
            continue;
        }

        if let Some(call) = &part.function_call {
            let name = call
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let args = call.get("args").cloned().unwrap_or(serde_json::json!({}));
            out.tool_calls.push(ExtractedToolCall { name, args });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: serde_json::Value) -> GeminiResponseBody {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn plain_text_candidate_extracts_as_text() {
        let b = body(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "hello"}]},
                "finishReason": "STOP"
            }]
        }));
        let parts = extract_gemini_parts(&b);
        assert_eq!(parts.text, "hello");
        assert!(parts.thinking.is_empty());
        assert_eq!(parts.finish_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn thought_part_is_separated_from_text() {
        let b = body(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "reasoning", "thought": true, "thoughtSignature": "sig"},
                    {"text": "answer"}
                ]}
            }]
        }));
        let parts = extract_gemini_parts(&b);
        assert_eq!(parts.thinking, "reasoning");
        assert_eq!(parts.thinking_signature.as_deref(), Some("sig"));
        assert_eq!(parts.text, "answer");
    }

    #[test]
    fn function_call_part_becomes_tool_call() {
        let b = body(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"functionCall": {"name": "search", "args": {"q": "rust"}}}
                ]}
            }]
        }));
        let parts = extract_gemini_parts(&b);
        assert_eq!(parts.tool_calls.len(), 1);
        assert_eq!(parts.tool_calls[0].name, "search");
        assert_eq!(parts.tool_calls[0].args, json!({"q": "rust"}));
    }

    #[test]
    fn no_candidates_yields_empty_parts() {
        let b = body(json!({"candidates": []}));
        let parts = extract_gemini_parts(&b);
        assert!(parts.text.is_empty());
        assert!(parts.tool_calls.is_empty());
    }
}

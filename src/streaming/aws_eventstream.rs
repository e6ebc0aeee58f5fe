use serde::Deserialize;
use serde_json::Value;

/// Known JSON object shapes that appear inside a Kiro AWS event-stream frame
/// (§4.5). The wire format is detected by scanning for one of these literal
/// prefixes, then extracting the balanced `{...}` that follows.
const KNOWN_PREFIXES: &[&str] = &[
    r#"{"content":"#,
    r#"{"name":"#,
    r#"{"followupPrompt":"#,
    r#"{"input":"#,
    r#"{"stop":"#,
    r#"{"unit":"#,
    r#"{"contextUsagePercentage":"#,
];

#[derive(Debug, Clone, PartialEq)]
pub enum KiroFrame {
    /// Text delta; caller is responsible for deduplicating against the
    /// immediately preceding delta (handled one layer up, where prior state
    /// is available).
    Content(String),
    ToolOpen { tool_use_id: String, name: String, input: Option<String> },
    ToolInputContinuation(String),
    ToolStop,
    Credits { unit: String, usage: f64 },
    ContextUsage(f64),
}

#[derive(Deserialize)]
struct ContentFrame {
    content: String,
}

#[derive(Deserialize)]
struct ToolFrame {
    name: Option<String>,
    #[serde(rename = "toolUseId")]
    tool_use_id: Option<String>,
    input: Option<String>,
    stop: Option<bool>,
}

#[derive(Deserialize)]
struct InputOnlyFrame {
    input: String,
}

#[derive(Deserialize)]
struct StopOnlyFrame {
    #[allow(dead_code)]
    stop: bool,
}

#[derive(Deserialize)]
struct CreditFrame {
    unit: String,
    usage: f64,
}

#[derive(Deserialize)]
struct ContextUsageFrame {
    #[serde(rename = "contextUsagePercentage")]
    context_usage_percentage: f64,
}

/// Scans raw accumulated text for known frame prefixes, extracts the
/// balanced JSON object for each, and classifies it. Returns the classified
/// frames found plus the unconsumed tail (held back for the next call, since
/// a prefix or brace may be split across reads).
pub fn scan_frames(buffer: &str) -> (Vec<KiroFrame>, String) {
    let mut frames = Vec::new();
    let mut cursor = 0usize;

    loop {
        let remaining = &buffer[cursor..];
        let Some((prefix_offset, _prefix)) = KNOWN_PREFIXES
            .iter()
            .filter_map(|p| remaining.find(p).map(|idx| (idx, *p)))
            .min_by_key(|(idx, _)| *idx)
        else {
            break;
        };

        let object_start = cursor + prefix_offset;
        match extract_balanced_object(&buffer[object_start..]) {
            Some(object_text) => {
                if let Some(frame) = classify(object_text) {
                    frames.push(frame);
                }
                cursor = object_start + object_text.len();
            }
            None => {
                // Incomplete object; stop here and hold back from object_start.
                return (frames, buffer[object_start..].to_string());
            }
        }
    }

    (frames, buffer[cursor..].to_string())
}

/// Extracts the shortest balanced `{...}` starting at byte 0 of `text`,
/// respecting string/escape rules. Returns `None` if the object never
/// closes within `text`.
fn extract_balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0u32;
    let mut in_string = false;
    let mut escaped = false;

    for (byte_idx, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = byte_idx + c.len_utf8();
                    return Some(&text[..end]);
                }
            }
            _ => {}
        }
    }
    None
}

fn classify(object_text: &str) -> Option<KiroFrame> {
    if let Ok(frame) = serde_json::from_str::<ToolFrame>(object_text) {
        if let (Some(name), Some(tool_use_id)) = (frame.name.clone(), frame.tool_use_id.clone()) {
            return Some(KiroFrame::ToolOpen {
                tool_use_id,
                name,
                input: frame.input,
            });
        }
        if frame.stop == Some(true) {
            return Some(KiroFrame::ToolStop);
        }
    }
    if let Ok(frame) = serde_json::from_str::<InputOnlyFrame>(object_text) {
        return Some(KiroFrame::ToolInputContinuation(frame.input));
    }
    if serde_json::from_str::<StopOnlyFrame>(object_text).is_ok() {
        return Some(KiroFrame::ToolStop);
    }
    if let Ok(frame) = serde_json::from_str::<CreditFrame>(object_text) {
        return Some(KiroFrame::Credits {
            unit: frame.unit,
            usage: frame.usage,
        });
    }
    if let Ok(frame) = serde_json::from_str::<ContextUsageFrame>(object_text) {
        return Some(KiroFrame::ContextUsage(frame.context_usage_percentage));
    }
    if let Ok(frame) = serde_json::from_str::<ContentFrame>(object_text) {
        return Some(KiroFrame::Content(frame.content));
    }
    if let Ok(value) = serde_json::from_str::<Value>(object_text) {
        tracing::debug!(?value, "unrecognized kiro event-stream frame shape");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_frame_is_classified() {
        let (frames, rest) = scan_frames(r#"{"content":"hello"}"#);
        assert_eq!(frames, vec![KiroFrame::Content("hello".to_string())]);
        assert!(rest.is_empty());
    }

    #[test]
    fn tool_open_frame_with_input() {
        let (frames, _) =
            scan_frames(r#"{"name":"search","toolUseId":"abc","input":"{\"q\":1}"}"#);
        assert_eq!(
            frames,
            vec![KiroFrame::ToolOpen {
                tool_use_id: "abc".to_string(),
                name: "search".to_string(),
                input: Some(r#"{"q":1}"#.to_string()),
            }]
        );
    }

    #[test]
    fn standalone_input_continuation() {
        let (frames, _) = scan_frames(r#"{"input":"more json"}"#);
        assert_eq!(
            frames,
            vec![KiroFrame::ToolInputContinuation("more json".to_string())]
        );
    }

    #[test]
    fn standalone_stop_frame() {
        let (frames, _) = scan_frames(r#"{"stop":true}"#);
        assert_eq!(frames, vec![KiroFrame::ToolStop]);
    }

    #[test]
    fn credit_usage_frame() {
        let (frames, _) = scan_frames(r#"{"unit":"CREDIT","usage":2.5}"#);
        assert_eq!(
            frames,
            vec![KiroFrame::Credits {
                unit: "CREDIT".to_string(),
                usage: 2.5
            }]
        );
    }

    #[test]
    fn context_usage_frame() {
        let (frames, _) = scan_frames(r#"{"contextUsagePercentage":42.0}"#);
        assert_eq!(frames, vec![KiroFrame::ContextUsage(42.0)]);
    }

    #[test]
    fn multiple_frames_in_one_buffer() {
        let (frames, rest) =
            scan_frames(r#"{"content":"a"}junk{"content":"b"}"#);
        assert_eq!(
            frames,
            vec![
                KiroFrame::Content("a".to_string()),
                KiroFrame::Content("b".to_string())
            ]
        );
        assert!(rest.is_empty());
    }

    #[test]
    fn incomplete_trailing_object_is_held_back() {
        let (frames, rest) = scan_frames(r#"{"content":"a"}{"content":"incomple"#);
        assert_eq!(frames, vec![KiroFrame::Content("a".to_string())]);
        assert_eq!(rest, r#"{"content":"incomple"#);
    }
}

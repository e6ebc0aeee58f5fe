use relaygate_schema::anthropic::{
    ContentBlockDelta, ContentBlockStart, MessageDeltaInner, MessageStart, StreamEvent, Usage,
};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    Thinking,
    ToolUse,
}

/// Rolling state during Anthropic SSE emission (§3 StreamingState).
/// Invariant: at most one block is open; every `content_block_start` is
/// matched by exactly one `content_block_stop` before the next `_start` or
/// `message_stop`.
pub struct AnthropicStreamEmitter {
    message_sent: bool,
    block_index: u32,
    current_block: Option<BlockKind>,
    input_tokens: u64,
    saw_tool_use: bool,
    finish_reason: Option<String>,
}

impl AnthropicStreamEmitter {
    pub fn new() -> Self {
        Self {
            message_sent: false,
            block_index: 0,
            current_block: None,
            input_tokens: 0,
            saw_tool_use: false,
            finish_reason: None,
        }
    }

    /// Emits `message_start` if this is the first call; no-op afterward.
    pub fn start(&mut self, model: &str, input_tokens: u64) -> Vec<StreamEvent> {
        if self.message_sent {
            return Vec::new();
        }
        self.message_sent = true;
        self.input_tokens = input_tokens;
        vec![StreamEvent::MessageStart {
            message: MessageStart {
                id: format!("msg_{}", Uuid::new_v4().simple()),
                kind: "message".to_string(),
                role: "assistant".to_string(),
                content: Vec::new(),
                model: model.to_string(),
                stop_reason: None,
                stop_sequence: None,
                usage: Usage {
                    input_tokens,
                    output_tokens: 0,
                    cache_creation_input_tokens: None,
                    cache_read_input_tokens: None,
                },
            },
        }]
    }

    pub fn text_delta(&mut self, text: String) -> Vec<StreamEvent> {
        let mut events = self.ensure_block_open(BlockKind::Text, || ContentBlockStart::Text {
            text: String::new(),
        });
        events.push(StreamEvent::ContentBlockDelta {
            index: self.block_index,
            delta: ContentBlockDelta::TextDelta { text },
        });
        events
    }

    pub fn thinking_delta(&mut self, thinking: String) -> Vec<StreamEvent> {
        let mut events = self.ensure_block_open(BlockKind::Thinking, || ContentBlockStart::Thinking {
            thinking: String::new(),
        });
        events.push(StreamEvent::ContentBlockDelta {
            index: self.block_index,
            delta: ContentBlockDelta::ThinkingDelta { thinking },
        });
        events
    }

    /// A thinking signature arriving after the thinking text is done; block
    /// must already be open as Thinking.
    pub fn signature_delta(&mut self, signature: String) -> Vec<StreamEvent> {
        if self.current_block != Some(BlockKind::Thinking) {
            return Vec::new();
        }
        vec![StreamEvent::ContentBlockDelta {
            index: self.block_index,
            delta: ContentBlockDelta::SignatureDelta { signature },
        }]
    }

    pub fn tool_use_start(&mut self, id: String, name: String) -> Vec<StreamEvent> {
        self.saw_tool_use = true;
        self.ensure_block_open(BlockKind::ToolUse, || ContentBlockStart::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: serde_json::json!({}),
        })
    }

    pub fn tool_use_input_delta(&mut self, partial_json: String) -> Vec<StreamEvent> {
        if self.current_block != Some(BlockKind::ToolUse) {
            return Vec::new();
        }
        vec![StreamEvent::ContentBlockDelta {
            index: self.block_index,
            delta: ContentBlockDelta::InputJsonDelta { partial_json },
        }]
    }

    /// Closes whatever block is open, if any, first emitting
    /// `content_block_stop` for it. Block-type switches and the final close
    /// both go through here.
    pub fn close_current_block(&mut self) -> Vec<StreamEvent> {
        if self.current_block.take().is_some() {
            let event = StreamEvent::ContentBlockStop {
                index: self.block_index,
            };
            self.block_index += 1;
            vec![event]
        } else {
            Vec::new()
        }
    }

    pub fn set_finish_reason(&mut self, reason: impl Into<String>) {
        self.finish_reason = Some(reason.into());
    }

    /// Emits the final `message_delta` + `message_stop` pair, closing any
    /// still-open block first.
    pub fn finish(&mut self, output_tokens: u64) -> Vec<StreamEvent> {
        let mut events = self.close_current_block();

        let stop_reason = if self.saw_tool_use {
            "tool_use"
        } else if self.finish_reason.as_deref() == Some("MAX_TOKENS") {
            "max_tokens"
        } else {
            "end_turn"
        };

        events.push(StreamEvent::MessageDelta {
            delta: MessageDeltaInner {
                stop_reason: Some(stop_reason.to_string()),
                stop_sequence: None,
            },
            usage: Usage {
                input_tokens: self.input_tokens,
                output_tokens,
                cache_creation_input_tokens: None,
                cache_read_input_tokens: None,
            },
        });
        events.push(StreamEvent::MessageStop);
        events
    }

    fn ensure_block_open(
        &mut self,
        kind: BlockKind,
        start_payload: impl FnOnce() -> ContentBlockStart,
    ) -> Vec<StreamEvent> {
        if self.current_block == Some(kind) {
            return Vec::new();
        }

        let mut events = self.close_current_block();
        self.current_block = Some(kind);
        events.push(StreamEvent::ContentBlockStart {
            index: self.block_index,
            content_block: start_payload(),
        });
        events
    }
}

impl Default for AnthropicStreamEmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_tags(events: &[StreamEvent]) -> Vec<&'static str> {
        events
            .iter()
            .map(|e| match e {
                StreamEvent::MessageStart { .. } => "message_start",
                StreamEvent::ContentBlockStart { .. } => "content_block_start",
                StreamEvent::ContentBlockDelta { .. } => "content_block_delta",
                StreamEvent::ContentBlockStop { .. } => "content_block_stop",
                StreamEvent::MessageDelta { .. } => "message_delta",
                StreamEvent::MessageStop => "message_stop",
                StreamEvent::Ping => "ping",
            })
            .collect()
    }

    #[test]
    fn text_only_stream_has_balanced_start_stop() {
        let mut e = AnthropicStreamEmitter::new();
        let mut events = e.start("claude-sonnet-4-5", 10);
        events.extend(e.text_delta("hello".to_string()));
        events.extend(e.text_delta(" world".to_string()));
        events.extend(e.finish(5));

        assert_eq!(
            type_tags(&events),
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
    }

    #[test]
    fn switching_block_type_closes_previous_block_first() {
        let mut e = AnthropicStreamEmitter::new();
        e.start("m", 1);
        e.text_delta("a".to_string());
        let switch = e.tool_use_start("toolu_1".to_string(), "search".to_string());
        assert_eq!(type_tags(&switch), vec!["content_block_stop", "content_block_start"]);
    }

    #[test]
    fn tool_use_sets_stop_reason_to_tool_use() {
        let mut e = AnthropicStreamEmitter::new();
        e.start("m", 1);
        e.tool_use_start("toolu_1".to_string(), "search".to_string());
        e.tool_use_input_delta(r#"{"q":"#.to_string());
        let finish = e.finish(3);
        let StreamEvent::MessageDelta { delta, .. } = &finish[1] else {
            panic!("expected message_delta at index 1");
        };
        assert_eq!(delta.stop_reason.as_deref(), Some("tool_use"));
    }

    #[test]
    fn max_tokens_finish_reason_maps_through_when_no_tool_use() {
        let mut e = AnthropicStreamEmitter::new();
        e.start("m", 1);
        e.text_delta("partial".to_string());
        e.set_finish_reason("MAX_TOKENS");
        let finish = e.finish(100);
        let StreamEvent::MessageDelta { delta, .. } = &finish[1] else {
            panic!("expected message_delta at index 1");
        };
        assert_eq!(delta.stop_reason.as_deref(), Some("max_tokens"));
    }

    #[test]
    fn message_start_is_idempotent() {
        let mut e = AnthropicStreamEmitter::new();
        let first = e.start("m", 1);
        let second = e.start("m", 1);
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }
}

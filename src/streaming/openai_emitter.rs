use relaygate_schema::openai::{
    ChatChunkChoice, ChatChunkDelta, ChatCompletionChunk, ToolCall, ToolCallFunction, Usage,
};
use uuid::Uuid;

/// Builds OpenAI-dialect streaming chunks from upstream deltas (§4.5).
pub struct OpenAiStreamEmitter {
    id: String,
    model: String,
    created_unix: i64,
    role_sent: bool,
    tool_calls: Vec<ToolCall>,
}

impl OpenAiStreamEmitter {
    pub fn new(model: impl Into<String>, created_unix: i64) -> Self {
        Self {
            id: format!("chatcmpl-{}", Uuid::new_v4().simple()),
            model: model.into(),
            created_unix,
            role_sent: false,
            tool_calls: Vec::new(),
        }
    }

    fn chunk(&self, delta: ChatChunkDelta, finish_reason: Option<String>, usage: Option<Usage>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created_unix,
            model: self.model.clone(),
            choices: vec![ChatChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            usage,
        }
    }

    /// First chunk of the stream: `delta.role = "assistant"`.
    pub fn start(&mut self) -> ChatCompletionChunk {
        self.role_sent = true;
        self.chunk(
            ChatChunkDelta {
                role: Some("assistant".to_string()),
                content: None,
                tool_calls: None,
            },
            None,
            None,
        )
    }

    pub fn text_delta(&mut self, text: String) -> ChatCompletionChunk {
        self.chunk(
            ChatChunkDelta {
                role: None,
                content: Some(text),
                tool_calls: None,
            },
            None,
            None,
        )
    }

    pub fn record_tool_call(&mut self, id: String, name: String, arguments: String) {
        self.tool_calls.push(ToolCall {
            id,
            kind: "function".to_string(),
            function: ToolCallFunction { name, arguments },
        });
    }

    /// Flushes recorded tool calls as a single final delta, or (if none were
    /// recorded) a terminal `stop` chunk with usage. Either way, callers
    /// still emit `data: [DONE]` after this.
    pub fn finish(&mut self, prompt_tokens: u64, completion_tokens: u64) -> ChatCompletionChunk {
        let usage = Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        };

        if !self.tool_calls.is_empty() {
            self.chunk(
                ChatChunkDelta {
                    role: None,
                    content: None,
                    tool_calls: Some(std::mem::take(&mut self.tool_calls)),
                },
                Some("tool_calls".to_string()),
                Some(usage),
            )
        } else {
            self.chunk(
                ChatChunkDelta {
                    role: None,
                    content: None,
                    tool_calls: None,
                },
                Some("stop".to_string()),
                Some(usage),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_chunk_carries_assistant_role_only() {
        let mut e = OpenAiStreamEmitter::new("gpt-4o", 1000);
        let chunk = e.start();
        assert_eq!(chunk.choices[0].delta.role.as_deref(), Some("assistant"));
        assert!(chunk.choices[0].delta.content.is_none());
    }

    #[test]
    fn finish_without_tool_calls_uses_stop_reason() {
        let mut e = OpenAiStreamEmitter::new("gpt-4o", 1000);
        e.start();
        e.text_delta("hi".to_string());
        let finish = e.finish(10, 2);
        assert_eq!(finish.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(finish.usage.unwrap().total_tokens, 12);
    }

    #[test]
    fn finish_with_tool_calls_uses_tool_calls_reason() {
        let mut e = OpenAiStreamEmitter::new("gpt-4o", 1000);
        e.start();
        e.record_tool_call("call_1".to_string(), "search".to_string(), "{}".to_string());
        let finish = e.finish(5, 1);
        assert_eq!(finish.choices[0].finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(finish.choices[0].delta.tool_calls.as_ref().unwrap().len(), 1);
    }
}

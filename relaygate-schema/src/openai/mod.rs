//! OpenAI chat-completions dialect schema.

mod chat_message;
mod chat_request;
mod chat_response;

pub use chat_message::{ChatMessage, ToolCall, ToolCallFunction};
pub use chat_request::{ChatCompletionRequest, ChatTool, ChatToolFunction};
pub use chat_response::{
    ChatChoice, ChatChoiceMessage, ChatChunkChoice, ChatChunkDelta, ChatCompletionChunk,
    ChatCompletionResponse, OpenaiErrorBody, OpenaiErrorObject, Usage,
};

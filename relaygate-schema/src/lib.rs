pub mod anthropic;
pub mod gemini;
pub mod geminibusiness;
pub mod kiro;
pub mod openai;

pub use anthropic::{
    AnthropicErrorBody, AnthropicErrorObject, ContentBlock, MessagesRequest, MessagesResponse,
};
pub use gemini::{
    Content, GeminiGenerateContentRequest, GeminiModel, GeminiModelList, GeminiResponseBody,
    GenerationConfig, Part,
};
pub use geminibusiness::{
    WidgetCreateSessionRequest, WidgetCreateSessionResponse, WidgetStreamAssistRequest,
};
pub use kiro::{ConversationState, ConversationStateRequest, HistoryEntry};
pub use openai::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage,
    OpenaiErrorBody,
};

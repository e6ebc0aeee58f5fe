//! Anthropic `/v1/messages` dialect schema.

mod content_block;
mod messages_request;
mod messages_response;
mod stream_event;

pub use content_block::{CacheControl, ContentBlock, ImageSource, ToolResultBlock, ToolResultContent};
pub use messages_request::{Message, MessageContent, MessagesRequest, SystemPrompt, Tool, ToolChoice};
pub use messages_response::{AnthropicErrorBody, AnthropicErrorObject, MessagesResponse, Usage};
pub use stream_event::{
    ContentBlockDelta, ContentBlockStart, MessageDelta, MessageDeltaInner, MessageStart,
    StreamEvent,
};

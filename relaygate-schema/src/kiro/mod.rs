//! CodeWhisperer (Kiro) wire schema: the `conversationState` request shape
//! and the frame payloads scanned out of its pseudo-event-stream response.

mod conversation_state;
mod stream_frame;

pub use conversation_state::{
    AssistantResponseMessage, AssistantToolUse, ConversationState, ConversationStateRequest,
    CurrentMessage, HistoryEntry, ToolInputSchema, ToolResult, ToolResultContentBlock,
    ToolSpecification, ToolSpecificationInner, UserInputMessage, UserInputMessageContext,
};
pub use stream_frame::{ContentFrame, ContextUsageFrame, FollowupPromptFrame, ToolUseFrame, UsageFrame};

mod anthropic_emitter;
mod anthropic_sse;
mod aws_eventstream;
mod gemini_array;
mod openai_emitter;
mod think_tag;

pub use anthropic_emitter::AnthropicStreamEmitter;
pub use anthropic_sse::reframe_line;
pub use aws_eventstream::{KiroFrame, scan_frames};
pub use gemini_array::GeminiArrayParser;
pub use openai_emitter::OpenAiStreamEmitter;
pub use think_tag::{ThinkChunk, ThinkTagSplitter};

mod alias;
mod anthropic;
mod cache_control;
mod gemini_response;
mod kiro;
mod openai;

pub use alias::{anthropic_model_to_gemini, anthropic_model_to_kiro};
pub use anthropic::anthropic_to_gemini;
pub use gemini_response::{ExtractedToolCall, GeminiExtractedParts, extract_gemini_parts};
pub use kiro::openai_to_kiro_conversation_state;
pub use openai::{
    anthropic_stop_reason_to_openai_finish_reason, anthropic_to_openai, openai_to_anthropic,
};

mod estimate;
mod kiro_credits;
mod pricing;

pub use estimate::{estimate_anthropic_input_tokens, estimate_gemini_input_tokens};
pub use kiro_credits::{KiroUsageEstimate, reconstruct_kiro_usage};
pub use pricing::{KIRO_PRICING, ModelPricing, pricing_for};

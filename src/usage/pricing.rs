use ahash::AHashMap;
use std::sync::LazyLock;

/// Per-model $/Mtok pricing used to reconstruct Kiro's credit-denominated
/// usage into token counts (§4.7).
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    pub input_price: f64,
    pub output_price: f64,
    pub cache_create_price: f64,
    pub cache_read_price: f64,
    pub max_context: u64,
}

/// Kiro-side pricing table, keyed by CodeWhisperer model id. Figures mirror
/// the published Claude-on-Bedrock/Kiro rate card at time of writing; update
/// here when pricing changes rather than threading a price through callers.
pub static KIRO_PRICING: LazyLock<AHashMap<&'static str, ModelPricing>> = LazyLock::new(|| {
    let mut table = AHashMap::new();
    table.insert(
        "CLAUDE_SONNET_4_5",
        ModelPricing {
            input_price: 3.0,
            output_price: 15.0,
            cache_create_price: 3.75,
            cache_read_price: 0.3,
            max_context: 200_000,
        },
    );
    table.insert(
        "CLAUDE_OPUS_4_5",
        ModelPricing {
            input_price: 15.0,
            output_price: 75.0,
            cache_create_price: 18.75,
            cache_read_price: 1.5,
            max_context: 200_000,
        },
    );
    table.insert(
        "CLAUDE_HAIKU_4_5",
        ModelPricing {
            input_price: 1.0,
            output_price: 5.0,
            cache_create_price: 1.25,
            cache_read_price: 0.1,
            max_context: 200_000,
        },
    );
    table
});

pub fn pricing_for(model_id: &str) -> Option<ModelPricing> {
    KIRO_PRICING.get(model_id).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_resolves() {
        let pricing = pricing_for("CLAUDE_SONNET_4_5").expect("known model");
        assert_eq!(pricing.max_context, 200_000);
    }

    #[test]
    fn unknown_model_returns_none() {
        assert!(pricing_for("NOT_A_MODEL").is_none());
    }
}

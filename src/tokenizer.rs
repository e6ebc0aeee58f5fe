/// Token counting is treated as a pure external function (§6, out of scope):
/// the core only needs *a* count, not a specific vocabulary. Real deployments
/// plug in `tiktoken` or a model-specific tokenizer; this trait is the seam.
pub trait Tokenizer: Send + Sync {
    fn count_tokens(&self, text: &str) -> u64;
}

/// Default tokenizer used when no real one is configured. Approximates
/// subword tokenization with the common `chars/4` heuristic — good enough
/// for usage estimates, not for billing.
pub struct NaiveTokenizer;

impl Tokenizer for NaiveTokenizer {
    fn count_tokens(&self, text: &str) -> u64 {
        if text.is_empty() {
            return 0;
        }
        (text.chars().count() as u64).div_ceil(4).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_counts_as_zero() {
        assert_eq!(NaiveTokenizer.count_tokens(""), 0);
    }

    #[test]
    fn short_text_floors_to_one_token() {
        assert_eq!(NaiveTokenizer.count_tokens("hi"), 1);
    }

    #[test]
    fn longer_text_scales_with_length() {
        let text = "a".repeat(400);
        assert_eq!(NaiveTokenizer.count_tokens(&text), 100);
    }
}

use sha2::{Digest, Sha256};

/// Stable fingerprint over the parts of a request that identify "the same
/// conversation" when the caller doesn't supply an explicit id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationStickyKey(String);

impl ConversationStickyKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Anthropic requests have no native conversation id; fingerprint the
    /// shape of the first turn instead.
    pub fn from_anthropic_seed(
        user_id: Option<&str>,
        thread_id: Option<&str>,
        earliest_user_text: &str,
        system_text: &str,
        mut tool_names: Vec<String>,
    ) -> Self {
        tool_names.sort_unstable();

        let normalize = |s: &str, limit: usize| -> String {
            let normalized = s.replace("\r\n", "\n");
            normalized.chars().take(limit).collect()
        };

        let mut seed = String::new();
        seed.push_str(user_id.unwrap_or(""));
        seed.push('\u{1}');
        seed.push_str(thread_id.unwrap_or(""));
        seed.push('\u{1}');
        seed.push_str(&normalize(earliest_user_text, 1024));
        seed.push('\u{1}');
        seed.push_str(&normalize(system_text, 512));
        seed.push('\u{1}');
        seed.push_str(&tool_names.join(","));

        let digest = Sha256::digest(seed.as_bytes());
        Self(format!("anthropic_{}", encode_hex(&digest)))
    }

    /// Other dialects supply their own conversation/cache key directly.
    pub fn from_explicit(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anthropic_key_has_stable_prefix_and_length() {
        let key = ConversationStickyKey::from_anthropic_seed(
            Some("u1"),
            None,
            "hello there",
            "be nice",
            vec!["search".to_string()],
        );
        assert!(key.as_str().starts_with("anthropic_"));
        assert_eq!(key.as_str().len(), "anthropic_".len() + 64);
    }

    #[test]
    fn same_inputs_produce_same_key() {
        let a = ConversationStickyKey::from_anthropic_seed(
            Some("u1"),
            Some("t1"),
            "ping",
            "sys",
            vec![],
        );
        let b = ConversationStickyKey::from_anthropic_seed(
            Some("u1"),
            Some("t1"),
            "ping",
            "sys",
            vec![],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn newline_normalization_matches_across_crlf_and_lf() {
        let a = ConversationStickyKey::from_anthropic_seed(None, None, "a\r\nb", "", vec![]);
        let b = ConversationStickyKey::from_anthropic_seed(None, None, "a\nb", "", vec![]);
        assert_eq!(a, b);
    }
}

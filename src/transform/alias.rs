/// Anthropic → Gemini model alias table (§4.4).
///
/// Date-suffixed variants are normalized to their base name before lookup,
/// e.g. `claude-opus-4-5-20260115` → `claude-opus-4-5`.
pub fn anthropic_model_to_gemini(model: &str) -> String {
    let base = normalize_date_suffix(model);

    match base.as_str() {
        "claude-opus-4-5" => "claude-opus-4-5-thinking".to_string(),
        "claude-sonnet-4-5" => "claude-sonnet-4-5".to_string(),
        "claude-haiku-4-5" => "gemini-2.5-flash".to_string(),
        "claude-opus-4" => "gemini-3-pro-high".to_string(),
        "claude-haiku-4" => "claude-haiku-4.5".to_string(),
        "" => "claude-sonnet-4-5".to_string(),
        other => {
            if other.starts_with("claude-3-5-sonnet") {
                "claude-sonnet-4-5".to_string()
            } else if other.starts_with("claude-3-haiku") {
                "gemini-2.5-flash".to_string()
            } else {
                other.to_string()
            }
        }
    }
}

/// Anthropic → CodeWhisperer model id table (§4.4). Kiro only carries the
/// Claude family, keyed by the upper-snake ids its pricing table uses.
pub fn anthropic_model_to_kiro(model: &str) -> String {
    let base = normalize_date_suffix(model);

    match base.as_str() {
        "claude-opus-4-5" => "CLAUDE_OPUS_4_5".to_string(),
        "claude-haiku-4-5" => "CLAUDE_HAIKU_4_5".to_string(),
        "" => "CLAUDE_SONNET_4_5".to_string(),
        other => {
            if other.starts_with("claude-3-5-sonnet") || other == "claude-sonnet-4-5" {
                "CLAUDE_SONNET_4_5".to_string()
            } else if other.starts_with("claude-3-haiku") {
                "CLAUDE_HAIKU_4_5".to_string()
            } else {
                "CLAUDE_SONNET_4_5".to_string()
            }
        }
    }
}

/// Strips a trailing `-YYYYMMDD` date suffix from one of the four known
/// `claude-{opus,sonnet,haiku}-4-5` / `claude-3-5-sonnet` / `claude-3-haiku`
/// family prefixes, leaving other names untouched.
fn normalize_date_suffix(model: &str) -> String {
    const KNOWN_PREFIXES: &[&str] = &[
        "claude-opus-4-5",
        "claude-sonnet-4-5",
        "claude-haiku-4-5",
    ];

    for prefix in KNOWN_PREFIXES {
        if let Some(rest) = model.strip_prefix(prefix) {
            if rest.is_empty() || is_date_suffix(rest) {
                return (*prefix).to_string();
            }
        }
    }
    model.to_string()
}

fn is_date_suffix(rest: &str) -> bool {
    let Some(digits) = rest.strip_prefix('-') else {
        return false;
    };
    digits.len() == 8 && digits.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_suffixed_opus_maps_to_thinking_variant() {
        assert_eq!(
            anthropic_model_to_gemini("claude-opus-4-5-20260115"),
            "claude-opus-4-5-thinking"
        );
    }

    #[test]
    fn sonnet_4_5_passes_through_unchanged() {
        assert_eq!(
            anthropic_model_to_gemini("claude-sonnet-4-5"),
            "claude-sonnet-4-5"
        );
    }

    #[test]
    fn haiku_4_5_maps_to_gemini_flash() {
        assert_eq!(anthropic_model_to_gemini("claude-haiku-4-5"), "gemini-2.5-flash");
    }

    #[test]
    fn legacy_3_5_sonnet_family_maps_forward() {
        assert_eq!(
            anthropic_model_to_gemini("claude-3-5-sonnet-20241022"),
            "claude-sonnet-4-5"
        );
    }

    #[test]
    fn unknown_model_passes_through() {
        assert_eq!(anthropic_model_to_gemini("gpt-4o"), "gpt-4o");
    }

    #[test]
    fn empty_model_defaults_to_sonnet_4_5() {
        assert_eq!(anthropic_model_to_gemini(""), "claude-sonnet-4-5");
    }

    #[test]
    fn kiro_alias_maps_known_families() {
        assert_eq!(anthropic_model_to_kiro("claude-opus-4-5-20260115"), "CLAUDE_OPUS_4_5");
        assert_eq!(anthropic_model_to_kiro("claude-haiku-4-5"), "CLAUDE_HAIKU_4_5");
        assert_eq!(anthropic_model_to_kiro("claude-3-5-sonnet-20241022"), "CLAUDE_SONNET_4_5");
    }

    #[test]
    fn kiro_alias_defaults_unknown_models_to_sonnet() {
        assert_eq!(anthropic_model_to_kiro("gpt-4o"), "CLAUDE_SONNET_4_5");
    }
}

use serde_json::json;

use relaygate_schema::gemini::Part;

/// Stamps a Gemini part with `cachePoint:{type:"default"}` (§4.4) when the
/// originating Anthropic block carried a `cache_control` marker.
///
/// Gemini's part schema has no typed `cachePoint` field (it's a Vertex/
/// CodeAssist extension), so it rides in `extra`.
pub fn apply_cache_point(part: &mut Part, has_cache_control: bool) {
    if has_cache_control {
        part.extra
            .insert("cachePoint".to_string(), json!({"type": "default"}));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_control_present_adds_cache_point() {
        let mut part = Part::default();
        apply_cache_point(&mut part, true);
        assert_eq!(
            part.extra.get("cachePoint"),
            Some(&json!({"type": "default"}))
        );
    }

    #[test]
    fn cache_control_absent_leaves_part_untouched() {
        let mut part = Part::default();
        apply_cache_point(&mut part, false);
        assert!(part.extra.is_empty());
    }
}

/// Re-frames an upstream Anthropic SSE byte stream line-by-line (§4.5): after
/// each line beginning with `data:` emit an extra blank line (so the client
/// sees a full event terminator), otherwise a single blank line.
pub fn reframe_line(line: &str) -> String {
    if line.starts_with("data:") {
        format!("{line}\n\n")
    } else {
        format!("{line}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_line_gets_double_terminator() {
        assert_eq!(reframe_line("data: {\"type\":\"ping\"}"), "data: {\"type\":\"ping\"}\n\n");
    }

    #[test]
    fn non_data_line_gets_single_terminator() {
        assert_eq!(reframe_line("event: ping"), "event: ping\n");
    }
}

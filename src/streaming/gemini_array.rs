/// Incrementally parses a single top-level JSON array of objects, yielding
/// one complete `{...}` object at a time without buffering the whole array
/// (§4.5). Feed raw upstream bytes via `push`; brace depth is tracked
/// respecting string/escape rules so braces inside string values don't
/// confuse the boundary scan.
#[derive(Debug, Default)]
pub struct GeminiArrayParser {
    buffer: String,
    depth: u32,
    in_string: bool,
    escaped: bool,
    object_start: Option<usize>,
    seen_array_open: bool,
}

impl GeminiArrayParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk of raw bytes and returns any objects completed as a
    /// result.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);
        self.scan()
    }

    fn scan(&mut self) -> Vec<String> {
        let mut completed = Vec::new();
        let chars: Vec<char> = self.buffer.chars().collect();
        let mut consumed_chars = 0;

        for (i, &c) in chars.iter().enumerate() {
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if c == '\\' {
                    self.escaped = true;
                } else if c == '"' {
                    self.in_string = false;
                }
                continue;
            }

            match c {
                '"' => self.in_string = true,
                '[' if !self.seen_array_open && self.depth == 0 => {
                    self.seen_array_open = true;
                    consumed_chars = i + 1;
                }
                '{' => {
                    if self.depth == 0 {
                        self.object_start = Some(i);
                    }
                    self.depth += 1;
                }
                '}' => {
                    if self.depth > 0 {
                        self.depth -= 1;
                        if self.depth == 0 {
                            if let Some(start) = self.object_start.take() {
                                let object: String = chars[start..=i].iter().collect();
                                completed.push(object);
                                consumed_chars = i + 1;
                            }
                        }
                    }
                }
                ',' | ']' | ' ' | '\n' | '\r' | '\t' if self.depth == 0 => {
                    consumed_chars = i + 1;
                }
                _ => {}
            }
        }

        if consumed_chars > 0 {
            self.buffer = chars[consumed_chars..].iter().collect();
        }
        completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_with_full_array_yields_each_object() {
        let mut p = GeminiArrayParser::new();
        let objects = p.push(r#"[{"a":1},{"b":2}]"#);
        assert_eq!(objects, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
    }

    #[test]
    fn object_split_across_chunks_is_reassembled() {
        let mut p = GeminiArrayParser::new();
        let mut objects = p.push(r#"[{"text":"hel"#);
        objects.extend(p.push(r#"lo"},{"text":"#));
        objects.extend(p.push(r#""world"}]"#));
        assert_eq!(objects, vec![r#"{"text":"hello"}"#, r#"{"text":"world"}"#]);
    }

    #[test]
    fn braces_inside_string_values_do_not_affect_depth() {
        let mut p = GeminiArrayParser::new();
        let objects = p.push(r#"[{"text":"a { b } c"}]"#);
        assert_eq!(objects, vec![r#"{"text":"a { b } c"}"#]);
    }

    #[test]
    fn escaped_quote_inside_string_does_not_end_it_early() {
        let mut p = GeminiArrayParser::new();
        let objects = p.push(r#"[{"text":"say \"hi\" {not a brace}"}]"#);
        assert_eq!(objects, vec![r#"{"text":"say \"hi\" {not a brace}"}"#]);
    }
}

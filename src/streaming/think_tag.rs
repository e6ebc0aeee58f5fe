const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

#[derive(Debug, PartialEq, Eq)]
pub enum ThinkChunk {
    Plain(String),
    Thinking(String),
}

/// Splits plain-text upstream output into `<think>…</think>` spans and the
/// text around them, tolerating tag boundaries that fall across chunk edges
/// (P7). Feed chunks in order via `push`; call `flush` once the stream ends
/// to release anything still held back.
#[derive(Debug, Default)]
pub struct ThinkTagSplitter {
    buffer: String,
    in_thinking: bool,
}

impl ThinkTagSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) -> Vec<ThinkChunk> {
        self.buffer.push_str(chunk);
        self.drain(false)
    }

    pub fn flush(&mut self) -> Vec<ThinkChunk> {
        self.drain(true)
    }

    fn drain(&mut self, is_final: bool) -> Vec<ThinkChunk> {
        let mut out = Vec::new();
        loop {
            let tag = if self.in_thinking { CLOSE_TAG } else { OPEN_TAG };

            match self.buffer.find(tag) {
                Some(pos) => {
                    let before = self.buffer[..pos].to_string();
                    if !before.is_empty() {
                        out.push(Self::wrap(self.in_thinking, before));
                    }
                    self.buffer.drain(..pos + tag.len());
                    self.in_thinking = !self.in_thinking;
                }
                None => {
                    if is_final {
                        if !self.buffer.is_empty() {
                            out.push(Self::wrap(self.in_thinking, std::mem::take(&mut self.buffer)));
                        }
                        return out;
                    }

                    let hold_back = Self::held_back_suffix_len(&self.buffer, tag);
                    let emit_len = self.buffer.len() - hold_back;
                    if emit_len > 0 {
                        let emitted: String = self.buffer.drain(..emit_len).collect();
                        out.push(Self::wrap(self.in_thinking, emitted));
                    }
                    return out;
                }
            }
        }
    }

    fn wrap(in_thinking: bool, text: String) -> ThinkChunk {
        if in_thinking {
            ThinkChunk::Thinking(text)
        } else {
            ThinkChunk::Plain(text)
        }
    }

    /// Length of the longest suffix of `buffer` that is a proper prefix of
    /// `tag`; that suffix must be held back since the next chunk could
    /// complete the tag.
    fn held_back_suffix_len(buffer: &str, tag: &str) -> usize {
        let max_check = tag.len().saturating_sub(1).min(buffer.len());
        for len in (1..=max_check).rev() {
            let suffix = &buffer[buffer.len() - len..];
            if tag.starts_with(suffix) {
                return len;
            }
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_with_no_tags_passes_through() {
        let mut s = ThinkTagSplitter::new();
        let mut chunks = s.push("hello world");
        chunks.extend(s.flush());
        assert_eq!(chunks, vec![ThinkChunk::Plain("hello world".to_string())]);
    }

    #[test]
    fn full_tag_pair_in_one_chunk_extracts_thinking() {
        let mut s = ThinkTagSplitter::new();
        let mut chunks = s.push("before <think>reasoning</think> after");
        chunks.extend(s.flush());
        assert_eq!(
            chunks,
            vec![
                ThinkChunk::Plain("before ".to_string()),
                ThinkChunk::Thinking("reasoning".to_string()),
                ThinkChunk::Plain(" after".to_string()),
            ]
        );
    }

    #[test]
    fn tag_split_across_chunk_boundary_is_recognized() {
        let mut s = ThinkTagSplitter::new();
        let mut chunks = s.push("hello <thi");
        chunks.extend(s.push("nk>deep thought</think> done"));
        chunks.extend(s.flush());
        assert_eq!(
            chunks,
            vec![
                ThinkChunk::Plain("hello ".to_string()),
                ThinkChunk::Thinking("deep thought".to_string()),
                ThinkChunk::Plain(" done".to_string()),
            ]
        );
    }

    #[test]
    fn partial_prefix_that_never_completes_is_released_on_flush() {
        let mut s = ThinkTagSplitter::new();
        let mut chunks = s.push("trailing <thi");
        chunks.extend(s.flush());
        assert_eq!(chunks, vec![ThinkChunk::Plain("trailing <thi".to_string())]);
    }

    #[test]
    fn close_tag_split_across_chunks_while_in_thinking_state() {
        let mut s = ThinkTagSplitter::new();
        let mut chunks = s.push("<think>idea</thi");
        chunks.extend(s.push("nk>rest"));
        chunks.extend(s.flush());
        assert_eq!(
            chunks,
            vec![
                ThinkChunk::Thinking("idea".to_string()),
                ThinkChunk::Plain("rest".to_string()),
            ]
        );
    }

    #[test]
    fn any_byte_split_reassembles_to_the_same_segments() {
        let whole = "intro <think>step one</think> mid <think>step two</think> tail";

        let mut baseline = ThinkTagSplitter::new();
        let mut expected = baseline.push(whole);
        expected.extend(baseline.flush());
        let expected = merge_adjacent(expected);

        for split_at in 0..=whole.len() {
            if !whole.is_char_boundary(split_at) {
                continue;
            }
            let mut s = ThinkTagSplitter::new();
            let mut chunks = s.push(&whole[..split_at]);
            chunks.extend(s.push(&whole[split_at..]));
            chunks.extend(s.flush());
            assert_eq!(merge_adjacent(chunks), expected, "split at byte {split_at}");
        }
    }

    fn merge_adjacent(chunks: Vec<ThinkChunk>) -> Vec<ThinkChunk> {
        let mut merged: Vec<ThinkChunk> = Vec::new();
        for chunk in chunks {
            match (merged.last_mut(), &chunk) {
                (Some(ThinkChunk::Plain(acc)), ThinkChunk::Plain(text)) => acc.push_str(text),
                (Some(ThinkChunk::Thinking(acc)), ThinkChunk::Thinking(text)) => acc.push_str(text),
                _ => merged.push(chunk),
            }
        }
        merged
    }
}

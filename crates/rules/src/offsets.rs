/// Maps regex byte offsets to character offsets.
pub(crate) struct CharOffsets {
    /// `byte_to_char[b]` is the char index of the char starting at byte `b`
    byte_to_char: Vec<usize>,
    char_count: usize,
}

impl CharOffsets {
    pub fn new(text: &str) -> Self {
        let mut byte_to_char = vec![0; text.len() + 1];
        let mut count = 0;
        for (byte_idx, ch) in text.char_indices() {
            for slot in &mut byte_to_char[byte_idx..byte_idx + ch.len_utf8()] {
                *slot = count;
            }
            count += 1;
        }
        byte_to_char[text.len()] = count;
        Self {
            byte_to_char,
            char_count: count,
        }
    }

    pub fn char_at(&self, byte_idx: usize) -> usize {
        self.byte_to_char
            .get(byte_idx)
            .copied()
            .unwrap_or(self.char_count)
    }
}

/// Slice of at most `radius` chars on each side of `[start, end)` (byte range).
pub(crate) fn context_window(text: &str, start: usize, end: usize, radius: usize) -> &str {
    let before = text[..start]
        .char_indices()
        .rev()
        .nth(radius.saturating_sub(1))
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    let after = text[end..]
        .char_indices()
        .nth(radius)
        .map(|(idx, _)| end + idx)
        .unwrap_or(text.len());
    &text[before..after]
}

/// Up to `radius` chars immediately preceding byte offset `start`.
pub(crate) fn preceding(text: &str, start: usize, radius: usize) -> &str {
    let before = text[..start]
        .char_indices()
        .rev()
        .nth(radius.saturating_sub(1))
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    &text[before..start]
}

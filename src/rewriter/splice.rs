//! Character-indexed substring replacement.

/// Byte offset of the `char_idx`-th character of `s`, clamped to the end of the string.
fn byte_offset(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map_or(s.len(), |(offset, _)| offset)
}

/// Replace the characters in `[start, end)` of `text` with `replacement`.
///
/// Indices count characters, not bytes, so a multi-byte character is never split. Indices past the
/// end of the text are clamped to it, and an `end` before `start` replaces nothing (an insertion).
pub fn splice(text: &str, start: usize, end: usize, replacement: &str) -> String {
    let from = byte_offset(text, start);
    let to = byte_offset(text, end.max(start));
    let mut out = String::with_capacity(text.len() - (to - from) + replacement.len());
    out.push_str(&text[..from]);
    out.push_str(replacement);
    out.push_str(&text[to..]);
    out
}

/// The characters in `[start, end)` of `text`.
pub fn slice(text: &str, start: usize, end: usize) -> &str {
    let from = byte_offset(text, start);
    let to = byte_offset(text, end.max(start));
    &text[from..to]
}

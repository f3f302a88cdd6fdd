//! Split long texts into LINE-sized segments.

/// LINE caps a text message at 5000 characters; keep a margin.
pub const MAX_MESSAGE_CHARS: usize = 4800;

/// Split `text` into consecutive slices of at most `max_chars` characters (Unicode scalar
/// values, not bytes). No word-boundary handling; the last slice may be shorter. An empty
/// text yields no slices.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (i, _) in text.char_indices() {
        if count == max_chars {
            chunks.push(&text[start..i]);
            start = i;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

/// Longest prefix of `s` with at most `max` characters.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

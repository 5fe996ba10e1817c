//! Response chunking and Discord message utilities
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.4.0
//!
//! ## Changelog
//! - 1.1.0: Length-based chunking with a reserved safety margin
//! - 1.0.0: Initial extraction from the message router

/// Discord message content limit
pub const MESSAGE_LIMIT: usize = 2000;
/// Headroom reserved below [`MESSAGE_LIMIT`] when chunking generated text
pub const CHUNK_MARGIN: usize = 10;

/// Chunk text into consecutive slices of at most `max_len` bytes.
///
/// Slices are taken in order and cover the whole input with no gaps or
/// overlaps, so joining the result reproduces the input exactly. Splits
/// never land inside a UTF-8 character. Splitting is purely length-based;
/// words and lines are not kept together.
pub fn chunk_message(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        if current.len() + ch.len_utf8() > max_len && !current.is_empty() {
            chunks.push(current);
            current = String::new();
        }
        current.push(ch);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Truncate text to fit the message limit, adding an ellipsis if needed
pub fn truncate_for_message(text: &str) -> String {
    if text.len() <= MESSAGE_LIMIT {
        return text.to_string();
    }

    let mut end = MESSAGE_LIMIT - 3;
    while !text.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

//! Overlapping word-window text chunker.
//!
//! Splits a decision's body text into windows of `chunk_words` tokens,
//! stepping `chunk_words - overlap` tokens between window starts so that
//! consecutive windows share `overlap` tokens of context. Whitespace is
//! normalized first (runs collapsed to single spaces, ends trimmed) and
//! tokens are simple space-separated words.
//!
//! # Guarantees
//!
//! - Empty or whitespace-only input produces an empty sequence, not an error.
//! - Every token position is covered by at least one window.
//! - The final window may be shorter than `chunk_words` but is never
//!   skipped, and no duplicate trailing window is produced.
//! - `overlap >= chunk_words` degenerates the step to 1 token; that is
//!   legal and accepted, it just maximizes the chunk count.
//! - The function is pure: identical inputs yield identical output.

/// Collapse all whitespace runs to single spaces and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split `text` into overlapping word windows.
pub fn chunk_text(text: &str, chunk_words: usize, overlap: usize) -> Vec<String> {
    let normalized = normalize_whitespace(text);
    let tokens: Vec<&str> = normalized.split(' ').filter(|t| !t.is_empty()).collect();
    if tokens.is_empty() {
        return Vec::new();
    }

    let step = chunk_words.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < tokens.len() {
        let end = (start + chunk_words).min(tokens.len());
        if end > start {
            chunks.push(tokens[start..end].join(" "));
        }
        // Once a window reaches the end of the token stream, it is the
        // final window.
        if start + chunk_words >= tokens.len() {
            break;
        }
        start += step;
    }

    chunks
}

/// Derived chunk id: case id, a fixed `"::"` separator, and the chunk's
/// 1-based ordinal within the case.
pub fn chunk_id(case_id: &str, ordinal: usize) -> String {
    format!("{}::{}", case_id, ordinal)
}

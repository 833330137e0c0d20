//! UTF-8-safe text helpers for previews and transcripts.
//!
//! Slicing a `&str` at an arbitrary byte index panics inside a multi-byte
//! character, and context summaries are free-form model output that can
//! contain anything. These helpers always cut at a char boundary.

/// Longest prefix of `s` that fits in `max_bytes` without splitting a char.
#[inline]
#[must_use]
pub fn clip_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Preview of `s` for status surfaces: clipped to `max_bytes` with an
/// ellipsis appended when anything was cut.
#[must_use]
pub fn preview(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_owned();
    }
    format!("{}…", clip_str(s, max_bytes))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

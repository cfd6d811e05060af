//! Text normalization shared by the entity constructors.

/// Upper bound on body and comment length, in characters.
pub const MAX_CONTENT_CHARS: usize = 50_000;

/// Upper bound on titles, in characters.
pub const MAX_TITLE_CHARS: usize = 254;

/// Truncates `text` to at most `max` characters.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Truncates a comment or body to [`MAX_CONTENT_CHARS`].
#[must_use]
pub fn trim_content(text: &str) -> String {
    truncate_chars(text, MAX_CONTENT_CHARS)
}

/// Reduces upstream body text to something the tracker stores verbatim and
/// that is safe to embed in patterns: truncated, every non-ASCII character
/// replaced with `?`, backslashes removed.
#[must_use]
pub fn scrub_content(text: &str) -> String {
    trim_content(text)
        .chars()
        .filter(|c| *c != '\\')
        .map(|c| if c.is_ascii() { c } else { '?' })
        .collect()
}

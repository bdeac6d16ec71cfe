//! Composite text: the deterministic embedding input derived from a song's
//! literal attributes.

use std::sync::LazyLock;

use regex::Regex;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[^\w\s.,!?;:\-'"()]"#).expect("character class is valid")
});

/// Normalise free text for embedding.
///
/// Collapses runs of whitespace, replaces anything other than word
/// characters, whitespace and basic punctuation with a space, and trims.
#[must_use]
pub fn clean_text(text: &str) -> String {
    let collapsed = WHITESPACE.replace_all(text.trim(), " ");
    let stripped = DISALLOWED.replace_all(&collapsed, " ");
    WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
}

/// Build the composite text for a song.
#[must_use]
pub fn composite_text(track_name: &str, artist_name: &str, lyrics: &str) -> String {
    format!(
        "Title: {}. Artist: {}. Lyrics: {}",
        clean_text(track_name),
        clean_text(artist_name),
        clean_text(lyrics)
    )
}

/// The longest prefix of `text` that has at most `max_chars` characters.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

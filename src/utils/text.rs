//! Symptom text normalization shared by fingerprinting and change detection.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

static WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("static word pattern"));

/// Lowercase, trim, and collapse every whitespace run to a single space.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Distinct words of normalized text longer than `min_len` characters.
/// Punctuation separates words.
pub fn significant_words(normalized: &str, min_len: usize) -> BTreeSet<&str> {
    WORD.find_iter(normalized)
        .map(|m| m.as_str())
        .filter(|w| w.chars().count() > min_len)
        .collect()
}

//! Shared helpers.

pub mod text;

pub use text::{normalize_text, significant_words};

//! Symptom change detection for regeneration requests.

use crate::utils::{normalize_text, significant_words};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Words must be longer than this many characters to count.
const MIN_WORD_CHARS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Relative length difference above which texts are always different.
    pub length_change_threshold: f64,
    /// Jaccard similarity below which texts are considered different.
    pub similarity_threshold: f64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            length_change_threshold: 0.2,
            similarity_threshold: 0.7,
        }
    }
}

impl SimilarityConfig {
    /// Both thresholds are ratios and must lie in `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("similarity.length_change_threshold", self.length_change_threshold),
            ("similarity.similarity_threshold", self.similarity_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::configuration_field(field, "must be within [0, 1]"));
            }
        }
        Ok(())
    }
}

/// Decides whether an updated symptom description is materially new.
#[derive(Debug, Clone, Default)]
pub struct SimilarityDetector {
    config: SimilarityConfig,
}

impl SimilarityDetector {
    pub fn new(config: SimilarityConfig) -> Self {
        Self { config }
    }

    pub fn is_significant_change(&self, old_text: &str, new_text: &str) -> bool {
        let old = normalize_text(old_text);
        let new = normalize_text(new_text);
        if old.is_empty() && new.is_empty() {
            return false;
        }
        if relative_length_change(&old, &new) > self.config.length_change_threshold {
            return true;
        }
        jaccard(&old, &new) < self.config.similarity_threshold
    }

    /// Jaccard similarity of the significant word sets, in `[0, 1]`.
    /// Two texts without any significant words score 1.
    pub fn similarity(&self, old_text: &str, new_text: &str) -> f64 {
        jaccard(&normalize_text(old_text), &normalize_text(new_text))
    }
}

fn relative_length_change(old: &str, new: &str) -> f64 {
    let a = old.chars().count() as f64;
    let b = new.chars().count() as f64;
    let longest = a.max(b);
    if longest == 0.0 {
        0.0
    } else {
        (a - b).abs() / longest
    }
}

fn jaccard(old: &str, new: &str) -> f64 {
    let a = significant_words(old, MIN_WORD_CHARS);
    let b = significant_words(new, MIN_WORD_CHARS);
    let union = a.union(&b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_must_be_ratios() {
        assert!(SimilarityConfig::default().validate().is_ok());
        let config = SimilarityConfig {
            length_change_threshold: -0.1,
            ..SimilarityConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("similarity.length_change_threshold")
        );
        let config = SimilarityConfig {
            similarity_threshold: f64::NAN,
            ..SimilarityConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_identical_text_is_not_significant() {
        let d = SimilarityDetector::default();
        assert!(!d.is_significant_change("itchy red rash on arm", "itchy red rash on arm"));
        assert!(!d.is_significant_change("Itchy  red rash on ARM ", "itchy red rash on arm"));
    }

    #[test]
    fn test_unrelated_text_is_significant() {
        let d = SimilarityDetector::default();
        assert!(d.is_significant_change("mild headache", "severe chest pain and shortness of breath"));
    }

    #[test]
    fn test_both_empty_is_not_significant() {
        let d = SimilarityDetector::default();
        assert!(!d.is_significant_change("", "   "));
    }

    #[test]
    fn test_adding_symptoms_to_empty_is_significant() {
        let d = SimilarityDetector::default();
        assert!(d.is_significant_change("", "rash"));
    }

    #[test]
    fn test_same_length_different_words() {
        let d = SimilarityDetector::default();
        // equal length, no shared words
        assert!(d.is_significant_change("itchy rash arm", "sharp pain leg"));
    }

    #[test]
    fn test_small_rewording_is_not_significant() {
        let d = SimilarityDetector::default();
        let old = "itchy red rash on my left arm since monday";
        let new = "itchy red rash on the left arm since monday";
        assert!(!d.is_significant_change(old, new));
        assert!(d.similarity(old, new) >= 0.7);
    }

    #[test]
    fn test_thresholds_are_configurable() {
        let strict = SimilarityDetector::new(SimilarityConfig {
            length_change_threshold: 0.2,
            similarity_threshold: 1.0,
        });
        let old = "itchy red rash on my left arm since monday";
        let new = "itchy red rash on the left arm since monday";
        assert!(strict.is_significant_change(old, new));
    }
}

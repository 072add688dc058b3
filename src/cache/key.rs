//! Fingerprint generation.

use crate::types::{AnalysisSummary, ConsultationRequest};
use crate::utils::normalize_text;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Equivalence key for a consultation request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Coarser key shared by every request built on the same analysis,
/// whatever the symptom text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisFingerprint(String);

impl AnalysisFingerprint {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AnalysisFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Confidence bucket used in keys: rounded to two decimal places.
pub fn confidence_bucket(confidence: f64) -> String {
    format!("{:.2}", (confidence * 100.0).round() / 100.0)
}

/// Builds fingerprints from a canonical, ordered field map hashed with SHA-256.
#[derive(Debug, Clone, Default)]
pub struct FingerprintBuilder {
    salt: Option<String>,
}

impl FingerprintBuilder {
    pub fn new() -> Self {
        Self { salt: None }
    }

    /// Namespace every key, e.g. by generator model version.
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    pub fn build(&self, request: &ConsultationRequest) -> Fingerprint {
        let mut parts = self.analysis_parts(request.analysis());
        parts.insert("symptoms", normalize_text(request.symptoms()));
        Fingerprint(self.digest(&parts))
    }

    pub fn analysis_fingerprint(&self, analysis: &AnalysisSummary) -> AnalysisFingerprint {
        let parts = self.analysis_parts(analysis);
        AnalysisFingerprint(self.digest(&parts))
    }

    fn analysis_parts(&self, analysis: &AnalysisSummary) -> BTreeMap<&'static str, String> {
        let mut parts = BTreeMap::new();
        parts.insert("top_finding", analysis.top_finding.trim().to_lowercase());
        parts.insert("confidence", confidence_bucket(analysis.confidence));
        parts.insert("risk_level", analysis.risk_level.as_str().to_string());
        if let Some(ref s) = self.salt {
            parts.insert("salt", s.clone());
        }
        parts
    }

    fn digest(&self, parts: &BTreeMap<&'static str, String>) -> String {
        // BTreeMap keeps field order stable; serde_json handles escaping.
        let canonical = serde_json::to_string(parts).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

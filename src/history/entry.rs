//! History ledger entries.

use crate::cache::AnalysisFingerprint;
use crate::types::ConsultationResult;
use serde::{Deserialize, Serialize};

/// Recorded when a regeneration arrives with materially different symptoms.
pub const REASON_SYMPTOMS_UPDATED: &str = "symptoms_updated";
/// Recorded when a regeneration repeats the previous symptoms.
pub const REASON_SAME_SYMPTOMS: &str = "same_symptoms";

/// One consultation attempt. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp_ms: u64,
    pub symptoms: String,
    pub result: ConsultationResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regeneration_reason: Option<String>,
    pub session_id: String,
    pub analysis_fingerprint: AnalysisFingerprint,
    /// Set when the entry records a failed generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl HistoryEntry {
    pub fn is_regeneration(&self) -> bool {
        self.regeneration_reason.is_some()
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }

    pub fn has_symptoms(&self) -> bool {
        !self.symptoms.trim().is_empty()
    }
}

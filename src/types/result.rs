//! Consultation result types.

use serde::{Deserialize, Serialize};

/// How soon the user should seek care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Routine,
    Soon,
    Urgent,
    Emergency,
}

/// The clinical body of a consultation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consultation {
    pub assessment: String,
    pub correlation: String,
    pub recommendations: Vec<String>,
    pub urgency: Urgency,
    pub educational_content: String,
    pub disclaimer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub model_id: String,
    pub processing_time_ms: u64,
    pub confidence: f64,
    pub fallback_used: bool,
    pub safety_validated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A generated consultation plus generation metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultationResult {
    pub consultation: Consultation,
    pub metadata: GenerationMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contacts: Option<Vec<EmergencyContact>>,
}

impl ConsultationResult {
    /// Only complete, safety-validated results may be cached.
    pub fn is_well_formed(&self) -> bool {
        !self.consultation.assessment.trim().is_empty()
            && !self.consultation.disclaimer.trim().is_empty()
            && self.metadata.safety_validated
    }

    /// Copy presented to callers on a cache hit.
    pub fn as_cache_hit(&self) -> Self {
        let mut hit = self.clone();
        hit.metadata.processing_time_ms = 0;
        hit.metadata.fallback_used = false;
        hit
    }

    /// Placeholder recorded in history when generation failed without any
    /// fallback content.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            consultation: Consultation {
                assessment: String::new(),
                correlation: String::new(),
                recommendations: Vec::new(),
                urgency: Urgency::Routine,
                educational_content: String::new(),
                disclaimer: reason.into(),
            },
            metadata: GenerationMetadata {
                model_id: "unavailable".into(),
                processing_time_ms: 0,
                confidence: 0.0,
                fallback_used: true,
                safety_validated: false,
            },
            emergency_contacts: None,
        }
    }

    /// Same clinical body, ignoring metadata.
    pub fn same_content(&self, other: &Self) -> bool {
        self.consultation == other.consultation && self.emergency_contacts == other.emergency_contacts
    }
}

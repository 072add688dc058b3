//! Consultation request types.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest symptom description accepted before the request reaches the cache.
pub const MAX_SYMPTOM_CHARS: usize = 10_000;

/// Risk assessment levels produced by the upstream analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Emergency,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Emergency => "emergency",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured summary of the image/symptom analysis a consultation is based on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub top_finding: String,
    pub confidence: f64,
    pub risk_level: RiskLevel,
}

impl AnalysisSummary {
    pub fn new(top_finding: impl Into<String>, confidence: f64, risk_level: RiskLevel) -> Self {
        Self {
            top_finding: top_finding.into(),
            confidence,
            risk_level,
        }
    }
}

/// A request for a generated consultation. Fields are fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultationRequest {
    analysis: AnalysisSummary,
    symptoms: String,
    session_id: String,
}

impl ConsultationRequest {
    pub fn new(
        analysis: AnalysisSummary,
        symptoms: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            analysis,
            symptoms: symptoms.into(),
            session_id: session_id.into(),
        }
    }

    pub fn analysis(&self) -> &AnalysisSummary {
        &self.analysis
    }

    pub fn symptoms(&self) -> &str {
        &self.symptoms
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Rejects malformed requests before they touch the cache or generator.
    ///
    /// Empty symptom text is allowed; a consultation can be based on the
    /// analysis alone.
    pub fn validate(&self) -> Result<()> {
        if self.analysis.top_finding.trim().is_empty() {
            return Err(Error::validation_field(
                "analysis.top_finding",
                "top finding is required",
            ));
        }
        let confidence = self.analysis.confidence;
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(Error::Validation {
                message: "confidence must be within [0, 1]".into(),
                context: crate::ErrorContext::new()
                    .with_field_path("analysis.confidence")
                    .with_details(format!("got {}", confidence))
                    .with_source("request_validator"),
            });
        }
        if self.session_id.trim().is_empty() {
            return Err(Error::validation_field("session_id", "session id is required"));
        }
        let chars = self.symptoms.chars().count();
        if chars > MAX_SYMPTOM_CHARS {
            return Err(Error::Validation {
                message: format!("symptom text exceeds {} characters", MAX_SYMPTOM_CHARS),
                context: crate::ErrorContext::new()
                    .with_field_path("symptoms")
                    .with_details(format!("got {} characters", chars))
                    .with_source("request_validator"),
            });
        }
        Ok(())
    }
}

//! Core request/result types shared by every component.

pub mod request;
pub mod result;

pub use request::{AnalysisSummary, ConsultationRequest, RiskLevel, MAX_SYMPTOM_CHARS};
pub use result::{
    Consultation, ConsultationResult, EmergencyContact, GenerationMetadata, Urgency,
};

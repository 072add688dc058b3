//! 外部生成器契约：定义会诊生成调用必须满足的接口。
//!
//! # Consultation Generator Contract
//!
//! The remote generation call (prompt construction, safety filtering,
//! disclaimer injection, retry/backoff) lives outside this crate. Anything
//! implementing [`ConsultationGenerator`] can be plugged into the
//! orchestrator.
//!
//! Implementations should:
//! - validate and sanitize the request themselves
//! - fail with a [`GenerationError`] whose [`GenerationErrorKind`] separates
//!   transient conditions (rate limits, network) from terminal ones
//! - either return a result flagged `fallback_used` or attach the degraded
//!   result to the error via [`GenerationError::with_fallback`]

mod error;

pub use error::{GenerationError, GenerationErrorKind};

use crate::types::{ConsultationRequest, ConsultationResult};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait ConsultationGenerator: Send + Sync {
    async fn generate(
        &self,
        request: &ConsultationRequest,
    ) -> std::result::Result<ConsultationResult, GenerationError>;

    /// Identifier used in logs.
    fn name(&self) -> &str {
        "generator"
    }
}

#[async_trait]
impl<G: ConsultationGenerator + ?Sized> ConsultationGenerator for Arc<G> {
    async fn generate(
        &self,
        request: &ConsultationRequest,
    ) -> std::result::Result<ConsultationResult, GenerationError> {
        (**self).generate(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

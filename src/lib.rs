//! # consult-cache
//!
//! 这是面向会诊生成服务的客户端缓存与再生成追踪层，避免重复的远程生成调用。
//!
//! Client-side caching and regeneration tracking for an expensive remote
//! consultation generator.
//!
//! ## Overview
//!
//! A consultation is generated from an image/symptom analysis plus free-text
//! symptoms. Generation is slow and rate-limited, so this crate sits between
//! the caller and the generator and makes sure that:
//!
//! - equivalent requests are answered from a bounded, expiring cache
//! - concurrent equivalent requests trigger a single generation
//! - every consultation attempt lands in a session-scoped history, so
//!   regenerations can be labelled and compared
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use consult_cache::generator::{ConsultationGenerator, GenerationError};
//! use consult_cache::history::FileStore;
//! use consult_cache::{
//!     AnalysisSummary, ConsultationOrchestrator, ConsultationRequest, ConsultationResult,
//!     RiskLevel,
//! };
//! use std::sync::Arc;
//!
//! struct RemoteGenerator;
//!
//! #[async_trait::async_trait]
//! impl ConsultationGenerator for RemoteGenerator {
//!     async fn generate(
//!         &self,
//!         _request: &ConsultationRequest,
//!     ) -> Result<ConsultationResult, GenerationError> {
//!         unimplemented!("call the remote service")
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> consult_cache::Result<()> {
//!     let orchestrator = ConsultationOrchestrator::builder()
//!         .with_generator(Arc::new(RemoteGenerator))
//!         .with_store(Arc::new(FileStore::new("./history")))
//!         .build()
//!         .await?;
//!
//!     let request = ConsultationRequest::new(
//!         AnalysisSummary::new("Eczema", 0.82, RiskLevel::Medium),
//!         "itchy red rash on arm",
//!         "session-1",
//!     );
//!     let result = orchestrator.request_consultation(&request).await?;
//!     println!("{}", result.consultation.assessment);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Request fingerprints and the TTL/LRU response cache |
//! | [`dedup`] | In-flight request deduplication |
//! | [`history`] | Session history ledger and durable stores |
//! | [`similarity`] | Symptom change detection |
//! | [`orchestrator`] | The façade composing everything above |
//! | [`generator`] | Contract for the external consultation generator |
//! | [`config`] | File and environment configuration |
//! | [`types`] | Request and result types |
//! | [`clock`] | Injectable time source |

pub mod cache;
pub mod clock;
pub mod config;
pub mod dedup;
pub mod generator;
pub mod history;
pub mod orchestrator;
pub mod similarity;
pub mod types;
pub mod utils;

// Re-export main types for convenience
pub use cache::{CacheConfig, CacheStats, Fingerprint, FingerprintBuilder, ResponseCache};
pub use config::CoreConfig;
pub use dedup::RequestDeduplicator;
pub use history::{HistoryConfig, HistoryEntry, HistoryStatistics, HistoryStore};
pub use orchestrator::{
    ConsultationOrchestrator, ConsultationOrchestratorBuilder, HealthReport, OrchestratorConfig,
    SweepReport,
};
pub use similarity::{SimilarityConfig, SimilarityDetector};
pub use types::{
    AnalysisSummary, ConsultationRequest, ConsultationResult, RiskLevel, Urgency,
};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};

//! 会诊编排模块：组合缓存、去重、历史记录与外部生成器。
//!
//! # Consultation Orchestrator
//!
//! [`ConsultationOrchestrator`] is the façade callers talk to. Every request
//! walks the same path:
//!
//! ```text
//! START → CACHE_LOOKUP ─ HIT ──────────────────────────────→ DONE
//!                      └ MISS → DEDUP_CHECK ─ JOIN_PENDING ─→ DONE
//!                                           └ GENERATE → POPULATE → DONE
//! ```
//!
//! ## Key Components
//!
//! | Component | Role |
//! |-----------|------|
//! | [`ResponseCache`] | short-circuits repeated requests |
//! | [`RequestDeduplicator`] | collapses concurrent misses into one generation |
//! | [`HistoryStore`] | receives exactly one entry per request |
//! | [`SimilarityDetector`] | labels regenerations |
//!
//! Generation failures are never cached. With `record_failures` on they are
//! still written to history, carrying the generator's fallback result or a
//! placeholder, and the error is surfaced as [`Error::Generation`].

mod builder;

pub use builder::ConsultationOrchestratorBuilder;

use crate::cache::{AnalysisFingerprint, CacheStats, Fingerprint, FingerprintBuilder, ResponseCache};
use crate::dedup::{DedupRole, RequestDeduplicator};
use crate::generator::{ConsultationGenerator, GenerationError};
use crate::history::{
    HistoryEntry, HistoryStatistics, HistoryStore, REASON_SAME_SYMPTOMS, REASON_SYMPTOMS_UPDATED,
};
use crate::similarity::SimilarityDetector;
use crate::types::{ConsultationRequest, ConsultationResult};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

type GenerationOutcome = std::result::Result<ConsultationResult, GenerationError>;

const REGENERATION_KEY_PREFIX: &str = "regenerate:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Append a failure entry to history when generation fails.
    pub record_failures: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            record_failures: true,
        }
    }
}

/// Snapshot of the orchestrator's moving parts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub store: String,
    pub cache_enabled: bool,
    pub cache_size: usize,
    pub history_size: usize,
    pub pending: usize,
}

/// What a call to [`ConsultationOrchestrator::sweep_expired`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub cache_entries: usize,
    pub history_entries: usize,
}

pub struct ConsultationOrchestrator {
    cache: Arc<ResponseCache>,
    history: Arc<HistoryStore>,
    dedup: RequestDeduplicator<GenerationOutcome>,
    generator: Arc<dyn ConsultationGenerator>,
    fingerprints: FingerprintBuilder,
    similarity: SimilarityDetector,
    config: OrchestratorConfig,
}

impl ConsultationOrchestrator {
    pub fn builder() -> ConsultationOrchestratorBuilder {
        ConsultationOrchestratorBuilder::new()
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Returns a consultation for `request`, from cache when possible.
    pub async fn request_consultation(
        &self,
        request: &ConsultationRequest,
    ) -> Result<ConsultationResult> {
        request.validate()?;
        let fingerprint = self.fingerprints.build(request);
        let analysis = self.fingerprints.analysis_fingerprint(request.analysis());

        if let Some(hit) = self.cache.get(&fingerprint) {
            self.history
                .append(&hit, request.symptoms(), request.session_id(), &analysis, None)
                .await;
            return Ok(hit);
        }

        let outcome = self
            .generate_shared(fingerprint.as_str(), fingerprint.clone(), request, true)
            .await;
        self.settle(outcome, request, &analysis, None).await
    }

    /// Generates a fresh consultation, skipping the cache lookup.
    ///
    /// The entry is labelled with `reason` when given. Otherwise the symptoms
    /// are compared with the latest entry for the same analysis in this
    /// session and labelled `symptoms_updated` or `same_symptoms`.
    ///
    /// Regenerations are deduplicated only against each other. A
    /// regeneration never joins, and is never joined by, an ordinary
    /// request's pending generation for the same fingerprint, so the two
    /// may reach the generator concurrently. Whichever settles last owns
    /// the cache entry.
    pub async fn regenerate(
        &self,
        request: &ConsultationRequest,
        reason: Option<&str>,
    ) -> Result<ConsultationResult> {
        request.validate()?;
        let fingerprint = self.fingerprints.build(request);
        let analysis = self.fingerprints.analysis_fingerprint(request.analysis());
        let label = self.regeneration_label(request, &analysis, reason);
        debug!(fingerprint = %fingerprint, reason = %label, "regenerating consultation");

        let key = format!("{}{}", REGENERATION_KEY_PREFIX, fingerprint);
        let outcome = self.generate_shared(&key, fingerprint, request, false).await;
        self.settle(outcome, request, &analysis, Some(&label)).await
    }

    fn regeneration_label(
        &self,
        request: &ConsultationRequest,
        analysis: &AnalysisFingerprint,
        reason: Option<&str>,
    ) -> String {
        if let Some(reason) = reason.map(str::trim).filter(|r| !r.is_empty()) {
            return reason.to_string();
        }
        let previous = self
            .history
            .latest_for_analysis(request.session_id(), analysis)
            .map(|e| e.symptoms)
            .unwrap_or_default();
        if self
            .similarity
            .is_significant_change(&previous, request.symptoms())
        {
            REASON_SYMPTOMS_UPDATED.to_string()
        } else {
            REASON_SAME_SYMPTOMS.to_string()
        }
    }

    /// Runs the generator once per `key`, caching a successful result
    /// before the pending record settles.
    ///
    /// With `recheck_cache` the leader looks at the cache once more before
    /// generating. A generation that settled between the caller's miss and
    /// its registration here has already populated the entry.
    async fn generate_shared(
        &self,
        key: &str,
        fingerprint: Fingerprint,
        request: &ConsultationRequest,
        recheck_cache: bool,
    ) -> Result<(GenerationOutcome, DedupRole)> {
        let generator = Arc::clone(&self.generator);
        let cache = Arc::clone(&self.cache);
        let request = request.clone();
        self.dedup
            .run_tracked(key, move || async move {
                if recheck_cache {
                    if let Some(hit) = cache.peek(&fingerprint) {
                        debug!(fingerprint = %fingerprint, "populated while registering");
                        return Ok(hit);
                    }
                }
                let started = Instant::now();
                let outcome = generator.generate(&request).await;
                let elapsed_ms = started.elapsed().as_millis() as u64;
                match &outcome {
                    Ok(result) => {
                        let cached = cache.set(fingerprint.clone(), result);
                        info!(
                            generator = generator.name(),
                            fingerprint = %fingerprint,
                            elapsed_ms,
                            fallback_used = result.metadata.fallback_used,
                            cached,
                            "consultation generated"
                        );
                    }
                    Err(e) => {
                        warn!(
                            generator = generator.name(),
                            fingerprint = %fingerprint,
                            elapsed_ms,
                            kind = %e.kind,
                            retryable = e.retryable(),
                            "consultation generation failed"
                        );
                    }
                }
                outcome
            })
            .await
    }

    async fn settle(
        &self,
        outcome: Result<(GenerationOutcome, DedupRole)>,
        request: &ConsultationRequest,
        analysis: &AnalysisFingerprint,
        reason: Option<&str>,
    ) -> Result<ConsultationResult> {
        match outcome {
            Ok((Ok(result), role)) => {
                if role == DedupRole::Joined {
                    debug!(session_id = request.session_id(), "joined pending generation");
                }
                self.history
                    .append(&result, request.symptoms(), request.session_id(), analysis, reason)
                    .await;
                Ok(result)
            }
            Ok((Err(failure), _)) => {
                if self.config.record_failures {
                    let shown = match failure.fallback.as_deref() {
                        Some(fallback) => fallback.clone(),
                        None => ConsultationResult::unavailable(format!(
                            "Consultation unavailable ({})",
                            failure.kind
                        )),
                    };
                    self.record_failure(&shown, request, analysis, reason, &failure.to_string())
                        .await;
                }
                Err(failure.into())
            }
            Err(e) => {
                if self.config.record_failures {
                    let shown = ConsultationResult::unavailable("Consultation unavailable");
                    self.record_failure(&shown, request, analysis, reason, &e.to_string())
                        .await;
                }
                Err(e)
            }
        }
    }

    async fn record_failure(
        &self,
        shown: &ConsultationResult,
        request: &ConsultationRequest,
        analysis: &AnalysisFingerprint,
        reason: Option<&str>,
        failure: &str,
    ) {
        self.history
            .append_failure(
                shown,
                request.symptoms(),
                request.session_id(),
                analysis,
                reason,
                failure,
            )
            .await;
    }

    /// Session history, most recent first. `None` uses the configured limit.
    pub fn get_history(&self, session_id: &str, limit: Option<usize>) -> Vec<HistoryEntry> {
        self.history.by_session(session_id, limit)
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn get_history_stats(&self) -> HistoryStatistics {
        self.history.statistics()
    }

    pub fn suggest_regeneration_prompts(&self, session_id: &str) -> Vec<String> {
        self.history.suggest_regeneration_prompts(session_id)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("response cache cleared");
    }

    /// Clears one session's history, or everything when `session_id` is
    /// `None`. Returns the number of entries removed.
    pub async fn clear_history(&self, session_id: Option<&str>) -> usize {
        let removed = match session_id {
            Some(session) => self.history.clear_session(session).await,
            None => {
                let count = self.history.len();
                self.history.clear_all().await;
                count
            }
        };
        info!(session_id = session_id.unwrap_or("*"), removed, "history cleared");
        removed
    }

    /// Drops expired cache entries and history past its retention window.
    pub async fn sweep_expired(&self) -> SweepReport {
        let report = SweepReport {
            cache_entries: self.cache.sweep_expired(),
            history_entries: self.history.purge_expired().await,
        };
        debug!(
            cache_entries = report.cache_entries,
            history_entries = report.history_entries,
            "expired entries swept"
        );
        report
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            store: self.history.store_name().to_string(),
            cache_enabled: self.cache.config().enabled,
            cache_size: self.cache.len(),
            history_size: self.history.len(),
            pending: self.dedup.pending_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::clock::ManualClock;
    use crate::generator::GenerationErrorKind;
    use crate::history::{HistoryConfig, MemoryStore};
    use crate::similarity::SimilarityConfig;
    use crate::types::result::fixtures::result;
    use crate::types::{AnalysisSummary, RiskLevel};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays scripted outcomes; the last one repeats.
    struct ScriptedGenerator {
        calls: AtomicUsize,
        script: Mutex<Vec<GenerationOutcome>>,
    }

    impl ScriptedGenerator {
        fn new(script: Vec<GenerationOutcome>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                script: Mutex::new(script),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ConsultationGenerator for ScriptedGenerator {
        async fn generate(&self, _: &ConsultationRequest) -> GenerationOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            }
        }
    }

    fn request(symptoms: &str, session: &str) -> ConsultationRequest {
        ConsultationRequest::new(
            AnalysisSummary::new("Eczema", 0.82, RiskLevel::Medium),
            symptoms,
            session,
        )
    }

    async fn orchestrator(
        generator: Arc<ScriptedGenerator>,
    ) -> (ConsultationOrchestrator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let orchestrator = ConsultationOrchestrator::builder()
            .with_generator(generator)
            .with_store(Arc::new(MemoryStore::new()))
            .with_clock(clock.clone())
            .build()
            .await
            .unwrap();
        (orchestrator, clock)
    }

    #[tokio::test]
    async fn test_builder_requires_generator() {
        let err = ConsultationOrchestrator::builder().build().await.err().unwrap();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_builder_rejects_out_of_range_config() {
        let generator = ScriptedGenerator::new(vec![Ok(result("x"))]);
        let field_of = |err: Error| {
            assert!(matches!(err, Error::Configuration { .. }));
            err.context().and_then(|c| c.field_path.clone())
        };

        let err = ConsultationOrchestrator::builder()
            .with_generator(generator.clone())
            .with_cache_config(CacheConfig::new().with_max_entries(0))
            .build()
            .await
            .err()
            .unwrap();
        assert_eq!(field_of(err).as_deref(), Some("cache.max_entries"));

        let err = ConsultationOrchestrator::builder()
            .with_generator(generator.clone())
            .with_history_config(HistoryConfig::new().with_max_entries(0))
            .build()
            .await
            .err()
            .unwrap();
        assert_eq!(field_of(err).as_deref(), Some("history.max_entries"));

        let err = ConsultationOrchestrator::builder()
            .with_generator(generator.clone())
            .with_similarity_config(SimilarityConfig {
                similarity_threshold: 1.5,
                ..SimilarityConfig::default()
            })
            .build()
            .await
            .err()
            .unwrap();
        assert_eq!(field_of(err).as_deref(), Some("similarity.similarity_threshold"));

        // a shared cache was sized by whoever built it
        let shared = Arc::new(ResponseCache::new(CacheConfig::default()));
        assert!(ConsultationOrchestrator::builder()
            .with_generator(generator)
            .with_cache_config(CacheConfig::new().with_max_entries(0))
            .with_cache(shared)
            .build()
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let generator = ScriptedGenerator::new(vec![Ok(result("Likely eczema"))]);
        let (orch, clock) = orchestrator(generator.clone()).await;

        let first = orch.request_consultation(&request("itchy rash", "s1")).await.unwrap();
        assert_eq!(first.metadata.processing_time_ms, 1_250);
        clock.advance(Duration::from_secs(1));
        let second = orch.request_consultation(&request("Itchy  RASH", "s1")).await.unwrap();

        assert_eq!(generator.calls(), 1);
        assert_eq!(second.metadata.processing_time_ms, 0);
        assert!(!second.metadata.fallback_used);
        assert!(second.same_content(&first));
        assert_eq!(orch.get_history("s1", None).len(), 2);
        let stats = orch.get_cache_stats();
        assert_eq!((stats.size, stats.hits, stats.misses), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_validation_never_reaches_generator() {
        let generator = ScriptedGenerator::new(vec![Ok(result("x"))]);
        let (orch, _) = orchestrator(generator.clone()).await;
        let bad = ConsultationRequest::new(
            AnalysisSummary::new("Eczema", 1.5, RiskLevel::Low),
            "rash",
            "s1",
        );
        let err = orch.request_consultation(&bad).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(generator.calls(), 0);
        assert!(orch.history().is_empty());
        assert_eq!(orch.get_cache_stats().total_requests, 0);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_but_not_cached() {
        let generator = ScriptedGenerator::new(vec![
            Err(GenerationError::new(GenerationErrorKind::RateLimited, "slow down")
                .with_retry_after_ms(2_000)),
            Ok(result("Likely eczema")),
        ]);
        let (orch, _) = orchestrator(generator.clone()).await;
        let req = request("rash", "s1");

        let err = orch.request_consultation(&req).await.unwrap_err();
        assert!(err.is_retryable());
        match &err {
            Error::Generation { retry_after_ms, .. } => assert_eq!(*retry_after_ms, Some(2_000)),
            other => panic!("unexpected error: {other}"),
        }
        assert!(orch.cache().is_empty());
        let history = orch.get_history("s1", None);
        assert_eq!(history.len(), 1);
        assert!(history[0].is_failure());
        assert_eq!(history[0].result.metadata.model_id, "unavailable");

        // retry goes back to the generator
        orch.request_consultation(&req).await.unwrap();
        assert_eq!(generator.calls(), 2);
        assert_eq!(orch.cache().len(), 1);
        assert_eq!(orch.health().pending, 0);
    }

    #[tokio::test]
    async fn test_failure_keeps_generator_fallback() {
        let mut fallback = result("General skin care advice");
        fallback.metadata.fallback_used = true;
        let generator = ScriptedGenerator::new(vec![Err(GenerationError::new(
            GenerationErrorKind::InvalidInput,
            "unsupported finding",
        )
        .with_fallback(fallback.clone()))]);
        let (orch, _) = orchestrator(generator).await;

        let err = orch.request_consultation(&request("rash", "s1")).await.unwrap_err();
        assert!(!err.is_retryable());
        let entry = &orch.get_history("s1", None)[0];
        assert!(entry.result.same_content(&fallback));
        assert!(entry.failure.as_deref().unwrap().contains("unsupported finding"));
    }

    #[tokio::test]
    async fn test_failures_not_recorded_when_disabled() {
        let generator = ScriptedGenerator::new(vec![Err(GenerationError::new(
            GenerationErrorKind::Timeout,
            "deadline",
        ))]);
        let orch = ConsultationOrchestrator::builder()
            .with_generator(generator)
            .record_failures(false)
            .build()
            .await
            .unwrap();
        assert!(orch.request_consultation(&request("rash", "s1")).await.is_err());
        assert!(orch.history().is_empty());
    }

    #[tokio::test]
    async fn test_regenerate_labels_and_refreshes_cache() {
        let generator = ScriptedGenerator::new(vec![
            Ok(result("first")),
            Ok(result("second")),
            Ok(result("third")),
            Ok(result("fourth")),
        ]);
        let (orch, clock) = orchestrator(generator.clone()).await;
        let req = request("itchy red rash on arm", "s1");

        orch.request_consultation(&req).await.unwrap();
        clock.advance(Duration::from_secs(5));
        let again = orch.regenerate(&req, None).await.unwrap();
        assert_eq!(again.consultation.assessment, "second");
        clock.advance(Duration::from_secs(5));
        let changed = request("severe chest pain and shortness of breath", "s1");
        orch.regenerate(&changed, None).await.unwrap();
        clock.advance(Duration::from_secs(5));
        orch.regenerate(&changed, Some("more_detail")).await.unwrap();

        assert_eq!(generator.calls(), 4);
        let reasons: Vec<Option<String>> = orch
            .get_history("s1", None)
            .into_iter()
            .map(|e| e.regeneration_reason)
            .collect();
        assert_eq!(
            reasons,
            vec![
                Some("more_detail".to_string()),
                Some(REASON_SYMPTOMS_UPDATED.to_string()),
                Some(REASON_SAME_SYMPTOMS.to_string()),
                None,
            ]
        );
        // the regenerated result replaced the cached one
        let hit = orch.request_consultation(&req).await.unwrap();
        assert_eq!(hit.consultation.assessment, "second");
        assert_eq!(generator.calls(), 4);
    }

    #[tokio::test]
    async fn test_clear_history_and_health() {
        let generator = ScriptedGenerator::new(vec![Ok(result("ok"))]);
        let (orch, _) = orchestrator(generator).await;
        orch.request_consultation(&request("rash", "s1")).await.unwrap();
        orch.request_consultation(&request("rash", "s2")).await.unwrap();

        let health = orch.health();
        assert_eq!(health.store, "memory");
        assert_eq!((health.cache_size, health.history_size, health.pending), (1, 2, 0));

        assert_eq!(orch.clear_history(Some("s1")).await, 1);
        assert_eq!(orch.clear_history(None).await, 1);
        assert!(orch.history().is_empty());

        orch.clear_cache();
        assert_eq!(orch.health().cache_size, 0);
    }

    #[tokio::test]
    async fn test_expired_entries_are_regenerated() {
        let generator = ScriptedGenerator::new(vec![Ok(result("ok"))]);
        let clock = Arc::new(ManualClock::new(0));
        let orch = ConsultationOrchestrator::builder()
            .with_generator(generator.clone())
            .with_cache_config(CacheConfig::new().with_ttl(Duration::from_secs(60)))
            .with_clock(clock.clone())
            .build()
            .await
            .unwrap();
        let req = request("rash", "s1");
        orch.request_consultation(&req).await.unwrap();
        clock.advance(Duration::from_secs(61));
        assert_eq!(
            orch.sweep_expired().await,
            SweepReport {
                cache_entries: 1,
                history_entries: 0
            }
        );
        orch.request_consultation(&req).await.unwrap();
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_sweep_purges_history_past_retention() {
        let generator = ScriptedGenerator::new(vec![Ok(result("ok"))]);
        let (orch, clock) = orchestrator(generator).await;
        orch.request_consultation(&request("rash", "s1")).await.unwrap();
        clock.advance(Duration::from_secs(12 * 3600));
        orch.request_consultation(&request("rash spreading", "s1")).await.unwrap();

        clock.advance(Duration::from_secs(13 * 3600));
        let report = orch.sweep_expired().await;
        assert_eq!(report.history_entries, 1);
        assert_eq!(report.cache_entries, 2);
        let history = orch.get_history("s1", None);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].symptoms, "rash spreading");
    }

    #[tokio::test]
    async fn test_leader_uses_entry_cached_after_caller_miss() {
        let generator = ScriptedGenerator::new(vec![Ok(result("generated"))]);
        let (orch, _) = orchestrator(generator.clone()).await;
        let req = request("itchy rash", "s1");
        let fingerprint = orch.fingerprints.build(&req);

        // another generation settles after this caller's cache miss
        assert!(orch.cache().get(&fingerprint).is_none());
        orch.cache().set(fingerprint.clone(), &result("settled elsewhere"));

        let (outcome, role) = orch
            .generate_shared(fingerprint.as_str(), fingerprint.clone(), &req, true)
            .await
            .unwrap();
        assert_eq!(role, DedupRole::Leader);
        assert_eq!(outcome.unwrap().consultation.assessment, "settled elsewhere");
        assert_eq!(generator.calls(), 0);
        let stats = orch.get_cache_stats();
        assert_eq!((stats.hits, stats.misses), (0, 1));

        // regenerations never take that shortcut
        let (outcome, _) = orch
            .generate_shared("regenerate:x", fingerprint, &req, false)
            .await
            .unwrap();
        assert_eq!(outcome.unwrap().consultation.assessment, "generated");
        assert_eq!(generator.calls(), 1);
    }
}

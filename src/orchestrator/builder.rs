use super::{ConsultationOrchestrator, OrchestratorConfig};
use crate::cache::{CacheConfig, FingerprintBuilder, ResponseCache};
use crate::clock::{Clock, SystemClock};
use crate::config::CoreConfig;
use crate::dedup::RequestDeduplicator;
use crate::generator::ConsultationGenerator;
use crate::history::{DurableStore, HistoryConfig, HistoryStore, NullStore};
use crate::similarity::{SimilarityConfig, SimilarityDetector};
use crate::{Error, ErrorContext, Result};
use std::sync::Arc;

/// Builder for [`ConsultationOrchestrator`].
///
/// Only the generator is required. Without a store, history lives in memory
/// for the lifetime of the orchestrator.
pub struct ConsultationOrchestratorBuilder {
    generator: Option<Arc<dyn ConsultationGenerator>>,
    cache_config: CacheConfig,
    history_config: HistoryConfig,
    similarity_config: SimilarityConfig,
    config: OrchestratorConfig,
    store: Option<Arc<dyn DurableStore>>,
    clock: Arc<dyn Clock>,
    salt: Option<String>,
    cache: Option<Arc<ResponseCache>>,
    history: Option<Arc<HistoryStore>>,
}

impl Default for ConsultationOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsultationOrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            generator: None,
            cache_config: CacheConfig::default(),
            history_config: HistoryConfig::default(),
            similarity_config: SimilarityConfig::default(),
            config: OrchestratorConfig::default(),
            store: None,
            clock: Arc::new(SystemClock),
            salt: None,
            cache: None,
            history: None,
        }
    }

    /// Applies every section of a loaded [`CoreConfig`].
    pub fn with_config(mut self, config: CoreConfig) -> Self {
        self.cache_config = config.cache;
        self.history_config = config.history;
        self.similarity_config = config.similarity;
        self.config = config.orchestrator;
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn ConsultationGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    pub fn with_history_config(mut self, config: HistoryConfig) -> Self {
        self.history_config = config;
        self
    }

    pub fn with_similarity_config(mut self, config: SimilarityConfig) -> Self {
        self.similarity_config = config;
        self
    }

    /// Whether failed generations are still written to history.
    pub fn record_failures(mut self, enable: bool) -> Self {
        self.config.record_failures = enable;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Mixed into every fingerprint; changing it invalidates cached entries.
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    /// Shares an existing cache instead of building one from config.
    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Shares an existing history store instead of opening one.
    pub fn with_history(mut self, history: Arc<HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    /// Builds the orchestrator, rehydrating history from the store.
    ///
    /// Fails with [`Error::Configuration`] when the generator is missing or
    /// a config section is out of range. Sections backing a shared cache or
    /// history passed in with `with_cache`/`with_history` are not checked.
    pub async fn build(self) -> Result<ConsultationOrchestrator> {
        let generator = self.generator.ok_or_else(|| {
            Error::configuration_with_context(
                "a consultation generator is required",
                ErrorContext::new()
                    .with_field_path("generator")
                    .with_source("orchestrator_builder"),
            )
        })?;
        if self.cache.is_none() {
            self.cache_config.validate()?;
        }
        if self.history.is_none() {
            self.history_config.validate()?;
        }
        self.similarity_config.validate()?;

        let cache = match self.cache {
            Some(cache) => cache,
            None => Arc::new(ResponseCache::with_clock(
                self.cache_config,
                Arc::clone(&self.clock),
            )),
        };
        let history = match self.history {
            Some(history) => history,
            None => {
                let store = self
                    .store
                    .unwrap_or_else(|| Arc::new(NullStore::new()) as Arc<dyn DurableStore>);
                Arc::new(HistoryStore::open(self.history_config, store, Arc::clone(&self.clock)).await)
            }
        };
        let fingerprints = match self.salt {
            Some(salt) => FingerprintBuilder::new().with_salt(salt),
            None => FingerprintBuilder::new(),
        };

        Ok(ConsultationOrchestrator {
            cache,
            history,
            dedup: RequestDeduplicator::new(),
            generator,
            fingerprints,
            similarity: SimilarityDetector::new(self.similarity_config),
            config: self.config,
        })
    }
}

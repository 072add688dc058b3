//! Session-scoped consultation ledger.

use super::entry::HistoryEntry;
use super::persistence::{DurableStore, NullStore};
use super::stats::{self, HistoryStatistics};
use crate::cache::AnalysisFingerprint;
use crate::clock::{Clock, SystemClock};
use crate::types::ConsultationResult;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

const FORMAT_VERSION: u32 = 1;
const MIN_RETENTION_HOURS: u64 = 1;
const MAX_RETENTION_HOURS: u64 = 7 * 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Entries kept across all sessions.
    pub max_entries: usize,
    /// Default `limit` for session and analysis views.
    pub session_view_limit: usize,
    /// Scope under which the ledger is saved in the durable store.
    pub storage_key: String,
    /// Entries older than this are purged on reload and on sweeps.
    pub retention_hours: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: 50,
            session_view_limit: 10,
            storage_key: "consultation_history".to_string(),
            retention_hours: 24,
        }
    }
}

impl HistoryConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }
    pub fn with_session_view_limit(mut self, limit: usize) -> Self {
        self.session_view_limit = limit;
        self
    }
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }
    pub fn with_retention_hours(mut self, hours: u64) -> Self {
        self.retention_hours = hours;
        self
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours.saturating_mul(3600))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(Error::configuration_field("history.max_entries", "must be at least 1"));
        }
        if !(MIN_RETENTION_HOURS..=MAX_RETENTION_HOURS).contains(&self.retention_hours) {
            return Err(Error::configuration_field(
                "history.retention_hours",
                format!("must be within [{}, {}]", MIN_RETENTION_HOURS, MAX_RETENTION_HOURS),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedHistory {
    version: u32,
    entries: Vec<HistoryEntry>,
}

/// Append-only (bounded) ledger of consultation attempts, most recent first.
///
/// Mutations happen under a short synchronous lock; the durable store is
/// written afterwards. Saves are serialized so the last write always holds
/// the latest state. Store failures are logged and otherwise ignored.
pub struct HistoryStore {
    config: HistoryConfig,
    entries: Mutex<Vec<HistoryEntry>>,
    store: Arc<dyn DurableStore>,
    clock: Arc<dyn Clock>,
    persist_lock: tokio::sync::Mutex<()>,
}

impl HistoryStore {
    /// Opens the ledger and rehydrates it from `store`.
    pub async fn open(
        config: HistoryConfig,
        store: Arc<dyn DurableStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let history = Self::detached(config, store, clock);
        history.reload().await;
        history
    }

    /// In-memory ledger that persists nowhere.
    pub fn in_memory(config: HistoryConfig) -> Self {
        Self::detached(config, Arc::new(NullStore::new()), Arc::new(SystemClock))
    }

    fn detached(config: HistoryConfig, store: Arc<dyn DurableStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            entries: Mutex::new(Vec::new()),
            store,
            clock,
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<HistoryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces in-memory state with what the durable store holds, minus
    /// entries past the retention window.
    /// Unreadable or undecodable data yields an empty ledger.
    pub async fn reload(&self) -> usize {
        let scope = &self.config.storage_key;
        let mut loaded = match self.store.load(scope).await {
            Ok(Some(blob)) => match serde_json::from_str::<PersistedHistory>(&blob) {
                Ok(p) => p.entries,
                Err(e) => {
                    warn!(store = self.store.name(), error = %e, "discarding undecodable history");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(store = self.store.name(), error = %e, "history store unavailable, starting empty");
                Vec::new()
            }
        };
        let before = loaded.len();
        let cutoff = self.retention_cutoff_ms();
        loaded.retain(|e| e.timestamp_ms >= cutoff);
        let purged = before - loaded.len();
        loaded.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
        loaded.truncate(self.config.max_entries);
        let count = loaded.len();
        *self.lock() = loaded;
        debug!(count, purged, "history rehydrated");
        if purged > 0 {
            self.persist().await;
        }
        count
    }

    /// Oldest timestamp still inside the retention window.
    fn retention_cutoff_ms(&self) -> u64 {
        let retention_ms = self.config.retention().as_millis() as u64;
        self.clock.now_ms().saturating_sub(retention_ms)
    }

    /// Drops entries older than the retention window and returns how many
    /// were removed.
    pub async fn purge_expired(&self) -> usize {
        let cutoff = self.retention_cutoff_ms();
        let purged = {
            let mut entries = self.lock();
            let before = entries.len();
            entries.retain(|e| e.timestamp_ms >= cutoff);
            before - entries.len()
        };
        if purged > 0 {
            info!(purged, "purged history past retention");
            self.persist().await;
        }
        purged
    }

    /// Records a consultation and returns its entry id.
    pub async fn append(
        &self,
        result: &ConsultationResult,
        symptoms: &str,
        session_id: &str,
        analysis_fingerprint: &AnalysisFingerprint,
        reason: Option<&str>,
    ) -> String {
        let entry = self.new_entry(result, symptoms, session_id, analysis_fingerprint, reason, None);
        self.insert(entry).await
    }

    /// Records a failed generation with whatever result was available.
    pub async fn append_failure(
        &self,
        result: &ConsultationResult,
        symptoms: &str,
        session_id: &str,
        analysis_fingerprint: &AnalysisFingerprint,
        reason: Option<&str>,
        failure: &str,
    ) -> String {
        let entry = self.new_entry(
            result,
            symptoms,
            session_id,
            analysis_fingerprint,
            reason,
            Some(failure.to_string()),
        );
        self.insert(entry).await
    }

    fn new_entry(
        &self,
        result: &ConsultationResult,
        symptoms: &str,
        session_id: &str,
        analysis_fingerprint: &AnalysisFingerprint,
        reason: Option<&str>,
        failure: Option<String>,
    ) -> HistoryEntry {
        HistoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp_ms: self.clock.now_ms(),
            symptoms: symptoms.to_string(),
            result: result.clone(),
            regeneration_reason: reason.map(str::to_string),
            session_id: session_id.to_string(),
            analysis_fingerprint: analysis_fingerprint.clone(),
            failure,
        }
    }

    async fn insert(&self, entry: HistoryEntry) -> String {
        let id = entry.id.clone();
        {
            let mut entries = self.lock();
            entries.insert(0, entry);
            while entries.len() > self.config.max_entries {
                // oldest timestamp goes first; among equals the one nearest the tail
                let oldest = entries
                    .iter()
                    .enumerate()
                    .rev()
                    .min_by_key(|(_, e)| e.timestamp_ms)
                    .map(|(i, _)| i);
                match oldest {
                    Some(i) => {
                        entries.remove(i);
                    }
                    None => break,
                }
            }
        }
        self.persist().await;
        id
    }

    async fn persist(&self) {
        let _serial = self.persist_lock.lock().await;
        let snapshot = PersistedHistory {
            version: FORMAT_VERSION,
            entries: self.lock().clone(),
        };
        let blob = match serde_json::to_string(&snapshot) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "failed to encode history");
                return;
            }
        };
        if let Err(e) = self.store.save(&self.config.storage_key, &blob).await {
            warn!(store = self.store.name(), error = %e, "failed to persist history");
        }
    }

    fn filtered<P>(&self, limit: Option<usize>, pred: P) -> Vec<HistoryEntry>
    where
        P: Fn(&HistoryEntry) -> bool,
    {
        let limit = limit.unwrap_or(self.config.session_view_limit);
        self.lock()
            .iter()
            .filter(|e| pred(*e))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Entries of a session, most recent first.
    pub fn by_session(&self, session_id: &str, limit: Option<usize>) -> Vec<HistoryEntry> {
        self.filtered(limit, |e| e.session_id == session_id)
    }

    /// Entries sharing an analysis fingerprint, most recent first.
    pub fn by_analysis(
        &self,
        analysis_fingerprint: &AnalysisFingerprint,
        limit: Option<usize>,
    ) -> Vec<HistoryEntry> {
        self.filtered(limit, |e| &e.analysis_fingerprint == analysis_fingerprint)
    }

    /// Most recent entry for an analysis within one session.
    pub fn latest_for_analysis(
        &self,
        session_id: &str,
        analysis_fingerprint: &AnalysisFingerprint,
    ) -> Option<HistoryEntry> {
        self.lock()
            .iter()
            .find(|e| e.session_id == session_id && &e.analysis_fingerprint == analysis_fingerprint)
            .cloned()
    }

    pub fn by_id(&self, id: &str) -> Option<HistoryEntry> {
        self.lock().iter().find(|e| e.id == id).cloned()
    }

    pub async fn remove(&self, id: &str) -> bool {
        let removed = {
            let mut entries = self.lock();
            let before = entries.len();
            entries.retain(|e| e.id != id);
            entries.len() != before
        };
        if removed {
            self.persist().await;
        }
        removed
    }

    pub async fn clear_session(&self, session_id: &str) -> usize {
        let removed = {
            let mut entries = self.lock();
            let before = entries.len();
            entries.retain(|e| e.session_id != session_id);
            before - entries.len()
        };
        if removed > 0 {
            self.persist().await;
        }
        removed
    }

    pub async fn clear_all(&self) {
        self.lock().clear();
        self.persist().await;
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn statistics(&self) -> HistoryStatistics {
        stats::compute(&self.lock())
    }

    pub fn suggest_regeneration_prompts(&self, session_id: &str) -> Vec<String> {
        let all = self.lock().clone();
        let session: Vec<HistoryEntry> = all
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect();
        stats::suggest(&session, &all)
    }
}

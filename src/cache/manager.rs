//! Response cache manager.

use super::entry::CacheEntry;
use super::key::Fingerprint;
use crate::clock::{Clock, SystemClock};
use crate::types::ConsultationResult;
use crate::{Error, Result};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    #[serde(rename = "ttl_secs", with = "duration_secs")]
    pub ttl: Duration,
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            ttl: Duration::from_secs(30 * 60),
            enabled: true,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(Error::configuration_field("cache.max_entries", "must be at least 1"));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub hit_rate: f64,
    pub total_requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl AtomicStats {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }
    fn to_stats(&self, size: usize) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            size,
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
            total_requests: total,
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}

/// Fingerprint-keyed consultation cache with TTL expiry and LRU eviction.
///
/// Recency order lives in the [`LruCache`]: every `get` hit and every `set`
/// moves the entry to the front, so entries that were never read are evicted
/// in insertion order.
pub struct ResponseCache {
    config: CacheConfig,
    entries: Mutex<LruCache<Fingerprint, CacheEntry>>,
    clock: Arc<dyn Clock>,
    stats: AtomicStats,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let cap = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            entries: Mutex::new(LruCache::new(cap)),
            clock,
            stats: AtomicStats::new(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<Fingerprint, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Looks up an unexpired result and returns it in cache-hit form.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<ConsultationResult> {
        if !self.config.enabled {
            return None;
        }
        let now = self.clock.now_ms();
        let mut entries = self.lock();

        let expired = match entries.peek(fingerprint) {
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                debug!(fingerprint = %fingerprint, "cache miss");
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };
        if expired {
            entries.pop(fingerprint);
            self.stats.expirations.fetch_add(1, Ordering::Relaxed);
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            debug!(fingerprint = %fingerprint, "cache entry expired");
            return None;
        }

        let entry = entries.get_mut(fingerprint)?;
        entry.touch(now);
        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        debug!(fingerprint = %fingerprint, access_count = entry.access_count, "cache hit");
        Some(entry.result.as_cache_hit())
    }

    /// Stores a copy of `result`. Returns `false` when the result was rejected
    /// as not well-formed or the cache is disabled.
    pub fn set(&self, fingerprint: Fingerprint, result: &ConsultationResult) -> bool {
        if !self.config.enabled {
            return false;
        }
        if !result.is_well_formed() {
            debug!(fingerprint = %fingerprint, "refusing to cache incomplete result");
            return false;
        }
        let now = self.clock.now_ms();
        let ttl_ms = self.config.ttl.as_millis() as u64;
        let mut entries = self.lock();

        if !entries.contains(&fingerprint) && entries.len() >= entries.cap().get() {
            let purged = purge_expired(&mut entries, now);
            self.stats.expirations.fetch_add(purged as u64, Ordering::Relaxed);
            if entries.len() >= entries.cap().get() {
                if let Some((evicted, _)) = entries.pop_lru() {
                    self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                    info!(fingerprint = %evicted, "evicted least recently used cache entry");
                }
            }
        }

        let entry = CacheEntry::new(fingerprint.clone(), result.clone(), now, ttl_ms);
        entries.put(fingerprint, entry);
        true
    }

    /// Removes every expired entry and returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let purged = purge_expired(&mut self.lock(), now);
        if purged > 0 {
            self.stats.expirations.fetch_add(purged as u64, Ordering::Relaxed);
            debug!(purged, "swept expired cache entries");
        }
        purged
    }

    /// Unexpired result in cache-hit form, without touching recency or
    /// hit/miss counters.
    pub fn peek(&self, fingerprint: &Fingerprint) -> Option<ConsultationResult> {
        let now = self.clock.now_ms();
        self.lock()
            .peek(fingerprint)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.result.as_cache_hit())
    }

    /// Inspects an entry without refreshing its recency.
    pub fn peek_entry(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        self.lock().peek(fingerprint).cloned()
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        let now = self.clock.now_ms();
        self.lock()
            .peek(fingerprint)
            .map(|e| !e.is_expired(now))
            .unwrap_or(false)
    }

    pub fn remove(&self, fingerprint: &Fingerprint) -> bool {
        self.lock().pop(fingerprint).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let size = self.len();
        self.stats.to_stats(size)
    }
}

fn purge_expired(entries: &mut LruCache<Fingerprint, CacheEntry>, now: u64) -> usize {
    let expired: Vec<Fingerprint> = entries
        .iter()
        .filter(|(_, e)| e.is_expired(now))
        .map(|(k, _)| k.clone())
        .collect();
    for k in &expired {
        entries.pop(k);
    }
    expired.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::result::fixtures::result;

    fn cache(max: usize, ttl: Duration) -> (ResponseCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let config = CacheConfig::new().with_max_entries(max).with_ttl(ttl);
        (ResponseCache::with_clock(config, clock.clone()), clock)
    }

    fn fp(s: &str) -> Fingerprint {
        Fingerprint::from(s)
    }

    #[test]
    fn test_cache_config_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.max_entries, 100);
        assert_eq!(config.ttl, Duration::from_secs(1800));
        assert!(config.enabled);
    }

    #[test]
    fn test_set_then_get_returns_same_content() {
        let (cache, _) = cache(10, Duration::from_secs(60));
        let stored = result("Likely eczema");
        assert!(cache.set(fp("a"), &stored));

        let hit = cache.get(&fp("a")).expect("hit");
        assert!(hit.same_content(&stored));
        assert_eq!(hit.metadata.processing_time_ms, 0);
        assert!(!hit.metadata.fallback_used);

        // the stored copy keeps its original metadata
        let entry = cache.peek_entry(&fp("a")).unwrap();
        assert_eq!(entry.result.metadata.processing_time_ms, 1_250);
        assert!(entry.result.metadata.fallback_used);
        assert_eq!(entry.access_count, 1);
    }

    #[test]
    fn test_caller_mutation_does_not_leak_into_cache() {
        let (cache, _) = cache(10, Duration::from_secs(60));
        let mut mine = result("original");
        cache.set(fp("a"), &mine);
        mine.consultation.assessment = "tampered".into();
        let mut hit = cache.get(&fp("a")).unwrap();
        hit.consultation.recommendations.clear();
        let again = cache.get(&fp("a")).unwrap();
        assert_eq!(again.consultation.assessment, "original");
        assert_eq!(again.consultation.recommendations.len(), 2);
    }

    #[test]
    fn test_peek_leaves_stats_and_recency_alone() {
        let (cache, clock) = cache(2, Duration::from_secs(60));
        cache.set(fp("a"), &result("a"));
        cache.set(fp("b"), &result("b"));
        let seen = cache.peek(&fp("a")).unwrap();
        assert_eq!(seen.metadata.processing_time_ms, 0);
        assert_eq!(cache.stats().total_requests, 0);

        // "a" is still least recently used
        cache.set(fp("c"), &result("c"));
        assert!(!cache.contains(&fp("a")));

        clock.advance(Duration::from_secs(61));
        assert!(cache.peek(&fp("b")).is_none());
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let err = CacheConfig::new().with_max_entries(0).validate().unwrap_err();
        assert!(err.to_string().contains("cache.max_entries"));
        assert!(CacheConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_malformed_results() {
        let (cache, _) = cache(10, Duration::from_secs(60));
        assert!(!cache.set(fp("blank"), &result("")));
        let mut failed_safety = result("ok");
        failed_safety.metadata.safety_validated = false;
        assert!(!cache.set(fp("unsafe"), &failed_safety));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let (cache, clock) = cache(3, Duration::from_secs(600));
        for key in ["a", "b", "c"] {
            cache.set(fp(key), &result(key));
            clock.advance(Duration::from_millis(10));
        }
        cache.set(fp("d"), &result("d"));
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&fp("a")));
        assert!(cache.contains(&fp("b")));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_get_protects_from_eviction() {
        let (cache, clock) = cache(3, Duration::from_secs(600));
        for key in ["a", "b", "c"] {
            cache.set(fp(key), &result(key));
            clock.advance(Duration::from_millis(10));
        }
        assert!(cache.get(&fp("a")).is_some());
        cache.set(fp("d"), &result("d"));
        assert!(cache.contains(&fp("a")));
        assert!(!cache.contains(&fp("b")));
    }

    #[test]
    fn test_eviction_tie_break_is_insertion_order() {
        // same timestamp for every insert
        let (cache, _) = cache(2, Duration::from_secs(600));
        cache.set(fp("first"), &result("1"));
        cache.set(fp("second"), &result("2"));
        cache.set(fp("third"), &result("3"));
        assert!(!cache.contains(&fp("first")));
        assert!(cache.contains(&fp("second")));
        assert!(cache.contains(&fp("third")));
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let (cache, _) = cache(2, Duration::from_secs(600));
        cache.set(fp("a"), &result("1"));
        cache.set(fp("b"), &result("2"));
        cache.set(fp("a"), &result("1b"));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.get(&fp("a")).unwrap().consultation.assessment, "1b");
    }

    #[test]
    fn test_ttl_boundary() {
        let ttl = Duration::from_secs(30);
        let (cache, clock) = cache(10, ttl);
        cache.set(fp("a"), &result("a"));

        clock.advance(ttl - Duration::from_millis(1));
        assert!(cache.get(&fp("a")).is_some());

        clock.advance(Duration::from_millis(2));
        assert!(cache.get(&fp("a")).is_none());
        assert!(cache.peek_entry(&fp("a")).is_none(), "expired entry must be purged");
        let stats = cache.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_sweep_expired_removes_only_stale_entries() {
        let (cache, clock) = cache(10, Duration::from_secs(10));
        cache.set(fp("old"), &result("old"));
        clock.advance(Duration::from_secs(8));
        cache.set(fp("new"), &result("new"));
        clock.advance(Duration::from_secs(5));
        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&fp("new")));
    }

    #[test]
    fn test_full_cache_prefers_dropping_expired_entries() {
        let (cache, clock) = cache(2, Duration::from_secs(10));
        cache.set(fp("stale"), &result("stale"));
        clock.advance(Duration::from_secs(9));
        cache.set(fp("live"), &result("live"));
        clock.advance(Duration::from_secs(2));
        cache.set(fp("fresh"), &result("fresh"));
        assert!(cache.contains(&fp("live")));
        assert!(cache.contains(&fp("fresh")));
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_stats_hit_rate() {
        let (cache, _) = cache(10, Duration::from_secs(60));
        assert_eq!(cache.stats().hit_rate, 0.0);
        cache.set(fp("a"), &result("a"));
        cache.get(&fp("a"));
        cache.get(&fp("a"));
        cache.get(&fp("a"));
        cache.get(&fp("missing"));
        let stats = cache.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_requests, 4);
        assert!((stats.hit_rate - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_disabled_cache_never_stores() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = ResponseCache::with_clock(CacheConfig::new().with_enabled(false), clock);
        assert!(!cache.set(fp("a"), &result("a")));
        assert!(cache.get(&fp("a")).is_none());
        assert_eq!(cache.stats().total_requests, 0);
    }

    #[test]
    fn test_config_from_yaml_uses_seconds() {
        let config: CacheConfig = serde_yaml::from_str("max_entries: 5\nttl_secs: 90\n").unwrap();
        assert_eq!(config.max_entries, 5);
        assert_eq!(config.ttl, Duration::from_secs(90));
        assert!(config.enabled);
    }
}

//! Cached consultation entry.

use super::key::Fingerprint;
use crate::types::ConsultationResult;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub result: ConsultationResult,
    pub created_at_ms: u64,
    pub expires_at_ms: u64,
    pub access_count: u64,
    pub last_accessed_ms: u64,
}

impl CacheEntry {
    pub(crate) fn new(
        fingerprint: Fingerprint,
        result: ConsultationResult,
        now_ms: u64,
        ttl_ms: u64,
    ) -> Self {
        Self {
            fingerprint,
            result,
            created_at_ms: now_ms,
            expires_at_ms: now_ms.saturating_add(ttl_ms),
            access_count: 0,
            last_accessed_ms: now_ms,
        }
    }

    /// Still valid at exactly `expires_at_ms`; gone one millisecond later.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.expires_at_ms
    }

    pub(crate) fn touch(&mut self, now_ms: u64) {
        self.access_count += 1;
        self.last_accessed_ms = now_ms;
    }
}

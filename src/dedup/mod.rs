//! 请求去重模块：同一指纹同一时刻最多只有一个外部生成调用。
//!
//! # In-flight Request Deduplication
//!
//! [`RequestDeduplicator`] collapses concurrent calls that share a key into
//! one underlying operation. Each key moves through
//! `idle → pending → settled → idle`:
//!
//! - **idle**: no record; the next caller becomes the leader
//! - **pending**: the leader's operation runs as a spawned task; later
//!   callers join its shared outcome
//! - **settled**: the task drops its settle guard, which removes the record
//!   before any waiter observes the value
//!
//! The guard runs on success, on failure and on panic, so a key can never be
//! left pending. Callers that stop waiting do not cancel the task.
//!
//! Errors are values here: use a `Result` as `T` and every waiter receives the
//! same `Err`. Nothing is cached after settlement.
//!
//! ```rust
//! use consult_cache::dedup::RequestDeduplicator;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> consult_cache::Result<()> {
//! let dedup: RequestDeduplicator<u32> = RequestDeduplicator::new();
//! let value = dedup.run_deduplicated("key", || async { 42 }).await?;
//! assert_eq!(value, 42);
//! assert!(!dedup.is_pending("key"));
//! # Ok(())
//! # }
//! ```

use crate::{Error, ErrorContext, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

type SharedOutcome<T> = Shared<BoxFuture<'static, std::result::Result<T, String>>>;
type PendingMap<T> = Arc<Mutex<HashMap<String, Pending<T>>>>;

struct Pending<T> {
    generation: u64,
    outcome: SharedOutcome<T>,
}

/// Whether a caller started the operation or joined one already in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupRole {
    Leader,
    Joined,
}

pub struct RequestDeduplicator<T> {
    pending: PendingMap<T>,
    next_generation: AtomicU64,
}

impl<T> Default for RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(map: &Mutex<HashMap<String, Pending<T>>>) -> MutexGuard<'_, HashMap<String, Pending<T>>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Runs `operation` unless a call under `key` is already pending, in which
    /// case the pending outcome is awaited instead.
    ///
    /// Returns `Error::Runtime` only when the operation panicked or the
    /// runtime cancelled it.
    pub async fn run_deduplicated<F, Fut>(&self, key: &str, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        self.run_tracked(key, operation).await.map(|(value, _)| value)
    }

    /// Like [`run_deduplicated`](Self::run_deduplicated) but also reports the
    /// caller's [`DedupRole`].
    ///
    /// `operation` is called while the pending map is locked. Its
    /// synchronous part must not touch this deduplicator (no nested
    /// `run_*`, `is_pending` or `pending_count`) or it deadlocks. Work
    /// inside the returned future runs on a spawned task and is unrestricted.
    pub async fn run_tracked<F, Fut>(&self, key: &str, operation: F) -> Result<(T, DedupRole)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (outcome, role) = {
            let mut pending = lock(&self.pending);
            if let Some(existing) = pending.get(key) {
                debug!(key, "joining pending request");
                (existing.outcome.clone(), DedupRole::Joined)
            } else {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let guard = SettleGuard {
                    pending: Arc::clone(&self.pending),
                    key: key.to_string(),
                    generation,
                };
                let fut = operation();
                // The record is inserted before the lock is released, so the
                // guard can never run ahead of the insert.
                let handle = tokio::spawn(async move {
                    let _guard = guard;
                    fut.await
                });
                let outcome = async move {
                    handle.await.map_err(|e| {
                        if e.is_panic() {
                            "deduplicated operation panicked".to_string()
                        } else {
                            "deduplicated operation was cancelled".to_string()
                        }
                    })
                }
                .boxed()
                .shared();
                pending.insert(
                    key.to_string(),
                    Pending {
                        generation,
                        outcome: outcome.clone(),
                    },
                );
                debug!(key, generation, "started deduplicated operation");
                (outcome, DedupRole::Leader)
            }
        };

        match outcome.await {
            Ok(value) => Ok((value, role)),
            Err(msg) => Err(Error::runtime_with_context(
                msg,
                ErrorContext::new()
                    .with_details(format!("key: {}", key))
                    .with_source("request_deduplicator"),
            )),
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        lock(&self.pending).contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }
}

/// Removes the pending record for one generation of a key when dropped.
struct SettleGuard<T> {
    pending: PendingMap<T>,
    key: String,
    generation: u64,
}

impl<T> Drop for SettleGuard<T> {
    fn drop(&mut self) {
        let mut pending = lock(&self.pending);
        let ours = pending
            .get(&self.key)
            .map(|p| p.generation == self.generation)
            .unwrap_or(false);
        if ours {
            pending.remove(&self.key);
        }
    }
}

//! 响应缓存模块：按请求指纹缓存会诊结果，避免重复的远程生成调用。
//!
//! # Response Caching Module
//!
//! This module keeps generated consultations keyed by a request fingerprint so
//! equivalent requests are answered without another remote generation call.
//!
//! ## Overview
//!
//! Caching is valuable for:
//! - Reducing generation cost by answering equivalent requests locally
//! - Improving latency when a user reopens a consultation
//! - Staying usable while the generator is rate limited
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ResponseCache`] | Bounded, TTL-expiring, LRU-evicting result cache |
//! | [`CacheConfig`] | Capacity, TTL and enable flag |
//! | [`CacheStats`] | Hit/miss counters and current size |
//! | [`CacheEntry`] | Stored result with access bookkeeping |
//! | [`FingerprintBuilder`] | Derives [`Fingerprint`]s from requests |
//!
//! ## Example
//!
//! ```rust
//! use consult_cache::cache::{CacheConfig, FingerprintBuilder, ResponseCache};
//! use consult_cache::types::{AnalysisSummary, ConsultationRequest, RiskLevel};
//! use std::time::Duration;
//!
//! let cache = ResponseCache::new(
//!     CacheConfig::new()
//!         .with_max_entries(100)
//!         .with_ttl(Duration::from_secs(30 * 60)),
//! );
//! let request = ConsultationRequest::new(
//!     AnalysisSummary::new("eczema", 0.82, RiskLevel::Medium),
//!     "itchy red rash on arm",
//!     "session-1",
//! );
//! let fingerprint = FingerprintBuilder::new().build(&request);
//! assert!(cache.get(&fingerprint).is_none());
//! ```
//!
//! ## Fingerprints
//!
//! Fingerprints are built from:
//! - Top finding label
//! - Confidence rounded to two decimal places
//! - Risk level
//! - Symptom text, lowercased with whitespace collapsed
//!
//! The session id is not part of the key.

mod entry;
mod key;
mod manager;

pub use entry::CacheEntry;
pub use key::{confidence_bucket, AnalysisFingerprint, Fingerprint, FingerprintBuilder};
pub use manager::{CacheConfig, CacheStats, ResponseCache};

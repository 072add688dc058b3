//! 会诊历史模块：按会话记录每一次会诊尝试，支持统计与重新生成提示。
//!
//! # Consultation History Module
//!
//! An append-only, bounded ledger of consultation attempts. Every request is
//! recorded whether it was answered from the cache, joined an in-flight
//! generation, or generated fresh, so later regenerations can be compared
//! against what the user saw before.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`HistoryStore`] | The ledger: append, query, delete, statistics |
//! | [`HistoryConfig`] | Capacity, view limit and storage scope |
//! | [`HistoryEntry`] | One recorded attempt |
//! | [`HistoryStatistics`] | Totals, regeneration interval, top reasons |
//! | [`DurableStore`] | Trait for persistence backends |
//! | [`MemoryStore`] / [`FileStore`] / [`NullStore`] | Bundled backends |
//!
//! ## Persistence
//!
//! The whole ledger is saved as one JSON blob after every mutation and
//! loaded once when the store is opened. A store that cannot be read or
//! written degrades to an in-memory ledger; errors are logged, never returned.

mod entry;
mod persistence;
mod stats;
mod store;

pub use entry::{HistoryEntry, REASON_SAME_SYMPTOMS, REASON_SYMPTOMS_UPDATED};
pub use persistence::{DurableStore, FileStore, MemoryStore, NullStore};
pub use stats::{HistoryStatistics, ReasonCount};
pub use store::{HistoryConfig, HistoryStore};

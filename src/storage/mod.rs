//! Storage Engine Module
//!
//! The core of QuartzKV: an in-memory key-value store where every key
//! maps to a tagged value (string, integer or sorted set), may carry a
//! monotonic-clock deadline, and is evicted by a deadline-driven
//! background reaper.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       StorageEngine                          │
//! │                                                              │
//! │   ┌─────────────────┐        ┌──────────────────────┐        │
//! │   │ Table           │        │ TtlIndex             │        │
//! │   │ chained hash    │        │ min-heap over        │        │
//! │   │ key -> entry    │ <────> │ (deadline, key)      │        │
//! │   │ (value+deadline)│ mirror │ + key -> slot map    │        │
//! │   └─────────────────┘        └──────────┬───────────┘        │
//! │            │                            │ earliest deadline  │
//! │            │ sorted-set values          ▼                    │
//! │   ┌────────┴────────┐        ┌──────────────────────┐        │
//! │   │ SortedSet       │        │ ExpiryReaper         │        │
//! │   │ member -> score │        │ sleeps on the head,  │        │
//! │   │ + AVL over      │        │ wakes on signal,     │        │
//! │   │ (score, member) │        │ drains overdue keys  │        │
//! │   └─────────────────┘        └──────────────────────┘        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The deadline of a key lives in two places — the entry itself and the
//! TTL index — and the [`StorageEngine`] facade is the only code that
//! writes either, which is how the two stay coherent.

pub mod avl;
pub mod engine;
pub mod reaper;
pub mod table;
pub mod ttl;
pub mod zset;

// Re-export commonly used types
pub use avl::AvlTree;
pub use engine::{KeyTtl, StorageEngine, StoreError};
pub use reaper::{start_expiry_reaper, ExpiryReaper};
pub use table::{Entry, Lookup, Table, Value, ZsetSlot};
pub use ttl::TtlIndex;
pub use zset::SortedSet;

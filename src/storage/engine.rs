//! Storage Engine Facade
//!
//! This module composes the primary index, the TTL index and the reaper
//! wake signal into the one object the command layer talks to. Its job is
//! to keep the two representations of a key's deadline in agreement:
//!
//! > For every entry with deadline `t`, the TTL index holds exactly one
//! > record `(t, key)`, and every TTL record points at an entry with that
//! > same deadline.
//!
//! Every TTL-affecting operation therefore updates the primary index
//! first, the TTL index second, and signals the reaper last. The TTL
//! index is never handed to callers.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       StorageEngine                          │
//! │                                                              │
//! │   ┌───────────────┐     ┌───────────────┐    ┌──────────┐    │
//! │   │ Table         │     │ TtlIndex      │    │ Notify   │    │
//! │   │ (own mutex)   │     │ (own mutex)   │    │ (reaper  │    │
//! │   │ key -> entry  │     │ min-heap of   │    │  wake)   │    │
//! │   │               │     │ (deadline,key)│    │          │    │
//! │   └───────────────┘     └───────────────┘    └──────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each structure locks itself and the facade takes the locks one at a
//! time, never nested, so no lock-order cycle can form — including
//! against the reaper, which drains the TTL index first and then deletes
//! from the table key by key.

use crate::storage::table::{Lookup, Table, Value, ZsetSlot};
use crate::storage::ttl::TtlIndex;
use crate::storage::zset::SortedSet;
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Notify;

/// Errors an engine operation can report to the dispatcher.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The key holds a value of a kind the operation cannot work on.
    /// Nothing is mutated when this is returned.
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
}

/// Remaining lifetime of a key, as the TTL command sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// No such key.
    Missing,
    /// The key exists and never expires on its own.
    Persistent,
    /// Time left until the deadline, floored at zero.
    Remaining(Duration),
}

/// The public face of the store.
///
/// Designed to be wrapped in an `Arc` and shared between every connection
/// task and the expiry reaper; all operations are safe from any thread
/// and individually linearisable.
///
/// # Example
///
/// ```
/// use quartzkv::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.set(Bytes::from("name"), Bytes::from("quartz"));
/// assert_eq!(engine.get(b"name").unwrap(), Some(Bytes::from("quartz")));
///
/// engine.set_with_ttl(Bytes::from("session"), Bytes::from("tok"), Duration::from_secs(60));
/// ```
pub struct StorageEngine {
    table: Table,
    ttl: TtlIndex,
    /// Woken whenever the earliest deadline may have moved earlier, or
    /// the head record was removed.
    expiry_wake: Notify,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("keys", &self.table.len())
            .field("deadlines", &self.ttl.len())
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    pub fn new() -> Self {
        Self {
            table: Table::new(),
            ttl: TtlIndex::new(),
            expiry_wake: Notify::new(),
        }
    }

    /// Installs a string value, replacing any existing entry and clearing
    /// any prior deadline.
    pub fn set(&self, key: Bytes, value: Bytes) {
        self.table.set(key.clone(), Value::Str(value));
        self.drop_ttl_record(&key);
    }

    /// Installs a string value only if no live entry exists.
    /// Returns whether the insert happened.
    pub fn set_if_absent(&self, key: Bytes, value: Bytes) -> bool {
        if self.table.set_if_absent(key.clone(), Value::Str(value)) {
            // The slot may have held an expired entry whose record is
            // still queued; the fresh value has no deadline.
            self.drop_ttl_record(&key);
            true
        } else {
            false
        }
    }

    /// Installs a string value that expires `ttl` from now.
    pub fn set_with_ttl(&self, key: Bytes, value: Bytes, ttl: Duration) {
        let deadline = Instant::now() + ttl;
        self.table
            .set_with_deadline(key.clone(), Value::Str(value), deadline);
        if self.ttl.upsert(key, deadline) {
            self.expiry_wake.notify_one();
        }
    }

    /// The current string value, or `None` if the key is absent or past
    /// its deadline. A sorted-set key is a type error.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>, StoreError> {
        match self.table.lookup(key) {
            Lookup::Hit {
                value: Value::Str(bytes),
                ..
            } => Ok(Some(bytes)),
            Lookup::Hit {
                value: Value::Int(n),
                ..
            } => Ok(Some(Bytes::from(n.to_string()))),
            Lookup::Hit {
                value: Value::Zset(_),
                ..
            } => Err(StoreError::WrongType),
            Lookup::Expired => {
                self.drop_ttl_record(key);
                Ok(None)
            }
            Lookup::Miss => Ok(None),
        }
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        match self.table.lookup(key) {
            Lookup::Hit { .. } => true,
            Lookup::Expired => {
                self.drop_ttl_record(key);
                false
            }
            Lookup::Miss => false,
        }
    }

    /// Removes a key of any kind. Returns whether an entry was removed.
    pub fn delete(&self, key: &[u8]) -> bool {
        let removed = self.table.remove(key);
        self.drop_ttl_record(key);
        removed
    }

    /// Installs or replaces the deadline of an existing key.
    ///
    /// A zero `ttl` deletes the key outright. Returns `false` when the
    /// key does not exist.
    pub fn expire(&self, key: &Bytes, ttl: Duration) -> bool {
        if ttl.is_zero() {
            return self.delete(key);
        }
        let deadline = Instant::now() + ttl;
        match self.table.lookup(key) {
            Lookup::Hit { .. } => {
                // Re-checked under the table lock; the entry may vanish
                // between the lookup and the deadline write.
                if self.table.set_deadline(key, deadline) {
                    if self.ttl.upsert(key.clone(), deadline) {
                        self.expiry_wake.notify_one();
                    }
                    true
                } else {
                    false
                }
            }
            Lookup::Expired => {
                self.drop_ttl_record(key);
                false
            }
            Lookup::Miss => false,
        }
    }

    /// Remaining lifetime of `key`.
    pub fn ttl_of(&self, key: &[u8]) -> KeyTtl {
        match self.table.lookup(key) {
            Lookup::Hit { deadline: None, .. } => KeyTtl::Persistent,
            Lookup::Hit {
                deadline: Some(deadline),
                ..
            } => KeyTtl::Remaining(deadline.saturating_duration_since(Instant::now())),
            Lookup::Expired => {
                self.drop_ttl_record(key);
                KeyTtl::Missing
            }
            Lookup::Miss => KeyTtl::Missing,
        }
    }

    // ========================================================================
    // Sorted set operations
    // ========================================================================

    /// Adds `member` to the sorted set at `key`, creating the set if the
    /// key is missing. Returns `true` iff the member was inserted or its
    /// score changed.
    pub fn zadd(&self, key: Bytes, member: Bytes, score: f64) -> Result<bool, StoreError> {
        match self.table.zset_for_update(&key) {
            ZsetSlot::Existing(zset) => Ok(zset.add(member, score)),
            ZsetSlot::Created(zset) => {
                // The slot may have been recycled from an expired entry.
                self.drop_ttl_record(&key);
                Ok(zset.add(member, score))
            }
            ZsetSlot::WrongKind => Err(StoreError::WrongType),
        }
    }

    pub fn zrem(&self, key: &[u8], member: &[u8]) -> Result<bool, StoreError> {
        Ok(self
            .zset_read(key)?
            .map(|zset| zset.remove(member))
            .unwrap_or(false))
    }

    pub fn zscore(&self, key: &[u8], member: &[u8]) -> Result<Option<f64>, StoreError> {
        Ok(self.zset_read(key)?.and_then(|zset| zset.score_of(member)))
    }

    /// Members with rank in `[start, stop]`, both already resolved to
    /// non-negative form by the dispatcher.
    pub fn zrange(
        &self,
        key: &[u8],
        start: usize,
        stop: usize,
    ) -> Result<Vec<(Bytes, f64)>, StoreError> {
        Ok(self
            .zset_read(key)?
            .map(|zset| zset.range_by_rank(start, stop))
            .unwrap_or_default())
    }

    pub fn zrangebyscore(
        &self,
        key: &[u8],
        min: f64,
        max: f64,
    ) -> Result<Vec<(Bytes, f64)>, StoreError> {
        Ok(self
            .zset_read(key)?
            .map(|zset| zset.range_by_score(min, max))
            .unwrap_or_default())
    }

    pub fn zrank(&self, key: &[u8], member: &[u8]) -> Result<Option<usize>, StoreError> {
        Ok(self.zset_read(key)?.and_then(|zset| zset.rank_of(member)))
    }

    pub fn zcard(&self, key: &[u8]) -> Result<usize, StoreError> {
        Ok(self.zset_read(key)?.map(|zset| zset.len()).unwrap_or(0))
    }

    // ========================================================================
    // Database-wide operations
    // ========================================================================

    /// Count of entries, which may briefly include expired keys the
    /// reaper has not reached yet.
    pub fn db_size(&self) -> usize {
        self.table.len()
    }

    /// Drops every key and every deadline, then wakes the reaper so it
    /// stops waiting on a deadline that no longer exists.
    pub fn flush(&self) {
        self.table.clear();
        self.ttl.clear();
        self.expiry_wake.notify_one();
    }

    // ========================================================================
    // Expiry plumbing (used by the reaper and the tests)
    // ========================================================================

    /// The earliest deadline in the store, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.ttl.peek_earliest()
    }

    /// Pulls every overdue key out of the TTL index and deletes it from
    /// the table. Idempotent; safe to call at any time from any thread.
    ///
    /// Returns the number of entries actually removed. A key that was
    /// re-set after its record was drained is left alone.
    pub fn drain_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        for key in self.ttl.drain_expired(now) {
            if self.table.remove_expired(&key, now) {
                removed += 1;
            }
        }
        removed
    }

    /// The reaper parks on this; it is signalled whenever the earliest
    /// deadline may have moved earlier.
    pub(crate) fn expiry_wake(&self) -> &Notify {
        &self.expiry_wake
    }

    /// Count of deadline records; used by the coherence tests.
    #[cfg(test)]
    pub(crate) fn ttl_len(&self) -> usize {
        self.ttl.len()
    }

    fn zset_read(&self, key: &[u8]) -> Result<Option<Arc<SortedSet>>, StoreError> {
        match self.table.lookup(key) {
            Lookup::Hit {
                value: Value::Zset(zset),
                ..
            } => Ok(Some(zset)),
            Lookup::Hit { .. } => Err(StoreError::WrongType),
            Lookup::Expired => {
                self.drop_ttl_record(key);
                Ok(None)
            }
            Lookup::Miss => Ok(None),
        }
    }

    /// Erases the TTL record for `key`, waking the reaper if it was the
    /// head.
    fn drop_ttl_record(&self, key: &[u8]) {
        if self.ttl.remove(key) {
            self.expiry_wake.notify_one();
        }
    }
}

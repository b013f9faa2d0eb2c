//! Primary Index
//!
//! A concurrent associative container from key to [`Entry`]. This is the
//! table every command ultimately reads or writes; deadlines live here as
//! entry metadata and are mirrored into the TTL index by the engine
//! facade.
//!
//! ## Design Decisions
//!
//! 1. **Open hashing with separate chaining**: a power-of-two bucket array
//!    of short chains, compared by full key to tolerate collisions.
//! 2. **Doubling rehash**: when the load factor passes 0.75 the bucket
//!    count doubles and every entry is re-slotted. Expired entries are
//!    carried across a rehash untouched so the reaper still finds them.
//! 3. **One mutex**: a single lock covers the whole table. Critical
//!    sections are short (hash, chain walk, splice) and the lock is never
//!    held across a call into another structure.
//! 4. **Lazy expiry on read**: a lookup that lands on a past-deadline
//!    entry unlinks it and reports [`Lookup::Expired`] so the caller can
//!    erase the matching TTL record.

use crate::storage::zset::SortedSet;
use bytes::Bytes;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Initial bucket count. Must be a power of two.
const INITIAL_BUCKETS: usize = 16;

/// A stored value. The variant owns its payload; a sorted-set value owns
/// the set state, which is dropped with the entry.
#[derive(Debug, Clone)]
pub enum Value {
    /// An opaque byte string.
    Str(Bytes),
    /// Reserved: no current command constructs integer values.
    Int(i64),
    /// A sorted set. The `Arc` keeps the per-key instance stable while a
    /// command operates on it outside the table lock.
    Zset(Arc<SortedSet>),
}

/// One record of the primary index.
#[derive(Debug, Clone)]
pub struct Entry {
    pub key: Bytes,
    pub value: Value,
    /// Monotonic instant past which the entry is dead. `None` never
    /// expires.
    pub deadline: Option<Instant>,
}

impl Entry {
    fn is_expired_at(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }
}

/// Result of a point lookup.
#[derive(Debug)]
pub enum Lookup {
    /// A live entry. The value is cheap to clone (`Bytes` / `Arc`).
    Hit {
        value: Value,
        deadline: Option<Instant>,
    },
    /// The entry existed but its deadline had passed; it has been removed.
    /// The caller owes the TTL index a matching removal.
    Expired,
    Miss,
}

/// Outcome of fetching a sorted set for a mutating command.
pub enum ZsetSlot {
    /// The key already held a live sorted set.
    Existing(Arc<SortedSet>),
    /// A fresh sorted set was installed (the key was missing or expired).
    /// The caller owes the TTL index a removal for the expired case.
    Created(Arc<SortedSet>),
    /// The key holds a live value of another kind.
    WrongKind,
}

struct TableInner {
    buckets: Vec<Vec<Entry>>,
    len: usize,
}

/// The key -> entry table at the heart of the store.
pub struct Table {
    inner: Mutex<TableInner>,
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

impl Table {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TableInner {
                buckets: (0..INITIAL_BUCKETS).map(|_| Vec::new()).collect(),
                len: 0,
            }),
        }
    }

    /// Installs `value` under `key`, replacing any existing entry.
    ///
    /// Any prior deadline is cleared; the caller is responsible for
    /// removing the stale TTL record.
    pub fn set(&self, key: Bytes, value: Value) {
        let mut inner = self.inner.lock().unwrap();
        inner.upsert(key, value, None);
    }

    /// Installs `value` under `key` with `deadline`, replacing any
    /// existing entry.
    pub fn set_with_deadline(&self, key: Bytes, value: Value, deadline: Instant) {
        let mut inner = self.inner.lock().unwrap();
        inner.upsert(key, value, Some(deadline));
    }

    /// Installs `value` only if no live entry exists under `key`.
    ///
    /// An expired entry does not count as live and is replaced. Returns
    /// whether the insert happened.
    pub fn set_if_absent(&self, key: Bytes, value: Value) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let bucket = inner.bucket_index(&key);
        if let Some(entry) = inner.buckets[bucket].iter().find(|e| e.key == key) {
            if !entry.is_expired_at(now) {
                return false;
            }
        }
        inner.upsert(key, value, None);
        true
    }

    /// Looks up `key`, unlinking it first if its deadline has passed.
    pub fn lookup(&self, key: &[u8]) -> Lookup {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let bucket = inner.bucket_index(key);
        let Some(pos) = inner.buckets[bucket].iter().position(|e| e.key == key) else {
            return Lookup::Miss;
        };
        if inner.buckets[bucket][pos].is_expired_at(now) {
            inner.buckets[bucket].swap_remove(pos);
            inner.len -= 1;
            return Lookup::Expired;
        }
        let entry = &inner.buckets[bucket][pos];
        Lookup::Hit {
            value: entry.value.clone(),
            deadline: entry.deadline,
        }
    }

    /// Removes the entry for `key` regardless of its deadline.
    pub fn remove(&self, key: &[u8]) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let bucket = inner.bucket_index(key);
        if let Some(pos) = inner.buckets[bucket].iter().position(|e| e.key == key) {
            inner.buckets[bucket].swap_remove(pos);
            inner.len -= 1;
            true
        } else {
            false
        }
    }

    /// Removes the entry for `key` only if its deadline has passed at
    /// `now`. The reaper uses this so a key that was re-set between the
    /// TTL drain and this call is never deleted by mistake.
    pub fn remove_expired(&self, key: &[u8], now: Instant) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let bucket = inner.bucket_index(key);
        if let Some(pos) = inner.buckets[bucket]
            .iter()
            .position(|e| e.key == key && e.is_expired_at(now))
        {
            inner.buckets[bucket].swap_remove(pos);
            inner.len -= 1;
            true
        } else {
            false
        }
    }

    /// Installs or replaces the deadline on an existing live entry.
    /// Returns `false` if the key is absent or already past its deadline.
    pub fn set_deadline(&self, key: &[u8], deadline: Instant) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let bucket = inner.bucket_index(key);
        if let Some(entry) = inner.buckets[bucket]
            .iter_mut()
            .find(|e| e.key == key)
            .filter(|e| !e.is_expired_at(now))
        {
            entry.deadline = Some(deadline);
            true
        } else {
            false
        }
    }

    /// Fetches the sorted set under `key` for a mutating command,
    /// installing a fresh one when the key is missing or expired.
    pub fn zset_for_update(&self, key: &Bytes) -> ZsetSlot {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let bucket = inner.bucket_index(key);
        if let Some(entry) = inner.buckets[bucket]
            .iter()
            .find(|e| e.key == *key)
            .filter(|e| !e.is_expired_at(now))
        {
            return match &entry.value {
                Value::Zset(zset) => ZsetSlot::Existing(Arc::clone(zset)),
                _ => ZsetSlot::WrongKind,
            };
        }
        let zset = Arc::new(SortedSet::new());
        inner.upsert(key.clone(), Value::Zset(Arc::clone(&zset)), None);
        ZsetSlot::Created(zset)
    }

    /// Count of entries, including expired ones not yet reaped.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        for bucket in &mut inner.buckets {
            bucket.clear();
        }
        inner.len = 0;
    }
}

impl TableInner {
    fn bucket_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        // Bucket count is a power of two, so masking is the modulo.
        (hasher.finish() as usize) & (self.buckets.len() - 1)
    }

    /// Replaces the entry for `key` or appends a new one, growing the
    /// bucket array when the load factor passes 0.75.
    fn upsert(&mut self, key: Bytes, value: Value, deadline: Option<Instant>) {
        let bucket = self.bucket_index(&key);
        if let Some(entry) = self.buckets[bucket].iter_mut().find(|e| e.key == key) {
            entry.value = value;
            entry.deadline = deadline;
            return;
        }
        self.buckets[bucket].push(Entry {
            key,
            value,
            deadline,
        });
        self.len += 1;
        if self.len * 4 > self.buckets.len() * 3 {
            self.grow();
        }
    }

    /// Doubles the bucket array and re-slots every entry. Lossless:
    /// expired entries move across too and stay visible to the reaper.
    fn grow(&mut self) {
        let new_count = self.buckets.len() * 2;
        let old = std::mem::replace(
            &mut self.buckets,
            (0..new_count).map(|_| Vec::new()).collect(),
        );
        for entry in old.into_iter().flatten() {
            let bucket = self.bucket_index(&entry.key);
            self.buckets[bucket].push(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn key(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    fn string(s: &str) -> Value {
        Value::Str(Bytes::copy_from_slice(s.as_bytes()))
    }

    fn expect_str(lookup: Lookup) -> Bytes {
        match lookup {
            Lookup::Hit {
                value: Value::Str(bytes),
                ..
            } => bytes,
            other => panic!("expected a string hit, got {other:?}"),
        }
    }

    #[test]
    fn test_set_and_lookup() {
        let table = Table::new();
        table.set(key("name"), string("quartz"));
        assert_eq!(expect_str(table.lookup(b"name")), key("quartz"));
        assert!(matches!(table.lookup(b"missing"), Lookup::Miss));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_set_replaces_and_clears_deadline() {
        let table = Table::new();
        table.set_with_deadline(
            key("k"),
            string("v1"),
            Instant::now() + Duration::from_secs(100),
        );
        table.set(key("k"), string("v2"));

        match table.lookup(b"k") {
            Lookup::Hit { deadline, .. } => assert!(deadline.is_none()),
            other => panic!("expected a hit, got {other:?}"),
        }
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_set_if_absent() {
        let table = Table::new();
        assert!(table.set_if_absent(key("k"), string("first")));
        assert!(!table.set_if_absent(key("k"), string("second")));
        assert_eq!(expect_str(table.lookup(b"k")), key("first"));
    }

    #[test]
    fn test_set_if_absent_replaces_expired() {
        let table = Table::new();
        table.set_with_deadline(key("k"), string("old"), Instant::now());
        std::thread::sleep(Duration::from_millis(5));
        assert!(table.set_if_absent(key("k"), string("new")));
        assert_eq!(expect_str(table.lookup(b"k")), key("new"));
    }

    #[test]
    fn test_expired_lookup_removes_entry() {
        let table = Table::new();
        table.set_with_deadline(key("k"), string("v"), Instant::now());
        std::thread::sleep(Duration::from_millis(5));

        assert!(matches!(table.lookup(b"k"), Lookup::Expired));
        // Second lookup: the entry is already gone.
        assert!(matches!(table.lookup(b"k"), Lookup::Miss));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_remove() {
        let table = Table::new();
        table.set(key("k"), string("v"));
        assert!(table.remove(b"k"));
        assert!(!table.remove(b"k"));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_remove_expired_spares_fresh_entries() {
        let table = Table::new();
        let now = Instant::now();

        table.set(key("fresh"), string("v"));
        assert!(!table.remove_expired(b"fresh", now + Duration::from_secs(5)));

        table.set_with_deadline(key("stale"), string("v"), now);
        assert!(table.remove_expired(b"stale", now + Duration::from_secs(5)));
        assert!(matches!(table.lookup(b"stale"), Lookup::Miss));
    }

    #[test]
    fn test_set_deadline() {
        let table = Table::new();
        assert!(!table.set_deadline(b"missing", Instant::now() + Duration::from_secs(1)));

        table.set(key("k"), string("v"));
        assert!(table.set_deadline(b"k", Instant::now() + Duration::from_secs(100)));
        match table.lookup(b"k") {
            Lookup::Hit { deadline, .. } => assert!(deadline.is_some()),
            other => panic!("expected a hit, got {other:?}"),
        }
    }

    #[test]
    fn test_zset_for_update() {
        let table = Table::new();

        let ZsetSlot::Created(zset) = table.zset_for_update(&key("board")) else {
            panic!("expected a fresh sorted set");
        };
        zset.add(key("alice"), 5.0);

        // Second fetch hands back the same instance.
        let ZsetSlot::Existing(again) = table.zset_for_update(&key("board")) else {
            panic!("expected the existing sorted set");
        };
        assert_eq!(again.score_of(b"alice"), Some(5.0));

        table.set(key("plain"), string("v"));
        assert!(matches!(
            table.zset_for_update(&key("plain")),
            ZsetSlot::WrongKind
        ));
    }

    #[test]
    fn test_rehash_is_lossless() {
        let table = Table::new();
        let deadline = Instant::now() + Duration::from_secs(3600);

        // Far beyond the initial 16 buckets: forces several doublings.
        for i in 0..1000 {
            if i % 3 == 0 {
                table.set_with_deadline(key(&format!("key{i}")), string(&format!("v{i}")), deadline);
            } else {
                table.set(key(&format!("key{i}")), string(&format!("v{i}")));
            }
        }

        assert_eq!(table.len(), 1000);
        for i in 0..1000 {
            match table.lookup(format!("key{i}").as_bytes()) {
                Lookup::Hit {
                    value: Value::Str(bytes),
                    deadline: entry_deadline,
                } => {
                    assert_eq!(bytes, key(&format!("v{i}")));
                    assert_eq!(entry_deadline.is_some(), i % 3 == 0);
                }
                other => panic!("key{i} lost in rehash: {other:?}"),
            }
        }
    }

    #[test]
    fn test_clear() {
        let table = Table::new();
        table.set(key("a"), string("1"));
        table.set(key("b"), string("2"));
        table.clear();
        assert!(table.is_empty());
        assert!(matches!(table.lookup(b"a"), Lookup::Miss));
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let table = Arc::new(Table::new());
        let mut handles = vec![];

        for t in 0..8 {
            let table = Arc::clone(&table);
            handles.push(thread::spawn(move || {
                for i in 0..500 {
                    let k = key(&format!("key-{t}-{i}"));
                    table.set(k.clone(), string("value"));
                    assert!(!matches!(table.lookup(&k), Lookup::Miss));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(table.len(), 4000);
    }
}

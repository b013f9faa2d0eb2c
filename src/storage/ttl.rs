//! TTL Index
//!
//! A mutable min-priority structure over `(deadline, key)` records. The
//! engine mirrors every key deadline into this index so that the expiry
//! reaper can find the earliest deadline in O(1) and pull all overdue keys
//! in O(k log n), without ever scanning the primary table.
//!
//! ## Design
//!
//! A binary min-heap in a `Vec`, ordered by deadline, plus a `key -> slot`
//! map that is kept in step with every sift. The map is what makes
//! `upsert` and `remove` by key O(log n) instead of O(n): a deadline
//! change re-sifts the record in place, a removal swaps the record with
//! the heap tail and re-sifts the displaced tail.
//!
//! The index holds its own mutex and never calls out while holding it, so
//! it can be used from any thread in any lock order.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

struct TtlRecord {
    deadline: Instant,
    key: Bytes,
}

#[derive(Default)]
struct TtlHeap {
    heap: Vec<TtlRecord>,
    slots: HashMap<Bytes, usize>,
}

/// Min-priority index of key deadlines.
pub struct TtlIndex {
    inner: Mutex<TtlHeap>,
}

impl Default for TtlIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl TtlIndex {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TtlHeap::default()),
        }
    }

    /// Inserts `key` with `deadline`, or replaces the deadline of an
    /// existing record and re-sifts it.
    ///
    /// Returns `true` if `deadline` is now the earliest in the index; the
    /// caller uses this to decide whether the reaper needs a wake-up.
    pub fn upsert(&self, key: Bytes, deadline: Instant) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if let Some(&slot) = inner.slots.get(&key) {
            let old = inner.heap[slot].deadline;
            inner.heap[slot].deadline = deadline;
            if deadline < old {
                inner.sift_up(slot);
            } else {
                inner.sift_down(slot);
            }
        } else {
            let slot = inner.heap.len();
            inner.heap.push(TtlRecord {
                deadline,
                key: key.clone(),
            });
            inner.slots.insert(key, slot);
            inner.sift_up(slot);
        }
        inner.heap[0].deadline == deadline
    }

    /// Deletes the record for `key`, if any.
    ///
    /// Returns `true` if the removed record was the current head, meaning
    /// the earliest deadline has changed.
    pub fn remove(&self, key: &[u8]) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(slot) = inner.slots.remove(key) else {
            return false;
        };
        let was_head = slot == 0;
        let last = inner.heap.len() - 1;
        inner.heap.swap(slot, last);
        inner.heap.pop();
        if slot < inner.heap.len() {
            let displaced = inner.heap[slot].key.clone();
            inner.slots.insert(displaced, slot);
            let settled = inner.sift_up(slot);
            if settled == slot {
                inner.sift_down(slot);
            }
        }
        was_head
    }

    /// The smallest deadline currently stored.
    pub fn peek_earliest(&self) -> Option<Instant> {
        let inner = self.inner.lock().unwrap();
        inner.heap.first().map(|rec| rec.deadline)
    }

    /// Removes and returns every key with `deadline <= now`, in ascending
    /// deadline order.
    pub fn drain_expired(&self, now: Instant) -> Vec<Bytes> {
        let mut inner = self.inner.lock().unwrap();
        let mut expired = Vec::new();
        while inner.heap.first().is_some_and(|rec| rec.deadline <= now) {
            expired.push(inner.pop_head());
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.heap.clear();
        inner.slots.clear();
    }
}

impl TtlHeap {
    /// Removes the heap head. Must only be called on a non-empty heap.
    fn pop_head(&mut self) -> Bytes {
        let last = self.heap.len() - 1;
        self.heap.swap(0, last);
        let record = self.heap.pop().expect("pop_head on empty heap");
        self.slots.remove(&record.key);
        if !self.heap.is_empty() {
            let displaced = self.heap[0].key.clone();
            self.slots.insert(displaced, 0);
            self.sift_down(0);
        }
        record.key
    }

    /// Moves the record at `slot` towards the root until the heap property
    /// holds. Returns its final slot.
    fn sift_up(&mut self, mut slot: usize) -> usize {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if self.heap[slot].deadline < self.heap[parent].deadline {
                self.swap_records(slot, parent);
                slot = parent;
            } else {
                break;
            }
        }
        slot
    }

    /// Moves the record at `slot` towards the leaves until the heap
    /// property holds.
    fn sift_down(&mut self, mut slot: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * slot + 1;
            let right = 2 * slot + 2;
            let mut smallest = slot;
            if left < len && self.heap[left].deadline < self.heap[smallest].deadline {
                smallest = left;
            }
            if right < len && self.heap[right].deadline < self.heap[smallest].deadline {
                smallest = right;
            }
            if smallest == slot {
                break;
            }
            self.swap_records(slot, smallest);
            slot = smallest;
        }
    }

    fn swap_records(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        let key_a = self.heap[a].key.clone();
        let key_b = self.heap[b].key.clone();
        self.slots.insert(key_a, a);
        self.slots.insert(key_b, b);
    }
}

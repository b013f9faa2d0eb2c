//! Sorted Set
//!
//! A per-key collection of unique members, each carrying a floating-point
//! score. Two structures share one logical set:
//!
//! - a `member -> score` map for O(1) score lookup and membership tests;
//! - an ordered index over `(score, member)` for rank and range queries.
//!
//! Members with equal scores are disambiguated by the member bytes, so
//! enumeration order is always ascending by score and then lexicographic
//! by member. Both structures live under one mutex; every operation keeps
//! them carrying exactly the same pairs.

use crate::storage::avl::AvlTree;
use bytes::Bytes;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;

/// Ordering key of the ordered index: score first, member as tiebreaker.
///
/// Scores are compared with `f64::total_cmp`, which gives a total order
/// (the command layer rejects NaN before it ever gets here).
#[derive(Debug, Clone)]
struct ScoreKey {
    score: f64,
    member: Bytes,
}

impl PartialEq for ScoreKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoreKey {}

impl PartialOrd for ScoreKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoreKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.member.cmp(&other.member))
    }
}

struct ZsetInner {
    /// Direct index: member -> score.
    scores: HashMap<Bytes, f64>,
    /// Ordered index over (score, member).
    ordered: AvlTree<ScoreKey, ()>,
}

/// An ordered set of `(member, score)` pairs with unique members.
pub struct SortedSet {
    inner: Mutex<ZsetInner>,
}

impl Default for SortedSet {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SortedSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SortedSet").field("len", &self.len()).finish()
    }
}

impl SortedSet {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ZsetInner {
                scores: HashMap::new(),
                ordered: AvlTree::new(),
            }),
        }
    }

    /// Inserts `member` with `score`, or updates its score.
    ///
    /// Returns `true` iff the member was newly inserted or its score
    /// changed. A same-score re-add does no work. On a score change the
    /// old `(score, member)` pair leaves the ordered index before the new
    /// one enters, so both structures always hold the same cardinality.
    pub fn add(&self, member: Bytes, score: f64) -> bool {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        match inner.scores.get(&member).copied() {
            Some(old) if old.total_cmp(&score) == Ordering::Equal => false,
            Some(old) => {
                inner.ordered.remove(&ScoreKey {
                    score: old,
                    member: member.clone(),
                });
                inner.ordered.insert(
                    ScoreKey {
                        score,
                        member: member.clone(),
                    },
                    (),
                );
                inner.scores.insert(member, score);
                true
            }
            None => {
                inner.ordered.insert(
                    ScoreKey {
                        score,
                        member: member.clone(),
                    },
                    (),
                );
                inner.scores.insert(member, score);
                true
            }
        }
    }

    /// Removes `member`. Returns whether it was present.
    pub fn remove(&self, member: &[u8]) -> bool {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        if let Some((member, score)) = inner.scores.remove_entry(member) {
            inner.ordered.remove(&ScoreKey { score, member });
            true
        } else {
            false
        }
    }

    /// The score of `member`, if present.
    pub fn score_of(&self, member: &[u8]) -> Option<f64> {
        self.inner.lock().unwrap().scores.get(member).copied()
    }

    /// All pairs with `min <= score <= max`, ascending by score then
    /// member.
    pub fn range_by_score(&self, min: f64, max: f64) -> Vec<(Bytes, f64)> {
        let guard = self.inner.lock().unwrap();
        guard
            .ordered
            .range_where(|key| {
                if key.score < min {
                    Ordering::Less
                } else if key.score > max {
                    Ordering::Greater
                } else {
                    Ordering::Equal
                }
            })
            .into_iter()
            .map(|(key, ())| (key.member, key.score))
            .collect()
    }

    /// Pairs with rank in the inclusive window `[start, stop]` (0-based,
    /// already resolved to non-negative form by the caller). `start` past
    /// the end yields nothing; `stop` is clamped to the last rank.
    pub fn range_by_rank(&self, start: usize, stop: usize) -> Vec<(Bytes, f64)> {
        let guard = self.inner.lock().unwrap();
        let len = guard.ordered.len();
        if len == 0 || start >= len || start > stop {
            return Vec::new();
        }
        guard
            .ordered
            .range_by_rank(start, stop.min(len - 1))
            .into_iter()
            .map(|(key, ())| (key.member, key.score))
            .collect()
    }

    /// 0-based position of `member` in ascending score order.
    pub fn rank_of(&self, member: &[u8]) -> Option<usize> {
        let guard = self.inner.lock().unwrap();
        let score = guard.scores.get(member).copied()?;
        guard.ordered.rank(&ScoreKey {
            score,
            member: Bytes::copy_from_slice(member),
        })
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.scores.clear();
        guard.ordered.clear();
    }
}

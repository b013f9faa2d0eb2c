//! Size-Augmented AVL Tree
//!
//! An ordered associative container used as the sorted backbone of the
//! sorted-set type. Every node carries its subtree size in addition to its
//! height, which buys two things a plain balanced tree does not have:
//!
//! 1. `rank` answers "how many keys sort before this one?" in O(log n)
//!    by summing left-subtree sizes along the search path.
//! 2. `range_by_rank` descends by size to the first requested rank and
//!    collects k keys in O(log n + k) instead of materialising the whole
//!    inorder sequence.
//!
//! The tree is single-threaded on purpose; the owning structure wraps it in
//! its own lock.

use std::cmp::Ordering;

type Link<K, V> = Option<Box<Node<K, V>>>;

struct Node<K, V> {
    key: K,
    value: V,
    height: u8,
    /// Number of nodes in the subtree rooted here, including this node.
    count: usize,
    left: Link<K, V>,
    right: Link<K, V>,
}

impl<K, V> Node<K, V> {
    fn new(key: K, value: V) -> Box<Self> {
        Box::new(Self {
            key,
            value,
            height: 1,
            count: 1,
            left: None,
            right: None,
        })
    }

    /// Recomputes height and subtree size from the children.
    fn refresh(&mut self) {
        self.height = 1 + height(&self.left).max(height(&self.right));
        self.count = 1 + count(&self.left) + count(&self.right);
    }

    fn balance_factor(&self) -> i16 {
        height(&self.left) as i16 - height(&self.right) as i16
    }
}

fn height<K, V>(link: &Link<K, V>) -> u8 {
    link.as_ref().map_or(0, |n| n.height)
}

fn count<K, V>(link: &Link<K, V>) -> usize {
    link.as_ref().map_or(0, |n| n.count)
}

/// A self-balancing binary search tree with subtree-size augmentation.
pub struct AvlTree<K, V> {
    root: Link<K, V>,
}

impl<K: Ord, V> Default for AvlTree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> AvlTree<K, V> {
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Number of keys in the tree.
    pub fn len(&self) -> usize {
        count(&self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn clear(&mut self) {
        self.root = None;
    }

    /// Inserts `key`, replacing the value if the key is already present.
    ///
    /// Returns `true` if the key was newly inserted.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        let mut inserted = false;
        self.root = Self::insert_node(self.root.take(), key, value, &mut inserted);
        inserted
    }

    /// Removes `key`. Returns `true` if it was present.
    pub fn remove(&mut self, key: &K) -> bool {
        let mut removed = false;
        self.root = Self::remove_node(self.root.take(), key, &mut removed);
        removed
    }

    /// Point lookup.
    pub fn get(&self, key: &K) -> Option<&V> {
        let mut cur = &self.root;
        while let Some(node) = cur {
            match key.cmp(&node.key) {
                Ordering::Less => cur = &node.left,
                Ordering::Greater => cur = &node.right,
                Ordering::Equal => return Some(&node.value),
            }
        }
        None
    }

    /// 0-based position of `key` in the sorted order, or `None` if absent.
    pub fn rank(&self, key: &K) -> Option<usize> {
        let mut cur = &self.root;
        let mut before = 0;
        while let Some(node) = cur {
            match key.cmp(&node.key) {
                Ordering::Less => cur = &node.left,
                Ordering::Greater => {
                    before += count(&node.left) + 1;
                    cur = &node.right;
                }
                Ordering::Equal => return Some(before + count(&node.left)),
            }
        }
        None
    }

    /// Keys with rank in the inclusive window `[start, stop]`, in sorted
    /// order. Out-of-range ends are simply not produced.
    pub fn range_by_rank(&self, start: usize, stop: usize) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        let mut out = Vec::new();
        if start <= stop {
            Self::collect_ranks(&self.root, start, stop, 0, &mut out);
        }
        out
    }

    /// Keys inside a caller-defined contiguous window, in sorted order.
    ///
    /// `window` classifies a key as `Less` (below the window), `Equal`
    /// (inside) or `Greater` (above). Subtrees entirely outside the window
    /// are pruned, so the cost is O(log n + k).
    pub fn range_where<F>(&self, window: F) -> Vec<(K, V)>
    where
        F: Fn(&K) -> Ordering + Copy,
        K: Clone,
        V: Clone,
    {
        let mut out = Vec::new();
        Self::collect_window(&self.root, window, &mut out);
        out
    }

    /// Visits every pair in ascending key order.
    pub fn for_each<F: FnMut(&K, &V)>(&self, mut visit: F) {
        Self::visit_inorder(&self.root, &mut visit);
    }

    fn insert_node(link: Link<K, V>, key: K, value: V, inserted: &mut bool) -> Link<K, V> {
        let Some(mut node) = link else {
            *inserted = true;
            return Some(Node::new(key, value));
        };
        match key.cmp(&node.key) {
            Ordering::Less => node.left = Self::insert_node(node.left.take(), key, value, inserted),
            Ordering::Greater => {
                node.right = Self::insert_node(node.right.take(), key, value, inserted)
            }
            Ordering::Equal => {
                node.value = value;
                return Some(node);
            }
        }
        Some(Self::rebalance(node))
    }

    fn remove_node(link: Link<K, V>, key: &K, removed: &mut bool) -> Link<K, V> {
        let mut node = link?;
        match key.cmp(&node.key) {
            Ordering::Less => node.left = Self::remove_node(node.left.take(), key, removed),
            Ordering::Greater => node.right = Self::remove_node(node.right.take(), key, removed),
            Ordering::Equal => {
                *removed = true;
                match (node.left.take(), node.right.take()) {
                    (None, None) => return None,
                    (Some(only), None) | (None, Some(only)) => return Some(only),
                    (Some(left), Some(right)) => {
                        // Replace with the inorder successor from the right
                        // subtree, then rebalance on the way back up.
                        let (succ_key, succ_value, rest) = Self::detach_min(right);
                        node.key = succ_key;
                        node.value = succ_value;
                        node.left = Some(left);
                        node.right = rest;
                    }
                }
            }
        }
        Some(Self::rebalance(node))
    }

    /// Removes the minimum node of a non-empty subtree, returning its pair
    /// and the rebalanced remainder.
    fn detach_min(mut node: Box<Node<K, V>>) -> (K, V, Link<K, V>) {
        match node.left.take() {
            None => {
                let right = node.right.take();
                let Node { key, value, .. } = *node;
                (key, value, right)
            }
            Some(left) => {
                let (key, value, rest) = Self::detach_min(left);
                node.left = rest;
                (key, value, Some(Self::rebalance(node)))
            }
        }
    }

    fn rebalance(mut node: Box<Node<K, V>>) -> Box<Node<K, V>> {
        node.refresh();
        let bf = node.balance_factor();
        if bf > 1 {
            if node.left.as_ref().is_some_and(|l| l.balance_factor() < 0) {
                node.left = node.left.take().map(Self::rotate_left);
            }
            return Self::rotate_right(node);
        }
        if bf < -1 {
            if node.right.as_ref().is_some_and(|r| r.balance_factor() > 0) {
                node.right = node.right.take().map(Self::rotate_right);
            }
            return Self::rotate_left(node);
        }
        node
    }

    fn rotate_right(mut node: Box<Node<K, V>>) -> Box<Node<K, V>> {
        let mut pivot = node.left.take().expect("right rotation requires a left child");
        node.left = pivot.right.take();
        node.refresh();
        pivot.right = Some(node);
        pivot.refresh();
        pivot
    }

    fn rotate_left(mut node: Box<Node<K, V>>) -> Box<Node<K, V>> {
        let mut pivot = node.right.take().expect("left rotation requires a right child");
        node.right = pivot.left.take();
        node.refresh();
        pivot.left = Some(node);
        pivot.refresh();
        pivot
    }

    fn collect_ranks(
        link: &Link<K, V>,
        start: usize,
        stop: usize,
        offset: usize,
        out: &mut Vec<(K, V)>,
    ) where
        K: Clone,
        V: Clone,
    {
        let Some(node) = link else { return };
        let my_rank = offset + count(&node.left);
        if start < my_rank {
            Self::collect_ranks(&node.left, start, stop, offset, out);
        }
        if start <= my_rank && my_rank <= stop {
            out.push((node.key.clone(), node.value.clone()));
        }
        if stop > my_rank {
            Self::collect_ranks(&node.right, start, stop, my_rank + 1, out);
        }
    }

    fn collect_window<F>(link: &Link<K, V>, window: F, out: &mut Vec<(K, V)>)
    where
        F: Fn(&K) -> Ordering + Copy,
        K: Clone,
        V: Clone,
    {
        let Some(node) = link else { return };
        let side = window(&node.key);
        if side != Ordering::Less {
            Self::collect_window(&node.left, window, out);
        }
        if side == Ordering::Equal {
            out.push((node.key.clone(), node.value.clone()));
        }
        if side != Ordering::Greater {
            Self::collect_window(&node.right, window, out);
        }
    }

    fn visit_inorder<F: FnMut(&K, &V)>(link: &Link<K, V>, visit: &mut F) {
        if let Some(node) = link {
            Self::visit_inorder(&node.left, visit);
            visit(&node.key, &node.value);
            Self::visit_inorder(&node.right, visit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Checks the AVL balance bound and the size augmentation for every
    /// node, returning the subtree height.
    fn check<K: Ord, V>(link: &Link<K, V>) -> u8 {
        let Some(node) = link else { return 0 };
        let lh = check(&node.left);
        let rh = check(&node.right);
        assert_eq!(node.height, 1 + lh.max(rh), "stale height");
        assert_eq!(
            node.count,
            1 + count(&node.left) + count(&node.right),
            "stale subtree size"
        );
        assert!((lh as i16 - rh as i16).abs() <= 1, "unbalanced node");
        if let Some(left) = &node.left {
            assert!(left.key < node.key);
        }
        if let Some(right) = &node.right {
            assert!(right.key > node.key);
        }
        node.height
    }

    fn keys_of(tree: &AvlTree<i32, i32>) -> Vec<i32> {
        let mut keys = Vec::new();
        tree.for_each(|k, _| keys.push(*k));
        keys
    }

    #[test]
    fn test_insert_and_get() {
        let mut tree = AvlTree::new();
        assert!(tree.insert(5, 50));
        assert!(tree.insert(3, 30));
        assert!(tree.insert(8, 80));

        assert_eq!(tree.get(&5), Some(&50));
        assert_eq!(tree.get(&3), Some(&30));
        assert_eq!(tree.get(&9), None);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_insert_existing_replaces_value() {
        let mut tree = AvlTree::new();
        assert!(tree.insert(1, 10));
        assert!(!tree.insert(1, 11));
        assert_eq!(tree.get(&1), Some(&11));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_sequential_insert_stays_balanced() {
        let mut tree = AvlTree::new();
        for i in 0..1000 {
            tree.insert(i, i * 2);
            check(&tree.root);
        }
        assert_eq!(tree.len(), 1000);
        // Height of a 1000-node AVL tree is at most ~1.44 * log2(1001).
        assert!(height(&tree.root) <= 14);
        assert_eq!(keys_of(&tree), (0..1000).collect::<Vec<_>>());
    }

    #[test]
    fn test_remove_all_cases() {
        let mut tree = AvlTree::new();
        for k in [50, 25, 75, 10, 30, 60, 90, 5, 28, 65] {
            tree.insert(k, k);
        }

        assert!(tree.remove(&5)); // leaf
        assert!(tree.remove(&10)); // single child
        assert!(tree.remove(&50)); // two children (root)
        assert!(!tree.remove(&50)); // already gone
        check(&tree.root);

        assert_eq!(tree.len(), 7);
        assert_eq!(keys_of(&tree), vec![25, 28, 30, 60, 65, 75, 90]);
    }

    #[test]
    fn test_remove_interleaved_keeps_invariants() {
        let mut tree = AvlTree::new();
        for i in 0..500 {
            tree.insert((i * 37) % 500, i);
        }
        // 91 is coprime to 250, so this visits each key in 0..250 once.
        for i in 0..250 {
            assert!(tree.remove(&((i * 91) % 250)));
            check(&tree.root);
        }
        assert_eq!(tree.len(), 250);
    }

    #[test]
    fn test_rank() {
        let mut tree = AvlTree::new();
        for k in [40, 10, 20, 50, 30] {
            tree.insert(k, ());
        }

        assert_eq!(tree.rank(&10), Some(0));
        assert_eq!(tree.rank(&20), Some(1));
        assert_eq!(tree.rank(&30), Some(2));
        assert_eq!(tree.rank(&40), Some(3));
        assert_eq!(tree.rank(&50), Some(4));
        assert_eq!(tree.rank(&35), None);
    }

    #[test]
    fn test_range_by_rank() {
        let mut tree = AvlTree::new();
        for k in 0..10 {
            tree.insert(k, k);
        }

        let mid: Vec<i32> = tree.range_by_rank(3, 6).into_iter().map(|(k, _)| k).collect();
        assert_eq!(mid, vec![3, 4, 5, 6]);

        let all: Vec<i32> = tree.range_by_rank(0, 9).into_iter().map(|(k, _)| k).collect();
        assert_eq!(all, (0..10).collect::<Vec<_>>());

        // Stop past the end is not an error.
        let tail: Vec<i32> = tree.range_by_rank(8, 100).into_iter().map(|(k, _)| k).collect();
        assert_eq!(tail, vec![8, 9]);

        assert!(tree.range_by_rank(10, 20).is_empty());
        assert!(tree.range_by_rank(6, 3).is_empty());
    }

    #[test]
    fn test_range_where() {
        let mut tree = AvlTree::new();
        for k in [1, 3, 5, 7, 9, 11] {
            tree.insert(k, ());
        }

        let window = |lo: i32, hi: i32| {
            move |k: &i32| {
                if *k < lo {
                    Ordering::Less
                } else if *k > hi {
                    Ordering::Greater
                } else {
                    Ordering::Equal
                }
            }
        };

        let mid: Vec<i32> = tree.range_where(window(3, 9)).into_iter().map(|(k, _)| k).collect();
        assert_eq!(mid, vec![3, 5, 7, 9]);

        let none: Vec<i32> = tree.range_where(window(12, 20)).into_iter().map(|(k, _)| k).collect();
        assert!(none.is_empty());

        // Inclusive on both ends, even between stored keys.
        let some: Vec<i32> = tree.range_where(window(4, 8)).into_iter().map(|(k, _)| k).collect();
        assert_eq!(some, vec![5, 7]);
    }

    #[test]
    fn test_clear() {
        let mut tree = AvlTree::new();
        tree.insert(1, 1);
        tree.insert(2, 2);
        tree.clear();
        assert!(tree.is_empty());
        assert_eq!(tree.get(&1), None);
    }
}

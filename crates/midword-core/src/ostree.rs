//! Order-statistics treap augmented with subtree size and value sum.
//!
//! Queries take a monotone predicate `before(key)` which is true for every key
//! sorting before some probe and false afterwards. That lets callers ask for
//! "entries before (key, id)" and "entries with a smaller prefix" with the same
//! walk.

type Link<K> = Option<Box<Node<K>>>;

#[derive(Debug, Clone)]
struct Node<K> {
    key: K,
    value: f64,
    priority: u64,
    size: usize,
    sum: f64,
    left: Link<K>,
    right: Link<K>,
}

impl<K> Node<K> {
    fn new(key: K, value: f64, priority: u64) -> Self {
        Self {
            key,
            value,
            priority,
            size: 1,
            sum: value,
            left: None,
            right: None,
        }
    }

    #[inline]
    fn update(&mut self) {
        self.size = 1 + size(&self.left) + size(&self.right);
        self.sum = self.value + sum(&self.left) + sum(&self.right);
    }
}

#[inline]
fn size<K>(link: &Link<K>) -> usize {
    link.as_ref().map_or(0, |n| n.size)
}

#[inline]
fn sum<K>(link: &Link<K>) -> f64 {
    link.as_ref().map_or(0.0, |n| n.sum)
}

/// Splits into (keys where `before` holds, the rest).
fn split<K, F: Fn(&K) -> bool>(link: Link<K>, before: &F) -> (Link<K>, Link<K>) {
    match link {
        None => (None, None),
        Some(mut node) => {
            if before(&node.key) {
                let (l, r) = split(node.right.take(), before);
                node.right = l;
                node.update();
                (Some(node), r)
            } else {
                let (l, r) = split(node.left.take(), before);
                node.left = r;
                node.update();
                (l, Some(node))
            }
        }
    }
}

/// Every key of `a` must sort before every key of `b`.
fn merge<K>(a: Link<K>, b: Link<K>) -> Link<K> {
    match (a, b) {
        (None, b) => b,
        (a, None) => a,
        (Some(mut a), Some(mut b)) => {
            if a.priority > b.priority {
                a.right = merge(a.right.take(), Some(b));
                a.update();
                Some(a)
            } else {
                b.left = merge(Some(a), b.left.take());
                b.update();
                Some(b)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderStatTree<K> {
    root: Link<K>,
    rng: fastrand::Rng,
}

impl<K: Ord> Default for OrderStatTree<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord> OrderStatTree<K> {
    pub fn new() -> Self {
        Self {
            root: None,
            rng: fastrand::Rng::new(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            root: None,
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    pub fn len(&self) -> usize {
        size(&self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn total(&self) -> f64 {
        sum(&self.root)
    }

    /// Inserts `key`. Returns false (and leaves the tree alone) if it exists.
    pub fn insert(&mut self, key: K, value: f64) -> bool {
        if self.contains(&key) {
            return false;
        }
        let priority = self.rng.u64(..);
        let (l, r) = split(self.root.take(), &|k: &K| *k < key);
        let node = Some(Box::new(Node::new(key, value, priority)));
        self.root = merge(merge(l, node), r);
        true
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &K) -> Option<f64> {
        let (l, rest) = split(self.root.take(), &|k: &K| k < key);
        let (mid, r) = split(rest, &|k: &K| k <= key);
        let removed = mid.map(|n| n.value);
        self.root = merge(l, r);
        removed
    }

    pub fn contains(&self, key: &K) -> bool {
        let mut cursor = &self.root;
        while let Some(node) = cursor {
            match key.cmp(&node.key) {
                std::cmp::Ordering::Less => cursor = &node.left,
                std::cmp::Ordering::Greater => cursor = &node.right,
                std::cmp::Ordering::Equal => return true,
            }
        }
        false
    }

    /// Number of keys for which `before` holds.
    pub fn count_before<F: Fn(&K) -> bool>(&self, before: F) -> usize {
        let mut acc = 0;
        let mut cursor = &self.root;
        while let Some(node) = cursor {
            if before(&node.key) {
                acc += size(&node.left) + 1;
                cursor = &node.right;
            } else {
                cursor = &node.left;
            }
        }
        acc
    }

    /// Sum of values for which `before` holds.
    pub fn sum_before<F: Fn(&K) -> bool>(&self, before: F) -> f64 {
        let mut acc = 0.0;
        let mut cursor = &self.root;
        while let Some(node) = cursor {
            if before(&node.key) {
                acc += sum(&node.left) + node.value;
                cursor = &node.right;
            } else {
                cursor = &node.left;
            }
        }
        acc
    }

    /// In-order iterator starting at the first key where `before` is false.
    pub fn iter_from<F: Fn(&K) -> bool>(&self, before: F) -> Iter<'_, K> {
        let mut stack = Vec::new();
        let mut cursor = &self.root;
        while let Some(node) = cursor {
            if before(&node.key) {
                cursor = &node.right;
            } else {
                stack.push(node.as_ref());
                cursor = &node.left;
            }
        }
        Iter { stack }
    }

    pub fn iter(&self) -> Iter<'_, K> {
        self.iter_from(|_| false)
    }
}

pub struct Iter<'a, K> {
    stack: Vec<&'a Node<K>>,
}

impl<'a, K> Iterator for Iter<'a, K> {
    type Item = (&'a K, f64);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        let mut cursor = &node.right;
        while let Some(n) = cursor {
            self.stack.push(n.as_ref());
            cursor = &n.left;
        }
        Some((&node.key, node.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_insert_remove_counts() {
        let mut t = OrderStatTree::with_seed(7);
        for k in [5, 1, 9, 3, 7] {
            assert!(t.insert(k, k as f64));
        }
        assert!(!t.insert(3, 100.0), "duplicate accepted");
        assert_eq!(t.len(), 5);
        assert_eq!(t.total(), 25.0);
        assert_eq!(t.count_before(|k| *k < 7), 3);
        assert_eq!(t.sum_before(|k| *k < 7), 9.0);

        assert_eq!(t.remove(&5), Some(5.0));
        assert_eq!(t.remove(&5), None);
        assert_eq!(t.count_before(|k| *k < 7), 2);
        assert_eq!(t.iter().map(|(k, _)| *k).collect::<Vec<_>>(), vec![1, 3, 7, 9]);
    }

    #[test]
    fn test_iter_from() {
        let mut t = OrderStatTree::with_seed(1);
        for k in 0..20 {
            t.insert(k, 1.0);
        }
        let got: Vec<i32> = t.iter_from(|k| *k < 15).map(|(k, _)| *k).collect();
        assert_eq!(got, vec![15, 16, 17, 18, 19]);
    }

    proptest! {
        #[test]
        fn prop_matches_sorted_map(
            ops in proptest::collection::vec((any::<bool>(), 0i32..200), 1..400),
            probe in 0i32..200,
        ) {
            let mut t = OrderStatTree::with_seed(42);
            let mut model = BTreeMap::new();
            for (insert, k) in ops {
                if insert {
                    t.insert(k, k as f64);
                    model.insert(k, k as f64);
                } else {
                    t.remove(&k);
                    model.remove(&k);
                }
            }
            let expected_count = model.range(..probe).count();
            let expected_sum: f64 = model.range(..probe).map(|(_, v)| v).sum();
            prop_assert_eq!(t.len(), model.len());
            prop_assert_eq!(t.count_before(|k| *k < probe), expected_count);
            prop_assert!((t.sum_before(|k| *k < probe) - expected_sum).abs() < 1e-6);
        }
    }
}

//! Interval tree over the x extent of each box
//!
//! A centred interval tree: every node stores the intervals that contain its
//! centre, intervals entirely below go left, entirely above go right. The
//! tree is rebuilt lazily on the first query after a mutation, which suits
//! the collision space's pattern of batched updates followed by queries.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use super::{canonical, finish_pairs, BroadPhaseAlgorithm, BroadPhaseIndex, KeyPair, Proxy};
use crate::collision::{Aabb, PrimitiveKey};

#[derive(Debug)]
struct Node {
    center: f32,
    /// Intervals containing `center`, ascending by lower bound
    by_min: Vec<Proxy>,
    /// The same intervals, descending by upper bound
    by_max: Vec<Proxy>,
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
}

impl Node {
    fn build(mut proxies: Vec<Proxy>) -> Option<Box<Node>> {
        if proxies.is_empty() {
            return None;
        }

        // Median of the midpoints; the interval owning it always stays here
        proxies.sort_unstable_by(|a, b| midpoint(a).total_cmp(&midpoint(b)));
        let center = midpoint(&proxies[proxies.len() / 2]);

        let mut left = Vec::new();
        let mut right = Vec::new();
        let mut here = Vec::new();
        for proxy in proxies {
            if proxy.aabb.max.x < center {
                left.push(proxy);
            } else if proxy.aabb.min.x > center {
                right.push(proxy);
            } else {
                here.push(proxy);
            }
        }

        let mut by_min = here.clone();
        by_min.sort_unstable_by(|a, b| a.aabb.min.x.total_cmp(&b.aabb.min.x));
        let mut by_max = here;
        by_max.sort_unstable_by(|a, b| b.aabb.max.x.total_cmp(&a.aabb.max.x));

        Some(Box::new(Node {
            center,
            by_min,
            by_max,
            left: Self::build(left),
            right: Self::build(right),
        }))
    }

    /// Push every stored proxy whose x interval overlaps `[lo, hi]`
    fn collect(&self, lo: f32, hi: f32, out: &mut Vec<Proxy>) {
        if hi < self.center {
            out.extend(self.by_min.iter().take_while(|p| p.aabb.min.x <= hi));
            if let Some(left) = &self.left {
                left.collect(lo, hi, out);
            }
        } else if lo > self.center {
            out.extend(self.by_max.iter().take_while(|p| p.aabb.max.x >= lo));
            if let Some(right) = &self.right {
                right.collect(lo, hi, out);
            }
        } else {
            out.extend(self.by_min.iter());
            if let Some(left) = &self.left {
                left.collect(lo, hi, out);
            }
            if let Some(right) = &self.right {
                right.collect(lo, hi, out);
            }
        }
    }

    fn depth(&self) -> usize {
        let left = self.left.as_ref().map_or(0, |n| n.depth());
        let right = self.right.as_ref().map_or(0, |n| n.depth());
        1 + left.max(right)
    }
}

fn midpoint(proxy: &Proxy) -> f32 {
    (proxy.aabb.min.x + proxy.aabb.max.x) * 0.5
}

/// Index backed by a lazily rebuilt interval tree
#[derive(Debug, Default)]
pub struct IntervalTreeIndex {
    items: BTreeMap<PrimitiveKey, Aabb>,
    tree: RefCell<Option<Box<Node>>>,
    dirty: Cell<bool>,
}

impl IntervalTreeIndex {
    /// Creates an empty index
    pub fn new() -> Self {
        Self::default()
    }

    fn invalidate(&mut self) {
        self.dirty.set(true);
    }

    fn with_tree<R>(&self, f: impl FnOnce(Option<&Node>) -> R) -> R {
        if self.dirty.replace(false) {
            let proxies = self.members();
            *self.tree.borrow_mut() = Node::build(proxies);
        }
        f(self.tree.borrow().as_deref())
    }

    fn candidates(&self, aabb: &Aabb) -> Vec<Proxy> {
        self.with_tree(|tree| {
            let mut out = Vec::new();
            if let Some(root) = tree {
                root.collect(aabb.min.x, aabb.max.x, &mut out);
            }
            out
        })
    }

    /// Height of the current tree, rebuilding it first if needed
    pub fn depth(&self) -> usize {
        self.with_tree(|tree| tree.map_or(0, Node::depth))
    }
}

impl BroadPhaseIndex for IntervalTreeIndex {
    fn algorithm(&self) -> BroadPhaseAlgorithm {
        BroadPhaseAlgorithm::IntervalTree
    }

    fn register(&mut self, proxy: Proxy) {
        self.items.insert(proxy.key, proxy.aabb);
        self.invalidate();
    }

    fn unregister(&mut self, key: PrimitiveKey) -> bool {
        let removed = self.items.remove(&key).is_some();
        if removed {
            self.invalidate();
        }
        removed
    }

    fn update(&mut self, key: PrimitiveKey, aabb: Aabb) -> bool {
        let Some(slot) = self.items.get_mut(&key) else {
            return false;
        };
        *slot = aabb;
        self.invalidate();
        true
    }

    fn members(&self) -> Vec<Proxy> {
        self.items.iter().map(|(&key, &aabb)| Proxy::new(key, aabb)).collect()
    }

    fn contains(&self, key: PrimitiveKey) -> bool {
        self.items.contains_key(&key)
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn clear(&mut self) {
        self.items.clear();
        *self.tree.get_mut() = None;
        self.dirty.set(false);
    }

    fn query_aabb(&self, aabb: &Aabb) -> Vec<PrimitiveKey> {
        let mut out: Vec<PrimitiveKey> = self
            .candidates(aabb)
            .into_iter()
            .filter(|proxy| proxy.aabb.intersects(aabb))
            .map(|proxy| proxy.key)
            .collect();
        out.sort_unstable();
        out
    }

    fn overlapping_pairs(&self) -> Vec<KeyPair> {
        let mut out = Vec::new();
        for (&key, aabb) in &self.items {
            for other in self.candidates(aabb) {
                if other.key != key && other.aabb.intersects(aabb) {
                    out.push(canonical(key, other.key));
                }
            }
        }
        finish_pairs(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadphase::tests::{make_keys, unit_box};
    use crate::foundation::math::Vec3;

    #[test]
    fn test_tree_is_rebuilt_after_mutation() {
        let (_arena, keys) = make_keys(8);
        let mut index = IntervalTreeIndex::new();
        for (i, &key) in keys.iter().enumerate() {
            index.register(Proxy::new(key, unit_box(i as f32 * 3.0, 0.0, 0.0)));
        }

        // Disjoint intervals spread over x make a balanced tree
        assert!(index.depth() <= 4);
        assert_eq!(index.query_aabb(&unit_box(9.0, 0.0, 0.0)), vec![keys[3]]);

        index.update(keys[3], unit_box(-20.0, 0.0, 0.0));
        assert!(index.query_aabb(&unit_box(9.0, 0.0, 0.0)).is_empty());
        assert_eq!(index.query_aabb(&unit_box(-20.0, 0.0, 0.0)), vec![keys[3]]);
    }

    #[test]
    fn test_wide_interval_stays_at_root() {
        let (_arena, keys) = make_keys(3);
        let mut index = IntervalTreeIndex::new();
        let wide = Aabb::from_center_extents(Vec3::zeros(), Vec3::new(50.0, 0.5, 0.5));
        index.register(Proxy::new(keys[0], wide));
        index.register(Proxy::new(keys[1], unit_box(-30.0, 0.0, 0.0)));
        index.register(Proxy::new(keys[2], unit_box(30.0, 0.0, 0.0)));

        assert_eq!(
            index.overlapping_pairs(),
            vec![(keys[0], keys[1]), (keys[0], keys[2])]
        );
    }
}

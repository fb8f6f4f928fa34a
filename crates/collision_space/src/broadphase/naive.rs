//! Brute-force index

use std::collections::BTreeMap;

use super::{canonical, finish_pairs, BroadPhaseAlgorithm, BroadPhaseIndex, KeyPair, Proxy};
use crate::collision::{Aabb, PrimitiveKey};

/// All-pairs index over a sorted map
///
/// `O(n)` queries and `O(n^2)` pair enumeration. Serves as the baseline the
/// other algorithms are checked against.
#[derive(Debug, Default)]
pub struct NaiveIndex {
    items: BTreeMap<PrimitiveKey, Aabb>,
}

impl NaiveIndex {
    /// Creates an empty index
    pub fn new() -> Self {
        Self::default()
    }
}

impl BroadPhaseIndex for NaiveIndex {
    fn algorithm(&self) -> BroadPhaseAlgorithm {
        BroadPhaseAlgorithm::Naive
    }

    fn register(&mut self, proxy: Proxy) {
        self.items.insert(proxy.key, proxy.aabb);
    }

    fn unregister(&mut self, key: PrimitiveKey) -> bool {
        self.items.remove(&key).is_some()
    }

    fn update(&mut self, key: PrimitiveKey, aabb: Aabb) -> bool {
        match self.items.get_mut(&key) {
            Some(slot) => {
                *slot = aabb;
                true
            }
            None => false,
        }
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
    }

    fn query_aabb(&self, aabb: &Aabb) -> Vec<PrimitiveKey> {
        self.items
            .iter()
            .filter(|(_, bounds)| bounds.intersects(aabb))
            .map(|(&key, _)| key)
            .collect()
    }

    fn overlapping_pairs(&self) -> Vec<KeyPair> {
        // BTreeMap iteration is already sorted by key
        let items: Vec<(PrimitiveKey, Aabb)> = self.items.iter().map(|(k, b)| (*k, *b)).collect();
        let mut out = Vec::new();
        for (i, (a_key, a_box)) in items.iter().enumerate() {
            for (b_key, b_box) in items.iter().skip(i + 1) {
                if a_box.intersects(b_box) {
                    out.push(canonical(*a_key, *b_key));
                }
            }
        }
        finish_pairs(out)
    }
}

//! Sweep and prune
//!
//! Both variants project boxes onto one axis, sort by the lower bound and
//! sweep: a pair can only overlap if the second box starts before the first
//! one ends on that axis. The other two axes are checked per candidate.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::{canonical, finish_pairs, BroadPhaseAlgorithm, BroadPhaseIndex, KeyPair, Proxy};
use crate::collision::{Aabb, PrimitiveKey};
use crate::foundation::math::Vec3;

fn compare_on_axis(a: &Proxy, b: &Proxy, axis: usize) -> Ordering {
    a.aabb.min[axis]
        .total_cmp(&b.aabb.min[axis])
        .then_with(|| a.key.cmp(&b.key))
}

/// Pairs of a slice sorted on `axis` by [`compare_on_axis`]
fn sweep(sorted: &[Proxy], axis: usize) -> Vec<KeyPair> {
    let mut out = Vec::new();
    for (i, a) in sorted.iter().enumerate() {
        for b in &sorted[i + 1..] {
            if b.aabb.min[axis] > a.aabb.max[axis] {
                break;
            }
            if a.aabb.intersects(&b.aabb) {
                out.push(canonical(a.key, b.key));
            }
        }
    }
    finish_pairs(out)
}

/// Members of a slice sorted on `axis` that overlap `aabb`
fn sweep_query(sorted: &[Proxy], axis: usize, aabb: &Aabb) -> Vec<PrimitiveKey> {
    let mut out: Vec<PrimitiveKey> = sorted
        .iter()
        .take_while(|proxy| proxy.aabb.min[axis] <= aabb.max[axis])
        .filter(|proxy| proxy.aabb.intersects(aabb))
        .map(|proxy| proxy.key)
        .collect();
    out.sort_unstable();
    out
}

/// Incremental sweep and prune on the x axis
///
/// The endpoint list is kept sorted on every mutation, so queries never sort.
#[derive(Debug, Default)]
pub struct SweepAndPrune {
    sorted: Vec<Proxy>,
}

impl SweepAndPrune {
    const AXIS: usize = 0;

    /// Creates an empty index
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, key: PrimitiveKey) -> Option<usize> {
        self.sorted.iter().position(|proxy| proxy.key == key)
    }

    fn insert_sorted(&mut self, proxy: Proxy) {
        let at = self
            .sorted
            .partition_point(|existing| compare_on_axis(existing, &proxy, Self::AXIS) == Ordering::Less);
        self.sorted.insert(at, proxy);
    }
}

impl BroadPhaseIndex for SweepAndPrune {
    fn algorithm(&self) -> BroadPhaseAlgorithm {
        BroadPhaseAlgorithm::SweepAndPrune
    }

    fn register(&mut self, proxy: Proxy) {
        if let Some(at) = self.position(proxy.key) {
            self.sorted.remove(at);
        }
        self.insert_sorted(proxy);
    }

    fn unregister(&mut self, key: PrimitiveKey) -> bool {
        match self.position(key) {
            Some(at) => {
                self.sorted.remove(at);
                true
            }
            None => false,
        }
    }

    fn update(&mut self, key: PrimitiveKey, aabb: Aabb) -> bool {
        let Some(at) = self.position(key) else {
            return false;
        };
        self.sorted.remove(at);
        self.insert_sorted(Proxy::new(key, aabb));
        true
    }

    fn members(&self) -> Vec<Proxy> {
        let mut members = self.sorted.clone();
        members.sort_unstable_by_key(|proxy| proxy.key);
        members
    }

    fn contains(&self, key: PrimitiveKey) -> bool {
        self.position(key).is_some()
    }

    fn len(&self) -> usize {
        self.sorted.len()
    }

    fn clear(&mut self) {
        self.sorted.clear();
    }

    fn query_aabb(&self, aabb: &Aabb) -> Vec<PrimitiveKey> {
        sweep_query(&self.sorted, Self::AXIS, aabb)
    }

    fn overlapping_pairs(&self) -> Vec<KeyPair> {
        sweep(&self.sorted, Self::AXIS)
    }
}

/// Sweep and prune without persistent ordering
///
/// Mutations are map operations; each query picks the axis along which box
/// centres spread the most, sorts on it and sweeps.
#[derive(Debug, Default)]
pub struct SimpleSweepAndPrune {
    items: BTreeMap<PrimitiveKey, Aabb>,
}

impl SimpleSweepAndPrune {
    /// Creates an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Axis with the largest variance of box centres
    fn sweep_axis(&self) -> usize {
        let count = self.items.len().max(1) as f32;
        let (sum, sum_sq) = self.items.values().fold(
            (Vec3::zeros(), Vec3::zeros()),
            |(sum, sum_sq), aabb| {
                let c = aabb.center();
                (sum + c, sum_sq + c.component_mul(&c))
            },
        );
        let mean = sum / count;
        let variance = sum_sq / count - mean.component_mul(&mean);
        variance.imax()
    }

    fn sorted_on(&self, axis: usize) -> Vec<Proxy> {
        let mut sorted: Vec<Proxy> = self.items.iter().map(|(&key, &aabb)| Proxy::new(key, aabb)).collect();
        sorted.sort_unstable_by(|a, b| compare_on_axis(a, b, axis));
        sorted
    }
}

impl BroadPhaseIndex for SimpleSweepAndPrune {
    fn algorithm(&self) -> BroadPhaseAlgorithm {
        BroadPhaseAlgorithm::SimpleSweepAndPrune
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
        let axis = self.sweep_axis();
        sweep_query(&self.sorted_on(axis), axis, aabb)
    }

    fn overlapping_pairs(&self) -> Vec<KeyPair> {
        let axis = self.sweep_axis();
        sweep(&self.sorted_on(axis), axis)
    }
}

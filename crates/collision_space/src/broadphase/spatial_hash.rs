//! Uniform-grid spatial hash
//!
//! Each member is listed in every grid cell its box touches. Boxes spanning
//! more than [`SpatialHashIndex::MAX_CELLS_PER_MEMBER`] cells are kept in a
//! side list instead and tested against everything, so one huge primitive
//! (a floor, a wall) does not flood the grid.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{canonical, finish_pairs, BroadPhaseAlgorithm, BroadPhaseIndex, KeyPair, Proxy};
use crate::collision::{Aabb, PrimitiveKey};
use crate::foundation::math::Vec3;

type Cell = [i32; 3];

/// Inclusive range of cells covered by a box
#[derive(Debug, Clone, Copy)]
struct CellRange {
    min: Cell,
    max: Cell,
}

impl CellRange {
    /// Number of cells, saturating at `u64::MAX`
    fn count(&self) -> u64 {
        (0..3)
            .map(|axis| (i64::from(self.max[axis]) - i64::from(self.min[axis]) + 1).max(0) as u64)
            .try_fold(1u64, u64::checked_mul)
            .unwrap_or(u64::MAX)
    }

    fn cells(self) -> impl Iterator<Item = Cell> {
        (self.min[0]..=self.max[0]).flat_map(move |x| {
            (self.min[1]..=self.max[1])
                .flat_map(move |y| (self.min[2]..=self.max[2]).map(move |z| [x, y, z]))
        })
    }
}

/// Grid index with a fixed cell size
#[derive(Debug)]
pub struct SpatialHashIndex {
    cell_size: f32,
    cells: HashMap<Cell, Vec<PrimitiveKey>>,
    items: BTreeMap<PrimitiveKey, Aabb>,
    oversized: BTreeSet<PrimitiveKey>,
}

impl SpatialHashIndex {
    /// Members covering more cells than this go to the side list
    pub const MAX_CELLS_PER_MEMBER: u64 = 64;

    /// Creates an empty grid with cubic cells of edge `cell_size`
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            cells: HashMap::new(),
            items: BTreeMap::new(),
            oversized: BTreeSet::new(),
        }
    }

    /// Cell edge length
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Number of members kept outside the grid
    pub fn oversized_count(&self) -> usize {
        self.oversized.len()
    }

    fn cell_of(&self, point: Vec3) -> Cell {
        // `as` saturates, so far-away boxes clamp to the border cells
        let scaled = point / self.cell_size;
        [
            scaled.x.floor() as i32,
            scaled.y.floor() as i32,
            scaled.z.floor() as i32,
        ]
    }

    fn range_of(&self, aabb: &Aabb) -> CellRange {
        CellRange {
            min: self.cell_of(aabb.min),
            max: self.cell_of(aabb.max),
        }
    }

    fn insert(&mut self, key: PrimitiveKey, aabb: Aabb) {
        let range = self.range_of(&aabb);
        if range.count() > Self::MAX_CELLS_PER_MEMBER {
            log::trace!("Spatial hash member spans {} cells, keeping it aside", range.count());
            self.oversized.insert(key);
        } else {
            for cell in range.cells() {
                self.cells.entry(cell).or_default().push(key);
            }
        }
        self.items.insert(key, aabb);
    }

    fn remove(&mut self, key: PrimitiveKey) -> Option<Aabb> {
        let aabb = self.items.remove(&key)?;
        if !self.oversized.remove(&key) {
            for cell in self.range_of(&aabb).cells() {
                if let Some(bucket) = self.cells.get_mut(&cell) {
                    bucket.retain(|&k| k != key);
                    if bucket.is_empty() {
                        self.cells.remove(&cell);
                    }
                }
            }
        }
        Some(aabb)
    }
}

impl BroadPhaseIndex for SpatialHashIndex {
    fn algorithm(&self) -> BroadPhaseAlgorithm {
        BroadPhaseAlgorithm::SpatialHash
    }

    fn register(&mut self, proxy: Proxy) {
        self.remove(proxy.key);
        self.insert(proxy.key, proxy.aabb);
    }

    fn unregister(&mut self, key: PrimitiveKey) -> bool {
        self.remove(key).is_some()
    }

    fn update(&mut self, key: PrimitiveKey, aabb: Aabb) -> bool {
        if self.remove(key).is_none() {
            return false;
        }
        self.insert(key, aabb);
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
        self.cells.clear();
        self.items.clear();
        self.oversized.clear();
    }

    fn query_aabb(&self, aabb: &Aabb) -> Vec<PrimitiveKey> {
        let range = self.range_of(aabb);
        let mut candidates: BTreeSet<PrimitiveKey> = self.oversized.clone();
        if range.count() > Self::MAX_CELLS_PER_MEMBER {
            // Scanning the grid would cost more than scanning the members
            candidates.extend(self.items.keys().copied());
        } else {
            for cell in range.cells() {
                if let Some(bucket) = self.cells.get(&cell) {
                    candidates.extend(bucket.iter().copied());
                }
            }
        }
        candidates
            .into_iter()
            .filter(|key| self.items.get(key).is_some_and(|b| b.intersects(aabb)))
            .collect()
    }

    fn overlapping_pairs(&self) -> Vec<KeyPair> {
        let mut out = Vec::new();
        for bucket in self.cells.values() {
            for (i, &a) in bucket.iter().enumerate() {
                for &b in &bucket[i + 1..] {
                    if self.items[&a].intersects(&self.items[&b]) {
                        out.push(canonical(a, b));
                    }
                }
            }
        }
        for &a in &self.oversized {
            let a_box = self.items[&a];
            for (&b, b_box) in &self.items {
                if a != b && a_box.intersects(b_box) {
                    out.push(canonical(a, b));
                }
            }
        }
        finish_pairs(out)
    }
}

//! Broad-phase spatial indices
//!
//! Every scope of the collision space (environment, body, link) keeps one
//! [`BroadPhaseIndex`] of primitive handles. The algorithm behind the index is
//! swappable at runtime without changing what the index contains: an index is
//! a set of [`Proxy`] values, and every algorithm answers the same queries
//! for the same set.
//!
//! Indices never own primitives. They store the key and the last box they
//! were given, so a primitive's box must be pushed again with
//! [`BroadPhaseIndex::update`] after its pose changes.

mod dynamic_tree;
mod interval_tree;
mod naive;
mod spatial_hash;
mod sweep_and_prune;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::collision::{Aabb, PrimitiveKey};
use crate::space::SpaceError;

pub use dynamic_tree::{AabbTree, DynamicAabbTree, DynamicAabbTreeArray, NodeArena, NodeKey, TreeNode};
pub use interval_tree::IntervalTreeIndex;
pub use naive::NaiveIndex;
pub use spatial_hash::SpatialHashIndex;
pub use sweep_and_prune::{SimpleSweepAndPrune, SweepAndPrune};

/// A primitive as seen by an index: its handle and its world box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proxy {
    /// Primitive handle
    pub key: PrimitiveKey,
    /// World box at the time of the last register or update
    pub aabb: Aabb,
}

impl Proxy {
    /// Pair a handle with its box
    pub fn new(key: PrimitiveKey, aabb: Aabb) -> Self {
        Self { key, aabb }
    }
}

/// Two primitive keys reported together by a pair query
pub type KeyPair = (PrimitiveKey, PrimitiveKey);

/// Mutable set of primitives indexed by world box
///
/// Membership is a set: registering a key that is already a member replaces
/// its box. Query results are deterministic; keys and pairs come back sorted.
pub trait BroadPhaseIndex: fmt::Debug {
    /// Algorithm implementing this index
    fn algorithm(&self) -> BroadPhaseAlgorithm;

    /// Add one member
    fn register(&mut self, proxy: Proxy);

    /// Add several members
    fn register_all(&mut self, proxies: &[Proxy]) {
        for proxy in proxies {
            self.register(*proxy);
        }
    }

    /// Remove one member; false if it was not registered
    fn unregister(&mut self, key: PrimitiveKey) -> bool;

    /// Remove exactly the given members, returning how many were present
    fn unregister_all(&mut self, keys: &[PrimitiveKey]) -> usize {
        keys.iter().filter(|&&key| self.unregister(key)).count()
    }

    /// Replace the box of a member; false and no change for non-members
    fn update(&mut self, key: PrimitiveKey, aabb: Aabb) -> bool;

    /// Snapshot of the membership, sorted by key
    fn members(&self) -> Vec<Proxy>;

    /// True if `key` is registered
    fn contains(&self, key: PrimitiveKey) -> bool;

    /// Number of members
    fn len(&self) -> usize;

    /// True when there are no members
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every member; the primitives themselves are untouched
    fn clear(&mut self);

    /// Members whose box overlaps `aabb`, sorted
    fn query_aabb(&self, aabb: &Aabb) -> Vec<PrimitiveKey>;

    /// Every overlapping pair of members, canonical and sorted
    fn overlapping_pairs(&self) -> Vec<KeyPair>;

    /// Overlapping pairs between this index and `other`
    ///
    /// Each pair is `(member of self, member of other)`. A primitive
    /// registered in both indices is never paired with itself.
    fn overlapping_with(&self, other: &dyn BroadPhaseIndex) -> Vec<KeyPair> {
        let mut pairs: Vec<KeyPair> = other
            .members()
            .into_iter()
            .flat_map(|theirs| {
                self.query_aabb(&theirs.aabb)
                    .into_iter()
                    .filter(move |&mine| mine != theirs.key)
                    .map(move |mine| (mine, theirs.key))
            })
            .collect();
        pairs.sort_unstable();
        pairs.dedup();
        pairs
    }
}

/// Order a pair so the smaller key comes first
pub(crate) fn canonical(a: PrimitiveKey, b: PrimitiveKey) -> KeyPair {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Sort and dedup a pair list gathered in arbitrary order
pub(crate) fn finish_pairs(mut pairs: Vec<KeyPair>) -> Vec<KeyPair> {
    pairs.sort_unstable();
    pairs.dedup();
    pairs
}

/// Available broad-phase algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BroadPhaseAlgorithm {
    /// Linear list, every query scans all members
    Naive,
    /// Sweep and prune over a list kept sorted on x
    #[serde(rename = "SaP")]
    SweepAndPrune,
    /// Sweep and prune that sorts on the widest axis at query time
    #[serde(rename = "SSaP")]
    SimpleSweepAndPrune,
    /// Uniform grid
    SpatialHash,
    /// Centred interval tree over x
    IntervalTree,
    /// Dynamic AABB tree with slot-map node storage
    #[serde(rename = "DynamicAABBTree")]
    DynamicAabbTree,
    /// Dynamic AABB tree with array node storage
    #[serde(rename = "DynamicAABBTree_Array")]
    DynamicAabbTreeArray,
}

impl BroadPhaseAlgorithm {
    /// Every algorithm, in declaration order
    pub const ALL: [Self; 7] = [
        Self::Naive,
        Self::SweepAndPrune,
        Self::SimpleSweepAndPrune,
        Self::SpatialHash,
        Self::IntervalTree,
        Self::DynamicAabbTree,
        Self::DynamicAabbTreeArray,
    ];

    /// Configuration name of this algorithm
    pub fn name(self) -> &'static str {
        match self {
            Self::Naive => "Naive",
            Self::SweepAndPrune => "SaP",
            Self::SimpleSweepAndPrune => "SSaP",
            Self::SpatialHash => "SpatialHash",
            Self::IntervalTree => "IntervalTree",
            Self::DynamicAabbTree => "DynamicAABBTree",
            Self::DynamicAabbTreeArray => "DynamicAABBTree_Array",
        }
    }
}

impl fmt::Display for BroadPhaseAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BroadPhaseAlgorithm {
    type Err = SpaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|algorithm| algorithm.name() == s)
            .ok_or_else(|| SpaceError::UnknownBroadPhaseAlgorithm(s.to_string()))
    }
}

/// Tuning parameters shared by every index a factory creates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexSettings {
    /// Cell edge length of the spatial hash
    pub spatial_hash_cell_size: f32,
    /// Fattening margin of dynamic tree leaves
    pub tree_margin: f32,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            spatial_hash_cell_size: 1.0,
            tree_margin: 0.05,
        }
    }
}

/// Creates empty indices of one algorithm
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexFactory {
    algorithm: BroadPhaseAlgorithm,
    settings: IndexSettings,
}

impl IndexFactory {
    /// Factory for `algorithm` with the given tuning
    pub fn new(algorithm: BroadPhaseAlgorithm, settings: IndexSettings) -> Self {
        Self { algorithm, settings }
    }

    /// Algorithm of created indices
    pub fn algorithm(&self) -> BroadPhaseAlgorithm {
        self.algorithm
    }

    /// Tuning of created indices
    pub fn settings(&self) -> IndexSettings {
        self.settings
    }

    /// A fresh, empty index
    pub fn create(&self) -> Box<dyn BroadPhaseIndex> {
        match self.algorithm {
            BroadPhaseAlgorithm::Naive => Box::new(NaiveIndex::new()),
            BroadPhaseAlgorithm::SweepAndPrune => Box::new(SweepAndPrune::new()),
            BroadPhaseAlgorithm::SimpleSweepAndPrune => Box::new(SimpleSweepAndPrune::new()),
            BroadPhaseAlgorithm::SpatialHash => {
                Box::new(SpatialHashIndex::new(self.settings.spatial_hash_cell_size))
            }
            BroadPhaseAlgorithm::IntervalTree => Box::new(IntervalTreeIndex::new()),
            BroadPhaseAlgorithm::DynamicAabbTree => {
                Box::new(DynamicAabbTree::new(self.settings.tree_margin))
            }
            BroadPhaseAlgorithm::DynamicAabbTreeArray => {
                Box::new(DynamicAabbTreeArray::new(self.settings.tree_margin))
            }
        }
    }
}

impl Default for IndexFactory {
    fn default() -> Self {
        Self::new(BroadPhaseAlgorithm::DynamicAabbTree, IndexSettings::default())
    }
}

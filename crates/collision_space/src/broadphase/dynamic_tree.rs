//! Dynamic AABB tree
//!
//! A binary bounding-volume hierarchy updated incrementally. Leaves store a
//! fattened copy of the member's box, so small motions only rewrite the
//! leaf; a leaf is reinserted once its tight box leaves the fat one.
//! Insertion descends to the leaf whose box grows the least in surface area
//! and pairs with it. Every branch on the way back up is rebalanced with a
//! rotation, so sibling subtrees never differ in height by more than one and
//! the height stays logarithmic whatever the insertion order.
//!
//! The tree is generic over its node storage ([`NodeArena`]): a slot map
//! arena and an index-stable array give the two dynamic-tree algorithms.

use std::collections::BTreeMap;
use std::fmt;

use slotmap::SlotMap;

use super::{canonical, finish_pairs, BroadPhaseAlgorithm, BroadPhaseIndex, KeyPair, Proxy};
use crate::collision::{Aabb, PrimitiveKey};
use crate::foundation::collections::FreeList;

slotmap::new_key_type! {
    /// Node handle of the slot-map backed tree
    pub struct NodeKey;
}

#[derive(Debug, Clone, Copy)]
enum NodeKind<Id> {
    Leaf { key: PrimitiveKey, tight: Aabb },
    Branch { left: Id, right: Id },
}

/// One node of an [`AabbTree`]
#[derive(Debug, Clone)]
pub struct TreeNode<Id> {
    fat: Aabb,
    parent: Option<Id>,
    /// Edges to the deepest leaf below; 0 for leaves
    height: u32,
    kind: NodeKind<Id>,
}

/// Node storage of an [`AabbTree`]
pub trait NodeArena: Default + fmt::Debug {
    /// Node handle
    type Id: Copy + Eq + fmt::Debug;

    /// Algorithm tag reported by trees over this storage
    const ALGORITHM: BroadPhaseAlgorithm;

    /// Store a node
    fn alloc(&mut self, node: TreeNode<Self::Id>) -> Self::Id;

    /// Free a node
    fn release(&mut self, id: Self::Id);

    /// Borrow a live node
    fn node(&self, id: Self::Id) -> &TreeNode<Self::Id>;

    /// Mutably borrow a live node
    fn node_mut(&mut self, id: Self::Id) -> &mut TreeNode<Self::Id>;

    /// Free every node
    fn reset(&mut self);
}

impl NodeArena for SlotMap<NodeKey, TreeNode<NodeKey>> {
    type Id = NodeKey;

    const ALGORITHM: BroadPhaseAlgorithm = BroadPhaseAlgorithm::DynamicAabbTree;

    fn alloc(&mut self, node: TreeNode<NodeKey>) -> NodeKey {
        self.insert(node)
    }

    fn release(&mut self, id: NodeKey) {
        self.remove(id);
    }

    fn node(&self, id: NodeKey) -> &TreeNode<NodeKey> {
        &self[id]
    }

    fn node_mut(&mut self, id: NodeKey) -> &mut TreeNode<NodeKey> {
        &mut self[id]
    }

    fn reset(&mut self) {
        self.clear();
    }
}

impl NodeArena for FreeList<TreeNode<usize>> {
    type Id = usize;

    const ALGORITHM: BroadPhaseAlgorithm = BroadPhaseAlgorithm::DynamicAabbTreeArray;

    fn alloc(&mut self, node: TreeNode<usize>) -> usize {
        self.insert(node)
    }

    fn release(&mut self, id: usize) {
        self.remove(id);
    }

    fn node(&self, id: usize) -> &TreeNode<usize> {
        &self[id]
    }

    fn node_mut(&mut self, id: usize) -> &mut TreeNode<usize> {
        &mut self[id]
    }

    fn reset(&mut self) {
        self.clear();
    }
}

/// Dynamic tree over slot-map nodes
pub type DynamicAabbTree = AabbTree<SlotMap<NodeKey, TreeNode<NodeKey>>>;

/// Dynamic tree over array nodes
pub type DynamicAabbTreeArray = AabbTree<FreeList<TreeNode<usize>>>;

/// Incrementally maintained bounding-volume hierarchy
#[derive(Debug)]
pub struct AabbTree<A: NodeArena> {
    arena: A,
    root: Option<A::Id>,
    leaves: BTreeMap<PrimitiveKey, A::Id>,
    margin: f32,
}

impl<A: NodeArena> AabbTree<A> {
    /// Creates an empty tree whose leaves are fattened by `margin`
    pub fn new(margin: f32) -> Self {
        Self {
            arena: A::default(),
            root: None,
            leaves: BTreeMap::new(),
            margin,
        }
    }

    /// Leaf fattening margin
    pub fn margin(&self) -> f32 {
        self.margin
    }

    /// Number of nodes on the longest root-to-leaf path
    pub fn height(&self) -> usize {
        self.root
            .map_or(0, |root| self.arena.node(root).height as usize + 1)
    }

    fn leaf_tight(&self, id: A::Id) -> Aabb {
        match self.arena.node(id).kind {
            NodeKind::Leaf { tight, .. } => tight,
            NodeKind::Branch { .. } => self.arena.node(id).fat,
        }
    }

    /// Cost of descending into `id` to place a leaf with box `leaf`
    fn descend_cost(&self, id: A::Id, leaf: &Aabb) -> f32 {
        let node = self.arena.node(id);
        let merged = node.fat.merged(leaf).surface_area();
        match node.kind {
            NodeKind::Leaf { .. } => merged,
            NodeKind::Branch { .. } => merged - node.fat.surface_area(),
        }
    }

    fn insert_leaf(&mut self, leaf: A::Id) {
        let Some(root) = self.root else {
            self.arena.node_mut(leaf).parent = None;
            self.root = Some(leaf);
            return;
        };

        // Always pair with a leaf: a new branch then has height 1 and one
        // rotation per ancestor is enough to restore balance.
        let leaf_box = self.arena.node(leaf).fat;
        let mut sibling = root;
        while let NodeKind::Branch { left, right } = self.arena.node(sibling).kind {
            let cost_left = self.descend_cost(left, &leaf_box);
            let cost_right = self.descend_cost(right, &leaf_box);
            sibling = if cost_left <= cost_right { left } else { right };
        }

        let old_parent = self.arena.node(sibling).parent;
        let fat = self.arena.node(sibling).fat.merged(&leaf_box);
        let branch = self.arena.alloc(TreeNode {
            fat,
            parent: old_parent,
            height: 1,
            kind: NodeKind::Branch { left: sibling, right: leaf },
        });
        self.arena.node_mut(sibling).parent = Some(branch);
        self.arena.node_mut(leaf).parent = Some(branch);

        match old_parent {
            Some(parent) => self.replace_child(parent, sibling, branch),
            None => self.root = Some(branch),
        }
        self.refit(old_parent);
    }

    fn remove_leaf(&mut self, leaf: A::Id) {
        let Some(parent) = self.arena.node(leaf).parent else {
            self.root = None;
            return;
        };
        let NodeKind::Branch { left, right } = self.arena.node(parent).kind else {
            unreachable!("parent of a tree node is always a branch");
        };
        let sibling = if left == leaf { right } else { left };
        let grandparent = self.arena.node(parent).parent;

        self.arena.node_mut(sibling).parent = grandparent;
        match grandparent {
            Some(grandparent) => self.replace_child(grandparent, parent, sibling),
            None => self.root = Some(sibling),
        }
        self.arena.release(parent);
        self.arena.node_mut(leaf).parent = None;
        self.refit(grandparent);
    }

    fn replace_child(&mut self, parent: A::Id, old: A::Id, new: A::Id) {
        if let NodeKind::Branch { left, right } = &mut self.arena.node_mut(parent).kind {
            if *left == old {
                *left = new;
            } else {
                *right = new;
            }
        }
    }

    /// Rebalance and recompute branches from `start` up to the root
    fn refit(&mut self, start: Option<A::Id>) {
        let mut cursor = start;
        while let Some(id) = cursor {
            let id = self.balance(id);
            self.recompute(id);
            cursor = self.arena.node(id).parent;
        }
    }

    /// Box and height of a branch from its children
    fn recompute(&mut self, id: A::Id) {
        if let NodeKind::Branch { left, right } = self.arena.node(id).kind {
            let (left, right) = (self.arena.node(left), self.arena.node(right));
            let fat = left.fat.merged(&right.fat);
            let height = 1 + left.height.max(right.height);
            let node = self.arena.node_mut(id);
            node.fat = fat;
            node.height = height;
        }
    }

    /// Rotate the taller child of `id` above it if the children's heights
    /// differ by more than one; returns the node now at that position
    ///
    /// Children must already be balanced and hold correct heights.
    fn balance(&mut self, id: A::Id) -> A::Id {
        let NodeKind::Branch { left, right } = self.arena.node(id).kind else {
            return id;
        };
        let skew = i64::from(self.arena.node(right).height) - i64::from(self.arena.node(left).height);
        if skew > 1 {
            self.rotate_up(id, right)
        } else if skew < -1 {
            self.rotate_up(id, left)
        } else {
            id
        }
    }

    /// Lift `tall`, a branch child of `id`, into `id`'s place
    ///
    /// `tall` keeps its taller child and takes `id` as its other child; its
    /// shorter child moves under `id` in `tall`'s old slot.
    fn rotate_up(&mut self, id: A::Id, tall: A::Id) -> A::Id {
        let NodeKind::Branch { left, right } = self.arena.node(tall).kind else {
            unreachable!("a child two levels taller than its sibling is a branch");
        };
        let moved = if self.arena.node(left).height > self.arena.node(right).height {
            right
        } else {
            left
        };

        let parent = self.arena.node(id).parent;
        match parent {
            Some(parent) => self.replace_child(parent, id, tall),
            None => self.root = Some(tall),
        }
        self.arena.node_mut(tall).parent = parent;

        self.replace_child(tall, moved, id);
        self.arena.node_mut(id).parent = Some(tall);
        self.replace_child(id, tall, moved);
        self.arena.node_mut(moved).parent = Some(id);

        self.recompute(id);
        self.recompute(tall);
        tall
    }

    fn visit_overlapping(&self, aabb: &Aabb, mut visit: impl FnMut(PrimitiveKey)) {
        let mut stack: Vec<A::Id> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            let node = self.arena.node(id);
            if !node.fat.intersects(aabb) {
                continue;
            }
            match node.kind {
                NodeKind::Leaf { key, tight } => {
                    if tight.intersects(aabb) {
                        visit(key);
                    }
                }
                NodeKind::Branch { left, right } => {
                    stack.push(left);
                    stack.push(right);
                }
            }
        }
    }
}

impl<A: NodeArena> BroadPhaseIndex for AabbTree<A> {
    fn algorithm(&self) -> BroadPhaseAlgorithm {
        A::ALGORITHM
    }

    fn register(&mut self, proxy: Proxy) {
        if self.update(proxy.key, proxy.aabb) {
            return;
        }
        let leaf = self.arena.alloc(TreeNode {
            fat: proxy.aabb.expanded(self.margin),
            parent: None,
            height: 0,
            kind: NodeKind::Leaf { key: proxy.key, tight: proxy.aabb },
        });
        self.insert_leaf(leaf);
        self.leaves.insert(proxy.key, leaf);
    }

    fn unregister(&mut self, key: PrimitiveKey) -> bool {
        let Some(leaf) = self.leaves.remove(&key) else {
            return false;
        };
        self.remove_leaf(leaf);
        self.arena.release(leaf);
        true
    }

    fn update(&mut self, key: PrimitiveKey, aabb: Aabb) -> bool {
        let Some(&leaf) = self.leaves.get(&key) else {
            return false;
        };
        let node = self.arena.node_mut(leaf);
        node.kind = NodeKind::Leaf { key, tight: aabb };
        if node.fat.contains(&aabb) {
            return true;
        }
        node.fat = aabb.expanded(self.margin);
        self.remove_leaf(leaf);
        self.insert_leaf(leaf);
        true
    }

    fn members(&self) -> Vec<Proxy> {
        self.leaves
            .iter()
            .map(|(&key, &leaf)| Proxy::new(key, self.leaf_tight(leaf)))
            .collect()
    }

    fn contains(&self, key: PrimitiveKey) -> bool {
        self.leaves.contains_key(&key)
    }

    fn len(&self) -> usize {
        self.leaves.len()
    }

    fn clear(&mut self) {
        self.arena.reset();
        self.root = None;
        self.leaves.clear();
    }

    fn query_aabb(&self, aabb: &Aabb) -> Vec<PrimitiveKey> {
        let mut out = Vec::new();
        self.visit_overlapping(aabb, |key| out.push(key));
        out.sort_unstable();
        out
    }

    fn overlapping_pairs(&self) -> Vec<KeyPair> {
        let mut out = Vec::new();
        for (&key, &leaf) in &self.leaves {
            self.visit_overlapping(&self.leaf_tight(leaf), |other| {
                if other != key {
                    out.push(canonical(key, other));
                }
            });
        }
        finish_pairs(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadphase::tests::{make_keys, unit_box};

    /// Parent links agree with child links and every branch encloses its children
    fn check_structure<A: NodeArena>(tree: &AabbTree<A>) {
        let Some(root) = tree.root else {
            assert!(tree.leaves.is_empty());
            return;
        };
        assert_eq!(tree.arena.node(root).parent, None);

        let mut leaf_count = 0;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = tree.arena.node(id);
            match node.kind {
                NodeKind::Leaf { key, tight } => {
                    assert!(node.fat.contains(&tight));
                    assert_eq!(tree.leaves[&key], id);
                    assert_eq!(node.height, 0);
                    leaf_count += 1;
                }
                NodeKind::Branch { left, right } => {
                    let (lh, rh) = (tree.arena.node(left).height, tree.arena.node(right).height);
                    assert_eq!(node.height, 1 + lh.max(rh));
                    assert!(lh.abs_diff(rh) <= 1, "unbalanced branch: {lh} vs {rh}");
                    for child in [left, right] {
                        assert_eq!(tree.arena.node(child).parent, Some(id));
                        assert!(node.fat.contains(&tree.arena.node(child).fat));
                        stack.push(child);
                    }
                }
            }
        }
        assert_eq!(leaf_count, tree.leaves.len());
    }

    fn grid_of<A: NodeArena>(tree: &mut AabbTree<A>, keys: &[PrimitiveKey]) {
        for (i, &key) in keys.iter().enumerate() {
            let (x, y) = ((i % 4) as f32 * 2.0, (i / 4) as f32 * 2.0);
            tree.register(Proxy::new(key, unit_box(x, y, 0.0)));
        }
    }

    #[test]
    fn test_structure_survives_churn() {
        let (_arena, keys) = make_keys(16);
        let mut tree = DynamicAabbTree::new(0.1);
        grid_of(&mut tree, &keys);
        check_structure(&tree);

        for &key in keys.iter().step_by(3) {
            assert!(tree.unregister(key));
            check_structure(&tree);
        }
        for (i, &key) in keys.iter().enumerate().skip(1).step_by(3) {
            tree.update(key, unit_box(i as f32 * -5.0, 3.0, 1.0));
            check_structure(&tree);
        }
        assert_eq!(tree.len(), 16 - 6);
    }

    #[test]
    fn test_small_motion_stays_in_fat_leaf() {
        let (_arena, keys) = make_keys(2);
        let mut tree = DynamicAabbTreeArray::new(0.5);
        tree.register(Proxy::new(keys[0], unit_box(0.0, 0.0, 0.0)));
        tree.register(Proxy::new(keys[1], unit_box(3.0, 0.0, 0.0)));
        assert_eq!(tree.height(), 2);
        let leaf = tree.leaves[&keys[0]];
        let fat_before = tree.arena.node(leaf).fat;

        tree.update(keys[0], unit_box(0.2, 0.0, 0.0));
        assert_eq!(tree.arena.node(leaf).fat, fat_before);
        assert_eq!(tree.members()[0].aabb, unit_box(0.2, 0.0, 0.0));

        tree.update(keys[0], unit_box(2.0, 0.0, 0.0));
        assert_ne!(tree.arena.node(tree.leaves[&keys[0]]).fat, fat_before);
        assert_eq!(tree.overlapping_pairs(), vec![(keys[0], keys[1])]);
        check_structure(&tree);
    }

    fn collinear_stays_balanced<A: NodeArena>(mut tree: AabbTree<A>) {
        let (_arena, keys) = make_keys(1024);
        for (i, &key) in keys.iter().enumerate() {
            tree.register(Proxy::new(key, unit_box(i as f32 * 2.0, 0.0, 0.0)));
        }
        check_structure(&tree);
        // 2 * log2(1024)
        assert!(tree.height() <= 20, "height {} for 1024 leaves", tree.height());

        let target = unit_box(100.0, 0.0, 0.0);
        assert_eq!(tree.query_aabb(&target), vec![keys[50]]);
        assert_eq!(tree.overlapping_pairs().len(), 0);

        for &key in keys.iter().step_by(2) {
            tree.unregister(key);
        }
        check_structure(&tree);
        assert!(tree.height() <= 18, "height {} for 512 leaves", tree.height());
    }

    #[test]
    fn test_collinear_inserts_stay_balanced() {
        collinear_stays_balanced(DynamicAabbTree::new(0.05));
        collinear_stays_balanced(DynamicAabbTreeArray::new(0.05));
    }

    #[test]
    fn test_array_storage_reuses_freed_nodes() {
        let (_arena, keys) = make_keys(8);
        let mut tree = DynamicAabbTreeArray::new(0.0);
        grid_of(&mut tree, &keys);
        assert_eq!(tree.arena.len(), 15);

        tree.unregister(keys[7]);
        tree.register(Proxy::new(keys[7], unit_box(50.0, 0.0, 0.0)));
        assert_eq!(tree.arena.len(), 15);
        check_structure(&tree);
    }
}

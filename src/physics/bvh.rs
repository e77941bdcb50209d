//! Dynamic AABB tree.
//!
//! A binary bounding-volume hierarchy over enlarged ("fat") boxes. Leaves carry a
//! user payload; internal nodes bound their two children. Insertion descends by
//! perimeter cost, and every ancestor touched by an insert or remove is rotated
//! back into AVL balance, so queries stay logarithmic under churn.

use std::fmt;

use glam::Vec2;

use crate::geometry::Aabb;

const NULL_NODE: usize = usize::MAX;

/// Stable id of a tree leaf. Valid until the leaf is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProxyId(u32);

impl ProxyId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

#[derive(Debug, Clone)]
struct TreeNode<T> {
    aabb: Aabb,
    /// Parent index, or the next free node while on the free list.
    parent: usize,
    child1: usize,
    child2: usize,
    /// Leaf = 0, free = -1.
    height: i32,
    payload: Option<T>,
}

impl<T> TreeNode<T> {
    fn free(next: usize) -> Self {
        Self {
            aabb: Aabb::new(Vec2::ZERO, Vec2::ZERO),
            parent: next,
            child1: NULL_NODE,
            child2: NULL_NODE,
            height: -1,
            payload: None,
        }
    }

    #[inline]
    fn is_leaf(&self) -> bool {
        self.child1 == NULL_NODE
    }
}

/// Read-only view of a live node, for diagnostics and debug drawing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeNodeInfo {
    pub index: usize,
    pub aabb: Aabb,
    pub height: u32,
    pub is_leaf: bool,
}

/// Structural problem found by [`DynamicTree::validate`].
#[derive(Debug, Clone, PartialEq)]
pub enum TreeViolation {
    RootHasParent { root: usize },
    ParentMismatch { node: usize },
    LeafHasPayloadMismatch { node: usize },
    HeightMismatch { node: usize, stored: i32, computed: i32 },
    Unbalanced { node: usize, balance: i32 },
    AabbNotContained { node: usize },
    NodeCountMismatch { reachable: usize, free: usize, capacity: usize },
}

impl fmt::Display for TreeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeViolation::RootHasParent { root } => write!(f, "root {root} has a parent"),
            TreeViolation::ParentMismatch { node } => {
                write!(f, "node {node} is not a child of its parent")
            }
            TreeViolation::LeafHasPayloadMismatch { node } => {
                write!(f, "node {node} payload does not match its leaf flag")
            }
            TreeViolation::HeightMismatch {
                node,
                stored,
                computed,
            } => write!(f, "node {node} height {stored}, expected {computed}"),
            TreeViolation::Unbalanced { node, balance } => {
                write!(f, "node {node} has balance {balance}")
            }
            TreeViolation::AabbNotContained { node } => {
                write!(f, "node {node} does not contain its children")
            }
            TreeViolation::NodeCountMismatch {
                reachable,
                free,
                capacity,
            } => write!(
                f,
                "{reachable} reachable + {free} free nodes != capacity {capacity}"
            ),
        }
    }
}

/// Arena-backed dynamic AABB tree.
#[derive(Debug, Clone)]
pub struct DynamicTree<T> {
    nodes: Vec<TreeNode<T>>,
    root: usize,
    free_list: usize,
    node_count: usize,
    proxy_count: usize,
    margin: f32,
    displacement_multiplier: f32,
}

impl<T> Default for DynamicTree<T> {
    fn default() -> Self {
        Self::new(0.1, 4.0)
    }
}

impl<T> DynamicTree<T> {
    const INITIAL_CAPACITY: usize = 16;

    /// `margin` fattens every leaf; `displacement_multiplier` scales predicted motion.
    pub fn new(margin: f32, displacement_multiplier: f32) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            root: NULL_NODE,
            free_list: NULL_NODE,
            node_count: 0,
            proxy_count: 0,
            margin,
            displacement_multiplier,
        };
        tree.grow(Self::INITIAL_CAPACITY);
        tree
    }

    #[inline]
    pub fn margin(&self) -> f32 {
        self.margin
    }

    /// Allocated (leaf + internal) node count.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    #[inline]
    pub fn proxy_count(&self) -> usize {
        self.proxy_count
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root == NULL_NODE
    }

    /// Height of the root; 0 for an empty tree or a single leaf.
    pub fn height(&self) -> u32 {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root].height as u32
        }
    }

    /// Insert a leaf. The stored box is `aabb` enlarged by the margin.
    pub fn insert(&mut self, payload: T, aabb: Aabb) -> ProxyId {
        let leaf = self.allocate_node();
        {
            let node = &mut self.nodes[leaf];
            node.aabb = aabb.expanded(self.margin);
            node.height = 0;
            node.payload = Some(payload);
        }
        self.insert_leaf(leaf);
        self.proxy_count += 1;
        ProxyId(leaf as u32)
    }

    /// Remove a leaf and hand back its payload. `None` if `id` is not a live leaf.
    pub fn remove(&mut self, id: ProxyId) -> Option<T> {
        let leaf = id.index();
        if !self.is_live_leaf(leaf) {
            debug_assert!(false, "removing unknown proxy {leaf}");
            return None;
        }
        self.remove_leaf(leaf);
        let payload = self.nodes[leaf].payload.take();
        self.free_node(leaf);
        self.proxy_count -= 1;
        payload
    }

    /// Update a leaf for its new tight `aabb`.
    ///
    /// Returns false when the stored fat box still covers `aabb` and is not
    /// excessively large; otherwise the leaf is reinserted with bounds enlarged
    /// by the margin and stretched along `displacement`, and true is returned.
    pub fn move_proxy(&mut self, id: ProxyId, aabb: Aabb, displacement: Vec2) -> bool {
        let leaf = id.index();
        if !self.is_live_leaf(leaf) {
            debug_assert!(false, "moving unknown proxy {leaf}");
            return false;
        }

        let fat = aabb
            .expanded(self.margin)
            .swept(displacement * self.displacement_multiplier);

        let stored = self.nodes[leaf].aabb;
        if stored.contains(&aabb) {
            let huge = fat.expanded(4.0 * self.margin);
            if huge.contains(&stored) {
                return false;
            }
        }

        self.remove_leaf(leaf);
        self.nodes[leaf].aabb = fat;
        self.insert_leaf(leaf);
        tracing::trace!(proxy = leaf, "reinserted tree proxy");
        true
    }

    /// Stored (fat) box of a leaf.
    pub fn fat_aabb(&self, id: ProxyId) -> Option<Aabb> {
        let leaf = id.index();
        self.is_live_leaf(leaf).then(|| self.nodes[leaf].aabb)
    }

    pub fn payload(&self, id: ProxyId) -> Option<&T> {
        self.nodes.get(id.index()).and_then(|n| n.payload.as_ref())
    }

    pub fn payload_mut(&mut self, id: ProxyId) -> Option<&mut T> {
        self.nodes.get_mut(id.index()).and_then(|n| n.payload.as_mut())
    }

    /// Visit every leaf whose fat box overlaps `aabb`. Return false from the
    /// callback to stop early.
    pub fn query<F>(&self, aabb: &Aabb, mut callback: F)
    where
        F: FnMut(ProxyId) -> bool,
    {
        if self.root == NULL_NODE {
            return;
        }
        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !node.aabb.overlaps(aabb) {
                continue;
            }
            if node.is_leaf() {
                if !callback(ProxyId(index as u32)) {
                    return;
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    /// Iterate over every live node.
    pub fn nodes(&self) -> impl Iterator<Item = TreeNodeInfo> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.height >= 0)
            .map(|(index, n)| TreeNodeInfo {
                index,
                aabb: n.aabb,
                height: n.height as u32,
                is_leaf: n.is_leaf(),
            })
    }

    /// Largest |height(child2) - height(child1)| over all internal nodes.
    pub fn max_balance(&self) -> u32 {
        self.nodes
            .iter()
            .filter(|n| n.height > 1)
            .map(|n| (self.nodes[n.child2].height - self.nodes[n.child1].height).unsigned_abs())
            .max()
            .unwrap_or(0)
    }

    /// Summed perimeter of all nodes over the root perimeter. Lower is tighter.
    pub fn area_ratio(&self) -> f32 {
        if self.root == NULL_NODE {
            return 0.0;
        }
        let root_perimeter = self.nodes[self.root].aabb.perimeter();
        if root_perimeter <= 0.0 {
            return 0.0;
        }
        let total: f32 = self
            .nodes
            .iter()
            .filter(|n| n.height >= 0)
            .map(|n| n.aabb.perimeter())
            .sum();
        total / root_perimeter
    }

    /// Check parent links, heights, balance, containment and node accounting.
    pub fn validate(&self) -> Result<(), TreeViolation> {
        let mut reachable = 0;
        if self.root != NULL_NODE {
            if self.nodes[self.root].parent != NULL_NODE {
                return Err(TreeViolation::RootHasParent { root: self.root });
            }
            reachable = self.validate_subtree(self.root)?;
        }

        let mut free = 0;
        let mut index = self.free_list;
        while index != NULL_NODE && free <= self.nodes.len() {
            free += 1;
            index = self.nodes[index].parent;
        }

        if reachable != self.node_count || reachable + free != self.nodes.len() {
            return Err(TreeViolation::NodeCountMismatch {
                reachable,
                free,
                capacity: self.nodes.len(),
            });
        }
        Ok(())
    }

    fn validate_subtree(&self, index: usize) -> Result<usize, TreeViolation> {
        let mut count = 0;
        let mut stack = vec![index];
        while let Some(i) = stack.pop() {
            count += 1;
            let node = &self.nodes[i];
            if node.is_leaf() {
                if node.payload.is_none() || node.child2 != NULL_NODE {
                    return Err(TreeViolation::LeafHasPayloadMismatch { node: i });
                }
                if node.height != 0 {
                    return Err(TreeViolation::HeightMismatch {
                        node: i,
                        stored: node.height,
                        computed: 0,
                    });
                }
                continue;
            }
            if node.payload.is_some() {
                return Err(TreeViolation::LeafHasPayloadMismatch { node: i });
            }

            let (c1, c2) = (&self.nodes[node.child1], &self.nodes[node.child2]);
            if c1.parent != i || c2.parent != i {
                return Err(TreeViolation::ParentMismatch { node: i });
            }
            let computed = 1 + c1.height.max(c2.height);
            if node.height != computed {
                return Err(TreeViolation::HeightMismatch {
                    node: i,
                    stored: node.height,
                    computed,
                });
            }
            let balance = c2.height - c1.height;
            if balance.abs() > 1 {
                return Err(TreeViolation::Unbalanced { node: i, balance });
            }
            if !node.aabb.contains(&c1.aabb) || !node.aabb.contains(&c2.aabb) {
                return Err(TreeViolation::AabbNotContained { node: i });
            }
            stack.push(node.child1);
            stack.push(node.child2);
        }
        Ok(count)
    }

    #[inline]
    fn is_live_leaf(&self, index: usize) -> bool {
        self.nodes
            .get(index)
            .is_some_and(|n| n.height == 0 && n.payload.is_some())
    }

    /// Append `additional` free nodes, threading them onto the free list.
    fn grow(&mut self, additional: usize) {
        let start = self.nodes.len();
        let end = start + additional;
        self.nodes.reserve(additional);
        for i in start..end {
            let next = if i + 1 < end { i + 1 } else { self.free_list };
            self.nodes.push(TreeNode::free(next));
        }
        self.free_list = start;
    }

    fn allocate_node(&mut self) -> usize {
        if self.free_list == NULL_NODE {
            let additional = self.nodes.len().max(Self::INITIAL_CAPACITY);
            self.grow(additional);
        }
        let index = self.free_list;
        let node = &mut self.nodes[index];
        self.free_list = node.parent;
        node.parent = NULL_NODE;
        node.child1 = NULL_NODE;
        node.child2 = NULL_NODE;
        node.height = 0;
        node.payload = None;
        self.node_count += 1;
        index
    }

    fn free_node(&mut self, index: usize) {
        self.nodes[index] = TreeNode::free(self.free_list);
        self.free_list = index;
        self.node_count -= 1;
    }

    fn insert_leaf(&mut self, leaf: usize) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf].parent = NULL_NODE;
            return;
        }

        // Find the best sibling.
        let leaf_aabb = self.nodes[leaf].aabb;
        let mut index = self.root;
        while !self.nodes[index].is_leaf() {
            let node = &self.nodes[index];
            let (child1, child2) = (node.child1, node.child2);

            let area = node.aabb.perimeter();
            let combined_area = node.aabb.union(&leaf_aabb).perimeter();

            // Cost of pairing the leaf with this node.
            let cost = 2.0 * combined_area;
            // Minimum cost of pushing the leaf further down.
            let inheritance_cost = 2.0 * (combined_area - area);

            let cost1 = self.descend_cost(child1, &leaf_aabb) + inheritance_cost;
            let cost2 = self.descend_cost(child2, &leaf_aabb) + inheritance_cost;

            // Stopping above a tall subtree would leave the new parent unbalanced.
            if node.height <= 1 && cost < cost1 && cost < cost2 {
                break;
            }

            index = if cost1 < cost2 { child1 } else { child2 };
        }
        let sibling = index;

        // Create a new parent.
        let old_parent = self.nodes[sibling].parent;
        let new_parent = self.allocate_node();
        {
            let sibling_aabb = self.nodes[sibling].aabb;
            let sibling_height = self.nodes[sibling].height;
            let node = &mut self.nodes[new_parent];
            node.parent = old_parent;
            node.aabb = leaf_aabb.union(&sibling_aabb);
            node.height = sibling_height + 1;
            node.child1 = sibling;
            node.child2 = leaf;
        }
        self.nodes[sibling].parent = new_parent;
        self.nodes[leaf].parent = new_parent;

        if old_parent == NULL_NODE {
            self.root = new_parent;
        } else if self.nodes[old_parent].child1 == sibling {
            self.nodes[old_parent].child1 = new_parent;
        } else {
            self.nodes[old_parent].child2 = new_parent;
        }

        self.fix_upwards(self.nodes[leaf].parent);
    }

    fn descend_cost(&self, child: usize, leaf_aabb: &Aabb) -> f32 {
        let node = &self.nodes[child];
        let combined = leaf_aabb.union(&node.aabb).perimeter();
        if node.is_leaf() {
            combined
        } else {
            combined - node.aabb.perimeter()
        }
    }

    fn remove_leaf(&mut self, leaf: usize) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf].parent;
        let grand_parent = self.nodes[parent].parent;
        let sibling = if self.nodes[parent].child1 == leaf {
            self.nodes[parent].child2
        } else {
            self.nodes[parent].child1
        };

        if grand_parent == NULL_NODE {
            self.root = sibling;
            self.nodes[sibling].parent = NULL_NODE;
            self.free_node(parent);
            return;
        }

        // Splice the sibling into the grandparent slot.
        if self.nodes[grand_parent].child1 == parent {
            self.nodes[grand_parent].child1 = sibling;
        } else {
            self.nodes[grand_parent].child2 = sibling;
        }
        self.nodes[sibling].parent = grand_parent;
        self.free_node(parent);

        self.fix_upwards(grand_parent);
    }

    /// Rebalance and refit every node from `index` up to the root.
    fn fix_upwards(&mut self, mut index: usize) {
        while index != NULL_NODE {
            index = self.balance(index);

            let (child1, child2) = (self.nodes[index].child1, self.nodes[index].child2);
            let height = 1 + self.nodes[child1].height.max(self.nodes[child2].height);
            let aabb = self.nodes[child1].aabb.union(&self.nodes[child2].aabb);
            let node = &mut self.nodes[index];
            node.height = height;
            node.aabb = aabb;

            index = node.parent;
        }
    }

    /// Rotate `a` if its children differ in height by more than one.
    /// Returns the index of the subtree root after the rotation.
    fn balance(&mut self, a: usize) -> usize {
        let node_a = &self.nodes[a];
        if node_a.is_leaf() || node_a.height < 2 {
            return a;
        }

        let b = node_a.child1;
        let c = node_a.child2;
        let balance = self.nodes[c].height - self.nodes[b].height;

        if balance > 1 {
            self.rotate_up(a, c, b, false)
        } else if balance < -1 {
            self.rotate_up(a, b, c, true)
        } else {
            a
        }
    }

    /// Promote the taller child `up` of `a` into `a`'s place. `other` is the
    /// shorter child; `up_was_child1` tells which slot of `a` `up` occupied.
    fn rotate_up(&mut self, a: usize, up: usize, other: usize, up_was_child1: bool) -> usize {
        let f = self.nodes[up].child1;
        let g = self.nodes[up].child2;

        // Swap a and up.
        let a_parent = self.nodes[a].parent;
        self.nodes[up].child1 = a;
        self.nodes[up].parent = a_parent;
        self.nodes[a].parent = up;

        if a_parent == NULL_NODE {
            self.root = up;
        } else if self.nodes[a_parent].child1 == a {
            self.nodes[a_parent].child1 = up;
        } else {
            self.nodes[a_parent].child2 = up;
        }

        // Keep the taller grandchild under `up`, hand the shorter one to `a`.
        let (keep, give) = if self.nodes[f].height > self.nodes[g].height {
            (f, g)
        } else {
            (g, f)
        };
        self.nodes[up].child2 = keep;
        if up_was_child1 {
            self.nodes[a].child1 = give;
        } else {
            self.nodes[a].child2 = give;
        }
        self.nodes[give].parent = a;

        let a_aabb = self.nodes[other].aabb.union(&self.nodes[give].aabb);
        let a_height = 1 + self.nodes[other].height.max(self.nodes[give].height);
        self.nodes[a].aabb = a_aabb;
        self.nodes[a].height = a_height;

        self.nodes[up].aabb = a_aabb.union(&self.nodes[keep].aabb);
        self.nodes[up].height = 1 + a_height.max(self.nodes[keep].height);

        up
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn unit_box(x: f32, y: f32) -> Aabb {
        Aabb::from_center_half_extents(Vec2::new(x, y), Vec2::splat(0.5))
    }

    fn collect(tree: &DynamicTree<u32>, aabb: &Aabb) -> Vec<u32> {
        let mut hits = Vec::new();
        tree.query(aabb, |id| {
            hits.push(*tree.payload(id).unwrap());
            true
        });
        hits.sort_unstable();
        hits
    }

    #[test]
    fn test_insert_and_query() {
        let mut tree = DynamicTree::new(0.1, 4.0);
        for i in 0..10u32 {
            tree.insert(i, unit_box(i as f32 * 3.0, 0.0));
        }
        assert_eq!(tree.proxy_count(), 10);
        assert_eq!(tree.node_count(), 19);
        assert!(tree.validate().is_ok(), "{:?}", tree.validate());

        assert_eq!(collect(&tree, &unit_box(6.0, 0.0)), vec![2]);
        assert_eq!(
            collect(&tree, &Aabb::new(Vec2::new(-1.0, -1.0), Vec2::new(7.0, 1.0))),
            vec![0, 1, 2]
        );
        assert!(collect(&tree, &unit_box(0.0, 10.0)).is_empty());
    }

    #[test]
    fn test_leaf_is_fattened_by_margin() {
        let mut tree = DynamicTree::new(0.25, 4.0);
        let id = tree.insert(7u32, unit_box(0.0, 0.0));
        let fat = tree.fat_aabb(id).unwrap();
        assert!((fat.min - Vec2::splat(-0.75)).length() < 1e-6);
        assert!((fat.max - Vec2::splat(0.75)).length() < 1e-6);
        assert_eq!(tree.payload(id), Some(&7));
    }

    #[test]
    fn test_query_stops_early() {
        let mut tree = DynamicTree::new(0.1, 4.0);
        for i in 0..8u32 {
            tree.insert(i, unit_box(0.0, 0.0));
        }
        let mut visits = 0;
        tree.query(&unit_box(0.0, 0.0), |_| {
            visits += 1;
            false
        });
        assert_eq!(visits, 1);
    }

    #[test]
    fn test_remove_returns_payload_and_recycles_nodes() {
        let mut tree = DynamicTree::new(0.1, 4.0);
        let ids: Vec<_> = (0..5u32).map(|i| tree.insert(i, unit_box(i as f32, 0.0))).collect();
        assert_eq!(tree.remove(ids[2]), Some(2));
        assert_eq!(tree.proxy_count(), 4);
        assert!(tree.validate().is_ok());
        assert!(!collect(&tree, &unit_box(2.0, 0.0)).contains(&2));

        for id in [ids[0], ids[1], ids[3], ids[4]] {
            tree.remove(id);
        }
        assert!(tree.is_empty());
        assert_eq!(tree.node_count(), 0);
        assert_eq!(tree.height(), 0);
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn test_capacity_doubles() {
        let mut tree = DynamicTree::new(0.1, 4.0);
        assert_eq!(tree.capacity(), 16);
        for i in 0..9u32 {
            tree.insert(i, unit_box(i as f32, 0.0));
        }
        // 9 leaves + 8 internal nodes.
        assert_eq!(tree.capacity(), 32);
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn test_small_move_keeps_fat_box() {
        let mut tree = DynamicTree::new(0.1, 4.0);
        let id = tree.insert(0u32, unit_box(0.0, 0.0));
        let before = tree.fat_aabb(id).unwrap();

        assert!(!tree.move_proxy(id, unit_box(0.05, 0.0), Vec2::new(0.05, 0.0)));
        assert_eq!(tree.fat_aabb(id), Some(before));
    }

    #[test]
    fn test_large_move_reinserts_with_prediction() {
        let mut tree = DynamicTree::new(0.1, 4.0);
        let id = tree.insert(0u32, unit_box(0.0, 0.0));
        tree.insert(1u32, unit_box(5.0, 5.0));

        let moved = unit_box(1.0, 0.0);
        assert!(tree.move_proxy(id, moved, Vec2::new(1.0, 0.0)));
        let fat = tree.fat_aabb(id).unwrap();
        assert!(fat.contains(&moved));
        // Stretched by 4 * displacement on the side of motion only.
        assert!((fat.max.x - (1.5 + 0.1 + 4.0)).abs() < 1e-5);
        assert!((fat.min.x - (0.5 - 0.1)).abs() < 1e-5);
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn test_oversized_fat_box_is_shrunk() {
        let mut tree = DynamicTree::new(0.1, 4.0);
        let id = tree.insert(0u32, unit_box(0.0, 0.0));
        // Fly fast, then stop: the predicted box is far larger than needed.
        tree.move_proxy(id, unit_box(1.0, 0.0), Vec2::new(1.0, 0.0));
        assert!(tree.move_proxy(id, unit_box(1.0, 0.0), Vec2::ZERO));
        let fat = tree.fat_aabb(id).unwrap();
        assert!((fat.max.x - 1.6).abs() < 1e-5);
    }

    #[test]
    fn test_sorted_inserts_stay_balanced() {
        let mut tree = DynamicTree::new(0.0, 4.0);
        for i in 0..256u32 {
            tree.insert(i, unit_box(i as f32 * 2.0, 0.0));
        }
        assert!(tree.validate().is_ok(), "{:?}", tree.validate());
        assert!(tree.max_balance() <= 1);
        // A balanced tree of 256 leaves has height 8; AVL allows ~1.44 log2 n.
        assert!(tree.height() <= 12, "tree too tall: {}", tree.height());
        assert!(tree.area_ratio() > 1.0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Insert(f32, f32, f32, f32),
        Remove(usize),
        Move(usize, f32, f32),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (-50.0f32..50.0, -50.0f32..50.0, 0.1f32..4.0, 0.1f32..4.0)
                .prop_map(|(x, y, w, h)| Op::Insert(x, y, w, h)),
            any::<usize>().prop_map(Op::Remove),
            (any::<usize>(), -3.0f32..3.0, -3.0f32..3.0).prop_map(|(i, dx, dy)| Op::Move(i, dx, dy)),
        ]
    }

    proptest! {
        #[test]
        fn test_invariants_hold_under_churn(ops in prop::collection::vec(op_strategy(), 1..200)) {
            let mut tree = DynamicTree::new(0.1, 4.0);
            let mut live: Vec<(ProxyId, Aabb)> = Vec::new();

            for op in ops {
                match op {
                    Op::Insert(x, y, w, h) => {
                        let aabb = Aabb::from_center_half_extents(Vec2::new(x, y), Vec2::new(w, h));
                        let id = tree.insert(live.len() as u32, aabb);
                        live.push((id, aabb));
                    }
                    Op::Remove(i) if !live.is_empty() => {
                        let (id, _) = live.swap_remove(i % live.len());
                        prop_assert!(tree.remove(id).is_some());
                    }
                    Op::Move(i, dx, dy) if !live.is_empty() => {
                        let slot = i % live.len();
                        let (id, aabb) = live[slot];
                        let d = Vec2::new(dx, dy);
                        let moved = Aabb::new(aabb.min + d, aabb.max + d);
                        tree.move_proxy(id, moved, d);
                        live[slot].1 = moved;
                    }
                    _ => {}
                }

                prop_assert_eq!(tree.validate(), Ok(()));
                prop_assert!(tree.max_balance() <= 1);
                prop_assert_eq!(tree.proxy_count(), live.len());
            }

            // Every leaf's fat box covers its tight box and queries find it.
            for (id, aabb) in &live {
                let fat = tree.fat_aabb(*id).unwrap();
                prop_assert!(fat.contains(aabb));
                let mut found = false;
                tree.query(aabb, |hit| {
                    found |= hit == *id;
                    !found
                });
                prop_assert!(found);
            }
        }
    }
}

//! Dynamic AABB tree used by the broad phase and the scene queries.
//!
//! Nodes live in a dense array with a free list; leaves are proxies. The
//! tree self-balances with grand-child rotations during insertion and can
//! be rebuilt bottom-up when incremental updates degrade it.

use glam::Vec2;

use crate::{
    collision::{aabb::Aabb, RayCastInput},
    config::AABB_MARGIN,
};

pub const NULL_NODE: usize = usize::MAX;

/// Displacement multiplier for the predictive fat AABB.
const AABB_VELOCITY_SCALE: f32 = 4.0;

/// Child-area ratio above which a subtree is considered degraded.
const REBUILD_AREA_RATIO: f32 = 1.7;

#[derive(Debug, Clone, Copy)]
struct TreeNode {
    aabb: Aabb,
    category: u64,
    /// Parent link, reused as the next-free link while on the free list.
    parent: usize,
    child1: usize,
    child2: usize,
    /// -1 while free, 0 for leaves.
    height: i32,
    user_data: u64,
}

impl TreeNode {
    fn new_free(next: usize) -> Self {
        Self {
            aabb: Aabb::default(),
            category: 0,
            parent: next,
            child1: NULL_NODE,
            child2: NULL_NODE,
            height: -1,
            user_data: 0,
        }
    }

    fn is_leaf(&self) -> bool {
        self.child1 == NULL_NODE
    }
}

/// Traversal statistics reported by every query.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeStats {
    pub node_visits: usize,
    pub leaf_visits: usize,
}

/// Dynamic bounding-volume hierarchy over fat AABB proxies.
pub struct DynamicTree {
    nodes: Vec<TreeNode>,
    root: usize,
    free_list: usize,
    proxy_count: usize,
}

impl Default for DynamicTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicTree {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: NULL_NODE,
            free_list: NULL_NODE,
            proxy_count: 0,
        }
    }

    pub fn proxy_count(&self) -> usize {
        self.proxy_count
    }

    pub fn height(&self) -> i32 {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root].height
        }
    }

    /// Sum of internal node perimeters over the root perimeter. A packed
    /// tree stays near 1; chains blow it up.
    pub fn area_ratio(&self) -> f32 {
        if self.root == NULL_NODE {
            return 0.0;
        }
        let root_area = self.nodes[self.root].aabb.perimeter();
        if root_area < f32::EPSILON {
            return 0.0;
        }
        let mut total = 0.0;
        for node in &self.nodes {
            if node.height > 0 {
                total += node.aabb.perimeter();
            }
        }
        total / root_area
    }

    pub fn proxy_aabb(&self, proxy_id: usize) -> Aabb {
        self.nodes[proxy_id].aabb
    }

    pub fn user_data(&self, proxy_id: usize) -> u64 {
        self.nodes[proxy_id].user_data
    }

    fn allocate_node(&mut self) -> usize {
        if self.free_list == NULL_NODE {
            self.nodes.push(TreeNode::new_free(NULL_NODE));
            let id = self.nodes.len() - 1;
            self.nodes[id].parent = NULL_NODE;
            self.nodes[id].height = 0;
            return id;
        }
        let id = self.free_list;
        self.free_list = self.nodes[id].parent;
        self.nodes[id] = TreeNode::new_free(NULL_NODE);
        self.nodes[id].parent = NULL_NODE;
        self.nodes[id].height = 0;
        id
    }

    fn free_node(&mut self, id: usize) {
        self.nodes[id] = TreeNode::new_free(self.free_list);
        self.free_list = id;
    }

    /// Inserts a fat AABB leaf and returns its proxy id.
    pub fn create_proxy(&mut self, aabb: Aabb, category: u64, user_data: u64) -> usize {
        let leaf = self.allocate_node();
        self.nodes[leaf].aabb = aabb;
        self.nodes[leaf].category = category;
        self.nodes[leaf].user_data = user_data;
        self.insert_leaf(leaf);
        self.proxy_count += 1;
        leaf
    }

    pub fn destroy_proxy(&mut self, proxy_id: usize) {
        debug_assert!(self.nodes[proxy_id].is_leaf());
        self.remove_leaf(proxy_id);
        self.free_node(proxy_id);
        self.proxy_count -= 1;
    }

    /// Re-fattens and reinserts the proxy when the tight AABB escaped its
    /// stored fat AABB. Returns whether the proxy actually moved.
    pub fn move_proxy(&mut self, proxy_id: usize, tight: Aabb, displacement: Vec2) -> bool {
        debug_assert!(self.nodes[proxy_id].is_leaf());
        if self.nodes[proxy_id].aabb.contains(&tight) {
            return false;
        }

        let fat = tight
            .expand(AABB_MARGIN)
            .extend_by(AABB_VELOCITY_SCALE * displacement);

        self.remove_leaf(proxy_id);
        self.nodes[proxy_id].aabb = fat;
        self.insert_leaf(proxy_id);
        true
    }

    /// Expands the stored AABB in place, growing ancestors as needed. The
    /// caller already applied its margin; no reinsertion happens here.
    pub fn enlarge_proxy(&mut self, proxy_id: usize, aabb: Aabb) -> bool {
        debug_assert!(self.nodes[proxy_id].is_leaf());
        if self.nodes[proxy_id].aabb.contains(&aabb) {
            return false;
        }

        self.nodes[proxy_id].aabb = Aabb::union(self.nodes[proxy_id].aabb, aabb);
        let mut index = self.nodes[proxy_id].parent;
        while index != NULL_NODE {
            if self.nodes[index].aabb.contains(&aabb) {
                break;
            }
            self.nodes[index].aabb = Aabb::union(self.nodes[index].aabb, aabb);
            index = self.nodes[index].parent;
        }
        true
    }

    /// SAH descent for the cheapest sibling of a new leaf. Ties pick the
    /// first child so insertion order fully determines the tree.
    fn find_best_sibling(&self, leaf_aabb: Aabb) -> usize {
        let mut index = self.root;
        while !self.nodes[index].is_leaf() {
            let node = &self.nodes[index];
            let area = node.aabb.perimeter();
            let combined_area = Aabb::union(node.aabb, leaf_aabb).perimeter();

            // Cost of pairing the leaf with this whole subtree.
            let cost = 2.0 * combined_area;
            // Growth every descendant insertion inherits.
            let inheritance = 2.0 * (combined_area - area);

            let child_cost = |child: usize| -> f32 {
                let child_node = &self.nodes[child];
                let union_area = Aabb::union(child_node.aabb, leaf_aabb).perimeter();
                if child_node.is_leaf() {
                    union_area + inheritance
                } else {
                    union_area - child_node.aabb.perimeter() + inheritance
                }
            };

            let cost1 = child_cost(node.child1);
            let cost2 = child_cost(node.child2);

            if cost < cost1 && cost < cost2 {
                break;
            }
            index = if cost1 <= cost2 { node.child1 } else { node.child2 };
        }
        index
    }

    fn insert_leaf(&mut self, leaf: usize) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf].parent = NULL_NODE;
            return;
        }

        let leaf_aabb = self.nodes[leaf].aabb;
        let sibling = self.find_best_sibling(leaf_aabb);

        let old_parent = self.nodes[sibling].parent;
        let new_parent = self.allocate_node();
        self.nodes[new_parent].parent = old_parent;
        self.nodes[new_parent].aabb = Aabb::union(leaf_aabb, self.nodes[sibling].aabb);
        self.nodes[new_parent].category = self.nodes[leaf].category | self.nodes[sibling].category;
        self.nodes[new_parent].height = self.nodes[sibling].height + 1;
        self.nodes[new_parent].child1 = sibling;
        self.nodes[new_parent].child2 = leaf;
        self.nodes[sibling].parent = new_parent;
        self.nodes[leaf].parent = new_parent;

        if old_parent == NULL_NODE {
            self.root = new_parent;
        } else if self.nodes[old_parent].child1 == sibling {
            self.nodes[old_parent].child1 = new_parent;
        } else {
            self.nodes[old_parent].child2 = new_parent;
        }

        self.refit_upward(self.nodes[leaf].parent);
    }

    fn remove_leaf(&mut self, leaf: usize) {
        if self.root == leaf {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf].parent;
        let grandparent = self.nodes[parent].parent;
        let sibling = if self.nodes[parent].child1 == leaf {
            self.nodes[parent].child2
        } else {
            self.nodes[parent].child1
        };

        if grandparent == NULL_NODE {
            self.root = sibling;
            self.nodes[sibling].parent = NULL_NODE;
        } else {
            if self.nodes[grandparent].child1 == parent {
                self.nodes[grandparent].child1 = sibling;
            } else {
                self.nodes[grandparent].child2 = sibling;
            }
            self.nodes[sibling].parent = grandparent;
        }
        self.free_node(parent);
        self.refit_upward(grandparent);
    }

    /// Refits AABBs, heights, and categories along the path to the root,
    /// rotating as it goes.
    fn refit_upward(&mut self, mut index: usize) {
        while index != NULL_NODE {
            let c1 = self.nodes[index].child1;
            let c2 = self.nodes[index].child2;
            self.nodes[index].aabb = Aabb::union(self.nodes[c1].aabb, self.nodes[c2].aabb);
            self.nodes[index].category = self.nodes[c1].category | self.nodes[c2].category;
            self.nodes[index].height = 1 + self.nodes[c1].height.max(self.nodes[c2].height);

            self.rotate(index);
            index = self.nodes[index].parent;
        }
    }

    /// Considers the four grand-child swaps under `a` and applies the one
    /// that shrinks the rebuilt sibling's area the most.
    fn rotate(&mut self, a: usize) {
        if self.nodes[a].height < 2 {
            return;
        }

        let b = self.nodes[a].child1;
        let c = self.nodes[a].child2;
        let area_b = self.nodes[b].aabb.perimeter();
        let area_c = self.nodes[c].aabb.perimeter();

        // (gain, promoted grandchild, demoted child, kept grandchild)
        let mut best: Option<(f32, usize, usize, usize)> = None;
        let mut consider = |gain: f32, promoted: usize, demoted: usize, kept: usize| {
            if gain > 0.0 && best.map_or(true, |(g, ..)| gain > g) {
                best = Some((gain, promoted, demoted, kept));
            }
        };

        if !self.nodes[c].is_leaf() {
            let f = self.nodes[c].child1;
            let g = self.nodes[c].child2;
            consider(
                area_c - Aabb::union(self.nodes[b].aabb, self.nodes[g].aabb).perimeter(),
                f,
                b,
                g,
            );
            consider(
                area_c - Aabb::union(self.nodes[b].aabb, self.nodes[f].aabb).perimeter(),
                g,
                b,
                f,
            );
        }
        if !self.nodes[b].is_leaf() {
            let d = self.nodes[b].child1;
            let e = self.nodes[b].child2;
            consider(
                area_b - Aabb::union(self.nodes[c].aabb, self.nodes[e].aabb).perimeter(),
                d,
                c,
                e,
            );
            consider(
                area_b - Aabb::union(self.nodes[c].aabb, self.nodes[d].aabb).perimeter(),
                e,
                c,
                d,
            );
        }

        let Some((_, promoted, demoted, kept)) = best else {
            return;
        };

        // The promoted grandchild takes the demoted child's slot under `a`;
        // the demoted child drops into the promoted one's old parent.
        let old_parent = self.nodes[promoted].parent;
        if self.nodes[a].child1 == demoted {
            self.nodes[a].child1 = promoted;
        } else {
            self.nodes[a].child2 = promoted;
        }
        self.nodes[promoted].parent = a;

        if self.nodes[old_parent].child1 == kept {
            self.nodes[old_parent].child2 = demoted;
        } else {
            self.nodes[old_parent].child1 = demoted;
        }
        self.nodes[demoted].parent = old_parent;

        self.nodes[old_parent].aabb =
            Aabb::union(self.nodes[demoted].aabb, self.nodes[kept].aabb);
        self.nodes[old_parent].category =
            self.nodes[demoted].category | self.nodes[kept].category;
        self.nodes[old_parent].height =
            1 + self.nodes[demoted].height.max(self.nodes[kept].height);

        let c1 = self.nodes[a].child1;
        let c2 = self.nodes[a].child2;
        self.nodes[a].height = 1 + self.nodes[c1].height.max(self.nodes[c2].height);
    }

    /// Visits every leaf overlapping `aabb` whose category intersects
    /// `mask`. Traversal continues while the callback returns `true`.
    pub fn query(
        &self,
        aabb: Aabb,
        mask: u64,
        callback: &mut dyn FnMut(usize, u64) -> bool,
    ) -> TreeStats {
        let mut stats = TreeStats::default();
        if self.root == NULL_NODE {
            return stats;
        }

        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            stats.node_visits += 1;
            let node = &self.nodes[index];
            if node.category & mask == 0 || !Aabb::overlaps(&node.aabb, &aabb) {
                continue;
            }
            if node.is_leaf() {
                stats.leaf_visits += 1;
                if !callback(index, node.user_data) {
                    break;
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
        stats
    }

    /// Ray cast with slab-test pruning. The callback returns the new
    /// maximum fraction: zero terminates, a negative value skips the leaf.
    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        mask: u64,
        callback: &mut dyn FnMut(&RayCastInput, usize, u64) -> f32,
    ) -> TreeStats {
        let mut stats = TreeStats::default();
        if self.root == NULL_NODE {
            return stats;
        }

        let origin = input.origin;
        let translation = input.translation;
        let mut max_fraction = input.max_fraction;

        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            stats.node_visits += 1;
            let node = &self.nodes[index];
            if node.category & mask == 0
                || !node.aabb.intersects_ray(origin, translation, max_fraction)
            {
                continue;
            }

            if node.is_leaf() {
                stats.leaf_visits += 1;
                let sub_input = RayCastInput {
                    origin,
                    translation,
                    max_fraction,
                };
                let value = callback(&sub_input, index, node.user_data);
                if value == 0.0 {
                    break;
                }
                if value > 0.0 {
                    max_fraction = value.min(max_fraction);
                }
            } else {
                // Visit the near child first: the stack is LIFO, push far
                // first.
                let c1 = node.child1;
                let c2 = node.child2;
                let d1 = (self.nodes[c1].aabb.center() - origin).dot(translation);
                let d2 = (self.nodes[c2].aabb.center() - origin).dot(translation);
                if d1 <= d2 {
                    stack.push(c2);
                    stack.push(c1);
                } else {
                    stack.push(c1);
                    stack.push(c2);
                }
            }
        }
        stats
    }

    /// Casts a proxy-sized box along a translation. Node tests inflate the
    /// node AABB by the proxy extents and slab-test the center line.
    pub fn shape_cast(
        &self,
        proxy_aabb: Aabb,
        translation: Vec2,
        mask: u64,
        callback: &mut dyn FnMut(usize, u64) -> f32,
    ) -> TreeStats {
        let mut stats = TreeStats::default();
        if self.root == NULL_NODE {
            return stats;
        }

        let extents = proxy_aabb.extents();
        let origin = proxy_aabb.center();
        let mut max_fraction = 1.0_f32;

        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            stats.node_visits += 1;
            let node = &self.nodes[index];
            let inflated = node.aabb.expand_vec(extents);
            if node.category & mask == 0
                || !inflated.intersects_ray(origin, translation, max_fraction)
            {
                continue;
            }

            if node.is_leaf() {
                stats.leaf_visits += 1;
                let value = callback(index, node.user_data);
                if value == 0.0 {
                    break;
                }
                if value > 0.0 {
                    max_fraction = value.min(max_fraction);
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
        stats
    }

    /// Rebuilds degraded subtrees (or the whole tree) bottom-up by greedy
    /// nearest-pair merging. Returns the number of leaves rebuilt.
    pub fn rebuild(&mut self, full: bool) -> usize {
        if self.root == NULL_NODE {
            return 0;
        }

        let roots: Vec<usize> = if full {
            vec![self.root]
        } else {
            self.collect_degraded_roots()
        };

        let mut rebuilt = 0;
        for subtree in roots {
            // The subtree may have been freed by an earlier rebuild pass.
            if self.nodes[subtree].height < 2 {
                continue;
            }
            rebuilt += self.rebuild_subtree(subtree);
        }
        rebuilt
    }

    fn collect_degraded_roots(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if node.height < 2 {
                continue;
            }
            let area = node.aabb.perimeter();
            let child_area = self.nodes[node.child1].aabb.perimeter()
                + self.nodes[node.child2].aabb.perimeter();
            if area > f32::EPSILON && child_area / area > REBUILD_AREA_RATIO {
                out.push(index);
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
        out
    }

    fn rebuild_subtree(&mut self, subtree: usize) -> usize {
        // Gather leaves and free the internal nodes.
        let mut leaves = Vec::new();
        let mut stack = vec![subtree];
        while let Some(index) = stack.pop() {
            if self.nodes[index].is_leaf() {
                leaves.push(index);
            } else {
                stack.push(self.nodes[index].child1);
                stack.push(self.nodes[index].child2);
                if index != subtree {
                    self.free_node(index);
                }
            }
        }

        let leaf_count = leaves.len();
        debug_assert!(leaf_count >= 2);

        // Greedy bottom-up: repeatedly merge the pair with the smallest
        // union perimeter.
        let mut groups = leaves;
        while groups.len() > 2 {
            let mut best = (0, 1);
            let mut best_area = f32::MAX;
            for i in 0..groups.len() {
                for j in i + 1..groups.len() {
                    let area =
                        Aabb::union(self.nodes[groups[i]].aabb, self.nodes[groups[j]].aabb)
                            .perimeter();
                    if area < best_area {
                        best_area = area;
                        best = (i, j);
                    }
                }
            }

            let (i, j) = best;
            let parent = self.allocate_node();
            let (gi, gj) = (groups[i], groups[j]);
            self.nodes[parent].child1 = gi;
            self.nodes[parent].child2 = gj;
            self.nodes[parent].aabb = Aabb::union(self.nodes[gi].aabb, self.nodes[gj].aabb);
            self.nodes[parent].category = self.nodes[gi].category | self.nodes[gj].category;
            self.nodes[parent].height = 1 + self.nodes[gi].height.max(self.nodes[gj].height);
            self.nodes[gi].parent = parent;
            self.nodes[gj].parent = parent;

            groups.swap_remove(j);
            groups[i] = parent;
        }

        // Reuse the original subtree root for the final pair.
        let (g1, g2) = (groups[0], groups[1]);
        self.nodes[subtree].child1 = g1;
        self.nodes[subtree].child2 = g2;
        self.nodes[subtree].aabb = Aabb::union(self.nodes[g1].aabb, self.nodes[g2].aabb);
        self.nodes[subtree].category = self.nodes[g1].category | self.nodes[g2].category;
        self.nodes[subtree].height = 1 + self.nodes[g1].height.max(self.nodes[g2].height);
        self.nodes[g1].parent = subtree;
        self.nodes[g2].parent = subtree;

        let mut index = self.nodes[subtree].parent;
        while index != NULL_NODE {
            let c1 = self.nodes[index].child1;
            let c2 = self.nodes[index].child2;
            self.nodes[index].aabb = Aabb::union(self.nodes[c1].aabb, self.nodes[c2].aabb);
            self.nodes[index].height = 1 + self.nodes[c1].height.max(self.nodes[c2].height);
            index = self.nodes[index].parent;
        }

        leaf_count
    }

    /// Structural validation. Checks parent links, child containment,
    /// height consistency, and leaf reachability.
    pub fn validate(&self) {
        if self.root == NULL_NODE {
            assert_eq!(self.proxy_count, 0);
            return;
        }
        assert_eq!(self.nodes[self.root].parent, NULL_NODE);

        let mut leaves = 0;
        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if node.is_leaf() {
                assert_eq!(node.height, 0);
                assert_eq!(node.child2, NULL_NODE);
                leaves += 1;
                continue;
            }

            let c1 = node.child1;
            let c2 = node.child2;
            assert_eq!(self.nodes[c1].parent, index);
            assert_eq!(self.nodes[c2].parent, index);
            assert!(node.aabb.contains(&self.nodes[c1].aabb));
            assert!(node.aabb.contains(&self.nodes[c2].aabb));
            assert_eq!(
                node.height,
                1 + self.nodes[c1].height.max(self.nodes[c2].height)
            );
            assert_eq!(node.category, self.nodes[c1].category | self.nodes[c2].category);
            stack.push(c1);
            stack.push(c2);
        }
        assert_eq!(leaves, self.proxy_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box(x: f32, y: f32) -> Aabb {
        Aabb::new(Vec2::new(x, y), Vec2::new(x + 1.0, y + 1.0))
    }

    #[test]
    fn insert_move_remove_keeps_tree_valid() {
        let mut tree = DynamicTree::new();
        let mut proxies = Vec::new();
        for i in 0..32 {
            let x = (i % 8) as f32 * 2.0;
            let y = (i / 8) as f32 * 2.0;
            proxies.push(tree.create_proxy(unit_box(x, y), 1, i as u64));
        }
        tree.validate();

        for (i, &p) in proxies.iter().enumerate() {
            let moved = tree.move_proxy(p, unit_box(i as f32 * 0.5, 40.0), Vec2::ZERO);
            assert!(moved);
        }
        tree.validate();

        for &p in &proxies {
            tree.destroy_proxy(p);
        }
        tree.validate();
        assert_eq!(tree.proxy_count(), 0);
    }

    #[test]
    fn move_inside_fat_aabb_is_a_no_op() {
        let mut tree = DynamicTree::new();
        let p = tree.create_proxy(unit_box(0.0, 0.0).expand(AABB_MARGIN), 1, 0);
        assert!(!tree.move_proxy(p, unit_box(0.0, 0.0), Vec2::ZERO));
    }

    #[test]
    fn query_finds_overlapping_leaves_and_respects_mask() {
        let mut tree = DynamicTree::new();
        tree.create_proxy(unit_box(0.0, 0.0), 0b01, 1);
        tree.create_proxy(unit_box(10.0, 0.0), 0b10, 2);

        let mut found = Vec::new();
        let stats = tree.query(
            Aabb::new(Vec2::new(-5.0, -5.0), Vec2::new(15.0, 5.0)),
            0b01,
            &mut |_, user_data| {
                found.push(user_data);
                true
            },
        );
        assert_eq!(found, vec![1]);
        assert!(stats.node_visits > 0);
    }

    #[test]
    fn ray_cast_visits_near_leaf_first() {
        let mut tree = DynamicTree::new();
        tree.create_proxy(unit_box(2.0, -0.5), 1, 1);
        tree.create_proxy(unit_box(6.0, -0.5), 1, 2);

        let mut order = Vec::new();
        tree.ray_cast(
            &RayCastInput {
                origin: Vec2::new(0.0, 0.0),
                translation: Vec2::new(10.0, 0.0),
                max_fraction: 1.0,
            },
            u64::MAX,
            &mut |input, _, user_data| {
                order.push(user_data);
                input.max_fraction
            },
        );
        assert_eq!(order, vec![1, 2]);
    }

    #[test]
    fn rebuild_restores_bounded_area_ratio() {
        let mut tree = DynamicTree::new();
        // Sorted insertion produces a lopsided tree.
        for i in 0..64 {
            tree.create_proxy(unit_box(i as f32 * 1.5, 0.0), 1, i as u64);
        }
        let rebuilt = tree.rebuild(true);
        assert_eq!(rebuilt, 64);
        tree.validate();
        assert!(tree.height() <= 12);
        assert!(tree.area_ratio() < 6.0);
    }

    #[test]
    fn round_trip_insert_remove_restores_structure() {
        let mut tree = DynamicTree::new();
        let a = tree.create_proxy(unit_box(0.0, 0.0), 1, 1);
        let b = tree.create_proxy(unit_box(3.0, 0.0), 1, 2);

        let before_a = tree.proxy_aabb(a);
        let before_b = tree.proxy_aabb(b);
        let height_before = tree.height();

        let c = tree.create_proxy(unit_box(6.0, 0.0), 1, 3);
        tree.destroy_proxy(c);

        assert_eq!(tree.proxy_aabb(a), before_a);
        assert_eq!(tree.proxy_aabb(b), before_b);
        assert_eq!(tree.height(), height_before);
        tree.validate();
    }
}

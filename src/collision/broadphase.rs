//! Broad phase: proxy bookkeeping on top of the dynamic tree and
//! incremental pair discovery from the per-step move buffer.

use std::collections::HashSet;

use glam::Vec2;

use crate::{
    collision::{aabb::Aabb, bvh::DynamicTree},
    config::AABB_MARGIN,
    core::{
        body::{Body, BodyType},
        shape::Shape,
        types::CollisionFilter,
    },
    dynamics::joints::Joint,
    utils::{
        allocator::{Arena, EntityId},
        bitset::BitSet,
    },
};

/// Per-pair veto callback, worker-safe and free of world access.
pub type CustomFilterFn = dyn Fn(EntityId, EntityId) -> bool + Send + Sync;

/// Broad-phase driver. Owns the AABB tree, the buffer of proxies moved
/// since the last step, and the set of currently overlapping pairs.
pub struct BroadPhase {
    pub tree: DynamicTree,
    moved: Vec<usize>,
    moved_bits: BitSet,
    pair_set: HashSet<u64>,
}

impl Default for BroadPhase {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadPhase {
    pub fn new() -> Self {
        Self {
            tree: DynamicTree::new(),
            moved: Vec::new(),
            moved_bits: BitSet::new(),
            pair_set: HashSet::new(),
        }
    }

    fn pair_key(a: usize, b: usize) -> u64 {
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        ((hi as u64) << 32) | lo as u64
    }

    pub fn create_proxy(&mut self, tight: Aabb, category: u64, shape_id: EntityId) -> usize {
        let proxy = self
            .tree
            .create_proxy(tight.expand(AABB_MARGIN), category, shape_id.to_bits());
        self.buffer_move(proxy);
        proxy
    }

    pub fn destroy_proxy(&mut self, proxy: usize) {
        self.moved_bits.unset(proxy);
        self.moved.retain(|&p| p != proxy);
        self.tree.destroy_proxy(proxy);
    }

    /// Updates a proxy for a new tight AABB, queueing it for pair discovery
    /// when its fat AABB actually changed.
    pub fn move_proxy(&mut self, proxy: usize, tight: Aabb, displacement: Vec2) {
        if self.tree.move_proxy(proxy, tight, displacement) {
            self.buffer_move(proxy);
        }
    }

    /// Grows a proxy in place; the caller already applied its margin.
    pub fn enlarge_proxy(&mut self, proxy: usize, fat: Aabb) {
        if self.tree.enlarge_proxy(proxy, fat) {
            self.buffer_move(proxy);
        }
    }

    pub fn buffer_move(&mut self, proxy: usize) {
        if !self.moved_bits.test(proxy) {
            self.moved_bits.set(proxy);
            self.moved.push(proxy);
        }
    }

    pub fn fat_aabb(&self, proxy: usize) -> Aabb {
        self.tree.proxy_aabb(proxy)
    }

    /// Forgets a pair so a later overlap reports it again. Called when the
    /// world destroys the pair's contact.
    pub fn unpair(&mut self, proxy_a: usize, proxy_b: usize) {
        self.pair_set.remove(&Self::pair_key(proxy_a, proxy_b));
    }

    pub fn pair_count(&self) -> usize {
        self.pair_set.len()
    }

    /// Drains the move buffer and returns newly overlapping shape pairs
    /// that pass filtering, registering them in the pair set.
    pub fn update_pairs(
        &mut self,
        shapes: &Arena<Shape>,
        bodies: &Arena<Body>,
        joints: &Arena<Joint>,
        custom_filter: Option<&CustomFilterFn>,
    ) -> Vec<(EntityId, EntityId)> {
        let mut new_pairs = Vec::new();

        for i in 0..self.moved.len() {
            let proxy = self.moved[i];
            let shape_id = EntityId::from_bits(self.tree.user_data(proxy));
            let Some(shape) = shapes.get(shape_id) else {
                continue;
            };
            let Some(body) = bodies.get(shape.body_id) else {
                continue;
            };
            let fat = self.tree.proxy_aabb(proxy);

            let mut candidates: Vec<usize> = Vec::new();
            self.tree.query(fat, shape.filter.mask, &mut |other, _| {
                if other != proxy {
                    candidates.push(other);
                }
                true
            });

            for other in candidates {
                // When both proxies moved, only the lower id reports the pair.
                if self.moved_bits.test(other) && other < proxy {
                    continue;
                }

                let other_shape_id = EntityId::from_bits(self.tree.user_data(other));
                let Some(other_shape) = shapes.get(other_shape_id) else {
                    continue;
                };
                if other_shape.body_id == shape.body_id {
                    continue;
                }
                let Some(other_body) = bodies.get(other_shape.body_id) else {
                    continue;
                };

                if !CollisionFilter::should_collide(&shape.filter, &other_shape.filter) {
                    continue;
                }

                // Joints may suppress collision between their bodies. The
                // pair is not recorded, so it re-reports once the joint is
                // gone.
                let other_body_id = other_shape.body_id;
                let suppressed = body.joints.iter().any(|&joint_id| {
                    joints.get(joint_id).is_some_and(|joint| {
                        !joint.collide_connected
                            && (joint.body_a == other_body_id || joint.body_b == other_body_id)
                    })
                });
                if suppressed {
                    continue;
                }

                // At least one side must be dynamic unless a sensor is watching.
                let any_dynamic = body.body_type == BodyType::Dynamic
                    || other_body.body_type == BodyType::Dynamic;
                let any_sensor = shape.is_sensor || other_shape.is_sensor;
                if !any_dynamic && !any_sensor {
                    continue;
                }
                if shape.is_sensor && other_shape.is_sensor {
                    continue;
                }

                let key = Self::pair_key(proxy, other);
                if self.pair_set.contains(&key) {
                    continue;
                }

                if let Some(filter) = custom_filter {
                    if !filter(shape_id, other_shape_id) {
                        continue;
                    }
                }

                self.pair_set.insert(key);
                new_pairs.push((shape_id, other_shape_id));
            }
        }

        for &proxy in &self.moved {
            self.moved_bits.unset(proxy);
        }
        self.moved.clear();

        new_pairs
    }
}

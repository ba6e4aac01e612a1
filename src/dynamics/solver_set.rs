//! Solver sets: the partitions bodies, contacts, and joints live in.
//!
//! Set 0 holds statics, set 1 disabled entities, set 2 the awake
//! simulation, and every set from 3 up is one sleeping island. Records
//! stay in their arenas; sets track membership as id lists with
//! back-pointer slots so migration is a swap-remove plus one fixup.

use crate::{
    collision::contact::Contact,
    core::body::Body,
    dynamics::joints::Joint,
    utils::allocator::{Arena, EntityId},
};

pub const STATIC_SET: usize = 0;
pub const DISABLED_SET: usize = 1;
pub const AWAKE_SET: usize = 2;
pub const FIRST_SLEEPING_SET: usize = 3;

/// One partition of the world.
#[derive(Debug, Default)]
pub struct SolverSet {
    pub body_ids: Vec<EntityId>,
    pub contact_ids: Vec<EntityId>,
    pub joint_ids: Vec<EntityId>,
    /// Owning island for sleeping sets; NULL for the built-in sets.
    pub island_id: EntityId,
    pub in_use: bool,
}

/// All solver sets plus a free list for recycled sleeping slots.
#[derive(Debug)]
pub struct SolverSets {
    sets: Vec<SolverSet>,
    free: Vec<usize>,
}

impl Default for SolverSets {
    fn default() -> Self {
        Self::new()
    }
}

impl SolverSets {
    pub fn new() -> Self {
        let mut sets = Vec::with_capacity(4);
        for _ in 0..FIRST_SLEEPING_SET {
            sets.push(SolverSet {
                in_use: true,
                ..Default::default()
            });
        }
        Self { sets, free: Vec::new() }
    }

    pub fn get(&self, index: usize) -> &SolverSet {
        &self.sets[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut SolverSet {
        &mut self.sets[index]
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn sleeping_set_count(&self) -> usize {
        self.sets[FIRST_SLEEPING_SET..]
            .iter()
            .filter(|s| s.in_use)
            .count()
    }

    pub fn alloc_sleeping_set(&mut self, island_id: EntityId) -> usize {
        let index = if let Some(index) = self.free.pop() {
            index
        } else {
            self.sets.push(SolverSet::default());
            self.sets.len() - 1
        };
        let set = &mut self.sets[index];
        set.in_use = true;
        set.island_id = island_id;
        index
    }

    pub fn free_sleeping_set(&mut self, index: usize) {
        debug_assert!(index >= FIRST_SLEEPING_SET);
        let set = &mut self.sets[index];
        debug_assert!(set.body_ids.is_empty() && set.contact_ids.is_empty() && set.joint_ids.is_empty());
        set.in_use = false;
        set.island_id = EntityId::NULL;
        self.free.push(index);
    }

    pub fn add_body(&mut self, set_index: usize, body: &mut Body) {
        let set = &mut self.sets[set_index];
        body.set_index = set_index;
        body.set_slot = set.body_ids.len();
        set.body_ids.push(body.id);
    }

    /// Swap-removes a body from its set, fixing the displaced record's
    /// back pointer.
    pub fn remove_body(&mut self, bodies: &mut Arena<Body>, body_id: EntityId) {
        let Some(body) = bodies.get(body_id) else {
            return;
        };
        let (set_index, slot) = (body.set_index, body.set_slot);
        let set = &mut self.sets[set_index];
        set.body_ids.swap_remove(slot);
        if slot < set.body_ids.len() {
            let moved = set.body_ids[slot];
            if let Some(moved_body) = bodies.get_mut(moved) {
                moved_body.set_slot = slot;
            }
        }
        if let Some(body) = bodies.get_mut(body_id) {
            body.set_index = usize::MAX;
            body.set_slot = usize::MAX;
        }
    }

    pub fn add_contact(&mut self, set_index: usize, contact: &mut Contact) {
        let set = &mut self.sets[set_index];
        contact.set_index = set_index;
        contact.set_slot = set.contact_ids.len();
        set.contact_ids.push(contact.id);
    }

    pub fn remove_contact(&mut self, contacts: &mut Arena<Contact>, contact_id: EntityId) {
        let Some(contact) = contacts.get(contact_id) else {
            return;
        };
        let (set_index, slot) = (contact.set_index, contact.set_slot);
        let set = &mut self.sets[set_index];
        set.contact_ids.swap_remove(slot);
        if slot < set.contact_ids.len() {
            let moved = set.contact_ids[slot];
            if let Some(moved_contact) = contacts.get_mut(moved) {
                moved_contact.set_slot = slot;
            }
        }
        if let Some(contact) = contacts.get_mut(contact_id) {
            contact.set_index = usize::MAX;
            contact.set_slot = usize::MAX;
        }
    }

    pub fn add_joint(&mut self, set_index: usize, joint: &mut Joint) {
        let set = &mut self.sets[set_index];
        joint.set_index = set_index;
        joint.set_slot = set.joint_ids.len();
        set.joint_ids.push(joint.id);
    }

    pub fn remove_joint(&mut self, joints: &mut Arena<Joint>, joint_id: EntityId) {
        let Some(joint) = joints.get(joint_id) else {
            return;
        };
        let (set_index, slot) = (joint.set_index, joint.set_slot);
        let set = &mut self.sets[set_index];
        set.joint_ids.swap_remove(slot);
        if slot < set.joint_ids.len() {
            let moved = set.joint_ids[slot];
            if let Some(moved_joint) = joints.get_mut(moved) {
                moved_joint.set_slot = slot;
            }
        }
        if let Some(joint) = joints.get_mut(joint_id) {
            joint.set_index = usize::MAX;
            joint.set_slot = usize::MAX;
        }
    }
}

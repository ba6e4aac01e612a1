//! Constraint graph coloring.
//!
//! Awake touching contacts and awake joints are distributed into colors
//! such that no two constraints in a color share a dynamic body, so one
//! color can be solved by parallel workers without locking. Constraints
//! that fit no color land in the overflow color and solve sequentially.

use crate::{
    collision::contact::Contact,
    config::GRAPH_COLOR_COUNT,
    dynamics::joints::Joint,
    utils::{
        allocator::{Arena, EntityId},
        bitset::BitSet,
    },
};

/// Index of the sequential overflow color.
pub const OVERFLOW_COLOR: usize = GRAPH_COLOR_COUNT;

#[derive(Debug, Default)]
pub struct GraphColor {
    pub contact_ids: Vec<EntityId>,
    pub joint_ids: Vec<EntityId>,
    /// Dynamic bodies already claimed by this color, by arena index.
    body_set: BitSet,
}

#[derive(Debug)]
pub struct ConstraintGraph {
    pub colors: Vec<GraphColor>,
}

impl Default for ConstraintGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstraintGraph {
    pub fn new() -> Self {
        let mut colors = Vec::with_capacity(GRAPH_COLOR_COUNT + 1);
        for _ in 0..=GRAPH_COLOR_COUNT {
            colors.push(GraphColor::default());
        }
        Self { colors }
    }

    /// Lowest color where neither dynamic body is represented yet; the
    /// overflow color when every regular color is blocked.
    fn find_color(&self, index_a: Option<usize>, index_b: Option<usize>) -> usize {
        for (color_index, color) in self.colors.iter().enumerate().take(GRAPH_COLOR_COUNT) {
            if index_a.is_some_and(|i| color.body_set.test(i)) {
                continue;
            }
            if index_b.is_some_and(|i| color.body_set.test(i)) {
                continue;
            }
            return color_index;
        }
        OVERFLOW_COLOR
    }

    fn claim(&mut self, color_index: usize, index_a: Option<usize>, index_b: Option<usize>) {
        if color_index == OVERFLOW_COLOR {
            return;
        }
        let color = &mut self.colors[color_index];
        if let Some(i) = index_a {
            color.body_set.set(i);
        }
        if let Some(i) = index_b {
            color.body_set.set(i);
        }
    }

    fn release(&mut self, color_index: usize, index_a: Option<usize>, index_b: Option<usize>) {
        if color_index == OVERFLOW_COLOR {
            return;
        }
        let color = &mut self.colors[color_index];
        if let Some(i) = index_a {
            color.body_set.unset(i);
        }
        if let Some(i) = index_b {
            color.body_set.unset(i);
        }
    }

    /// `index_a`/`index_b` are the bodies' arena indices when dynamic,
    /// `None` for static and kinematic bodies (they occupy no color
    /// capacity).
    pub fn add_contact(
        &mut self,
        contact: &mut Contact,
        index_a: Option<usize>,
        index_b: Option<usize>,
    ) {
        debug_assert_eq!(contact.color_index, usize::MAX);
        let color_index = self.find_color(index_a, index_b);
        self.claim(color_index, index_a, index_b);

        let color = &mut self.colors[color_index];
        contact.color_index = color_index;
        contact.color_slot = color.contact_ids.len();
        color.contact_ids.push(contact.id);
    }

    pub fn remove_contact(
        &mut self,
        contacts: &mut Arena<Contact>,
        contact_id: EntityId,
        index_a: Option<usize>,
        index_b: Option<usize>,
    ) {
        let Some(contact) = contacts.get(contact_id) else {
            return;
        };
        let (color_index, slot) = (contact.color_index, contact.color_slot);
        if color_index == usize::MAX {
            return;
        }

        self.release(color_index, index_a, index_b);

        let color = &mut self.colors[color_index];
        color.contact_ids.swap_remove(slot);
        if slot < color.contact_ids.len() {
            let moved = color.contact_ids[slot];
            if let Some(moved_contact) = contacts.get_mut(moved) {
                moved_contact.color_slot = slot;
            }
        }
        if let Some(contact) = contacts.get_mut(contact_id) {
            contact.color_index = usize::MAX;
            contact.color_slot = usize::MAX;
        }
    }

    pub fn add_joint(&mut self, joint: &mut Joint, index_a: Option<usize>, index_b: Option<usize>) {
        debug_assert_eq!(joint.color_index, usize::MAX);
        let color_index = self.find_color(index_a, index_b);
        self.claim(color_index, index_a, index_b);

        let color = &mut self.colors[color_index];
        joint.color_index = color_index;
        joint.color_slot = color.joint_ids.len();
        color.joint_ids.push(joint.id);
    }

    pub fn remove_joint(
        &mut self,
        joints: &mut Arena<Joint>,
        joint_id: EntityId,
        index_a: Option<usize>,
        index_b: Option<usize>,
    ) {
        let Some(joint) = joints.get(joint_id) else {
            return;
        };
        let (color_index, slot) = (joint.color_index, joint.color_slot);
        if color_index == usize::MAX {
            return;
        }

        self.release(color_index, index_a, index_b);

        let color = &mut self.colors[color_index];
        color.joint_ids.swap_remove(slot);
        if slot < color.joint_ids.len() {
            let moved = color.joint_ids[slot];
            if let Some(moved_joint) = joints.get_mut(moved) {
                moved_joint.color_slot = slot;
            }
        }
        if let Some(joint) = joints.get_mut(joint_id) {
            joint.color_index = usize::MAX;
            joint.color_slot = usize::MAX;
        }
    }

    /// Constraints per color, overflow last.
    pub fn color_counts(&self) -> Vec<usize> {
        self.colors
            .iter()
            .map(|c| c.contact_ids.len() + c.joint_ids.len())
            .collect()
    }
}

//! Islands: connected components of bodies linked by touching contacts
//! and joints. Islands sleep and wake as a unit.
//!
//! Members are threaded through intrusive prev/next ids stored on the
//! body, contact, and joint records; the island only keeps list heads,
//! tails, and counts. Merges splice lists and relabel the smaller side.

use crate::{
    collision::contact::Contact,
    core::body::Body,
    dynamics::joints::{Joint, JointKind},
    utils::allocator::{Arena, EntityId},
};

/// A connected component of the constraint graph.
#[derive(Debug, Clone)]
pub struct Island {
    pub id: EntityId,
    pub head_body: EntityId,
    pub tail_body: EntityId,
    pub body_count: usize,
    pub head_contact: EntityId,
    pub tail_contact: EntityId,
    pub contact_count: usize,
    pub head_joint: EntityId,
    pub tail_joint: EntityId,
    pub joint_count: usize,
    /// Constraints removed since the last split check; a non-zero count
    /// marks the island as a split candidate.
    pub constraint_remove_count: usize,
    pub set_index: usize,
}

impl Island {
    fn new(set_index: usize) -> Self {
        Self {
            id: EntityId::NULL,
            head_body: EntityId::NULL,
            tail_body: EntityId::NULL,
            body_count: 0,
            head_contact: EntityId::NULL,
            tail_contact: EntityId::NULL,
            contact_count: 0,
            head_joint: EntityId::NULL,
            tail_joint: EntityId::NULL,
            joint_count: 0,
            constraint_remove_count: 0,
            set_index,
        }
    }
}

pub fn create_island(islands: &mut Arena<Island>, set_index: usize) -> EntityId {
    let id = islands.insert(Island::new(set_index));
    if let Some(island) = islands.get_mut(id) {
        island.id = id;
    }
    id
}

pub fn destroy_island(islands: &mut Arena<Island>, island_id: EntityId) {
    if let Some(_island) = islands.remove(island_id) {
        debug_assert_eq!(_island.body_count, 0);
    }
}

/// Appends a body to an island's body list.
pub fn add_body_to_island(
    islands: &mut Arena<Island>,
    bodies: &mut Arena<Body>,
    island_id: EntityId,
    body_id: EntityId,
) {
    let Some(island) = islands.get_mut(island_id) else {
        return;
    };
    let tail = island.tail_body;
    if tail.is_null() {
        island.head_body = body_id;
    } else if let Some(tail_body) = bodies.get_mut(tail) {
        tail_body.island_next = body_id;
    }
    island.tail_body = body_id;
    island.body_count += 1;

    if let Some(body) = bodies.get_mut(body_id) {
        body.island_id = island_id;
        body.island_prev = tail;
        body.island_next = EntityId::NULL;
    }
}

pub fn remove_body_from_island(
    islands: &mut Arena<Island>,
    bodies: &mut Arena<Body>,
    body_id: EntityId,
) {
    let Some(body) = bodies.get(body_id) else {
        return;
    };
    let (island_id, prev, next) = (body.island_id, body.island_prev, body.island_next);
    if island_id.is_null() {
        return;
    }

    if let Some(prev_body) = bodies.get_mut(prev) {
        prev_body.island_next = next;
    }
    if let Some(next_body) = bodies.get_mut(next) {
        next_body.island_prev = prev;
    }
    if let Some(island) = islands.get_mut(island_id) {
        if island.head_body == body_id {
            island.head_body = next;
        }
        if island.tail_body == body_id {
            island.tail_body = prev;
        }
        island.body_count -= 1;
    }
    if let Some(body) = bodies.get_mut(body_id) {
        body.island_id = EntityId::NULL;
        body.island_prev = EntityId::NULL;
        body.island_next = EntityId::NULL;
    }
}

fn append_contact(
    islands: &mut Arena<Island>,
    contacts: &mut Arena<Contact>,
    island_id: EntityId,
    contact_id: EntityId,
) {
    let Some(island) = islands.get_mut(island_id) else {
        return;
    };
    let tail = island.tail_contact;
    if tail.is_null() {
        island.head_contact = contact_id;
    } else if let Some(tail_contact) = contacts.get_mut(tail) {
        tail_contact.island_next = contact_id;
    }
    island.tail_contact = contact_id;
    island.contact_count += 1;

    if let Some(contact) = contacts.get_mut(contact_id) {
        contact.island_id = island_id;
        contact.island_prev = tail;
        contact.island_next = EntityId::NULL;
    }
}

fn append_joint(
    islands: &mut Arena<Island>,
    joints: &mut Arena<Joint>,
    island_id: EntityId,
    joint_id: EntityId,
) {
    let Some(island) = islands.get_mut(island_id) else {
        return;
    };
    let tail = island.tail_joint;
    if tail.is_null() {
        island.head_joint = joint_id;
    } else if let Some(tail_joint) = joints.get_mut(tail) {
        tail_joint.island_next = joint_id;
    }
    island.tail_joint = joint_id;
    island.joint_count += 1;

    if let Some(joint) = joints.get_mut(joint_id) {
        joint.island_id = island_id;
        joint.island_prev = tail;
        joint.island_next = EntityId::NULL;
    }
}

/// Merges the smaller island into the larger one: relabels members,
/// splices the lists, destroys the losing record. Returns the surviving
/// island id.
fn merge_islands(
    islands: &mut Arena<Island>,
    bodies: &mut Arena<Body>,
    contacts: &mut Arena<Contact>,
    joints: &mut Arena<Joint>,
    island_a: EntityId,
    island_b: EntityId,
) -> EntityId {
    let count_a = islands.get(island_a).map_or(0, |i| i.body_count);
    let count_b = islands.get(island_b).map_or(0, |i| i.body_count);
    let (keep, absorb) = if count_a >= count_b {
        (island_a, island_b)
    } else {
        (island_b, island_a)
    };

    let Some(absorbed) = islands.get(absorb).cloned() else {
        return keep;
    };

    // Relabel all members of the absorbed island.
    let mut body_id = absorbed.head_body;
    while !body_id.is_null() {
        let body = bodies.get_mut(body_id);
        let Some(body) = body else { break };
        body.island_id = keep;
        body_id = body.island_next;
    }
    let mut contact_id = absorbed.head_contact;
    while !contact_id.is_null() {
        let Some(contact) = contacts.get_mut(contact_id) else {
            break;
        };
        contact.island_id = keep;
        contact_id = contact.island_next;
    }
    let mut joint_id = absorbed.head_joint;
    while !joint_id.is_null() {
        let Some(joint) = joints.get_mut(joint_id) else {
            break;
        };
        joint.island_id = keep;
        joint_id = joint.island_next;
    }

    // Splice the three lists.
    let Some(kept) = islands.get_mut(keep) else {
        return keep;
    };
    let kept_tail_body = kept.tail_body;
    let kept_tail_contact = kept.tail_contact;
    let kept_tail_joint = kept.tail_joint;

    if !absorbed.head_body.is_null() {
        if kept_tail_body.is_null() {
            kept.head_body = absorbed.head_body;
        }
        kept.tail_body = absorbed.tail_body;
        kept.body_count += absorbed.body_count;
    }
    if !absorbed.head_contact.is_null() {
        if kept_tail_contact.is_null() {
            kept.head_contact = absorbed.head_contact;
        }
        kept.tail_contact = absorbed.tail_contact;
        kept.contact_count += absorbed.contact_count;
    }
    if !absorbed.head_joint.is_null() {
        if kept_tail_joint.is_null() {
            kept.head_joint = absorbed.head_joint;
        }
        kept.tail_joint = absorbed.tail_joint;
        kept.joint_count += absorbed.joint_count;
    }
    kept.constraint_remove_count += absorbed.constraint_remove_count;

    if !kept_tail_body.is_null() && !absorbed.head_body.is_null() {
        if let Some(tail_body) = bodies.get_mut(kept_tail_body) {
            tail_body.island_next = absorbed.head_body;
        }
        if let Some(head_body) = bodies.get_mut(absorbed.head_body) {
            head_body.island_prev = kept_tail_body;
        }
    }
    if !kept_tail_contact.is_null() && !absorbed.head_contact.is_null() {
        if let Some(tail_contact) = contacts.get_mut(kept_tail_contact) {
            tail_contact.island_next = absorbed.head_contact;
        }
        if let Some(head_contact) = contacts.get_mut(absorbed.head_contact) {
            head_contact.island_prev = kept_tail_contact;
        }
    }
    if !kept_tail_joint.is_null() && !absorbed.head_joint.is_null() {
        if let Some(tail_joint) = joints.get_mut(kept_tail_joint) {
            tail_joint.island_next = absorbed.head_joint;
        }
        if let Some(head_joint) = joints.get_mut(absorbed.head_joint) {
            head_joint.island_prev = kept_tail_joint;
        }
    }

    islands.remove(absorb);
    keep
}

/// Links a contact that began touching into the island graph, merging the
/// two bodies' islands when they differ. Returns the island id.
pub fn link_contact(
    islands: &mut Arena<Island>,
    bodies: &mut Arena<Body>,
    contacts: &mut Arena<Contact>,
    joints: &mut Arena<Joint>,
    contact_id: EntityId,
) -> EntityId {
    let Some(contact) = contacts.get(contact_id) else {
        return EntityId::NULL;
    };
    debug_assert!(contact.island_id.is_null());
    let island_a = bodies.get(contact.body_a).map_or(EntityId::NULL, |b| b.island_id);
    let island_b = bodies.get(contact.body_b).map_or(EntityId::NULL, |b| b.island_id);

    let island_id = match (island_a.is_null(), island_b.is_null()) {
        (false, false) if island_a != island_b => {
            merge_islands(islands, bodies, contacts, joints, island_a, island_b)
        }
        (false, _) => island_a,
        (true, false) => island_b,
        (true, true) => return EntityId::NULL,
    };

    append_contact(islands, contacts, island_id, contact_id);
    island_id
}

/// Unlinks a contact that stopped touching; flags the island for split
/// candidacy.
pub fn unlink_contact(
    islands: &mut Arena<Island>,
    contacts: &mut Arena<Contact>,
    contact_id: EntityId,
) {
    let Some(contact) = contacts.get(contact_id) else {
        return;
    };
    let (island_id, prev, next) = (contact.island_id, contact.island_prev, contact.island_next);
    if island_id.is_null() {
        return;
    }

    if let Some(prev_contact) = contacts.get_mut(prev) {
        prev_contact.island_next = next;
    }
    if let Some(next_contact) = contacts.get_mut(next) {
        next_contact.island_prev = prev;
    }
    if let Some(island) = islands.get_mut(island_id) {
        if island.head_contact == contact_id {
            island.head_contact = next;
        }
        if island.tail_contact == contact_id {
            island.tail_contact = prev;
        }
        island.contact_count -= 1;
        island.constraint_remove_count += 1;
    }
    if let Some(contact) = contacts.get_mut(contact_id) {
        contact.island_id = EntityId::NULL;
        contact.island_prev = EntityId::NULL;
        contact.island_next = EntityId::NULL;
    }
}

/// Links a joint into the island graph. Filter joints only suppress
/// collision and never connect islands.
pub fn link_joint(
    islands: &mut Arena<Island>,
    bodies: &mut Arena<Body>,
    contacts: &mut Arena<Contact>,
    joints: &mut Arena<Joint>,
    joint_id: EntityId,
) -> EntityId {
    let Some(joint) = joints.get(joint_id) else {
        return EntityId::NULL;
    };
    if matches!(joint.kind, JointKind::Filter) {
        return EntityId::NULL;
    }
    debug_assert!(joint.island_id.is_null());
    let island_a = bodies.get(joint.body_a).map_or(EntityId::NULL, |b| b.island_id);
    let island_b = bodies.get(joint.body_b).map_or(EntityId::NULL, |b| b.island_id);

    let island_id = match (island_a.is_null(), island_b.is_null()) {
        (false, false) if island_a != island_b => {
            merge_islands(islands, bodies, contacts, joints, island_a, island_b)
        }
        (false, _) => island_a,
        (true, false) => island_b,
        (true, true) => return EntityId::NULL,
    };

    append_joint(islands, joints, island_id, joint_id);
    island_id
}

pub fn unlink_joint(islands: &mut Arena<Island>, joints: &mut Arena<Joint>, joint_id: EntityId) {
    let Some(joint) = joints.get(joint_id) else {
        return;
    };
    let (island_id, prev, next) = (joint.island_id, joint.island_prev, joint.island_next);
    if island_id.is_null() {
        return;
    }

    if let Some(prev_joint) = joints.get_mut(prev) {
        prev_joint.island_next = next;
    }
    if let Some(next_joint) = joints.get_mut(next) {
        next_joint.island_prev = prev;
    }
    if let Some(island) = islands.get_mut(island_id) {
        if island.head_joint == joint_id {
            island.head_joint = next;
        }
        if island.tail_joint == joint_id {
            island.tail_joint = prev;
        }
        island.joint_count -= 1;
        island.constraint_remove_count += 1;
    }
    if let Some(joint) = joints.get_mut(joint_id) {
        joint.island_id = EntityId::NULL;
        joint.island_prev = EntityId::NULL;
        joint.island_next = EntityId::NULL;
    }
}

/// Splits an island into its connected components by BFS. The island must
/// be awake. Returns the new island ids.
pub fn split_island(
    islands: &mut Arena<Island>,
    bodies: &mut Arena<Body>,
    contacts: &mut Arena<Contact>,
    joints: &mut Arena<Joint>,
    island_id: EntityId,
) -> Vec<EntityId> {
    let Some(island) = islands.get(island_id).cloned() else {
        return Vec::new();
    };

    // Snapshot members, then dissolve the island.
    let mut member_bodies = Vec::with_capacity(island.body_count);
    let mut body_id = island.head_body;
    while !body_id.is_null() {
        member_bodies.push(body_id);
        body_id = bodies.get(body_id).map_or(EntityId::NULL, |b| b.island_next);
    }
    let mut member_contacts = Vec::with_capacity(island.contact_count);
    let mut contact_id = island.head_contact;
    while !contact_id.is_null() {
        member_contacts.push(contact_id);
        contact_id = contacts
            .get(contact_id)
            .map_or(EntityId::NULL, |c| c.island_next);
    }
    let mut member_joints = Vec::with_capacity(island.joint_count);
    let mut joint_id = island.head_joint;
    while !joint_id.is_null() {
        member_joints.push(joint_id);
        joint_id = joints.get(joint_id).map_or(EntityId::NULL, |j| j.island_next);
    }

    for &id in &member_bodies {
        if let Some(body) = bodies.get_mut(id) {
            body.island_id = EntityId::NULL;
            body.island_prev = EntityId::NULL;
            body.island_next = EntityId::NULL;
        }
    }
    for &id in &member_contacts {
        if let Some(contact) = contacts.get_mut(id) {
            contact.island_id = EntityId::NULL;
            contact.island_prev = EntityId::NULL;
            contact.island_next = EntityId::NULL;
        }
    }
    for &id in &member_joints {
        if let Some(joint) = joints.get_mut(id) {
            joint.island_id = EntityId::NULL;
            joint.island_prev = EntityId::NULL;
            joint.island_next = EntityId::NULL;
        }
    }
    let set_index = island.set_index;
    if let Some(island) = islands.get_mut(island_id) {
        island.body_count = 0;
        island.head_body = EntityId::NULL;
        island.tail_body = EntityId::NULL;
    }
    destroy_island(islands, island_id);

    // BFS per still-connected component.
    let mut new_islands = Vec::new();
    for &seed in &member_bodies {
        let already_assigned = bodies.get(seed).map_or(true, |b| !b.island_id.is_null());
        if already_assigned {
            continue;
        }

        let new_island = create_island(islands, set_index);
        new_islands.push(new_island);

        let mut queue = vec![seed];
        while let Some(current) = queue.pop() {
            let assigned = bodies.get(current).map_or(true, |b| !b.island_id.is_null());
            if assigned {
                continue;
            }
            add_body_to_island(islands, bodies, new_island, current);

            let (body_contacts, body_joints) = match bodies.get(current) {
                Some(body) => (body.contacts.clone(), body.joints.clone()),
                None => continue,
            };

            for contact_id in body_contacts {
                let Some(contact) = contacts.get(contact_id) else {
                    continue;
                };
                if !contact.touching || contact.is_sensor {
                    continue;
                }
                let other = if contact.body_a == current {
                    contact.body_b
                } else {
                    contact.body_a
                };
                let connects = bodies
                    .get(other)
                    .is_some_and(|b| !b.is_static() && b.island_id.is_null());
                if connects {
                    queue.push(other);
                }
            }
            for joint_id in body_joints {
                let Some(joint) = joints.get(joint_id) else {
                    continue;
                };
                if matches!(joint.kind, JointKind::Filter) {
                    continue;
                }
                let other = if joint.body_a == current {
                    joint.body_b
                } else {
                    joint.body_a
                };
                let connects = bodies
                    .get(other)
                    .is_some_and(|b| !b.is_static() && b.island_id.is_null());
                if connects {
                    queue.push(other);
                }
            }
        }
    }

    // Reattach constraints to whichever component claimed their bodies.
    for contact_id in member_contacts {
        let owner = contacts.get(contact_id).and_then(|contact| {
            let a = bodies.get(contact.body_a).map(|b| b.island_id);
            match a {
                Some(id) if !id.is_null() => Some(id),
                _ => bodies.get(contact.body_b).map(|b| b.island_id),
            }
        });
        if let Some(owner) = owner {
            if !owner.is_null() {
                append_contact(islands, contacts, owner, contact_id);
            }
        }
    }
    for joint_id in member_joints {
        let owner = joints.get(joint_id).and_then(|joint| {
            let a = bodies.get(joint.body_a).map(|b| b.island_id);
            match a {
                Some(id) if !id.is_null() => Some(id),
                _ => bodies.get(joint.body_b).map(|b| b.island_id),
            }
        });
        if let Some(owner) = owner {
            if !owner.is_null() {
                append_joint(islands, joints, owner, joint_id);
            }
        }
    }

    new_islands
}

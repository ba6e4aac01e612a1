//! Event records surfaced after each step.
//!
//! Begin-style buffers are rebuilt every step. End-touch buffers are
//! double-buffered: the array exposed after step N holds the events of
//! step N and stays valid until the next step, even though the engine is
//! already filling the other buffer.

use glam::Vec2;

use crate::{collision::manifold::Manifold, core::types::Transform, utils::allocator::EntityId};

/// A body moved during the step (or fell asleep).
#[derive(Debug, Clone, Copy)]
pub struct BodyMoveEvent {
    pub body_id: EntityId,
    pub transform: Transform,
    pub fell_asleep: bool,
}

/// Two shapes began touching.
#[derive(Debug, Clone)]
pub struct ContactBeginEvent {
    pub shape_a: EntityId,
    pub shape_b: EntityId,
    pub manifold: Manifold,
}

/// Two shapes stopped touching.
#[derive(Debug, Clone, Copy)]
pub struct ContactEndEvent {
    pub shape_a: EntityId,
    pub shape_b: EntityId,
}

/// A contact point collided above the hit-event speed threshold.
#[derive(Debug, Clone, Copy)]
pub struct ContactHitEvent {
    pub shape_a: EntityId,
    pub shape_b: EntityId,
    pub point: Vec2,
    pub normal: Vec2,
    pub approach_speed: f32,
}

/// A shape entered a sensor.
#[derive(Debug, Clone, Copy)]
pub struct SensorBeginEvent {
    pub sensor_shape: EntityId,
    pub visitor_shape: EntityId,
}

/// A shape left a sensor.
#[derive(Debug, Clone, Copy)]
pub struct SensorEndEvent {
    pub sensor_shape: EntityId,
    pub visitor_shape: EntityId,
}

/// A joint's reaction crossed its force or torque threshold.
#[derive(Debug, Clone, Copy)]
pub struct JointEvent {
    pub joint_id: EntityId,
    pub force: Vec2,
    pub torque: f32,
}

/// Read-only view over the contact events of the last step.
#[derive(Debug, Clone, Copy)]
pub struct ContactEvents<'a> {
    pub begin: &'a [ContactBeginEvent],
    pub end: &'a [ContactEndEvent],
    pub hit: &'a [ContactHitEvent],
}

#[derive(Debug, Clone, Copy)]
pub struct SensorEvents<'a> {
    pub begin: &'a [SensorBeginEvent],
    pub end: &'a [SensorEndEvent],
}

#[derive(Debug, Clone, Copy)]
pub struct BodyEvents<'a> {
    pub moves: &'a [BodyMoveEvent],
}

#[derive(Debug, Clone, Copy)]
pub struct JointEvents<'a> {
    pub events: &'a [JointEvent],
}

/// Owned event storage on the world.
#[derive(Debug, Default)]
pub(crate) struct EventBuffers {
    pub body_move: Vec<BodyMoveEvent>,
    pub contact_begin: Vec<ContactBeginEvent>,
    pub contact_end: [Vec<ContactEndEvent>; 2],
    pub contact_hit: Vec<ContactHitEvent>,
    pub sensor_begin: Vec<SensorBeginEvent>,
    pub sensor_end: [Vec<SensorEndEvent>; 2],
    pub joint: Vec<JointEvent>,
    /// Index of the buffer being filled this step.
    pub end_index: usize,
}

impl EventBuffers {
    /// Starts a new step: flips the end buffers and clears everything
    /// that belongs to the new step.
    pub fn begin_step(&mut self) {
        self.end_index ^= 1;
        self.body_move.clear();
        self.contact_begin.clear();
        self.contact_end[self.end_index].clear();
        self.contact_hit.clear();
        self.sensor_begin.clear();
        self.sensor_end[self.end_index].clear();
        self.joint.clear();
    }

    pub fn push_contact_end(&mut self, event: ContactEndEvent) {
        self.contact_end[self.end_index].push(event);
    }

    pub fn push_sensor_end(&mut self, event: SensorEndEvent) {
        self.sensor_end[self.end_index].push(event);
    }
}

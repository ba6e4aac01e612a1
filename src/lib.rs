//! Momentum2D – a 2D rigid-body physics engine for Rust.
//!
//! The crate centers on [`World::step`]: a broad-phase dynamic AABB tree
//! feeds a narrow phase of persistent contact manifolds, islands partition
//! the awake set, a constraint graph colors contacts and joints for
//! parallel solving, and a substepped soft-constraint (TGS) solver
//! advances the simulation. Bullets get a continuous collision pass.

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod events;
pub mod utils;
pub mod world;

pub use glam::Vec2;

pub use crate::collision::{
    aabb::Aabb, manifold::Manifold, manifold::ManifoldPoint, toi::ToiState, CastOutput,
    RayCastInput,
};
pub use crate::core::{
    body::{BodyBuilder, BodyDef, BodyType, MotionLocks},
    shape::{ChainDef, Polygon, ShapeDef, ShapeKind},
    types::{CollisionFilter, MassData, SurfaceMaterial, Transform, Velocity},
};
pub use crate::dynamics::joints::{
    DistanceJoint, JointDef, JointKind, MotorJoint, MouseJoint, PrismaticJoint, RevoluteJoint,
    WeldJoint, WheelJoint,
};
pub use crate::events::{
    BodyEvents, BodyMoveEvent, ContactBeginEvent, ContactEndEvent, ContactEvents, ContactHitEvent,
    JointEvent, JointEvents, SensorBeginEvent, SensorEndEvent, SensorEvents,
};
pub use crate::utils::{
    allocator::EntityId,
    math::Rot,
    profiling::{Counters, StepProfile},
    task::{SequentialExecutor, TaskExecutor},
};
pub use crate::world::{QueryFilter, RayHit, World, WorldDef};

#[cfg(feature = "parallel")]
pub use crate::utils::task::RayonExecutor;

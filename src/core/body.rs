use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::{
    config,
    core::types::{Transform, Velocity},
    utils::allocator::EntityId,
};

/// Simulation category of a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BodyType {
    /// Infinite mass, never integrates.
    #[default]
    Static,
    /// Infinite mass, moves under user-set velocity.
    Kinematic,
    /// Finite mass, fully simulated.
    Dynamic,
}

/// Per-axis motion locks. A locked axis has its velocity component zeroed
/// every substep.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MotionLocks {
    pub linear_x: bool,
    pub linear_y: bool,
    pub angular_z: bool,
}

/// Definition used to create bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyDef {
    pub body_type: BodyType,
    pub position: Vec2,
    pub rotation: f32,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub gravity_scale: f32,
    /// Linear speed below which this body accumulates sleep time.
    pub sleep_threshold: f32,
    pub enable_sleep: bool,
    pub is_awake: bool,
    pub is_bullet: bool,
    pub is_enabled: bool,
    pub motion_locks: MotionLocks,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            position: Vec2::ZERO,
            rotation: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            gravity_scale: 1.0,
            sleep_threshold: config::SLEEP_LINEAR_VELOCITY,
            enable_sleep: true,
            is_awake: true,
            is_bullet: false,
            is_enabled: true,
            motion_locks: MotionLocks::default(),
        }
    }
}

impl BodyDef {
    pub fn builder() -> BodyBuilder {
        BodyBuilder::new()
    }
}

/// Fluent construction of [`BodyDef`]s.
pub struct BodyBuilder {
    def: BodyDef,
}

impl Default for BodyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BodyBuilder {
    pub fn new() -> Self {
        Self {
            def: BodyDef::default(),
        }
    }

    pub fn body_type(mut self, body_type: BodyType) -> Self {
        self.def.body_type = body_type;
        self
    }

    pub fn position(mut self, position: Vec2) -> Self {
        self.def.position = position;
        self
    }

    pub fn rotation(mut self, radians: f32) -> Self {
        self.def.rotation = radians;
        self
    }

    pub fn linear_velocity(mut self, velocity: Vec2) -> Self {
        self.def.linear_velocity = velocity;
        self
    }

    pub fn angular_velocity(mut self, velocity: f32) -> Self {
        self.def.angular_velocity = velocity;
        self
    }

    pub fn linear_damping(mut self, damping: f32) -> Self {
        self.def.linear_damping = damping;
        self
    }

    pub fn angular_damping(mut self, damping: f32) -> Self {
        self.def.angular_damping = damping;
        self
    }

    pub fn gravity_scale(mut self, scale: f32) -> Self {
        self.def.gravity_scale = scale;
        self
    }

    pub fn bullet(mut self, is_bullet: bool) -> Self {
        self.def.is_bullet = is_bullet;
        self
    }

    pub fn enable_sleep(mut self, enable: bool) -> Self {
        self.def.enable_sleep = enable;
        self
    }

    pub fn motion_locks(mut self, locks: MotionLocks) -> Self {
        self.def.motion_locks = locks;
        self
    }

    pub fn build(self) -> BodyDef {
        self.def
    }
}

/// Internal body record. Lives in the world's body arena; solver sets refer
/// to it by id and keep a back-pointer slot for O(1) migration.
#[derive(Debug, Clone)]
pub struct Body {
    pub id: EntityId,
    pub body_type: BodyType,
    pub transform: Transform,
    /// World-space center of mass.
    pub center: Vec2,
    pub local_center: Vec2,
    pub velocity: Velocity,
    pub force: Vec2,
    pub torque: f32,
    pub mass: f32,
    pub inv_mass: f32,
    pub inertia: f32,
    pub inv_inertia: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub gravity_scale: f32,
    pub sleep_threshold: f32,
    pub sleep_time: f32,
    pub enable_sleep: bool,
    pub is_bullet: bool,
    pub is_enabled: bool,
    pub motion_locks: MotionLocks,
    /// Shapes owned by this body.
    pub shapes: Vec<EntityId>,
    /// Contacts and joints attached to this body.
    pub contacts: Vec<EntityId>,
    pub joints: Vec<EntityId>,
    /// Solver set holding this body and the slot within that set.
    pub set_index: usize,
    pub set_slot: usize,
    /// Island membership with intrusive links.
    pub island_id: EntityId,
    pub island_prev: EntityId,
    pub island_next: EntityId,
    /// Index into the step's solver-body array, or `usize::MAX`.
    pub solver_index: usize,
}

impl Body {
    pub fn from_def(id: EntityId, def: &BodyDef) -> Self {
        let transform = Transform::new(def.position, def.rotation);
        Self {
            id,
            body_type: def.body_type,
            transform,
            center: transform.p,
            local_center: Vec2::ZERO,
            velocity: Velocity {
                linear: def.linear_velocity,
                angular: def.angular_velocity,
            },
            force: Vec2::ZERO,
            torque: 0.0,
            mass: 0.0,
            inv_mass: 0.0,
            inertia: 0.0,
            inv_inertia: 0.0,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            gravity_scale: def.gravity_scale,
            sleep_threshold: def.sleep_threshold,
            // Bodies created asleep are ripe for the next sleep pass.
            sleep_time: if def.is_awake { 0.0 } else { config::TIME_TO_SLEEP },
            enable_sleep: def.enable_sleep,
            is_bullet: def.is_bullet,
            is_enabled: def.is_enabled,
            motion_locks: def.motion_locks,
            shapes: Vec::new(),
            contacts: Vec::new(),
            joints: Vec::new(),
            set_index: crate::dynamics::solver_set::STATIC_SET,
            set_slot: usize::MAX,
            island_id: EntityId::NULL,
            island_prev: EntityId::NULL,
            island_next: EntityId::NULL,
            solver_index: usize::MAX,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    pub fn is_static(&self) -> bool {
        self.body_type == BodyType::Static
    }

    pub fn is_kinematic(&self) -> bool {
        self.body_type == BodyType::Kinematic
    }

    /// Recomputes the world center after the transform changed.
    pub fn update_center(&mut self) {
        self.center = self.transform.transform_point(self.local_center);
    }

    /// Sweep origin used by continuous collision.
    pub fn sweep_center(&self) -> Vec2 {
        self.center
    }
}

//! Central simulation container orchestrating all subsystems.
//!
//! The step pipeline: drain broad-phase moves into new pairs, refresh
//! manifolds on awake contacts, maintain islands, solve the awake set with
//! the substepped soft solver (parallel per graph color), evaluate sleep,
//! run the continuous pass for bullets, and finalize the event arrays.

use glam::Vec2;
use log::{debug, warn};
use parking_lot::Mutex;

use crate::{
    collision::{
        aabb::Aabb,
        broadphase::{BroadPhase, CustomFilterFn},
        contact::{self, Contact},
        distance::{DistanceProxy, ShapeCastPairInput},
        manifold::Manifold,
        toi::{self, Sweep, ToiInput, ToiState},
        RayCastInput,
    },
    config,
    core::{
        body::{Body, BodyDef, BodyType},
        shape::{Chain, ChainDef, Shape, ShapeDef, ShapeKind},
        types::{
            default_friction_mix, default_restitution_mix, CollisionFilter, MassData, MixingFn,
            Transform, Velocity,
        },
    },
    dynamics::{
        graph::{ConstraintGraph, OVERFLOW_COLOR},
        island::{self, Island},
        joints::{self, Joint, JointDef, JointKind},
        solver::{self, ContactConstraint, SolverBody, SolverBodyParams, SolverStates},
        solver_set::{SolverSets, AWAKE_SET, DISABLED_SET, FIRST_SLEEPING_SET, STATIC_SET},
    },
    events::{
        BodyEvents, BodyMoveEvent, ContactBeginEvent, ContactEndEvent, ContactEvents,
        ContactHitEvent, EventBuffers, JointEvent, JointEvents, SensorBeginEvent, SensorEndEvent,
        SensorEvents,
    },
    utils::{
        allocator::{Arena, EntityId},
        bitset::BitSet,
        logging::ScopedTimer,
        math::{is_valid_float, is_valid_vec, Rot},
        profiling::{Counters, StepProfile},
        task::{SensorHit, SequentialExecutor, SharedSlice, TaskContext, TaskExecutor},
    },
};

/// Last-chance contact veto. Receives the two shape ids, a representative
/// contact point, and the normal. May not touch the world.
pub type PreSolveFn = dyn Fn(EntityId, EntityId, Vec2, Vec2) -> bool + Send + Sync;

/// Filter applied to scene queries.
#[derive(Debug, Clone, Copy)]
pub struct QueryFilter {
    pub category: u64,
    pub mask: u64,
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self {
            category: 1,
            mask: u64::MAX,
        }
    }
}

fn should_query(shape_filter: &CollisionFilter, filter: &QueryFilter) -> bool {
    (shape_filter.category & filter.mask) != 0 && (filter.category & shape_filter.mask) != 0
}

/// Closest-hit result of a ray cast.
#[derive(Debug, Clone, Copy)]
pub struct RayHit {
    pub shape_id: EntityId,
    pub point: Vec2,
    pub normal: Vec2,
    pub fraction: f32,
}

/// World construction parameters with the documented defaults.
#[derive(Debug, Clone)]
pub struct WorldDef {
    pub gravity: Vec2,
    pub restitution_threshold: f32,
    pub hit_event_threshold: f32,
    pub joint_hertz: f32,
    pub joint_damping_ratio: f32,
    pub enable_sleep: bool,
    pub enable_continuous: bool,
    pub enable_warm_starting: bool,
}

impl Default for WorldDef {
    fn default() -> Self {
        Self {
            gravity: Vec2::from_array(config::DEFAULT_GRAVITY),
            restitution_threshold: config::RESTITUTION_THRESHOLD,
            hit_event_threshold: config::HIT_EVENT_THRESHOLD,
            joint_hertz: config::JOINT_HERTZ,
            joint_damping_ratio: config::JOINT_DAMPING_RATIO,
            enable_sleep: true,
            enable_continuous: true,
            enable_warm_starting: true,
        }
    }
}

/// Outcome of one narrow-phase evaluation, scattered by workers and
/// applied at the barrier.
enum NarrowResult {
    /// Fat AABBs separated; destroy the contact.
    Disjoint,
    Updated(contact::ContactUpdate),
}

/// Central simulation container.
pub struct World {
    pub gravity: Vec2,
    pub restitution_threshold: f32,
    pub hit_event_threshold: f32,
    pub joint_hertz: f32,
    pub joint_damping_ratio: f32,
    pub enable_sleep: bool,
    pub enable_continuous: bool,
    pub enable_warm_starting: bool,

    bodies: Arena<Body>,
    shapes: Arena<Shape>,
    chains: Arena<Chain>,
    contacts: Arena<Contact>,
    joints: Arena<Joint>,
    islands: Arena<Island>,
    solver_sets: SolverSets,
    graph: ConstraintGraph,
    broadphase: BroadPhase,

    executor: Box<dyn TaskExecutor>,
    task_contexts: Vec<Mutex<TaskContext>>,

    friction_mix: MixingFn,
    restitution_mix: MixingFn,
    custom_filter: Option<Box<CustomFilterFn>>,
    pre_solve: Option<Box<PreSolveFn>>,

    events: EventBuffers,
    pub profile: StepProfile,
}

impl Default for World {
    fn default() -> Self {
        Self::new(&WorldDef::default())
    }
}

#[cfg(feature = "parallel")]
fn default_executor() -> Box<dyn TaskExecutor> {
    Box::new(crate::utils::task::RayonExecutor::new())
}

#[cfg(not(feature = "parallel"))]
fn default_executor() -> Box<dyn TaskExecutor> {
    Box::new(SequentialExecutor)
}

impl World {
    pub fn new(def: &WorldDef) -> Self {
        Self::with_executor(def, default_executor())
    }

    /// Single-threaded world; the deterministic configuration.
    pub fn new_single_threaded(def: &WorldDef) -> Self {
        Self::with_executor(def, Box::new(SequentialExecutor))
    }

    pub fn with_executor(def: &WorldDef, executor: Box<dyn TaskExecutor>) -> Self {
        let worker_count = executor.worker_count().max(1);
        let task_contexts = (0..worker_count)
            .map(|_| Mutex::new(TaskContext::default()))
            .collect();

        Self {
            gravity: def.gravity,
            restitution_threshold: def.restitution_threshold,
            hit_event_threshold: def.hit_event_threshold,
            joint_hertz: def.joint_hertz,
            joint_damping_ratio: def.joint_damping_ratio,
            enable_sleep: def.enable_sleep,
            enable_continuous: def.enable_continuous,
            enable_warm_starting: def.enable_warm_starting,
            bodies: Arena::new(),
            shapes: Arena::new(),
            chains: Arena::new(),
            contacts: Arena::new(),
            joints: Arena::new(),
            islands: Arena::new(),
            solver_sets: SolverSets::new(),
            graph: ConstraintGraph::new(),
            broadphase: BroadPhase::new(),
            executor,
            task_contexts,
            friction_mix: default_friction_mix,
            restitution_mix: default_restitution_mix,
            custom_filter: None,
            pre_solve: None,
            events: EventBuffers::default(),
            profile: StepProfile::default(),
        }
    }

    // ---------------------------------------------------------------
    // Callbacks
    // ---------------------------------------------------------------

    pub fn set_friction_mix(&mut self, mix: MixingFn) {
        self.friction_mix = mix;
    }

    pub fn set_restitution_mix(&mut self, mix: MixingFn) {
        self.restitution_mix = mix;
    }

    pub fn set_custom_filter<F>(&mut self, filter: Option<F>)
    where
        F: Fn(EntityId, EntityId) -> bool + Send + Sync + 'static,
    {
        self.custom_filter = filter.map(|f| Box::new(f) as Box<CustomFilterFn>);
    }

    /// Ordering across workers is unspecified; deterministic only with a
    /// single worker.
    pub fn set_pre_solve<F>(&mut self, pre_solve: Option<F>)
    where
        F: Fn(EntityId, EntityId, Vec2, Vec2) -> bool + Send + Sync + 'static,
    {
        self.pre_solve = pre_solve.map(|f| Box::new(f) as Box<PreSolveFn>);
    }

    // ---------------------------------------------------------------
    // Bodies
    // ---------------------------------------------------------------

    pub fn create_body(&mut self, def: &BodyDef) -> EntityId {
        if !is_valid_vec(def.position)
            || !is_valid_float(def.rotation)
            || !is_valid_vec(def.linear_velocity)
            || !is_valid_float(def.angular_velocity)
        {
            warn!("create_body rejected: non-finite definition");
            return EntityId::NULL;
        }

        let id = self.bodies.insert(Body::from_def(EntityId::NULL, def));
        let set_index = if !def.is_enabled {
            DISABLED_SET
        } else if def.body_type == BodyType::Static {
            STATIC_SET
        } else {
            AWAKE_SET
        };

        if let Some(body) = self.bodies.get_mut(id) {
            body.id = id;
            self.solver_sets.add_body(set_index, body);
        }

        if set_index == AWAKE_SET {
            let island_id = island::create_island(&mut self.islands, AWAKE_SET);
            island::add_body_to_island(&mut self.islands, &mut self.bodies, island_id, id);
        }

        // Dynamic bodies default to unit mass until shapes provide one.
        if def.body_type == BodyType::Dynamic {
            if let Some(body) = self.bodies.get_mut(id) {
                body.mass = 1.0;
                body.inv_mass = 1.0;
            }
        }

        id
    }

    pub fn destroy_body(&mut self, body_id: EntityId) {
        if !self.bodies.contains(body_id) {
            return;
        }
        self.wake_body(body_id);

        let (joint_ids, contact_ids, shape_ids, island_id) = {
            let body = match self.bodies.get(body_id) {
                Some(body) => body,
                None => return,
            };
            (
                body.joints.clone(),
                body.contacts.clone(),
                body.shapes.clone(),
                body.island_id,
            )
        };

        for joint_id in joint_ids {
            self.destroy_joint(joint_id);
        }
        for contact_id in contact_ids {
            self.destroy_contact(contact_id, true);
        }
        for shape_id in shape_ids {
            self.destroy_shape_internal(shape_id, false);
        }

        island::remove_body_from_island(&mut self.islands, &mut self.bodies, body_id);
        if let Some(island) = self.islands.get(island_id) {
            if island.body_count == 0 {
                island::destroy_island(&mut self.islands, island_id);
            }
        }

        self.solver_sets.remove_body(&mut self.bodies, body_id);
        self.bodies.remove(body_id);
    }

    pub fn body_transform(&self, body_id: EntityId) -> Transform {
        self.bodies
            .get(body_id)
            .map_or(Transform::IDENTITY, |b| b.transform)
    }

    pub fn body_position(&self, body_id: EntityId) -> Vec2 {
        self.bodies.get(body_id).map_or(Vec2::ZERO, |b| b.transform.p)
    }

    pub fn body_rotation(&self, body_id: EntityId) -> Rot {
        self.bodies
            .get(body_id)
            .map_or(Rot::IDENTITY, |b| b.transform.q)
    }

    pub fn body_linear_velocity(&self, body_id: EntityId) -> Vec2 {
        self.bodies
            .get(body_id)
            .map_or(Vec2::ZERO, |b| b.velocity.linear)
    }

    pub fn body_angular_velocity(&self, body_id: EntityId) -> f32 {
        self.bodies.get(body_id).map_or(0.0, |b| b.velocity.angular)
    }

    pub fn body_mass(&self, body_id: EntityId) -> f32 {
        self.bodies.get(body_id).map_or(0.0, |b| b.mass)
    }

    pub fn body_type(&self, body_id: EntityId) -> BodyType {
        self.bodies
            .get(body_id)
            .map_or(BodyType::Static, |b| b.body_type)
    }

    pub fn is_body_awake(&self, body_id: EntityId) -> bool {
        self.bodies
            .get(body_id)
            .is_some_and(|b| b.set_index == AWAKE_SET)
    }

    pub fn body_set_index(&self, body_id: EntityId) -> usize {
        self.bodies.get(body_id).map_or(usize::MAX, |b| b.set_index)
    }

    /// Teleports a body. Proxies are refreshed; sleep state is untouched.
    pub fn set_body_transform(&mut self, body_id: EntityId, position: Vec2, rotation: f32) {
        if !is_valid_vec(position) || !is_valid_float(rotation) {
            warn!("set_body_transform rejected: non-finite input");
            return;
        }
        let shape_ids = {
            let Some(body) = self.bodies.get_mut(body_id) else {
                return;
            };
            body.transform = Transform::new(position, rotation);
            body.update_center();
            body.shapes.clone()
        };
        for shape_id in shape_ids {
            self.refresh_shape_proxy(shape_id, Vec2::ZERO);
        }
    }

    pub fn set_body_linear_velocity(&mut self, body_id: EntityId, velocity: Vec2) {
        if !is_valid_vec(velocity) {
            return;
        }
        self.wake_body(body_id);
        if let Some(body) = self.bodies.get_mut(body_id) {
            if !body.is_static() {
                body.velocity.linear = velocity;
            }
        }
    }

    pub fn set_body_angular_velocity(&mut self, body_id: EntityId, velocity: f32) {
        if !is_valid_float(velocity) {
            return;
        }
        self.wake_body(body_id);
        if let Some(body) = self.bodies.get_mut(body_id) {
            if !body.is_static() {
                body.velocity.angular = velocity;
            }
        }
    }

    /// Accumulates a force applied at the center of mass.
    pub fn apply_force(&mut self, body_id: EntityId, force: Vec2) {
        if !is_valid_vec(force) {
            return;
        }
        self.wake_body(body_id);
        if let Some(body) = self.bodies.get_mut(body_id) {
            if body.is_dynamic() {
                body.force += force;
            }
        }
    }

    pub fn apply_torque(&mut self, body_id: EntityId, torque: f32) {
        if !is_valid_float(torque) {
            return;
        }
        self.wake_body(body_id);
        if let Some(body) = self.bodies.get_mut(body_id) {
            if body.is_dynamic() {
                body.torque += torque;
            }
        }
    }

    /// Applies an impulse at a world point, waking the body.
    pub fn apply_linear_impulse(&mut self, body_id: EntityId, impulse: Vec2, point: Vec2) {
        if !is_valid_vec(impulse) || !is_valid_vec(point) {
            return;
        }
        self.wake_body(body_id);
        if let Some(body) = self.bodies.get_mut(body_id) {
            if body.is_dynamic() {
                body.velocity.linear += body.inv_mass * impulse;
                body.velocity.angular +=
                    body.inv_inertia * crate::utils::math::cross(point - body.center, impulse);
            }
        }
    }

    pub fn apply_angular_impulse(&mut self, body_id: EntityId, impulse: f32) {
        if !is_valid_float(impulse) {
            return;
        }
        self.wake_body(body_id);
        if let Some(body) = self.bodies.get_mut(body_id) {
            if body.is_dynamic() {
                body.velocity.angular += body.inv_inertia * impulse;
            }
        }
    }

    /// Overrides the mass computed from shapes.
    pub fn set_body_mass_data(&mut self, body_id: EntityId, mass_data: MassData) {
        let Some(body) = self.bodies.get_mut(body_id) else {
            return;
        };
        if !body.is_dynamic() || mass_data.mass <= 0.0 {
            return;
        }
        body.mass = mass_data.mass;
        body.inv_mass = 1.0 / mass_data.mass;
        body.local_center = mass_data.center;
        let inertia =
            mass_data.rotational_inertia - mass_data.mass * mass_data.center.dot(mass_data.center);
        body.inertia = inertia;
        body.inv_inertia = if inertia > 0.0 { 1.0 / inertia } else { 0.0 };
        body.update_center();
    }

    /// Wakes the body's island if it was sleeping.
    pub fn wake_body(&mut self, body_id: EntityId) {
        let set_index = match self.bodies.get(body_id) {
            Some(body) => body.set_index,
            None => return,
        };
        if set_index >= FIRST_SLEEPING_SET {
            self.wake_solver_set(set_index);
        } else if let Some(body) = self.bodies.get_mut(body_id) {
            body.sleep_time = 0.0;
        }
    }

    /// Moves a body between the disabled and simulated sets.
    pub fn set_body_enabled(&mut self, body_id: EntityId, enabled: bool) {
        let Some(body) = self.bodies.get(body_id) else {
            return;
        };
        let currently_enabled = body.set_index != DISABLED_SET;
        if currently_enabled == enabled {
            return;
        }

        if !enabled {
            self.wake_body(body_id);
            let (contact_ids, shape_ids, joint_ids, island_id) = {
                let body = match self.bodies.get(body_id) {
                    Some(b) => b,
                    None => return,
                };
                (
                    body.contacts.clone(),
                    body.shapes.clone(),
                    body.joints.clone(),
                    body.island_id,
                )
            };
            for contact_id in contact_ids {
                self.destroy_contact(contact_id, true);
            }
            for shape_id in shape_ids {
                if let Some(shape) = self.shapes.get_mut(shape_id) {
                    if shape.proxy_id != usize::MAX {
                        self.broadphase.destroy_proxy(shape.proxy_id);
                        shape.proxy_id = usize::MAX;
                    }
                }
            }
            for joint_id in joint_ids {
                let (index_a, index_b) = self.joint_body_dynamic_indices(joint_id);
                self.graph
                    .remove_joint(&mut self.joints, joint_id, index_a, index_b);
                island::unlink_joint(&mut self.islands, &mut self.joints, joint_id);
                self.solver_sets.remove_joint(&mut self.joints, joint_id);
                if let Some(joint) = self.joints.get_mut(joint_id) {
                    self.solver_sets.add_joint(DISABLED_SET, joint);
                }
            }
            island::remove_body_from_island(&mut self.islands, &mut self.bodies, body_id);
            if let Some(island) = self.islands.get(island_id) {
                if island.body_count == 0 {
                    island::destroy_island(&mut self.islands, island_id);
                }
            }
            self.solver_sets.remove_body(&mut self.bodies, body_id);
            if let Some(body) = self.bodies.get_mut(body_id) {
                self.solver_sets.add_body(DISABLED_SET, body);
                body.is_enabled = false;
            }
        } else {
            self.solver_sets.remove_body(&mut self.bodies, body_id);
            let (is_static, shape_ids, joint_ids) = {
                let Some(body) = self.bodies.get_mut(body_id) else {
                    return;
                };
                body.is_enabled = true;
                (body.is_static(), body.shapes.clone(), body.joints.clone())
            };
            let set_index = if is_static { STATIC_SET } else { AWAKE_SET };
            if let Some(body) = self.bodies.get_mut(body_id) {
                self.solver_sets.add_body(set_index, body);
            }
            if set_index == AWAKE_SET {
                let island_id = island::create_island(&mut self.islands, AWAKE_SET);
                island::add_body_to_island(&mut self.islands, &mut self.bodies, island_id, body_id);
            }
            let transform = self.body_transform(body_id);
            for shape_id in shape_ids {
                let Some(shape) = self.shapes.get_mut(shape_id) else {
                    continue;
                };
                let tight = shape.kind.compute_aabb(&transform);
                shape.aabb = tight;
                shape.proxy_id = self
                    .broadphase
                    .create_proxy(tight, shape.filter.category, shape_id);
                shape.fat_aabb = self.broadphase.fat_aabb(shape.proxy_id);
            }
            for joint_id in joint_ids {
                self.solver_sets.remove_joint(&mut self.joints, joint_id);
                if let Some(joint) = self.joints.get_mut(joint_id) {
                    self.solver_sets.add_joint(AWAKE_SET, joint);
                }
                self.add_joint_to_graph(joint_id);
                island::link_joint(
                    &mut self.islands,
                    &mut self.bodies,
                    &mut self.contacts,
                    &mut self.joints,
                    joint_id,
                );
            }
        }
    }

    // ---------------------------------------------------------------
    // Shapes and chains
    // ---------------------------------------------------------------

    pub fn create_shape(&mut self, body_id: EntityId, def: &ShapeDef, kind: ShapeKind) -> EntityId {
        if !self.bodies.contains(body_id) {
            warn!("create_shape rejected: stale body id");
            return EntityId::NULL;
        }
        self.wake_body(body_id);

        let shape_id = self
            .shapes
            .insert(Shape::new(EntityId::NULL, body_id, kind, def));
        let transform = self.body_transform(body_id);
        let enabled = self
            .bodies
            .get(body_id)
            .is_some_and(|b| b.set_index != DISABLED_SET);

        if let Some(shape) = self.shapes.get_mut(shape_id) {
            shape.id = shape_id;
            let tight = shape.kind.compute_aabb(&transform);
            shape.aabb = tight;
            if enabled {
                shape.proxy_id = self
                    .broadphase
                    .create_proxy(tight, shape.filter.category, shape_id);
                shape.fat_aabb = self.broadphase.fat_aabb(shape.proxy_id);
            }
        }

        if let Some(body) = self.bodies.get_mut(body_id) {
            body.shapes.push(shape_id);
        }

        if def.update_body_mass {
            self.update_body_mass(body_id);
        }

        shape_id
    }

    pub fn destroy_shape(&mut self, shape_id: EntityId) {
        self.destroy_shape_internal(shape_id, true);
    }

    fn destroy_shape_internal(&mut self, shape_id: EntityId, update_mass: bool) {
        let Some(shape) = self.shapes.get(shape_id) else {
            return;
        };
        let body_id = shape.body_id;
        let proxy_id = shape.proxy_id;

        // Contacts involving this shape go first.
        let contact_ids: Vec<EntityId> = self
            .bodies
            .get(body_id)
            .map(|body| {
                body.contacts
                    .iter()
                    .copied()
                    .filter(|&cid| {
                        self.contacts
                            .get(cid)
                            .is_some_and(|c| c.shape_a == shape_id || c.shape_b == shape_id)
                    })
                    .collect()
            })
            .unwrap_or_default();
        for contact_id in contact_ids {
            self.destroy_contact(contact_id, true);
        }

        if proxy_id != usize::MAX {
            self.broadphase.destroy_proxy(proxy_id);
        }
        if let Some(body) = self.bodies.get_mut(body_id) {
            body.shapes.retain(|&id| id != shape_id);
        }
        self.shapes.remove(shape_id);

        if update_mass {
            self.update_body_mass(body_id);
        }
    }

    /// Recomputes mass, center, and inertia from the attached shapes.
    pub fn update_body_mass(&mut self, body_id: EntityId) {
        let Some(body) = self.bodies.get(body_id) else {
            return;
        };
        if !body.is_dynamic() {
            return;
        }
        let shape_ids = body.shapes.clone();

        let mut mass = 0.0;
        let mut center = Vec2::ZERO;
        let mut inertia = 0.0;
        for shape_id in &shape_ids {
            let Some(shape) = self.shapes.get(*shape_id) else {
                continue;
            };
            if shape.density == 0.0 {
                continue;
            }
            let mass_data = shape.kind.compute_mass(shape.density);
            mass += mass_data.mass;
            center += mass_data.mass * mass_data.center;
            inertia += mass_data.rotational_inertia;
        }

        let Some(body) = self.bodies.get_mut(body_id) else {
            return;
        };
        if mass > 0.0 {
            body.mass = mass;
            body.inv_mass = 1.0 / mass;
            center /= mass;
            body.local_center = center;
            let central_inertia = inertia - mass * center.dot(center);
            body.inertia = central_inertia;
            body.inv_inertia = if central_inertia > 0.0 {
                1.0 / central_inertia
            } else {
                0.0
            };
        } else {
            // Dynamic bodies never have zero mass.
            body.mass = 1.0;
            body.inv_mass = 1.0;
            body.inertia = 0.0;
            body.inv_inertia = 0.0;
            body.local_center = Vec2::ZERO;
        }
        body.update_center();
    }

    /// Creates a chain of connected segments with ghost vertices.
    pub fn create_chain(&mut self, body_id: EntityId, def: &ChainDef) -> EntityId {
        let min_points = if def.is_loop { 3 } else { 2 };
        if def.points.len() < min_points {
            warn!("create_chain rejected: not enough points");
            return EntityId::NULL;
        }
        if !self.bodies.contains(body_id) {
            warn!("create_chain rejected: stale body id");
            return EntityId::NULL;
        }

        let chain_id = self.chains.insert(Chain {
            id: EntityId::NULL,
            body_id,
            shape_ids: Vec::new(),
            is_loop: def.is_loop,
        });
        if let Some(chain) = self.chains.get_mut(chain_id) {
            chain.id = chain_id;
        }

        let points = &def.points;
        let n = points.len();
        let segment_count = if def.is_loop { n } else { n - 1 };

        let shape_def = ShapeDef {
            material: def.material,
            filter: def.filter,
            density: 0.0,
            update_body_mass: false,
            ..ShapeDef::default()
        };

        let mut shape_ids = Vec::with_capacity(segment_count);
        for i in 0..segment_count {
            let point1 = points[i];
            let point2 = points[(i + 1) % n];
            // Open chains reuse the end vertices as their own ghosts, which
            // leaves the end regions collidable.
            let ghost1 = if def.is_loop {
                points[(i + n - 1) % n]
            } else if i > 0 {
                points[i - 1]
            } else {
                points[0]
            };
            let ghost2 = if def.is_loop {
                points[(i + 2) % n]
            } else if i + 2 < n {
                points[i + 2]
            } else {
                points[n - 1]
            };

            let kind = ShapeKind::ChainSegment {
                ghost1,
                point1,
                point2,
                ghost2,
                chain_id,
            };
            shape_ids.push(self.create_shape(body_id, &shape_def, kind));
        }

        if let Some(chain) = self.chains.get_mut(chain_id) {
            chain.shape_ids = shape_ids;
        }
        chain_id
    }

    pub fn destroy_chain(&mut self, chain_id: EntityId) {
        let Some(chain) = self.chains.get(chain_id) else {
            return;
        };
        for shape_id in chain.shape_ids.clone() {
            self.destroy_shape_internal(shape_id, false);
        }
        self.chains.remove(chain_id);
    }

    pub fn shape_body(&self, shape_id: EntityId) -> EntityId {
        self.shapes
            .get(shape_id)
            .map_or(EntityId::NULL, |s| s.body_id)
    }

    pub fn shape_aabb(&self, shape_id: EntityId) -> Aabb {
        self.shapes.get(shape_id).map_or(Aabb::default(), |s| s.aabb)
    }

    /// Manifolds of the body's currently touching contacts.
    pub fn body_contacts(&self, body_id: EntityId) -> Vec<Manifold> {
        let Some(body) = self.bodies.get(body_id) else {
            return Vec::new();
        };
        body.contacts
            .iter()
            .filter_map(|&contact_id| {
                let contact = self.contacts.get(contact_id)?;
                (contact.touching && !contact.is_sensor).then_some(contact.manifold)
            })
            .collect()
    }

    fn refresh_shape_proxy(&mut self, shape_id: EntityId, displacement: Vec2) {
        let Some(shape) = self.shapes.get(shape_id) else {
            return;
        };
        let Some(body) = self.bodies.get(shape.body_id) else {
            return;
        };
        let transform = body.transform;
        let proxy_id = shape.proxy_id;
        let tight = shape.kind.compute_aabb(&transform);
        if let Some(shape) = self.shapes.get_mut(shape_id) {
            shape.aabb = tight;
        }
        if proxy_id != usize::MAX {
            self.broadphase.move_proxy(proxy_id, tight, displacement);
            if let Some(shape) = self.shapes.get_mut(shape_id) {
                shape.fat_aabb = self.broadphase.fat_aabb(proxy_id);
            }
        }
    }

    // ---------------------------------------------------------------
    // Joints
    // ---------------------------------------------------------------

    pub fn create_joint(&mut self, def: &JointDef) -> EntityId {
        if !self.bodies.contains(def.body_a) || !self.bodies.contains(def.body_b) {
            warn!("create_joint rejected: stale body id");
            return EntityId::NULL;
        }

        self.wake_body(def.body_a);
        self.wake_body(def.body_b);

        let joint_id = self.joints.insert(Joint::from_def(EntityId::NULL, def));
        if let Some(joint) = self.joints.get_mut(joint_id) {
            joint.id = joint_id;
        }

        if let Some(body) = self.bodies.get_mut(def.body_a) {
            body.joints.push(joint_id);
        }
        if let Some(body) = self.bodies.get_mut(def.body_b) {
            body.joints.push(joint_id);
        }

        let both_static = self.bodies.get(def.body_a).is_some_and(|b| b.is_static())
            && self.bodies.get(def.body_b).is_some_and(|b| b.is_static());
        let set_index = if both_static { STATIC_SET } else { AWAKE_SET };
        if let Some(joint) = self.joints.get_mut(joint_id) {
            self.solver_sets.add_joint(set_index, joint);
        }
        if set_index == AWAKE_SET {
            self.add_joint_to_graph(joint_id);
            island::link_joint(
                &mut self.islands,
                &mut self.bodies,
                &mut self.contacts,
                &mut self.joints,
                joint_id,
            );
        }

        // Suppress existing contacts between the bodies if requested.
        if !def.collide_connected {
            let contact_ids: Vec<EntityId> = self
                .bodies
                .get(def.body_a)
                .map(|body| {
                    body.contacts
                        .iter()
                        .copied()
                        .filter(|&cid| {
                            self.contacts.get(cid).is_some_and(|c| {
                                (c.body_a == def.body_a && c.body_b == def.body_b)
                                    || (c.body_a == def.body_b && c.body_b == def.body_a)
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            for contact_id in contact_ids {
                self.destroy_contact(contact_id, true);
            }
        }

        joint_id
    }

    pub fn destroy_joint(&mut self, joint_id: EntityId) {
        let Some(joint) = self.joints.get(joint_id) else {
            return;
        };
        let (body_a, body_b) = (joint.body_a, joint.body_b);

        self.wake_body(body_a);
        self.wake_body(body_b);

        let (index_a, index_b) = self.joint_body_dynamic_indices(joint_id);
        self.graph
            .remove_joint(&mut self.joints, joint_id, index_a, index_b);
        island::unlink_joint(&mut self.islands, &mut self.joints, joint_id);
        self.solver_sets.remove_joint(&mut self.joints, joint_id);

        if let Some(body) = self.bodies.get_mut(body_a) {
            body.joints.retain(|&id| id != joint_id);
        }
        if let Some(body) = self.bodies.get_mut(body_b) {
            body.joints.retain(|&id| id != joint_id);
        }
        let collide_connected = self
            .joints
            .get(joint_id)
            .is_some_and(|j| j.collide_connected);
        self.joints.remove(joint_id);

        // A suppressing joint is gone; let the pair report again.
        if !collide_connected {
            for body_id in [body_a, body_b] {
                let shape_ids = self
                    .bodies
                    .get(body_id)
                    .map(|b| b.shapes.clone())
                    .unwrap_or_default();
                for shape_id in shape_ids {
                    if let Some(shape) = self.shapes.get(shape_id) {
                        if shape.proxy_id != usize::MAX {
                            self.broadphase.buffer_move(shape.proxy_id);
                        }
                    }
                }
            }
        }
    }

    pub fn joint_kind(&self, joint_id: EntityId) -> Option<&JointKind> {
        self.joints.get(joint_id).map(|j| &j.kind)
    }

    /// Mutable access to joint tunables (limits, motors, springs). Wakes
    /// both bodies so the change takes effect immediately.
    pub fn joint_kind_mut(&mut self, joint_id: EntityId) -> Option<&mut JointKind> {
        let (body_a, body_b) = {
            let joint = self.joints.get(joint_id)?;
            (joint.body_a, joint.body_b)
        };
        self.wake_body(body_a);
        self.wake_body(body_b);
        self.joints.get_mut(joint_id).map(|j| &mut j.kind)
    }

    /// Reaction force and torque of the joint from the last step.
    pub fn joint_reaction(&self, joint_id: EntityId, inv_dt: f32) -> (Vec2, f32) {
        self.joints
            .get(joint_id)
            .map_or((Vec2::ZERO, 0.0), |j| joints::joint_reaction(j, inv_dt))
    }

    fn joint_body_dynamic_indices(&self, joint_id: EntityId) -> (Option<usize>, Option<usize>) {
        let Some(joint) = self.joints.get(joint_id) else {
            return (None, None);
        };
        let index_a = self
            .bodies
            .get(joint.body_a)
            .and_then(|b| b.is_dynamic().then_some(b.id.index()));
        let index_b = self
            .bodies
            .get(joint.body_b)
            .and_then(|b| b.is_dynamic().then_some(b.id.index()));
        (index_a, index_b)
    }

    fn add_joint_to_graph(&mut self, joint_id: EntityId) {
        let is_filter = self
            .joints
            .get(joint_id)
            .is_none_or(|j| matches!(j.kind, JointKind::Filter));
        if is_filter {
            return;
        }
        let (index_a, index_b) = self.joint_body_dynamic_indices(joint_id);
        if let Some(joint) = self.joints.get_mut(joint_id) {
            self.graph.add_joint(joint, index_a, index_b);
        }
    }

    // ---------------------------------------------------------------
    // Contacts
    // ---------------------------------------------------------------

    fn create_contact(&mut self, shape_a_id: EntityId, shape_b_id: EntityId) {
        let (Some(shape_a), Some(shape_b)) =
            (self.shapes.get(shape_a_id), self.shapes.get(shape_b_id))
        else {
            return;
        };

        let friction = (self.friction_mix)(
            shape_a.material.friction,
            shape_a.material.user_material_id,
            shape_b.material.friction,
            shape_b.material.user_material_id,
        );
        let restitution = (self.restitution_mix)(
            shape_a.material.restitution,
            shape_a.material.user_material_id,
            shape_b.material.restitution,
            shape_b.material.user_material_id,
        );

        let contact_id = self
            .contacts
            .insert(Contact::new(EntityId::NULL, shape_a, shape_b, friction, restitution));
        let (body_a_id, body_b_id) = (shape_a.body_id, shape_b.body_id);

        if let Some(contact) = self.contacts.get_mut(contact_id) {
            contact.id = contact_id;
            self.solver_sets.add_contact(AWAKE_SET, contact);
        }

        if let Some(body) = self.bodies.get_mut(body_a_id) {
            body.contacts.push(contact_id);
        }
        if let Some(body) = self.bodies.get_mut(body_b_id) {
            body.contacts.push(contact_id);
        }
    }

    fn destroy_contact(&mut self, contact_id: EntityId, emit_end_event: bool) {
        let Some(contact) = self.contacts.get(contact_id) else {
            return;
        };
        let (shape_a_id, shape_b_id) = (contact.shape_a, contact.shape_b);
        let (body_a_id, body_b_id) = (contact.body_a, contact.body_b);
        let touching = contact.touching;
        let is_sensor = contact.is_sensor;
        let events_enabled = contact.enable_contact_events;

        if touching {
            if is_sensor {
                if emit_end_event {
                    let (sensor, visitor) = self.sensor_pair(shape_a_id, shape_b_id);
                    self.events.push_sensor_end(SensorEndEvent {
                        sensor_shape: sensor,
                        visitor_shape: visitor,
                    });
                }
            } else {
                if emit_end_event && events_enabled {
                    self.events.push_contact_end(ContactEndEvent {
                        shape_a: shape_a_id,
                        shape_b: shape_b_id,
                    });
                }
                let (index_a, index_b) = self.contact_body_dynamic_indices(contact_id);
                self.graph
                    .remove_contact(&mut self.contacts, contact_id, index_a, index_b);
                island::unlink_contact(&mut self.islands, &mut self.contacts, contact_id);
            }
        }

        // Let the broad phase report the pair again if it re-overlaps.
        let proxy_a = self.shapes.get(shape_a_id).map(|s| s.proxy_id);
        let proxy_b = self.shapes.get(shape_b_id).map(|s| s.proxy_id);
        if let (Some(pa), Some(pb)) = (proxy_a, proxy_b) {
            if pa != usize::MAX && pb != usize::MAX {
                self.broadphase.unpair(pa, pb);
            }
        }

        self.solver_sets.remove_contact(&mut self.contacts, contact_id);
        if let Some(body) = self.bodies.get_mut(body_a_id) {
            body.contacts.retain(|&id| id != contact_id);
        }
        if let Some(body) = self.bodies.get_mut(body_b_id) {
            body.contacts.retain(|&id| id != contact_id);
        }
        self.contacts.remove(contact_id);
    }

    fn contact_body_dynamic_indices(&self, contact_id: EntityId) -> (Option<usize>, Option<usize>) {
        let Some(contact) = self.contacts.get(contact_id) else {
            return (None, None);
        };
        let index_a = self
            .bodies
            .get(contact.body_a)
            .and_then(|b| b.is_dynamic().then_some(b.id.index()));
        let index_b = self
            .bodies
            .get(contact.body_b)
            .and_then(|b| b.is_dynamic().then_some(b.id.index()));
        (index_a, index_b)
    }

    fn sensor_pair(&self, shape_a: EntityId, shape_b: EntityId) -> (EntityId, EntityId) {
        let a_is_sensor = self.shapes.get(shape_a).is_some_and(|s| s.is_sensor);
        if a_is_sensor {
            (shape_a, shape_b)
        } else {
            (shape_b, shape_a)
        }
    }

    // ---------------------------------------------------------------
    // Sleep and wake
    // ---------------------------------------------------------------

    fn wake_solver_set(&mut self, set_index: usize) {
        debug_assert!(set_index >= FIRST_SLEEPING_SET);
        let set = self.solver_sets.get(set_index);
        let body_ids = set.body_ids.clone();
        let contact_ids = set.contact_ids.clone();
        let joint_ids = set.joint_ids.clone();
        let island_id = set.island_id;

        for body_id in body_ids {
            self.solver_sets.remove_body(&mut self.bodies, body_id);
            if let Some(body) = self.bodies.get_mut(body_id) {
                body.sleep_time = 0.0;
                self.solver_sets.add_body(AWAKE_SET, body);
            }
        }
        for contact_id in contact_ids {
            self.solver_sets.remove_contact(&mut self.contacts, contact_id);
            if let Some(contact) = self.contacts.get_mut(contact_id) {
                self.solver_sets.add_contact(AWAKE_SET, contact);
            }
            let touching_solid = self
                .contacts
                .get(contact_id)
                .is_some_and(|c| c.touching && !c.is_sensor);
            if touching_solid {
                let (index_a, index_b) = self.contact_body_dynamic_indices(contact_id);
                if let Some(contact) = self.contacts.get_mut(contact_id) {
                    self.graph.add_contact(contact, index_a, index_b);
                }
            }
        }
        for joint_id in joint_ids {
            self.solver_sets.remove_joint(&mut self.joints, joint_id);
            if let Some(joint) = self.joints.get_mut(joint_id) {
                self.solver_sets.add_joint(AWAKE_SET, joint);
            }
            self.add_joint_to_graph(joint_id);
        }

        if let Some(island) = self.islands.get_mut(island_id) {
            island.set_index = AWAKE_SET;
        }
        self.solver_sets.free_sleeping_set(set_index);
    }

    fn sleep_island(&mut self, island_id: EntityId) {
        let Some(island) = self.islands.get(island_id) else {
            return;
        };
        debug_assert_eq!(island.set_index, AWAKE_SET);
        let set_index = self.solver_sets.alloc_sleeping_set(island_id);

        // Walk the member bodies, zero velocities, and migrate them with
        // their constraints.
        let mut body_ids = Vec::with_capacity(island.body_count);
        let mut body_id = island.head_body;
        while !body_id.is_null() {
            body_ids.push(body_id);
            body_id = self
                .bodies
                .get(body_id)
                .map_or(EntityId::NULL, |b| b.island_next);
        }

        for &body_id in &body_ids {
            let (contact_ids, transform) = {
                let Some(body) = self.bodies.get_mut(body_id) else {
                    continue;
                };
                body.velocity = Velocity::default();
                body.force = Vec2::ZERO;
                body.torque = 0.0;
                (body.contacts.clone(), body.transform)
            };
            self.events.body_move.push(BodyMoveEvent {
                body_id,
                transform,
                fell_asleep: true,
            });
            self.solver_sets.remove_body(&mut self.bodies, body_id);
            if let Some(body) = self.bodies.get_mut(body_id) {
                self.solver_sets.add_body(set_index, body);
            }

            for contact_id in contact_ids {
                let Some(contact) = self.contacts.get(contact_id) else {
                    continue;
                };
                if contact.set_index != AWAKE_SET {
                    continue;
                }
                let other_body = if contact.body_a == body_id {
                    contact.body_b
                } else {
                    contact.body_a
                };
                let other_set = self
                    .bodies
                    .get(other_body)
                    .map_or(usize::MAX, |b| b.set_index);
                // Keep the contact awake while the other body still is.
                if other_set == AWAKE_SET {
                    continue;
                }
                if contact.color_index != usize::MAX {
                    let (index_a, index_b) = self.contact_body_dynamic_indices(contact_id);
                    self.graph
                        .remove_contact(&mut self.contacts, contact_id, index_a, index_b);
                }
                self.solver_sets.remove_contact(&mut self.contacts, contact_id);
                if let Some(contact) = self.contacts.get_mut(contact_id) {
                    self.solver_sets.add_contact(set_index, contact);
                }
            }

            let joint_ids = self
                .bodies
                .get(body_id)
                .map(|b| b.joints.clone())
                .unwrap_or_default();
            for joint_id in joint_ids {
                let Some(joint) = self.joints.get(joint_id) else {
                    continue;
                };
                if joint.set_index != AWAKE_SET {
                    continue;
                }
                let other_body = if joint.body_a == body_id {
                    joint.body_b
                } else {
                    joint.body_a
                };
                let other_set = self
                    .bodies
                    .get(other_body)
                    .map_or(usize::MAX, |b| b.set_index);
                if other_set == AWAKE_SET {
                    continue;
                }
                if joint.color_index != usize::MAX {
                    let (index_a, index_b) = self.joint_body_dynamic_indices(joint_id);
                    self.graph
                        .remove_joint(&mut self.joints, joint_id, index_a, index_b);
                }
                self.solver_sets.remove_joint(&mut self.joints, joint_id);
                if let Some(joint) = self.joints.get_mut(joint_id) {
                    self.solver_sets.add_joint(set_index, joint);
                }
            }
        }

        if let Some(island) = self.islands.get_mut(island_id) {
            island.set_index = set_index;
        }
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    /// Visits every shape whose fat AABB overlaps the box. The callback
    /// keeps traversal alive by returning `true`.
    pub fn query_aabb(
        &self,
        aabb: Aabb,
        filter: QueryFilter,
        callback: &mut dyn FnMut(EntityId) -> bool,
    ) {
        let shapes = &self.shapes;
        self.broadphase.tree.query(aabb, filter.mask, &mut |_, user_data| {
            let shape_id = EntityId::from_bits(user_data);
            match shapes.get(shape_id) {
                Some(shape) if should_query(&shape.filter, &filter) => callback(shape_id),
                _ => true,
            }
        });
    }

    /// Ray cast visiting shapes along the ray. The callback returns the
    /// new maximum fraction: zero terminates, negative ignores the hit.
    pub fn cast_ray(
        &self,
        origin: Vec2,
        translation: Vec2,
        filter: QueryFilter,
        callback: &mut dyn FnMut(EntityId, Vec2, Vec2, f32) -> f32,
    ) {
        let input = RayCastInput {
            origin,
            translation,
            max_fraction: 1.0,
        };
        let shapes = &self.shapes;
        let bodies = &self.bodies;
        self.broadphase
            .tree
            .ray_cast(&input, filter.mask, &mut |sub_input, _, user_data| {
                let shape_id = EntityId::from_bits(user_data);
                let Some(shape) = shapes.get(shape_id) else {
                    return sub_input.max_fraction;
                };
                if !should_query(&shape.filter, &filter) {
                    return sub_input.max_fraction;
                }
                let Some(body) = bodies.get(shape.body_id) else {
                    return sub_input.max_fraction;
                };
                let output = shape.kind.ray_cast(sub_input, &body.transform);
                if output.hit {
                    let value = callback(shape_id, output.point, output.normal, output.fraction);
                    if value < 0.0 {
                        sub_input.max_fraction
                    } else {
                        value
                    }
                } else {
                    sub_input.max_fraction
                }
            });
    }

    /// Closest hit along a ray, if any.
    pub fn cast_ray_closest(
        &self,
        origin: Vec2,
        translation: Vec2,
        filter: QueryFilter,
    ) -> Option<RayHit> {
        let mut result: Option<RayHit> = None;
        self.cast_ray(origin, translation, filter, &mut |shape_id, point, normal, fraction| {
            result = Some(RayHit {
                shape_id,
                point,
                normal,
                fraction,
            });
            fraction
        });
        result
    }

    /// Sweeps a shape through the world. The callback contract matches
    /// [`World::cast_ray`].
    pub fn cast_shape(
        &self,
        kind: &ShapeKind,
        transform: Transform,
        translation: Vec2,
        filter: QueryFilter,
        callback: &mut dyn FnMut(EntityId, Vec2, Vec2, f32) -> f32,
    ) {
        let proxy_aabb = kind.compute_aabb(&transform);
        let cast_proxy = DistanceProxy::from_shape(kind);
        let shapes = &self.shapes;
        let bodies = &self.bodies;
        let mut max_fraction = 1.0_f32;

        self.broadphase
            .tree
            .shape_cast(proxy_aabb, translation, filter.mask, &mut |_, user_data| {
                let shape_id = EntityId::from_bits(user_data);
                let Some(shape) = shapes.get(shape_id) else {
                    return max_fraction;
                };
                if !should_query(&shape.filter, &filter) {
                    return max_fraction;
                }
                let Some(body) = bodies.get(shape.body_id) else {
                    return max_fraction;
                };

                let pair = ShapeCastPairInput {
                    proxy_a: DistanceProxy::from_shape(&shape.kind),
                    proxy_b: cast_proxy,
                    transform_a: body.transform,
                    transform_b: transform,
                    translation_b: translation,
                    max_fraction,
                    can_encroach: false,
                };
                let output = crate::collision::distance::shape_cast(&pair);
                if output.hit {
                    let value = callback(shape_id, output.point, output.normal, output.fraction);
                    if value >= 0.0 {
                        max_fraction = value.min(max_fraction);
                    }
                    if value == 0.0 {
                        return 0.0;
                    }
                }
                max_fraction
            });
    }

    // ---------------------------------------------------------------
    // Events and diagnostics
    // ---------------------------------------------------------------

    pub fn body_events(&self) -> BodyEvents<'_> {
        BodyEvents {
            moves: &self.events.body_move,
        }
    }

    pub fn contact_events(&self) -> ContactEvents<'_> {
        ContactEvents {
            begin: &self.events.contact_begin,
            end: &self.events.contact_end[self.events.end_index],
            hit: &self.events.contact_hit,
        }
    }

    pub fn sensor_events(&self) -> SensorEvents<'_> {
        SensorEvents {
            begin: &self.events.sensor_begin,
            end: &self.events.sensor_end[self.events.end_index],
        }
    }

    pub fn joint_events(&self) -> JointEvents<'_> {
        JointEvents {
            events: &self.events.joint,
        }
    }

    pub fn counters(&self) -> Counters {
        Counters {
            body_count: self.bodies.len(),
            shape_count: self.shapes.len(),
            contact_count: self.contacts.len(),
            joint_count: self.joints.len(),
            island_count: self.islands.len(),
            sleeping_set_count: self.solver_sets.sleeping_set_count(),
            tree_height: self.broadphase.tree.height(),
            color_counts: self.graph.color_counts(),
        }
    }

    /// Structural validation used by tests and debug builds.
    pub fn validate(&self) {
        self.broadphase.tree.validate();
        for (id, body) in self.bodies.iter_with_ids() {
            let set = self.solver_sets.get(body.set_index);
            assert_eq!(set.body_ids[body.set_slot], id);
            if body.set_index >= FIRST_SLEEPING_SET {
                assert_eq!(body.velocity.linear, Vec2::ZERO);
                assert_eq!(body.velocity.angular, 0.0);
            }
        }
    }

    // ---------------------------------------------------------------
    // Step
    // ---------------------------------------------------------------

    /// Advances the simulation by `dt` using `sub_step_count` substeps.
    pub fn step(&mut self, dt: f32, sub_step_count: u32) {
        if !is_valid_float(dt) || dt <= 0.0 {
            return;
        }
        let _scope = ScopedTimer::new("world::step");
        let step_start = std::time::Instant::now();
        self.profile.reset();
        self.events.begin_step();

        let contact_capacity = self.contacts.capacity();
        let joint_capacity = self.joints.capacity();
        let body_capacity = self.bodies.capacity();
        for context in &self.task_contexts {
            context
                .lock()
                .reset(contact_capacity, joint_capacity, body_capacity);
        }

        // Broad phase: drain moved proxies into new pairs.
        let phase_start = std::time::Instant::now();
        {
            let new_pairs = self.broadphase.update_pairs(
                &self.shapes,
                &self.bodies,
                &self.joints,
                self.custom_filter.as_deref(),
            );
            for (shape_a, shape_b) in new_pairs {
                self.create_contact(shape_a, shape_b);
            }
        }
        self.profile.update_pairs_time = phase_start.elapsed();

        // Narrow phase on awake contacts.
        let phase_start = std::time::Instant::now();
        self.narrow_phase();
        self.profile.narrow_phase_time = phase_start.elapsed();

        // Solve the awake set.
        let sub_step_count = sub_step_count.max(1);
        let phase_start = std::time::Instant::now();
        self.solve(dt, sub_step_count);
        self.profile.solve_time = phase_start.elapsed();

        // Continuous pass for bullets.
        if self.enable_continuous {
            let phase_start = std::time::Instant::now();
            self.continuous_pass(dt);
            self.profile.continuous_time = phase_start.elapsed();
        }

        self.profile.body_count = self.bodies.len();
        self.profile.contact_count = self.contacts.len();
        self.profile.joint_count = self.joints.len();
        self.profile.island_count = self.islands.len();
        self.profile.total_step_time = step_start.elapsed();
        if log::log_enabled!(log::Level::Debug) {
            self.profile.report();
        }
    }

    fn narrow_phase(&mut self) {
        let awake_contact_ids = self.solver_sets.get(AWAKE_SET).contact_ids.clone();
        let count = awake_contact_ids.len();
        if count == 0 {
            return;
        }

        let mut results: Vec<Option<NarrowResult>> = Vec::with_capacity(count);
        results.resize_with(count, || None);

        {
            let shared = SharedSlice::new(&mut results);
            let contacts = &self.contacts;
            let shapes = &self.shapes;
            let bodies = &self.bodies;
            let ids = &awake_contact_ids;
            let task_contexts = &self.task_contexts;

            self.executor.for_each(count, 8, &|start, end, worker| {
                let mut context = task_contexts[worker % task_contexts.len()].lock();
                for i in start..end {
                    let contact_id = ids[i];
                    let Some(contact) = contacts.get(contact_id) else {
                        continue;
                    };
                    let (Some(shape_a), Some(shape_b)) =
                        (shapes.get(contact.shape_a), shapes.get(contact.shape_b))
                    else {
                        continue;
                    };

                    // Pair death: the fat AABBs no longer overlap.
                    if !Aabb::overlaps(&shape_a.fat_aabb, &shape_b.fat_aabb) {
                        unsafe { *shared.get_mut(i) = Some(NarrowResult::Disjoint) };
                        context.contact_state_bits.set(contact_id.index());
                        continue;
                    }

                    let (Some(body_a), Some(body_b)) =
                        (bodies.get(shape_a.body_id), bodies.get(shape_b.body_id))
                    else {
                        continue;
                    };

                    let update = contact::evaluate_contact(
                        contact,
                        shape_a,
                        &body_a.transform,
                        shape_b,
                        &body_b.transform,
                    );
                    if update.touching != contact.touching {
                        context.contact_state_bits.set(contact_id.index());
                        if contact.is_sensor && update.touching {
                            let (sensor, visitor) = if shape_a.is_sensor {
                                (shape_a.id, shape_b.id)
                            } else {
                                (shape_b.id, shape_a.id)
                            };
                            context.sensor_hits.push(SensorHit {
                                sensor_shape: sensor,
                                visitor_shape: visitor,
                            });
                        }
                    }
                    unsafe { *shared.get_mut(i) = Some(NarrowResult::Updated(update)) };
                }
            });
        }

        // Barrier: merge worker results in deterministic order.
        let mut changed = BitSet::with_capacity(self.contacts.capacity());
        for context in &self.task_contexts {
            let mut context = context.lock();
            changed.or_with(&context.contact_state_bits);
            for hit in context.sensor_hits.drain(..) {
                let enabled = self
                    .shapes
                    .get(hit.sensor_shape)
                    .is_some_and(|s| s.enable_sensor_events);
                if enabled {
                    self.events.sensor_begin.push(SensorBeginEvent {
                        sensor_shape: hit.sensor_shape,
                        visitor_shape: hit.visitor_shape,
                    });
                }
            }
        }

        let mut disjoint = Vec::new();
        for (i, result) in results.into_iter().enumerate() {
            let contact_id = awake_contact_ids[i];
            match result {
                None => {}
                Some(NarrowResult::Disjoint) => disjoint.push(contact_id),
                Some(NarrowResult::Updated(mut update)) => {
                    // Last-chance user veto on new or persisting touches.
                    let mut vetoed = false;
                    if update.touching && !self.contact_is_sensor(contact_id) {
                        if let Some(pre_solve) = self.pre_solve.as_deref() {
                            let (sa, sb) = {
                                let contact = self.contacts.get(contact_id);
                                match contact {
                                    Some(c) => (c.shape_a, c.shape_b),
                                    None => continue,
                                }
                            };
                            let point = update.manifold.points[0].point;
                            let normal = update.manifold.normal;
                            if !pre_solve(sa, sb, point, normal) {
                                update.touching = false;
                                update.manifold = Manifold::default();
                                vetoed = true;
                            }
                        }
                    }

                    let Some(contact) = self.contacts.get_mut(contact_id) else {
                        continue;
                    };
                    let (was, now) = contact::apply_contact_update(contact, update);
                    // Workers flagged state flips; a veto can add one they
                    // could not see.
                    if (changed.test(contact_id.index()) || vetoed) && was != now {
                        self.on_touch_transition(contact_id, now);
                    }
                }
            }
        }

        for contact_id in disjoint {
            self.destroy_contact(contact_id, true);
        }
    }

    fn contact_is_sensor(&self, contact_id: EntityId) -> bool {
        self.contacts
            .get(contact_id)
            .is_some_and(|contact| contact.is_sensor)
    }

    fn on_touch_transition(&mut self, contact_id: EntityId, now_touching: bool) {
        let Some(contact) = self.contacts.get(contact_id) else {
            return;
        };
        let is_sensor = contact.is_sensor;
        let events_enabled = contact.enable_contact_events;
        let (shape_a, shape_b) = (contact.shape_a, contact.shape_b);
        let (body_a, body_b) = (contact.body_a, contact.body_b);
        let manifold = contact.manifold;

        if is_sensor {
            if !now_touching {
                let enabled = {
                    let (sensor, _) = self.sensor_pair(shape_a, shape_b);
                    self.shapes
                        .get(sensor)
                        .is_some_and(|s| s.enable_sensor_events)
                };
                if enabled {
                    let (sensor, visitor) = self.sensor_pair(shape_a, shape_b);
                    self.events.push_sensor_end(SensorEndEvent {
                        sensor_shape: sensor,
                        visitor_shape: visitor,
                    });
                }
            }
            return;
        }

        if now_touching {
            // Begin touch: wake sleeping participants, join islands, color.
            self.wake_body(body_a);
            self.wake_body(body_b);
            island::link_contact(
                &mut self.islands,
                &mut self.bodies,
                &mut self.contacts,
                &mut self.joints,
                contact_id,
            );
            let (index_a, index_b) = self.contact_body_dynamic_indices(contact_id);
            if let Some(contact) = self.contacts.get_mut(contact_id) {
                self.graph.add_contact(contact, index_a, index_b);
            }
            if events_enabled {
                self.events.contact_begin.push(ContactBeginEvent {
                    shape_a,
                    shape_b,
                    manifold,
                });
            }
        } else {
            if events_enabled {
                self.events.push_contact_end(ContactEndEvent { shape_a, shape_b });
            }
            let (index_a, index_b) = self.contact_body_dynamic_indices(contact_id);
            self.graph
                .remove_contact(&mut self.contacts, contact_id, index_a, index_b);
            island::unlink_contact(&mut self.islands, &mut self.contacts, contact_id);
        }
    }

    fn solve(&mut self, dt: f32, sub_step_count: u32) {
        let awake_body_ids = self.solver_sets.get(AWAKE_SET).body_ids.clone();
        let body_count = awake_body_ids.len();

        let h = dt / sub_step_count as f32;
        let inv_h = if h > 0.0 { 1.0 / h } else { 0.0 };

        if body_count > 0 {
            // Build the dense solver arrays.
            let mut states = Vec::with_capacity(body_count);
            let mut params = Vec::with_capacity(body_count);
            for (solver_index, &body_id) in awake_body_ids.iter().enumerate() {
                let Some(body) = self.bodies.get_mut(body_id) else {
                    // Keep the dense arrays aligned with the id list.
                    states.push(SolverBody::STATIC);
                    params.push(SolverBodyParams {
                        force: Vec2::ZERO,
                        torque: 0.0,
                        gravity_scale: 0.0,
                        linear_damping: 0.0,
                        angular_damping: 0.0,
                    });
                    continue;
                };
                body.solver_index = solver_index;
                states.push(SolverBody {
                    linear_velocity: body.velocity.linear,
                    angular_velocity: body.velocity.angular,
                    delta_position: Vec2::ZERO,
                    delta_rotation: Rot::IDENTITY,
                    inv_mass: body.inv_mass,
                    inv_inertia: body.inv_inertia,
                    locks: body.motion_locks,
                });
                params.push(SolverBodyParams {
                    force: body.force,
                    torque: body.torque,
                    gravity_scale: body.gravity_scale,
                    linear_damping: body.linear_damping,
                    angular_damping: body.angular_damping,
                });
            }

            // Prepare constraints per color.
            let color_count = self.graph.colors.len();
            let mut contact_constraints: Vec<Vec<ContactConstraint>> =
                Vec::with_capacity(color_count);
            let mut joint_solvers: Vec<Vec<Joint>> = Vec::with_capacity(color_count);

            for color_index in 0..color_count {
                let contact_ids = self.graph.colors[color_index].contact_ids.clone();
                let mut constraints = Vec::with_capacity(contact_ids.len());
                for contact_id in contact_ids {
                    let Some(contact) = self.contacts.get(contact_id) else {
                        continue;
                    };
                    let (Some(body_a), Some(body_b)) =
                        (self.bodies.get(contact.body_a), self.bodies.get(contact.body_b))
                    else {
                        continue;
                    };
                    if !self.enable_warm_starting {
                        // Discard stored impulses before prepare copies them.
                        let mut contact = contact.clone();
                        for point in contact.manifold.points.iter_mut() {
                            point.normal_impulse = 0.0;
                            point.tangent_impulse = 0.0;
                        }
                        constraints.push(solver::prepare_contact_constraint(
                            &contact, body_a, body_b, h,
                        ));
                    } else {
                        constraints.push(solver::prepare_contact_constraint(
                            contact, body_a, body_b, h,
                        ));
                    }
                }
                contact_constraints.push(constraints);

                let joint_ids = self.graph.colors[color_index].joint_ids.clone();
                let mut solvers = Vec::with_capacity(joint_ids.len());
                for joint_id in joint_ids {
                    let Some(joint) = self.joints.get(joint_id) else {
                        continue;
                    };
                    let mut clone = joint.clone();
                    if !self.enable_warm_starting {
                        joints::reset_joint_impulses(&mut clone);
                    }
                    joints::prepare_joint(&mut clone, &self.bodies, h);
                    solvers.push(clone);
                }
                joint_solvers.push(solvers);
            }

            let joint_soft = solver::make_soft(
                self.joint_hertz.min(0.25 * inv_h),
                self.joint_damping_ratio,
                h,
            );
            let restitution_threshold = self.restitution_threshold;
            let warm = self.enable_warm_starting;

            // Substep loop.
            {
                let executor = self.executor.as_ref();
                let pass = SolvePass {
                    h,
                    inv_h,
                    joint_soft,
                    restitution_threshold,
                    warm,
                };

                for sub_step in 0..sub_step_count {
                    solver::integrate_velocities(&mut states, &params, self.gravity, h);

                    {
                        let shared_states = SolverStates::new(&mut states);
                        for phase in [SolvePhase::WarmStart, SolvePhase::Solve] {
                            for color_index in 0..color_count {
                                solve_color_pass(
                                    executor,
                                    &mut contact_constraints[color_index],
                                    &mut joint_solvers[color_index],
                                    &shared_states,
                                    color_index == OVERFLOW_COLOR,
                                    phase,
                                    &pass,
                                );
                            }
                        }
                    }

                    solver::integrate_positions(&mut states, h);

                    {
                        let shared_states = SolverStates::new(&mut states);
                        for color_index in 0..color_count {
                            solve_color_pass(
                                executor,
                                &mut contact_constraints[color_index],
                                &mut joint_solvers[color_index],
                                &shared_states,
                                color_index == OVERFLOW_COLOR,
                                SolvePhase::Relax,
                                &pass,
                            );
                        }

                        if sub_step + 1 == sub_step_count {
                            for color_index in 0..color_count {
                                solve_color_pass(
                                    executor,
                                    &mut contact_constraints[color_index],
                                    &mut joint_solvers[color_index],
                                    &shared_states,
                                    color_index == OVERFLOW_COLOR,
                                    SolvePhase::Restitution,
                                    &pass,
                                );
                            }
                        }
                    }
                }
            }

            // Hit events, while body centers still match the prepare pose.
            for constraints in &contact_constraints {
                for constraint in constraints {
                    self.collect_hit_event(constraint);
                }
            }

            // Store impulses for warm starting.
            for constraints in &contact_constraints {
                for constraint in constraints {
                    solver::store_impulses(constraint, &mut self.contacts);
                }
            }
            for solvers in &joint_solvers {
                for clone in solvers {
                    if let Some(joint) = self.joints.get_mut(clone.id) {
                        joint.kind = clone.kind.clone();
                    }
                }
            }

            // Finalize bodies and refresh proxies.
            let awake_island_bits = self.finalize_bodies(&awake_body_ids, &states, dt);

            // Joint events from the accumulated impulses.
            self.emit_joint_events(inv_h);

            // Sleep evaluation and the single island split.
            self.update_sleep(&awake_island_bits);
        }
    }

    fn collect_hit_event(&mut self, constraint: &ContactConstraint) {
        let Some(contact) = self.contacts.get(constraint.contact_id) else {
            return;
        };
        if !contact.enable_hit_events {
            return;
        }
        let Some(body_a) = self.bodies.get(contact.body_a) else {
            return;
        };

        let mut best_speed = 0.0_f32;
        let mut best_point = Vec2::ZERO;
        for point in constraint.points.iter().take(constraint.point_count) {
            let approach = -point.relative_velocity;
            if approach > best_speed && point.max_normal_impulse > 0.0 {
                best_speed = approach;
                best_point = body_a.center + point.anchor_a;
            }
        }
        if best_speed > self.hit_event_threshold {
            self.events.contact_hit.push(ContactHitEvent {
                shape_a: contact.shape_a,
                shape_b: contact.shape_b,
                point: best_point,
                normal: constraint.normal,
                approach_speed: best_speed,
            });
        }
    }

    /// Writes solver results back to the bodies. Returns the merged set of
    /// islands that must stay awake.
    fn finalize_bodies(
        &mut self,
        awake_body_ids: &[EntityId],
        states: &[SolverBody],
        dt: f32,
    ) -> BitSet {
        let body_moved = |state: &SolverBody| {
            state.delta_position != Vec2::ZERO
                || state.delta_rotation.s != 0.0
                || state.delta_rotation.c != 1.0
        };

        // Parallel pass: flag bodies whose shapes outgrew their fat AABBs
        // and islands with a member still moving too fast to sleep.
        {
            let bodies = &self.bodies;
            let shapes = &self.shapes;
            let ids = awake_body_ids;
            let task_contexts = &self.task_contexts;
            self.executor.for_each(ids.len(), 16, &|start, end, worker| {
                let mut context = task_contexts[worker % task_contexts.len()].lock();
                for i in start..end {
                    let Some(body) = bodies.get(ids[i]) else {
                        continue;
                    };
                    if body.is_static() {
                        continue;
                    }
                    let state = &states[i];

                    let sleepy = body.enable_sleep
                        && state.linear_velocity.length_squared()
                            < body.sleep_threshold * body.sleep_threshold
                        && state.angular_velocity.abs() < config::SLEEP_ANGULAR_VELOCITY;
                    if !sleepy && !body.island_id.is_null() {
                        context.awake_island_bits.set(body.island_id.index());
                    }

                    if body_moved(state) {
                        let center = body.center + state.delta_position;
                        let q = state.delta_rotation.mul(body.transform.q).normalize();
                        let xf = Transform {
                            p: center - q.apply(body.local_center),
                            q,
                        };
                        for &shape_id in &body.shapes {
                            let Some(shape) = shapes.get(shape_id) else {
                                continue;
                            };
                            let tight = shape.kind.compute_aabb(&xf);
                            if !shape.fat_aabb.contains(&tight) {
                                context.enlarged_body_bits.set(ids[i].index());
                                break;
                            }
                        }
                    }
                }
            });
        }

        let mut enlarged_bodies = BitSet::with_capacity(self.bodies.capacity());
        let mut awake_island_bits = BitSet::with_capacity(self.islands.capacity());
        for context in &self.task_contexts {
            let context = context.lock();
            enlarged_bodies.or_with(&context.enlarged_body_bits);
            awake_island_bits.or_with(&context.awake_island_bits);
        }

        // Sequential pass: apply states, timers, events, and proxy moves.
        for (solver_index, &body_id) in awake_body_ids.iter().enumerate() {
            let state = &states[solver_index];
            let shape_ids = {
                let Some(body) = self.bodies.get_mut(body_id) else {
                    continue;
                };
                if body.is_static() {
                    continue;
                }

                body.velocity.linear = state.linear_velocity;
                body.velocity.angular = state.angular_velocity;
                body.force = Vec2::ZERO;
                body.torque = 0.0;

                let moved = body_moved(state);
                if moved {
                    body.center += state.delta_position;
                    let q = state.delta_rotation.mul(body.transform.q).normalize();
                    body.transform.q = q;
                    body.transform.p = body.center - q.apply(body.local_center);
                }

                // Per-body sleep timer.
                let sleepy = body.enable_sleep
                    && body.velocity.linear.length_squared()
                        < body.sleep_threshold * body.sleep_threshold
                    && body.velocity.angular.abs() < config::SLEEP_ANGULAR_VELOCITY;
                if sleepy {
                    body.sleep_time += dt;
                } else {
                    body.sleep_time = 0.0;
                }

                if moved {
                    self.events.body_move.push(BodyMoveEvent {
                        body_id,
                        transform: body.transform,
                        fell_asleep: false,
                    });
                }

                // Proxies only need attention when some shape escaped its
                // fat AABB.
                if moved && enlarged_bodies.test(body_id.index()) {
                    body.shapes.clone()
                } else {
                    Vec::new()
                }
            };

            let displacement = dt * state.linear_velocity;
            for shape_id in shape_ids {
                self.refresh_shape_proxy(shape_id, displacement);
            }
        }

        awake_island_bits
    }

    fn emit_joint_events(&mut self, inv_h: f32) {
        let awake_joint_ids = self.solver_sets.get(AWAKE_SET).joint_ids.clone();
        if awake_joint_ids.is_empty() {
            return;
        }

        {
            let joints_arena = &self.joints;
            let ids = &awake_joint_ids;
            let task_contexts = &self.task_contexts;
            self.executor.for_each(ids.len(), 16, &|start, end, worker| {
                let mut context = task_contexts[worker % task_contexts.len()].lock();
                for i in start..end {
                    let Some(joint) = joints_arena.get(ids[i]) else {
                        continue;
                    };
                    if joint.force_threshold == f32::MAX && joint.torque_threshold == f32::MAX {
                        continue;
                    }
                    let (force, torque) = joints::joint_reaction(joint, inv_h);
                    if force.length() > joint.force_threshold
                        || torque.abs() > joint.torque_threshold
                    {
                        context.joint_state_bits.set(ids[i].index());
                    }
                }
            });
        }

        let mut flagged = BitSet::with_capacity(self.joints.capacity());
        for context in &self.task_contexts {
            flagged.or_with(&context.lock().joint_state_bits);
        }
        if flagged.is_empty() {
            return;
        }

        let mut id_by_index = vec![EntityId::NULL; self.joints.capacity()];
        for (id, _) in self.joints.iter_with_ids() {
            id_by_index[id.index()] = id;
        }
        for joint_index in flagged.iter() {
            let joint_id = id_by_index[joint_index];
            let Some(joint) = self.joints.get(joint_id) else {
                continue;
            };
            let (force, torque) = joints::joint_reaction(joint, inv_h);
            self.events.joint.push(JointEvent {
                joint_id,
                force,
                torque,
            });
        }
    }

    fn update_sleep(&mut self, awake_island_bits: &BitSet) {
        if !self.enable_sleep {
            return;
        }

        let awake_islands: Vec<EntityId> = self
            .islands
            .iter_with_ids()
            .filter(|(_, island)| island.set_index == AWAKE_SET)
            .map(|(id, _)| id)
            .collect();
        if awake_islands.is_empty() {
            return;
        }

        // Parallel scan: islands ready to sleep and per-worker split
        // candidates.
        let count = awake_islands.len();
        let mut verdicts: Vec<Option<f32>> = Vec::with_capacity(count);
        verdicts.resize_with(count, || None);
        {
            let shared = SharedSlice::new(&mut verdicts);
            let islands = &self.islands;
            let bodies = &self.bodies;
            let ids = &awake_islands;
            let task_contexts = &self.task_contexts;
            self.executor.for_each(count, 8, &|start, end, worker| {
                let mut context = task_contexts[worker % task_contexts.len()].lock();
                for i in start..end {
                    let island_id = ids[i];
                    let Some(island) = islands.get(island_id) else {
                        continue;
                    };
                    let flagged = island.constraint_remove_count > 0;
                    if !flagged && awake_island_bits.test(island_id.index()) {
                        continue;
                    }

                    let mut min_sleep = f32::MAX;
                    let mut body_id = island.head_body;
                    while !body_id.is_null() {
                        let Some(body) = bodies.get(body_id) else {
                            break;
                        };
                        if !body.enable_sleep || body.is_kinematic() {
                            min_sleep = 0.0;
                            break;
                        }
                        min_sleep = min_sleep.min(body.sleep_time);
                        body_id = body.island_next;
                    }
                    if min_sleep == f32::MAX {
                        min_sleep = 0.0;
                    }

                    if flagged {
                        // Flagged islands split before they may sleep.
                        let better = context.split_island_id.is_null()
                            || min_sleep > context.split_sleep_time;
                        if better {
                            context.split_island_id = island_id;
                            context.split_sleep_time = min_sleep;
                        }
                    } else if min_sleep >= config::TIME_TO_SLEEP {
                        unsafe { *shared.get_mut(i) = Some(min_sleep) };
                    }
                }
            });
        }

        for (i, verdict) in verdicts.iter().enumerate() {
            if verdict.is_some() {
                self.sleep_island(awake_islands[i]);
            }
        }

        // Merge the per-worker candidates; at most one split per step.
        let mut split_candidate = EntityId::NULL;
        let mut split_sleep_time = 0.0_f32;
        for context in &self.task_contexts {
            let context = context.lock();
            if context.split_island_id.is_null() {
                continue;
            }
            let better = split_candidate.is_null()
                || context.split_sleep_time > split_sleep_time
                || (context.split_sleep_time == split_sleep_time
                    && context.split_island_id.index() < split_candidate.index());
            if better {
                split_candidate = context.split_island_id;
                split_sleep_time = context.split_sleep_time;
            }
        }

        if !split_candidate.is_null() {
            if let Some(island) = self.islands.get_mut(split_candidate) {
                island.constraint_remove_count = 0;
            }
            let new_islands = island::split_island(
                &mut self.islands,
                &mut self.bodies,
                &mut self.contacts,
                &mut self.joints,
                split_candidate,
            );
            debug!("split island into {} components", new_islands.len());
        }
    }

    fn continuous_pass(&mut self, dt: f32) {
        let awake_body_ids = self.solver_sets.get(AWAKE_SET).body_ids.clone();

        // Bullet sweeps start from the pre-solve pose.
        let mut bullets = Vec::new();
        for &body_id in &awake_body_ids {
            let Some(body) = self.bodies.get(body_id) else {
                continue;
            };
            if !body.is_bullet || !body.is_dynamic() {
                continue;
            }
            let speed = body.velocity.linear.length();
            if speed * dt < config::LINEAR_SLOP {
                continue;
            }
            let c2 = body.center;
            let q2 = body.transform.q;
            let c1 = c2 - dt * body.velocity.linear;
            let q1 = q2.integrate(-body.velocity.angular, dt);
            bullets.push((body_id, c1, q1));
        }

        for (bullet_id, c1, q1) in bullets {
            let Some(bullet) = self.bodies.get(bullet_id) else {
                continue;
            };
            let sweep_bullet = Sweep {
                local_center: bullet.local_center,
                c1,
                c2: bullet.center,
                q1,
                q2: bullet.transform.q,
            };
            let bullet_shapes = bullet.shapes.clone();

            let mut min_fraction = 1.0_f32;
            let mut hit_any = false;

            for shape_id in &bullet_shapes {
                let Some(shape) = self.shapes.get(*shape_id) else {
                    continue;
                };
                if shape.is_sensor {
                    continue;
                }
                let aabb_start = shape.kind.compute_aabb(&sweep_bullet.transform_at(0.0));
                let aabb_end = shape.kind.compute_aabb(&sweep_bullet.transform_at(1.0));
                let swept = Aabb::union(aabb_start, aabb_end);

                let mut candidates = Vec::new();
                self.broadphase
                    .tree
                    .query(swept, shape.filter.mask, &mut |_, user_data| {
                        candidates.push(EntityId::from_bits(user_data));
                        true
                    });

                for other_id in candidates {
                    let Some(other) = self.shapes.get(other_id) else {
                        continue;
                    };
                    if other.body_id == bullet_id || other.is_sensor {
                        continue;
                    }
                    let Some(other_body) = self.bodies.get(other.body_id) else {
                        continue;
                    };
                    // Bullets do not CCD against other bullets.
                    if other_body.is_bullet {
                        continue;
                    }
                    if !CollisionFilter::should_collide(&shape.filter, &other.filter) {
                        continue;
                    }

                    let sweep_other = Sweep {
                        local_center: other_body.local_center,
                        c1: other_body.center,
                        c2: other_body.center,
                        q1: other_body.transform.q,
                        q2: other_body.transform.q,
                    };

                    let input = ToiInput {
                        proxy_a: DistanceProxy::from_shape(&other.kind),
                        proxy_b: DistanceProxy::from_shape(&shape.kind),
                        sweep_a: sweep_other,
                        sweep_b: sweep_bullet,
                        max_fraction: min_fraction,
                    };
                    // Overlapped pairs are left to the discrete solver.
                    let output = toi::time_of_impact(&input);
                    if output.state == ToiState::Hit && output.fraction < min_fraction {
                        min_fraction = output.fraction;
                        hit_any = true;
                    }
                }
            }

            if hit_any && min_fraction < 1.0 {
                // Rewind the bullet to the impact fraction; the next step's
                // discrete solve resolves the contact.
                let transform = sweep_bullet.transform_at(min_fraction);
                let shape_ids = {
                    let Some(body) = self.bodies.get_mut(bullet_id) else {
                        continue;
                    };
                    body.transform = transform;
                    body.update_center();
                    body.shapes.clone()
                };
                for shape_id in shape_ids {
                    self.refresh_shape_proxy(shape_id, Vec2::ZERO);
                }
            }
        }
    }
}

/// The phases a color pass can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SolvePhase {
    WarmStart,
    Solve,
    Relax,
    Restitution,
}

/// Per-step scalars shared by every color pass.
#[derive(Debug, Clone, Copy)]
struct SolvePass {
    h: f32,
    inv_h: f32,
    joint_soft: crate::dynamics::solver::Softness,
    restitution_threshold: f32,
    warm: bool,
}

fn run_contact_phase(
    constraint: &mut ContactConstraint,
    states: &SolverStates<'_>,
    phase: SolvePhase,
    pass: &SolvePass,
) {
    match phase {
        SolvePhase::WarmStart => {
            if pass.warm {
                solver::warm_start_contact(constraint, states);
            }
        }
        SolvePhase::Solve => solver::solve_contact(constraint, states, pass.inv_h, true),
        SolvePhase::Relax => solver::solve_contact(constraint, states, pass.inv_h, false),
        SolvePhase::Restitution => {
            solver::apply_restitution(constraint, states, pass.restitution_threshold)
        }
    }
}

fn run_joint_phase(
    joint: &mut Joint,
    states: &SolverStates<'_>,
    phase: SolvePhase,
    pass: &SolvePass,
) {
    match phase {
        SolvePhase::WarmStart => {
            if pass.warm {
                joints::warm_start_joint(joint, states);
            }
        }
        SolvePhase::Solve => {
            joints::solve_joint(joint, states, pass.h, pass.inv_h, pass.joint_soft, true)
        }
        SolvePhase::Relax => {
            joints::solve_joint(joint, states, pass.h, pass.inv_h, pass.joint_soft, false)
        }
        SolvePhase::Restitution => {}
    }
}

/// Runs one phase over one color. Regular colors fan out across workers;
/// the overflow color and joint warm starts run on the calling thread.
fn solve_color_pass(
    executor: &dyn TaskExecutor,
    constraints: &mut [ContactConstraint],
    solvers: &mut [Joint],
    states: &SolverStates<'_>,
    sequential: bool,
    phase: SolvePhase,
    pass: &SolvePass,
) {
    if sequential {
        for joint in solvers.iter_mut() {
            run_joint_phase(joint, states, phase, pass);
        }
        for constraint in constraints.iter_mut() {
            run_contact_phase(constraint, states, phase, pass);
        }
        return;
    }

    if !solvers.is_empty() {
        let shared_joints = SharedSlice::new(solvers);
        executor.for_each(shared_joints.len(), 4, &|start, end, _| {
            for i in start..end {
                let joint = unsafe { shared_joints.get_mut(i) };
                run_joint_phase(joint, states, phase, pass);
            }
        });
    }

    if !constraints.is_empty() {
        let shared_contacts = SharedSlice::new(constraints);
        executor.for_each(shared_contacts.len(), 8, &|start, end, _| {
            for i in start..end {
                let constraint = unsafe { shared_contacts.get_mut(i) };
                run_contact_phase(constraint, states, phase, pass);
            }
        });
    }
}

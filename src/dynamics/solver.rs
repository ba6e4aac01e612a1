//! Soft-constraint (TGS) contact solver.
//!
//! Constraints are prepared once per step against a dense array of
//! [`SolverBody`] states, then each substep runs warm start, a biased
//! velocity pass, position integration, and a bias-free relaxation pass.
//! Restitution is applied once on the final substep and impulses are
//! stored back on the contacts for next-step warm starting.

use std::marker::PhantomData;

use glam::Vec2;

use crate::{
    collision::contact::Contact,
    config::{
        CONTACT_DAMPING_RATIO, CONTACT_HERTZ, CONTACT_PUSH_MAX_SPEED, MAX_LINEAR_SPEED,
        MAX_ROTATION,
    },
    core::body::{Body, MotionLocks},
    utils::{
        allocator::{Arena, EntityId},
        math::{cross, cross_sv, right_perp, Rot},
    },
};

/// Sentinel solver index for static bodies.
pub const STATIC_BODY: usize = usize::MAX;

/// Per-step solver state of one awake body.
#[derive(Debug, Clone, Copy)]
pub struct SolverBody {
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    /// Center-of-mass translation accumulated over the substeps.
    pub delta_position: Vec2,
    /// Rotation accumulated over the substeps.
    pub delta_rotation: Rot,
    pub inv_mass: f32,
    pub inv_inertia: f32,
    pub locks: MotionLocks,
}

impl SolverBody {
    pub const STATIC: Self = Self {
        linear_velocity: Vec2::ZERO,
        angular_velocity: 0.0,
        delta_position: Vec2::ZERO,
        delta_rotation: Rot::IDENTITY,
        inv_mass: 0.0,
        inv_inertia: 0.0,
        locks: MotionLocks {
            linear_x: false,
            linear_y: false,
            angular_z: false,
        },
    };
}

/// Integration parameters that stay on the cold side of the solver body.
#[derive(Debug, Clone, Copy)]
pub struct SolverBodyParams {
    pub force: Vec2,
    pub torque: f32,
    pub gravity_scale: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
}

/// Shared view of the solver-body array used during a color solve.
///
/// Graph coloring guarantees that no two constraints in a color reference
/// the same dynamic body, so concurrent `read`/`write` pairs from workers
/// touch disjoint indices. Static bodies read as immovable and are never
/// written.
pub struct SolverStates<'a> {
    ptr: *mut SolverBody,
    len: usize,
    _lifetime: PhantomData<&'a mut [SolverBody]>,
}

unsafe impl<'a> Send for SolverStates<'a> {}
unsafe impl<'a> Sync for SolverStates<'a> {}

impl<'a> SolverStates<'a> {
    pub fn new(states: &'a mut [SolverBody]) -> Self {
        Self {
            ptr: states.as_mut_ptr(),
            len: states.len(),
            _lifetime: PhantomData,
        }
    }

    pub fn read(&self, index: usize) -> SolverBody {
        if index == STATIC_BODY {
            return SolverBody::STATIC;
        }
        debug_assert!(index < self.len);
        unsafe { *self.ptr.add(index) }
    }

    pub fn write(&self, index: usize, body: SolverBody) {
        if index == STATIC_BODY {
            return;
        }
        debug_assert!(index < self.len);
        unsafe {
            let slot = &mut *self.ptr.add(index);
            // Kinematic bodies occupy no color slot, so two constraints in
            // one color may share one. The solver cannot change their
            // velocity; skipping the write keeps the slot read-only.
            if slot.inv_mass == 0.0 && slot.inv_inertia == 0.0 {
                return;
            }
            *slot = body;
        }
    }
}

/// Soft-constraint coefficients from the implicit spring formulation.
#[derive(Debug, Clone, Copy)]
pub struct Softness {
    pub bias_rate: f32,
    pub mass_scale: f32,
    pub impulse_scale: f32,
}

impl Softness {
    /// A rigid constraint: full mass, no bias feedback.
    pub const RIGID: Self = Self {
        bias_rate: 0.0,
        mass_scale: 1.0,
        impulse_scale: 0.0,
    };
}

/// Derives soft-constraint rates from stiffness (hertz) and damping ratio
/// for a substep of length `h`.
pub fn make_soft(hertz: f32, damping_ratio: f32, h: f32) -> Softness {
    if hertz <= 0.0 {
        return Softness::RIGID;
    }
    let omega = 2.0 * std::f32::consts::PI * hertz;
    let a1 = 2.0 * damping_ratio + h * omega;
    let a2 = h * omega * a1;
    let a3 = 1.0 / (1.0 + a2);
    Softness {
        bias_rate: omega / a1,
        mass_scale: a2 * a3,
        impulse_scale: a3,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContactConstraintPoint {
    /// World anchors relative to each body's center of mass at prepare.
    pub anchor_a: Vec2,
    pub anchor_b: Vec2,
    /// Separation with the anchor-tracking term folded out.
    pub base_separation: f32,
    pub normal_impulse: f32,
    pub tangent_impulse: f32,
    pub max_normal_impulse: f32,
    /// Pre-solve approach speed, used by restitution.
    pub relative_velocity: f32,
    pub normal_mass: f32,
    pub tangent_mass: f32,
    pub id: u16,
}

#[derive(Debug, Clone)]
pub struct ContactConstraint {
    pub contact_id: EntityId,
    pub index_a: usize,
    pub index_b: usize,
    pub normal: Vec2,
    pub friction: f32,
    pub restitution: f32,
    pub tangent_speed: f32,
    pub rolling_resistance: f32,
    pub rolling_impulse: f32,
    pub rolling_mass: f32,
    pub softness: Softness,
    pub points: [ContactConstraintPoint; 2],
    pub point_count: usize,
}

/// Builds the constraint for a touching contact. Velocities are read
/// before any integration so restitution sees the true approach speed.
pub fn prepare_contact_constraint(
    contact: &Contact,
    body_a: &Body,
    body_b: &Body,
    h: f32,
) -> ContactConstraint {
    let manifold = &contact.manifold;
    let normal = manifold.normal;
    let tangent = right_perp(normal);

    let (inv_mass_a, inv_inertia_a) = (body_a.inv_mass, body_a.inv_inertia);
    let (inv_mass_b, inv_inertia_b) = (body_b.inv_mass, body_b.inv_inertia);

    // Stiffer response against non-dynamic bodies.
    let hertz = if body_a.is_dynamic() && body_b.is_dynamic() {
        CONTACT_HERTZ
    } else {
        2.0 * CONTACT_HERTZ
    };
    // Keep the spring stable within a substep.
    let hertz = hertz.min(0.125 / h);

    let mut constraint = ContactConstraint {
        contact_id: contact.id,
        index_a: body_a.solver_index,
        index_b: body_b.solver_index,
        normal,
        friction: contact.friction,
        restitution: contact.restitution,
        tangent_speed: contact.tangent_speed,
        rolling_resistance: contact.rolling_resistance,
        rolling_impulse: 0.0,
        rolling_mass: if inv_inertia_a + inv_inertia_b > 0.0 {
            1.0 / (inv_inertia_a + inv_inertia_b)
        } else {
            0.0
        },
        softness: make_soft(hertz, CONTACT_DAMPING_RATIO, h),
        points: [ContactConstraintPoint::default(); 2],
        point_count: manifold.point_count,
    };

    for (i, mp) in manifold.points.iter().take(manifold.point_count).enumerate() {
        let r_a = mp.point - body_a.center;
        let r_b = mp.point - body_b.center;

        let rn_a = cross(r_a, normal);
        let rn_b = cross(r_b, normal);
        let k_normal =
            inv_mass_a + inv_mass_b + inv_inertia_a * rn_a * rn_a + inv_inertia_b * rn_b * rn_b;

        let rt_a = cross(r_a, tangent);
        let rt_b = cross(r_b, tangent);
        let k_tangent =
            inv_mass_a + inv_mass_b + inv_inertia_a * rt_a * rt_a + inv_inertia_b * rt_b * rt_b;

        let dv = body_b.velocity.linear + cross_sv(body_b.velocity.angular, r_b)
            - body_a.velocity.linear
            - cross_sv(body_a.velocity.angular, r_a);

        constraint.points[i] = ContactConstraintPoint {
            anchor_a: r_a,
            anchor_b: r_b,
            base_separation: mp.separation - (r_b - r_a).dot(normal),
            normal_impulse: mp.normal_impulse,
            tangent_impulse: mp.tangent_impulse,
            max_normal_impulse: 0.0,
            relative_velocity: dv.dot(normal),
            normal_mass: if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 },
            tangent_mass: if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 },
            id: mp.id,
        };
    }

    constraint
}

pub fn warm_start_contact(constraint: &mut ContactConstraint, states: &SolverStates<'_>) {
    let mut a = states.read(constraint.index_a);
    let mut b = states.read(constraint.index_b);
    let normal = constraint.normal;
    let tangent = right_perp(normal);

    for point in constraint.points.iter().take(constraint.point_count) {
        let impulse = point.normal_impulse * normal + point.tangent_impulse * tangent;
        a.linear_velocity -= a.inv_mass * impulse;
        a.angular_velocity -= a.inv_inertia * cross(point.anchor_a, impulse);
        b.linear_velocity += b.inv_mass * impulse;
        b.angular_velocity += b.inv_inertia * cross(point.anchor_b, impulse);
    }

    states.write(constraint.index_a, a);
    states.write(constraint.index_b, b);
}

pub fn solve_contact(
    constraint: &mut ContactConstraint,
    states: &SolverStates<'_>,
    inv_h: f32,
    use_bias: bool,
) {
    let mut a = states.read(constraint.index_a);
    let mut b = states.read(constraint.index_b);
    let normal = constraint.normal;
    let tangent = right_perp(normal);
    let softness = constraint.softness;

    let mut total_normal_impulse = 0.0;

    // Normal impulses first, then friction bounded by them.
    for point in constraint.points.iter_mut().take(constraint.point_count) {
        let r_a = a.delta_rotation.apply(point.anchor_a);
        let r_b = b.delta_rotation.apply(point.anchor_b);

        let d = b.delta_position + r_b - a.delta_position - r_a;
        let separation = point.base_separation + d.dot(normal);

        let (bias, mass_scale, impulse_scale) = if separation > 0.0 {
            // Speculative margin: close exactly, no softness.
            (separation * inv_h, 1.0, 0.0)
        } else if use_bias {
            (
                (softness.bias_rate * separation).max(-CONTACT_PUSH_MAX_SPEED),
                softness.mass_scale,
                softness.impulse_scale,
            )
        } else {
            (0.0, 1.0, 0.0)
        };

        let dv = b.linear_velocity + cross_sv(b.angular_velocity, r_b)
            - a.linear_velocity
            - cross_sv(a.angular_velocity, r_a);
        let vn = dv.dot(normal);

        let impulse = -point.normal_mass * mass_scale * (vn + bias)
            - impulse_scale * point.normal_impulse;
        let new_impulse = (point.normal_impulse + impulse).max(0.0);
        let delta = new_impulse - point.normal_impulse;
        point.normal_impulse = new_impulse;
        point.max_normal_impulse = point.max_normal_impulse.max(new_impulse);
        total_normal_impulse += new_impulse;

        let p = delta * normal;
        a.linear_velocity -= a.inv_mass * p;
        a.angular_velocity -= a.inv_inertia * cross(r_a, p);
        b.linear_velocity += b.inv_mass * p;
        b.angular_velocity += b.inv_inertia * cross(r_b, p);
    }

    for point in constraint.points.iter_mut().take(constraint.point_count) {
        let r_a = a.delta_rotation.apply(point.anchor_a);
        let r_b = b.delta_rotation.apply(point.anchor_b);

        let dv = b.linear_velocity + cross_sv(b.angular_velocity, r_b)
            - a.linear_velocity
            - cross_sv(a.angular_velocity, r_a);
        let vt = dv.dot(tangent) - constraint.tangent_speed;

        let impulse = -point.tangent_mass * vt;
        let max_friction = constraint.friction * point.normal_impulse;
        let new_impulse = (point.tangent_impulse + impulse).clamp(-max_friction, max_friction);
        let delta = new_impulse - point.tangent_impulse;
        point.tangent_impulse = new_impulse;

        let p = delta * tangent;
        a.linear_velocity -= a.inv_mass * p;
        a.angular_velocity -= a.inv_inertia * cross(r_a, p);
        b.linear_velocity += b.inv_mass * p;
        b.angular_velocity += b.inv_inertia * cross(r_b, p);
    }

    // Rolling resistance, bounded by the accumulated normal load.
    if constraint.rolling_resistance > 0.0 && constraint.rolling_mass > 0.0 {
        let relative_spin = b.angular_velocity - a.angular_velocity;
        let impulse = -constraint.rolling_mass * relative_spin;
        let max_rolling = constraint.rolling_resistance * total_normal_impulse;
        let new_impulse = (constraint.rolling_impulse + impulse).clamp(-max_rolling, max_rolling);
        let delta = new_impulse - constraint.rolling_impulse;
        constraint.rolling_impulse = new_impulse;

        a.angular_velocity -= a.inv_inertia * delta;
        b.angular_velocity += b.inv_inertia * delta;
    }

    states.write(constraint.index_a, a);
    states.write(constraint.index_b, b);
}

/// Restitution pass, run once after the final substep.
pub fn apply_restitution(
    constraint: &mut ContactConstraint,
    states: &SolverStates<'_>,
    threshold: f32,
) {
    if constraint.restitution == 0.0 {
        return;
    }

    let mut a = states.read(constraint.index_a);
    let mut b = states.read(constraint.index_b);
    let normal = constraint.normal;

    for point in constraint.points.iter_mut().take(constraint.point_count) {
        // Only bounce points that actually collided fast enough.
        if point.relative_velocity > -threshold || point.max_normal_impulse == 0.0 {
            continue;
        }

        let r_a = a.delta_rotation.apply(point.anchor_a);
        let r_b = b.delta_rotation.apply(point.anchor_b);

        let dv = b.linear_velocity + cross_sv(b.angular_velocity, r_b)
            - a.linear_velocity
            - cross_sv(a.angular_velocity, r_a);
        let vn = dv.dot(normal);

        let impulse =
            -point.normal_mass * (vn + constraint.restitution * point.relative_velocity);
        let new_impulse = (point.normal_impulse + impulse).max(0.0);
        let delta = new_impulse - point.normal_impulse;
        point.normal_impulse = new_impulse;
        point.max_normal_impulse = point.max_normal_impulse.max(new_impulse);

        let p = delta * normal;
        a.linear_velocity -= a.inv_mass * p;
        a.angular_velocity -= a.inv_inertia * cross(r_a, p);
        b.linear_velocity += b.inv_mass * p;
        b.angular_velocity += b.inv_inertia * cross(r_b, p);
    }

    states.write(constraint.index_a, a);
    states.write(constraint.index_b, b);
}

/// Writes accumulated impulses back onto the contact manifold for
/// next-step warm starting.
pub fn store_impulses(constraint: &ContactConstraint, contacts: &mut Arena<Contact>) {
    let Some(contact) = contacts.get_mut(constraint.contact_id) else {
        return;
    };
    for (i, point) in constraint
        .points
        .iter()
        .take(constraint.point_count)
        .enumerate()
    {
        if i < contact.manifold.point_count {
            let mp = &mut contact.manifold.points[i];
            mp.normal_impulse = point.normal_impulse;
            mp.tangent_impulse = point.tangent_impulse;
            mp.max_normal_impulse = point.max_normal_impulse;
            mp.normal_velocity = point.relative_velocity;
        }
    }
}

/// Velocity integration for one substep: forces, gravity, damping, motion
/// locks, and the speed clamps.
pub fn integrate_velocities(
    states: &mut [SolverBody],
    params: &[SolverBodyParams],
    gravity: Vec2,
    h: f32,
) {
    debug_assert_eq!(states.len(), params.len());
    for (state, param) in states.iter_mut().zip(params.iter()) {
        if state.inv_mass == 0.0 && state.inv_inertia == 0.0 {
            // Kinematic bodies keep their user-set velocity.
            continue;
        }

        let mut v = state.linear_velocity
            + h * (param.gravity_scale * gravity + state.inv_mass * param.force);
        let mut w = state.angular_velocity + h * state.inv_inertia * param.torque;

        v /= 1.0 + h * param.linear_damping;
        w /= 1.0 + h * param.angular_damping;

        if state.locks.linear_x {
            v.x = 0.0;
        }
        if state.locks.linear_y {
            v.y = 0.0;
        }
        if state.locks.angular_z {
            w = 0.0;
        }

        let speed_sq = v.length_squared();
        if speed_sq > MAX_LINEAR_SPEED * MAX_LINEAR_SPEED {
            v *= MAX_LINEAR_SPEED / speed_sq.sqrt();
        }
        let max_omega = MAX_ROTATION / h;
        if w.abs() > max_omega {
            w = w.clamp(-max_omega, max_omega);
        }

        state.linear_velocity = v;
        state.angular_velocity = w;
    }
}

/// Position integration for one substep, accumulated into the deltas.
pub fn integrate_positions(states: &mut [SolverBody], h: f32) {
    for state in states.iter_mut() {
        state.delta_position += h * state.linear_velocity;
        state.delta_rotation = state.delta_rotation.integrate(state.angular_velocity, h);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_parameters_are_sane() {
        let soft = make_soft(30.0, 10.0, 1.0 / 240.0);
        assert!(soft.bias_rate > 0.0);
        assert!(soft.mass_scale > 0.0 && soft.mass_scale < 1.0);
        assert!(soft.impulse_scale > 0.0 && soft.impulse_scale < 1.0);
        assert!((soft.mass_scale + soft.impulse_scale - 1.0).abs() < 1e-5);
    }

    #[test]
    fn velocity_integration_applies_gravity_and_clamps() {
        let mut states = [SolverBody {
            linear_velocity: Vec2::new(0.0, -1000.0),
            angular_velocity: 0.0,
            delta_position: Vec2::ZERO,
            delta_rotation: Rot::IDENTITY,
            inv_mass: 1.0,
            inv_inertia: 1.0,
            locks: MotionLocks::default(),
        }];
        let params = [SolverBodyParams {
            force: Vec2::ZERO,
            torque: 0.0,
            gravity_scale: 1.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
        }];
        integrate_velocities(&mut states, &params, Vec2::new(0.0, -10.0), 1.0 / 240.0);
        assert!(states[0].linear_velocity.length() <= MAX_LINEAR_SPEED + 1e-3);
    }

    #[test]
    fn motion_locks_zero_axis_velocities() {
        let mut states = [SolverBody {
            linear_velocity: Vec2::new(3.0, 4.0),
            angular_velocity: 2.0,
            delta_position: Vec2::ZERO,
            delta_rotation: Rot::IDENTITY,
            inv_mass: 1.0,
            inv_inertia: 1.0,
            locks: MotionLocks {
                linear_x: true,
                linear_y: false,
                angular_z: true,
            },
        }];
        let params = [SolverBodyParams {
            force: Vec2::ZERO,
            torque: 10.0,
            gravity_scale: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
        }];
        integrate_velocities(&mut states, &params, Vec2::ZERO, 1.0 / 240.0);
        assert_eq!(states[0].linear_velocity.x, 0.0);
        assert_eq!(states[0].angular_velocity, 0.0);
        assert!(states[0].linear_velocity.y != 0.0);
    }
}

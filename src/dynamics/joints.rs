//! Joints: constraints between two bodies.
//!
//! Every joint stores local frames on both bodies and solves its rows per
//! substep against the solver-body states, with soft-constraint bias for
//! position feedback. Impulses persist for warm starting. Limits clamp,
//! motors saturate at their maximum force or torque.

use glam::Vec2;

use crate::{
    core::{body::Body, types::Transform},
    dynamics::solver::{make_soft, Softness, SolverBody, SolverStates, STATIC_BODY},
    utils::{
        allocator::{Arena, EntityId},
        math::{cross, cross_sv, left_perp, Rot},
    },
};

fn solve22(k11: f32, k12: f32, k22: f32, b: Vec2) -> Vec2 {
    let det = k11 * k22 - k12 * k12;
    if det.abs() < f32::EPSILON {
        return Vec2::ZERO;
    }
    let inv = 1.0 / det;
    Vec2::new(inv * (k22 * b.x - k12 * b.y), inv * (k11 * b.y - k12 * b.x))
}

/// Distance joint: keeps two anchor points a length apart, optionally as
/// a spring with limits.
#[derive(Debug, Clone)]
pub struct DistanceJoint {
    pub length: f32,
    pub min_length: f32,
    pub max_length: f32,
    pub enable_spring: bool,
    pub hertz: f32,
    pub damping_ratio: f32,
    pub enable_limit: bool,

    pub impulse: f32,
    pub lower_impulse: f32,
    pub upper_impulse: f32,

    pub axial_mass: f32,
    pub spring_soft: Softness,
    pub axis: Vec2,
}

impl Default for DistanceJoint {
    fn default() -> Self {
        Self {
            length: 1.0,
            min_length: 0.0,
            max_length: f32::MAX,
            enable_spring: false,
            hertz: 0.0,
            damping_ratio: 0.0,
            enable_limit: false,
            impulse: 0.0,
            lower_impulse: 0.0,
            upper_impulse: 0.0,
            axial_mass: 0.0,
            spring_soft: Softness::RIGID,
            axis: Vec2::X,
        }
    }
}

/// Motor joint: drives the relative velocity of two bodies toward a
/// target, saturating at a maximum force and torque.
#[derive(Debug, Clone)]
pub struct MotorJoint {
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    pub max_force: f32,
    pub max_torque: f32,

    pub linear_impulse: Vec2,
    pub angular_impulse: f32,
}

impl Default for MotorJoint {
    fn default() -> Self {
        Self {
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            max_force: 1.0,
            max_torque: 1.0,
            linear_impulse: Vec2::ZERO,
            angular_impulse: 0.0,
        }
    }
}

/// Mouse joint: a soft spring dragging body B's anchor toward body A's
/// frame origin (usually a ground body following the cursor).
#[derive(Debug, Clone)]
pub struct MouseJoint {
    pub hertz: f32,
    pub damping_ratio: f32,
    pub max_force: f32,

    pub impulse: Vec2,

    pub spring_soft: Softness,
}

impl Default for MouseJoint {
    fn default() -> Self {
        Self {
            hertz: 4.0,
            damping_ratio: 0.7,
            max_force: 1000.0,
            impulse: Vec2::ZERO,
            spring_soft: Softness::RIGID,
        }
    }
}

/// Prismatic joint: a slider along an axis fixed on body A, with optional
/// motor, limits, and spring.
#[derive(Debug, Clone)]
pub struct PrismaticJoint {
    pub enable_spring: bool,
    pub hertz: f32,
    pub damping_ratio: f32,
    pub target_translation: f32,
    pub enable_motor: bool,
    pub motor_speed: f32,
    pub max_motor_force: f32,
    pub enable_limit: bool,
    pub lower_translation: f32,
    pub upper_translation: f32,

    pub perp_impulse: f32,
    pub angular_impulse: f32,
    pub spring_impulse: f32,
    pub motor_impulse: f32,
    pub lower_impulse: f32,
    pub upper_impulse: f32,

    pub axial_mass: f32,
    pub spring_soft: Softness,
}

impl Default for PrismaticJoint {
    fn default() -> Self {
        Self {
            enable_spring: false,
            hertz: 0.0,
            damping_ratio: 0.0,
            target_translation: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_force: 0.0,
            enable_limit: false,
            lower_translation: 0.0,
            upper_translation: 0.0,
            perp_impulse: 0.0,
            angular_impulse: 0.0,
            spring_impulse: 0.0,
            motor_impulse: 0.0,
            lower_impulse: 0.0,
            upper_impulse: 0.0,
            axial_mass: 0.0,
            spring_soft: Softness::RIGID,
        }
    }
}

/// Revolute joint: a hinge with optional motor, angular limits, and
/// angular spring.
#[derive(Debug, Clone)]
pub struct RevoluteJoint {
    pub enable_spring: bool,
    pub hertz: f32,
    pub damping_ratio: f32,
    pub target_angle: f32,
    pub enable_motor: bool,
    pub motor_speed: f32,
    pub max_motor_torque: f32,
    pub enable_limit: bool,
    pub lower_angle: f32,
    pub upper_angle: f32,

    pub linear_impulse: Vec2,
    pub spring_impulse: f32,
    pub motor_impulse: f32,
    pub lower_impulse: f32,
    pub upper_impulse: f32,

    pub axial_mass: f32,
    pub spring_soft: Softness,
}

impl Default for RevoluteJoint {
    fn default() -> Self {
        Self {
            enable_spring: false,
            hertz: 0.0,
            damping_ratio: 0.0,
            target_angle: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
            enable_limit: false,
            lower_angle: 0.0,
            upper_angle: 0.0,
            linear_impulse: Vec2::ZERO,
            spring_impulse: 0.0,
            motor_impulse: 0.0,
            lower_impulse: 0.0,
            upper_impulse: 0.0,
            axial_mass: 0.0,
            spring_soft: Softness::RIGID,
        }
    }
}

/// Weld joint: locks the relative transform. Zero hertz rows are rigid;
/// positive hertz turns a row into a spring.
#[derive(Debug, Clone)]
pub struct WeldJoint {
    pub linear_hertz: f32,
    pub linear_damping_ratio: f32,
    pub angular_hertz: f32,
    pub angular_damping_ratio: f32,

    pub linear_impulse: Vec2,
    pub angular_impulse: f32,

    pub linear_soft: Softness,
    pub angular_soft: Softness,
}

impl Default for WeldJoint {
    fn default() -> Self {
        Self {
            linear_hertz: 0.0,
            linear_damping_ratio: 1.0,
            angular_hertz: 0.0,
            angular_damping_ratio: 1.0,
            linear_impulse: Vec2::ZERO,
            angular_impulse: 0.0,
            linear_soft: Softness::RIGID,
            angular_soft: Softness::RIGID,
        }
    }
}

/// Wheel joint: a suspension axis on body A with a spring, translation
/// limits, and a rotational motor.
#[derive(Debug, Clone)]
pub struct WheelJoint {
    pub enable_spring: bool,
    pub hertz: f32,
    pub damping_ratio: f32,
    pub enable_motor: bool,
    pub motor_speed: f32,
    pub max_motor_torque: f32,
    pub enable_limit: bool,
    pub lower_translation: f32,
    pub upper_translation: f32,

    pub perp_impulse: f32,
    pub spring_impulse: f32,
    pub motor_impulse: f32,
    pub lower_impulse: f32,
    pub upper_impulse: f32,

    pub axial_mass: f32,
    pub motor_mass: f32,
    pub spring_soft: Softness,
}

impl Default for WheelJoint {
    fn default() -> Self {
        Self {
            enable_spring: true,
            hertz: 1.0,
            damping_ratio: 0.7,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
            enable_limit: false,
            lower_translation: 0.0,
            upper_translation: 0.0,
            perp_impulse: 0.0,
            spring_impulse: 0.0,
            motor_impulse: 0.0,
            lower_impulse: 0.0,
            upper_impulse: 0.0,
            axial_mass: 0.0,
            motor_mass: 0.0,
            spring_soft: Softness::RIGID,
        }
    }
}

#[derive(Debug, Clone)]
pub enum JointKind {
    Distance(DistanceJoint),
    /// Suppresses collision between the two bodies; no constraint rows.
    Filter,
    Motor(MotorJoint),
    Mouse(MouseJoint),
    Prismatic(PrismaticJoint),
    Revolute(RevoluteJoint),
    Weld(WeldJoint),
    Wheel(WheelJoint),
}

/// Definition used to create joints.
#[derive(Debug, Clone)]
pub struct JointDef {
    pub body_a: EntityId,
    pub body_b: EntityId,
    /// Joint frames in each body's local coordinates.
    pub local_frame_a: Transform,
    pub local_frame_b: Transform,
    pub collide_connected: bool,
    /// Reaction thresholds for joint events; infinite disables them.
    pub force_threshold: f32,
    pub torque_threshold: f32,
    pub kind: JointKind,
}

impl JointDef {
    pub fn new(kind: JointKind, body_a: EntityId, body_b: EntityId) -> Self {
        Self {
            body_a,
            body_b,
            local_frame_a: Transform::IDENTITY,
            local_frame_b: Transform::IDENTITY,
            collide_connected: false,
            force_threshold: f32::MAX,
            torque_threshold: f32::MAX,
            kind,
        }
    }
}

/// Internal joint record.
#[derive(Debug, Clone)]
pub struct Joint {
    pub id: EntityId,
    pub body_a: EntityId,
    pub body_b: EntityId,
    pub local_frame_a: Transform,
    pub local_frame_b: Transform,
    pub collide_connected: bool,
    pub force_threshold: f32,
    pub torque_threshold: f32,
    pub kind: JointKind,

    pub set_index: usize,
    pub set_slot: usize,
    pub color_index: usize,
    pub color_slot: usize,
    pub island_id: EntityId,
    pub island_prev: EntityId,
    pub island_next: EntityId,

    // Per-step solver scratch.
    pub index_a: usize,
    pub index_b: usize,
    anchor_a: Vec2,
    anchor_b: Vec2,
    rot_a0: Rot,
    rot_b0: Rot,
    delta_center: Vec2,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_inertia_a: f32,
    inv_inertia_b: f32,
}

impl Joint {
    pub fn from_def(id: EntityId, def: &JointDef) -> Self {
        Self {
            id,
            body_a: def.body_a,
            body_b: def.body_b,
            local_frame_a: def.local_frame_a,
            local_frame_b: def.local_frame_b,
            collide_connected: def.collide_connected,
            force_threshold: def.force_threshold,
            torque_threshold: def.torque_threshold,
            kind: def.kind.clone(),
            set_index: usize::MAX,
            set_slot: usize::MAX,
            color_index: usize::MAX,
            color_slot: usize::MAX,
            island_id: EntityId::NULL,
            island_prev: EntityId::NULL,
            island_next: EntityId::NULL,
            index_a: STATIC_BODY,
            index_b: STATIC_BODY,
            anchor_a: Vec2::ZERO,
            anchor_b: Vec2::ZERO,
            rot_a0: Rot::IDENTITY,
            rot_b0: Rot::IDENTITY,
            delta_center: Vec2::ZERO,
            inv_mass_a: 0.0,
            inv_mass_b: 0.0,
            inv_inertia_a: 0.0,
            inv_inertia_b: 0.0,
        }
    }

    /// Current anchor separation, tracking the substep deltas.
    fn separation(
        &self,
        a: &SolverBody,
        b: &SolverBody,
        r_a: Vec2,
        r_b: Vec2,
    ) -> Vec2 {
        self.delta_center + (b.delta_position - a.delta_position) + (r_b - self.anchor_b)
            - (r_a - self.anchor_a)
    }
}

/// Captures anchors, effective masses, and soft parameters for the step.
pub fn prepare_joint(joint: &mut Joint, bodies: &Arena<Body>, h: f32) {
    let (Some(body_a), Some(body_b)) = (bodies.get(joint.body_a), bodies.get(joint.body_b)) else {
        return;
    };

    joint.index_a = body_a.solver_index;
    joint.index_b = body_b.solver_index;
    joint.inv_mass_a = body_a.inv_mass;
    joint.inv_mass_b = body_b.inv_mass;
    joint.inv_inertia_a = body_a.inv_inertia;
    joint.inv_inertia_b = body_b.inv_inertia;

    let q_a = body_a.transform.q;
    let q_b = body_b.transform.q;
    joint.anchor_a = q_a.apply(joint.local_frame_a.p - body_a.local_center);
    joint.anchor_b = q_b.apply(joint.local_frame_b.p - body_b.local_center);
    joint.rot_a0 = q_a.mul(joint.local_frame_a.q);
    joint.rot_b0 = q_b.mul(joint.local_frame_b.q);
    joint.delta_center = (body_b.center + joint.anchor_b) - (body_a.center + joint.anchor_a);

    let m_a = joint.inv_mass_a;
    let m_b = joint.inv_mass_b;
    let i_a = joint.inv_inertia_a;
    let i_b = joint.inv_inertia_b;
    let r_a = joint.anchor_a;
    let r_b = joint.anchor_b;
    let rot_a0 = joint.rot_a0;
    let delta_center = joint.delta_center;

    match &mut joint.kind {
        JointKind::Filter => {}
        JointKind::Distance(distance) => {
            let axis = delta_center.normalize_or_zero();
            distance.axis = if axis == Vec2::ZERO { Vec2::X } else { axis };
            let cr_a = cross(r_a, distance.axis);
            let cr_b = cross(r_b, distance.axis);
            let k = m_a + m_b + i_a * cr_a * cr_a + i_b * cr_b * cr_b;
            distance.axial_mass = if k > 0.0 { 1.0 / k } else { 0.0 };
            distance.spring_soft = make_soft(distance.hertz, distance.damping_ratio, h);
        }
        JointKind::Motor(_) => {}
        JointKind::Mouse(mouse) => {
            mouse.spring_soft = make_soft(mouse.hertz, mouse.damping_ratio, h);
        }
        JointKind::Prismatic(prismatic) => {
            let axis = rot_a0.x_axis();
            let d = delta_center;
            let a1 = cross(d + r_a, axis);
            let a2 = cross(r_b, axis);
            let k = m_a + m_b + i_a * a1 * a1 + i_b * a2 * a2;
            prismatic.axial_mass = if k > 0.0 { 1.0 / k } else { 0.0 };
            prismatic.spring_soft = make_soft(prismatic.hertz, prismatic.damping_ratio, h);
        }
        JointKind::Revolute(revolute) => {
            let k = i_a + i_b;
            revolute.axial_mass = if k > 0.0 { 1.0 / k } else { 0.0 };
            revolute.spring_soft = make_soft(revolute.hertz, revolute.damping_ratio, h);
        }
        JointKind::Weld(weld) => {
            weld.linear_soft = if weld.linear_hertz > 0.0 {
                make_soft(weld.linear_hertz, weld.linear_damping_ratio, h)
            } else {
                Softness::RIGID
            };
            weld.angular_soft = if weld.angular_hertz > 0.0 {
                make_soft(weld.angular_hertz, weld.angular_damping_ratio, h)
            } else {
                Softness::RIGID
            };
        }
        JointKind::Wheel(wheel) => {
            let axis = rot_a0.x_axis();
            let d = delta_center;
            let a1 = cross(d + r_a, axis);
            let a2 = cross(r_b, axis);
            let k = m_a + m_b + i_a * a1 * a1 + i_b * a2 * a2;
            wheel.axial_mass = if k > 0.0 { 1.0 / k } else { 0.0 };
            let ik = i_a + i_b;
            wheel.motor_mass = if ik > 0.0 { 1.0 / ik } else { 0.0 };
            wheel.spring_soft = make_soft(wheel.hertz, wheel.damping_ratio, h);
        }
    }
}

/// Resets accumulated impulses; used when warm starting is disabled.
pub fn reset_joint_impulses(joint: &mut Joint) {
    match &mut joint.kind {
        JointKind::Filter => {}
        JointKind::Distance(j) => {
            j.impulse = 0.0;
            j.lower_impulse = 0.0;
            j.upper_impulse = 0.0;
        }
        JointKind::Motor(j) => {
            j.linear_impulse = Vec2::ZERO;
            j.angular_impulse = 0.0;
        }
        JointKind::Mouse(j) => j.impulse = Vec2::ZERO,
        JointKind::Prismatic(j) => {
            j.perp_impulse = 0.0;
            j.angular_impulse = 0.0;
            j.spring_impulse = 0.0;
            j.motor_impulse = 0.0;
            j.lower_impulse = 0.0;
            j.upper_impulse = 0.0;
        }
        JointKind::Revolute(j) => {
            j.linear_impulse = Vec2::ZERO;
            j.spring_impulse = 0.0;
            j.motor_impulse = 0.0;
            j.lower_impulse = 0.0;
            j.upper_impulse = 0.0;
        }
        JointKind::Weld(j) => {
            j.linear_impulse = Vec2::ZERO;
            j.angular_impulse = 0.0;
        }
        JointKind::Wheel(j) => {
            j.perp_impulse = 0.0;
            j.spring_impulse = 0.0;
            j.motor_impulse = 0.0;
            j.lower_impulse = 0.0;
            j.upper_impulse = 0.0;
        }
    }
}

/// Applies stored impulses to the body velocities.
pub fn warm_start_joint(joint: &mut Joint, states: &SolverStates<'_>) {
    let mut a = states.read(joint.index_a);
    let mut b = states.read(joint.index_b);
    let r_a = a.delta_rotation.apply(joint.anchor_a);
    let r_b = b.delta_rotation.apply(joint.anchor_b);

    let (linear, angular_a, angular_b) = match &joint.kind {
        JointKind::Filter => return,
        JointKind::Distance(j) => {
            let axial = j.impulse + j.lower_impulse - j.upper_impulse;
            let p = axial * j.axis;
            (p, cross(r_a, p), cross(r_b, p))
        }
        JointKind::Motor(j) => (j.linear_impulse, cross(r_a, j.linear_impulse) + j.angular_impulse, cross(r_b, j.linear_impulse) + j.angular_impulse),
        JointKind::Mouse(j) => (j.impulse, cross(r_a, j.impulse), cross(r_b, j.impulse)),
        JointKind::Prismatic(j) => {
            let axis = a.delta_rotation.mul(joint.rot_a0).x_axis();
            let perp = left_perp(axis);
            let axial = j.spring_impulse + j.motor_impulse + j.lower_impulse - j.upper_impulse;
            let p = j.perp_impulse * perp + axial * axis;
            let d = joint.separation(&a, &b, r_a, r_b);
            let la = cross(d + r_a, perp) * j.perp_impulse
                + cross(d + r_a, axis) * axial
                + j.angular_impulse;
            let lb = cross(r_b, perp) * j.perp_impulse + cross(r_b, axis) * axial + j.angular_impulse;
            (p, la, lb)
        }
        JointKind::Revolute(j) => {
            let angular = j.spring_impulse + j.motor_impulse + j.lower_impulse - j.upper_impulse;
            (
                j.linear_impulse,
                cross(r_a, j.linear_impulse) + angular,
                cross(r_b, j.linear_impulse) + angular,
            )
        }
        JointKind::Weld(j) => (
            j.linear_impulse,
            cross(r_a, j.linear_impulse) + j.angular_impulse,
            cross(r_b, j.linear_impulse) + j.angular_impulse,
        ),
        JointKind::Wheel(j) => {
            let axis = a.delta_rotation.mul(joint.rot_a0).x_axis();
            let perp = left_perp(axis);
            let axial = j.spring_impulse + j.lower_impulse - j.upper_impulse;
            let p = j.perp_impulse * perp + axial * axis;
            let d = joint.separation(&a, &b, r_a, r_b);
            let la = cross(d + r_a, perp) * j.perp_impulse
                + cross(d + r_a, axis) * axial
                + j.motor_impulse;
            let lb = cross(r_b, perp) * j.perp_impulse + cross(r_b, axis) * axial + j.motor_impulse;
            (p, la, lb)
        }
    };

    a.linear_velocity -= joint.inv_mass_a * linear;
    a.angular_velocity -= joint.inv_inertia_a * angular_a;
    b.linear_velocity += joint.inv_mass_b * linear;
    b.angular_velocity += joint.inv_inertia_b * angular_b;

    states.write(joint.index_a, a);
    states.write(joint.index_b, b);
}

/// Solves the joint's velocity rows for one substep.
pub fn solve_joint(
    joint: &mut Joint,
    states: &SolverStates<'_>,
    h: f32,
    inv_h: f32,
    joint_soft: Softness,
    use_bias: bool,
) {
    let mut a = states.read(joint.index_a);
    let mut b = states.read(joint.index_b);
    let r_a = a.delta_rotation.apply(joint.anchor_a);
    let r_b = b.delta_rotation.apply(joint.anchor_b);

    let m_a = joint.inv_mass_a;
    let m_b = joint.inv_mass_b;
    let i_a = joint.inv_inertia_a;
    let i_b = joint.inv_inertia_b;

    // Copies so the closures below do not borrow `joint` while its kind
    // is mutably matched.
    let anchor_a = joint.anchor_a;
    let anchor_b = joint.anchor_b;
    let rot_a0 = joint.rot_a0;
    let rot_b0 = joint.rot_b0;
    let delta_center = joint.delta_center;

    let separation = move |a: &SolverBody, b: &SolverBody, r_a: Vec2, r_b: Vec2| -> Vec2 {
        delta_center + (b.delta_position - a.delta_position) + (r_b - anchor_b) - (r_a - anchor_a)
    };
    let relative_angle = move |a: &SolverBody, b: &SolverBody| -> f32 {
        Rot::relative_angle(a.delta_rotation.mul(rot_a0), b.delta_rotation.mul(rot_b0))
    };

    let soft_terms = |soft: &Softness, c: f32, always: bool| -> (f32, f32, f32) {
        if use_bias || always {
            (soft.bias_rate * c, soft.mass_scale, soft.impulse_scale)
        } else {
            (0.0, 1.0, 0.0)
        }
    };

    match &mut joint.kind {
        JointKind::Filter => return,
        JointKind::Distance(j) => {
            let d = separation(&a, &b, r_a, r_b);
            let length = d.length();
            let axis = if length > f32::EPSILON { d / length } else { j.axis };
            j.axis = axis;

            let rel = |a: &SolverBody,
                       b: &SolverBody| {
                b.linear_velocity + cross_sv(b.angular_velocity, r_b)
                    - a.linear_velocity
                    - cross_sv(a.angular_velocity, r_a)
            };

            if j.enable_spring {
                // Spring toward rest length.
                let c = length - j.length;
                let cdot = rel(&a, &b).dot(axis);
                let impulse = -j.axial_mass * j.spring_soft.mass_scale * (cdot + j.spring_soft.bias_rate * c)
                    - j.spring_soft.impulse_scale * j.impulse;
                j.impulse += impulse;

                let p = impulse * axis;
                a.linear_velocity -= m_a * p;
                a.angular_velocity -= i_a * cross(r_a, p);
                b.linear_velocity += m_b * p;
                b.angular_velocity += i_b * cross(r_b, p);
            } else {
                // Rigid length row.
                let c = length - j.length;
                let (bias, mass_scale, impulse_scale) = soft_terms(&joint_soft, c, false);
                let cdot = rel(&a, &b).dot(axis);
                let impulse = -j.axial_mass * mass_scale * (cdot + bias) - impulse_scale * j.impulse;
                j.impulse += impulse;

                let p = impulse * axis;
                a.linear_velocity -= m_a * p;
                a.angular_velocity -= i_a * cross(r_a, p);
                b.linear_velocity += m_b * p;
                b.angular_velocity += i_b * cross(r_b, p);
            }

            if j.enable_limit {
                // Lower limit pushes apart.
                {
                    let c = length - j.min_length;
                    let (bias, mass_scale, impulse_scale) = if c > 0.0 {
                        (c * inv_h, 1.0, 0.0)
                    } else {
                        soft_terms(&joint_soft, c, true)
                    };
                    let cdot = rel(&a, &b).dot(axis);
                    let impulse = -j.axial_mass * mass_scale * (cdot + bias)
                        - impulse_scale * j.lower_impulse;
                    let new_impulse = (j.lower_impulse + impulse).max(0.0);
                    let delta = new_impulse - j.lower_impulse;
                    j.lower_impulse = new_impulse;

                    let p = delta * axis;
                    a.linear_velocity -= m_a * p;
                    a.angular_velocity -= i_a * cross(r_a, p);
                    b.linear_velocity += m_b * p;
                    b.angular_velocity += i_b * cross(r_b, p);
                }
                // Upper limit pulls together.
                {
                    let c = j.max_length - length;
                    let (bias, mass_scale, impulse_scale) = if c > 0.0 {
                        (c * inv_h, 1.0, 0.0)
                    } else {
                        soft_terms(&joint_soft, c, true)
                    };
                    let cdot = -rel(&a, &b).dot(axis);
                    let impulse = -j.axial_mass * mass_scale * (cdot + bias)
                        - impulse_scale * j.upper_impulse;
                    let new_impulse = (j.upper_impulse + impulse).max(0.0);
                    let delta = new_impulse - j.upper_impulse;
                    j.upper_impulse = new_impulse;

                    let p = -delta * axis;
                    a.linear_velocity -= m_a * p;
                    a.angular_velocity -= i_a * cross(r_a, p);
                    b.linear_velocity += m_b * p;
                    b.angular_velocity += i_b * cross(r_b, p);
                }
            }
        }
        JointKind::Motor(j) => {
            // Angular drive.
            {
                let cdot = b.angular_velocity - a.angular_velocity - j.angular_velocity;
                let k = i_a + i_b;
                let mass = if k > 0.0 { 1.0 / k } else { 0.0 };
                let impulse = -mass * cdot;
                let max_impulse = j.max_torque * h;
                let new_impulse = (j.angular_impulse + impulse).clamp(-max_impulse, max_impulse);
                let delta = new_impulse - j.angular_impulse;
                j.angular_impulse = new_impulse;

                a.angular_velocity -= i_a * delta;
                b.angular_velocity += i_b * delta;
            }
            // Linear drive.
            {
                let cdot = b.linear_velocity + cross_sv(b.angular_velocity, r_b)
                    - a.linear_velocity
                    - cross_sv(a.angular_velocity, r_a)
                    - j.linear_velocity;
                let k11 = m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y;
                let k12 = -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y;
                let k22 = m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x;
                let impulse = solve22(k11, k12, k22, -cdot);

                let max_impulse = j.max_force * h;
                let mut new_impulse = j.linear_impulse + impulse;
                if new_impulse.length_squared() > max_impulse * max_impulse {
                    new_impulse = new_impulse.normalize_or_zero() * max_impulse;
                }
                let delta = new_impulse - j.linear_impulse;
                j.linear_impulse = new_impulse;

                a.linear_velocity -= m_a * delta;
                a.angular_velocity -= i_a * cross(r_a, delta);
                b.linear_velocity += m_b * delta;
                b.angular_velocity += i_b * cross(r_b, delta);
            }
        }
        JointKind::Mouse(j) => {
            let c = separation(&a, &b, r_a, r_b);
            let cdot = b.linear_velocity + cross_sv(b.angular_velocity, r_b)
                - a.linear_velocity
                - cross_sv(a.angular_velocity, r_a);

            let k11 = m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y;
            let k12 = -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y;
            let k22 = m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x;

            let rhs = -(j.spring_soft.mass_scale * (cdot + j.spring_soft.bias_rate * c));
            let impulse = solve22(k11, k12, k22, rhs) - j.spring_soft.impulse_scale * j.impulse;

            let max_impulse = j.max_force * h;
            let mut new_impulse = j.impulse + impulse;
            if new_impulse.length_squared() > max_impulse * max_impulse {
                new_impulse = new_impulse.normalize_or_zero() * max_impulse;
            }
            let delta = new_impulse - j.impulse;
            j.impulse = new_impulse;

            a.linear_velocity -= m_a * delta;
            a.angular_velocity -= i_a * cross(r_a, delta);
            b.linear_velocity += m_b * delta;
            b.angular_velocity += i_b * cross(r_b, delta);
        }
        JointKind::Prismatic(j) => {
            let axis = a.delta_rotation.mul(rot_a0).x_axis();
            let perp = left_perp(axis);
            let d = separation(&a, &b, r_a, r_b);
            let translation = d.dot(axis);

            let a1 = cross(d + r_a, axis);
            let a2 = cross(r_b, axis);
            let s1 = cross(d + r_a, perp);
            let s2 = cross(r_b, perp);

            let axial_cdot = |a: &SolverBody,
                              b: &SolverBody| {
                axis.dot(b.linear_velocity - a.linear_velocity) + a2 * b.angular_velocity
                    - a1 * a.angular_velocity
            };

            // Motor.
            if j.enable_motor {
                let cdot = axial_cdot(&a, &b) - j.motor_speed;
                let impulse = -j.axial_mass * cdot;
                let max_impulse = j.max_motor_force * h;
                let new_impulse = (j.motor_impulse + impulse).clamp(-max_impulse, max_impulse);
                let delta = new_impulse - j.motor_impulse;
                j.motor_impulse = new_impulse;

                let p = delta * axis;
                a.linear_velocity -= m_a * p;
                a.angular_velocity -= i_a * a1 * delta;
                b.linear_velocity += m_b * p;
                b.angular_velocity += i_b * a2 * delta;
            }

            // Spring toward the target translation.
            if j.enable_spring {
                let c = translation - j.target_translation;
                let cdot = axial_cdot(&a, &b);
                let impulse = -j.axial_mass * j.spring_soft.mass_scale * (cdot + j.spring_soft.bias_rate * c)
                    - j.spring_soft.impulse_scale * j.spring_impulse;
                j.spring_impulse += impulse;

                let p = impulse * axis;
                a.linear_velocity -= m_a * p;
                a.angular_velocity -= i_a * a1 * impulse;
                b.linear_velocity += m_b * p;
                b.angular_velocity += i_b * a2 * impulse;
            }

            // Limits.
            if j.enable_limit {
                {
                    let c = translation - j.lower_translation;
                    let (bias, mass_scale, impulse_scale) = if c > 0.0 {
                        (c * inv_h, 1.0, 0.0)
                    } else {
                        soft_terms(&joint_soft, c, true)
                    };
                    let cdot = axial_cdot(&a, &b);
                    let impulse = -j.axial_mass * mass_scale * (cdot + bias)
                        - impulse_scale * j.lower_impulse;
                    let new_impulse = (j.lower_impulse + impulse).max(0.0);
                    let delta = new_impulse - j.lower_impulse;
                    j.lower_impulse = new_impulse;

                    let p = delta * axis;
                    a.linear_velocity -= m_a * p;
                    a.angular_velocity -= i_a * a1 * delta;
                    b.linear_velocity += m_b * p;
                    b.angular_velocity += i_b * a2 * delta;
                }
                {
                    let c = j.upper_translation - translation;
                    let (bias, mass_scale, impulse_scale) = if c > 0.0 {
                        (c * inv_h, 1.0, 0.0)
                    } else {
                        soft_terms(&joint_soft, c, true)
                    };
                    let cdot = -axial_cdot(&a, &b);
                    let impulse = -j.axial_mass * mass_scale * (cdot + bias)
                        - impulse_scale * j.upper_impulse;
                    let new_impulse = (j.upper_impulse + impulse).max(0.0);
                    let delta = new_impulse - j.upper_impulse;
                    j.upper_impulse = new_impulse;

                    let p = -delta * axis;
                    a.linear_velocity -= m_a * p;
                    a.angular_velocity -= i_a * a1 * -delta;
                    b.linear_velocity += m_b * p;
                    b.angular_velocity += i_b * a2 * -delta;
                }
            }

            // Perpendicular point-on-line row.
            {
                let c = d.dot(perp);
                let (bias, mass_scale, impulse_scale) = soft_terms(&joint_soft, c, false);
                let cdot = perp.dot(b.linear_velocity - a.linear_velocity) + s2 * b.angular_velocity
                    - s1 * a.angular_velocity;
                let k = m_a + m_b + i_a * s1 * s1 + i_b * s2 * s2;
                let mass = if k > 0.0 { 1.0 / k } else { 0.0 };
                let impulse = -mass * mass_scale * (cdot + bias) - impulse_scale * j.perp_impulse;
                j.perp_impulse += impulse;

                let p = impulse * perp;
                a.linear_velocity -= m_a * p;
                a.angular_velocity -= i_a * s1 * impulse;
                b.linear_velocity += m_b * p;
                b.angular_velocity += i_b * s2 * impulse;
            }

            // Angular lock.
            {
                let c = relative_angle(&a, &b);
                let (bias, mass_scale, impulse_scale) = soft_terms(&joint_soft, c, false);
                let cdot = b.angular_velocity - a.angular_velocity;
                let k = i_a + i_b;
                let mass = if k > 0.0 { 1.0 / k } else { 0.0 };
                let impulse = -mass * mass_scale * (cdot + bias) - impulse_scale * j.angular_impulse;
                j.angular_impulse += impulse;

                a.angular_velocity -= i_a * impulse;
                b.angular_velocity += i_b * impulse;
            }
        }
        JointKind::Revolute(j) => {
            let angle = relative_angle(&a, &b);

            // Angular spring.
            if j.enable_spring {
                let c = angle - j.target_angle;
                let cdot = b.angular_velocity - a.angular_velocity;
                let impulse = -j.axial_mass * j.spring_soft.mass_scale * (cdot + j.spring_soft.bias_rate * c)
                    - j.spring_soft.impulse_scale * j.spring_impulse;
                j.spring_impulse += impulse;

                a.angular_velocity -= i_a * impulse;
                b.angular_velocity += i_b * impulse;
            }

            // Motor.
            if j.enable_motor {
                let cdot = b.angular_velocity - a.angular_velocity - j.motor_speed;
                let impulse = -j.axial_mass * cdot;
                let max_impulse = j.max_motor_torque * h;
                let new_impulse = (j.motor_impulse + impulse).clamp(-max_impulse, max_impulse);
                let delta = new_impulse - j.motor_impulse;
                j.motor_impulse = new_impulse;

                a.angular_velocity -= i_a * delta;
                b.angular_velocity += i_b * delta;
            }

            // Angular limits.
            if j.enable_limit {
                {
                    let c = angle - j.lower_angle;
                    let (bias, mass_scale, impulse_scale) = if c > 0.0 {
                        (c * inv_h, 1.0, 0.0)
                    } else {
                        soft_terms(&joint_soft, c, true)
                    };
                    let cdot = b.angular_velocity - a.angular_velocity;
                    let impulse = -j.axial_mass * mass_scale * (cdot + bias)
                        - impulse_scale * j.lower_impulse;
                    let new_impulse = (j.lower_impulse + impulse).max(0.0);
                    let delta = new_impulse - j.lower_impulse;
                    j.lower_impulse = new_impulse;

                    a.angular_velocity -= i_a * delta;
                    b.angular_velocity += i_b * delta;
                }
                {
                    let c = j.upper_angle - angle;
                    let (bias, mass_scale, impulse_scale) = if c > 0.0 {
                        (c * inv_h, 1.0, 0.0)
                    } else {
                        soft_terms(&joint_soft, c, true)
                    };
                    let cdot = a.angular_velocity - b.angular_velocity;
                    let impulse = -j.axial_mass * mass_scale * (cdot + bias)
                        - impulse_scale * j.upper_impulse;
                    let new_impulse = (j.upper_impulse + impulse).max(0.0);
                    let delta = new_impulse - j.upper_impulse;
                    j.upper_impulse = new_impulse;

                    a.angular_velocity += i_a * delta;
                    b.angular_velocity -= i_b * delta;
                }
            }

            // Pivot point row.
            {
                let c = separation(&a, &b, r_a, r_b);
                let (bias_x, mass_scale, impulse_scale) = soft_terms(&joint_soft, c.x, false);
                let (bias_y, _, _) = soft_terms(&joint_soft, c.y, false);
                let bias = Vec2::new(bias_x, bias_y);

                let cdot = b.linear_velocity + cross_sv(b.angular_velocity, r_b)
                    - a.linear_velocity
                    - cross_sv(a.angular_velocity, r_a);

                let k11 = m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y;
                let k12 = -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y;
                let k22 = m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x;

                let impulse = solve22(k11, k12, k22, -(mass_scale * (cdot + bias)))
                    - impulse_scale * j.linear_impulse;
                j.linear_impulse += impulse;

                a.linear_velocity -= m_a * impulse;
                a.angular_velocity -= i_a * cross(r_a, impulse);
                b.linear_velocity += m_b * impulse;
                b.angular_velocity += i_b * cross(r_b, impulse);
            }
        }
        JointKind::Weld(j) => {
            // Angular row.
            {
                let c = relative_angle(&a, &b);
                let soft = if j.angular_hertz > 0.0 {
                    j.angular_soft
                } else {
                    joint_soft
                };
                let (bias, mass_scale, impulse_scale) = if j.angular_hertz > 0.0 {
                    (soft.bias_rate * c, soft.mass_scale, soft.impulse_scale)
                } else {
                    soft_terms(&soft, c, false)
                };
                let cdot = b.angular_velocity - a.angular_velocity;
                let k = i_a + i_b;
                let mass = if k > 0.0 { 1.0 / k } else { 0.0 };
                let impulse = -mass * mass_scale * (cdot + bias) - impulse_scale * j.angular_impulse;
                j.angular_impulse += impulse;

                a.angular_velocity -= i_a * impulse;
                b.angular_velocity += i_b * impulse;
            }

            // Linear row.
            {
                let c = separation(&a, &b, r_a, r_b);
                let soft = if j.linear_hertz > 0.0 { j.linear_soft } else { joint_soft };
                let (bias, mass_scale, impulse_scale) = if j.linear_hertz > 0.0 {
                    (soft.bias_rate * c.x, soft.mass_scale, soft.impulse_scale)
                } else {
                    soft_terms(&soft, c.x, false)
                };
                let bias = Vec2::new(bias, {
                    if j.linear_hertz > 0.0 {
                        soft.bias_rate * c.y
                    } else if use_bias {
                        soft.bias_rate * c.y
                    } else {
                        0.0
                    }
                });

                let cdot = b.linear_velocity + cross_sv(b.angular_velocity, r_b)
                    - a.linear_velocity
                    - cross_sv(a.angular_velocity, r_a);

                let k11 = m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y;
                let k12 = -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y;
                let k22 = m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x;

                let impulse = solve22(k11, k12, k22, -(mass_scale * (cdot + bias)))
                    - impulse_scale * j.linear_impulse;
                j.linear_impulse += impulse;

                a.linear_velocity -= m_a * impulse;
                a.angular_velocity -= i_a * cross(r_a, impulse);
                b.linear_velocity += m_b * impulse;
                b.angular_velocity += i_b * cross(r_b, impulse);
            }
        }
        JointKind::Wheel(j) => {
            let axis = a.delta_rotation.mul(rot_a0).x_axis();
            let perp = left_perp(axis);
            let d = separation(&a, &b, r_a, r_b);
            let translation = d.dot(axis);

            let a1 = cross(d + r_a, axis);
            let a2 = cross(r_b, axis);
            let s1 = cross(d + r_a, perp);
            let s2 = cross(r_b, perp);

            let axial_cdot = |a: &SolverBody,
                              b: &SolverBody| {
                axis.dot(b.linear_velocity - a.linear_velocity) + a2 * b.angular_velocity
                    - a1 * a.angular_velocity
            };

            // Motor on relative rotation.
            if j.enable_motor {
                let cdot = b.angular_velocity - a.angular_velocity - j.motor_speed;
                let impulse = -j.motor_mass * cdot;
                let max_impulse = j.max_motor_torque * h;
                let new_impulse = (j.motor_impulse + impulse).clamp(-max_impulse, max_impulse);
                let delta = new_impulse - j.motor_impulse;
                j.motor_impulse = new_impulse;

                a.angular_velocity -= i_a * delta;
                b.angular_velocity += i_b * delta;
            }

            // Suspension spring.
            if j.enable_spring {
                let c = translation;
                let cdot = axial_cdot(&a, &b);
                let impulse = -j.axial_mass * j.spring_soft.mass_scale * (cdot + j.spring_soft.bias_rate * c)
                    - j.spring_soft.impulse_scale * j.spring_impulse;
                j.spring_impulse += impulse;

                let p = impulse * axis;
                a.linear_velocity -= m_a * p;
                a.angular_velocity -= i_a * a1 * impulse;
                b.linear_velocity += m_b * p;
                b.angular_velocity += i_b * a2 * impulse;
            }

            // Translation limits.
            if j.enable_limit {
                {
                    let c = translation - j.lower_translation;
                    let (bias, mass_scale, impulse_scale) = if c > 0.0 {
                        (c * inv_h, 1.0, 0.0)
                    } else {
                        soft_terms(&joint_soft, c, true)
                    };
                    let cdot = axial_cdot(&a, &b);
                    let impulse = -j.axial_mass * mass_scale * (cdot + bias)
                        - impulse_scale * j.lower_impulse;
                    let new_impulse = (j.lower_impulse + impulse).max(0.0);
                    let delta = new_impulse - j.lower_impulse;
                    j.lower_impulse = new_impulse;

                    let p = delta * axis;
                    a.linear_velocity -= m_a * p;
                    a.angular_velocity -= i_a * a1 * delta;
                    b.linear_velocity += m_b * p;
                    b.angular_velocity += i_b * a2 * delta;
                }
                {
                    let c = j.upper_translation - translation;
                    let (bias, mass_scale, impulse_scale) = if c > 0.0 {
                        (c * inv_h, 1.0, 0.0)
                    } else {
                        soft_terms(&joint_soft, c, true)
                    };
                    let cdot = -axial_cdot(&a, &b);
                    let impulse = -j.axial_mass * mass_scale * (cdot + bias)
                        - impulse_scale * j.upper_impulse;
                    let new_impulse = (j.upper_impulse + impulse).max(0.0);
                    let delta = new_impulse - j.upper_impulse;
                    j.upper_impulse = new_impulse;

                    let p = -delta * axis;
                    a.linear_velocity -= m_a * p;
                    a.angular_velocity -= i_a * a1 * -delta;
                    b.linear_velocity += m_b * p;
                    b.angular_velocity += i_b * a2 * -delta;
                }
            }

            // Point-on-line row.
            {
                let c = d.dot(perp);
                let (bias, mass_scale, impulse_scale) = soft_terms(&joint_soft, c, false);
                let cdot = perp.dot(b.linear_velocity - a.linear_velocity) + s2 * b.angular_velocity
                    - s1 * a.angular_velocity;
                let k = m_a + m_b + i_a * s1 * s1 + i_b * s2 * s2;
                let mass = if k > 0.0 { 1.0 / k } else { 0.0 };
                let impulse = -mass * mass_scale * (cdot + bias) - impulse_scale * j.perp_impulse;
                j.perp_impulse += impulse;

                let p = impulse * perp;
                a.linear_velocity -= m_a * p;
                a.angular_velocity -= i_a * s1 * impulse;
                b.linear_velocity += m_b * p;
                b.angular_velocity += i_b * s2 * impulse;
            }
        }
    }

    states.write(joint.index_a, a);
    states.write(joint.index_b, b);
}

/// Reaction force and torque from the accumulated impulses, for joint
/// events and user queries.
pub fn joint_reaction(joint: &Joint, inv_h: f32) -> (Vec2, f32) {
    match &joint.kind {
        JointKind::Filter => (Vec2::ZERO, 0.0),
        JointKind::Distance(j) => {
            let axial = j.impulse + j.lower_impulse - j.upper_impulse;
            (inv_h * axial * j.axis, 0.0)
        }
        JointKind::Motor(j) => (inv_h * j.linear_impulse, inv_h * j.angular_impulse),
        JointKind::Mouse(j) => (inv_h * j.impulse, 0.0),
        JointKind::Prismatic(j) => {
            let axis = joint.rot_a0.x_axis();
            let perp = left_perp(axis);
            let axial = j.spring_impulse + j.motor_impulse + j.lower_impulse - j.upper_impulse;
            (
                inv_h * (j.perp_impulse * perp + axial * axis),
                inv_h * j.angular_impulse,
            )
        }
        JointKind::Revolute(j) => {
            let angular = j.spring_impulse + j.motor_impulse + j.lower_impulse - j.upper_impulse;
            (inv_h * j.linear_impulse, inv_h * angular)
        }
        JointKind::Weld(j) => (inv_h * j.linear_impulse, inv_h * j.angular_impulse),
        JointKind::Wheel(j) => {
            let axis = joint.rot_a0.x_axis();
            let perp = left_perp(axis);
            let axial = j.spring_impulse + j.lower_impulse - j.upper_impulse;
            (
                inv_h * (j.perp_impulse * perp + axial * axis),
                inv_h * j.motor_impulse,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solve22_inverts_symmetric_system() {
        let (k11, k12, k22) = (2.0, 0.5, 3.0);
        let x = solve22(k11, k12, k22, Vec2::new(1.0, -2.0));
        let bx = k11 * x.x + k12 * x.y;
        let by = k12 * x.x + k22 * x.y;
        assert!((bx - 1.0).abs() < 1e-5);
        assert!((by + 2.0).abs() < 1e-5);
    }

    #[test]
    fn filter_joint_has_no_reaction() {
        let def = JointDef::new(JointKind::Filter, EntityId::NULL, EntityId::NULL);
        let joint = Joint::from_def(EntityId::NULL, &def);
        let (force, torque) = joint_reaction(&joint, 60.0);
        assert_eq!(force, Vec2::ZERO);
        assert_eq!(torque, 0.0);
    }
}

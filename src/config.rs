//! Global configuration constants for the Momentum2D engine.
//!
//! Lengths are in conceptual meters; tune `LINEAR_SLOP` and the margins
//! together if a different unit scale is used.

/// Default gravity vector applied in the physics world (Y-up).
pub const DEFAULT_GRAVITY: [f32; 2] = [0.0, -10.0];

/// Number of solver substeps performed per step.
pub const DEFAULT_SUB_STEP_COUNT: u32 = 4;

/// Collision and constraint resolution tolerance.
pub const LINEAR_SLOP: f32 = 0.005;

/// Maximum gap at which speculative contact points are generated.
pub const SPECULATIVE_DISTANCE: f32 = 4.0 * LINEAR_SLOP;

/// Fat AABB margin applied to broad-phase proxies.
pub const AABB_MARGIN: f32 = 0.1;

/// Hard cap on body linear speed, applied after velocity integration.
pub const MAX_LINEAR_SPEED: f32 = 400.0;

/// Largest rotation per substep; larger spins are clamped.
pub const MAX_ROTATION: f32 = 0.25 * std::f32::consts::PI;

/// Contact soft-constraint stiffness in cycles per second.
pub const CONTACT_HERTZ: f32 = 30.0;

/// Contact soft-constraint damping ratio (non-dimensional).
pub const CONTACT_DAMPING_RATIO: f32 = 10.0;

/// Cap on the speed used to push overlapping bodies apart.
pub const CONTACT_PUSH_MAX_SPEED: f32 = 3.0;

/// Joint soft-constraint stiffness in cycles per second.
pub const JOINT_HERTZ: f32 = 60.0;

/// Joint soft-constraint damping ratio.
pub const JOINT_DAMPING_RATIO: f32 = 2.0;

/// Approach speed below which restitution is ignored.
pub const RESTITUTION_THRESHOLD: f32 = 1.0;

/// Approach speed above which contact hit events fire.
pub const HIT_EVENT_THRESHOLD: f32 = 1.0;

/// Linear speed below which a body accumulates sleep time.
pub const SLEEP_LINEAR_VELOCITY: f32 = 0.05;

/// Angular speed below which a body accumulates sleep time (~2°/s).
pub const SLEEP_ANGULAR_VELOCITY: f32 = 0.035;

/// Continuous low-speed duration after which an island sleeps.
pub const TIME_TO_SLEEP: f32 = 0.5;

/// Maximum vertices in a convex polygon shape.
pub const MAX_POLYGON_VERTICES: usize = 8;

/// Parallel constraint colors; one overflow color is kept on top.
pub const GRAPH_COLOR_COUNT: usize = 24;

/// Default shape density (kg/m²).
pub const DEFAULT_DENSITY: f32 = 1.0;

/// Default shape friction coefficient.
pub const DEFAULT_FRICTION: f32 = 0.6;

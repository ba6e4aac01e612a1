use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::utils::math::Rot;

/// Position and rotation of a body origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub p: Vec2,
    pub q: Rot,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        p: Vec2::ZERO,
        q: Rot::IDENTITY,
    };

    pub fn new(position: Vec2, angle: f32) -> Self {
        Self {
            p: position,
            q: Rot::from_angle(angle),
        }
    }

    /// Maps a point from local to world space.
    pub fn transform_point(&self, local: Vec2) -> Vec2 {
        self.p + self.q.apply(local)
    }

    /// Maps a point from world to local space.
    pub fn inv_transform_point(&self, world: Vec2) -> Vec2 {
        self.q.apply_inverse(world - self.p)
    }

    /// Composition `self * other`.
    pub fn mul(&self, other: Transform) -> Transform {
        Transform {
            p: self.transform_point(other.p),
            q: self.q.mul(other.q),
        }
    }

    /// Composition `inverse(self) * other`: `other` expressed in this frame.
    pub fn inv_mul(&self, other: Transform) -> Transform {
        Transform {
            p: self.q.apply_inverse(other.p - self.p),
            q: self.q.inv_mul(other.q),
        }
    }
}

/// Linear and angular velocity of a rigid body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub linear: Vec2,
    pub angular: f32,
}

/// Mass, center of mass, and rotational inertia about the local origin.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MassData {
    pub mass: f32,
    pub center: Vec2,
    pub rotational_inertia: f32,
}

/// Surface coefficients affecting contact response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceMaterial {
    pub friction: f32,
    pub restitution: f32,
    /// Resistance to rolling, scaled by the contacting feature size.
    pub rolling_resistance: f32,
    /// Desired surface speed along the contact tangent (conveyor belts).
    pub tangent_speed: f32,
    /// Opaque id forwarded to the mixing callbacks.
    pub user_material_id: u64,
}

impl Default for SurfaceMaterial {
    fn default() -> Self {
        Self {
            friction: crate::config::DEFAULT_FRICTION,
            restitution: 0.0,
            rolling_resistance: 0.0,
            tangent_speed: 0.0,
            user_material_id: 0,
        }
    }
}

/// Category/mask collision filter with a group override.
///
/// Shapes in the same non-zero group always collide when the group is
/// positive and never collide when it is negative, regardless of bits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CollisionFilter {
    pub category: u64,
    pub mask: u64,
    pub group: i32,
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self {
            category: 1,
            mask: u64::MAX,
            group: 0,
        }
    }
}

impl CollisionFilter {
    pub fn should_collide(a: &CollisionFilter, b: &CollisionFilter) -> bool {
        if a.group == b.group && a.group != 0 {
            return a.group > 0;
        }
        (a.category & b.mask) != 0 && (b.category & a.mask) != 0
    }
}

/// Material-mixing callback. Receives the two coefficients and their user
/// material ids. Must be pure: called from workers with no world access.
pub type MixingFn = fn(f32, u64, f32, u64) -> f32;

/// Default friction mix: geometric mean.
pub fn default_friction_mix(friction_a: f32, _id_a: u64, friction_b: f32, _id_b: u64) -> f32 {
    (friction_a * friction_b).sqrt()
}

/// Default restitution mix: maximum.
pub fn default_restitution_mix(restitution_a: f32, _id_a: u64, restitution_b: f32, _id_b: u64) -> f32 {
    restitution_a.max(restitution_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_inverse_round_trip() {
        let xf = Transform::new(Vec2::new(2.0, -1.0), 0.6);
        let p = Vec2::new(0.5, 3.0);
        let back = xf.inv_transform_point(xf.transform_point(p));
        assert!((back - p).length() < 1e-5);
    }

    #[test]
    fn inv_mul_expresses_relative_frame() {
        let a = Transform::new(Vec2::new(1.0, 0.0), 0.0);
        let b = Transform::new(Vec2::new(2.0, 0.0), 0.0);
        let rel = a.inv_mul(b);
        assert!((rel.p - Vec2::new(1.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn group_filter_overrides_bits() {
        let mut a = CollisionFilter::default();
        let mut b = CollisionFilter::default();
        a.mask = 0;
        a.group = 3;
        b.group = 3;
        assert!(CollisionFilter::should_collide(&a, &b));

        a.group = -2;
        b.group = -2;
        a.mask = u64::MAX;
        assert!(!CollisionFilter::should_collide(&a, &b));
    }

    #[test]
    fn default_mixers_match_documented_rules() {
        assert!((default_friction_mix(0.4, 0, 0.9, 0) - (0.4_f32 * 0.9).sqrt()).abs() < 1e-6);
        assert!((default_restitution_mix(0.2, 0, 0.7, 0) - 0.7).abs() < 1e-6);
    }
}

//! 2D math helpers layered on top of `glam`.
//!
//! `glam` has no planar rotor type, so rotations are carried as a
//! cosine/sine pair. Keeping the pair instead of an angle avoids
//! trigonometry in the hot solver loops.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Planar rotation stored as cosine and sine of the angle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rot {
    pub c: f32,
    pub s: f32,
}

impl Default for Rot {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Rot {
    pub const IDENTITY: Self = Self { c: 1.0, s: 0.0 };

    pub fn from_angle(radians: f32) -> Self {
        Self {
            c: radians.cos(),
            s: radians.sin(),
        }
    }

    pub fn angle(&self) -> f32 {
        self.s.atan2(self.c)
    }

    /// Rotates a vector.
    pub fn apply(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x - self.s * v.y, self.s * v.x + self.c * v.y)
    }

    /// Rotates a vector by the inverse rotation.
    pub fn apply_inverse(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x + self.s * v.y, -self.s * v.x + self.c * v.y)
    }

    /// Composition `self * other`.
    pub fn mul(&self, other: Rot) -> Rot {
        Rot {
            c: self.c * other.c - self.s * other.s,
            s: self.s * other.c + self.c * other.s,
        }
    }

    /// Composition `inverse(self) * other`.
    pub fn inv_mul(&self, other: Rot) -> Rot {
        Rot {
            c: self.c * other.c + self.s * other.s,
            s: self.c * other.s - self.s * other.c,
        }
    }

    pub fn x_axis(&self) -> Vec2 {
        Vec2::new(self.c, self.s)
    }

    pub fn y_axis(&self) -> Vec2 {
        Vec2::new(-self.s, self.c)
    }

    pub fn normalize(self) -> Rot {
        let mag = (self.c * self.c + self.s * self.s).sqrt();
        let inv = if mag > 0.0 { 1.0 / mag } else { 0.0 };
        Rot {
            c: self.c * inv,
            s: self.s * inv,
        }
    }

    pub fn is_normalized(&self) -> bool {
        let qq = self.c * self.c + self.s * self.s;
        (1.0 - qq).abs() < 6.0e-4
    }

    /// Exponential-map step: `q + h * omega * perp(q)`, renormalized.
    pub fn integrate(self, omega: f32, h: f32) -> Rot {
        let delta = h * omega;
        Rot {
            c: self.c - delta * self.s,
            s: self.s + delta * self.c,
        }
        .normalize()
    }

    /// Signed angle of `inverse(a) * b` in `[-pi, pi]`.
    pub fn relative_angle(a: Rot, b: Rot) -> f32 {
        a.inv_mul(b).angle()
    }
}

/// 2D cross product (z component of the 3D cross).
pub fn cross(a: Vec2, b: Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}

/// Cross of a scalar (z axis) with a vector.
pub fn cross_sv(s: f32, v: Vec2) -> Vec2 {
    Vec2::new(-s * v.y, s * v.x)
}

/// Cross of a vector with a scalar (z axis).
pub fn cross_vs(v: Vec2, s: f32) -> Vec2 {
    Vec2::new(s * v.y, -s * v.x)
}

/// Counter-clockwise perpendicular.
pub fn left_perp(v: Vec2) -> Vec2 {
    Vec2::new(-v.y, v.x)
}

/// Clockwise perpendicular.
pub fn right_perp(v: Vec2) -> Vec2 {
    Vec2::new(v.y, -v.x)
}

pub fn is_valid_float(x: f32) -> bool {
    x.is_finite()
}

pub fn is_valid_vec(v: Vec2) -> bool {
    v.x.is_finite() && v.y.is_finite()
}

/// Wraps an angle into `[-pi, pi]`.
pub fn unwind_angle(angle: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    if angle < -PI {
        angle + TAU * ((-angle + PI) / TAU).floor().max(1.0)
    } else if angle > PI {
        angle - TAU * ((angle + PI) / TAU).floor().max(1.0)
    } else {
        angle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    #[test]
    fn rotation_round_trips_vectors() {
        let q = Rot::from_angle(0.7);
        let v = Vec2::new(3.0, -2.0);
        let rotated = q.apply(v);
        let back = q.apply_inverse(rotated);
        assert!((back - v).length() < 1e-5);
    }

    #[test]
    fn relative_angle_matches_composition() {
        let a = Rot::from_angle(0.3);
        let b = Rot::from_angle(1.1);
        assert!((Rot::relative_angle(a, b) - 0.8).abs() < 1e-5);
    }

    #[test]
    fn integrate_approaches_exact_rotation() {
        let mut q = Rot::IDENTITY;
        let omega = FRAC_PI_2;
        let steps = 1000;
        for _ in 0..steps {
            q = q.integrate(omega, 1.0 / steps as f32);
        }
        assert!((q.angle() - FRAC_PI_2).abs() < 1e-3);
        assert!(q.is_normalized());
    }

    #[test]
    fn unwind_keeps_angles_in_range() {
        assert!((unwind_angle(3.0 * PI) - PI).abs() < 1e-4);
        assert!((unwind_angle(-3.0 * PI) + PI).abs() < 1e-4);
        assert!((unwind_angle(0.5) - 0.5).abs() < 1e-6);
    }
}

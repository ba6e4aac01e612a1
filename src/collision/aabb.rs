use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub lower: Vec2,
    pub upper: Vec2,
}

impl Default for Aabb {
    fn default() -> Self {
        Self {
            lower: Vec2::ZERO,
            upper: Vec2::ZERO,
        }
    }
}

impl Aabb {
    pub fn new(lower: Vec2, upper: Vec2) -> Self {
        Self { lower, upper }
    }

    pub fn from_points(a: Vec2, b: Vec2) -> Self {
        Self {
            lower: a.min(b),
            upper: a.max(b),
        }
    }

    pub fn center(&self) -> Vec2 {
        0.5 * (self.lower + self.upper)
    }

    pub fn extents(&self) -> Vec2 {
        0.5 * (self.upper - self.lower)
    }

    /// Perimeter, the 2D surface-area-heuristic measure.
    pub fn perimeter(&self) -> f32 {
        let d = self.upper - self.lower;
        2.0 * (d.x + d.y)
    }

    pub fn union(a: Aabb, b: Aabb) -> Aabb {
        Aabb {
            lower: a.lower.min(b.lower),
            upper: a.upper.max(b.upper),
        }
    }

    /// True when `other` fits entirely inside this box.
    pub fn contains(&self, other: &Aabb) -> bool {
        self.lower.x <= other.lower.x
            && self.lower.y <= other.lower.y
            && other.upper.x <= self.upper.x
            && other.upper.y <= self.upper.y
    }

    pub fn overlaps(a: &Aabb, b: &Aabb) -> bool {
        a.lower.x <= b.upper.x && a.lower.y <= b.upper.y && b.lower.x <= a.upper.x && b.lower.y <= a.upper.y
    }

    pub fn expand(&self, margin: f32) -> Aabb {
        Aabb {
            lower: self.lower - Vec2::splat(margin),
            upper: self.upper + Vec2::splat(margin),
        }
    }

    pub fn expand_vec(&self, half_extents: Vec2) -> Aabb {
        Aabb {
            lower: self.lower - half_extents,
            upper: self.upper + half_extents,
        }
    }

    /// Grows the box along a displacement vector (predictive margin).
    pub fn extend_by(&self, displacement: Vec2) -> Aabb {
        let mut out = *self;
        if displacement.x < 0.0 {
            out.lower.x += displacement.x;
        } else {
            out.upper.x += displacement.x;
        }
        if displacement.y < 0.0 {
            out.lower.y += displacement.y;
        } else {
            out.upper.y += displacement.y;
        }
        out
    }

    pub fn is_valid(&self) -> bool {
        self.lower.x <= self.upper.x
            && self.lower.y <= self.upper.y
            && self.lower.is_finite()
            && self.upper.is_finite()
    }

    /// Slab test against the segment `origin + t * translation`, `t` in
    /// `[0, t_max]`. Returns whether the segment touches the box.
    pub fn intersects_ray(&self, origin: Vec2, translation: Vec2, t_max: f32) -> bool {
        let mut t_lower: f32 = 0.0;
        let mut t_upper = t_max;

        for axis in 0..2 {
            let (o, d, lo, hi) = match axis {
                0 => (origin.x, translation.x, self.lower.x, self.upper.x),
                _ => (origin.y, translation.y, self.lower.y, self.upper.y),
            };

            if d.abs() < f32::EPSILON {
                if o < lo || o > hi {
                    return false;
                }
                continue;
            }

            let inv = 1.0 / d;
            let mut t1 = (lo - o) * inv;
            let mut t2 = (hi - o) * inv;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_lower = t_lower.max(t1);
            t_upper = t_upper.min(t2);
            if t_lower > t_upper {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_and_containment() {
        let a = Aabb::new(Vec2::new(-1.0, -1.0), Vec2::new(1.0, 1.0));
        let b = Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(2.0, 0.5));
        let u = Aabb::union(a, b);
        assert!(u.contains(&a) && u.contains(&b));
        assert!((u.perimeter() - 2.0 * (3.0 + 2.0)).abs() < 1e-6);
    }

    #[test]
    fn ray_slab_test() {
        let b = Aabb::new(Vec2::new(1.0, -0.5), Vec2::new(2.0, 0.5));
        assert!(b.intersects_ray(Vec2::ZERO, Vec2::new(4.0, 0.0), 1.0));
        assert!(!b.intersects_ray(Vec2::ZERO, Vec2::new(0.0, 4.0), 1.0));
        // axis-parallel ray inside the slab
        assert!(b.intersects_ray(Vec2::new(1.5, -2.0), Vec2::new(0.0, 4.0), 1.0));
    }

    #[test]
    fn directional_extension() {
        let b = Aabb::new(Vec2::ZERO, Vec2::ONE).extend_by(Vec2::new(-2.0, 3.0));
        assert_eq!(b.lower, Vec2::new(-2.0, 0.0));
        assert_eq!(b.upper, Vec2::new(1.0, 4.0));
    }
}

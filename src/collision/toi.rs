//! Time of impact between two swept shapes by bilateral advancement:
//! conservative advancement on a separation function with a
//! secant/bisection root finder.

use glam::Vec2;

use crate::{
    collision::distance::{shape_distance, DistanceInput, DistanceProxy, SimplexCache},
    config::LINEAR_SLOP,
    core::types::Transform,
    utils::math::{left_perp, Rot},
};

const MAX_TOI_ITERATIONS: usize = 20;
const MAX_ROOT_ITERATIONS: usize = 50;

/// Motion of a body over one step: center-of-mass endpoints and rotation
/// endpoints, interpolated linearly (rotation by normalized lerp).
#[derive(Debug, Clone, Copy)]
pub struct Sweep {
    pub local_center: Vec2,
    pub c1: Vec2,
    pub c2: Vec2,
    pub q1: Rot,
    pub q2: Rot,
}

impl Sweep {
    /// Body-origin transform at interpolation fraction `t`.
    pub fn transform_at(&self, t: f32) -> Transform {
        let c = self.c1.lerp(self.c2, t);
        let q = Rot {
            c: (1.0 - t) * self.q1.c + t * self.q2.c,
            s: (1.0 - t) * self.q1.s + t * self.q2.s,
        }
        .normalize();
        Transform {
            p: c - q.apply(self.local_center),
            q,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToiState {
    Unknown,
    /// The separation function stopped decreasing; numerical failure.
    Failed,
    Overlapped,
    Hit,
    Separated,
}

#[derive(Debug, Clone, Copy)]
pub struct ToiInput {
    pub proxy_a: DistanceProxy,
    pub proxy_b: DistanceProxy,
    pub sweep_a: Sweep,
    pub sweep_b: Sweep,
    pub max_fraction: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct ToiOutput {
    pub state: ToiState,
    pub fraction: f32,
}

#[derive(Debug, Clone, Copy)]
enum SeparationKind {
    Points,
    FaceA,
    FaceB,
}

struct SeparationFunction<'a> {
    proxy_a: &'a DistanceProxy,
    proxy_b: &'a DistanceProxy,
    sweep_a: Sweep,
    sweep_b: Sweep,
    local_point: Vec2,
    axis: Vec2,
    kind: SeparationKind,
}

impl<'a> SeparationFunction<'a> {
    fn new(cache: &SimplexCache, input: &'a ToiInput, t1: f32) -> Self {
        let xf_a = input.sweep_a.transform_at(t1);
        let xf_b = input.sweep_b.transform_at(t1);

        if cache.count == 1 {
            let local_a = input.proxy_a.points[cache.index_a[0] as usize];
            let local_b = input.proxy_b.points[cache.index_b[0] as usize];
            let point_a = xf_a.transform_point(local_a);
            let point_b = xf_b.transform_point(local_b);
            return Self {
                proxy_a: &input.proxy_a,
                proxy_b: &input.proxy_b,
                sweep_a: input.sweep_a,
                sweep_b: input.sweep_b,
                local_point: Vec2::ZERO,
                axis: (point_b - point_a).normalize_or_zero(),
                kind: SeparationKind::Points,
            };
        }

        if cache.index_a[0] == cache.index_a[1] {
            // Two points on B: use B's face normal.
            let local_b1 = input.proxy_b.points[cache.index_b[0] as usize];
            let local_b2 = input.proxy_b.points[cache.index_b[1] as usize];
            let mut axis = left_perp(local_b2 - local_b1).normalize_or_zero();
            let local_point = 0.5 * (local_b1 + local_b2);
            let normal = xf_b.q.apply(axis);

            let local_a = input.proxy_a.points[cache.index_a[0] as usize];
            let point_a = xf_a.transform_point(local_a);
            let point_b = xf_b.transform_point(local_point);
            if (point_a - point_b).dot(normal) < 0.0 {
                axis = -axis;
            }
            return Self {
                proxy_a: &input.proxy_a,
                proxy_b: &input.proxy_b,
                sweep_a: input.sweep_a,
                sweep_b: input.sweep_b,
                local_point,
                axis,
                kind: SeparationKind::FaceB,
            };
        }

        // Two points on A: use A's face normal.
        let local_a1 = input.proxy_a.points[cache.index_a[0] as usize];
        let local_a2 = input.proxy_a.points[cache.index_a[1] as usize];
        let mut axis = left_perp(local_a2 - local_a1).normalize_or_zero();
        let local_point = 0.5 * (local_a1 + local_a2);
        let normal = xf_a.q.apply(axis);

        let local_b = input.proxy_b.points[cache.index_b[0] as usize];
        let point_b = xf_b.transform_point(local_b);
        let point_a = xf_a.transform_point(local_point);
        if (point_b - point_a).dot(normal) < 0.0 {
            axis = -axis;
        }
        Self {
            proxy_a: &input.proxy_a,
            proxy_b: &input.proxy_b,
            sweep_a: input.sweep_a,
            sweep_b: input.sweep_b,
            local_point,
            axis,
            kind: SeparationKind::FaceA,
        }
    }

    /// Deepest-point separation at fraction `t` with the witness indices.
    fn find_min_separation(&self, t: f32) -> (f32, usize, usize) {
        let xf_a = self.sweep_a.transform_at(t);
        let xf_b = self.sweep_b.transform_at(t);

        match self.kind {
            SeparationKind::Points => {
                let axis_a = xf_a.q.apply_inverse(self.axis);
                let axis_b = xf_b.q.apply_inverse(-self.axis);
                let index_a = support_index(self.proxy_a, axis_a);
                let index_b = support_index(self.proxy_b, axis_b);
                let point_a = xf_a.transform_point(self.proxy_a.points[index_a]);
                let point_b = xf_b.transform_point(self.proxy_b.points[index_b]);
                ((point_b - point_a).dot(self.axis), index_a, index_b)
            }
            SeparationKind::FaceA => {
                let normal = xf_a.q.apply(self.axis);
                let point_a = xf_a.transform_point(self.local_point);
                let axis_b = xf_b.q.apply_inverse(-normal);
                let index_b = support_index(self.proxy_b, axis_b);
                let point_b = xf_b.transform_point(self.proxy_b.points[index_b]);
                ((point_b - point_a).dot(normal), usize::MAX, index_b)
            }
            SeparationKind::FaceB => {
                let normal = xf_b.q.apply(self.axis);
                let point_b = xf_b.transform_point(self.local_point);
                let axis_a = xf_a.q.apply_inverse(-normal);
                let index_a = support_index(self.proxy_a, axis_a);
                let point_a = xf_a.transform_point(self.proxy_a.points[index_a]);
                ((point_a - point_b).dot(normal), index_a, usize::MAX)
            }
        }
    }

    /// Separation of a fixed witness pair at fraction `t`.
    fn evaluate(&self, index_a: usize, index_b: usize, t: f32) -> f32 {
        let xf_a = self.sweep_a.transform_at(t);
        let xf_b = self.sweep_b.transform_at(t);

        match self.kind {
            SeparationKind::Points => {
                let point_a = xf_a.transform_point(self.proxy_a.points[index_a]);
                let point_b = xf_b.transform_point(self.proxy_b.points[index_b]);
                (point_b - point_a).dot(self.axis)
            }
            SeparationKind::FaceA => {
                let normal = xf_a.q.apply(self.axis);
                let point_a = xf_a.transform_point(self.local_point);
                let point_b = xf_b.transform_point(self.proxy_b.points[index_b]);
                (point_b - point_a).dot(normal)
            }
            SeparationKind::FaceB => {
                let normal = xf_b.q.apply(self.axis);
                let point_b = xf_b.transform_point(self.local_point);
                let point_a = xf_a.transform_point(self.proxy_a.points[index_a]);
                (point_a - point_b).dot(normal)
            }
        }
    }
}

fn support_index(proxy: &DistanceProxy, direction: Vec2) -> usize {
    let mut best = 0;
    let mut best_dot = proxy.points[0].dot(direction);
    for i in 1..proxy.count {
        let d = proxy.points[i].dot(direction);
        if d > best_dot {
            best = i;
            best_dot = d;
        }
    }
    best
}

/// Finds the first fraction in `[0, max_fraction]` at which the swept
/// shapes come within tolerance of touching.
pub fn time_of_impact(input: &ToiInput) -> ToiOutput {
    let mut output = ToiOutput {
        state: ToiState::Unknown,
        fraction: input.max_fraction,
    };

    let total_radius = input.proxy_a.radius + input.proxy_b.radius;
    let target = LINEAR_SLOP.max(total_radius - 3.0 * LINEAR_SLOP);
    let tolerance = 0.25 * LINEAR_SLOP;
    debug_assert!(target > tolerance);

    let t_max = input.max_fraction;
    let mut t1 = 0.0_f32;
    let mut cache = SimplexCache::default();

    for _ in 0..MAX_TOI_ITERATIONS {
        let xf_a = input.sweep_a.transform_at(t1);
        let xf_b = input.sweep_b.transform_at(t1);

        let distance_input = DistanceInput {
            proxy_a: input.proxy_a,
            proxy_b: input.proxy_b,
            transform_a: xf_a,
            transform_b: xf_b,
            use_radii: false,
        };
        let distance_output = shape_distance(&mut cache, &distance_input);

        if distance_output.distance <= 0.0 {
            output.state = ToiState::Overlapped;
            output.fraction = 0.0;
            return output;
        }

        if distance_output.distance < target + tolerance {
            output.state = ToiState::Hit;
            output.fraction = t1;
            return output;
        }

        let separation = SeparationFunction::new(&cache, input, t1);

        // Advance the deepest witness pair until the interval collapses.
        let mut done = false;
        let mut t2 = t_max;
        for _ in 0..input.proxy_a.count + input.proxy_b.count + 2 {
            let (mut s2, index_a, index_b) = separation.find_min_separation(t2);

            if s2 > target + tolerance {
                output.state = ToiState::Separated;
                output.fraction = t_max;
                done = true;
                break;
            }

            if s2 > target - tolerance {
                // This witness clears the target at t2; restart from there.
                t1 = t2;
                break;
            }

            let mut s1 = separation.evaluate(index_a, index_b, t1);

            if s1 < target - tolerance {
                // Separation did not decrease monotonically.
                output.state = ToiState::Failed;
                output.fraction = t1;
                done = true;
                break;
            }

            if s1 <= target + tolerance {
                output.state = ToiState::Hit;
                output.fraction = t1;
                done = true;
                break;
            }

            // Root find on [a1, a2]: alternate secant and bisection.
            let mut a1 = t1;
            let mut a2 = t2;
            for root_iteration in 0..MAX_ROOT_ITERATIONS {
                let t = if root_iteration & 1 == 1 {
                    a1 + (target - s1) * (a2 - a1) / (s2 - s1)
                } else {
                    0.5 * (a1 + a2)
                };

                let s = separation.evaluate(index_a, index_b, t);

                if (s - target).abs() < tolerance {
                    t2 = t;
                    break;
                }

                if s > target {
                    a1 = t;
                    s1 = s;
                } else {
                    a2 = t;
                    s2 = s;
                }
            }
        }

        if done {
            return output;
        }

        if t1 >= t_max {
            output.state = ToiState::Separated;
            output.fraction = t_max;
            return output;
        }
    }

    // No convergence; the caller falls back to discrete handling.
    output.state = ToiState::Failed;
    output.fraction = t1;
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_sweep(center: Vec2) -> Sweep {
        Sweep {
            local_center: Vec2::ZERO,
            c1: center,
            c2: center,
            q1: Rot::IDENTITY,
            q2: Rot::IDENTITY,
        }
    }

    #[test]
    fn fast_circle_hits_thin_segment() {
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&[Vec2::new(0.0, -1.0), Vec2::new(0.0, 1.0)], 0.0),
            proxy_b: DistanceProxy::new(&[Vec2::ZERO], 0.05),
            sweep_a: static_sweep(Vec2::ZERO),
            sweep_b: Sweep {
                local_center: Vec2::ZERO,
                c1: Vec2::new(-1.0, 0.0),
                c2: Vec2::new(2.333, 0.0),
                q1: Rot::IDENTITY,
                q2: Rot::IDENTITY,
            },
            max_fraction: 1.0,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Hit);
        // Surfaces meet just before the centers cross the plane.
        assert!(out.fraction > 0.2 && out.fraction < 0.31);
    }

    #[test]
    fn receding_shapes_stay_separated() {
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&[Vec2::ZERO], 0.5),
            proxy_b: DistanceProxy::new(&[Vec2::ZERO], 0.5),
            sweep_a: static_sweep(Vec2::ZERO),
            sweep_b: Sweep {
                local_center: Vec2::ZERO,
                c1: Vec2::new(2.0, 0.0),
                c2: Vec2::new(5.0, 0.0),
                q1: Rot::IDENTITY,
                q2: Rot::IDENTITY,
            },
            max_fraction: 1.0,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Separated);
        assert_eq!(out.fraction, 1.0);
    }

    #[test]
    fn initial_overlap_reports_overlapped() {
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&[Vec2::ZERO], 0.5),
            proxy_b: DistanceProxy::new(&[Vec2::ZERO], 0.5),
            sweep_a: static_sweep(Vec2::ZERO),
            sweep_b: Sweep {
                local_center: Vec2::ZERO,
                c1: Vec2::new(0.1, 0.0),
                c2: Vec2::new(3.0, 0.0),
                q1: Rot::IDENTITY,
                q2: Rot::IDENTITY,
            },
            max_fraction: 1.0,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Overlapped);
        assert_eq!(out.fraction, 0.0);
    }
}

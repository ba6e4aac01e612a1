//! Closest-point queries between convex shapes (GJK) and swept shape
//! casting by conservative advancement.

use glam::Vec2;

use crate::{
    collision::CastOutput,
    config::{LINEAR_SLOP, MAX_POLYGON_VERTICES},
    core::{shape::ShapeKind, types::Transform},
    utils::math::{cross, left_perp, right_perp},
};

const MAX_GJK_ITERATIONS: usize = 20;

/// Point cloud + radius view of a convex shape, in shape-local space.
#[derive(Debug, Clone, Copy)]
pub struct DistanceProxy {
    pub points: [Vec2; MAX_POLYGON_VERTICES],
    pub count: usize,
    pub radius: f32,
}

impl DistanceProxy {
    pub fn new(points: &[Vec2], radius: f32) -> Self {
        debug_assert!(!points.is_empty() && points.len() <= MAX_POLYGON_VERTICES);
        let mut out = Self {
            points: [Vec2::ZERO; MAX_POLYGON_VERTICES],
            count: points.len().min(MAX_POLYGON_VERTICES),
            radius,
        };
        out.points[..out.count].copy_from_slice(&points[..out.count]);
        out
    }

    pub fn from_shape(kind: &ShapeKind) -> Self {
        match kind {
            ShapeKind::Circle { center, radius } => Self::new(&[*center], *radius),
            ShapeKind::Capsule {
                center1,
                center2,
                radius,
            } => Self::new(&[*center1, *center2], *radius),
            ShapeKind::Segment { point1, point2 }
            | ShapeKind::ChainSegment { point1, point2, .. } => Self::new(&[*point1, *point2], 0.0),
            ShapeKind::Polygon(polygon) => {
                Self::new(&polygon.vertices[..polygon.count], polygon.radius)
            }
        }
    }

    /// Index of the vertex most extreme along `direction`. Ties keep the
    /// lowest index so queries stay deterministic.
    fn support(&self, direction: Vec2) -> usize {
        let mut best = 0;
        let mut best_dot = self.points[0].dot(direction);
        for i in 1..self.count {
            let d = self.points[i].dot(direction);
            if d > best_dot {
                best = i;
                best_dot = d;
            }
        }
        best
    }
}

/// Vertex indices saved from a previous GJK run, used to warm-start the
/// next one. Validated against `metric` drift before reuse.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimplexCache {
    pub count: usize,
    pub index_a: [u8; 3],
    pub index_b: [u8; 3],
    pub metric: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct DistanceInput {
    pub proxy_a: DistanceProxy,
    pub proxy_b: DistanceProxy,
    pub transform_a: Transform,
    pub transform_b: Transform,
    pub use_radii: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct DistanceOutput {
    pub point_a: Vec2,
    pub point_b: Vec2,
    /// Unit separation direction from A to B; zero on deep overlap.
    pub normal: Vec2,
    pub distance: f32,
    pub iterations: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct SimplexVertex {
    w_a: Vec2,
    w_b: Vec2,
    /// `w_b - w_a`, a point of the Minkowski difference B − A.
    w: Vec2,
    /// Barycentric weight.
    a: f32,
    index_a: usize,
    index_b: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct Simplex {
    v1: SimplexVertex,
    v2: SimplexVertex,
    v3: SimplexVertex,
    count: usize,
}

impl Simplex {
    fn vertex(&self, i: usize) -> &SimplexVertex {
        match i {
            0 => &self.v1,
            1 => &self.v2,
            _ => &self.v3,
        }
    }

    fn vertex_mut(&mut self, i: usize) -> &mut SimplexVertex {
        match i {
            0 => &mut self.v1,
            1 => &mut self.v2,
            _ => &mut self.v3,
        }
    }

    fn make_vertex(
        index_a: usize,
        index_b: usize,
        input: &DistanceInput,
    ) -> SimplexVertex {
        let w_a = input.transform_a.transform_point(input.proxy_a.points[index_a]);
        let w_b = input.transform_b.transform_point(input.proxy_b.points[index_b]);
        SimplexVertex {
            w_a,
            w_b,
            w: w_b - w_a,
            a: 0.0,
            index_a,
            index_b,
        }
    }

    fn read_cache(cache: &SimplexCache, input: &DistanceInput) -> Simplex {
        let mut simplex = Simplex::default();
        if cache.count > 0 && cache.count <= 3 {
            simplex.count = cache.count;
            for i in 0..cache.count {
                let index_a = (cache.index_a[i] as usize).min(input.proxy_a.count - 1);
                let index_b = (cache.index_b[i] as usize).min(input.proxy_b.count - 1);
                *simplex.vertex_mut(i) = Self::make_vertex(index_a, index_b, input);
            }

            // Discard the cache if the metric drifted too far.
            if simplex.count > 1 {
                let metric1 = cache.metric;
                let metric2 = simplex.metric();
                if metric2 < 0.5 * metric1 || 2.0 * metric1 < metric2 || metric2 < f32::EPSILON {
                    simplex.count = 0;
                }
            }
        }

        if simplex.count == 0 {
            simplex.v1 = Self::make_vertex(0, 0, input);
            simplex.count = 1;
        }
        simplex
    }

    fn write_cache(&self, cache: &mut SimplexCache) {
        cache.metric = self.metric();
        cache.count = self.count;
        for i in 0..self.count {
            cache.index_a[i] = self.vertex(i).index_a as u8;
            cache.index_b[i] = self.vertex(i).index_b as u8;
        }
    }

    fn metric(&self) -> f32 {
        match self.count {
            1 => 0.0,
            2 => (self.v2.w - self.v1.w).length(),
            3 => cross(self.v2.w - self.v1.w, self.v3.w - self.v1.w),
            _ => 0.0,
        }
    }

    fn search_direction(&self) -> Vec2 {
        match self.count {
            1 => -self.v1.w,
            2 => {
                let e12 = self.v2.w - self.v1.w;
                if cross(e12, -self.v1.w) > 0.0 {
                    left_perp(e12)
                } else {
                    right_perp(e12)
                }
            }
            _ => Vec2::ZERO,
        }
    }

    fn witness_points(&self) -> (Vec2, Vec2) {
        match self.count {
            1 => (self.v1.w_a, self.v1.w_b),
            2 => (
                self.v1.a * self.v1.w_a + self.v2.a * self.v2.w_a,
                self.v1.a * self.v1.w_b + self.v2.a * self.v2.w_b,
            ),
            3 => {
                let p = self.v1.a * self.v1.w_a + self.v2.a * self.v2.w_a + self.v3.a * self.v3.w_a;
                (p, p)
            }
            _ => (Vec2::ZERO, Vec2::ZERO),
        }
    }

    /// Closest subset of a segment to the origin.
    fn solve2(&mut self) {
        let w1 = self.v1.w;
        let w2 = self.v2.w;
        let e12 = w2 - w1;

        let d12_2 = -w1.dot(e12);
        if d12_2 <= 0.0 {
            self.v1.a = 1.0;
            self.count = 1;
            return;
        }

        let d12_1 = w2.dot(e12);
        if d12_1 <= 0.0 {
            self.v1 = self.v2;
            self.v1.a = 1.0;
            self.count = 1;
            return;
        }

        let inv = 1.0 / (d12_1 + d12_2);
        self.v1.a = d12_1 * inv;
        self.v2.a = d12_2 * inv;
        self.count = 2;
    }

    /// Closest subset of a triangle to the origin (Johnson's algorithm).
    fn solve3(&mut self) {
        let w1 = self.v1.w;
        let w2 = self.v2.w;
        let w3 = self.v3.w;

        let e12 = w2 - w1;
        let d12_1 = w2.dot(e12);
        let d12_2 = -w1.dot(e12);

        let e13 = w3 - w1;
        let d13_1 = w3.dot(e13);
        let d13_2 = -w1.dot(e13);

        let e23 = w3 - w2;
        let d23_1 = w3.dot(e23);
        let d23_2 = -w2.dot(e23);

        let n123 = cross(e12, e13);
        let d123_1 = n123 * cross(w2, w3);
        let d123_2 = n123 * cross(w3, w1);
        let d123_3 = n123 * cross(w1, w2);

        if d12_2 <= 0.0 && d13_2 <= 0.0 {
            self.v1.a = 1.0;
            self.count = 1;
            return;
        }

        if d12_1 > 0.0 && d12_2 > 0.0 && d123_3 <= 0.0 {
            let inv = 1.0 / (d12_1 + d12_2);
            self.v1.a = d12_1 * inv;
            self.v2.a = d12_2 * inv;
            self.count = 2;
            return;
        }

        if d13_1 > 0.0 && d13_2 > 0.0 && d123_2 <= 0.0 {
            let inv = 1.0 / (d13_1 + d13_2);
            self.v1.a = d13_1 * inv;
            self.v3.a = d13_2 * inv;
            self.v2 = self.v3;
            self.count = 2;
            return;
        }

        if d12_1 <= 0.0 && d23_2 <= 0.0 {
            self.v1 = self.v2;
            self.v1.a = 1.0;
            self.count = 1;
            return;
        }

        if d13_1 <= 0.0 && d23_1 <= 0.0 {
            self.v1 = self.v3;
            self.v1.a = 1.0;
            self.count = 1;
            return;
        }

        if d23_1 > 0.0 && d23_2 > 0.0 && d123_1 <= 0.0 {
            let inv = 1.0 / (d23_1 + d23_2);
            self.v2.a = d23_1 * inv;
            self.v3.a = d23_2 * inv;
            self.v1 = self.v3;
            self.count = 2;
            return;
        }

        let inv = 1.0 / (d123_1 + d123_2 + d123_3);
        self.v1.a = d123_1 * inv;
        self.v2.a = d123_2 * inv;
        self.v3.a = d123_3 * inv;
        self.count = 3;
    }
}

/// GJK closest-point query with simplex caching.
pub fn shape_distance(cache: &mut SimplexCache, input: &DistanceInput) -> DistanceOutput {
    let mut simplex = Simplex::read_cache(cache, input);

    let mut iterations = 0;
    let mut save_a = [0usize; 3];
    let mut save_b = [0usize; 3];

    while iterations < MAX_GJK_ITERATIONS {
        let save_count = simplex.count;
        for i in 0..save_count {
            save_a[i] = simplex.vertex(i).index_a;
            save_b[i] = simplex.vertex(i).index_b;
        }

        match simplex.count {
            2 => simplex.solve2(),
            3 => simplex.solve3(),
            _ => {}
        }

        // A full simplex contains the origin: overlap.
        if simplex.count == 3 {
            break;
        }

        let direction = simplex.search_direction();
        if direction.length_squared() < f32::EPSILON * f32::EPSILON {
            // The origin sits on a simplex feature. Leave the witness points
            // as they are; treating this as overlap would lose the normal.
            break;
        }

        let index_a = input
            .proxy_a
            .support(input.transform_a.q.apply_inverse(-direction));
        let index_b = input
            .proxy_b
            .support(input.transform_b.q.apply_inverse(direction));
        let vertex = Simplex::make_vertex(index_a, index_b, input);

        iterations += 1;

        // A repeated support vertex means convergence.
        let mut duplicate = false;
        for i in 0..save_count {
            if index_a == save_a[i] && index_b == save_b[i] {
                duplicate = true;
                break;
            }
        }
        if duplicate {
            break;
        }

        *simplex.vertex_mut(simplex.count) = vertex;
        simplex.count += 1;
    }

    simplex.write_cache(cache);

    let (mut point_a, mut point_b) = simplex.witness_points();
    let mut distance = (point_b - point_a).length();
    let mut normal = if distance > f32::EPSILON {
        (point_b - point_a) / distance
    } else {
        Vec2::ZERO
    };

    if input.use_radii {
        let ra = input.proxy_a.radius;
        let rb = input.proxy_b.radius;
        if distance > ra + rb && distance > f32::EPSILON {
            distance -= ra + rb;
            point_a += ra * normal;
            point_b -= rb * normal;
        } else {
            // Overlapping cores; report a point in the overlap.
            let mid = 0.5 * (point_a + point_b);
            point_a = mid;
            point_b = mid;
            distance = 0.0;
        }
    }

    if simplex.count == 3 {
        distance = 0.0;
        normal = Vec2::ZERO;
    }

    DistanceOutput {
        point_a,
        point_b,
        normal,
        distance,
        iterations,
    }
}

/// Input for a pairwise shape cast: `proxy_b` is translated, `proxy_a`
/// stays put.
#[derive(Debug, Clone, Copy)]
pub struct ShapeCastPairInput {
    pub proxy_a: DistanceProxy,
    pub proxy_b: DistanceProxy,
    pub transform_a: Transform,
    pub transform_b: Transform,
    pub translation_b: Vec2,
    pub max_fraction: f32,
    /// Allow an initially overlapping pair to keep advancing instead of
    /// reporting fraction zero.
    pub can_encroach: bool,
}

/// Conservative-advancement shape cast. Finds the first fraction in
/// `[0, max_fraction]` where the shapes come within a surface tolerance.
pub fn shape_cast(input: &ShapeCastPairInput) -> CastOutput {
    let mut output = CastOutput::default();

    let total_radius = input.proxy_a.radius + input.proxy_b.radius;
    let mut target = total_radius.max(LINEAR_SLOP);
    let tolerance = 0.25 * LINEAR_SLOP;

    let mut fraction = 0.0_f32;
    let mut transform_b = input.transform_b;
    let mut cache = SimplexCache::default();

    for iteration in 0..MAX_GJK_ITERATIONS {
        output.iterations = iteration + 1;

        let distance_input = DistanceInput {
            proxy_a: input.proxy_a,
            proxy_b: input.proxy_b,
            transform_a: input.transform_a,
            transform_b,
            use_radii: false,
        };
        let out = shape_distance(&mut cache, &distance_input);

        if out.distance < target + tolerance {
            if fraction == 0.0 && input.can_encroach && out.distance > LINEAR_SLOP {
                // Start inside the speculative envelope: tighten the target
                // and keep advancing to the surface actually reachable.
                target = (out.distance - LINEAR_SLOP).max(LINEAR_SLOP);
            } else {
                output.hit = true;
                output.fraction = fraction;
                output.normal = out.normal;
                output.point = out.point_a + input.proxy_a.radius * out.normal;
                return output;
            }
        }

        // Rate at which the translation closes the gap along the normal.
        let closing = -out.normal.dot(input.translation_b);
        if closing <= f32::EPSILON {
            return output;
        }

        fraction += (out.distance - target) / closing;
        if fraction >= input.max_fraction {
            return output;
        }

        transform_b.p = input.transform_b.p + fraction * input.translation_b;
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle_proxy(center: Vec2, radius: f32) -> DistanceProxy {
        DistanceProxy::new(&[center], radius)
    }

    #[test]
    fn distance_between_separated_circles() {
        let input = DistanceInput {
            proxy_a: circle_proxy(Vec2::ZERO, 0.5),
            proxy_b: circle_proxy(Vec2::ZERO, 0.5),
            transform_a: Transform::IDENTITY,
            transform_b: Transform::new(Vec2::new(3.0, 0.0), 0.0),
            use_radii: true,
        };
        let mut cache = SimplexCache::default();
        let out = shape_distance(&mut cache, &input);
        assert!((out.distance - 2.0).abs() < 1e-4);
        assert!((out.normal - Vec2::new(1.0, 0.0)).length() < 1e-4);
        assert!((out.point_a - Vec2::new(0.5, 0.0)).length() < 1e-4);
    }

    #[test]
    fn cached_query_repeats_and_converges_fast() {
        let square = crate::core::shape::Polygon::make_square(0.5);
        let proxy = DistanceProxy::new(&square.vertices[..square.count], 0.0);
        let input = DistanceInput {
            proxy_a: proxy,
            proxy_b: proxy,
            transform_a: Transform::IDENTITY,
            transform_b: Transform::new(Vec2::new(2.0, 0.3), 0.1),
            use_radii: false,
        };

        let mut cache = SimplexCache::default();
        let first = shape_distance(&mut cache, &input);
        let second = shape_distance(&mut cache, &input);

        assert_eq!(first.distance.to_bits(), second.distance.to_bits());
        assert_eq!(first.point_a, second.point_a);
        assert!(second.iterations <= 2);
    }

    #[test]
    fn overlapping_polygons_report_zero_distance() {
        let square = crate::core::shape::Polygon::make_square(0.5);
        let proxy = DistanceProxy::new(&square.vertices[..square.count], 0.0);
        let input = DistanceInput {
            proxy_a: proxy,
            proxy_b: proxy,
            transform_a: Transform::IDENTITY,
            transform_b: Transform::new(Vec2::new(0.2, 0.1), 0.0),
            use_radii: false,
        };
        let mut cache = SimplexCache::default();
        let out = shape_distance(&mut cache, &input);
        assert_eq!(out.distance, 0.0);
    }

    #[test]
    fn shape_cast_hits_approaching_circle() {
        let input = ShapeCastPairInput {
            proxy_a: circle_proxy(Vec2::ZERO, 0.5),
            proxy_b: circle_proxy(Vec2::ZERO, 0.5),
            transform_a: Transform::IDENTITY,
            transform_b: Transform::new(Vec2::new(4.0, 0.0), 0.0),
            translation_b: Vec2::new(-4.0, 0.0),
            max_fraction: 1.0,
            can_encroach: false,
        };
        let out = shape_cast(&input);
        assert!(out.hit);
        // Surfaces meet after closing 3 units of a 4 unit sweep.
        assert!((out.fraction - 0.75).abs() < 0.01);
        assert!(out.normal.x > 0.9);
    }

    #[test]
    fn shape_cast_misses_receding_target() {
        let input = ShapeCastPairInput {
            proxy_a: circle_proxy(Vec2::ZERO, 0.5),
            proxy_b: circle_proxy(Vec2::ZERO, 0.5),
            transform_a: Transform::IDENTITY,
            transform_b: Transform::new(Vec2::new(4.0, 0.0), 0.0),
            translation_b: Vec2::new(4.0, 0.0),
            max_fraction: 1.0,
            can_encroach: false,
        };
        assert!(!shape_cast(&input).hit);
    }
}

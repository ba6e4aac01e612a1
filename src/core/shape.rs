use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::{
    collision::{
        aabb::Aabb,
        distance::{shape_cast, DistanceProxy, ShapeCastPairInput},
        CastOutput, RayCastInput,
    },
    config::{self, MAX_POLYGON_VERTICES},
    core::types::{CollisionFilter, MassData, SurfaceMaterial, Transform},
    utils::{
        allocator::EntityId,
        math::{cross, left_perp},
    },
};

/// Convex hull of up to [`MAX_POLYGON_VERTICES`] points, CCW order.
#[derive(Debug, Clone, Copy)]
pub struct Hull {
    pub points: [Vec2; MAX_POLYGON_VERTICES],
    pub count: usize,
}

/// Computes the convex hull of a point cloud by gift wrapping.
///
/// Near-coincident points are welded and collinear vertices merged; returns
/// `None` when fewer than three vertices survive or the input count is
/// unsupported.
pub fn compute_hull(points: &[Vec2]) -> Option<Hull> {
    if points.len() < 3 || points.len() > MAX_POLYGON_VERTICES {
        return None;
    }

    // Weld tolerance scaled by the cloud extent.
    let aabb = points
        .iter()
        .fold(Aabb::from_points(points[0], points[0]), |acc, &p| {
            Aabb::union(acc, Aabb::from_points(p, p))
        });
    let scale = (aabb.upper - aabb.lower).max_element().max(1e-6);
    let weld_tol = 16.0 * f32::EPSILON * scale;
    let collinear_tol = 1e-5 * scale * scale;

    let mut unique: Vec<Vec2> = Vec::with_capacity(points.len());
    for &p in points {
        if unique.iter().all(|&q| (p - q).length() > weld_tol) {
            unique.push(p);
        }
    }
    if unique.len() < 3 {
        return None;
    }

    // Start from the lowest-then-leftmost point and wrap CCW.
    let start = (0..unique.len())
        .min_by(|&i, &j| {
            let (a, b) = (unique[i], unique[j]);
            (a.y, a.x).partial_cmp(&(b.y, b.x)).unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(0);

    let mut hull: Vec<Vec2> = Vec::with_capacity(unique.len());
    let mut current = start;
    loop {
        hull.push(unique[current]);
        let mut next = (current + 1) % unique.len();
        for candidate in 0..unique.len() {
            if candidate == current {
                continue;
            }
            let c = cross(
                unique[next] - unique[current],
                unique[candidate] - unique[current],
            );
            if c > collinear_tol
                || (c.abs() <= collinear_tol
                    && (unique[candidate] - unique[current]).length_squared()
                        > (unique[next] - unique[current]).length_squared())
            {
                next = candidate;
            }
        }
        current = next;
        if current == start || hull.len() > unique.len() {
            break;
        }
    }

    if hull.len() < 3 || hull.len() > MAX_POLYGON_VERTICES {
        return None;
    }

    let mut out = Hull {
        points: [Vec2::ZERO; MAX_POLYGON_VERTICES],
        count: hull.len(),
    };
    out.points[..hull.len()].copy_from_slice(&hull);
    Some(out)
}

/// Convex polygon with outward edge normals and a rounding radius.
///
/// Narrow-phase algorithms treat the shape as the Minkowski sum of the hull
/// and a disk of `radius`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Polygon {
    pub vertices: [Vec2; MAX_POLYGON_VERTICES],
    pub normals: [Vec2; MAX_POLYGON_VERTICES],
    pub centroid: Vec2,
    pub radius: f32,
    pub count: usize,
}

impl Polygon {
    pub fn from_hull(hull: &Hull, radius: f32) -> Self {
        debug_assert!(hull.count >= 3);
        let mut vertices = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        let mut normals = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        vertices[..hull.count].copy_from_slice(&hull.points[..hull.count]);

        for i in 0..hull.count {
            let j = (i + 1) % hull.count;
            let edge = vertices[j] - vertices[i];
            debug_assert!(edge.length_squared() > f32::EPSILON);
            normals[i] = -left_perp(edge).normalize_or_zero();
        }

        Self {
            vertices,
            normals,
            centroid: polygon_centroid(&vertices[..hull.count]),
            radius,
            count: hull.count,
        }
    }

    pub fn make_box(half_width: f32, half_height: f32) -> Self {
        let hull = Hull {
            points: [
                Vec2::new(-half_width, -half_height),
                Vec2::new(half_width, -half_height),
                Vec2::new(half_width, half_height),
                Vec2::new(-half_width, half_height),
                Vec2::ZERO,
                Vec2::ZERO,
                Vec2::ZERO,
                Vec2::ZERO,
            ],
            count: 4,
        };
        Self::from_hull(&hull, 0.0)
    }

    pub fn make_square(half_extent: f32) -> Self {
        Self::make_box(half_extent, half_extent)
    }

    pub fn make_rounded_box(half_width: f32, half_height: f32, radius: f32) -> Self {
        let mut polygon = Self::make_box(half_width, half_height);
        polygon.radius = radius;
        polygon
    }

    pub fn make_offset_box(half_width: f32, half_height: f32, center: Vec2, angle: f32) -> Self {
        let xf = Transform::new(center, angle);
        let mut polygon = Self::make_box(half_width, half_height);
        for i in 0..polygon.count {
            polygon.vertices[i] = xf.transform_point(polygon.vertices[i]);
            polygon.normals[i] = xf.q.apply(polygon.normals[i]);
        }
        polygon.centroid = xf.transform_point(polygon.centroid);
        polygon
    }

    /// Builds a polygon from a point cloud; `None` when no valid hull exists.
    pub fn from_points(points: &[Vec2], radius: f32) -> Option<Self> {
        compute_hull(points).map(|hull| Self::from_hull(&hull, radius))
    }
}

fn polygon_centroid(vertices: &[Vec2]) -> Vec2 {
    let origin = vertices[0];
    let mut centroid = Vec2::ZERO;
    let mut area = 0.0;
    for i in 1..vertices.len() - 1 {
        let e1 = vertices[i] - origin;
        let e2 = vertices[i + 1] - origin;
        let a = 0.5 * cross(e1, e2);
        area += a;
        centroid += (a / 3.0) * (e1 + e2);
    }
    if area > f32::EPSILON {
        centroid /= area;
    }
    origin + centroid
}

/// Shape geometry variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ShapeKind {
    Circle {
        center: Vec2,
        radius: f32,
    },
    Capsule {
        center1: Vec2,
        center2: Vec2,
        radius: f32,
    },
    Segment {
        point1: Vec2,
        point2: Vec2,
    },
    Polygon(Polygon),
    /// One edge of a chain. Ghost points are the neighboring chain vertices
    /// used to reject contacts in convex-neighbor Voronoi regions.
    ChainSegment {
        ghost1: Vec2,
        point1: Vec2,
        point2: Vec2,
        ghost2: Vec2,
        chain_id: EntityId,
    },
}

impl ShapeKind {
    /// Tight AABB of the shape under a world transform.
    pub fn compute_aabb(&self, xf: &Transform) -> Aabb {
        match self {
            ShapeKind::Circle { center, radius } => {
                let c = xf.transform_point(*center);
                Aabb::new(c - Vec2::splat(*radius), c + Vec2::splat(*radius))
            }
            ShapeKind::Capsule {
                center1,
                center2,
                radius,
            } => {
                let p1 = xf.transform_point(*center1);
                let p2 = xf.transform_point(*center2);
                Aabb::from_points(p1, p2).expand(*radius)
            }
            ShapeKind::Segment { point1, point2 } => {
                Aabb::from_points(xf.transform_point(*point1), xf.transform_point(*point2))
            }
            ShapeKind::Polygon(polygon) => {
                let mut lower = xf.transform_point(polygon.vertices[0]);
                let mut upper = lower;
                for v in &polygon.vertices[1..polygon.count] {
                    let p = xf.transform_point(*v);
                    lower = lower.min(p);
                    upper = upper.max(p);
                }
                Aabb::new(lower, upper).expand(polygon.radius)
            }
            ShapeKind::ChainSegment { point1, point2, .. } => {
                Aabb::from_points(xf.transform_point(*point1), xf.transform_point(*point2))
            }
        }
    }

    /// Mass data for the given density. Inertia is about the local origin.
    pub fn compute_mass(&self, density: f32) -> MassData {
        use std::f32::consts::PI;
        match self {
            ShapeKind::Circle { center, radius } => {
                let rr = radius * radius;
                let mass = density * PI * rr;
                MassData {
                    mass,
                    center: *center,
                    rotational_inertia: mass * (0.5 * rr + center.dot(*center)),
                }
            }
            ShapeKind::Capsule {
                center1,
                center2,
                radius,
            } => {
                let radius = *radius;
                let rr = radius * radius;
                let length = (*center2 - *center1).length();
                let ll = length * length;

                let circle_mass = density * PI * rr;
                let box_mass = density * 2.0 * radius * length;
                let mass = circle_mass + box_mass;
                let center = 0.5 * (*center1 + *center2);

                // Two semicircles offset to the capsule ends; the semicircle
                // centroid sits 4r/3pi from the flat edge.
                let lc = 4.0 * radius / (3.0 * PI);
                let h = 0.5 * length;
                let circle_inertia = circle_mass * (0.5 * rr + h * h + 2.0 * h * lc);
                let box_inertia = box_mass * (4.0 * rr + ll) / 12.0;

                MassData {
                    mass,
                    center,
                    rotational_inertia: circle_inertia + box_inertia + mass * center.dot(center),
                }
            }
            ShapeKind::Polygon(polygon) => compute_polygon_mass(polygon, density),
            // Segments are one-dimensional and massless.
            ShapeKind::Segment { .. } | ShapeKind::ChainSegment { .. } => MassData::default(),
        }
    }

    /// Exact ray cast against the shape under a world transform.
    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> CastOutput {
        match self {
            ShapeKind::Circle { center, radius } => {
                ray_cast_circle(input, xf.transform_point(*center), *radius)
            }
            ShapeKind::Segment { point1, point2 }
            | ShapeKind::ChainSegment { point1, point2, .. } => ray_cast_segment(
                input,
                xf.transform_point(*point1),
                xf.transform_point(*point2),
            ),
            ShapeKind::Capsule { .. } => cast_ray_via_proxy(input, self, xf),
            ShapeKind::Polygon(polygon) => {
                if polygon.radius == 0.0 {
                    ray_cast_polygon(input, polygon, xf)
                } else {
                    cast_ray_via_proxy(input, self, xf)
                }
            }
        }
    }
}

fn compute_polygon_mass(polygon: &Polygon, density: f32) -> MassData {
    debug_assert!(polygon.count >= 3);
    let origin = polygon.vertices[0];
    let mut center = Vec2::ZERO;
    let mut area = 0.0;
    let mut inertia = 0.0;

    for i in 1..polygon.count - 1 {
        let e1 = polygon.vertices[i] - origin;
        let e2 = polygon.vertices[i + 1] - origin;
        let d = cross(e1, e2);
        let triangle_area = 0.5 * d;
        area += triangle_area;
        center += (triangle_area / 3.0) * (e1 + e2);

        let int_x2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
        let int_y2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
        inertia += (0.25 / 3.0) * d * (int_x2 + int_y2);
    }

    let mass = density * area;
    if area > f32::EPSILON {
        center /= area;
    }
    let world_center = origin + center;
    // Shift inertia from the integration origin to the local origin.
    let rotational_inertia =
        density * inertia + mass * (world_center.dot(world_center) - center.dot(center));

    MassData {
        mass,
        center: world_center,
        rotational_inertia,
    }
}

fn ray_cast_circle(input: &RayCastInput, center: Vec2, radius: f32) -> CastOutput {
    let mut output = CastOutput::default();
    let s = input.origin - center;
    let b = s.dot(s) - radius * radius;

    let d = input.translation;
    let c = s.dot(d);
    let rr = d.dot(d);
    let sigma = c * c - rr * b;
    if sigma < 0.0 || rr < f32::EPSILON {
        return output;
    }

    let fraction = -(c + sigma.sqrt()) / rr;
    if (0.0..=input.max_fraction).contains(&fraction) {
        let point = input.origin + fraction * d;
        output.hit = true;
        output.fraction = fraction;
        output.point = point;
        output.normal = (point - center).normalize_or_zero();
    }
    output
}

fn ray_cast_segment(input: &RayCastInput, p1: Vec2, p2: Vec2) -> CastOutput {
    let mut output = CastOutput::default();
    let edge = p2 - p1;
    let edge_length_sq = edge.length_squared();
    if edge_length_sq < f32::EPSILON {
        return output;
    }

    let normal = left_perp(edge).normalize_or_zero();
    let denom = input.translation.dot(normal);
    if denom.abs() < f32::EPSILON {
        return output;
    }

    let fraction = (p1 - input.origin).dot(normal) / denom;
    if fraction < 0.0 || fraction > input.max_fraction {
        return output;
    }

    let point = input.origin + fraction * input.translation;
    let along = (point - p1).dot(edge) / edge_length_sq;
    if !(0.0..=1.0).contains(&along) {
        return output;
    }

    output.hit = true;
    output.fraction = fraction;
    output.point = point;
    output.normal = if denom > 0.0 { -normal } else { normal };
    output
}

fn ray_cast_polygon(input: &RayCastInput, polygon: &Polygon, xf: &Transform) -> CastOutput {
    let mut output = CastOutput::default();

    // Work in polygon-local space.
    let p = xf.inv_transform_point(input.origin);
    let d = xf.q.apply_inverse(input.translation);

    let mut lower = 0.0_f32;
    let mut upper = input.max_fraction;
    let mut index = None;

    for i in 0..polygon.count {
        let numerator = polygon.normals[i].dot(polygon.vertices[i] - p);
        let denominator = polygon.normals[i].dot(d);

        if denominator == 0.0 {
            if numerator < 0.0 {
                return output;
            }
        } else if denominator < 0.0 && numerator < lower * denominator {
            lower = numerator / denominator;
            index = Some(i);
        } else if denominator > 0.0 && numerator < upper * denominator {
            upper = numerator / denominator;
        }

        if upper < lower {
            return output;
        }
    }

    if let Some(i) = index {
        output.hit = true;
        output.fraction = lower;
        output.point = input.origin + lower * input.translation;
        output.normal = xf.q.apply(polygon.normals[i]);
    }
    output
}

/// Casts a point along the ray against the shape's distance proxy. Covers
/// the rounded shapes without dedicated analytic code.
fn cast_ray_via_proxy(input: &RayCastInput, kind: &ShapeKind, xf: &Transform) -> CastOutput {
    let cast = ShapeCastPairInput {
        proxy_a: DistanceProxy::from_shape(kind),
        proxy_b: DistanceProxy::new(&[Vec2::ZERO], 0.0),
        transform_a: *xf,
        transform_b: Transform {
            p: input.origin,
            q: crate::utils::math::Rot::IDENTITY,
        },
        translation_b: input.translation,
        max_fraction: input.max_fraction,
        can_encroach: false,
    };
    // The cast normal runs shape-to-point, which is the outward surface
    // normal facing the caster.
    shape_cast(&cast)
}

/// Definition used to create shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeDef {
    pub material: SurfaceMaterial,
    pub density: f32,
    pub filter: CollisionFilter,
    pub is_sensor: bool,
    pub enable_contact_events: bool,
    pub enable_hit_events: bool,
    pub enable_sensor_events: bool,
    /// Recompute the owning body's mass from attached shapes on creation.
    pub update_body_mass: bool,
}

impl Default for ShapeDef {
    fn default() -> Self {
        Self {
            material: SurfaceMaterial::default(),
            density: config::DEFAULT_DENSITY,
            filter: CollisionFilter::default(),
            is_sensor: false,
            enable_contact_events: true,
            enable_hit_events: false,
            enable_sensor_events: true,
            update_body_mass: true,
        }
    }
}

/// Internal shape record owned by one body.
#[derive(Debug, Clone)]
pub struct Shape {
    pub id: EntityId,
    pub body_id: EntityId,
    pub kind: ShapeKind,
    pub material: SurfaceMaterial,
    pub density: f32,
    pub filter: CollisionFilter,
    pub is_sensor: bool,
    pub enable_contact_events: bool,
    pub enable_hit_events: bool,
    pub enable_sensor_events: bool,
    /// Broad-phase leaf, or `usize::MAX` when not in the tree.
    pub proxy_id: usize,
    pub aabb: Aabb,
    pub fat_aabb: Aabb,
}

impl Shape {
    pub fn new(id: EntityId, body_id: EntityId, kind: ShapeKind, def: &ShapeDef) -> Self {
        Self {
            id,
            body_id,
            kind,
            material: def.material,
            density: def.density,
            filter: def.filter,
            is_sensor: def.is_sensor,
            enable_contact_events: def.enable_contact_events,
            enable_hit_events: def.enable_hit_events,
            enable_sensor_events: def.enable_sensor_events,
            proxy_id: usize::MAX,
            aabb: Aabb::default(),
            fat_aabb: Aabb::default(),
        }
    }
}

/// Definition of a chain of connected segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainDef {
    pub points: Vec<Vec2>,
    /// Closed loops wrap ghost vertices around the ends.
    pub is_loop: bool,
    pub material: SurfaceMaterial,
    pub filter: CollisionFilter,
}

impl Default for ChainDef {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            is_loop: false,
            material: SurfaceMaterial::default(),
            filter: CollisionFilter::default(),
        }
    }
}

/// Internal chain record owning its chain-segment shapes.
#[derive(Debug, Clone)]
pub struct Chain {
    pub id: EntityId,
    pub body_id: EntityId,
    pub shape_ids: Vec<EntityId>,
    pub is_loop: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_polygon_has_ccw_winding_and_outward_normals() {
        let polygon = Polygon::make_box(1.0, 0.5);
        assert_eq!(polygon.count, 4);
        assert!((polygon.centroid).length() < 1e-6);
        for i in 0..4 {
            let j = (i + 1) % 4;
            let mid = 0.5 * (polygon.vertices[i] + polygon.vertices[j]);
            // Outward normal points away from the centroid.
            assert!(polygon.normals[i].dot(mid) > 0.0);
        }
    }

    #[test]
    fn hull_drops_interior_and_collinear_points() {
        let points = [
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(1.0, 0.0), // collinear
            Vec2::new(2.0, 2.0),
            Vec2::new(1.0, 1.0), // interior
            Vec2::new(0.0, 2.0),
        ];
        let hull = compute_hull(&points).unwrap();
        assert_eq!(hull.count, 4);
    }

    #[test]
    fn circle_mass_matches_disc_formula() {
        let kind = ShapeKind::Circle {
            center: Vec2::new(1.0, 0.0),
            radius: 2.0,
        };
        let mass_data = kind.compute_mass(3.0);
        let expected_mass = 3.0 * std::f32::consts::PI * 4.0;
        assert!((mass_data.mass - expected_mass).abs() < 1e-3);
        assert!((mass_data.center - Vec2::new(1.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn box_mass_matches_rectangle_formula() {
        let polygon = Polygon::make_box(0.5, 0.5);
        let mass_data = ShapeKind::Polygon(polygon).compute_mass(1.0);
        assert!((mass_data.mass - 1.0).abs() < 1e-4);
        // 1x1 unit box: I = m (w^2 + h^2) / 12
        assert!((mass_data.rotational_inertia - 1.0 / 6.0).abs() < 1e-4);
    }

    #[test]
    fn ray_hits_circle_front_face() {
        let kind = ShapeKind::Circle {
            center: Vec2::ZERO,
            radius: 0.5,
        };
        let input = RayCastInput {
            origin: Vec2::new(-2.0, 0.0),
            translation: Vec2::new(4.0, 0.0),
            max_fraction: 1.0,
        };
        let out = kind.ray_cast(&input, &Transform::IDENTITY);
        assert!(out.hit);
        assert!((out.fraction - 0.375).abs() < 1e-4);
        assert!((out.normal - Vec2::new(-1.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn ray_misses_segment_beyond_endpoints() {
        let kind = ShapeKind::Segment {
            point1: Vec2::new(0.0, -1.0),
            point2: Vec2::new(0.0, 1.0),
        };
        let miss = RayCastInput {
            origin: Vec2::new(-1.0, 2.0),
            translation: Vec2::new(2.0, 0.0),
            max_fraction: 1.0,
        };
        assert!(!kind.ray_cast(&miss, &Transform::IDENTITY).hit);

        let hit = RayCastInput {
            origin: Vec2::new(-1.0, 0.0),
            translation: Vec2::new(2.0, 0.0),
            max_fraction: 1.0,
        };
        let out = kind.ray_cast(&hit, &Transform::IDENTITY);
        assert!(out.hit && (out.fraction - 0.5).abs() < 1e-5);
    }
}

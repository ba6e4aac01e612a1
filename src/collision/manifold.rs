//! Contact manifold generation for every shape pair.
//!
//! All generators follow the same conventions: the manifold normal is a
//! world-space unit vector pointing from shape A to shape B, points carry a
//! separation (negative when penetrating) and a feature id that stays
//! stable across steps so impulses can warm start.

use glam::Vec2;

use crate::{
    config::{LINEAR_SLOP, MAX_POLYGON_VERTICES, SPECULATIVE_DISTANCE},
    core::{
        shape::{Polygon, ShapeKind},
        types::Transform,
    },
    utils::math::{cross, left_perp, right_perp},
};

/// One persistent contact point.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifoldPoint {
    /// World contact point, midway between the surfaces.
    pub point: Vec2,
    /// Offset from body A's center of mass, captured at solve prepare.
    pub anchor_a: Vec2,
    pub anchor_b: Vec2,
    /// Signed surface gap along the normal; negative when penetrating.
    pub separation: f32,
    pub normal_impulse: f32,
    pub tangent_impulse: f32,
    /// Largest normal impulse applied this step, used by hit events.
    pub max_normal_impulse: f32,
    /// Approach speed captured before the solve, used by restitution.
    pub normal_velocity: f32,
    pub id: u16,
    /// Whether the impulse was warm started from the previous step.
    pub persisted: bool,
}

/// Contact manifold: a shared normal and up to two points.
#[derive(Debug, Clone, Copy, Default)]
pub struct Manifold {
    pub normal: Vec2,
    pub points: [ManifoldPoint; 2],
    pub point_count: usize,
}

pub fn make_feature_id(a: usize, b: usize) -> u16 {
    ((a as u16) << 8) | (b as u16 & 0xff)
}

fn swap_feature_id(id: u16) -> u16 {
    (id << 8) | (id >> 8)
}

/// Flips a manifold produced with the shapes swapped.
fn flip_manifold(mut manifold: Manifold) -> Manifold {
    manifold.normal = -manifold.normal;
    for point in manifold.points.iter_mut().take(manifold.point_count) {
        point.id = swap_feature_id(point.id);
    }
    manifold
}

/// Dispatches to the pair-specific generator, flipping when needed so the
/// reported normal always runs A to B.
pub fn collide(kind_a: &ShapeKind, xf_a: &Transform, kind_b: &ShapeKind, xf_b: &Transform) -> Manifold {
    use ShapeKind::*;
    match (kind_a, kind_b) {
        (Circle { .. }, Circle { .. }) => collide_circles(kind_a, xf_a, kind_b, xf_b),

        (Capsule { .. }, Circle { .. }) => collide_capsule_and_circle(kind_a, xf_a, kind_b, xf_b),
        (Circle { .. }, Capsule { .. }) => {
            flip_manifold(collide_capsule_and_circle(kind_b, xf_b, kind_a, xf_a))
        }

        (Polygon(polygon), Circle { .. }) => collide_polygon_and_circle(polygon, xf_a, kind_b, xf_b),
        (Circle { .. }, Polygon(polygon)) => {
            flip_manifold(collide_polygon_and_circle(polygon, xf_b, kind_a, xf_a))
        }

        (Segment { point1, point2 }, Circle { .. }) => {
            let segment = capsule_polygon(*point1, *point2, 0.0);
            collide_polygon_and_circle(&segment, xf_a, kind_b, xf_b)
        }
        (Circle { .. }, Segment { point1, point2 }) => {
            let segment = capsule_polygon(*point1, *point2, 0.0);
            flip_manifold(collide_polygon_and_circle(&segment, xf_b, kind_a, xf_a))
        }

        (Capsule { .. }, Capsule { .. })
        | (Polygon(_), Capsule { .. })
        | (Capsule { .. }, Polygon(_))
        | (Polygon(_), Polygon(_))
        | (Segment { .. }, Capsule { .. })
        | (Capsule { .. }, Segment { .. })
        | (Segment { .. }, Polygon(_))
        | (Polygon(_), Segment { .. }) => {
            let poly_a = as_polygon(kind_a);
            let poly_b = as_polygon(kind_b);
            collide_polygons(&poly_a, xf_a, &poly_b, xf_b)
        }

        (ChainSegment { .. }, Circle { .. }) => {
            collide_chain_segment_and_circle(kind_a, xf_a, kind_b, xf_b)
        }
        (Circle { .. }, ChainSegment { .. }) => {
            flip_manifold(collide_chain_segment_and_circle(kind_b, xf_b, kind_a, xf_a))
        }

        (ChainSegment { .. }, Capsule { .. }) | (ChainSegment { .. }, Polygon(_)) => {
            collide_chain_segment_and_convex(kind_a, xf_a, &as_polygon(kind_b), xf_b)
        }
        (Capsule { .. }, ChainSegment { .. }) | (Polygon(_), ChainSegment { .. }) => {
            flip_manifold(collide_chain_segment_and_convex(kind_b, xf_b, &as_polygon(kind_a), xf_a))
        }

        // Zero-thickness pairs never generate contacts.
        (Segment { .. } | ChainSegment { .. }, Segment { .. } | ChainSegment { .. }) => {
            Manifold::default()
        }
    }
}

/// Two-vertex polygon standing in for capsules and segments.
fn capsule_polygon(p1: Vec2, p2: Vec2, radius: f32) -> Polygon {
    let axis = (p2 - p1).normalize_or_zero();
    let normal = right_perp(axis);
    let mut polygon = Polygon {
        vertices: [Vec2::ZERO; MAX_POLYGON_VERTICES],
        normals: [Vec2::ZERO; MAX_POLYGON_VERTICES],
        centroid: 0.5 * (p1 + p2),
        radius,
        count: 2,
    };
    polygon.vertices[0] = p1;
    polygon.vertices[1] = p2;
    polygon.normals[0] = normal;
    polygon.normals[1] = -normal;
    polygon
}

fn as_polygon(kind: &ShapeKind) -> Polygon {
    match kind {
        ShapeKind::Polygon(polygon) => *polygon,
        ShapeKind::Capsule {
            center1,
            center2,
            radius,
        } => capsule_polygon(*center1, *center2, *radius),
        ShapeKind::Segment { point1, point2 }
        | ShapeKind::ChainSegment { point1, point2, .. } => capsule_polygon(*point1, *point2, 0.0),
        ShapeKind::Circle { center, radius } => {
            // Degenerate; circles never reach the polygon path.
            capsule_polygon(*center, *center, *radius)
        }
    }
}

fn circle_parts(kind: &ShapeKind) -> (Vec2, f32) {
    match kind {
        ShapeKind::Circle { center, radius } => (*center, *radius),
        _ => (Vec2::ZERO, 0.0),
    }
}

fn collide_circles(a: &ShapeKind, xf_a: &Transform, b: &ShapeKind, xf_b: &Transform) -> Manifold {
    let (center_a, radius_a) = circle_parts(a);
    let (center_b, radius_b) = circle_parts(b);

    // Work in A's frame.
    let xf = xf_a.inv_mul(*xf_b);
    let p_a = center_a;
    let p_b = xf.transform_point(center_b);

    let d = p_b - p_a;
    let distance = d.length();
    let normal = if distance > f32::EPSILON {
        d / distance
    } else {
        Vec2::new(0.0, 1.0)
    };

    let separation = distance - radius_a - radius_b;
    if separation > SPECULATIVE_DISTANCE {
        return Manifold::default();
    }

    let c_a = p_a + radius_a * normal;
    let c_b = p_b - radius_b * normal;

    let mut manifold = Manifold {
        normal: xf_a.q.apply(normal),
        ..Default::default()
    };
    manifold.points[0] = ManifoldPoint {
        point: xf_a.transform_point(0.5 * (c_a + c_b)),
        separation,
        id: 0,
        ..Default::default()
    };
    manifold.point_count = 1;
    manifold
}

fn collide_capsule_and_circle(
    capsule: &ShapeKind,
    xf_a: &Transform,
    circle: &ShapeKind,
    xf_b: &Transform,
) -> Manifold {
    let ShapeKind::Capsule {
        center1,
        center2,
        radius,
    } = capsule
    else {
        return Manifold::default();
    };
    let (circle_center, circle_radius) = circle_parts(circle);

    // Circle center in the capsule frame, clamped onto the capsule axis.
    let xf = xf_a.inv_mul(*xf_b);
    let p = xf.transform_point(circle_center);

    let edge = *center2 - *center1;
    let t = ((p - *center1).dot(edge) / edge.length_squared().max(f32::EPSILON)).clamp(0.0, 1.0);
    let closest = *center1 + t * edge;

    let d = p - closest;
    let distance = d.length();
    let normal = if distance > f32::EPSILON {
        d / distance
    } else {
        right_perp(edge.normalize_or_zero())
    };

    let separation = distance - radius - circle_radius;
    if separation > SPECULATIVE_DISTANCE {
        return Manifold::default();
    }

    let c_a = closest + *radius * normal;
    let c_b = p - circle_radius * normal;

    let mut manifold = Manifold {
        normal: xf_a.q.apply(normal),
        ..Default::default()
    };
    manifold.points[0] = ManifoldPoint {
        point: xf_a.transform_point(0.5 * (c_a + c_b)),
        separation,
        id: 0,
        ..Default::default()
    };
    manifold.point_count = 1;
    manifold
}

fn collide_polygon_and_circle(
    polygon: &Polygon,
    xf_a: &Transform,
    circle: &ShapeKind,
    xf_b: &Transform,
) -> Manifold {
    let (circle_center, circle_radius) = circle_parts(circle);
    let radius = polygon.radius + circle_radius;

    let xf = xf_a.inv_mul(*xf_b);
    let c = xf.transform_point(circle_center);

    // Edge of maximum separation.
    let mut separation = -f32::MAX;
    let mut edge = 0;
    for i in 0..polygon.count {
        let s = polygon.normals[i].dot(c - polygon.vertices[i]);
        if s > separation {
            separation = s;
            edge = i;
        }
    }

    if separation > radius + SPECULATIVE_DISTANCE {
        return Manifold::default();
    }

    let v1 = polygon.vertices[edge];
    let v2 = polygon.vertices[(edge + 1) % polygon.count];

    let (closest, normal) = if separation < f32::EPSILON {
        // Center inside: push out along the face normal.
        let n = polygon.normals[edge];
        (c - separation * n, n)
    } else if (c - v1).dot(v2 - v1) <= 0.0 {
        (v1, (c - v1).normalize_or_zero())
    } else if (c - v2).dot(v1 - v2) <= 0.0 {
        (v2, (c - v2).normalize_or_zero())
    } else {
        let n = polygon.normals[edge];
        (c - polygon.normals[edge].dot(c - v1) * n, n)
    };

    let gap = (c - closest).dot(normal) - radius;
    let c_a = closest + polygon.radius * normal;
    let c_b = c - circle_radius * normal;

    let mut manifold = Manifold {
        normal: xf_a.q.apply(normal),
        ..Default::default()
    };
    manifold.points[0] = ManifoldPoint {
        point: xf_a.transform_point(0.5 * (c_a + c_b)),
        separation: gap,
        id: make_feature_id(edge, 0),
        ..Default::default()
    };
    manifold.point_count = 1;
    manifold
}

/// Largest separation of `p2` from `p1`'s faces, with the face index.
fn find_max_separation(p1: &Polygon, p2: &Polygon) -> (f32, usize) {
    let mut best = 0;
    let mut best_separation = -f32::MAX;
    for i in 0..p1.count {
        let n = p1.normals[i];
        let v = p1.vertices[i];
        let mut si = f32::MAX;
        for j in 0..p2.count {
            si = si.min(n.dot(p2.vertices[j] - v));
        }
        if si > best_separation {
            best_separation = si;
            best = i;
        }
    }
    (best_separation, best)
}

/// Incident edge: the face of `incident` most anti-parallel to the
/// reference normal.
fn find_incident_edge(incident: &Polygon, reference_normal: Vec2) -> usize {
    let mut best = 0;
    let mut best_dot = f32::MAX;
    for i in 0..incident.count {
        let d = incident.normals[i].dot(reference_normal);
        if d < best_dot {
            best_dot = d;
            best = i;
        }
    }
    best
}

/// Clips the incident edge against the reference face's side planes. Both
/// polygons must be in the same frame; the manifold comes back in that
/// frame.
fn clip_polygons(
    reference: &Polygon,
    incident: &Polygon,
    edge1: usize,
    edge2: usize,
    flip: bool,
) -> Manifold {
    let i11 = edge1;
    let i12 = (edge1 + 1) % reference.count;
    let i21 = edge2;
    let i22 = (edge2 + 1) % incident.count;

    let normal = reference.normals[i11];
    let v11 = reference.vertices[i11];
    let v12 = reference.vertices[i12];
    let v21 = incident.vertices[i21];
    let v22 = incident.vertices[i22];

    let tangent = left_perp(normal);

    let lower1 = 0.0;
    let upper1 = (v12 - v11).dot(tangent);

    // The incident edge runs the opposite direction.
    let upper2 = (v21 - v11).dot(tangent);
    let lower2 = (v22 - v11).dot(tangent);
    let d = upper2 - lower2;

    let v_lower = if lower2 < lower1 && d > f32::EPSILON {
        v22.lerp(v21, (lower1 - lower2) / d)
    } else {
        v22
    };
    let v_upper = if upper2 > upper1 && d > f32::EPSILON {
        v22.lerp(v21, (upper1 - lower2) / d)
    } else {
        v21
    };

    let separation_lower = (v_lower - v11).dot(normal);
    let separation_upper = (v_upper - v11).dot(normal);

    let radius_a = reference.radius;
    let radius_b = incident.radius;
    let radius = radius_a + radius_b;

    // Contact points midway between the rounded surfaces.
    let v_lower = v_lower + 0.5 * (radius_a - radius_b) * normal;
    let v_upper = v_upper + 0.5 * (radius_a - radius_b) * normal;

    let mut manifold = Manifold::default();
    let (normal_out, id_lower, id_upper) = if flip {
        (
            -normal,
            make_feature_id(i22, i11),
            make_feature_id(i21, i12),
        )
    } else {
        (
            normal,
            make_feature_id(i11, i22),
            make_feature_id(i12, i21),
        )
    };
    manifold.normal = normal_out;

    for (point, separation, id) in [
        (v_lower, separation_lower - radius, id_lower),
        (v_upper, separation_upper - radius, id_upper),
    ] {
        if separation <= SPECULATIVE_DISTANCE {
            manifold.points[manifold.point_count] = ManifoldPoint {
                point,
                separation,
                id,
                ..Default::default()
            };
            manifold.point_count += 1;
        }
    }
    manifold
}

/// SAT + clipping for polygon-like pairs (polygons, capsules, segments).
pub fn collide_polygons(a: &Polygon, xf_a: &Transform, b: &Polygon, xf_b: &Transform) -> Manifold {
    // Work entirely in A's frame.
    let xf = xf_a.inv_mul(*xf_b);
    let mut local_b = *b;
    for i in 0..b.count {
        local_b.vertices[i] = xf.transform_point(b.vertices[i]);
        local_b.normals[i] = xf.q.apply(b.normals[i]);
    }
    local_b.centroid = xf.transform_point(b.centroid);

    let radius = a.radius + b.radius;

    let (separation_a, edge_a) = find_max_separation(a, &local_b);
    let (separation_b, edge_b) = find_max_separation(&local_b, a);

    if separation_a > SPECULATIVE_DISTANCE + radius || separation_b > SPECULATIVE_DISTANCE + radius {
        return Manifold::default();
    }

    // The reference face bias keeps feature ids stable between steps.
    let mut manifold = if separation_b > separation_a + 0.1 * LINEAR_SLOP {
        let incident = find_incident_edge(a, local_b.normals[edge_b]);
        clip_polygons(&local_b, a, edge_b, incident, true)
    } else {
        let incident = find_incident_edge(&local_b, a.normals[edge_a]);
        clip_polygons(a, &local_b, edge_a, incident, false)
    };

    if manifold.point_count > 0 {
        manifold.normal = xf_a.q.apply(manifold.normal);
        for point in manifold.points.iter_mut().take(manifold.point_count) {
            point.point = xf_a.transform_point(point.point);
        }
    }
    manifold
}

fn chain_parts(kind: &ShapeKind) -> (Vec2, Vec2, Vec2, Vec2) {
    match kind {
        ShapeKind::ChainSegment {
            ghost1,
            point1,
            point2,
            ghost2,
            ..
        } => (*ghost1, *point1, *point2, *ghost2),
        _ => (Vec2::ZERO, Vec2::ZERO, Vec2::ZERO, Vec2::ZERO),
    }
}

fn collide_chain_segment_and_circle(
    chain: &ShapeKind,
    xf_a: &Transform,
    circle: &ShapeKind,
    xf_b: &Transform,
) -> Manifold {
    let (ghost1, p1, p2, ghost2) = chain_parts(chain);
    let (circle_center, circle_radius) = circle_parts(circle);

    let xf = xf_a.inv_mul(*xf_b);
    let c = xf.transform_point(circle_center);

    let edge = p2 - p1;
    let front_normal = left_perp(edge.normalize_or_zero());

    // One-sided: a center behind the front plane never collides.
    if front_normal.dot(c - p1) < 0.0 {
        return Manifold::default();
    }

    let u = edge.dot(p2 - c);
    let v = edge.dot(c - p1);

    let pivot;
    let feature;
    if v <= 0.0 {
        // First-vertex Voronoi region. The previous edge owns it, up to
        // and including the shared vertex, so only one segment ever
        // claims a contact there. A degenerate ghost marks an open end.
        let prev_edge = p1 - ghost1;
        if prev_edge.length_squared() > f32::EPSILON && prev_edge.dot(c - p1) <= 0.0 {
            return Manifold::default();
        }
        pivot = p1;
        feature = make_feature_id(0, 0);
    } else if u <= 0.0 {
        let next_edge = ghost2 - p2;
        if next_edge.dot(c - p2) > 0.0 {
            return Manifold::default();
        }
        pivot = p2;
        feature = make_feature_id(1, 0);
    } else {
        pivot = p1 + (v / edge.length_squared().max(f32::EPSILON)) * edge;
        feature = make_feature_id(0, 1);
    }

    let d = c - pivot;
    let distance = d.length();
    let normal = if distance > f32::EPSILON {
        d / distance
    } else {
        front_normal
    };

    let separation = distance - circle_radius;
    if separation > SPECULATIVE_DISTANCE {
        return Manifold::default();
    }

    let c_b = c - circle_radius * normal;

    let mut manifold = Manifold {
        normal: xf_a.q.apply(normal),
        ..Default::default()
    };
    manifold.points[0] = ManifoldPoint {
        point: xf_a.transform_point(0.5 * (pivot + c_b)),
        separation,
        id: feature,
        ..Default::default()
    };
    manifold.point_count = 1;
    manifold
}

/// Chain segment against a convex shape (capsule or polygon as a 2-gon /
/// hull). Ghost vertices restrict the admissible normal arc so collinear
/// neighbor edges cannot produce vertex contacts on interior chain
/// vertices.
fn collide_chain_segment_and_convex(
    chain: &ShapeKind,
    xf_a: &Transform,
    convex: &Polygon,
    xf_b: &Transform,
) -> Manifold {
    let (ghost1, p1, p2, ghost2) = chain_parts(chain);
    let segment = capsule_polygon(p1, p2, 0.0);

    let xf = xf_a.inv_mul(*xf_b);
    let mut local_b = *convex;
    for i in 0..convex.count {
        local_b.vertices[i] = xf.transform_point(convex.vertices[i]);
        local_b.normals[i] = xf.q.apply(convex.normals[i]);
    }
    local_b.centroid = xf.transform_point(convex.centroid);

    let edge = (p2 - p1).normalize_or_zero();
    let front_normal = left_perp(edge);

    // One-sided: reject approaches from behind the segment.
    let behind = (0..local_b.count)
        .all(|i| front_normal.dot(local_b.vertices[i] - p1) < -local_b.radius);
    if behind {
        return Manifold::default();
    }

    let (separation_a, edge_a) = find_max_separation(&segment, &local_b);
    let (separation_b, edge_b) = find_max_separation(&local_b, &segment);
    let radius = local_b.radius;
    if separation_a > SPECULATIVE_DISTANCE + radius || separation_b > SPECULATIVE_DISTANCE + radius {
        return Manifold::default();
    }

    let mut manifold = if separation_b > separation_a + 0.1 * LINEAR_SLOP {
        let incident = find_incident_edge(&segment, local_b.normals[edge_b]);
        clip_polygons(&local_b, &segment, edge_b, incident, true)
    } else {
        let incident = find_incident_edge(&local_b, segment.normals[edge_a]);
        clip_polygons(&segment, &local_b, edge_a, incident, false)
    };

    if manifold.point_count == 0 {
        return manifold;
    }

    // Admissible normal arc from the ghost vertices. A convex neighbor
    // widens the arc up to its own face normal; a collinear or reflex
    // neighbor collapses that side to the face normal alone.
    let lower = if cross(p1 - ghost1, p2 - p1) > 1e-6 {
        left_perp((p1 - ghost1).normalize_or_zero())
    } else {
        front_normal
    };
    let upper = if cross(p2 - p1, ghost2 - p2) > 1e-6 {
        left_perp((ghost2 - p2).normalize_or_zero())
    } else {
        front_normal
    };

    let n = manifold.normal;
    let inside_arc = cross(lower, n) >= -1e-6 && cross(n, upper) >= -1e-6;
    if !inside_arc {
        // Ghost rejection: fall back to a face contact on the segment.
        let incident = find_incident_edge(&local_b, segment.normals[0]);
        manifold = clip_polygons(&segment, &local_b, 0, incident, false);
        if manifold.point_count == 0 {
            return manifold;
        }
    }

    manifold.normal = xf_a.q.apply(manifold.normal);
    for point in manifold.points.iter_mut().take(manifold.point_count) {
        point.point = xf_a.transform_point(point.point);
    }
    manifold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::allocator::EntityId;

    #[test]
    fn touching_circles_produce_one_point() {
        let a = ShapeKind::Circle {
            center: Vec2::ZERO,
            radius: 0.5,
        };
        let b = ShapeKind::Circle {
            center: Vec2::ZERO,
            radius: 0.5,
        };
        let manifold = collide(
            &a,
            &Transform::IDENTITY,
            &b,
            &Transform::new(Vec2::new(0.9, 0.0), 0.0),
        );
        assert_eq!(manifold.point_count, 1);
        assert!((manifold.normal - Vec2::new(1.0, 0.0)).length() < 1e-5);
        assert!((manifold.points[0].separation + 0.1).abs() < 1e-5);
    }

    #[test]
    fn separated_circles_produce_nothing() {
        let a = ShapeKind::Circle {
            center: Vec2::ZERO,
            radius: 0.5,
        };
        let manifold = collide(
            &a,
            &Transform::IDENTITY,
            &a,
            &Transform::new(Vec2::new(3.0, 0.0), 0.0),
        );
        assert_eq!(manifold.point_count, 0);
    }

    #[test]
    fn resting_box_on_box_has_two_points() {
        let a = ShapeKind::Polygon(Polygon::make_square(0.5));
        let b = ShapeKind::Polygon(Polygon::make_square(0.5));
        let manifold = collide(
            &a,
            &Transform::IDENTITY,
            &b,
            &Transform::new(Vec2::new(0.0, 0.99), 0.0),
        );
        assert_eq!(manifold.point_count, 2);
        assert!(manifold.normal.y > 0.99);
        for point in &manifold.points[..2] {
            assert!(point.separation < 0.0);
        }
    }

    #[test]
    fn box_on_box_feature_ids_are_stable_under_small_slides(){
        let a = ShapeKind::Polygon(Polygon::make_square(0.5));
        let b = ShapeKind::Polygon(Polygon::make_square(0.5));
        let m1 = collide(
            &a,
            &Transform::IDENTITY,
            &b,
            &Transform::new(Vec2::new(0.0, 0.99), 0.0),
        );
        let m2 = collide(
            &a,
            &Transform::IDENTITY,
            &b,
            &Transform::new(Vec2::new(0.01, 0.99), 0.0),
        );
        assert_eq!(m1.points[0].id, m2.points[0].id);
        assert_eq!(m1.points[1].id, m2.points[1].id);
    }

    #[test]
    fn flipped_pair_negates_normal() {
        let circle = ShapeKind::Circle {
            center: Vec2::ZERO,
            radius: 0.5,
        };
        let polygon = ShapeKind::Polygon(Polygon::make_square(0.5));
        let xf_circle = Transform::new(Vec2::new(0.0, 0.9), 0.0);

        let pc = collide(&polygon, &Transform::IDENTITY, &circle, &xf_circle);
        let cp = collide(&circle, &xf_circle, &polygon, &Transform::IDENTITY);
        assert_eq!(pc.point_count, 1);
        assert_eq!(cp.point_count, 1);
        assert!((pc.normal + cp.normal).length() < 1e-6);
    }

    #[test]
    fn capsule_lying_on_ground_polygon_gets_two_points() {
        let capsule = ShapeKind::Capsule {
            center1: Vec2::new(-0.5, 0.0),
            center2: Vec2::new(0.5, 0.0),
            radius: 0.25,
        };
        let ground = ShapeKind::Polygon(Polygon::make_box(5.0, 0.5));
        let manifold = collide(
            &ground,
            &Transform::IDENTITY,
            &capsule,
            &Transform::new(Vec2::new(0.0, 0.74), 0.0),
        );
        assert_eq!(manifold.point_count, 2);
        assert!(manifold.normal.y > 0.99);
    }

    #[test]
    fn chain_interior_vertex_rejects_ghost_contact() {
        // Two collinear floor segments; a circle resting exactly over the
        // shared vertex must collide with a face normal, not a vertex
        // normal.
        let left = ShapeKind::ChainSegment {
            ghost1: Vec2::new(-2.0, 0.0),
            point1: Vec2::new(-1.0, 0.0),
            point2: Vec2::new(0.0, 0.0),
            ghost2: Vec2::new(1.0, 0.0),
            chain_id: EntityId::NULL,
        };
        let circle = ShapeKind::Circle {
            center: Vec2::ZERO,
            radius: 0.5,
        };
        // Circle just past the segment end: its closest feature is the
        // shared vertex, owned by the next segment.
        let manifold = collide(
            &left,
            &Transform::IDENTITY,
            &circle,
            &Transform::new(Vec2::new(0.3, 0.45), 0.0),
        );
        assert_eq!(manifold.point_count, 0);

        // Over the edge interior the face responds normally.
        let manifold = collide(
            &left,
            &Transform::IDENTITY,
            &circle,
            &Transform::new(Vec2::new(-0.5, 0.45), 0.0),
        );
        assert_eq!(manifold.point_count, 1);
        assert!(manifold.normal.y > 0.99);
    }

    #[test]
    fn chain_segment_ignores_backside_circle() {
        let floor = ShapeKind::ChainSegment {
            ghost1: Vec2::new(-2.0, 0.0),
            point1: Vec2::new(-1.0, 0.0),
            point2: Vec2::new(0.0, 0.0),
            ghost2: Vec2::new(1.0, 0.0),
            chain_id: EntityId::NULL,
        };
        let circle = ShapeKind::Circle {
            center: Vec2::ZERO,
            radius: 0.2,
        };
        let manifold = collide(
            &floor,
            &Transform::IDENTITY,
            &circle,
            &Transform::new(Vec2::new(-0.5, -0.5), 0.0),
        );
        assert_eq!(manifold.point_count, 0);
    }
}

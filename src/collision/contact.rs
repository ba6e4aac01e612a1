//! Persistent contacts: the pair records created by the broad phase and
//! refreshed by the narrow phase each step.

use crate::{
    collision::{
        distance::{shape_distance, DistanceInput, DistanceProxy, SimplexCache},
        manifold::{collide, Manifold},
    },
    config::SPECULATIVE_DISTANCE,
    core::{shape::Shape, types::Transform},
    utils::allocator::EntityId,
};

/// A potential or actual touching pair of shapes.
///
/// Contacts live in the world arena; awake touching contacts are also
/// registered in a constraint-graph color. Island membership uses the
/// intrusive prev/next links.
#[derive(Debug, Clone)]
pub struct Contact {
    pub id: EntityId,
    pub shape_a: EntityId,
    pub shape_b: EntityId,
    pub body_a: EntityId,
    pub body_b: EntityId,
    pub manifold: Manifold,
    /// GJK warm-start cache for the pre-collide distance cull.
    pub cache: SimplexCache,
    /// Mixed surface coefficients, fixed at creation.
    pub friction: f32,
    pub restitution: f32,
    pub rolling_resistance: f32,
    pub tangent_speed: f32,
    pub touching: bool,
    pub is_sensor: bool,
    pub enable_contact_events: bool,
    pub enable_hit_events: bool,
    /// Solver set holding this contact, and the slot within it.
    pub set_index: usize,
    pub set_slot: usize,
    /// Graph color while awake and touching, else `usize::MAX`.
    pub color_index: usize,
    pub color_slot: usize,
    pub island_id: EntityId,
    pub island_prev: EntityId,
    pub island_next: EntityId,
}

impl Contact {
    pub fn new(
        id: EntityId,
        shape_a: &Shape,
        shape_b: &Shape,
        friction: f32,
        restitution: f32,
    ) -> Self {
        Self {
            id,
            shape_a: shape_a.id,
            shape_b: shape_b.id,
            body_a: shape_a.body_id,
            body_b: shape_b.body_id,
            manifold: Manifold::default(),
            cache: SimplexCache::default(),
            friction,
            restitution,
            rolling_resistance: shape_a
                .material
                .rolling_resistance
                .max(shape_b.material.rolling_resistance),
            tangent_speed: shape_a.material.tangent_speed + shape_b.material.tangent_speed,
            touching: false,
            is_sensor: shape_a.is_sensor || shape_b.is_sensor,
            enable_contact_events: shape_a.enable_contact_events && shape_b.enable_contact_events,
            enable_hit_events: shape_a.enable_hit_events || shape_b.enable_hit_events,
            set_index: crate::dynamics::solver_set::AWAKE_SET,
            set_slot: usize::MAX,
            color_index: usize::MAX,
            color_slot: usize::MAX,
            island_id: EntityId::NULL,
            island_prev: EntityId::NULL,
            island_next: EntityId::NULL,
        }
    }
}

/// Result of re-evaluating a contact's manifold, computed worker-side and
/// applied at the barrier.
#[derive(Debug, Clone)]
pub struct ContactUpdate {
    pub manifold: Manifold,
    pub cache: SimplexCache,
    pub touching: bool,
}

/// Recomputes the manifold for a contact without mutating it. Safe to run
/// from parallel workers over disjoint contacts.
pub fn evaluate_contact(
    contact: &Contact,
    shape_a: &Shape,
    xf_a: &Transform,
    shape_b: &Shape,
    xf_b: &Transform,
) -> ContactUpdate {
    // Cheap cached distance cull before running the pair generator.
    let mut cache = contact.cache;
    let proxy_a = DistanceProxy::from_shape(&shape_a.kind);
    let proxy_b = DistanceProxy::from_shape(&shape_b.kind);
    let gap = shape_distance(
        &mut cache,
        &DistanceInput {
            proxy_a,
            proxy_b,
            transform_a: *xf_a,
            transform_b: *xf_b,
            use_radii: true,
        },
    );

    let mut manifold = if gap.distance > SPECULATIVE_DISTANCE {
        Manifold::default()
    } else {
        collide(&shape_a.kind, xf_a, &shape_b.kind, xf_b)
    };

    // Match feature ids against the old manifold to warm start impulses.
    let old = &contact.manifold;
    for point in manifold.points.iter_mut().take(manifold.point_count) {
        for old_point in old.points.iter().take(old.point_count) {
            if old_point.id == point.id {
                point.normal_impulse = old_point.normal_impulse;
                point.tangent_impulse = old_point.tangent_impulse;
                point.persisted = true;
                break;
            }
        }
    }

    let touching = if contact.is_sensor {
        // Sensors report actual overlap only, never speculative points.
        manifold
            .points
            .iter()
            .take(manifold.point_count)
            .any(|p| p.separation < 0.0)
    } else {
        manifold.point_count > 0
    };

    ContactUpdate {
        manifold,
        cache,
        touching,
    }
}

/// Applies an evaluated update. Returns `(was_touching, now_touching)` so
/// the caller can emit begin/end events and fix up islands.
pub fn apply_contact_update(contact: &mut Contact, update: ContactUpdate) -> (bool, bool) {
    let was_touching = contact.touching;
    contact.manifold = update.manifold;
    contact.cache = update.cache;
    contact.touching = update.touching;
    (was_touching, update.touching)
}

/// Convenience wrapper for the sequential path and tests.
pub fn update_contact(
    contact: &mut Contact,
    shape_a: &Shape,
    xf_a: &Transform,
    shape_b: &Shape,
    xf_b: &Transform,
) -> (bool, bool) {
    let update = evaluate_contact(contact, shape_a, xf_a, shape_b, xf_b);
    apply_contact_update(contact, update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shape::{Polygon, ShapeDef, ShapeKind};
    use glam::Vec2;

    fn test_shape(kind: ShapeKind) -> Shape {
        Shape::new(EntityId::NULL, EntityId::NULL, kind, &ShapeDef::default())
    }

    #[test]
    fn warm_start_impulses_survive_feature_match() {
        let a = test_shape(ShapeKind::Polygon(Polygon::make_square(0.5)));
        let b = test_shape(ShapeKind::Polygon(Polygon::make_square(0.5)));
        let mut contact = Contact::new(EntityId::NULL, &a, &b, 0.5, 0.0);

        let xf_a = Transform::IDENTITY;
        let xf_b = Transform::new(Vec2::new(0.0, 0.99), 0.0);
        update_contact(&mut contact, &a, &xf_a, &b, &xf_b);
        assert!(contact.touching);
        assert_eq!(contact.manifold.point_count, 2);

        contact.manifold.points[0].normal_impulse = 1.5;
        contact.manifold.points[1].normal_impulse = 2.5;

        update_contact(&mut contact, &a, &xf_a, &b, &xf_b);
        assert!(contact.manifold.points[0].persisted);
        assert!((contact.manifold.points[0].normal_impulse - 1.5).abs() < 1e-6);
        assert!((contact.manifold.points[1].normal_impulse - 2.5).abs() < 1e-6);
    }

    #[test]
    fn separated_shapes_stop_touching() {
        let a = test_shape(ShapeKind::Circle {
            center: Vec2::ZERO,
            radius: 0.5,
        });
        let b = test_shape(ShapeKind::Circle {
            center: Vec2::ZERO,
            radius: 0.5,
        });
        let mut contact = Contact::new(EntityId::NULL, &a, &b, 0.5, 0.0);

        let near = Transform::new(Vec2::new(0.95, 0.0), 0.0);
        let (_, touching) =
            update_contact(&mut contact, &a, &Transform::IDENTITY, &b, &near);
        assert!(touching);

        let far = Transform::new(Vec2::new(5.0, 0.0), 0.0);
        let (was, now) = update_contact(&mut contact, &a, &Transform::IDENTITY, &b, &far);
        assert!(was);
        assert!(!now);
        assert_eq!(contact.manifold.point_count, 0);
    }
}

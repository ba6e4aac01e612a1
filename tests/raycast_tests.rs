use momentum2d::*;

fn circle_at(world: &mut World, x: f32, category: u64) -> EntityId {
    let body = world.create_body(&BodyDef::builder().position(Vec2::new(x, 0.0)).build());
    let def = ShapeDef {
        filter: CollisionFilter {
            category,
            ..CollisionFilter::default()
        },
        ..ShapeDef::default()
    };
    world.create_shape(
        body,
        &def,
        ShapeKind::Circle {
            center: Vec2::ZERO,
            radius: 0.5,
        },
    )
}

#[test]
fn closest_ray_hit_picks_first_circle() {
    let mut world = World::new_single_threaded(&WorldDef::default());
    circle_at(&mut world, 1.0, 1);
    circle_at(&mut world, 3.0, 1);
    circle_at(&mut world, 5.0, 1);

    let hit = world
        .cast_ray_closest(Vec2::ZERO, Vec2::new(10.0, 0.0), QueryFilter::default())
        .expect("the ray crosses three circles");

    assert!((hit.fraction - 0.05).abs() < 1e-3, "fraction = {}", hit.fraction);
    assert!((hit.point - Vec2::new(0.5, 0.0)).length() < 1e-3);
    assert!(hit.normal.x < -0.99);
}

#[test]
fn ray_filter_masks_out_categories() {
    let mut world = World::new_single_threaded(&WorldDef::default());
    circle_at(&mut world, 1.0, 0b010);
    let visible = circle_at(&mut world, 3.0, 0b001);

    let filter = QueryFilter {
        category: u64::MAX,
        mask: 0b001,
    };
    let hit = world
        .cast_ray_closest(Vec2::ZERO, Vec2::new(10.0, 0.0), filter)
        .expect("the second circle is still visible");
    assert_eq!(hit.shape_id, visible);
    assert!((hit.fraction - 0.25).abs() < 1e-3);
}

#[test]
fn ray_callback_can_collect_all_hits() {
    let mut world = World::new_single_threaded(&WorldDef::default());
    circle_at(&mut world, 1.0, 1);
    circle_at(&mut world, 3.0, 1);
    circle_at(&mut world, 5.0, 1);

    let mut fractions = Vec::new();
    world.cast_ray(
        Vec2::ZERO,
        Vec2::new(10.0, 0.0),
        QueryFilter::default(),
        &mut |_, _, _, fraction| {
            fractions.push(fraction);
            // Keep the full range so every shape reports.
            1.0
        },
    );
    assert_eq!(fractions.len(), 3);
}

#[test]
fn aabb_query_reports_overlapping_shapes() {
    let mut world = World::new_single_threaded(&WorldDef::default());
    let a = circle_at(&mut world, 1.0, 1);
    circle_at(&mut world, 30.0, 1);

    let mut found = Vec::new();
    world.query_aabb(
        Aabb::new(Vec2::new(0.0, -1.0), Vec2::new(2.0, 1.0)),
        QueryFilter::default(),
        &mut |shape_id| {
            found.push(shape_id);
            true
        },
    );
    assert_eq!(found, vec![a]);
}

#[test]
fn shape_cast_stops_at_first_blocker() {
    let mut world = World::new_single_threaded(&WorldDef::default());
    circle_at(&mut world, 4.0, 1);

    let mut best = f32::MAX;
    world.cast_shape(
        &ShapeKind::Circle {
            center: Vec2::ZERO,
            radius: 0.5,
        },
        Transform::IDENTITY,
        Vec2::new(10.0, 0.0),
        QueryFilter::default(),
        &mut |_, _, _, fraction| {
            best = best.min(fraction);
            fraction
        },
    );
    // Surfaces meet after 3 of the 10 units.
    assert!((best - 0.3).abs() < 0.01, "fraction = {best}");
}

use momentum2d::*;

fn thin_wall(world: &mut World) {
    let wall = world.create_body(&BodyDef::default());
    world.create_shape(
        wall,
        &ShapeDef::default(),
        ShapeKind::Segment {
            point1: Vec2::new(0.0, -1.0),
            point2: Vec2::new(0.0, 1.0),
        },
    );
}

fn fast_circle(world: &mut World, bullet: bool) -> EntityId {
    let body = world.create_body(
        &BodyDef::builder()
            .body_type(BodyType::Dynamic)
            .position(Vec2::new(-1.0, 0.0))
            .linear_velocity(Vec2::new(200.0, 0.0))
            .bullet(bullet)
            .build(),
    );
    world.create_shape(
        body,
        &ShapeDef::default(),
        ShapeKind::Circle {
            center: Vec2::ZERO,
            radius: 0.05,
        },
    );
    body
}

#[test]
fn bullet_does_not_tunnel_through_thin_wall() {
    let mut world = World::new_single_threaded(&WorldDef::default());
    thin_wall(&mut world);
    let bullet = fast_circle(&mut world, true);

    world.step(1.0 / 60.0, 4);

    let x = world.body_position(bullet).x;
    assert!(
        x <= 0.0,
        "the continuous pass must stop the bullet at the wall, x = {x}"
    );
}

#[test]
fn non_bullet_tunnels_where_bullet_stops() {
    // The same setup without the bullet flag shows why the continuous
    // pass exists.
    let mut world = World::new_single_threaded(&WorldDef::default());
    thin_wall(&mut world);
    let body = fast_circle(&mut world, false);

    world.step(1.0 / 60.0, 4);

    let x = world.body_position(body).x;
    assert!(x > 0.0, "a discrete-only body at 200 m/s skips the wall, x = {x}");
}

#[test]
fn bullet_comes_to_rest_against_wall_over_steps() {
    let mut world = World::new_single_threaded(&WorldDef::default());
    thin_wall(&mut world);
    let bullet = fast_circle(&mut world, true);

    for _ in 0..30 {
        world.step(1.0 / 60.0, 4);
    }
    let x = world.body_position(bullet).x;
    assert!(
        x <= 0.0,
        "the bullet should stay on the near side once stopped, x = {x}"
    );
}

#[test]
fn bullets_ignore_other_bullets() {
    let mut world = World::new_single_threaded(&WorldDef {
        gravity: Vec2::ZERO,
        ..WorldDef::default()
    });

    let left = fast_circle(&mut world, true);
    let right = world.create_body(
        &BodyDef::builder()
            .body_type(BodyType::Dynamic)
            .position(Vec2::new(5.0, 0.0))
            .linear_velocity(Vec2::new(-200.0, 0.0))
            .bullet(true)
            .build(),
    );
    world.create_shape(
        right,
        &ShapeDef::default(),
        ShapeKind::Circle {
            center: Vec2::ZERO,
            radius: 0.05,
        },
    );

    world.step(1.0 / 60.0, 4);

    // Both fly past each other; no TOI stop happened between bullets.
    assert!(world.body_position(left).x > 1.0);
    assert!(world.body_position(right).x < 3.0);
}

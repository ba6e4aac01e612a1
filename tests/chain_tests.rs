use momentum2d::*;

#[test]
fn rolling_circle_never_double_hits_chain_vertices() {
    let mut world = World::new_single_threaded(&WorldDef::default());

    // Flat floor built from four collinear chain segments.
    let ground = world.create_body(&BodyDef::default());
    let chain = world.create_chain(
        ground,
        &ChainDef {
            points: vec![
                Vec2::new(-4.0, 0.0),
                Vec2::new(-2.0, 0.0),
                Vec2::new(0.0, 0.0),
                Vec2::new(2.0, 0.0),
                Vec2::new(4.0, 0.0),
            ],
            ..ChainDef::default()
        },
    );
    assert!(!chain.is_null());

    let ball = world.create_body(
        &BodyDef::builder()
            .body_type(BodyType::Dynamic)
            .position(Vec2::new(-3.0, 0.55))
            .linear_velocity(Vec2::new(2.0, 0.0))
            .enable_sleep(false)
            .build(),
    );
    world.create_shape(
        ball,
        &ShapeDef::default(),
        ShapeKind::Circle {
            center: Vec2::ZERO,
            radius: 0.5,
        },
    );

    for step in 0..180 {
        world.step(1.0 / 60.0, 4);

        let manifolds = world.body_contacts(ball);
        assert!(
            manifolds.len() <= 1,
            "step {step}: {} simultaneous chain contacts at x = {}",
            manifolds.len(),
            world.body_position(ball).x
        );
    }

    // The ball crossed the interior vertices and is still supported.
    let position = world.body_position(ball);
    assert!(position.x > 0.0, "ball should have rolled forward, x = {}", position.x);
    assert!(
        position.y > 0.4 && position.y < 0.6,
        "ball should stay on the floor, y = {}",
        position.y
    );
}

#[test]
fn chain_loop_wraps_ghost_vertices() {
    let mut world = World::new_single_threaded(&WorldDef::default());

    // A closed square bowl.
    let ground = world.create_body(&BodyDef::default());
    let chain = world.create_chain(
        ground,
        &ChainDef {
            points: vec![
                Vec2::new(-3.0, 0.0),
                Vec2::new(3.0, 0.0),
                Vec2::new(3.0, 6.0),
                Vec2::new(-3.0, 6.0),
            ],
            is_loop: true,
            ..ChainDef::default()
        },
    );
    assert!(!chain.is_null());

    let ball = world.create_body(
        &BodyDef::builder()
            .body_type(BodyType::Dynamic)
            .position(Vec2::new(0.0, 3.0))
            .build(),
    );
    world.create_shape(
        ball,
        &ShapeDef::default(),
        ShapeKind::Circle {
            center: Vec2::ZERO,
            radius: 0.5,
        },
    );

    for _ in 0..240 {
        world.step(1.0 / 60.0, 4);
    }
    let position = world.body_position(ball);
    assert!(
        position.y > 0.45 && position.y < 0.6,
        "ball should rest on the loop floor, y = {}",
        position.y
    );
}

#[test]
fn backside_approach_passes_through_chain() {
    let mut world = World::new_single_threaded(&WorldDef {
        gravity: Vec2::new(0.0, 10.0),
        ..WorldDef::default()
    });

    // One-sided floor; gravity now pulls the ball up against its back.
    let ground = world.create_body(&BodyDef::default());
    world.create_chain(
        ground,
        &ChainDef {
            points: vec![
                Vec2::new(-4.0, 0.0),
                Vec2::new(0.0, 0.0),
                Vec2::new(4.0, 0.0),
            ],
            ..ChainDef::default()
        },
    );

    let ball = world.create_body(
        &BodyDef::builder()
            .body_type(BodyType::Dynamic)
            .position(Vec2::new(0.0, -2.0))
            .build(),
    );
    world.create_shape(
        ball,
        &ShapeDef::default(),
        ShapeKind::Circle {
            center: Vec2::ZERO,
            radius: 0.3,
        },
    );

    for _ in 0..120 {
        world.step(1.0 / 60.0, 4);
    }
    assert!(
        world.body_position(ball).y > 1.0,
        "segments are one-sided; the ball passes from behind, y = {}",
        world.body_position(ball).y
    );
}

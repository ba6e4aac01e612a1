use momentum2d::*;

fn ground_segment(world: &mut World, p1: Vec2, p2: Vec2) -> EntityId {
    let ground = world.create_body(&BodyDef::default());
    world.create_shape(
        ground,
        &ShapeDef::default(),
        ShapeKind::Segment {
            point1: p1,
            point2: p2,
        },
    );
    ground
}

fn dynamic_box(world: &mut World, position: Vec2, half_extent: f32) -> EntityId {
    let body = world.create_body(
        &BodyDef::builder()
            .body_type(BodyType::Dynamic)
            .position(position)
            .build(),
    );
    world.create_shape(
        body,
        &ShapeDef::default(),
        ShapeKind::Polygon(Polygon::make_square(half_extent)),
    );
    body
}

#[test]
fn falling_box_rests_on_ground() {
    let mut world = World::new_single_threaded(&WorldDef::default());
    ground_segment(&mut world, Vec2::new(-40.0, 0.0), Vec2::new(40.0, 0.0));
    let box_id = dynamic_box(&mut world, Vec2::new(0.0, 5.0), 0.5);

    for _ in 0..120 {
        world.step(1.0 / 60.0, 4);
    }

    let position = world.body_position(box_id);
    assert!(
        position.y > 0.49 && position.y < 0.55,
        "box should rest on the ground, y = {}",
        position.y
    );
    assert!(
        world.body_linear_velocity(box_id).length() < 0.01,
        "box should be at rest"
    );

    let manifolds = world.body_contacts(box_id);
    assert!(
        manifolds.iter().any(|m| m.point_count == 2),
        "a face contact with two points should persist"
    );

    world.validate();
}

#[test]
fn stacked_boxes_sleep_and_wake_together() {
    let mut world = World::new_single_threaded(&WorldDef::default());
    ground_segment(&mut world, Vec2::new(-20.0, 0.0), Vec2::new(20.0, 0.0));
    let bottom = dynamic_box(&mut world, Vec2::new(0.0, 0.5), 0.5);
    let top = dynamic_box(&mut world, Vec2::new(0.0, 1.52), 0.5);

    for _ in 0..300 {
        world.step(1.0 / 60.0, 4);
    }

    assert!(!world.is_body_awake(bottom), "bottom box should sleep");
    assert!(!world.is_body_awake(top), "top box should sleep");
    assert_eq!(
        world.body_set_index(bottom),
        world.body_set_index(top),
        "stacked boxes share one sleeping island"
    );
    assert_eq!(world.body_linear_velocity(bottom), Vec2::ZERO);
    assert_eq!(world.body_linear_velocity(top), Vec2::ZERO);
    world.validate();

    // Any external disturbance wakes the whole island at once.
    world.apply_force(bottom, Vec2::new(100.0, 0.0));
    assert!(world.is_body_awake(bottom));
    assert!(world.is_body_awake(top));
}

#[test]
fn sleeping_bodies_do_not_move() {
    let mut world = World::new_single_threaded(&WorldDef::default());
    ground_segment(&mut world, Vec2::new(-20.0, 0.0), Vec2::new(20.0, 0.0));
    let body = dynamic_box(&mut world, Vec2::new(0.0, 0.5), 0.5);

    for _ in 0..200 {
        world.step(1.0 / 60.0, 4);
    }
    assert!(!world.is_body_awake(body));

    let before = world.body_position(body);
    for _ in 0..60 {
        world.step(1.0 / 60.0, 4);
    }
    let after = world.body_position(body);
    assert_eq!(before, after, "sleeping bodies must not drift");
}

#[test]
fn speed_stays_under_hard_cap() {
    let mut world = World::new_single_threaded(&WorldDef::default());
    let body = world.create_body(
        &BodyDef::builder()
            .body_type(BodyType::Dynamic)
            .position(Vec2::ZERO)
            .linear_velocity(Vec2::new(10_000.0, 0.0))
            .build(),
    );
    world.create_shape(
        body,
        &ShapeDef::default(),
        ShapeKind::Circle {
            center: Vec2::ZERO,
            radius: 0.5,
        },
    );

    world.step(1.0 / 60.0, 4);
    assert!(world.body_linear_velocity(body).length() <= config_max_speed() + 0.001);
}

fn config_max_speed() -> f32 {
    momentum2d::config::MAX_LINEAR_SPEED
}

#[test]
fn single_threaded_steps_are_deterministic() {
    let run = || {
        let mut world = World::new_single_threaded(&WorldDef::default());
        ground_segment(&mut world, Vec2::new(-20.0, 0.0), Vec2::new(20.0, 0.0));
        let mut ids = Vec::new();
        for i in 0..10 {
            ids.push(dynamic_box(
                &mut world,
                Vec2::new(0.1 * (i % 3) as f32, 0.6 + 1.05 * i as f32),
                0.5,
            ));
        }
        for _ in 0..120 {
            world.step(1.0 / 60.0, 4);
        }
        ids.iter()
            .map(|&id| {
                let p = world.body_position(id);
                (p.x.to_bits(), p.y.to_bits(), world.body_rotation(id).angle().to_bits())
            })
            .collect::<Vec<_>>()
    };

    assert_eq!(run(), run(), "identical runs must be bit-identical");
}

#[test]
fn motion_locks_freeze_axes() {
    let mut world = World::new_single_threaded(&WorldDef::default());
    let body = world.create_body(
        &BodyDef::builder()
            .body_type(BodyType::Dynamic)
            .position(Vec2::new(0.0, 5.0))
            .motion_locks(MotionLocks {
                linear_x: false,
                linear_y: true,
                angular_z: true,
            })
            .build(),
    );
    world.create_shape(
        body,
        &ShapeDef::default(),
        ShapeKind::Circle {
            center: Vec2::ZERO,
            radius: 0.5,
        },
    );

    for _ in 0..60 {
        world.step(1.0 / 60.0, 4);
    }
    let position = world.body_position(body);
    assert!((position.y - 5.0).abs() < 1e-5, "y is locked, y = {}", position.y);
}

#[test]
fn begin_and_end_touch_events_fire() {
    let mut world = World::new_single_threaded(&WorldDef::default());
    ground_segment(&mut world, Vec2::new(-20.0, 0.0), Vec2::new(20.0, 0.0));
    let body = dynamic_box(&mut world, Vec2::new(0.0, 2.0), 0.5);

    let mut began = false;
    for _ in 0..120 {
        world.step(1.0 / 60.0, 4);
        if !world.contact_events().begin.is_empty() {
            began = true;
            break;
        }
    }
    assert!(began, "the falling box should report a begin-touch event");

    // Teleport away; the end event shows up in that step's buffer.
    world.set_body_transform(body, Vec2::new(0.0, 50.0), 0.0);
    world.wake_body(body);
    let mut ended = false;
    for _ in 0..5 {
        world.step(1.0 / 60.0, 4);
        if !world.contact_events().end.is_empty() {
            ended = true;
            break;
        }
    }
    assert!(ended, "moving the box away should report an end-touch event");
}

#[test]
fn stale_ids_return_neutral_values() {
    let mut world = World::new_single_threaded(&WorldDef::default());
    let body = dynamic_box(&mut world, Vec2::new(0.0, 1.0), 0.5);
    world.destroy_body(body);

    assert_eq!(world.body_position(body), Vec2::ZERO);
    assert_eq!(world.body_linear_velocity(body), Vec2::ZERO);
    assert_eq!(world.body_mass(body), 0.0);
    // Mutations on stale ids are ignored rather than panicking.
    world.apply_force(body, Vec2::new(1.0, 0.0));
    world.step(1.0 / 60.0, 4);
}

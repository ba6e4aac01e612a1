use momentum2d::*;
use std::f32::consts::FRAC_PI_4;

fn no_gravity() -> WorldDef {
    WorldDef {
        gravity: Vec2::ZERO,
        ..WorldDef::default()
    }
}

fn dynamic_box_at(world: &mut World, position: Vec2) -> EntityId {
    let body = world.create_body(
        &BodyDef::builder()
            .body_type(BodyType::Dynamic)
            .position(position)
            .build(),
    );
    world.create_shape(
        body,
        &ShapeDef::default(),
        ShapeKind::Polygon(Polygon::make_square(0.5)),
    );
    body
}

#[test]
fn revolute_limit_clamps_driven_angle() {
    let mut world = World::new_single_threaded(&no_gravity());
    let anchor = world.create_body(&BodyDef::default());
    let arm = dynamic_box_at(&mut world, Vec2::new(1.0, 0.0));

    let mut def = JointDef::new(
        JointKind::Revolute(RevoluteJoint {
            enable_limit: true,
            lower_angle: -FRAC_PI_4,
            upper_angle: FRAC_PI_4,
            ..RevoluteJoint::default()
        }),
        anchor,
        arm,
    );
    // Pivot at the world origin.
    def.local_frame_a = Transform::IDENTITY;
    def.local_frame_b = Transform::new(Vec2::new(-1.0, 0.0), 0.0);
    world.create_joint(&def);

    // Drive the arm against the upper limit.
    for _ in 0..240 {
        world.apply_torque(arm, 20.0);
        world.step(1.0 / 60.0, 4);
    }

    let angle = world.body_rotation(arm).angle();
    assert!(
        angle <= FRAC_PI_4 + 1e-3,
        "angle must clamp at the upper limit, angle = {angle}"
    );
    assert!(
        angle >= FRAC_PI_4 - 0.05,
        "the torque should push the arm to the limit, angle = {angle}"
    );

    // And symmetrically against the lower limit.
    for _ in 0..240 {
        world.apply_torque(arm, -40.0);
        world.step(1.0 / 60.0, 4);
    }
    let angle = world.body_rotation(arm).angle();
    assert!(angle >= -FRAC_PI_4 - 1e-3);
}

#[test]
fn revolute_motor_spins_toward_target_speed() {
    let mut world = World::new_single_threaded(&no_gravity());
    let anchor = world.create_body(&BodyDef::default());
    let wheel = dynamic_box_at(&mut world, Vec2::ZERO);

    let def = JointDef::new(
        JointKind::Revolute(RevoluteJoint {
            enable_motor: true,
            motor_speed: 2.0,
            max_motor_torque: 100.0,
            ..RevoluteJoint::default()
        }),
        anchor,
        wheel,
    );
    world.create_joint(&def);

    for _ in 0..120 {
        world.step(1.0 / 60.0, 4);
    }
    let omega = world.body_angular_velocity(wheel);
    assert!((omega - 2.0).abs() < 0.05, "motor should reach speed, omega = {omega}");
}

#[test]
fn distance_joint_holds_length() {
    let mut world = World::new_single_threaded(&WorldDef::default());
    let anchor = world.create_body(&BodyDef::builder().position(Vec2::new(0.0, 4.0)).build());
    let bob = dynamic_box_at(&mut world, Vec2::new(0.0, 2.0));

    let def = JointDef::new(
        JointKind::Distance(DistanceJoint {
            length: 2.0,
            ..DistanceJoint::default()
        }),
        anchor,
        bob,
    );
    world.create_joint(&def);

    for _ in 0..180 {
        world.step(1.0 / 60.0, 4);
    }
    let distance = (world.body_position(bob) - Vec2::new(0.0, 4.0)).length();
    assert!(
        (distance - 2.0).abs() < 0.02,
        "rigid distance joint should hold its length, d = {distance}"
    );
}

#[test]
fn weld_joint_locks_relative_motion() {
    let mut world = World::new_single_threaded(&WorldDef::default());
    let a = dynamic_box_at(&mut world, Vec2::new(0.0, 5.0));
    let b = dynamic_box_at(&mut world, Vec2::new(1.0, 5.0));

    let mut def = JointDef::new(JointKind::Weld(WeldJoint::default()), a, b);
    def.local_frame_a = Transform::new(Vec2::new(0.5, 0.0), 0.0);
    def.local_frame_b = Transform::new(Vec2::new(-0.5, 0.0), 0.0);
    world.create_joint(&def);

    for _ in 0..90 {
        world.step(1.0 / 60.0, 4);
    }
    let gap = world.body_position(b) - world.body_position(a);
    assert!(
        (gap - Vec2::new(1.0, 0.0)).length() < 0.02,
        "welded bodies keep their offset while falling, gap = {gap:?}"
    );
    let relative = world.body_rotation(a).angle() - world.body_rotation(b).angle();
    assert!(relative.abs() < 0.01);
}

#[test]
fn filter_joint_suppresses_collision_without_linking() {
    let mut world = World::new_single_threaded(&no_gravity());
    let a = dynamic_box_at(&mut world, Vec2::ZERO);
    let b = dynamic_box_at(&mut world, Vec2::new(0.25, 0.0));

    let def = JointDef::new(JointKind::Filter, a, b);
    world.create_joint(&def);

    for _ in 0..30 {
        world.step(1.0 / 60.0, 4);
    }
    // Heavily overlapping, yet no contact response.
    assert!(world.body_contacts(a).is_empty());
    assert!(world.body_linear_velocity(a).length() < 1e-6);
}

#[test]
fn mouse_joint_drags_body_toward_target() {
    let mut world = World::new_single_threaded(&no_gravity());
    let ground = world.create_body(&BodyDef::default());
    let body = dynamic_box_at(&mut world, Vec2::ZERO);

    let mut def = JointDef::new(
        JointKind::Mouse(MouseJoint {
            hertz: 5.0,
            damping_ratio: 0.9,
            max_force: 1000.0,
            ..MouseJoint::default()
        }),
        ground,
        body,
    );
    def.local_frame_a = Transform::new(Vec2::new(3.0, 1.0), 0.0);
    world.create_joint(&def);

    for _ in 0..240 {
        world.step(1.0 / 60.0, 4);
    }
    let position = world.body_position(body);
    assert!(
        (position - Vec2::new(3.0, 1.0)).length() < 0.1,
        "mouse joint should pull the body to the target, p = {position:?}"
    );
}

#[test]
fn prismatic_limit_stops_slider() {
    let mut world = World::new_single_threaded(&no_gravity());
    let anchor = world.create_body(&BodyDef::default());
    let slider = dynamic_box_at(&mut world, Vec2::ZERO);

    let def = JointDef::new(
        JointKind::Prismatic(PrismaticJoint {
            enable_limit: true,
            lower_translation: -1.0,
            upper_translation: 1.0,
            ..PrismaticJoint::default()
        }),
        anchor,
        slider,
    );
    world.create_joint(&def);

    for _ in 0..240 {
        world.apply_force(slider, Vec2::new(50.0, 0.0));
        world.step(1.0 / 60.0, 4);
    }
    let position = world.body_position(slider);
    assert!(
        position.x <= 1.0 + 5e-3,
        "slider must stop at the upper translation limit, x = {}",
        position.x
    );
    assert!(position.y.abs() < 1e-3, "slider stays on the axis");
}

#[test]
fn joint_events_fire_above_force_threshold() {
    let mut world = World::new_single_threaded(&WorldDef::default());
    let anchor = world.create_body(&BodyDef::builder().position(Vec2::new(0.0, 4.0)).build());
    let bob = dynamic_box_at(&mut world, Vec2::new(0.0, 2.0));

    let mut def = JointDef::new(
        JointKind::Distance(DistanceJoint {
            length: 2.0,
            ..DistanceJoint::default()
        }),
        anchor,
        bob,
    );
    def.force_threshold = 0.1;
    world.create_joint(&def);

    let mut saw_event = false;
    for _ in 0..120 {
        world.step(1.0 / 60.0, 4);
        if !world.joint_events().events.is_empty() {
            saw_event = true;
            break;
        }
    }
    // The hanging weight loads the joint well past the tiny threshold.
    assert!(saw_event);
}

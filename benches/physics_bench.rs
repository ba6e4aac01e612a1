use criterion::{black_box, criterion_group, criterion_main, Criterion};
use momentum2d::*;

fn build_pyramid(world: &mut World, base: usize) {
    let ground = world.create_body(&BodyDef::default());
    world.create_shape(
        ground,
        &ShapeDef::default(),
        ShapeKind::Segment {
            point1: Vec2::new(-50.0, 0.0),
            point2: Vec2::new(50.0, 0.0),
        },
    );

    let h = 0.5;
    for row in 0..base {
        let count = base - row;
        let y = h + 2.0 * h * row as f32 + 0.01 * row as f32;
        for i in 0..count {
            let x = (i as f32 - (count as f32 - 1.0) * 0.5) * (2.0 * h + 0.005);
            let body = world.create_body(
                &BodyDef::builder()
                    .body_type(BodyType::Dynamic)
                    .position(Vec2::new(x, y))
                    .build(),
            );
            world.create_shape(
                body,
                &ShapeDef::default(),
                ShapeKind::Polygon(Polygon::make_square(h)),
            );
        }
    }
}

fn bench_pyramid_step(c: &mut Criterion) {
    c.bench_function("step_pyramid_15_rows", |b| {
        let mut world = World::new_single_threaded(&WorldDef::default());
        build_pyramid(&mut world, 15);
        // Warm up so contacts and islands exist.
        for _ in 0..30 {
            world.step(1.0 / 60.0, 4);
        }
        b.iter(|| {
            world.step(black_box(1.0 / 60.0), 4);
        })
    });
}

fn bench_ray_casts(c: &mut Criterion) {
    c.bench_function("ray_cast_closest_200_shapes", |b| {
        let mut world = World::new_single_threaded(&WorldDef::default());
        for i in 0..200 {
            let body = world.create_body(
                &BodyDef::builder()
                    .position(Vec2::new((i % 20) as f32, (i / 20) as f32))
                    .build(),
            );
            world.create_shape(
                body,
                &ShapeDef::default(),
                ShapeKind::Circle {
                    center: Vec2::ZERO,
                    radius: 0.3,
                },
            );
        }
        world.step(1.0 / 60.0, 4);

        b.iter(|| {
            world.cast_ray_closest(
                black_box(Vec2::new(-5.0, 4.5)),
                Vec2::new(40.0, 0.0),
                QueryFilter::default(),
            )
        })
    });
}

criterion_group!(benches, bench_pyramid_step, bench_ray_casts);
criterion_main!(benches);

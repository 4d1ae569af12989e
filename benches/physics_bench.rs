use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use vehicle_physics::collision::Bvh;
use vehicle_physics::core::Aabb;
use vehicle_physics::*;

fn grid_boxes(resolution: usize) -> Vec<(Aabb, usize)> {
    let mut items = Vec::with_capacity(resolution * resolution);
    for z in 0..resolution {
        for x in 0..resolution {
            let min = DVec3::new(x as f64, 0.0, z as f64);
            items.push((Aabb::new(min, min + DVec3::splat(0.9)), items.len()));
        }
    }
    items
}

fn bench_bvh(c: &mut Criterion) {
    let mut group = c.benchmark_group("bvh");
    for &resolution in &[16usize, 64, 128] {
        let items = grid_boxes(resolution);
        group.bench_with_input(BenchmarkId::new("build", items.len()), &items, |b, items| {
            b.iter(|| Bvh::build(black_box(items.iter().copied())))
        });

        let bvh = Bvh::build(items.iter().copied());
        let region = Aabb::new(DVec3::splat(3.5), DVec3::splat(6.5));
        group.bench_with_input(BenchmarkId::new("query_aabb", items.len()), &bvh, |b, bvh| {
            b.iter(|| bvh.query_aabb(black_box(region)).count())
        });
        group.bench_with_input(BenchmarkId::new("query_ray", items.len()), &bvh, |b, bvh| {
            b.iter(|| {
                bvh.query_ray(
                    black_box(DVec3::new(-1.0, 0.5, 0.5)),
                    DVec3::X,
                    resolution as f64 + 2.0,
                )
                .count()
            })
        });
    }
    group.finish();
}

fn prepare_engine(body_count: usize, parallel: bool) -> PhysicsEngine {
    let mut engine = PhysicsEngine::new(PhysicsEngineConfig {
        burn_in_duration: 0.0,
        ..Default::default()
    })
    .expect("default config is valid");
    engine.set_parallel_enabled(parallel);
    engine
        .add_static_mesh(CollisionMesh::ground(500.0, 0.0, PhysicsMaterial::asphalt()))
        .expect("ground mesh is valid");
    for i in 0..body_count {
        let x = (i % 32) as f64 * 3.0;
        let z = (i / 32) as f64 * 3.0;
        engine.add_body(
            RigidBody::new(
                format!("ball{i}"),
                1.0,
                Mat3::for_solid_sphere(0.5, 1.0),
                Pose::from_position(DVec3::new(x, 0.49, z)),
            )
            .with_mesh(CollisionMesh::new("hull").with_sphere(CollisionSphere::new(
                DVec3::ZERO,
                0.5,
                PhysicsMaterial::default(),
            ))),
        );
    }
    engine
}

fn bench_engine_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_step");
    for &count in &[32usize, 256, 1024] {
        for parallel in [false, true] {
            let label = if parallel { "parallel" } else { "sequential" };
            group.bench_with_input(BenchmarkId::new(label, count), &count, |b, &count| {
                let mut engine = prepare_engine(count, parallel);
                let dt = engine.config().dt;
                b.iter(|| {
                    let time = engine.frame() as f64 * f64::from(dt);
                    engine
                        .advance_time(black_box(dt), time, None)
                        .expect("resting spheres step cleanly");
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_bvh, bench_engine_step);
criterion_main!(benches);

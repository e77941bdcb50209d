//! Physics core benchmarks (criterion - wall-clock time).
//!
//! Run all:    cargo bench --manifest-path benchmarks/Cargo.toml --bench physics
//! Filter:     cargo bench --manifest-path benchmarks/Cargo.toml --bench physics -- bvh

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Vec2;
use rein2d::physics::collide::{collide_box_circle, collide_boxes, collide_circles};
use rein2d::{Aabb, Shape, Transform2d};
use rein2d_bench::*;

// ---------------------------------------------------------------------------
// BVH
// ---------------------------------------------------------------------------

fn bench_bvh(c: &mut Criterion) {
    {
        let mut group = c.benchmark_group("bvh/build");
        for &n in &[100, 500, 1000, 2000] {
            let boxes = grid_boxes(n, 1.5);
            group.bench_with_input(BenchmarkId::from_parameter(n), &boxes, |b, boxes| {
                b.iter(|| build_tree(boxes));
            });
        }
        group.finish();
    }

    {
        let mut group = c.benchmark_group("bvh/query");
        for &n in &[100, 500, 1000, 2000] {
            let boxes = grid_boxes(n, 1.5);
            let (tree, _) = build_tree(&boxes);
            let window = Aabb::new(Vec2::splat(2.0), Vec2::splat(8.0));
            group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
                b.iter(|| {
                    let mut hits = 0usize;
                    tree.query(&window, |_| {
                        hits += 1;
                        true
                    });
                    hits
                });
            });
        }
        group.finish();
    }

    {
        let mut group = c.benchmark_group("bvh/move");
        for &n in &[100, 1000] {
            let boxes = grid_boxes(n, 1.5);
            group.bench_with_input(BenchmarkId::from_parameter(n), &boxes, |b, boxes| {
                b.iter_batched(
                    || build_tree(boxes),
                    |(mut tree, ids)| {
                        // Shift every proxy far enough to force reinsertion.
                        let offset = Vec2::new(0.7, 0.0);
                        for (&id, aabb) in ids.iter().zip(boxes) {
                            let moved = Aabb::new(aabb.min + offset, aabb.max + offset);
                            tree.move_proxy(id, moved, offset);
                        }
                        tree
                    },
                    criterion::BatchSize::LargeInput,
                );
            });
        }
        group.finish();
    }
}

// ---------------------------------------------------------------------------
// Narrowphase
// ---------------------------------------------------------------------------

fn bench_narrowphase(c: &mut Criterion) {
    let identity = Transform2d::IDENTITY;

    {
        let mut group = c.benchmark_group("narrowphase/circle_circle");
        let circle = Shape::circle(1.0);
        let hit = Transform2d::new(Vec2::new(1.5, 0.0), 0.0);
        group.bench_function("intersecting", |b| {
            b.iter(|| collide_circles(&circle, &identity, &circle, &hit));
        });
        let miss = Transform2d::new(Vec2::new(5.0, 0.0), 0.0);
        group.bench_function("separated", |b| {
            b.iter(|| collide_circles(&circle, &identity, &circle, &miss));
        });
        group.finish();
    }

    {
        let mut group = c.benchmark_group("narrowphase/box_box");
        let cube = Shape::cuboid(1.0, 1.0);
        let hit = Transform2d::new(Vec2::new(0.0, 1.9), 0.0);
        group.bench_function("stacked", |b| {
            b.iter(|| collide_boxes(&cube, &identity, &cube, &hit));
        });
        let rotated = Transform2d::new(Vec2::new(1.5, 0.0), 0.785);
        group.bench_function("rotated", |b| {
            b.iter(|| collide_boxes(&cube, &identity, &cube, &rotated));
        });
        let miss = Transform2d::new(Vec2::new(5.0, 0.0), 0.0);
        group.bench_function("separated", |b| {
            b.iter(|| collide_boxes(&cube, &identity, &cube, &miss));
        });
        group.finish();
    }

    {
        let mut group = c.benchmark_group("narrowphase/box_circle");
        let cube = Shape::cuboid(1.0, 1.0);
        let circle = Shape::circle(1.0);
        let hit = Transform2d::new(Vec2::new(1.5, 0.0), 0.0);
        group.bench_function("intersecting", |b| {
            b.iter(|| collide_box_circle(&cube, &identity, &circle, &hit));
        });
        group.finish();
    }
}

// ---------------------------------------------------------------------------
// Full pipeline
// ---------------------------------------------------------------------------

fn bench_pipeline(c: &mut Criterion) {
    {
        let mut group = c.benchmark_group("pipeline/step");
        group.sample_size(30);
        for &n in &[50, 100, 500, 1000] {
            group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
                b.iter_batched(
                    || setup_mixed_pile(n).expect("scene setup"),
                    |mut world| {
                        world.update(1.0 / 60.0);
                        world
                    },
                    criterion::BatchSize::LargeInput,
                );
            });
        }
        group.finish();
    }

    {
        let mut group = c.benchmark_group("pipeline/sustained_60steps");
        group.sample_size(10);
        for &n in &[100, 500] {
            group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
                b.iter_batched(
                    || setup_box_stacks(n).expect("scene setup"),
                    |mut world| {
                        run_steps(&mut world, 60);
                        world
                    },
                    criterion::BatchSize::LargeInput,
                );
            });
        }
        group.finish();
    }
}

criterion_group!(benches, bench_bvh, bench_narrowphase, bench_pipeline);
criterion_main!(benches);

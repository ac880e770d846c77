// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use kurbo::{Point, Vec2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use understory_dynamic_tree::{Aabb2D, BroadPhase, DynamicTree, ProxyId, RayCastInput};

const WORLD: f64 = 2000.0;

fn gen_random_rects(count: usize, seed: u64) -> Vec<Aabb2D> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let x0 = rng.gen_range(0.0..WORLD);
            let y0 = rng.gen_range(0.0..WORLD);
            Aabb2D::from_xywh(x0, y0, rng.gen_range(2.0..12.0), rng.gen_range(2.0..12.0))
        })
        .collect()
}

fn gen_grid_rects(n: usize, cell: f64) -> Vec<Aabb2D> {
    let mut out = Vec::with_capacity(n * n);
    for y in 0..n {
        for x in 0..n {
            let x0 = x as f64 * cell;
            let y0 = y as f64 * cell;
            out.push(Aabb2D::from_xywh(x0, y0, cell * 0.8, cell * 0.8));
        }
    }
    out
}

fn build(rects: &[Aabb2D]) -> (DynamicTree<usize>, Vec<ProxyId>) {
    let mut tree = DynamicTree::new();
    let ids = rects
        .iter()
        .enumerate()
        .map(|(i, r)| tree.create_proxy(*r, i).expect("bench tree fits in memory"))
        .collect();
    (tree, ids)
}

fn bench_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("create");
    for &n in &[1_000_usize, 10_000] {
        let rects = gen_random_rects(n, 0xCAFE_F00D);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(format!("random_n{n}"), |b| {
            b.iter_batched(
                DynamicTree::<usize>::new,
                |mut tree| {
                    for (i, r) in rects.iter().enumerate() {
                        let _ = tree.create_proxy(*r, i);
                    }
                    black_box(tree.height());
                },
                BatchSize::SmallInput,
            );
        });
    }
    // Row-major grid: every insert lands at the same edge of the tree.
    let rects = gen_grid_rects(100, 10.0);
    group.throughput(Throughput::Elements(rects.len() as u64));
    group.bench_function("grid_sorted_n10000", |b| {
        b.iter_batched(
            DynamicTree::<usize>::new,
            |mut tree| {
                for (i, r) in rects.iter().enumerate() {
                    let _ = tree.create_proxy(*r, i);
                }
                black_box(tree.height());
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

fn bench_move(c: &mut Criterion) {
    let mut group = c.benchmark_group("move");
    let rects = gen_random_rects(5_000, 0xBADC_F00D);
    group.throughput(Throughput::Elements(rects.len() as u64));
    for (label, step) in [("jitter", 0.02), ("drift", 1.5)] {
        group.bench_function(label, |b| {
            b.iter_batched(
                || build(&rects),
                |(mut tree, ids)| {
                    let d = Vec2::new(step, -step);
                    let mut moved = 0_usize;
                    for (id, r) in ids.iter().zip(&rects) {
                        if tree.move_proxy(*id, r.translate(d), d).unwrap_or(false) {
                            moved += 1;
                        }
                    }
                    black_box(moved);
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");
    let rects = gen_random_rects(10_000, 0xC1A5_7E55);
    let (tree, _) = build(&rects);

    let queries: Vec<_> = gen_random_rects(256, 0xFACE_FEED)
        .into_iter()
        .map(|q| q.inflate(40.0))
        .collect();
    group.throughput(Throughput::Elements(queries.len() as u64));
    group.bench_function("rect_n10000", |b| {
        b.iter(|| {
            let mut hits = 0_usize;
            for q in &queries {
                tree.query(q, |_| {
                    hits += 1;
                    true
                });
            }
            black_box(hits);
        });
    });

    let mut rng = StdRng::seed_from_u64(0xDEAD_BEEF);
    let rays: Vec<_> = (0..256)
        .map(|_| {
            RayCastInput::new(
                Point::new(0.0, rng.gen_range(0.0..WORLD)),
                Point::new(WORLD, rng.gen_range(0.0..WORLD)),
                1.0,
            )
        })
        .collect();
    group.throughput(Throughput::Elements(rays.len() as u64));
    group.bench_function("ray_closest_n10000", |b| {
        b.iter(|| {
            let mut closest = 0_usize;
            for ray in &rays {
                tree.ray_cast(ray, |input, id| {
                    match tree.fat_aabb(id).and_then(|f| f.ray_cast(input)) {
                        Some(t) => {
                            closest += 1;
                            t.max(1e-9)
                        }
                        None => input.max_fraction,
                    }
                });
            }
            black_box(closest);
        });
    });
    group.finish();
}

fn bench_broad_phase(c: &mut Criterion) {
    let mut group = c.benchmark_group("broad_phase");
    let rects = gen_random_rects(5_000, 0x1234_5678);
    group.throughput(Throughput::Elements(rects.len() as u64));
    group.bench_function("step_n5000", |b| {
        b.iter_batched(
            || {
                let mut bp = BroadPhase::new();
                let ids: Vec<_> = rects
                    .iter()
                    .enumerate()
                    .map(|(i, r)| bp.create_proxy(*r, i).expect("bench tree fits in memory"))
                    .collect();
                bp.update_pairs(|_, _| {});
                (bp, ids)
            },
            |(mut bp, ids)| {
                let d = Vec2::new(0.5, 0.25);
                for (id, r) in ids.iter().zip(&rects) {
                    let _ = bp.move_proxy(*id, r.translate(d * 4.0), d);
                }
                let mut pairs = 0_usize;
                bp.update_pairs(|_, _| pairs += 1);
                black_box(pairs);
            },
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_create,
    bench_move,
    bench_query,
    bench_broad_phase
);
criterion_main!(benches);

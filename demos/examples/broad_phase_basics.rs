// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Broad phase + narrow phase: bouncing circles in a box.
//!
//! This example shows how to:
//! - keep one proxy per circle in a `BroadPhase`,
//! - feed it tight AABBs and displacements every step,
//! - confirm candidate pairs with an exact circle test,
//! - pick the first circle along a segment with a clipped ray cast.
//!
//! Run:
//! - `cargo run -p understory_dynamic_tree_demos --example broad_phase_basics`

use kurbo::{Circle, Point, Shape, Vec2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use understory_dynamic_tree::{Aabb2D, BroadPhase, ProxyId, RayCastInput, TreeConfig};

const ARENA: f64 = 100.0;
const DT: f64 = 1.0 / 60.0;

#[derive(Clone, Copy, Debug)]
struct Body {
    circle: Circle,
    velocity: Vec2,
}

impl Body {
    fn aabb(&self) -> Aabb2D {
        self.circle.bounding_box().into()
    }

    fn step(&mut self) -> Vec2 {
        let d = self.velocity * DT;
        self.circle.center += d;
        let (c, r) = (self.circle.center, self.circle.radius);
        if c.x - r < 0.0 || c.x + r > ARENA {
            self.velocity.x = -self.velocity.x;
        }
        if c.y - r < 0.0 || c.y + r > ARENA {
            self.velocity.y = -self.velocity.y;
        }
        d
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mut rng = StdRng::seed_from_u64(7);
    let config = TreeConfig::new()
        .with_aabb_margin(0.5)
        .with_initial_capacity(64);
    let mut bp: BroadPhase<usize> = BroadPhase::with_config(config);

    let mut bodies = Vec::new();
    let mut proxies: Vec<ProxyId> = Vec::new();
    for i in 0..200 {
        let radius = rng.gen_range(0.5..2.0);
        let center = Point::new(
            rng.gen_range(radius..ARENA - radius),
            rng.gen_range(radius..ARENA - radius),
        );
        let body = Body {
            circle: Circle::new(center, radius),
            velocity: Vec2::new(rng.gen_range(-20.0..20.0), rng.gen_range(-20.0..20.0)),
        };
        proxies.push(bp.create_proxy(body.aabb(), i).expect("arena fits in memory"));
        bodies.push(body);
    }

    for frame in 0..120 {
        for (body, &proxy) in bodies.iter_mut().zip(&proxies) {
            let d = body.step();
            bp.move_proxy(proxy, body.aabb(), d)
                .expect("proxies are never destroyed in this demo");
        }

        let moved = bp.move_count();
        let mut candidates = 0;
        let mut contacts = 0;
        bp.update_pairs(|&a, &b| {
            candidates += 1;
            let (ca, cb) = (bodies[a].circle, bodies[b].circle);
            let reach = ca.radius + cb.radius;
            if (ca.center - cb.center).hypot2() <= reach * reach {
                contacts += 1;
            }
        });

        if frame % 30 == 0 {
            bp.rebalance(16);
            let tree = bp.tree();
            println!(
                "frame {frame:3}: {moved:3} reinserted, {candidates:3} candidates, {contacts:3} contacts, height {}, perimeter ratio {:.2}",
                tree.height(),
                tree.perimeter_ratio(),
            );
        }
    }

    // Pick along the diagonal: clip the cast at each exact hit.
    let ray = RayCastInput::new(Point::ZERO, Point::new(ARENA, ARENA), 1.0);
    let mut first: Option<(f64, usize)> = None;
    bp.ray_cast(&ray, |input, proxy| {
        let Some(&index) = bp.user_data(proxy) else {
            return input.max_fraction;
        };
        match segment_circle(input, bodies[index].circle) {
            Some(t) => {
                first = Some((t, index));
                t
            }
            None => input.max_fraction,
        }
    });
    match first {
        Some((t, index)) => println!(
            "first circle on the diagonal: #{index} at {:?}",
            ray.point_at(t)
        ),
        None => println!("the diagonal is clear"),
    }
}

/// Entry fraction of the segment into `circle`, if it enters within the window.
fn segment_circle(input: &RayCastInput, circle: Circle) -> Option<f64> {
    let d = input.p2 - input.p1;
    let f = input.p1 - circle.center;
    let a = d.hypot2();
    let b = 2.0 * f.dot(d);
    let c = f.hypot2() - circle.radius * circle.radius;
    let disc = b * b - 4.0 * a * c;
    if a == 0.0 || disc < 0.0 {
        return None;
    }
    let root = disc.sqrt();
    let exit = (-b + root) / (2.0 * a);
    let enter = ((-b - root) / (2.0 * a)).max(0.0);
    (exit >= 0.0 && enter <= input.max_fraction).then_some(enter)
}

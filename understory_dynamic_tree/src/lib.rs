// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Dynamic Tree: an incrementally updated AABB tree for broad-phase
//! collision detection.
//!
//! The tree tracks a changing population of axis-aligned boxes and answers
//! "what might overlap this box or segment" fast enough to run every
//! simulation step.
//!
//! - Create, move, and destroy proxies through generational [`ProxyId`] handles.
//! - Proxies store a *fat* AABB, so small motions cost O(1) and leave the tree alone.
//! - Insertion picks a sibling greedily by perimeter cost, and AVL rotations keep
//!   sibling heights within one of each other.
//! - Region queries and segment casts prune with an explicit stack and can stop early.
//! - [`BroadPhase`] buffers moved proxies and turns overlaps into sorted, deduplicated pairs.
//!
//! Exact shape tests, physical response, and world stepping are left to the caller:
//! the tree only reports candidates.
//!
//! # Example
//!
//! ```rust
//! use kurbo::Vec2;
//! use understory_dynamic_tree::{Aabb2D, DynamicTree};
//!
//! let mut tree = DynamicTree::new();
//! let a = tree.create_proxy(Aabb2D::new(0.0, 0.0, 1.0, 1.0), "a").unwrap();
//! let b = tree.create_proxy(Aabb2D::new(10.0, 10.0, 11.0, 11.0), "b").unwrap();
//! let c = tree.create_proxy(Aabb2D::new(0.5, 0.5, 1.5, 1.5), "c").unwrap();
//!
//! let hits: Vec<_> = tree.query_rect(Aabb2D::new(0.0, 0.0, 2.0, 2.0)).collect();
//! assert_eq!(hits.len(), 2);
//! assert!(hits.contains(&a) && hits.contains(&c));
//!
//! // A nudge inside the fat AABB is absorbed.
//! let moved = tree
//!     .move_proxy(b, Aabb2D::new(10.05, 10.0, 11.05, 11.0), Vec2::new(0.05, 0.0))
//!     .unwrap();
//! assert!(!moved);
//!
//! assert_eq!(tree.destroy_proxy(b), Ok("b"));
//! assert_eq!(tree.user_data(b), None);
//! ```
//!
//! Pair generation with [`BroadPhase`]:
//!
//! ```rust
//! use kurbo::Vec2;
//! use understory_dynamic_tree::{Aabb2D, BroadPhase};
//!
//! let mut bp = BroadPhase::new();
//! let ball = bp.create_proxy(Aabb2D::new(0.0, 0.0, 1.0, 1.0), "ball").unwrap();
//! let _wall = bp.create_proxy(Aabb2D::new(5.0, -10.0, 6.0, 10.0), "wall").unwrap();
//!
//! let mut pairs = Vec::new();
//! bp.update_pairs(|a, b| pairs.push((*a, *b)));
//! assert!(pairs.is_empty());
//!
//! bp.move_proxy(ball, Aabb2D::new(4.5, 0.0, 5.5, 1.0), Vec2::new(4.5, 0.0)).unwrap();
//! bp.update_pairs(|a, b| pairs.push((*a, *b)));
//! assert_eq!(pairs.len(), 1);
//! ```
//!
//! ## Features
//!
//! - `std` *(default)*: enables `kurbo/std`.
//! - `libm`: enables `kurbo/libm` for `no_std` builds.
//!
//! ## Configuration
//!
//! [`TreeConfig`] sets the fat-AABB margin (default `0.1`) and the displacement
//! multiplier used to stretch fat AABBs along the direction of motion (default
//! `2.0`). Larger values mean fewer reinsertions and looser query results.
//!
//! ## Errors and logging
//!
//! Mutators return [`TreeError`] and leave the tree untouched on failure;
//! accessors return `Option`. The crate logs through `tracing`: store growth at
//! `debug`, reinsertions and rotations at `trace`, and rejected handles at `warn`.
//!
//! ### Float semantics
//!
//! Coordinates are assumed finite. Debug builds assert on invalid boxes.

#![no_std]

extern crate alloc;

mod broad_phase;
mod config;
mod error;
mod query;
mod rebalance;
mod store;
mod tree;
mod types;

pub use broad_phase::{BroadPhase, ProxyPair};
pub use config::TreeConfig;
pub use error::{Result, TreeError};
pub use store::ProxyId;
pub use tree::DynamicTree;
pub use types::{Aabb2D, RayCastInput};

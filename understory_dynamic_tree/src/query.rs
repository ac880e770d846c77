// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Overlap queries and segment casts.
//!
//! Both traversals use an explicit stack of node indices and prune any
//! subtree whose AABB misses the query. Callbacks are invoked for leaves only
//! and can stop the traversal early.

use alloc::vec::Vec;

use kurbo::Point;
use smallvec::{SmallVec, smallvec};

use crate::store::{Kind, NodeIdx, ProxyId};
use crate::tree::DynamicTree;
use crate::types::{Aabb2D, RayCastInput};

/// Traversal stack. Balanced trees rarely exceed this depth.
type NodeStack = SmallVec<[NodeIdx; 64]>;

impl<U> DynamicTree<U> {
    /// Visit every proxy whose fat AABB overlaps `aabb`.
    ///
    /// The callback returns `true` to continue and `false` to stop. Proxies
    /// are reported at most once, in no particular order.
    pub fn query<F>(&self, aabb: &Aabb2D, mut callback: F)
    where
        F: FnMut(ProxyId) -> bool,
    {
        let Some(root) = self.root else {
            return;
        };
        let mut stack: NodeStack = smallvec![root];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if !node.aabb.overlaps(aabb) {
                continue;
            }
            match node.kind {
                Kind::Leaf { .. } => {
                    if !callback(self.proxy_id(idx)) {
                        return;
                    }
                }
                Kind::Internal { child1, child2 } => {
                    stack.push(child1);
                    stack.push(child2);
                }
            }
        }
    }

    /// Collect every proxy whose fat AABB overlaps `aabb`.
    pub fn query_rect(&self, aabb: Aabb2D) -> impl Iterator<Item = ProxyId> + '_ {
        let mut out = Vec::new();
        self.query(&aabb, |proxy| {
            out.push(proxy);
            true
        });
        out.into_iter()
    }

    /// Collect every proxy whose fat AABB contains `point`.
    pub fn query_point(&self, point: Point) -> impl Iterator<Item = ProxyId> + '_ {
        self.query_rect(Aabb2D::from_point(point))
    }

    /// Cast the segment in `input` against the proxies' fat AABBs.
    ///
    /// The callback receives the current input (whose `max_fraction` may have
    /// been clipped by earlier hits) and the proxy whose fat AABB the segment
    /// reaches. Its return value steers the cast:
    ///
    /// - `<= 0.0` stops the cast,
    /// - a value below the current `max_fraction` clips the segment there,
    /// - anything larger leaves the segment as is.
    ///
    /// Returning the exact hit fraction therefore finds the closest hit, and
    /// returning `input.max_fraction` visits every candidate.
    ///
    /// # Examples
    ///
    /// ```
    /// use kurbo::Point;
    /// use understory_dynamic_tree::{Aabb2D, DynamicTree, RayCastInput};
    ///
    /// let mut tree = DynamicTree::new();
    /// let near = tree.create_proxy(Aabb2D::new(2.0, -1.0, 3.0, 1.0), "near").unwrap();
    /// let _far = tree.create_proxy(Aabb2D::new(6.0, -1.0, 7.0, 1.0), "far").unwrap();
    ///
    /// let ray = RayCastInput::new(Point::new(0.0, 0.0), Point::new(10.0, 0.0), 1.0);
    /// let mut closest = None;
    /// tree.ray_cast(&ray, |input, proxy| {
    ///     let hit = tree.fat_aabb(proxy).and_then(|b| b.ray_cast(input));
    ///     match hit {
    ///         Some(t) => {
    ///             closest = Some(proxy);
    ///             t
    ///         }
    ///         None => input.max_fraction,
    ///     }
    /// });
    /// assert_eq!(closest, Some(near));
    /// ```
    pub fn ray_cast<F>(&self, input: &RayCastInput, mut callback: F)
    where
        F: FnMut(&RayCastInput, ProxyId) -> f64,
    {
        let Some(root) = self.root else {
            return;
        };
        let mut sub_input = *input;
        let mut stack: NodeStack = smallvec![root];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if node.aabb.ray_cast(&sub_input).is_none() {
                continue;
            }
            match node.kind {
                Kind::Leaf { .. } => {
                    let value = callback(&sub_input, self.proxy_id(idx));
                    if value <= 0.0 {
                        return;
                    }
                    if value < sub_input.max_fraction {
                        sub_input.max_fraction = value;
                    }
                }
                Kind::Internal { child1, child2 } => {
                    stack.push(child1);
                    stack.push(child2);
                }
            }
        }
    }
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pair generation on top of [`DynamicTree`].
//!
//! [`BroadPhase`] remembers which proxies moved since the last call to
//! [`BroadPhase::update_pairs`]. Each update queries the tree once per moved
//! proxy and reports every overlapping pair once, in a deterministic order.

use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashSet;
use kurbo::Vec2;

use crate::config::TreeConfig;
use crate::error::{Result, TreeError};
use crate::store::ProxyId;
use crate::tree::DynamicTree;
use crate::types::{Aabb2D, RayCastInput};

/// An unordered pair of distinct proxies, stored with `a < b`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyPair {
    /// The smaller handle.
    pub a: ProxyId,
    /// The larger handle.
    pub b: ProxyId,
}

impl ProxyPair {
    /// Build a pair, ordering the handles.
    pub fn new(x: ProxyId, y: ProxyId) -> Self {
        if x <= y {
            Self { a: x, b: y }
        } else {
            Self { a: y, b: x }
        }
    }
}

/// Broad phase that turns tree overlaps into candidate pairs.
pub struct BroadPhase<U> {
    tree: DynamicTree<U>,
    /// Proxies to pair on the next update. Order is irrelevant since pairs are
    /// sorted before they are reported.
    move_buffer: HashSet<ProxyId>,
    pair_set: HashSet<ProxyPair>,
    pairs: Vec<ProxyPair>,
}

impl<U> fmt::Debug for BroadPhase<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadPhase")
            .field("tree", &self.tree)
            .field("move_buffer", &self.move_buffer.len())
            .field("pairs", &self.pairs.len())
            .finish_non_exhaustive()
    }
}

impl<U> Default for BroadPhase<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U> BroadPhase<U> {
    /// Create an empty broad phase with the default [`TreeConfig`].
    pub fn new() -> Self {
        Self::with_config(TreeConfig::default())
    }

    /// Create an empty broad phase whose tree uses `config`.
    pub fn with_config(config: TreeConfig) -> Self {
        Self {
            tree: DynamicTree::with_config(config),
            move_buffer: HashSet::new(),
            pair_set: HashSet::new(),
            pairs: Vec::new(),
        }
    }

    /// The underlying tree.
    pub fn tree(&self) -> &DynamicTree<U> {
        &self.tree
    }

    /// Create a proxy and schedule it for pairing.
    pub fn create_proxy(&mut self, aabb: Aabb2D, user_data: U) -> Result<ProxyId> {
        let proxy = self.tree.create_proxy(aabb, user_data)?;
        self.move_buffer.insert(proxy);
        Ok(proxy)
    }

    /// Destroy a proxy, returning its user data.
    pub fn destroy_proxy(&mut self, proxy: ProxyId) -> Result<U> {
        let user_data = self.tree.destroy_proxy(proxy)?;
        self.move_buffer.remove(&proxy);
        Ok(user_data)
    }

    /// Move a proxy. It is scheduled for pairing only if the tree had to
    /// reinsert it.
    pub fn move_proxy(
        &mut self,
        proxy: ProxyId,
        aabb: Aabb2D,
        displacement: Vec2,
    ) -> Result<()> {
        if self.tree.move_proxy(proxy, aabb, displacement)? {
            self.buffer_move(proxy);
        }
        Ok(())
    }

    /// Schedule a proxy for pairing without moving it.
    pub fn touch_proxy(&mut self, proxy: ProxyId) -> Result<()> {
        if !self.tree.is_alive(proxy) {
            tracing::warn!(?proxy, "touch of invalid proxy handle");
            return Err(TreeError::InvalidHandle(proxy));
        }
        self.buffer_move(proxy);
        Ok(())
    }

    fn buffer_move(&mut self, proxy: ProxyId) {
        self.move_buffer.insert(proxy);
    }

    /// Whether the fat AABBs of two live proxies overlap.
    pub fn test_overlap(&self, a: ProxyId, b: ProxyId) -> bool {
        match (self.tree.fat_aabb(a), self.tree.fat_aabb(b)) {
            (Some(fa), Some(fb)) => fa.overlaps(&fb),
            _ => false,
        }
    }

    /// Number of proxies waiting for the next [`update_pairs`](Self::update_pairs).
    pub fn move_count(&self) -> usize {
        self.move_buffer.len()
    }

    /// Report every pair whose fat AABBs overlap and at least one of which
    /// moved, then forget the moves.
    ///
    /// Pairs are reported once each, ordered by their handles.
    pub fn update_pairs<F>(&mut self, mut callback: F)
    where
        F: FnMut(&U, &U),
    {
        self.pair_set.clear();
        self.pairs.clear();
        let tree = &self.tree;
        let pair_set = &mut self.pair_set;
        let pairs = &mut self.pairs;
        for &query_proxy in &self.move_buffer {
            let Some(fat) = tree.fat_aabb(query_proxy) else {
                continue;
            };
            tree.query(&fat, |proxy| {
                if proxy != query_proxy {
                    let pair = ProxyPair::new(query_proxy, proxy);
                    if pair_set.insert(pair) {
                        pairs.push(pair);
                    }
                }
                true
            });
        }
        self.move_buffer.clear();
        self.pairs.sort_unstable();
        tracing::trace!(pairs = self.pairs.len(), "pairs updated");

        for pair in &self.pairs {
            let (a, b) = (self.tree.user_data(pair.a), self.tree.user_data(pair.b));
            if let (Some(a), Some(b)) = (a, b) {
                callback(a, b);
            }
        }
    }

    /// The pairs found by the most recent [`update_pairs`](Self::update_pairs).
    pub fn pairs(&self) -> &[ProxyPair] {
        &self.pairs
    }

    /// See [`DynamicTree::query`].
    pub fn query<F>(&self, aabb: &Aabb2D, callback: F)
    where
        F: FnMut(ProxyId) -> bool,
    {
        self.tree.query(aabb, callback);
    }

    /// See [`DynamicTree::ray_cast`].
    pub fn ray_cast<F>(&self, input: &RayCastInput, callback: F)
    where
        F: FnMut(&RayCastInput, ProxyId) -> f64,
    {
        self.tree.ray_cast(input, callback);
    }

    /// See [`DynamicTree::rebalance`].
    pub fn rebalance(&mut self, iterations: usize) {
        self.tree.rebalance(iterations);
    }

    /// See [`DynamicTree::fat_aabb`].
    pub fn fat_aabb(&self, proxy: ProxyId) -> Option<Aabb2D> {
        self.tree.fat_aabb(proxy)
    }

    /// See [`DynamicTree::user_data`].
    pub fn user_data(&self, proxy: ProxyId) -> Option<&U> {
        self.tree.user_data(proxy)
    }

    /// Number of live proxies.
    pub fn proxy_count(&self) -> usize {
        self.tree.proxy_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn unit(x: f64, y: f64) -> Aabb2D {
        Aabb2D::new(x, y, x + 1.0, y + 1.0)
    }

    fn collect_pairs(bp: &mut BroadPhase<char>) -> Vec<(char, char)> {
        let mut out = Vec::new();
        bp.update_pairs(|a, b| out.push(if a < b { (*a, *b) } else { (*b, *a) }));
        out.sort_unstable();
        out
    }

    #[test]
    fn new_proxies_pair_once() {
        let mut bp = BroadPhase::new();
        bp.create_proxy(unit(0.0, 0.0), 'a').unwrap();
        bp.create_proxy(unit(0.5, 0.5), 'b').unwrap();
        bp.create_proxy(unit(10.0, 10.0), 'c').unwrap();
        assert_eq!(bp.move_count(), 3);

        assert_eq!(collect_pairs(&mut bp), vec![('a', 'b')]);
        assert_eq!(bp.move_count(), 0);
        assert_eq!(bp.pairs().len(), 1);

        // Nothing moved, nothing reported.
        assert!(collect_pairs(&mut bp).is_empty(), "no moves, no pairs");
    }

    #[test]
    fn small_moves_are_not_buffered() {
        let mut bp = BroadPhase::new();
        let a = bp.create_proxy(unit(0.0, 0.0), 'a').unwrap();
        let _ = collect_pairs(&mut bp);
        bp.move_proxy(a, unit(0.05, 0.0), Vec2::new(0.05, 0.0))
            .unwrap();
        assert_eq!(bp.move_count(), 0);
        bp.move_proxy(a, unit(5.0, 0.0), Vec2::new(5.0, 0.0))
            .unwrap();
        assert_eq!(bp.move_count(), 1);
    }

    #[test]
    fn moved_proxy_finds_new_neighbor() {
        let mut bp = BroadPhase::new();
        let a = bp.create_proxy(unit(0.0, 0.0), 'a').unwrap();
        let _b = bp.create_proxy(unit(20.0, 0.0), 'b').unwrap();
        assert!(collect_pairs(&mut bp).is_empty(), "far apart");

        bp.move_proxy(a, unit(19.5, 0.0), Vec2::new(19.5, 0.0))
            .unwrap();
        assert_eq!(collect_pairs(&mut bp), vec![('a', 'b')]);
    }

    #[test]
    fn touch_and_destroy() {
        let mut bp = BroadPhase::new();
        let a = bp.create_proxy(unit(0.0, 0.0), 'a').unwrap();
        let b = bp.create_proxy(unit(0.5, 0.0), 'b').unwrap();
        let _ = collect_pairs(&mut bp);

        bp.touch_proxy(a).unwrap();
        bp.touch_proxy(a).unwrap();
        assert_eq!(bp.move_count(), 1);
        assert_eq!(collect_pairs(&mut bp), vec![('a', 'b')]);

        bp.touch_proxy(b).unwrap();
        assert_eq!(bp.destroy_proxy(b), Ok('b'));
        assert_eq!(bp.move_count(), 0);
        assert_eq!(bp.touch_proxy(b), Err(TreeError::InvalidHandle(b)));
        assert!(!bp.test_overlap(a, b), "dead proxies never overlap");
    }

    #[test]
    fn repeated_moves_buffer_each_proxy_once() {
        let mut bp = BroadPhase::new();
        let ids: Vec<_> = (0_u32..2000)
            .map(|i| {
                let x = f64::from(i) * 3.0;
                let label = char::from_digit(i % 10, 10).unwrap();
                bp.create_proxy(unit(x, 0.0), label).unwrap()
            })
            .collect();
        assert_eq!(bp.move_count(), 2000);
        let _ = collect_pairs(&mut bp);

        for step in 1..=3 {
            let dx = f64::from(step) * 5.0;
            for (&id, i) in ids.iter().zip(0_u32..) {
                let x = f64::from(i) * 3.0 + dx;
                bp.move_proxy(id, unit(x, 10.0), Vec2::new(5.0, 0.0))
                    .unwrap();
            }
        }
        assert_eq!(bp.move_count(), ids.len());

        for &id in &ids[..500] {
            bp.destroy_proxy(id).unwrap();
        }
        assert_eq!(bp.move_count(), 1500);
        bp.update_pairs(|_, _| {});
        assert_eq!(bp.move_count(), 0);
        assert!(
            bp.pairs().iter().all(|p| bp.test_overlap(p.a, p.b)),
            "only live overlapping pairs are reported"
        );
    }

    #[test]
    fn pairs_are_sorted_and_distinct() {
        let mut bp = BroadPhase::new();
        let ids: Vec<_> = (0..6)
            .map(|i| {
                let label = char::from(b'a' + i);
                bp.create_proxy(unit(f64::from(i) * 0.5, 0.0), label)
                    .unwrap()
            })
            .collect();
        bp.update_pairs(|_, _| {});
        let pairs = bp.pairs();
        assert!(
            pairs.windows(2).all(|w| w[0] < w[1]),
            "pairs are strictly increasing"
        );
        assert!(pairs.iter().all(|p| p.a < p.b), "pairs are ordered");
        for p in pairs {
            assert!(bp.test_overlap(p.a, p.b), "reported pairs overlap");
        }
        // Each fat box reaches the next two.
        assert_eq!(pairs.len(), 9);
        assert!(ids.iter().all(|&id| bp.fat_aabb(id).is_some()), "all alive");
    }
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Maintenance passes, quality metrics, and the structural self-check.

use smallvec::{SmallVec, smallvec};

use crate::store::{Node, NodeIdx};
use crate::tree::DynamicTree;

impl<U> DynamicTree<U> {
    /// Remove and reinsert up to `iterations` leaves.
    ///
    /// Leaves are visited in slot order from a cursor that persists across
    /// calls and wraps around, so after [`proxy_count`](Self::proxy_count)
    /// passes every proxy has been reinserted once. Local rotations keep the
    /// tree balanced; this recovers the box tightness that long sequences of
    /// moves erode.
    pub fn rebalance(&mut self, iterations: usize) {
        if self.proxy_count < 2 {
            return;
        }
        for _ in 0..iterations {
            let Some(leaf) = self.next_rebalance_leaf() else {
                break;
            };
            self.remove_leaf(leaf);
            self.insert_leaf(leaf);
        }
        tracing::trace!(
            iterations,
            height = self.height(),
            cursor = self.rebalance_cursor,
            "rebalance pass"
        );
    }

    fn next_rebalance_leaf(&mut self) -> Option<NodeIdx> {
        let capacity = self.nodes.capacity();
        for step in 0..capacity {
            let i = (self.rebalance_cursor + step) % capacity;
            let idx = NodeIdx::new(i);
            if self.nodes.get(idx).is_some_and(Node::is_leaf) {
                self.rebalance_cursor = (i + 1) % capacity;
                return Some(idx);
            }
        }
        None
    }

    /// Height of the root. Zero for an empty tree or a single proxy.
    pub fn height(&self) -> u32 {
        self.root.map_or(0, |r| self.nodes[r].height)
    }

    /// Largest height difference between the two children of any node.
    pub fn max_balance(&self) -> u32 {
        self.nodes
            .iter()
            .filter_map(|(_, n)| n.children())
            .map(|(c1, c2)| self.nodes[c1].height.abs_diff(self.nodes[c2].height))
            .max()
            .unwrap_or(0)
    }

    /// Sum of internal-node perimeters divided by the root perimeter.
    ///
    /// Lower is better. Returns `0.0` for an empty tree, a single proxy, or a
    /// root with zero perimeter.
    pub fn perimeter_ratio(&self) -> f64 {
        let Some(root) = self.root else {
            return 0.0;
        };
        let root_perimeter = self.nodes[root].aabb.perimeter();
        if root_perimeter <= 0.0 {
            return 0.0;
        }
        let total: f64 = self
            .nodes
            .iter()
            .filter(|(_, n)| !n.is_leaf())
            .map(|(_, n)| n.aabb.perimeter())
            .sum();
        total / root_perimeter
    }

    /// Check every structural invariant, panicking with the name of the first
    /// one that fails.
    ///
    /// This walks the whole tree and the free list, so it is meant for tests
    /// and debugging.
    pub fn validate(&self) {
        let Some(root) = self.root else {
            assert_eq!(self.proxy_count, 0, "empty tree reports live proxies");
            assert_eq!(self.nodes.len(), 0, "empty tree holds nodes");
            self.validate_free_list();
            return;
        };
        assert!(self.nodes[root].parent.is_none(), "root has a parent");

        let mut visited = 0_usize;
        let mut leaves = 0_usize;
        let mut stack: SmallVec<[NodeIdx; 64]> = smallvec![root];
        while let Some(idx) = stack.pop() {
            visited += 1;
            assert!(
                visited <= self.nodes.len(),
                "cycle: traversal visited more nodes than are allocated"
            );
            let node = &self.nodes[idx];
            match node.children() {
                None => {
                    leaves += 1;
                    assert_eq!(node.height, 0, "leaf height is not zero");
                    let tight = node.tight().copied();
                    assert!(
                        tight.is_some_and(|t| node.aabb.contains(&t)),
                        "fat AABB of leaf {idx:?} does not contain its tight AABB"
                    );
                }
                Some((c1, c2)) => {
                    assert_ne!(c1, c2, "internal node {idx:?} has the same child twice");
                    let (a, b) = (&self.nodes[c1], &self.nodes[c2]);
                    assert_eq!(a.parent, Some(idx), "child1 parent link broken");
                    assert_eq!(b.parent, Some(idx), "child2 parent link broken");
                    assert_eq!(
                        node.height,
                        1 + a.height.max(b.height),
                        "height of {idx:?} is not 1 + max(child heights)"
                    );
                    assert!(
                        a.height.abs_diff(b.height) <= 1,
                        "AVL balance violated at {idx:?}"
                    );
                    assert!(
                        node.aabb.contains(&a.aabb.union(&b.aabb)),
                        "AABB of {idx:?} does not enclose its children"
                    );
                    stack.push(c1);
                    stack.push(c2);
                }
            }
        }

        assert_eq!(visited, self.nodes.len(), "allocated nodes unreachable from root");
        assert_eq!(leaves, self.proxy_count, "leaf count mismatch");
        assert_eq!(visited, 2 * leaves - 1, "node count is not 2k - 1");
        self.validate_free_list();
    }

    fn validate_free_list(&self) {
        assert_eq!(
            self.nodes.free_list_len(),
            self.nodes.free_len(),
            "free list does not cover every vacant slot"
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::store::NodeIdx;
    use crate::{Aabb2D, DynamicTree};
    use alloc::vec::Vec;
    use kurbo::Vec2;

    #[test]
    fn rebalance_keeps_invariants_and_handles() {
        let mut tree = DynamicTree::new();
        let ids: Vec<_> = (0_u32..32)
            .map(|i| {
                let x = f64::from(i % 8) * 3.0;
                let y = f64::from(i / 8) * 3.0;
                tree.create_proxy(Aabb2D::new(x, y, x + 1.0, y + 1.0), i)
                    .unwrap()
            })
            .collect();
        tree.rebalance(100);
        tree.validate();
        for (id, i) in ids.iter().zip(0_u32..) {
            assert_eq!(tree.user_data(*id).copied(), Some(i));
        }
    }

    #[test]
    fn rebalance_cursor_visits_every_leaf_once_per_lap() {
        let mut tree = DynamicTree::new();
        let ids: Vec<_> = (0_u32..7)
            .map(|i| {
                let x = f64::from(i) * 2.0;
                tree.create_proxy(Aabb2D::new(x, 0.0, x + 0.5, 0.5), i)
                    .unwrap()
            })
            .collect();
        // Leave a hole so the scan has vacant slots to skip.
        tree.destroy_proxy(ids[2]).unwrap();
        let capacity = tree.nodes.capacity();

        let mut live: Vec<_> = tree.proxies().collect();
        live.sort();
        for lap in 0..3 {
            let mut picked = Vec::new();
            for _ in 0..tree.proxy_count() {
                tree.rebalance(1);
                assert!(tree.rebalance_cursor < capacity, "cursor stays in range");
                // The cursor sits one past the slot it just reinserted.
                let slot = (tree.rebalance_cursor + capacity - 1) % capacity;
                let leaf = tree.proxy_id(NodeIdx::new(slot));
                assert!(tree.is_alive(leaf), "lap {lap}: picked a non-leaf slot");
                picked.push(leaf);
            }
            picked.sort();
            assert_eq!(picked, live, "lap {lap} reinserts each leaf exactly once");
            tree.validate();
        }
        assert_eq!(tree.nodes.capacity(), capacity, "rebalancing never grows");
    }

    #[test]
    fn rebalance_on_tiny_trees_is_noop() {
        let mut tree: DynamicTree<()> = DynamicTree::new();
        tree.rebalance(10);
        let a = tree
            .create_proxy(Aabb2D::new(0.0, 0.0, 1.0, 1.0), ())
            .unwrap();
        tree.rebalance(10);
        assert!(tree.is_alive(a), "single proxy survives");
        tree.validate();
    }

    #[test]
    fn perimeter_ratio_of_two_leaves() {
        let mut tree = DynamicTree::new();
        assert_eq!(tree.perimeter_ratio(), 0.0);
        tree.create_proxy(Aabb2D::new(0.0, 0.0, 1.0, 1.0), ())
            .unwrap();
        assert_eq!(tree.perimeter_ratio(), 0.0);
        tree.create_proxy(Aabb2D::new(4.0, 0.0, 5.0, 1.0), ())
            .unwrap();
        // Only the root is internal.
        assert_eq!(tree.perimeter_ratio(), 1.0);
        assert_eq!(tree.max_balance(), 0);
        assert_eq!(tree.height(), 1);
    }

    #[test]
    fn drifting_moves_then_rebalance() {
        let mut tree = DynamicTree::new();
        let ids: Vec<_> = (0_u32..40)
            .map(|i| {
                let x = f64::from(i) * 2.0;
                tree.create_proxy(Aabb2D::new(x, 0.0, x + 1.0, 1.0), ())
                    .unwrap()
            })
            .collect();
        for step in 0..20 {
            let t = f64::from(step) * 0.5;
            for (id, i) in ids.iter().zip(0_u32..) {
                let x = f64::from(i) * 2.0 + t;
                let y = if i % 2 == 0 { t } else { -t };
                let aabb = Aabb2D::new(x, y, x + 1.0, y + 1.0);
                tree.move_proxy(*id, aabb, Vec2::new(0.5, 0.5)).unwrap();
            }
            tree.validate();
        }
        let before = tree.perimeter_ratio();
        tree.rebalance(tree.proxy_count());
        tree.validate();
        assert!(tree.perimeter_ratio().is_finite(), "ratio is finite");
        assert!(before > 0.0, "populated tree has a positive ratio");
    }
}

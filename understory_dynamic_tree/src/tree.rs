// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The dynamic AABB tree: proxy lifecycle, leaf insertion and removal, and
//! AVL-style rotations.

use core::fmt;

use kurbo::Vec2;

use crate::config::TreeConfig;
use crate::error::{Result, TreeError};
use crate::store::{Kind, Node, NodeIdx, NodeStore, ProxyId};
use crate::types::Aabb2D;

/// A dynamic AABB tree over proxies carrying user data `U`.
///
/// Each proxy is a leaf storing a *fat* AABB: the caller's tight AABB grown by
/// [`TreeConfig::aabb_margin`]. Small motions that stay inside the fat AABB
/// leave the tree untouched. Internal nodes always have two children and an
/// AABB enclosing both, and sibling heights never differ by more than one.
///
/// New leaves are placed by a greedy perimeter-cost descent. The cost decides
/// which child to descend into at every level, but a leaf is only paired with
/// a node of height zero or one. A leaf far from everything else therefore
/// still lands near the bottom of the tree instead of being paired with a
/// large subtree near the root. Rotations on the way up restore balance.
///
/// Callbacks passed to [`query`](Self::query) and
/// [`ray_cast`](Self::ray_cast) run while the tree is borrowed, so they
/// cannot mutate it. Collect handles and apply changes afterwards.
#[derive(Clone)]
pub struct DynamicTree<U> {
    pub(crate) nodes: NodeStore<U>,
    pub(crate) root: Option<NodeIdx>,
    pub(crate) config: TreeConfig,
    pub(crate) proxy_count: usize,
    /// Slot index the next rebalance pass starts scanning from.
    pub(crate) rebalance_cursor: usize,
}

impl<U> fmt::Debug for DynamicTree<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicTree")
            .field("proxy_count", &self.proxy_count)
            .field("node_count", &self.nodes.len())
            .field("capacity", &self.nodes.capacity())
            .field("height", &self.height())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<U> Default for DynamicTree<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U> DynamicTree<U> {
    /// Create an empty tree with the default [`TreeConfig`].
    pub fn new() -> Self {
        Self::with_config(TreeConfig::default())
    }

    /// Create an empty tree with the given configuration.
    ///
    /// Out-of-range settings fall back to their defaults
    /// (see [`TreeConfig::sanitized`]).
    pub fn with_config(config: TreeConfig) -> Self {
        let config = config.sanitized();
        Self {
            nodes: NodeStore::new(config.initial_capacity),
            root: None,
            config,
            proxy_count: 0,
            rebalance_cursor: 0,
        }
    }

    /// The configuration in effect.
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Insert a proxy for `aabb` and return its handle.
    ///
    /// The stored fat AABB is `aabb` grown by the configured margin. The only
    /// failure is [`TreeError::Exhausted`], in which case the tree is unchanged.
    pub fn create_proxy(&mut self, aabb: Aabb2D, user_data: U) -> Result<ProxyId> {
        debug_assert!(aabb.is_valid(), "create_proxy: invalid AABB {aabb:?}");
        // One slot for the leaf and one for the parent that pairs it.
        self.nodes.reserve(2)?;
        let fat = self.config.fatten(&aabb);
        let leaf = self.nodes.allocate(Node::leaf(fat, aabb, user_data))?;
        self.insert_leaf(leaf);
        self.proxy_count += 1;
        Ok(self.proxy_id(leaf))
    }

    /// Remove a proxy and hand back its user data.
    pub fn destroy_proxy(&mut self, proxy: ProxyId) -> Result<U> {
        let leaf = self.leaf_or_err(proxy)?;
        self.remove_leaf(leaf);
        self.proxy_count -= 1;
        self.nodes
            .free(leaf)
            .and_then(Node::into_user_data)
            .ok_or(TreeError::InvalidHandle(proxy))
    }

    /// Report a new tight AABB and the displacement since the last update.
    ///
    /// Returns `Ok(false)` when the stored fat AABB still contains `aabb`; the
    /// tree structure is untouched in that case. Otherwise the leaf is
    /// reinserted with a fresh fat AABB, stretched along `displacement`, and
    /// `Ok(true)` is returned.
    ///
    /// `displacement` must be finite. Debug builds assert on it; release
    /// builds drop the stretch and use the plain margin.
    pub fn move_proxy(
        &mut self,
        proxy: ProxyId,
        aabb: Aabb2D,
        displacement: Vec2,
    ) -> Result<bool> {
        let leaf = self.leaf_or_err(proxy)?;
        debug_assert!(aabb.is_valid(), "move_proxy: invalid AABB {aabb:?}");
        debug_assert!(
            displacement.is_finite(),
            "move_proxy: non-finite displacement {displacement:?}"
        );
        let node = &mut self.nodes[leaf];
        if let Kind::Leaf { tight, .. } = &mut node.kind {
            *tight = aabb;
        }
        if node.aabb.contains(&aabb) {
            return Ok(false);
        }

        self.remove_leaf(leaf);
        self.nodes[leaf].aabb = self.config.predict(&aabb, displacement);
        self.insert_leaf(leaf);
        tracing::trace!(?proxy, "proxy reinserted");
        Ok(true)
    }

    /// Whether `proxy` names a live proxy.
    pub fn is_alive(&self, proxy: ProxyId) -> bool {
        self.resolve(proxy).is_some()
    }

    /// The stored fat AABB of a live proxy.
    pub fn fat_aabb(&self, proxy: ProxyId) -> Option<Aabb2D> {
        self.resolve(proxy).map(|i| self.nodes[i].aabb)
    }

    /// The most recent tight AABB supplied for a live proxy.
    pub fn tight_aabb(&self, proxy: ProxyId) -> Option<Aabb2D> {
        self.resolve(proxy).and_then(|i| self.nodes[i].tight().copied())
    }

    /// User data of a live proxy.
    pub fn user_data(&self, proxy: ProxyId) -> Option<&U> {
        self.resolve(proxy).and_then(|i| self.nodes[i].user_data())
    }

    /// Mutable user data of a live proxy.
    pub fn user_data_mut(&mut self, proxy: ProxyId) -> Option<&mut U> {
        let leaf = self.resolve(proxy)?;
        self.nodes[leaf].user_data_mut()
    }

    /// The root's AABB, enclosing every fat AABB. `None` for an empty tree.
    pub fn bounds(&self) -> Option<Aabb2D> {
        self.root.map(|r| self.nodes[r].aabb)
    }

    /// Number of live proxies.
    pub fn proxy_count(&self) -> usize {
        self.proxy_count
    }

    /// Number of nodes in the tree, internal nodes included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree holds no proxies.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Handles of all live proxies, in slot order.
    pub fn proxies(&self) -> impl Iterator<Item = ProxyId> + '_ {
        self.nodes
            .iter()
            .filter(|(_, n)| n.is_leaf())
            .map(|(i, _)| self.proxy_id(i))
    }

    /// Remove every proxy. Outstanding handles become invalid.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
        self.proxy_count = 0;
        self.rebalance_cursor = 0;
    }

    /// Translate every stored AABB by `-new_origin`.
    ///
    /// Use this when recentering a large world; the structure is unchanged.
    pub fn shift_origin(&mut self, new_origin: Vec2) {
        let offset = -new_origin;
        for node in self.nodes.iter_mut() {
            node.aabb = node.aabb.translate(offset);
            if let Kind::Leaf { tight, .. } = &mut node.kind {
                *tight = tight.translate(offset);
            }
        }
    }

    pub(crate) fn proxy_id(&self, idx: NodeIdx) -> ProxyId {
        ProxyId::new(idx, self.nodes.generation(idx))
    }

    /// The leaf named by `proxy`, if it is live.
    pub(crate) fn resolve(&self, proxy: ProxyId) -> Option<NodeIdx> {
        let idx = self.nodes.resolve(proxy)?;
        self.nodes[idx].is_leaf().then_some(idx)
    }

    fn leaf_or_err(&self, proxy: ProxyId) -> Result<NodeIdx> {
        self.resolve(proxy).ok_or_else(|| {
            tracing::warn!(?proxy, "invalid proxy handle");
            TreeError::InvalidHandle(proxy)
        })
    }

    /// Attach a detached leaf to the tree.
    ///
    /// Requires one vacant slot in the store when the tree is non-empty.
    pub(crate) fn insert_leaf(&mut self, leaf: NodeIdx) {
        let Some(root) = self.root else {
            self.nodes[leaf].parent = None;
            self.root = Some(leaf);
            return;
        };

        let leaf_aabb = self.nodes[leaf].aabb;
        let sibling = self.pick_sibling(root, &leaf_aabb);
        let sibling_node = &self.nodes[sibling];
        let old_parent = sibling_node.parent;
        let new_parent = Node {
            aabb: leaf_aabb.union(&sibling_node.aabb),
            parent: old_parent,
            height: sibling_node.height + 1,
            kind: Kind::Internal {
                child1: sibling,
                child2: leaf,
            },
        };
        let new_parent = self
            .nodes
            .allocate(new_parent)
            .expect("dynamic tree invariant violated: no slot reserved for insertion");

        match old_parent {
            Some(p) => self.nodes[p].replace_child(sibling, new_parent),
            None => self.root = Some(new_parent),
        }
        self.nodes[sibling].parent = Some(new_parent);
        self.nodes[leaf].parent = Some(new_parent);

        self.fix_upwards(old_parent);
    }

    /// Descend from `root` to the node the new leaf should be paired with.
    ///
    /// At each internal node, compare the cost of pairing here against the
    /// cheapest descent. Descending charges the growth of this node's box to
    /// every level below. Pairing is only allowed at nodes of height at most
    /// one so the new parent never starts out unbalanced.
    fn pick_sibling(&self, root: NodeIdx, leaf_aabb: &Aabb2D) -> NodeIdx {
        let mut index = root;
        while let Some((child1, child2)) = self.nodes[index].children() {
            let node = &self.nodes[index];
            let perimeter = node.aabb.perimeter();
            let combined = node.aabb.union(leaf_aabb).perimeter();

            let cost = 2.0 * combined;
            let inheritance = 2.0 * (combined - perimeter);
            let cost1 = self.descent_cost(child1, leaf_aabb) + inheritance;
            let cost2 = self.descent_cost(child2, leaf_aabb) + inheritance;

            if node.height <= 1 && cost < cost1 && cost < cost2 {
                break;
            }
            index = if cost1 <= cost2 { child1 } else { child2 };
        }
        index
    }

    fn descent_cost(&self, child: NodeIdx, leaf_aabb: &Aabb2D) -> f64 {
        let node = &self.nodes[child];
        let enlarged = node.aabb.union(leaf_aabb).perimeter();
        if node.is_leaf() {
            enlarged
        } else {
            enlarged - node.aabb.perimeter()
        }
    }

    /// Detach a leaf from the tree, freeing its parent. The leaf slot stays
    /// occupied.
    pub(crate) fn remove_leaf(&mut self, leaf: NodeIdx) {
        if self.root == Some(leaf) {
            self.root = None;
            return;
        }
        let parent = self.nodes[leaf]
            .parent
            .expect("dynamic tree invariant violated: non-root leaf without parent");
        let sibling = self.nodes[parent]
            .sibling_of(leaf)
            .expect("dynamic tree invariant violated: leaf missing from parent");
        let grandparent = self.nodes[parent].parent;

        self.nodes[sibling].parent = grandparent;
        match grandparent {
            Some(g) => self.nodes[g].replace_child(parent, sibling),
            None => self.root = Some(sibling),
        }
        self.nodes.free(parent);
        self.nodes[leaf].parent = None;

        self.fix_upwards(grandparent);
    }

    /// Rebalance and refit every node from `start` up to the root.
    fn fix_upwards(&mut self, start: Option<NodeIdx>) {
        let mut cursor = start;
        while let Some(idx) = cursor {
            let idx = self.balance(idx);
            self.refit(idx);
            cursor = self.nodes[idx].parent;
        }
    }

    /// Recompute an internal node's AABB and height from its children.
    fn refit(&mut self, idx: NodeIdx) {
        let Some((c1, c2)) = self.nodes[idx].children() else {
            return;
        };
        let (a, b) = (&self.nodes[c1], &self.nodes[c2]);
        let aabb = a.aabb.union(&b.aabb);
        let height = 1 + a.height.max(b.height);
        let node = &mut self.nodes[idx];
        node.aabb = aabb;
        node.height = height;
    }

    /// Rotate at `a` if its children's heights differ by more than one.
    ///
    /// Returns the node now occupying `a`'s position.
    pub(crate) fn balance(&mut self, a: NodeIdx) -> NodeIdx {
        let Some((b, c)) = self.nodes[a].children() else {
            return a;
        };
        let hb = self.nodes[b].height;
        let hc = self.nodes[c].height;
        if hc > hb + 1 {
            self.rotate_up(a, c)
        } else if hb > hc + 1 {
            self.rotate_up(a, b)
        } else {
            a
        }
    }

    /// Promote child `p` of `a` into `a`'s place.
    ///
    /// `p` adopts `a` and keeps its taller child (the second one on ties);
    /// its other child moves under `a` where `p` used to be.
    fn rotate_up(&mut self, a: NodeIdx, p: NodeIdx) -> NodeIdx {
        let (f, g) = self.nodes[p]
            .children()
            .expect("dynamic tree invariant violated: taller child is a leaf");
        let (keep, give) = if self.nodes[f].height > self.nodes[g].height {
            (f, g)
        } else {
            (g, f)
        };

        let grandparent = self.nodes[a].parent;
        self.nodes[p].parent = grandparent;
        match grandparent {
            Some(gp) => self.nodes[gp].replace_child(a, p),
            None => self.root = Some(p),
        }

        self.nodes[p].kind = Kind::Internal {
            child1: a,
            child2: keep,
        };
        self.nodes[a].parent = Some(p);
        self.nodes[a].replace_child(p, give);
        self.nodes[give].parent = Some(a);

        self.refit(a);
        self.refit(p);
        tracing::trace!(
            promoted = p.get(),
            demoted = a.get(),
            height = self.nodes[p].height,
            "rotated"
        );
        p
    }
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Slot storage for tree nodes with an intrusive free list.
//!
//! Every slot is either occupied by a [`Node`] or vacant, and vacant slots are
//! threaded into a singly linked free list through their `next_free` field.
//! Each slot carries a generation that is bumped whenever the slot is freed, so
//! a [`ProxyId`] taken before the free can never resolve to a later occupant.

use alloc::vec::Vec;
use core::ops::{Index, IndexMut};
use core::{fmt, mem};

use crate::error::{Result, TreeError};
use crate::types::Aabb2D;

/// Largest number of slots a store may hold.
const MAX_SLOTS: usize = u32::MAX as usize;

/// Index of a node slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct NodeIdx(u32);

impl NodeIdx {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Slot counts are capped at MAX_SLOTS by NodeStore::grow."
    )]
    pub(crate) const fn new(idx: usize) -> Self {
        Self(idx as u32)
    }

    pub(crate) const fn get(self) -> usize {
        self.0 as usize
    }
}

/// Generational handle of a proxy (a leaf of the tree).
///
/// Handles stay valid until the proxy is destroyed. After that, every accessor
/// treats them as absent and every mutator rejects them with
/// [`TreeError::InvalidHandle`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyId(u32, u32);

impl ProxyId {
    pub(crate) const fn new(idx: NodeIdx, generation: u32) -> Self {
        Self(idx.0, generation)
    }

    pub(crate) const fn node(self) -> NodeIdx {
        NodeIdx(self.0)
    }

    /// Slot index of the proxy. Stable for the proxy's lifetime.
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Generation of the slot when the proxy was created.
    pub const fn generation(self) -> u32 {
        self.1
    }
}

impl fmt::Debug for ProxyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProxyId({}v{})", self.0, self.1)
    }
}

/// Shape-specific part of a node.
#[derive(Clone, Debug)]
pub(crate) enum Kind<U> {
    Leaf {
        /// Most recent tight AABB supplied by the caller.
        tight: Aabb2D,
        user_data: U,
    },
    Internal {
        child1: NodeIdx,
        child2: NodeIdx,
    },
}

/// A tree node. Leaves have height 0.
#[derive(Clone, Debug)]
pub(crate) struct Node<U> {
    /// Fat AABB for leaves, union of the children for internal nodes.
    pub(crate) aabb: Aabb2D,
    pub(crate) parent: Option<NodeIdx>,
    pub(crate) height: u32,
    pub(crate) kind: Kind<U>,
}

impl<U> Node<U> {
    pub(crate) fn leaf(fat: Aabb2D, tight: Aabb2D, user_data: U) -> Self {
        Self {
            aabb: fat,
            parent: None,
            height: 0,
            kind: Kind::Leaf { tight, user_data },
        }
    }

    #[inline]
    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self.kind, Kind::Leaf { .. })
    }

    #[inline]
    pub(crate) fn children(&self) -> Option<(NodeIdx, NodeIdx)> {
        match self.kind {
            Kind::Internal { child1, child2 } => Some((child1, child2)),
            Kind::Leaf { .. } => None,
        }
    }

    /// The child that is not `child`.
    pub(crate) fn sibling_of(&self, child: NodeIdx) -> Option<NodeIdx> {
        let (c1, c2) = self.children()?;
        if c1 == child {
            Some(c2)
        } else if c2 == child {
            Some(c1)
        } else {
            None
        }
    }

    /// Swap child `old` for `new`, keeping its slot (first or second).
    pub(crate) fn replace_child(&mut self, old: NodeIdx, new: NodeIdx) {
        if let Kind::Internal { child1, child2 } = &mut self.kind {
            if *child1 == old {
                *child1 = new;
            } else {
                debug_assert_eq!(*child2, old, "replace_child: {old:?} is not a child");
                *child2 = new;
            }
        }
    }

    pub(crate) fn tight(&self) -> Option<&Aabb2D> {
        match &self.kind {
            Kind::Leaf { tight, .. } => Some(tight),
            Kind::Internal { .. } => None,
        }
    }

    pub(crate) fn user_data(&self) -> Option<&U> {
        match &self.kind {
            Kind::Leaf { user_data, .. } => Some(user_data),
            Kind::Internal { .. } => None,
        }
    }

    pub(crate) fn user_data_mut(&mut self) -> Option<&mut U> {
        match &mut self.kind {
            Kind::Leaf { user_data, .. } => Some(user_data),
            Kind::Internal { .. } => None,
        }
    }

    pub(crate) fn into_user_data(self) -> Option<U> {
        match self.kind {
            Kind::Leaf { user_data, .. } => Some(user_data),
            Kind::Internal { .. } => None,
        }
    }
}

#[derive(Clone, Debug)]
enum Slot<U> {
    Occupied(Node<U>),
    Vacant { next_free: Option<NodeIdx> },
}

#[derive(Clone, Debug)]
struct Entry<U> {
    generation: u32,
    slot: Slot<U>,
}

/// Growable array of node slots.
#[derive(Clone)]
pub(crate) struct NodeStore<U> {
    entries: Vec<Entry<U>>,
    free_head: Option<NodeIdx>,
    len: usize,
    initial_capacity: usize,
}

impl<U> fmt::Debug for NodeStore<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeStore")
            .field("len", &self.len)
            .field("capacity", &self.entries.len())
            .field("free_head", &self.free_head)
            .finish_non_exhaustive()
    }
}

impl<U> NodeStore<U> {
    pub(crate) const fn new(initial_capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            free_head: None,
            len: 0,
            initial_capacity,
        }
    }

    /// Number of occupied slots.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Number of slots, occupied or vacant.
    pub(crate) fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of vacant slots.
    pub(crate) fn free_len(&self) -> usize {
        self.entries.len() - self.len
    }

    /// Grow until at least `n` slots are vacant.
    pub(crate) fn reserve(&mut self, n: usize) -> Result<()> {
        while self.free_len() < n {
            self.grow()?;
        }
        Ok(())
    }

    /// Double the slot count (or allocate the initial block) and link the new
    /// slots onto the free list in ascending order.
    fn grow(&mut self) -> Result<()> {
        let old = self.entries.len();
        if old >= MAX_SLOTS {
            return Err(TreeError::Exhausted);
        }
        let new = if old == 0 {
            self.initial_capacity.max(1)
        } else {
            old.saturating_mul(2)
        }
        .min(MAX_SLOTS);
        self.entries.reserve_exact(new - old);
        for i in old..new {
            let next_free = if i + 1 < new {
                Some(NodeIdx::new(i + 1))
            } else {
                self.free_head
            };
            self.entries.push(Entry {
                generation: 0,
                slot: Slot::Vacant { next_free },
            });
        }
        self.free_head = Some(NodeIdx::new(old));
        tracing::debug!(from = old, to = new, "node store grew");
        Ok(())
    }

    /// Place `node` in the first vacant slot, growing if none is left.
    pub(crate) fn allocate(&mut self, node: Node<U>) -> Result<NodeIdx> {
        if self.free_head.is_none() {
            self.grow()?;
        }
        let idx = self.free_head.ok_or(TreeError::Exhausted)?;
        let entry = &mut self.entries[idx.get()];
        let Slot::Vacant { next_free } = entry.slot else {
            unreachable!("node store invariant violated: free list names occupied slot {idx:?}");
        };
        entry.slot = Slot::Occupied(node);
        self.free_head = next_free;
        self.len += 1;
        Ok(idx)
    }

    /// Vacate `idx`, returning its node and invalidating outstanding handles.
    ///
    /// Freeing a vacant slot is a logic error: it asserts in debug builds and
    /// returns `None` without touching the store otherwise.
    pub(crate) fn free(&mut self, idx: NodeIdx) -> Option<Node<U>> {
        debug_assert!(
            self.get(idx).is_some(),
            "node store: freeing vacant slot {idx:?}"
        );
        let entry = self.entries.get_mut(idx.get())?;
        if !matches!(entry.slot, Slot::Occupied(_)) {
            return None;
        }
        let slot = mem::replace(
            &mut entry.slot,
            Slot::Vacant {
                next_free: self.free_head,
            },
        );
        entry.generation = entry.generation.wrapping_add(1);
        self.free_head = Some(idx);
        self.len -= 1;
        match slot {
            Slot::Occupied(node) => Some(node),
            Slot::Vacant { .. } => None,
        }
    }

    /// Vacate every slot. Generations advance so old handles stay dead.
    pub(crate) fn clear(&mut self) {
        let n = self.entries.len();
        for (i, entry) in self.entries.iter_mut().enumerate() {
            if matches!(entry.slot, Slot::Occupied(_)) {
                entry.generation = entry.generation.wrapping_add(1);
            }
            entry.slot = Slot::Vacant {
                next_free: (i + 1 < n).then_some(NodeIdx::new(i + 1)),
            };
        }
        self.free_head = (n > 0).then_some(NodeIdx::new(0));
        self.len = 0;
    }

    #[inline]
    pub(crate) fn get(&self, idx: NodeIdx) -> Option<&Node<U>> {
        match &self.entries.get(idx.get())?.slot {
            Slot::Occupied(node) => Some(node),
            Slot::Vacant { .. } => None,
        }
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, idx: NodeIdx) -> Option<&mut Node<U>> {
        match &mut self.entries.get_mut(idx.get())?.slot {
            Slot::Occupied(node) => Some(node),
            Slot::Vacant { .. } => None,
        }
    }

    /// Current generation of slot `idx`.
    #[inline]
    pub(crate) fn generation(&self, idx: NodeIdx) -> u32 {
        self.entries.get(idx.get()).map_or(0, |e| e.generation)
    }

    /// The occupied slot named by `proxy`, if its generation still matches.
    pub(crate) fn resolve(&self, proxy: ProxyId) -> Option<NodeIdx> {
        let idx = proxy.node();
        let entry = self.entries.get(idx.get())?;
        (entry.generation == proxy.generation() && matches!(entry.slot, Slot::Occupied(_)))
            .then_some(idx)
    }

    /// Occupied slots in index order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (NodeIdx, &Node<U>)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| match &e.slot {
                Slot::Occupied(node) => Some((NodeIdx::new(i), node)),
                Slot::Vacant { .. } => None,
            })
    }

    /// Occupied nodes in index order, mutably.
    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Node<U>> + '_ {
        self.entries.iter_mut().filter_map(|e| match &mut e.slot {
            Slot::Occupied(node) => Some(node),
            Slot::Vacant { .. } => None,
        })
    }

    /// Length of the free list, walked link by link.
    pub(crate) fn free_list_len(&self) -> usize {
        let mut n = 0;
        let mut cursor = self.free_head;
        while let Some(idx) = cursor {
            let Some(Entry {
                slot: Slot::Vacant { next_free },
                ..
            }) = self.entries.get(idx.get())
            else {
                break;
            };
            n += 1;
            if n > self.entries.len() {
                break;
            }
            cursor = *next_free;
        }
        n
    }
}

impl<U> Index<NodeIdx> for NodeStore<U> {
    type Output = Node<U>;

    #[inline]
    fn index(&self, idx: NodeIdx) -> &Node<U> {
        self.get(idx)
            .expect("node store invariant violated: vacant slot reached from the tree")
    }
}

impl<U> IndexMut<NodeIdx> for NodeStore<U> {
    #[inline]
    fn index_mut(&mut self, idx: NodeIdx) -> &mut Node<U> {
        self.get_mut(idx)
            .expect("node store invariant violated: vacant slot reached from the tree")
    }
}

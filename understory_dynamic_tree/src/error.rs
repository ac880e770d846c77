// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error type for fallible tree mutations.

use crate::store::ProxyId;

/// Errors reported by [`DynamicTree`](crate::DynamicTree) and
/// [`BroadPhase`](crate::BroadPhase) mutators.
///
/// A mutator that returns an error leaves the tree exactly as it was.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// The handle is stale (its proxy was destroyed) or never named a proxy.
    #[error("proxy {0:?} does not refer to a live proxy")]
    InvalidHandle(ProxyId),
    /// The node store cannot grow past `u32::MAX` slots.
    #[error("node store exhausted")]
    Exhausted,
}

/// Convenience alias for results carrying a [`TreeError`].
pub type Result<T, E = TreeError> = core::result::Result<T, E>;

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tuning knobs for fat-AABB enlargement and storage.

use kurbo::Vec2;

use crate::types::Aabb2D;

/// Configuration for a [`DynamicTree`](crate::DynamicTree).
///
/// The defaults match the classic broad-phase constants: a margin of `0.1`
/// length units and a displacement multiplier of `2.0`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TreeConfig {
    /// Distance added on every side of a tight AABB to form the stored fat AABB.
    pub aabb_margin: f64,
    /// Scale applied to a displacement hint when predicting motion.
    pub displacement_multiplier: f64,
    /// Node slots allocated on first use. Later growth doubles the store.
    pub initial_capacity: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeConfig {
    /// Default value of [`TreeConfig::aabb_margin`].
    pub const DEFAULT_AABB_MARGIN: f64 = 0.1;
    /// Default value of [`TreeConfig::displacement_multiplier`].
    pub const DEFAULT_DISPLACEMENT_MULTIPLIER: f64 = 2.0;
    /// Default value of [`TreeConfig::initial_capacity`].
    pub const DEFAULT_INITIAL_CAPACITY: usize = 16;

    /// Configuration with default values.
    pub const fn new() -> Self {
        Self {
            aabb_margin: Self::DEFAULT_AABB_MARGIN,
            displacement_multiplier: Self::DEFAULT_DISPLACEMENT_MULTIPLIER,
            initial_capacity: Self::DEFAULT_INITIAL_CAPACITY,
        }
    }

    /// Set the fat-AABB margin.
    pub const fn with_aabb_margin(mut self, margin: f64) -> Self {
        self.aabb_margin = margin;
        self
    }

    /// Set the displacement multiplier.
    pub const fn with_displacement_multiplier(mut self, multiplier: f64) -> Self {
        self.displacement_multiplier = multiplier;
        self
    }

    /// Set the initial node capacity.
    pub const fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Replace out-of-range values with their defaults.
    ///
    /// Margins and multipliers must be finite and non-negative; the capacity
    /// must be non-zero.
    pub fn sanitized(self) -> Self {
        let usable = |v: f64| v.is_finite() && v >= 0.0;
        Self {
            aabb_margin: if usable(self.aabb_margin) {
                self.aabb_margin
            } else {
                Self::DEFAULT_AABB_MARGIN
            },
            displacement_multiplier: if usable(self.displacement_multiplier) {
                self.displacement_multiplier
            } else {
                Self::DEFAULT_DISPLACEMENT_MULTIPLIER
            },
            initial_capacity: if self.initial_capacity == 0 {
                Self::DEFAULT_INITIAL_CAPACITY
            } else {
                self.initial_capacity
            },
        }
    }

    /// Enlarge a tight AABB by the margin on every side.
    #[inline]
    pub fn fatten(&self, tight: &Aabb2D) -> Aabb2D {
        tight.inflate(self.aabb_margin)
    }

    /// Fatten `tight`, then stretch it along `displacement` to anticipate motion.
    ///
    /// Each axis is extended on the side the displacement points toward, by
    /// `displacement_multiplier` times the displacement on that axis. A
    /// non-finite displacement is ignored and yields the plain fat AABB.
    pub fn predict(&self, tight: &Aabb2D, displacement: Vec2) -> Aabb2D {
        let mut fat = self.fatten(tight);
        if !displacement.is_finite() {
            return fat;
        }
        let d = displacement * self.displacement_multiplier;
        if d.x < 0.0 {
            fat.min_x += d.x;
        } else {
            fat.max_x += d.x;
        }
        if d.y < 0.0 {
            fat.min_y += d.y;
        } else {
            fat.max_y += d.y;
        }
        fat
    }
}

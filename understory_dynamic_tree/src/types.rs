// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Primitive geometry types: axis-aligned boxes and ray-cast segments.

use kurbo::{Point, Rect, Vec2};

/// Axis-aligned bounding box in 2D.
///
/// A box is *valid* when all four coordinates are finite and `min <= max` on
/// both axes. Degenerate boxes (zero width or height) are valid.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb2D {
    /// Minimum x (left)
    pub min_x: f64,
    /// Minimum y (top)
    pub min_y: f64,
    /// Maximum x (right)
    pub max_x: f64,
    /// Maximum y (bottom)
    pub max_y: f64,
}

impl Aabb2D {
    /// Create a new AABB from min/max corners.
    #[inline(always)]
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Create an AABB from origin and size.
    #[inline]
    pub fn from_xywh(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self::new(x, y, x + w, y + h)
    }

    /// Create a degenerate AABB covering a single point.
    #[inline]
    pub fn from_point(p: Point) -> Self {
        Self::new(p.x, p.y, p.x, p.y)
    }

    /// Whether all coordinates are finite and the box is not inverted.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }

    /// Width along x.
    #[inline]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height along y.
    #[inline]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Center point.
    #[inline]
    pub fn center(&self) -> Point {
        Point::new(
            0.5 * (self.min_x + self.max_x),
            0.5 * (self.min_y + self.max_y),
        )
    }

    /// Half-widths along each axis.
    #[inline]
    pub fn extents(&self) -> Vec2 {
        Vec2::new(0.5 * self.width(), 0.5 * self.height())
    }

    /// Perimeter of the box, `2 * (width + height)`.
    ///
    /// This is the surface-area heuristic metric used when choosing where to
    /// insert new leaves.
    #[inline]
    pub fn perimeter(&self) -> f64 {
        2.0 * (self.width() + self.height())
    }

    /// The smallest AABB enclosing both boxes.
    #[inline]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Whether `other` lies entirely inside this box (boundaries included).
    #[inline]
    pub fn contains(&self, other: &Self) -> bool {
        self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && other.max_x <= self.max_x
            && other.max_y <= self.max_y
    }

    /// Whether this AABB contains the point.
    #[inline]
    pub fn contains_point(&self, p: Point) -> bool {
        self.min_x <= p.x && self.min_y <= p.y && p.x <= self.max_x && p.y <= self.max_y
    }

    /// Determines whether this AABB overlaps with another in any way.
    ///
    /// The edge of the AABB is considered part of it, so two boxes that share
    /// an edge overlap.
    ///
    /// # Examples
    ///
    /// ```
    /// use understory_dynamic_tree::Aabb2D;
    ///
    /// let a = Aabb2D::new(0.0, 0.0, 10.0, 10.0);
    /// assert!(a.overlaps(&Aabb2D::new(5.0, 5.0, 15.0, 15.0)));
    /// assert!(a.overlaps(&Aabb2D::new(10.0, 0.0, 20.0, 10.0)));
    /// assert!(!a.overlaps(&Aabb2D::new(11.0, 0.0, 20.0, 10.0)));
    /// ```
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Grow the box by `margin` on every side.
    #[inline]
    pub fn inflate(&self, margin: f64) -> Self {
        Self::new(
            self.min_x - margin,
            self.min_y - margin,
            self.max_x + margin,
            self.max_y + margin,
        )
    }

    /// Translate the box by `offset`.
    #[inline]
    pub fn translate(&self, offset: Vec2) -> Self {
        Self::new(
            self.min_x + offset.x,
            self.min_y + offset.y,
            self.max_x + offset.x,
            self.max_y + offset.y,
        )
    }

    /// Intersect the segment described by `input` with this box.
    ///
    /// Uses the slab method restricted to `[0, input.max_fraction]` and returns
    /// the entry fraction along `p1 -> p2`, or `None` when the clipped segment
    /// misses. A segment that starts inside the box reports `Some(0.0)`.
    ///
    /// # Examples
    ///
    /// ```
    /// use kurbo::Point;
    /// use understory_dynamic_tree::{Aabb2D, RayCastInput};
    ///
    /// let b = Aabb2D::new(4.0, -1.0, 6.0, 1.0);
    /// let ray = RayCastInput::new(Point::new(0.0, 0.0), Point::new(10.0, 0.0), 1.0);
    /// assert_eq!(b.ray_cast(&ray), Some(0.4));
    /// assert_eq!(b.ray_cast(&RayCastInput { max_fraction: 0.3, ..ray }), None);
    /// ```
    pub fn ray_cast(&self, input: &RayCastInput) -> Option<f64> {
        let d = input.p2 - input.p1;
        let (tx0, tx1) = slab(input.p1.x, d.x, self.min_x, self.max_x)?;
        let (ty0, ty1) = slab(input.p1.y, d.y, self.min_y, self.max_y)?;
        let enter = tx0.max(ty0).max(0.0);
        let exit = tx1.min(ty1).min(input.max_fraction);
        (enter <= exit).then_some(enter)
    }
}

/// Parametric interval where `origin + t * dir` lies inside `[lo, hi]`.
#[inline]
fn slab(origin: f64, dir: f64, lo: f64, hi: f64) -> Option<(f64, f64)> {
    if dir == 0.0 {
        return (lo <= origin && origin <= hi).then_some((f64::NEG_INFINITY, f64::INFINITY));
    }
    let inv = 1.0 / dir;
    let t1 = (lo - origin) * inv;
    let t2 = (hi - origin) * inv;
    Some(if t1 <= t2 { (t1, t2) } else { (t2, t1) })
}

impl From<Rect> for Aabb2D {
    fn from(rect: Rect) -> Self {
        let r = rect.abs();
        Self::new(r.x0, r.y0, r.x1, r.y1)
    }
}

impl From<Aabb2D> for Rect {
    fn from(aabb: Aabb2D) -> Self {
        Self::new(aabb.min_x, aabb.min_y, aabb.max_x, aabb.max_y)
    }
}

/// A segment `p1 -> p2` to cast through the tree.
///
/// Only the part of the segment with parameter in `[0, max_fraction]` is
/// considered, where `p1 + t * (p2 - p1)` is the point at parameter `t`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RayCastInput {
    /// Segment start.
    pub p1: Point,
    /// Segment end at fraction `1.0`.
    pub p2: Point,
    /// Upper bound on the fraction along the segment.
    pub max_fraction: f64,
}

impl RayCastInput {
    /// Create a new ray-cast input.
    #[inline]
    pub const fn new(p1: Point, p2: Point, max_fraction: f64) -> Self {
        Self {
            p1,
            p2,
            max_fraction,
        }
    }

    /// The point at fraction `t` along the segment.
    #[inline]
    pub fn point_at(&self, t: f64) -> Point {
        self.p1.lerp(self.p2, t)
    }

    /// Bounds of the clipped segment `[0, max_fraction]`.
    pub fn bounds(&self) -> Aabb2D {
        let end = self.point_at(self.max_fraction);
        Aabb2D::new(
            self.p1.x.min(end.x),
            self.p1.y.min(end.y),
            self.p1.x.max(end.x),
            self.p1.y.max(end.y),
        )
    }
}

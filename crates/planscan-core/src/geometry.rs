//! Geometry primitives shared by every detection stage.
//!
//! Coordinates are y-down page pixels. Whether a [`Rect`] is in base
//! (scale = 1) space or render space is decided by the caller; the
//! [`crate::projector::ColumnProjector`] converts between the two.

use serde::{Deserialize, Serialize};

/// Two vertices closer than this are treated as the same vertex.
pub const VERTEX_EPSILON: f64 = 1e-6;

/// A point in page pixel space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[inline]
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Whether two points coincide within [`VERTEX_EPSILON`].
    #[inline]
    #[must_use]
    pub fn approx_eq(&self, other: &Self) -> bool {
        (self.x - other.x).abs() <= VERTEX_EPSILON && (self.y - other.y).abs() <= VERTEX_EPSILON
    }

    #[inline]
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// 2×3 affine matrix `[a, b, c, d, e, f]` in PDF convention:
/// `x' = a·x + c·y + e`, `y' = b·x + d·y + f`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine(pub [f64; 6]);

impl Default for Affine {
    #[inline]
    fn default() -> Self {
        Self::identity()
    }
}

impl Affine {
    #[inline]
    #[must_use]
    pub const fn identity() -> Self {
        Self([1.0, 0.0, 0.0, 1.0, 0.0, 0.0])
    }

    #[inline]
    #[must_use]
    pub const fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self([a, b, c, d, e, f])
    }

    /// Uniform scale about the origin.
    #[inline]
    #[must_use]
    pub const fn scale(s: f64) -> Self {
        Self([s, 0.0, 0.0, s, 0.0, 0.0])
    }

    #[inline]
    #[must_use]
    pub const fn translate(tx: f64, ty: f64) -> Self {
        Self([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// Composition `self ∘ other`: the result applies `other` first, then `self`.
    ///
    /// Concatenating a `cm` operand onto the current matrix is
    /// `ctm = ctm.multiply(&m)`.
    #[must_use]
    pub fn multiply(&self, other: &Self) -> Self {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Self([
            a1 * a2 + c1 * b2,
            b1 * a2 + d1 * b2,
            a1 * c2 + c1 * d2,
            b1 * c2 + d1 * d2,
            a1 * e2 + c1 * f2 + e1,
            b1 * e2 + d1 * f2 + f1,
        ])
    }

    #[inline]
    #[must_use]
    pub fn apply(&self, p: Point) -> Point {
        let [a, b, c, d, e, f] = self.0;
        Point {
            x: a * p.x + c * p.y + e,
            y: b * p.x + d * p.y + f,
        }
    }
}

/// Axis-aligned rectangle: top-left corner plus width and height.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    #[inline]
    #[must_use]
    pub const fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Square of side `size` centered on `center`.
    #[inline]
    #[must_use]
    pub fn centered(center: Point, size: f64) -> Self {
        Self {
            x: center.x - size / 2.0,
            y: center.y - size / 2.0,
            w: size,
            h: size,
        }
    }

    /// Axis-aligned bounding box of a point set. `None` for an empty set.
    #[must_use]
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self {
            x: min_x,
            y: min_y,
            w: max_x - min_x,
            h: max_y - min_y,
        })
    }

    #[inline]
    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    #[inline]
    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    #[inline]
    #[must_use]
    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.w / 2.0,
            y: self.y + self.h / 2.0,
        }
    }

    #[inline]
    #[must_use]
    pub fn area(&self) -> f64 {
        self.w.abs() * self.h.abs()
    }

    /// Intersection area with another rectangle (0 when disjoint).
    #[inline]
    #[must_use]
    pub fn intersection_area(&self, other: &Self) -> f64 {
        let x_left = self.x.max(other.x);
        let y_top = self.y.max(other.y);
        let x_right = self.right().min(other.right());
        let y_bottom = self.bottom().min(other.bottom());

        let width = (x_right - x_left).max(0.0);
        let height = (y_bottom - y_top).max(0.0);

        width * height
    }

    /// Intersection over Union. 0 when the boxes do not overlap or the union is empty.
    #[inline]
    #[must_use]
    pub fn iou(&self, other: &Self) -> f64 {
        let intersection = self.intersection_area(other);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Whether `inner` lies entirely within `self` (edges may touch).
    #[inline]
    #[must_use]
    pub fn contains_rect(&self, inner: &Self) -> bool {
        inner.x >= self.x
            && inner.y >= self.y
            && inner.right() <= self.right()
            && inner.bottom() <= self.bottom()
    }

    #[inline]
    #[must_use]
    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    /// `min(w, h) / max(w, h)`; 0 for a degenerate box.
    #[inline]
    #[must_use]
    pub fn squareness(&self) -> f64 {
        let (w, h) = (self.w.abs(), self.h.abs());
        let longest = w.max(h);
        if longest > 0.0 {
            w.min(h) / longest
        } else {
            0.0
        }
    }

    /// Multiply every coordinate by `factor`.
    #[inline]
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
            w: self.w * factor,
            h: self.h * factor,
        }
    }
}

/// Interior angles (degrees) at each vertex of a quadrilateral, in vertex order.
///
/// A zero-length edge makes the angle at its endpoints `NaN`; `NaN` never
/// passes a tolerance comparison, so degenerate quads are rejected downstream.
#[must_use]
pub fn interior_angles(corners: &[Point; 4]) -> [f64; 4] {
    let mut angles = [0.0; 4];
    for (i, angle) in angles.iter_mut().enumerate() {
        let prev = corners[(i + 3) % 4];
        let here = corners[i];
        let next = corners[(i + 1) % 4];

        let (ux, uy) = (prev.x - here.x, prev.y - here.y);
        let (vx, vy) = (next.x - here.x, next.y - here.y);
        let norm = ux.hypot(uy) * vx.hypot(vy);
        let cos = (ux * vx + uy * vy) / norm;
        // Rounding can push |cos| a hair past 1 for collinear edges
        *angle = cos.clamp(-1.0, 1.0).acos().to_degrees();
        if norm == 0.0 {
            *angle = f64::NAN;
        }
    }
    angles
}

/// Lengths of the four edges `c0→c1, c1→c2, c2→c3, c3→c0`.
#[must_use]
pub fn edge_lengths(corners: &[Point; 4]) -> [f64; 4] {
    let mut lengths = [0.0; 4];
    for (i, len) in lengths.iter_mut().enumerate() {
        *len = corners[i].distance(&corners[(i + 1) % 4]);
    }
    lengths
}

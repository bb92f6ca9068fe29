//! Geometry extraction: drawing operations to candidate quads.
//!
//! Walks a page's operation list while tracking the graphics-state transform
//! stack, and emits one [`Candidate`] for every native rectangle and for
//! every closed subpath that reduces to exactly four distinct vertices.
//! Candidates are in viewport (render pixel) space.
//!
//! Nothing here fails: malformed operations are skipped one at a time, curves
//! drop the subpath they belong to, and an unbalanced `restore` is ignored.

use crate::geometry::{Affine, Point, Rect};
use crate::ops::{DrawOp, Operation, Viewport};

/// A candidate quad: its axis-aligned bounding box plus the four transformed
/// corners in path order (needed for the angle test).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub bbox: Rect,
    pub corners: [Point; 4],
}

impl Candidate {
    fn from_corners(corners: [Point; 4]) -> Option<Self> {
        let bbox = Rect::from_points(&corners)?;
        Some(Self { bbox, corners })
    }
}

/// Counts of what the extractor saw, for logging and reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub operations: usize,
    pub malformed: usize,
    pub rectangles: usize,
    pub closed_paths: usize,
    pub non_quad_paths: usize,
    pub curve_paths: usize,
}

/// In-progress subpath.
#[derive(Debug, Default)]
struct PathAccumulator {
    points: Vec<Point>,
    /// A curve segment was seen; the subpath can no longer be a candidate.
    tainted: bool,
}

impl PathAccumulator {
    fn reset(&mut self) {
        self.points.clear();
        self.tainted = false;
    }

    fn begin(&mut self, p: Point) {
        self.reset();
        self.points.push(p);
    }

    fn push(&mut self, p: Point) {
        if !self.tainted {
            self.points.push(p);
        }
    }

    fn taint(&mut self) {
        self.points.clear();
        self.tainted = true;
    }

    /// Collapse duplicate consecutive vertices and the closing vertex.
    /// Returns the four corners if exactly four distinct vertices remain.
    fn quad(&self) -> Option<[Point; 4]> {
        if self.tainted {
            return None;
        }
        let mut distinct: Vec<Point> = Vec::with_capacity(self.points.len());
        for p in &self.points {
            if distinct.last().is_some_and(|last| last.approx_eq(p)) {
                continue;
            }
            distinct.push(*p);
        }
        while distinct.len() > 1 && distinct[0].approx_eq(&distinct[distinct.len() - 1]) {
            distinct.pop();
        }
        <[Point; 4]>::try_from(distinct).ok()
    }
}

/// Walks operation lists and emits candidate quads.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeometryExtractor;

impl GeometryExtractor {
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Extract candidates from `operations` under `viewport`.
    #[must_use]
    pub fn extract(&self, operations: &[Operation], viewport: &Viewport) -> Vec<Candidate> {
        self.extract_with_stats(operations, viewport).0
    }

    /// Like [`Self::extract`], also returning what was seen along the way.
    #[must_use]
    pub fn extract_with_stats(
        &self,
        operations: &[Operation],
        viewport: &Viewport,
    ) -> (Vec<Candidate>, ExtractStats) {
        let mut stats = ExtractStats {
            operations: operations.len(),
            ..ExtractStats::default()
        };
        let mut candidates = Vec::new();
        let mut stack: Vec<Affine> = Vec::new();
        let mut ctm = Affine::identity();
        let mut path = PathAccumulator::default();

        for (index, operation) in operations.iter().enumerate() {
            let Some(op) = operation.decode() else {
                stats.malformed += 1;
                log::trace!(
                    "skipping malformed {:?} at {index} ({} operands)",
                    operation.op,
                    operation.operands.len()
                );
                continue;
            };

            match op {
                DrawOp::Save => stack.push(ctm),
                DrawOp::Restore => {
                    if let Some(saved) = stack.pop() {
                        ctm = saved;
                    } else {
                        log::trace!("unbalanced restore at {index}");
                    }
                }
                DrawOp::Transform(m) => ctm = ctm.multiply(&m),
                DrawOp::MoveTo(p) => path.begin(p),
                DrawOp::LineTo(p) => path.push(p),
                DrawOp::Curve => {
                    if !path.tainted {
                        stats.curve_paths += 1;
                    }
                    path.taint();
                }
                DrawOp::ClosePath => {
                    stats.closed_paths += 1;
                    match path.quad() {
                        Some(corners) => {
                            let combined = viewport.transform.multiply(&ctm);
                            if let Some(c) =
                                Candidate::from_corners(corners.map(|p| combined.apply(p)))
                            {
                                candidates.push(c);
                            }
                        }
                        None => stats.non_quad_paths += 1,
                    }
                    path.reset();
                }
                DrawOp::Rectangle { x, y, w, h } => {
                    stats.rectangles += 1;
                    path.reset();
                    let combined = viewport.transform.multiply(&ctm);
                    let corners = [
                        Point::new(x, y),
                        Point::new(x + w, y),
                        Point::new(x + w, y + h),
                        Point::new(x, y + h),
                    ];
                    if let Some(c) = Candidate::from_corners(corners.map(|p| combined.apply(p))) {
                        candidates.push(c);
                    }
                }
                DrawOp::EndPath => path.reset(),
                DrawOp::Ignored => {}
            }
        }

        log::debug!(
            "extracted {} candidates from {} operations ({} malformed, {} rectangles, {} closed paths, {} non-quad, {} curved)",
            candidates.len(),
            stats.operations,
            stats.malformed,
            stats.rectangles,
            stats.closed_paths,
            stats.non_quad_paths,
            stats.curve_paths
        );
        (candidates, stats)
    }
}

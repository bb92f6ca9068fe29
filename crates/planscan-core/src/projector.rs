//! Base ↔ render coordinate mapping.
//!
//! Stored geometry is always base (scale = 1) page coordinates. Drawing,
//! click hit-testing and ROI selection happen at the current render scale;
//! they all go through a [`ColumnProjector`] so the store never sees scaled
//! values.

use crate::column::{Column, ColumnId};
use crate::error::{PlanscanError, Result};
use crate::geometry::{Point, Rect};
use serde::Serialize;

/// Read-only render view of one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedColumn {
    pub id: ColumnId,
    pub label: String,
    pub rect: Rect,
    pub color: String,
}

/// Pure scale mapping between base and render space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnProjector {
    scale: f64,
}

impl ColumnProjector {
    /// # Errors
    ///
    /// [`PlanscanError::Config`] if `scale` is not a finite positive number.
    pub fn new(scale: f64) -> Result<Self> {
        if scale.is_finite() && scale > 0.0 {
            Ok(Self { scale })
        } else {
            Err(PlanscanError::config(format!(
                "render scale must be finite and positive, got {scale}"
            )))
        }
    }

    /// Projector for base coordinates (scale 1).
    #[inline]
    #[must_use]
    pub const fn identity() -> Self {
        Self { scale: 1.0 }
    }

    #[inline]
    #[must_use]
    pub const fn scale(&self) -> f64 {
        self.scale
    }

    #[inline]
    #[must_use]
    pub fn to_render_rect(&self, base: &Rect) -> Rect {
        base.scaled(self.scale)
    }

    #[inline]
    #[must_use]
    pub fn to_base_rect(&self, render: &Rect) -> Rect {
        Rect::new(
            render.x / self.scale,
            render.y / self.scale,
            render.w / self.scale,
            render.h / self.scale,
        )
    }

    #[inline]
    #[must_use]
    pub fn to_render_point(&self, base: Point) -> Point {
        Point::new(base.x * self.scale, base.y * self.scale)
    }

    #[inline]
    #[must_use]
    pub fn to_base_point(&self, render: Point) -> Point {
        Point::new(render.x / self.scale, render.y / self.scale)
    }

    #[must_use]
    pub fn project(&self, column: &Column) -> RenderedColumn {
        RenderedColumn {
            id: column.id.clone(),
            label: column.label.clone(),
            rect: self.to_render_rect(&column.geometry),
            color: column.color.clone(),
        }
    }

    pub fn project_all<'a>(
        &'a self,
        columns: &'a [Column],
    ) -> impl Iterator<Item = RenderedColumn> + 'a {
        columns.iter().map(|c| self.project(c))
    }

    /// Topmost column under a render-space point. Later columns in list
    /// order are drawn over earlier ones.
    #[must_use]
    pub fn hit_test(&self, columns: &[Column], render: Point) -> Option<ColumnId> {
        let base = self.to_base_point(render);
        columns
            .iter()
            .rev()
            .find(|c| c.geometry.contains_point(base))
            .map(|c| c.id.clone())
    }
}

impl Default for ColumnProjector {
    fn default() -> Self {
        Self::identity()
    }
}

//! Page drawing operations as delivered by the page source.
//!
//! An [`Operation`] is an opcode plus its numeric operands, exactly as the
//! host produces it. Operand counts are not trusted: [`Operation::decode`]
//! validates them and the extractor skips anything malformed.

use crate::geometry::{Affine, Point};
use serde::{Deserialize, Serialize};

/// Drawing opcodes understood by the geometry extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OpCode {
    /// Push the current transform (`q`)
    Save,
    /// Pop the current transform (`Q`)
    Restore,
    /// Concatenate a matrix onto the current transform (`cm`)
    Transform,
    /// Begin a new subpath (`m`)
    MoveTo,
    /// Straight segment (`l`)
    LineTo,
    /// Cubic Bézier with both control points (`c`)
    CurveTo,
    /// Cubic Bézier, first control point = current point (`v`)
    CurveToV,
    /// Cubic Bézier, second control point = end point (`y`)
    CurveToY,
    /// Close the current subpath (`h`)
    ClosePath,
    /// Native rectangle `x y w h` (`re`)
    Rectangle,
    /// Paint or discard the current path (`f`, `S`, `B`, `n`, ...)
    #[serde(
        alias = "fill",
        alias = "eoFill",
        alias = "stroke",
        alias = "fillStroke",
        alias = "eoFillStroke",
        alias = "newPath"
    )]
    EndPath,
    /// Anything else (text, color, images); ignored
    #[serde(other)]
    Other,
}

impl OpCode {
    /// Operand count this opcode requires.
    #[inline]
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Self::Transform | Self::CurveTo => 6,
            Self::Rectangle | Self::CurveToV | Self::CurveToY => 4,
            Self::MoveTo | Self::LineTo => 2,
            Self::Save | Self::Restore | Self::ClosePath | Self::EndPath | Self::Other => 0,
        }
    }
}

/// One drawing instruction: opcode plus raw numeric operands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub op: OpCode,
    #[serde(default)]
    pub operands: Vec<f64>,
}

impl Operation {
    #[inline]
    #[must_use]
    pub fn new(op: OpCode, operands: Vec<f64>) -> Self {
        Self { op, operands }
    }

    #[must_use]
    pub fn save() -> Self {
        Self::new(OpCode::Save, Vec::new())
    }

    #[must_use]
    pub fn restore() -> Self {
        Self::new(OpCode::Restore, Vec::new())
    }

    #[must_use]
    pub fn transform(m: Affine) -> Self {
        Self::new(OpCode::Transform, m.0.to_vec())
    }

    #[must_use]
    pub fn move_to(x: f64, y: f64) -> Self {
        Self::new(OpCode::MoveTo, vec![x, y])
    }

    #[must_use]
    pub fn line_to(x: f64, y: f64) -> Self {
        Self::new(OpCode::LineTo, vec![x, y])
    }

    #[must_use]
    pub fn close_path() -> Self {
        Self::new(OpCode::ClosePath, Vec::new())
    }

    #[must_use]
    pub fn rectangle(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self::new(OpCode::Rectangle, vec![x, y, w, h])
    }

    #[must_use]
    pub fn end_path() -> Self {
        Self::new(OpCode::EndPath, Vec::new())
    }

    /// Validate operand count and finiteness.
    ///
    /// Returns `None` for a malformed operation; callers skip it.
    #[must_use]
    pub fn decode(&self) -> Option<DrawOp> {
        if self.operands.len() != self.op.arity() || self.operands.iter().any(|v| !v.is_finite())
        {
            return None;
        }
        let o = &self.operands;
        Some(match self.op {
            OpCode::Save => DrawOp::Save,
            OpCode::Restore => DrawOp::Restore,
            OpCode::Transform => DrawOp::Transform(Affine::new(o[0], o[1], o[2], o[3], o[4], o[5])),
            OpCode::MoveTo => DrawOp::MoveTo(Point::new(o[0], o[1])),
            OpCode::LineTo => DrawOp::LineTo(Point::new(o[0], o[1])),
            OpCode::CurveTo | OpCode::CurveToV | OpCode::CurveToY => DrawOp::Curve,
            OpCode::ClosePath => DrawOp::ClosePath,
            OpCode::Rectangle => DrawOp::Rectangle {
                x: o[0],
                y: o[1],
                w: o[2],
                h: o[3],
            },
            OpCode::EndPath => DrawOp::EndPath,
            OpCode::Other => DrawOp::Ignored,
        })
    }
}

/// A validated drawing instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawOp {
    Save,
    Restore,
    Transform(Affine),
    MoveTo(Point),
    LineTo(Point),
    Curve,
    ClosePath,
    Rectangle { x: f64, y: f64, w: f64, h: f64 },
    EndPath,
    Ignored,
}

/// Page-to-pixel transform and pixel size for one page at one render scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Maps page (content-stream) space to y-down pixels
    pub transform: Affine,
    /// Pixel width at `scale`
    pub width: f64,
    /// Pixel height at `scale`
    pub height: f64,
    /// Render scale the viewport was built for (1.0 = base coordinates)
    #[serde(default = "default_scale")]
    pub scale: f64,
}

const fn default_scale() -> f64 {
    1.0
}

impl Viewport {
    /// Viewport for a PDF media box `[llx, lly, urx, ury]` at `scale`,
    /// flipping y so that pixel rows grow downwards.
    #[must_use]
    pub fn for_media_box(media_box: [f64; 4], scale: f64) -> Self {
        let [llx, lly, urx, ury] = media_box;
        Self {
            transform: Affine::new(scale, 0.0, 0.0, -scale, -llx * scale, ury * scale),
            width: (urx - llx).abs() * scale,
            height: (ury - lly).abs() * scale,
            scale,
        }
    }

    /// Identity viewport: operations are already in y-down pixel space.
    #[must_use]
    pub fn identity(width: f64, height: f64) -> Self {
        Self {
            transform: Affine::identity(),
            width,
            height,
            scale: 1.0,
        }
    }
}

/// Everything detection needs from the page source for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub operations: Vec<Operation>,
    pub viewport: Viewport,
}

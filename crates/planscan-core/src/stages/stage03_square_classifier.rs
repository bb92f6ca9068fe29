// Stage 3: Square classifier
//
// Keeps boxes whose min/max side ratio reaches the threshold and turns them
// into automatic columns numbered in output order.

use crate::column::{Column, AUTOMATIC_PREFIX};
use crate::config::DetectionConfig;
use crate::geometry::Rect;

/// Stage 3: squareness test and column construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SquareClassifier {
    square_ratio_min: f64,
}

impl Default for SquareClassifier {
    #[inline]
    fn default() -> Self {
        Self::with_ratio(DetectionConfig::default().square_ratio_min)
    }
}

impl From<&DetectionConfig> for SquareClassifier {
    #[inline]
    fn from(config: &DetectionConfig) -> Self {
        Self::with_ratio(config.square_ratio_min)
    }
}

impl SquareClassifier {
    #[inline]
    #[must_use = "returns a new SquareClassifier instance"]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use = "returns a new SquareClassifier with a custom ratio"]
    pub const fn with_ratio(square_ratio_min: f64) -> Self {
        Self { square_ratio_min }
    }

    /// Whether `rect` is square enough to be a column.
    #[inline]
    #[must_use]
    pub fn is_square(&self, rect: &Rect) -> bool {
        rect.squareness() >= self.square_ratio_min
    }

    /// Classify boxes into automatic columns `C-1..C-n`.
    ///
    /// With an `roi`, only columns whose box lies entirely inside it are
    /// kept; numbering stays contiguous over the survivors.
    #[must_use = "returns the classified columns"]
    pub fn process(&self, boxes: &[Rect], roi: Option<&Rect>) -> Vec<Column> {
        let columns: Vec<Column> = boxes
            .iter()
            .filter(|rect| self.is_square(rect))
            .filter(|rect| roi.map_or(true, |roi| roi.contains_rect(rect)))
            .enumerate()
            .map(|(i, rect)| Column::detected(format!("{AUTOMATIC_PREFIX}{}", i + 1), *rect))
            .collect();

        log::debug!(
            "Square classifier: {} boxes, {} columns{}",
            boxes.len(),
            columns.len(),
            if roi.is_some() { " (ROI applied)" } else { "" }
        );
        columns
    }
}

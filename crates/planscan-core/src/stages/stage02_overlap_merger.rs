// Stage 2: Overlap merger
//
// Greedy IoU deduplication. Order-sensitive, so the input is first sorted by
// (x, y) with a stable sort; equal keys keep their extraction order.

use crate::config::DetectionConfig;
use crate::geometry::Rect;

/// Stage 2: collapse boxes whose `IoU` exceeds a threshold, keeping the larger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapMerger {
    /// `IoU` strictly above which two boxes are the same shape
    iou_threshold: f64,
}

impl Default for OverlapMerger {
    #[inline]
    fn default() -> Self {
        Self::with_threshold(DetectionConfig::default().merge_iou_threshold)
    }
}

impl From<&DetectionConfig> for OverlapMerger {
    #[inline]
    fn from(config: &DetectionConfig) -> Self {
        Self::with_threshold(config.merge_iou_threshold)
    }
}

impl OverlapMerger {
    #[inline]
    #[must_use = "returns a new OverlapMerger instance"]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use = "returns a new OverlapMerger with a custom threshold"]
    pub const fn with_threshold(iou_threshold: f64) -> Self {
        Self { iou_threshold }
    }

    #[inline]
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.iou_threshold
    }

    /// Merge overlapping boxes.
    ///
    /// Each box is compared against every box accepted so far. When its `IoU`
    /// with an accepted box exceeds the threshold, the larger of the two
    /// occupies that slot and the other is dropped; otherwise it is appended.
    #[must_use = "returns the deduplicated boxes"]
    pub fn process(&self, mut boxes: Vec<Rect>) -> Vec<Rect> {
        let input = boxes.len();
        boxes.sort_by(|a, b| a.x.total_cmp(&b.x).then_with(|| a.y.total_cmp(&b.y)));

        let mut accepted: Vec<Rect> = Vec::with_capacity(boxes.len());
        for candidate in boxes {
            match accepted
                .iter_mut()
                .find(|kept| kept.iou(&candidate) > self.iou_threshold)
            {
                Some(kept) => {
                    if candidate.area() > kept.area() {
                        *kept = candidate;
                    }
                }
                None => accepted.push(candidate),
            }
        }

        log::debug!(
            "Overlap merger: {} in, {} out (threshold {})",
            input,
            accepted.len(),
            self.iou_threshold
        );
        accepted
    }
}

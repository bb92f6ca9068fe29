// Stage 1: Shape filter
//
// Rejects candidates in the title-block / header-legend band, with a side
// shorter than the minimum, or with any corner too far from a right angle.
// Checks run cheapest first.

use crate::config::DetectionConfig;
use crate::extract::Candidate;
use crate::geometry::{edge_lengths, interior_angles, Rect};
use serde::{Deserialize, Serialize};

/// Configuration for the shape filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapeFilterConfig {
    /// Max allowed deviation from 90° per corner
    pub angular_tolerance_deg: f64,
    /// Minimum accepted edge length (render pixels)
    pub min_side_px: f64,
    /// Right exclusion band, percent of page width
    pub right_cut_percent: f64,
    /// Top exclusion band, percent of page height
    pub top_cut_percent: f64,
}

impl Default for ShapeFilterConfig {
    #[inline]
    fn default() -> Self {
        Self::from(&DetectionConfig::default())
    }
}

impl From<&DetectionConfig> for ShapeFilterConfig {
    #[inline]
    fn from(config: &DetectionConfig) -> Self {
        Self {
            angular_tolerance_deg: config.angular_tolerance_deg,
            min_side_px: config.min_side_px,
            right_cut_percent: config.right_cut_percent,
            top_cut_percent: config.top_cut_percent,
        }
    }
}

/// Rejection counts per reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterStats {
    pub input: usize,
    pub cropped: usize,
    pub too_small: usize,
    pub not_rectangular: usize,
    pub kept: usize,
}

/// Stage 1: keep right-angled, large enough quads outside the crop band.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShapeFilter {
    config: ShapeFilterConfig,
}

impl ShapeFilter {
    #[inline]
    #[must_use = "returns a new ShapeFilter instance"]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use = "returns a new ShapeFilter with custom config"]
    pub const fn with_config(config: ShapeFilterConfig) -> Self {
        Self { config }
    }

    /// Filter candidates on a page of `page_width × page_height` pixels.
    #[must_use = "returns the surviving bounding boxes"]
    pub fn process(
        &self,
        candidates: &[Candidate],
        page_width: f64,
        page_height: f64,
    ) -> Vec<Rect> {
        self.process_with_stats(candidates, page_width, page_height).0
    }

    /// Same as [`Self::process`], also returning rejection counts.
    #[must_use = "returns the surviving bounding boxes and rejection counts"]
    pub fn process_with_stats(
        &self,
        candidates: &[Candidate],
        page_width: f64,
        page_height: f64,
    ) -> (Vec<Rect>, FilterStats) {
        let right_cut = page_width * (1.0 - self.config.right_cut_percent / 100.0);
        let top_cut = page_height * (self.config.top_cut_percent / 100.0);

        let mut stats = FilterStats {
            input: candidates.len(),
            ..FilterStats::default()
        };
        let mut kept = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let bbox = candidate.bbox;
            // Center for the right band, top edge for the top band
            if bbox.center().x >= right_cut || bbox.y <= top_cut {
                stats.cropped += 1;
                continue;
            }
            if !self.has_min_side(candidate) {
                stats.too_small += 1;
                continue;
            }
            if !self.is_rectangular(candidate) {
                stats.not_rectangular += 1;
                continue;
            }
            kept.push(bbox);
        }

        stats.kept = kept.len();
        log::debug!(
            "Shape filter: {} in, {} kept ({} cropped, {} too small, {} not rectangular)",
            stats.input,
            stats.kept,
            stats.cropped,
            stats.too_small,
            stats.not_rectangular
        );
        (kept, stats)
    }

    fn has_min_side(&self, candidate: &Candidate) -> bool {
        let shortest = edge_lengths(&candidate.corners)
            .into_iter()
            .fold(f64::INFINITY, f64::min);
        shortest >= self.config.min_side_px
    }

    /// Every interior angle within tolerance of 90°. `NaN` angles fail.
    fn is_rectangular(&self, candidate: &Candidate) -> bool {
        interior_angles(&candidate.corners)
            .iter()
            .all(|angle| (90.0 - angle).abs() <= self.config.angular_tolerance_deg)
    }
}

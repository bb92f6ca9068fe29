//! Column detection pipeline for one page.
//!
//! Extraction → shape filter → overlap merger → square classifier → base
//! projection. The caller's checkpoint is invoked before each stage and once
//! on completion; returning [`ControlFlow::Break`] abandons the run.

use crate::column::Column;
use crate::config::DetectionConfig;
use crate::error::Result;
use crate::extract::{ExtractStats, GeometryExtractor};
use crate::geometry::Rect;
use crate::ops::PageGeometry;
use crate::projector::ColumnProjector;
use crate::stages::{FilterStats, OverlapMerger, ShapeFilter, ShapeFilterConfig, SquareClassifier};
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;

/// Progress checkpoints of a detection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStage {
    Extracting,
    Filtering,
    Merging,
    Classifying,
    Completed,
}

impl DetectionStage {
    pub const ALL: [Self; 5] = [
        Self::Extracting,
        Self::Filtering,
        Self::Merging,
        Self::Classifying,
        Self::Completed,
    ];

    /// Position in the run, 0-based. Useful for progress bars.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Extracting => 0,
            Self::Filtering => 1,
            Self::Merging => 2,
            Self::Classifying => 3,
            Self::Completed => 4,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Extracting => "extracting",
            Self::Filtering => "filtering",
            Self::Merging => "merging",
            Self::Classifying => "classifying",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for DetectionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-stage counters of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionStats {
    pub extract: ExtractStats,
    pub filter: FilterStats,
}

/// Outcome of a completed detection run.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionReport {
    pub page: usize,
    /// Automatic columns `C-1..C-n` in base coordinates
    pub columns: Vec<Column>,
    /// Quads produced by extraction
    pub candidates: usize,
    /// Boxes surviving the shape filter
    pub filtered: usize,
    /// Boxes remaining after overlap merging
    pub merged: usize,
    pub stats: DetectionStats,
}

/// Runs every detection stage with one configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DetectionPipeline {
    config: DetectionConfig,
}

impl DetectionPipeline {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub const fn with_config(config: DetectionConfig) -> Self {
        Self { config }
    }

    #[inline]
    #[must_use]
    pub const fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Detect columns without progress reporting.
    ///
    /// # Errors
    ///
    /// [`crate::PlanscanError::Config`] for an invalid configuration or
    /// viewport scale.
    pub fn detect(
        &self,
        page: usize,
        geometry: &PageGeometry,
        roi: Option<Rect>,
    ) -> Result<DetectionReport> {
        let report = self.run(page, geometry, roi, |_| ControlFlow::Continue(()))?;
        // A checkpoint that never breaks always yields a report
        Ok(report.unwrap_or_else(|| DetectionReport {
            page,
            columns: Vec::new(),
            candidates: 0,
            filtered: 0,
            merged: 0,
            stats: DetectionStats::default(),
        }))
    }

    /// Detect columns on one page.
    ///
    /// `roi` is in base coordinates. Returns `Ok(None)` when the checkpoint
    /// cancels the run. Malformed drawing data never produces an error.
    ///
    /// # Errors
    ///
    /// [`crate::PlanscanError::Config`] for an invalid configuration or
    /// viewport scale.
    pub fn run<F>(
        &self,
        page: usize,
        geometry: &PageGeometry,
        roi: Option<Rect>,
        mut checkpoint: F,
    ) -> Result<Option<DetectionReport>>
    where
        F: FnMut(DetectionStage) -> ControlFlow<()>,
    {
        self.config.validate()?;
        let projector = ColumnProjector::new(geometry.viewport.scale)?;
        let viewport = &geometry.viewport;

        macro_rules! checkpoint {
            ($stage:expr) => {
                if checkpoint($stage).is_break() {
                    log::debug!("Page {}: detection cancelled before {}", page, $stage);
                    return Ok(None);
                }
            };
        }

        checkpoint!(DetectionStage::Extracting);
        let (candidates, extract_stats) =
            GeometryExtractor::new().extract_with_stats(&geometry.operations, viewport);

        checkpoint!(DetectionStage::Filtering);
        let filter = ShapeFilter::with_config(ShapeFilterConfig::from(&self.config));
        let (filtered, filter_stats) =
            filter.process_with_stats(&candidates, viewport.width, viewport.height);
        let filtered_count = filtered.len();

        checkpoint!(DetectionStage::Merging);
        let merged = OverlapMerger::from(&self.config).process(filtered);

        checkpoint!(DetectionStage::Classifying);
        let render_roi = roi.map(|r| projector.to_render_rect(&r));
        let mut columns =
            SquareClassifier::from(&self.config).process(&merged, render_roi.as_ref());
        for column in &mut columns {
            column.geometry = projector.to_base_rect(&column.geometry);
        }

        checkpoint!(DetectionStage::Completed);
        log::debug!(
            "Page {}: {} candidates, {} filtered, {} merged, {} columns",
            page,
            candidates.len(),
            filtered_count,
            merged.len(),
            columns.len()
        );

        Ok(Some(DetectionReport {
            page,
            columns,
            candidates: candidates.len(),
            filtered: filtered_count,
            merged: merged.len(),
            stats: DetectionStats {
                extract: extract_stats,
                filter: filter_stats,
            },
        }))
    }
}

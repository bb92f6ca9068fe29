//! Detection configuration.
//!
//! A [`DetectionConfig`] is passed explicitly into every detection run; there
//! is no process-wide configuration. Values deserialize from the
//! `[detection]` table of `.planscan.toml` with snake_case keys, and missing
//! keys fall back to the defaults below.
//!
//! ```
//! use planscan_core::{DetectionConfig, DetectionConfigBuilder};
//!
//! # fn main() -> planscan_core::Result<()> {
//! let config = DetectionConfigBuilder::new()
//!     .angular_tolerance_deg(8.0)
//!     .square_ratio_min(0.8)
//!     .build()?;
//! assert_eq!(config.min_side_px, DetectionConfig::default().min_side_px);
//! # Ok(())
//! # }
//! ```

use crate::error::{PlanscanError, Result};
use serde::{Deserialize, Serialize};

/// Tunable thresholds for the detection pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Max allowed deviation from 90° per corner
    pub angular_tolerance_deg: f64,
    /// Minimum accepted side length (render pixels)
    pub min_side_px: f64,
    /// Right-hand exclusion band, percent of page width (title blocks)
    pub right_cut_percent: f64,
    /// Top exclusion band, percent of page height (header legends)
    pub top_cut_percent: f64,
    /// Minimum `min/max` side ratio to qualify as square
    pub square_ratio_min: f64,
    /// `IoU` above which two boxes are merged
    pub merge_iou_threshold: f64,
    /// Side of a manually placed column, base coordinates
    pub default_manual_size: f64,
}

impl Default for DetectionConfig {
    #[inline]
    fn default() -> Self {
        Self {
            angular_tolerance_deg: 12.0,
            min_side_px: 12.0,
            right_cut_percent: 12.0,
            top_cut_percent: 6.0,
            square_ratio_min: 0.70,
            merge_iou_threshold: 0.45,
            default_manual_size: 30.0,
        }
    }
}

impl DetectionConfig {
    /// Check every value is in range.
    ///
    /// # Errors
    ///
    /// [`PlanscanError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        fn check(ok: bool, reason: &str) -> Result<()> {
            if ok {
                Ok(())
            } else {
                Err(PlanscanError::config(reason))
            }
        }

        check(
            self.angular_tolerance_deg > 0.0 && self.angular_tolerance_deg < 90.0,
            "angular_tolerance_deg must be in (0, 90)",
        )?;
        check(
            self.min_side_px.is_finite() && self.min_side_px >= 0.0,
            "min_side_px must be a non-negative number",
        )?;
        check(
            (0.0..100.0).contains(&self.right_cut_percent),
            "right_cut_percent must be in [0, 100)",
        )?;
        check(
            (0.0..100.0).contains(&self.top_cut_percent),
            "top_cut_percent must be in [0, 100)",
        )?;
        check(
            self.square_ratio_min > 0.0 && self.square_ratio_min <= 1.0,
            "square_ratio_min must be in (0, 1]",
        )?;
        check(
            self.merge_iou_threshold > 0.0 && self.merge_iou_threshold <= 1.0,
            "merge_iou_threshold must be in (0, 1]",
        )?;
        check(
            self.default_manual_size.is_finite() && self.default_manual_size > 0.0,
            "default_manual_size must be positive",
        )
    }
}

/// Builder for [`DetectionConfig`] with validation on `build()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectionConfigBuilder {
    config: DetectionConfig,
}

impl DetectionConfigBuilder {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    #[inline]
    #[must_use]
    pub const fn from_config(config: DetectionConfig) -> Self {
        Self { config }
    }

    /// Tight thresholds for clean CAD exports: near-perfect squares only.
    #[must_use]
    pub fn strict() -> Self {
        Self::new()
            .angular_tolerance_deg(5.0)
            .square_ratio_min(0.9)
            .merge_iou_threshold(0.3)
    }

    /// Loose thresholds for scanned-then-vectorised drawings.
    #[must_use]
    pub fn lenient() -> Self {
        Self::new()
            .angular_tolerance_deg(20.0)
            .min_side_px(6.0)
            .square_ratio_min(0.55)
            .merge_iou_threshold(0.6)
    }

    #[must_use]
    pub const fn angular_tolerance_deg(mut self, value: f64) -> Self {
        self.config.angular_tolerance_deg = value;
        self
    }

    #[must_use]
    pub const fn min_side_px(mut self, value: f64) -> Self {
        self.config.min_side_px = value;
        self
    }

    #[must_use]
    pub const fn right_cut_percent(mut self, value: f64) -> Self {
        self.config.right_cut_percent = value;
        self
    }

    #[must_use]
    pub const fn top_cut_percent(mut self, value: f64) -> Self {
        self.config.top_cut_percent = value;
        self
    }

    #[must_use]
    pub const fn square_ratio_min(mut self, value: f64) -> Self {
        self.config.square_ratio_min = value;
        self
    }

    #[must_use]
    pub const fn merge_iou_threshold(mut self, value: f64) -> Self {
        self.config.merge_iou_threshold = value;
        self
    }

    #[must_use]
    pub const fn default_manual_size(mut self, value: f64) -> Self {
        self.config.default_manual_size = value;
        self
    }

    /// # Errors
    ///
    /// [`PlanscanError::Config`] if any value is out of range.
    pub fn build(self) -> Result<DetectionConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DetectionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.angular_tolerance_deg, 12.0);
        assert_eq!(config.min_side_px, 12.0);
        assert_eq!(config.right_cut_percent, 12.0);
        assert_eq!(config.top_cut_percent, 6.0);
        assert_eq!(config.square_ratio_min, 0.70);
        assert_eq!(config.merge_iou_threshold, 0.45);
    }

    #[test]
    fn test_presets_build() {
        assert!(DetectionConfigBuilder::strict().build().is_ok());
        assert!(DetectionConfigBuilder::lenient().build().is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = DetectionConfigBuilder::new()
            .square_ratio_min(1.5)
            .build()
            .unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("square_ratio_min"));

        assert!(DetectionConfigBuilder::new()
            .angular_tolerance_deg(0.0)
            .build()
            .is_err());
        assert!(DetectionConfigBuilder::new()
            .right_cut_percent(100.0)
            .build()
            .is_err());
        assert!(DetectionConfigBuilder::new()
            .min_side_px(f64::NAN)
            .build()
            .is_err());
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let config: DetectionConfig =
            serde_json::from_str(r#"{"min_side_px": 20.0, "top_cut_percent": 0.0}"#).unwrap();
        assert_eq!(config.min_side_px, 20.0);
        assert_eq!(config.top_cut_percent, 0.0);
        assert_eq!(config.square_ratio_min, 0.70);
    }
}

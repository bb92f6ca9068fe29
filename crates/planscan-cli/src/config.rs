//! `.planscan.toml` discovery and merging.
//!
//! Precedence order (highest to lowest):
//! 1. Command-line arguments
//! 2. Project config (./.planscan.toml)
//! 3. User config (~/.planscan.toml)
//! 4. Built-in defaults

use anyhow::{bail, Context, Result};
use colored::Colorize;
use planscan_core::{DetectionConfig, DetectionConfigBuilder, ExportFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = ".planscan.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Detection thresholds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection: Option<DetectionSettings>,

    /// Export defaults
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export: Option<ExportSettings>,

    /// Project saving
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save: Option<SaveSettings>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Starting point: default, strict or lenient
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub angular_tolerance_deg: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_side_px: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_cut_percent: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_cut_percent: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub square_ratio_min: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_iou_threshold: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_manual_size: Option<f64>,

    /// Render scale detection runs at
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// csv or json
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveSettings {
    /// Idle window before a pending project save is written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

/// Command-line detection overrides; `None` means "not given".
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectionOverrides {
    pub angular_tolerance_deg: Option<f64>,
    pub min_side_px: Option<f64>,
    pub square_ratio_min: Option<f64>,
    pub merge_iou_threshold: Option<f64>,
}

macro_rules! take_some {
    ($target:expr, $source:expr, [$($field:ident),+ $(,)?]) => {
        $(
            if $source.$field.is_some() {
                $target.$field = $source.$field.clone();
            }
        )+
    };
}

impl Config {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content).map_err(|e| {
            eprintln!(
                "{} Failed to parse config file: {}",
                "Error:".red().bold(),
                path.display()
            );
            eprintln!("{} {}", "Parse error:".yellow().bold(), e);
            eprintln!();
            eprintln!("{} Configuration file syntax:", "Help:".cyan().bold());
            eprintln!("  [detection]");
            eprintln!("  preset = \"default\"  # default, strict or lenient");
            eprintln!("  angular_tolerance_deg = 12.0");
            eprintln!("  [export]");
            eprintln!("  format = \"csv\"  # csv or json");
            anyhow::anyhow!("Failed to parse config file: {e}")
        })
    }

    /// Find and load both configs and merge them.
    pub fn discover() -> Self {
        Self::merge(Self::load_user_config(), Self::load_project_config())
    }

    pub fn user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME))
    }

    pub fn project_config_path() -> PathBuf {
        PathBuf::from(CONFIG_FILE_NAME)
    }

    fn load_user_config() -> Option<Self> {
        Self::load_optional(&Self::user_config_path()?, "user")
    }

    fn load_project_config() -> Option<Self> {
        Self::load_optional(&Self::project_config_path(), "project")
    }

    fn load_optional(path: &Path, kind: &str) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        match Self::load_from_file(path) {
            Ok(config) => Some(config),
            Err(e) => {
                eprintln!(
                    "{} Failed to load {} config from {}: {}",
                    "Warning:".yellow().bold(),
                    kind,
                    path.display(),
                    e
                );
                None
            }
        }
    }

    /// Merge configs field by field; project values override user values.
    pub fn merge(user_config: Option<Self>, project_config: Option<Self>) -> Self {
        let mut merged = user_config.unwrap_or_default();
        let Some(project) = project_config else {
            return merged;
        };

        if let Some(detection) = project.detection {
            let mut merged_detection = merged.detection.unwrap_or_default();
            take_some!(
                merged_detection,
                detection,
                [
                    preset,
                    angular_tolerance_deg,
                    min_side_px,
                    right_cut_percent,
                    top_cut_percent,
                    square_ratio_min,
                    merge_iou_threshold,
                    default_manual_size,
                    scale,
                ]
            );
            merged.detection = Some(merged_detection);
        }

        if let Some(export) = project.export {
            let mut merged_export = merged.export.unwrap_or_default();
            take_some!(merged_export, export, [format]);
            merged.export = Some(merged_export);
        }

        if let Some(save) = project.save {
            let mut merged_save = merged.save.unwrap_or_default();
            take_some!(merged_save, save, [delay_ms]);
            merged.save = Some(merged_save);
        }

        merged
    }

    /// Effective detection config: preset, then file values, then flags.
    pub fn detection_config(
        &self,
        preset: Option<&str>,
        overrides: DetectionOverrides,
    ) -> Result<DetectionConfig> {
        let settings = self.detection.clone().unwrap_or_default();

        let preset = preset.or(settings.preset.as_deref()).unwrap_or("default");
        let mut builder = match preset.to_ascii_lowercase().as_str() {
            "default" => DetectionConfigBuilder::new(),
            "strict" => DetectionConfigBuilder::strict(),
            "lenient" => DetectionConfigBuilder::lenient(),
            other => bail!("Unknown preset '{other}' (expected default, strict or lenient)"),
        };

        macro_rules! apply {
            ($value:expr, $setter:ident) => {
                if let Some(value) = $value {
                    builder = builder.$setter(value);
                }
            };
        }

        apply!(settings.angular_tolerance_deg, angular_tolerance_deg);
        apply!(settings.min_side_px, min_side_px);
        apply!(settings.right_cut_percent, right_cut_percent);
        apply!(settings.top_cut_percent, top_cut_percent);
        apply!(settings.square_ratio_min, square_ratio_min);
        apply!(settings.merge_iou_threshold, merge_iou_threshold);
        apply!(settings.default_manual_size, default_manual_size);

        apply!(overrides.angular_tolerance_deg, angular_tolerance_deg);
        apply!(overrides.min_side_px, min_side_px);
        apply!(overrides.square_ratio_min, square_ratio_min);
        apply!(overrides.merge_iou_threshold, merge_iou_threshold);

        builder.build().context("Invalid detection configuration")
    }

    pub fn scale(&self, cli_value: Option<f64>) -> f64 {
        cli_value
            .or_else(|| self.detection.as_ref().and_then(|d| d.scale))
            .unwrap_or(1.0)
    }

    pub fn export_format(&self, cli_value: Option<ExportFormat>) -> Result<ExportFormat> {
        if let Some(format) = cli_value {
            return Ok(format);
        }
        match self.export.as_ref().and_then(|e| e.format.as_deref()) {
            Some(format) => format
                .parse()
                .context("Invalid export.format in configuration"),
            None => Ok(ExportFormat::default()),
        }
    }

    pub fn save_delay(&self) -> Duration {
        self.save
            .as_ref()
            .and_then(|s| s.delay_ms)
            .map_or(planscan_core::persist::DEFAULT_SAVE_DELAY, Duration::from_millis)
    }

    /// Config written by `planscan config init`.
    pub fn starter() -> Self {
        let defaults = DetectionConfig::default();
        Self {
            detection: Some(DetectionSettings {
                preset: Some("default".to_string()),
                angular_tolerance_deg: Some(defaults.angular_tolerance_deg),
                min_side_px: Some(defaults.min_side_px),
                right_cut_percent: Some(defaults.right_cut_percent),
                top_cut_percent: Some(defaults.top_cut_percent),
                square_ratio_min: Some(defaults.square_ratio_min),
                merge_iou_threshold: Some(defaults.merge_iou_threshold),
                default_manual_size: Some(defaults.default_manual_size),
                scale: Some(1.0),
            }),
            export: Some(ExportSettings {
                format: Some("csv".to_string()),
            }),
            save: Some(SaveSettings {
                delay_ms: Some(planscan_core::persist::DEFAULT_SAVE_DELAY.as_millis() as u64),
            }),
        }
    }
}

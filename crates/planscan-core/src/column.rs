//! Column entities.

use crate::geometry::Rect;
use serde::{Deserialize, Serialize};

/// Column identifier, unique within a page (`C-7`, `M-2`).
pub type ColumnId = String;

/// Prefix of automatically detected column ids.
pub const AUTOMATIC_PREFIX: &str = "C-";
/// Prefix of manually placed column ids.
pub const MANUAL_PREFIX: &str = "M-";

/// Presentation hint for detected columns.
pub const AUTOMATIC_COLOR: &str = "#e53935";
/// Presentation hint for manually placed columns.
pub const MANUAL_COLOR: &str = "#1e88e5";

/// Confidence assigned to every detected column.
pub const DETECTED_CONFIDENCE: f64 = 0.9;
/// Confidence assigned to every manually placed column.
pub const MANUAL_CONFIDENCE: f64 = 1.0;

/// How a column came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnOrigin {
    Automatic,
    Manual,
}

/// Structural classification of a column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    #[default]
    Structural,
    Decorative,
    Support,
    Pillar,
    Custom,
    Manual,
}

impl ColumnType {
    pub const ALL: [Self; 6] = [
        Self::Structural,
        Self::Decorative,
        Self::Support,
        Self::Pillar,
        Self::Custom,
        Self::Manual,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Structural => "structural",
            Self::Decorative => "decorative",
            Self::Support => "support",
            Self::Pillar => "pillar",
            Self::Custom => "custom",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for ColumnType {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown column type: {s}"))
    }
}

/// One detected or manually placed structural element on one page.
///
/// `geometry` is always in base (scale = 1) page coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub geometry: Rect,
    pub origin: ColumnOrigin,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub confidence: f64,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub material: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub color: String,
}

impl Column {
    /// A freshly detected column. The id is provisional until the store
    /// numbers it.
    #[must_use]
    pub fn detected(id: ColumnId, geometry: Rect) -> Self {
        Self {
            label: id.clone(),
            id,
            geometry,
            origin: ColumnOrigin::Automatic,
            column_type: ColumnType::Structural,
            confidence: DETECTED_CONFIDENCE,
            material: String::new(),
            unit: String::new(),
            note: String::new(),
            color: AUTOMATIC_COLOR.to_string(),
        }
    }

    /// A manually placed column.
    #[must_use]
    pub fn manual(id: ColumnId, geometry: Rect) -> Self {
        Self {
            label: id.clone(),
            id,
            geometry,
            origin: ColumnOrigin::Manual,
            column_type: ColumnType::Manual,
            confidence: MANUAL_CONFIDENCE,
            material: String::new(),
            unit: String::new(),
            note: String::new(),
            color: MANUAL_COLOR.to_string(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_automatic(&self) -> bool {
        self.origin == ColumnOrigin::Automatic
    }

    #[inline]
    #[must_use]
    pub fn is_manual(&self) -> bool {
        self.origin == ColumnOrigin::Manual
    }
}

/// Editable fields of a column. `None` leaves a field unchanged.
///
/// Geometry and id are deliberately absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnPatch {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub column_type: Option<ColumnType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl ColumnPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Merge the set fields into `column`.
    pub fn apply_to(&self, column: &mut Column) {
        if let Some(column_type) = self.column_type {
            column.column_type = column_type;
        }
        if let Some(note) = &self.note {
            column.note.clone_from(note);
        }
        if let Some(color) = &self.color {
            column.color.clone_from(color);
        }
        if let Some(material) = &self.material {
            column.material.clone_from(material);
        }
        if let Some(unit) = &self.unit {
            column.unit.clone_from(unit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detected_defaults() {
        let c = Column::detected("C-1".to_string(), Rect::new(0.0, 0.0, 40.0, 40.0));
        assert_eq!(c.label, "C-1");
        assert_eq!(c.column_type, ColumnType::Structural);
        assert_eq!(c.confidence, 0.9);
        assert!(c.is_automatic());
    }

    #[test]
    fn test_manual_defaults() {
        let c = Column::manual("M-1".to_string(), Rect::new(0.0, 0.0, 30.0, 30.0));
        assert_eq!(c.column_type, ColumnType::Manual);
        assert_eq!(c.confidence, 1.0);
        assert!(c.is_manual());
    }

    #[test]
    fn test_column_type_parse() {
        assert_eq!("Pillar".parse::<ColumnType>(), Ok(ColumnType::Pillar));
        assert_eq!(" support ".parse::<ColumnType>(), Ok(ColumnType::Support));
        assert!("beam".parse::<ColumnType>().is_err());
    }

    #[test]
    fn test_patch_leaves_unset_fields() {
        let mut c = Column::detected("C-3".to_string(), Rect::new(1.0, 2.0, 3.0, 3.0));
        c.note = "keep".to_string();
        let patch = ColumnPatch {
            material: Some("concrete".to_string()),
            column_type: Some(ColumnType::Support),
            ..ColumnPatch::default()
        };
        patch.apply_to(&mut c);
        assert_eq!(c.material, "concrete");
        assert_eq!(c.column_type, ColumnType::Support);
        assert_eq!(c.note, "keep");
        assert_eq!(c.geometry, Rect::new(1.0, 2.0, 3.0, 3.0));
    }

    #[test]
    fn test_column_json_uses_type_key() {
        let c = Column::manual("M-2".to_string(), Rect::new(0.0, 0.0, 30.0, 30.0));
        let value = serde_json::to_value(&c).unwrap();
        assert_eq!(value["type"], "manual");
        assert_eq!(value["origin"], "manual");
    }
}

//! Flat export records.
//!
//! One record per column, geometry in base coordinates, identical shape for
//! every format.

use crate::column::{Column, ColumnType};
use crate::error::{PlanscanError, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::str::FromStr;

/// Export row for a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub confidence: f64,
    pub material: String,
    pub unit: String,
    pub notes: String,
}

impl From<&Column> for ColumnRecord {
    fn from(column: &Column) -> Self {
        Self {
            id: column.id.clone(),
            column_type: column.column_type,
            x: column.geometry.x,
            y: column.geometry.y,
            w: column.geometry.w,
            h: column.geometry.h,
            confidence: column.confidence,
            material: column.material.clone(),
            unit: column.unit.clone(),
            notes: column.note.clone(),
        }
    }
}

/// Export row with its page, for multi-page exports.
///
/// Fields are spelled out rather than flattened: the `csv` writer cannot
/// serialize `#[serde(flatten)]` structs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageColumnRecord {
    /// 1-indexed, as shown to users
    pub page: usize,
    pub id: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub confidence: f64,
    pub material: String,
    pub unit: String,
    pub notes: String,
}

impl PageColumnRecord {
    /// `page` is 0-indexed; the record stores it 1-indexed.
    #[must_use]
    pub fn new(page: usize, column: &Column) -> Self {
        let record = ColumnRecord::from(column);
        Self {
            page: page + 1,
            id: record.id,
            column_type: record.column_type,
            x: record.x,
            y: record.y,
            w: record.w,
            h: record.h,
            confidence: record.confidence,
            material: record.material,
            unit: record.unit,
            notes: record.notes,
        }
    }
}

/// Output format for column exports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = PlanscanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(PlanscanError::config(format!(
                "unknown export format '{other}' (expected csv or json)"
            ))),
        }
    }
}

/// Write `records` in `format`: CSV with a header row, or a pretty JSON array.
///
/// # Errors
///
/// Serialization or I/O failures on `writer`.
pub fn write_records<T, W>(records: &[T], format: ExportFormat, mut writer: W) -> Result<()>
where
    T: Serialize,
    W: Write,
{
    match format {
        ExportFormat::Csv => {
            let mut csv_writer = csv::Writer::from_writer(writer);
            for record in records {
                csv_writer.serialize(record)?;
            }
            csv_writer.flush()?;
        }
        ExportFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, records)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

/// Export one page's columns.
///
/// # Errors
///
/// Serialization or I/O failures on `writer`.
pub fn export_columns<W: Write>(columns: &[Column], format: ExportFormat, writer: W) -> Result<()> {
    let records: Vec<ColumnRecord> = columns.iter().map(ColumnRecord::from).collect();
    write_records(&records, format, writer)
}

/// Export several pages, each record tagged with its page.
///
/// # Errors
///
/// Serialization or I/O failures on `writer`.
pub fn export_pages<'a, I, W>(pages: I, format: ExportFormat, writer: W) -> Result<()>
where
    I: IntoIterator<Item = (usize, &'a [Column])>,
    W: Write,
{
    let records: Vec<PageColumnRecord> = pages
        .into_iter()
        .flat_map(|(page, columns)| columns.iter().map(move |c| PageColumnRecord::new(page, c)))
        .collect();
    write_records(&records, format, writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;

    fn sample() -> Vec<Column> {
        let mut first = Column::detected("C-1".to_string(), Rect::new(10.0, 20.0, 40.0, 40.0));
        first.material = "concrete".to_string();
        first.note = "grid A1".to_string();
        let second = Column::manual("M-1".to_string(), Rect::new(100.0, 20.0, 30.0, 30.0));
        vec![first, second]
    }

    #[test]
    fn test_csv_has_header_and_rows() {
        let mut out = Vec::new();
        export_columns(&sample(), ExportFormat::Csv, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id,type,x,y,w,h,confidence,material,unit,notes");
        assert_eq!(lines[1], "C-1,structural,10.0,20.0,40.0,40.0,0.9,concrete,,grid A1");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_json_array() {
        let mut out = Vec::new();
        export_columns(&sample(), ExportFormat::Json, &mut out).unwrap();
        let parsed: Vec<ColumnRecord> = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].id, "M-1");
        assert_eq!(parsed[1].column_type, ColumnType::Manual);
        assert_eq!(parsed[0].notes, "grid A1");
    }

    #[test]
    fn test_multi_page_csv_leads_with_page() {
        let columns = sample();
        let mut out = Vec::new();
        export_pages([(0, &columns[..1]), (2, &columns[1..])], ExportFormat::Csv, &mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("page,id,type"));
        assert!(lines[1].starts_with("1,C-1,"));
        assert!(lines[2].starts_with("3,M-1,"));
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xlsx".parse::<ExportFormat>().unwrap_err().is_config_error());
    }
}

//! CGM export readers
//!
//! This module provides readers that parse the CSV and `.xlsx` exports of
//! commercial CGM systems and map them to a [`GlucoseProfile`] in mg/dl,
//! sorted by time. Both sources are flattened into [`ExportRow`]s so each
//! device parses rows the same way regardless of the file type.

mod dexcom;
mod eversense;
mod freestyle_libre;

pub use dexcom::DexcomReader;
pub use eversense::EversenseReader;
pub use freestyle_libre::FreestyleLibreReader;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use calamine::{open_workbook, Data, DataType, Reader, Xlsx};
use chrono::{Duration, NaiveDateTime, Timelike};
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};

use crate::error::AgataError;
use crate::types::GlucoseProfile;

/// Timestamp cells of a workbook are rendered with this format
pub(crate) const CELL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Time-of-day cells of a workbook are rendered with this format
pub(crate) const CELL_TIME_FORMAT: &str = "%H:%M:%S";

/// One data row of an export, after the header
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    /// Line (CSV) or row number (workbook) in the source, 1-based
    pub line: u64,
    pub cells: Vec<String>,
}

impl ExportRow {
    /// Cell at `column`, `None` past the end of the row
    pub fn get(&self, column: usize) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }
}

/// Trait for CGM export readers
pub trait CgmReader {
    /// Map the data rows of an export to a glucose profile
    fn parse_rows(&self, rows: Vec<ExportRow>) -> Result<GlucoseProfile, AgataError>;

    /// Parse the raw CSV export content into a glucose profile
    fn read(&self, content: &str) -> Result<GlucoseProfile, AgataError> {
        self.parse_rows(csv_rows(content)?)
    }

    /// Parse the first worksheet of an `.xlsx` export
    fn read_xlsx(&self, path: &Path) -> Result<GlucoseProfile, AgataError> {
        self.parse_rows(xlsx_rows(path)?)
    }

    /// Read and parse an export file, choosing the parser from its extension
    fn read_file(&self, path: &Path) -> Result<GlucoseProfile, AgataError> {
        if is_workbook(path) {
            return self.read_xlsx(path);
        }
        let content = std::fs::read_to_string(path)?;
        self.read(&content)
    }
}

/// Whether `path` names an Excel workbook
pub fn is_workbook(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xlsx"))
}

/// Supported CGM systems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CgmDevice {
    Dexcom,
    Eversense,
    FreestyleLibre,
}

impl CgmDevice {
    pub fn as_str(&self) -> &'static str {
        match self {
            CgmDevice::Dexcom => "dexcom",
            CgmDevice::Eversense => "eversense",
            CgmDevice::FreestyleLibre => "freestyle_libre",
        }
    }

    /// Reader for this device's export format
    pub fn reader(&self) -> Box<dyn CgmReader> {
        match self {
            CgmDevice::Dexcom => Box::new(DexcomReader),
            CgmDevice::Eversense => Box::new(EversenseReader),
            CgmDevice::FreestyleLibre => Box::new(FreestyleLibreReader),
        }
    }
}

impl FromStr for CgmDevice {
    type Err = AgataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "dexcom" => Ok(CgmDevice::Dexcom),
            "eversense" => Ok(CgmDevice::Eversense),
            "freestyle_libre" | "libre" => Ok(CgmDevice::FreestyleLibre),
            other => Err(AgataError::Parse(format!("unknown CGM device `{other}`"))),
        }
    }
}

impl fmt::Display for CgmDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data rows of a CSV export with a header row
pub(crate) fn csv_rows(content: &str) -> Result<Vec<ExportRow>, AgataError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(content.as_bytes());
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(ExportRow {
            line: record.position().map(|p| p.line()).unwrap_or(0),
            cells: record.iter().map(str::to_string).collect(),
        });
    }
    Ok(rows)
}

/// Data rows of the first worksheet of a workbook; the first row is the header
pub(crate) fn xlsx_rows(path: &Path) -> Result<Vec<ExportRow>, AgataError> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AgataError::Parse(format!("{}: workbook has no sheets", path.display())))??;
    let first_row = range.start().map(|(row, _)| row as u64).unwrap_or(0);

    let rows = range
        .rows()
        .enumerate()
        .skip(1)
        .map(|(i, cells)| ExportRow {
            line: first_row + i as u64 + 1,
            cells: cells.iter().map(cell_text).collect(),
        })
        .collect::<Vec<_>>();
    tracing::debug!(path = %path.display(), rows = rows.len(), "read workbook");
    Ok(rows)
}

/// Text form of a workbook cell, matching what a CSV export would carry
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Float(v) => v.to_string(),
        Data::Int(v) => v.to_string(),
        Data::Bool(v) => v.to_string(),
        Data::DateTime(dt) => match cell.as_datetime().map(round_to_second) {
            // Excel stores a bare time of day as a fraction of a day
            Some(t) if dt.as_f64() < 1.0 => t.format(CELL_TIME_FORMAT).to_string(),
            Some(t) => t.format(CELL_DATETIME_FORMAT).to_string(),
            None => dt.as_f64().to_string(),
        },
    }
}

/// Serial day fractions do not land exactly on whole seconds
fn round_to_second(t: NaiveDateTime) -> NaiveDateTime {
    let t = t + Duration::milliseconds(500);
    t.with_nanosecond(0).unwrap_or(t)
}

/// Numeric glucose cell; empty cells are missing readings
pub(crate) fn parse_glucose(cell: &str, line: u64) -> Result<f64, AgataError> {
    if cell.is_empty() {
        return Ok(f64::NAN);
    }
    cell.parse::<f64>()
        .map_err(|_| AgataError::Parse(format!("line {line}: invalid glucose value `{cell}`")))
}

/// Sorted profile from parsed samples
pub(crate) fn into_profile(samples: Vec<(NaiveDateTime, f64)>) -> GlucoseProfile {
    let (t, glucose) = samples.into_iter().unzip();
    let mut profile = GlucoseProfile { t, glucose };
    profile.sort_by_time();
    profile
}

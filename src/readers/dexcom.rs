//! Dexcom Clarity CSV reader
//!
//! Keeps the estimated glucose value (`EGV`) rows. Out-of-range readings are
//! exported as `Low` / `High` and mapped to 39 / 401 mg/dl.

use chrono::NaiveDateTime;

use super::{into_profile, parse_glucose, CgmReader, ExportRow, CELL_DATETIME_FORMAT};
use crate::error::AgataError;
use crate::types::GlucoseProfile;

const TIMESTAMP_COLUMN: usize = 1;
const EVENT_TYPE_COLUMN: usize = 2;
const GLUCOSE_COLUMN: usize = 7;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Value assigned to readings below the sensor range
pub const LOW_READING: f64 = 39.0;
/// Value assigned to readings above the sensor range
pub const HIGH_READING: f64 = 401.0;

/// Dexcom export reader
pub struct DexcomReader;

impl CgmReader for DexcomReader {
    fn parse_rows(&self, rows: Vec<ExportRow>) -> Result<GlucoseProfile, AgataError> {
        let mut samples = Vec::new();

        for row in rows {
            if row.get(EVENT_TYPE_COLUMN) != Some("EGV") {
                continue;
            }
            let line = row.line;
            let raw_t = row.get(TIMESTAMP_COLUMN).unwrap_or_default();
            let t = NaiveDateTime::parse_from_str(raw_t, TIMESTAMP_FORMAT)
                .or_else(|_| NaiveDateTime::parse_from_str(raw_t, CELL_DATETIME_FORMAT))
                .map_err(|e| AgataError::DateParse(format!("line {line}: `{raw_t}`: {e}")))?;
            let glucose = match row.get(GLUCOSE_COLUMN).unwrap_or_default() {
                "Low" => LOW_READING,
                "High" => HIGH_READING,
                cell => parse_glucose(cell, line)?,
            };
            samples.push((t, glucose));
        }

        tracing::debug!(samples = samples.len(), "read Dexcom export");
        Ok(into_profile(samples))
    }
}

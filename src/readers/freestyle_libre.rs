//! FreeStyle Libre CSV reader
//!
//! After the header row, the export carries two further lines of report
//! metadata that are skipped. Glucose readings are taken from the historic
//! glucose column; the timestamp is the device date plus the device time.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use super::{into_profile, parse_glucose, CgmReader, ExportRow};
use crate::error::AgataError;
use crate::types::GlucoseProfile;

const SKIPPED_ROWS: usize = 2;
const DATE_COLUMN: usize = 3;
const TIME_COLUMN: usize = 4;
const GLUCOSE_COLUMN: usize = 6;

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%d-%m-%Y %H:%M"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%d/%m/%Y"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%I:%M %p"];

/// FreeStyle Libre export reader
pub struct FreestyleLibreReader;

impl CgmReader for FreestyleLibreReader {
    fn parse_rows(&self, rows: Vec<ExportRow>) -> Result<GlucoseProfile, AgataError> {
        let mut samples = Vec::new();

        for row in rows.into_iter().skip(SKIPPED_ROWS) {
            let line = row.line;
            let (Some(date), Some(time)) = (row.get(DATE_COLUMN), row.get(TIME_COLUMN))
            else {
                tracing::warn!(line, "skipping FreeStyle Libre row without a timestamp");
                continue;
            };
            if date.is_empty() {
                tracing::warn!(line, "skipping FreeStyle Libre row without a date");
                continue;
            }

            let day = parse_day(date)
                .ok_or_else(|| AgataError::DateParse(format!("line {line}: `{date}`")))?;
            let t = match parse_time(time) {
                Some(tod) => {
                    day + Duration::hours(tod.hour() as i64)
                        + Duration::minutes(tod.minute() as i64)
                }
                None if time.is_empty() => day,
                None => {
                    return Err(AgataError::DateParse(format!("line {line}: `{time}`")));
                }
            };
            let glucose = parse_glucose(row.get(GLUCOSE_COLUMN).unwrap_or_default(), line)?;
            samples.push((t, glucose));
        }

        tracing::debug!(samples = samples.len(), "read FreeStyle Libre export");
        Ok(into_profile(samples))
    }
}

/// Device date cell, either a bare date or a timestamp
fn parse_day(cell: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(cell, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(cell, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn parse_time(cell: &str) -> Option<NaiveTime> {
    TIME_FORMATS
        .iter()
        .find_map(|f| NaiveTime::parse_from_str(cell, f).ok())
}

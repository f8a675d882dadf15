//! Eversense CSV reader
//!
//! Columns: date (`01-January-2021`), time (`08:05 AM`), glucose, unit. Rows
//! whose unit is not mg/dL are converted from mmol/l.

use chrono::NaiveDateTime;

use super::{into_profile, parse_glucose, CgmReader, ExportRow};
use crate::error::AgataError;
use crate::types::{GlucoseProfile, GlucoseUnit};

const DATETIME_FORMAT: &str = "%d-%B-%Y %I:%M %p";

/// Eversense export reader
pub struct EversenseReader;

impl CgmReader for EversenseReader {
    fn parse_rows(&self, rows: Vec<ExportRow>) -> Result<GlucoseProfile, AgataError> {
        let mut samples = Vec::new();

        for row in rows {
            let line = row.line;
            let (Some(date), Some(time), Some(value), Some(unit)) =
                (row.get(0), row.get(1), row.get(2), row.get(3))
            else {
                tracing::warn!(line, "skipping Eversense row with fewer than 4 columns");
                continue;
            };

            let raw_t = format!("{date} {time}");
            let t = NaiveDateTime::parse_from_str(&raw_t, DATETIME_FORMAT)
                .map_err(|e| AgataError::DateParse(format!("line {line}: `{raw_t}`: {e}")))?;
            let glucose = GlucoseUnit::from_label(unit).to_mg_dl(parse_glucose(value, line)?);
            samples.push((t, glucose));
        }

        tracing::debug!(samples = samples.len(), "read Eversense export");
        Ok(into_profile(samples))
    }
}

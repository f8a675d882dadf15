//! Report encoding
//!
//! This module wraps a profile analysis into a self-describing JSON report
//! carrying producer metadata, provenance and data-quality flags.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AgataError;
use crate::inspection::{missing_glucose_percentage, number_days_of_observation};
use crate::types::{GlucoseProfile, ProfileAnalysis};
use crate::validation::check_homogeneous_timegrid;
use crate::{AGATA_VERSION, PRODUCER_NAME};

/// Missing-data percentage above which a profile is flagged
pub const HIGH_MISSING_DATA_PERCENTAGE: f64 = 30.0;

/// Observation length (days) below which GMI and daily indices are unreliable
pub const MIN_OBSERVATION_DAYS: f64 = 14.0;

/// Data-quality flags attached to a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    HighMissingData,
    ShortObservation,
    InhomogeneousTimegrid,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportProvenance {
    /// Where the trace came from (file name, device, ...)
    pub source: String,
    pub computed_at_utc: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportQuality {
    /// Fraction (0-1) of available readings, NaN for an empty trace
    pub coverage: f64,
    pub days_of_observation: f64,
    pub flags: Vec<QualityFlag>,
}

/// Analysis of one profile with its metadata
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub agata_version: String,
    pub producer: ReportProducer,
    pub provenance: ReportProvenance,
    pub quality: ReportQuality,
    pub analysis: ProfileAnalysis,
}

/// Encoder for analysis reports
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    /// Wrap the analysis of `profile` into a report.
    ///
    /// Quality is assessed on `profile` as read, before any retiming or
    /// imputation that produced `analysis`.
    pub fn encode(
        &self,
        profile: &GlucoseProfile,
        analysis: ProfileAnalysis,
        source: &str,
    ) -> AnalysisReport {
        AnalysisReport {
            agata_version: AGATA_VERSION.to_string(),
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: AGATA_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            provenance: ReportProvenance {
                source: source.to_string(),
                computed_at_utc: Utc::now().to_rfc3339(),
            },
            quality: build_quality(profile),
            analysis,
        }
    }

    /// Encode to a pretty-printed JSON string
    pub fn encode_to_json(
        &self,
        profile: &GlucoseProfile,
        analysis: ProfileAnalysis,
        source: &str,
    ) -> Result<String, AgataError> {
        let report = self.encode(profile, analysis, source);
        serde_json::to_string_pretty(&report).map_err(AgataError::Json)
    }
}

fn build_quality(profile: &GlucoseProfile) -> ReportQuality {
    let missing = missing_glucose_percentage(profile);
    let days = number_days_of_observation(profile);

    let mut flags = Vec::new();
    if missing > HIGH_MISSING_DATA_PERCENTAGE {
        flags.push(QualityFlag::HighMissingData);
    }
    if days.is_nan() || days < MIN_OBSERVATION_DAYS {
        flags.push(QualityFlag::ShortObservation);
    }
    if check_homogeneous_timegrid(profile).is_err() {
        tracing::warn!("glucose profile is not on a homogeneous time grid");
        flags.push(QualityFlag::InhomogeneousTimegrid);
    }

    ReportQuality {
        coverage: 1.0 - missing / 100.0,
        days_of_observation: days,
        flags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Agata;
    use crate::types::default_start_time;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    const NAN: f64 = f64::NAN;

    fn analyze(profile: &GlucoseProfile) -> ProfileAnalysis {
        Agata::default().analyze_glucose_profile(profile).unwrap()
    }

    #[test]
    fn test_encode_short_gappy_profile() {
        let profile = GlucoseProfile::from_vector(vec![100.0, NAN, NAN, 120.0], 5, None);
        let encoder = ReportEncoder::with_instance_id("test-instance".to_string());
        let report = encoder.encode(&profile, analyze(&profile), "dexcom.csv");

        assert_eq!(report.producer.name, PRODUCER_NAME);
        assert_eq!(report.producer.instance_id, "test-instance");
        assert_eq!(report.agata_version, AGATA_VERSION);
        assert_eq!(report.provenance.source, "dexcom.csv");
        assert!((report.quality.coverage - 0.5).abs() < 1e-9);
        assert_eq!(
            report.quality.flags,
            vec![QualityFlag::HighMissingData, QualityFlag::ShortObservation]
        );
    }

    #[test]
    fn test_long_complete_profile_has_no_flags() {
        let profile = GlucoseProfile::from_vector(vec![120.0; 15 * 288], 5, None);
        let report = ReportEncoder::new().encode(&profile, analyze(&profile), "trial");
        assert!(report.quality.flags.is_empty());
        assert_eq!(report.quality.coverage, 1.0);
        assert!(report.quality.days_of_observation > 14.0);
    }

    #[test]
    fn test_inhomogeneous_profile_is_flagged() {
        let t0 = default_start_time();
        let raw = GlucoseProfile::new(
            vec![t0, t0 + Duration::minutes(5), t0 + Duration::minutes(11)],
            vec![100.0, 110.0, 120.0],
        )
        .unwrap();
        let retimed = GlucoseProfile::from_vector(vec![100.0, 110.0], 5, None);
        let report = ReportEncoder::new().encode(&raw, analyze(&retimed), "raw");
        assert!(report
            .quality
            .flags
            .contains(&QualityFlag::InhomogeneousTimegrid));
    }

    #[test]
    fn test_encode_to_json() {
        let profile = GlucoseProfile::from_vector(vec![100.0, 180.0, 250.0], 5, None);
        let json = ReportEncoder::new()
            .encode_to_json(&profile, analyze(&profile), "inline")
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["producer"]["name"], "agata");
        assert_eq!(value["quality"]["flags"][0], "short_observation");
        assert!(value["analysis"]["risk"]["lbgi"].is_number());
        assert!(Uuid::parse_str(value["producer"]["instance_id"].as_str().unwrap()).is_ok());
    }
}

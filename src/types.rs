//! Core types for AGATA
//!
//! This module defines the data structures that flow through the analysis:
//! glucose profiles, glycemic targets, detected events and the grouped metric
//! results produced for a single profile, an arm of profiles, or a two-arm
//! comparison.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::AgataError;

/// mg/dl per mmol/l
pub const MG_DL_PER_MMOL_L: f64 = 18.018;

/// Timestamp used when a profile is built from a bare glucose vector
pub fn default_start_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Set of glycemic thresholds to use for time-in-range metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlycemicTarget {
    #[default]
    Diabetes,
    Pregnancy,
}

impl GlycemicTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlycemicTarget::Diabetes => "diabetes",
            GlycemicTarget::Pregnancy => "pregnancy",
        }
    }
}

impl FromStr for GlycemicTarget {
    type Err = AgataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "diabetes" => Ok(GlycemicTarget::Diabetes),
            "pregnancy" => Ok(GlycemicTarget::Pregnancy),
            other => Err(AgataError::UnsupportedGlycemicTarget(other.to_string())),
        }
    }
}

impl fmt::Display for GlycemicTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Glucose concentration unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlucoseUnit {
    #[serde(rename = "mg/dL")]
    MgDl,
    #[serde(rename = "mmol/L")]
    MmolL,
}

impl GlucoseUnit {
    /// Unit named by an export cell; anything other than `mg/dL` is mmol/l
    pub fn from_label(label: &str) -> Self {
        if label.trim() == "mg/dL" {
            GlucoseUnit::MgDl
        } else {
            GlucoseUnit::MmolL
        }
    }

    /// Express `value`, given in this unit, in mg/dl
    pub fn to_mg_dl(&self, value: f64) -> f64 {
        match self {
            GlucoseUnit::MgDl => value,
            GlucoseUnit::MmolL => to_mg_dl(value),
        }
    }
}

/// Convert a glucose value from mg/dl to mmol/l
pub fn to_mmol_l(value: f64) -> f64 {
    value / MG_DL_PER_MMOL_L
}

/// Convert a glucose value from mmol/l to mg/dl
pub fn to_mg_dl(value: f64) -> f64 {
    value * MG_DL_PER_MMOL_L
}

/// A single CGM reading as it appears in JSON input/output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlucoseSample {
    /// Sample timestamp (local wall-clock time)
    pub t: NaiveDateTime,
    /// Glucose concentration in mg/dl, `null` when missing
    pub glucose: Option<f64>,
}

/// A glucose trace: timestamps and glucose values (mg/dl, `NaN` when missing)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<GlucoseSample>", into = "Vec<GlucoseSample>")]
pub struct GlucoseProfile {
    pub t: Vec<NaiveDateTime>,
    pub glucose: Vec<f64>,
}

impl GlucoseProfile {
    /// Build a profile from timestamps and glucose values of the same length
    pub fn new(t: Vec<NaiveDateTime>, glucose: Vec<f64>) -> Result<Self, AgataError> {
        if t.len() != glucose.len() {
            return Err(AgataError::Validation(format!(
                "timestamps ({}) and glucose values ({}) must have the same length",
                t.len(),
                glucose.len()
            )));
        }
        Ok(Self { t, glucose })
    }

    /// A profile without samples
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a profile from glucose values sampled every `sample_time` minutes
    /// starting at `start_time` (2000-01-01 00:00 when `None`).
    pub fn from_vector(
        glucose: Vec<f64>,
        sample_time: i64,
        start_time: Option<NaiveDateTime>,
    ) -> Self {
        let start = start_time.unwrap_or_else(default_start_time);
        let t = (0..glucose.len() as i64)
            .map(|k| start + Duration::minutes(k * sample_time))
            .collect();
        Self { t, glucose }
    }

    pub fn len(&self) -> usize {
        self.glucose.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glucose.is_empty()
    }

    /// Sample time in minutes, taken from the first two timestamps
    pub fn sample_time(&self) -> Option<f64> {
        match (self.t.first(), self.t.get(1)) {
            (Some(t0), Some(t1)) => Some((*t1 - *t0).num_seconds() as f64 / 60.0),
            _ => None,
        }
    }

    /// Glucose values with missing readings removed
    pub fn non_missing(&self) -> Vec<f64> {
        self.glucose.iter().copied().filter(|g| !g.is_nan()).collect()
    }

    /// Number of missing readings
    pub fn missing_count(&self) -> usize {
        self.glucose.iter().filter(|g| g.is_nan()).count()
    }

    /// Same profile with glucose converted from mg/dl to mmol/l
    pub fn to_mmol_l(&self) -> Self {
        Self {
            t: self.t.clone(),
            glucose: self.glucose.iter().map(|&g| to_mmol_l(g)).collect(),
        }
    }

    /// Same profile with glucose converted from mmol/l to mg/dl
    pub fn to_mg_dl(&self) -> Self {
        Self {
            t: self.t.clone(),
            glucose: self.glucose.iter().map(|&g| to_mg_dl(g)).collect(),
        }
    }

    /// Sort samples by timestamp (stable)
    pub fn sort_by_time(&mut self) {
        let mut pairs: Vec<(NaiveDateTime, f64)> =
            self.t.iter().copied().zip(self.glucose.iter().copied()).collect();
        pairs.sort_by_key(|(t, _)| *t);
        let (t, glucose) = pairs.into_iter().unzip();
        self.t = t;
        self.glucose = glucose;
    }
}

impl TryFrom<Vec<GlucoseSample>> for GlucoseProfile {
    type Error = AgataError;

    fn try_from(samples: Vec<GlucoseSample>) -> Result<Self, Self::Error> {
        let (t, glucose) = samples
            .into_iter()
            .map(|s| (s.t, s.glucose.unwrap_or(f64::NAN)))
            .unzip();
        GlucoseProfile::new(t, glucose)
    }
}

impl From<GlucoseProfile> for Vec<GlucoseSample> {
    fn from(profile: GlucoseProfile) -> Self {
        profile
            .t
            .into_iter()
            .zip(profile.glucose)
            .map(|(t, g)| GlucoseSample {
                t,
                glucose: if g.is_nan() { None } else { Some(g) },
            })
            .collect()
    }
}

/// Missing-data islands of a profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NanIslands {
    /// Indices belonging to islands shorter than the threshold
    pub short_nan: Vec<usize>,
    /// Indices belonging to islands at least as long as the threshold
    pub long_nan: Vec<usize>,
    /// First index of each island
    pub nan_start: Vec<usize>,
    /// Last index of each island
    pub nan_end: Vec<usize>,
}

/// Glycemic events found in a profile
#[derive(Debug, Clone, Default, Serialize)]
pub struct GlycemicEvents {
    pub time_start: Vec<NaiveDateTime>,
    pub time_end: Vec<NaiveDateTime>,
    /// Event durations (minutes)
    pub duration: Vec<f64>,
    /// Mean event duration (minutes), NaN without events
    pub mean_duration: f64,
    /// Events per week of observation, NaN for empty data
    pub events_per_week: f64,
}

impl GlycemicEvents {
    pub fn len(&self) -> usize {
        self.duration.len()
    }

    pub fn is_empty(&self) -> bool {
        self.duration.is_empty()
    }
}

/// Hypoglycemic events split by consensus level
#[derive(Debug, Clone, Default, Serialize)]
pub struct HypoglycemicEventsByLevel {
    /// All events below 70 mg/dl
    pub hypo: GlycemicEvents,
    /// Events below 70 mg/dl that never reach level 2
    pub l1: GlycemicEvents,
    /// Events below 54 mg/dl
    pub l2: GlycemicEvents,
}

/// Hyperglycemic events split by consensus level
#[derive(Debug, Clone, Default, Serialize)]
pub struct HyperglycemicEventsByLevel {
    /// All events above 180 mg/dl
    pub hyper: GlycemicEvents,
    /// Events above 180 mg/dl that never reach level 2
    pub l1: GlycemicEvents,
    /// Events above 250 mg/dl
    pub l2: GlycemicEvents,
}

/// Clarke error grid zone percentages
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ClarkeGrid {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
}

impl ClarkeGrid {
    pub fn nan() -> Self {
        Self {
            a: f64::NAN,
            b: f64::NAN,
            c: f64::NAN,
            d: f64::NAN,
            e: f64::NAN,
        }
    }
}

/// Glycemic variability metrics
#[derive(Debug, Clone, Serialize)]
pub struct VariabilityMetrics {
    pub mean_glucose: f64,
    pub median_glucose: f64,
    pub std_glucose: f64,
    pub cv_glucose: f64,
    pub range_glucose: f64,
    pub iqr_glucose: f64,
    pub auc_glucose: f64,
    pub gmi: f64,
    pub cogi: f64,
    pub conga: f64,
    pub j_index: f64,
    pub mage_plus_index: f64,
    pub mage_minus_index: f64,
    pub mage_index: f64,
    pub ef_index: f64,
    pub modd: f64,
    pub sddm_index: f64,
    pub sdw_index: f64,
    pub std_glucose_roc: f64,
    pub cvga: f64,
}

/// Time-in-range metrics (percentages)
#[derive(Debug, Clone, Serialize)]
pub struct TimeInRangeMetrics {
    pub time_in_target: f64,
    pub time_in_tight_target: f64,
    pub time_in_hypoglycemia: f64,
    pub time_in_l1_hypoglycemia: f64,
    pub time_in_l2_hypoglycemia: f64,
    pub time_in_hyperglycemia: f64,
    pub time_in_l1_hyperglycemia: f64,
    pub time_in_l2_hyperglycemia: f64,
}

/// Risk indices
#[derive(Debug, Clone, Serialize)]
pub struct RiskMetrics {
    pub adrr: f64,
    pub lbgi: f64,
    pub hbgi: f64,
    pub bgri: f64,
    pub gri: f64,
}

/// Metrics based on glycemic transformation functions
#[derive(Debug, Clone, Serialize)]
pub struct GlycemicTransformationMetrics {
    pub grade_score: f64,
    pub grade_hypo_score: f64,
    pub grade_hyper_score: f64,
    pub grade_eu_score: f64,
    pub igc: f64,
    pub hypo_index: f64,
    pub hyper_index: f64,
    pub mr_index: f64,
}

/// Data quality indicators
#[derive(Debug, Clone, Serialize)]
pub struct DataQualityMetrics {
    pub number_days_of_observation: f64,
    pub missing_glucose_percentage: f64,
}

/// Glycemic events of a profile
#[derive(Debug, Clone, Serialize)]
pub struct EventMetrics {
    pub hyperglycemic_events: HyperglycemicEventsByLevel,
    pub hypoglycemic_events: HypoglycemicEventsByLevel,
    pub extended_hypoglycemic_events: GlycemicEvents,
}

/// Complete analysis of a single glucose profile
#[derive(Debug, Clone, Serialize)]
pub struct ProfileAnalysis {
    pub variability: VariabilityMetrics,
    pub time_in_ranges: TimeInRangeMetrics,
    pub risk: RiskMetrics,
    pub glycemic_transformation: GlycemicTransformationMetrics,
    pub data_quality: DataQualityMetrics,
    pub events: EventMetrics,
}

/// Per-metric values across the profiles of an arm
#[derive(Debug, Clone, Serialize)]
pub struct MetricSummary {
    pub values: Vec<f64>,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub prctile25: f64,
    pub prctile75: f64,
}

/// Analysis of an arm: section -> metric -> summary
#[derive(Debug, Clone, Default, Serialize)]
pub struct ArmAnalysis {
    #[serde(flatten)]
    pub sections: BTreeMap<String, BTreeMap<String, MetricSummary>>,
}

impl ArmAnalysis {
    pub fn get(&self, section: &str, metric: &str) -> Option<&MetricSummary> {
        self.sections.get(section).and_then(|m| m.get(metric))
    }
}

/// Analyses of two arms
#[derive(Debug, Clone, Serialize)]
pub struct ArmComparison {
    pub arm_1: ArmAnalysis,
    pub arm_2: ArmAnalysis,
}

/// Statistical test applied to a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatTest {
    PairedTTest,
    TwoSampleTTest,
    WilcoxonSignedRank,
    MannWhitneyU,
    /// Not enough usable values to run any test
    NotApplicable,
}

/// Outcome of a two-arm test on one metric
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TestOutcome {
    pub test: StatTest,
    /// p-value (NaN when not applicable)
    pub p: f64,
    /// Whether the null hypothesis is rejected at the chosen alpha
    pub h: Option<bool>,
}

impl TestOutcome {
    pub fn not_applicable() -> Self {
        Self {
            test: StatTest::NotApplicable,
            p: f64::NAN,
            h: None,
        }
    }
}

/// Test outcomes: section -> metric -> outcome
#[derive(Debug, Clone, Default, Serialize)]
pub struct ComparisonStats {
    #[serde(flatten)]
    pub sections: BTreeMap<String, BTreeMap<String, TestOutcome>>,
}

impl ComparisonStats {
    pub fn get(&self, section: &str, metric: &str) -> Option<&TestOutcome> {
        self.sections.get(section).and_then(|m| m.get(metric))
    }
}

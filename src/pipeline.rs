//! Analysis orchestration
//!
//! This module provides the public API of AGATA. [`Agata`] runs every metric
//! family on a single glucose profile, summarizes an arm of profiles, and
//! compares two arms metric by metric.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::config::AnalysisConfig;
use crate::error::AgataError;
use crate::events::{
    find_extended_hypoglycemic_events, find_hyperglycemic_events_by_level,
    find_hypoglycemic_events_by_level, HYPO_THRESHOLD,
};
use crate::glycemic_transformation::compute_glycemic_transformation;
use crate::inspection::{missing_glucose_percentage, number_days_of_observation};
use crate::processing::{impute_glucose, retime_glucose};
use crate::risk::compute_risk;
use crate::stats::{compare_samples, nanmean, nanmedian, nanpercentile, nanstd};
use crate::time_in_ranges::compute_time_in_ranges;
use crate::types::{
    ArmAnalysis, ArmComparison, ComparisonStats, DataQualityMetrics, EventMetrics,
    GlucoseProfile, GlycemicTarget, MetricSummary, ProfileAnalysis,
};
use crate::variability::compute_variability;

/// Analyze a JSON glucose profile and return the analysis as JSON.
///
/// # Arguments
/// * `json` - Array of `{"t": "2021-03-01T08:00:00", "glucose": 120.0 | null}` samples
/// * `glycemic_target` - `"diabetes"` or `"pregnancy"`
///
/// # Example
/// ```ignore
/// let analysis = analyze_glucose_profile_json(profile_json, "diabetes")?;
/// ```
pub fn analyze_glucose_profile_json(
    json: &str,
    glycemic_target: &str,
) -> Result<String, AgataError> {
    let target: GlycemicTarget = glycemic_target.parse()?;
    let profile: GlucoseProfile = serde_json::from_str(json)?;
    let analysis = Agata::new(target).analyze_glucose_profile(&profile)?;
    Ok(serde_json::to_string(&analysis)?)
}

/// Compare two JSON arms (arrays of glucose profiles) and return
/// `{"results": {"arm_1", "arm_2"}, "stats": ...}` as JSON.
pub fn compare_two_arms_json(
    arm_1_json: &str,
    arm_2_json: &str,
    is_paired: bool,
    alpha: f64,
    glycemic_target: &str,
) -> Result<String, AgataError> {
    let target: GlycemicTarget = glycemic_target.parse()?;
    let arm_1: Vec<GlucoseProfile> = serde_json::from_str(arm_1_json)?;
    let arm_2: Vec<GlucoseProfile> = serde_json::from_str(arm_2_json)?;
    let (results, stats) = Agata::new(target).compare_two_arms(&arm_1, &arm_2, is_paired, alpha)?;
    Ok(serde_json::to_string(&ArmComparisonOutput { results, stats })?)
}

#[derive(Serialize)]
struct ArmComparisonOutput {
    results: ArmComparison,
    stats: ComparisonStats,
}

/// Glucose profile analyzer.
#[derive(Debug, Clone, PartialEq)]
pub struct Agata {
    /// Threshold set used by time-in-range metrics
    pub glycemic_target: GlycemicTarget,
    /// Threshold (mg/dl) for extended hypoglycemic events
    pub extended_hypo_threshold: f64,
    /// Optional retiming step (minutes) applied by [`Agata::preprocess`]
    pub retime_step: Option<u32>,
    /// Optional maximum imputed gap (minutes) applied by [`Agata::preprocess`]
    pub impute_max_gap: Option<u32>,
}

impl Default for Agata {
    fn default() -> Self {
        Self::new(GlycemicTarget::default())
    }
}

impl Agata {
    pub fn new(glycemic_target: GlycemicTarget) -> Self {
        Self {
            glycemic_target,
            extended_hypo_threshold: HYPO_THRESHOLD,
            retime_step: None,
            impute_max_gap: None,
        }
    }

    /// Create an analyzer from configuration file settings
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            glycemic_target: config.analysis.glycemic_target,
            extended_hypo_threshold: config.events.extended_hypo_threshold,
            retime_step: config.processing.retime_step,
            impute_max_gap: config.processing.impute_max_gap,
        }
    }

    /// Apply the configured retiming and imputation, in that order.
    pub fn preprocess(&self, profile: &GlucoseProfile) -> Result<GlucoseProfile, AgataError> {
        let mut prepared = profile.clone();
        if let Some(step) = self.retime_step {
            prepared = retime_glucose(&prepared, step)?;
        }
        if let Some(max_gap) = self.impute_max_gap {
            prepared = impute_glucose(&prepared, max_gap)?;
        }
        Ok(prepared)
    }

    /// Compute every metric of a single glucose profile.
    ///
    /// Fails when the profile is not on a homogeneous time grid.
    pub fn analyze_glucose_profile(
        &self,
        profile: &GlucoseProfile,
    ) -> Result<ProfileAnalysis, AgataError> {
        tracing::debug!(
            samples = profile.len(),
            target = %self.glycemic_target,
            "analyzing glucose profile"
        );

        let glycemic_transformation = compute_glycemic_transformation(profile)?;
        let events = EventMetrics {
            hyperglycemic_events: find_hyperglycemic_events_by_level(profile),
            hypoglycemic_events: find_hypoglycemic_events_by_level(profile),
            extended_hypoglycemic_events: find_extended_hypoglycemic_events(
                profile,
                self.extended_hypo_threshold,
            ),
        };

        Ok(ProfileAnalysis {
            variability: compute_variability(profile),
            time_in_ranges: compute_time_in_ranges(profile, self.glycemic_target),
            risk: compute_risk(profile),
            glycemic_transformation,
            data_quality: DataQualityMetrics {
                number_days_of_observation: number_days_of_observation(profile),
                missing_glucose_percentage: missing_glucose_percentage(profile),
            },
            events,
        })
    }

    /// Analyze every profile of an arm and summarize each metric.
    pub fn analyze_one_arm(&self, arm: &[GlucoseProfile]) -> Result<ArmAnalysis, AgataError> {
        if arm.is_empty() {
            return Err(AgataError::InsufficientData(
                "an arm must contain at least one glucose profile".to_string(),
            ));
        }
        tracing::debug!(profiles = arm.len(), "analyzing arm");

        let mut collected: BTreeMap<String, BTreeMap<String, Vec<f64>>> = BTreeMap::new();
        for profile in arm {
            let analysis = self.analyze_glucose_profile(profile)?;
            for (section, metrics) in metric_rows(&analysis)? {
                let section_values = collected.entry(section).or_default();
                for (metric, value) in metrics {
                    section_values.entry(metric).or_default().push(value);
                }
            }
        }

        let sections = collected
            .into_iter()
            .map(|(section, metrics)| {
                let summaries = metrics
                    .into_iter()
                    .map(|(metric, values)| (metric, summarize(values)))
                    .collect();
                (section, summaries)
            })
            .collect();

        Ok(ArmAnalysis { sections })
    }

    /// Analyze two arms and test each metric for a difference between them.
    ///
    /// Paired arms must contain the same number of profiles, matched by position.
    pub fn compare_two_arms(
        &self,
        arm_1: &[GlucoseProfile],
        arm_2: &[GlucoseProfile],
        is_paired: bool,
        alpha: f64,
    ) -> Result<(ArmComparison, ComparisonStats), AgataError> {
        if is_paired && arm_1.len() != arm_2.len() {
            return Err(AgataError::Validation(format!(
                "paired arms must have the same number of profiles ({} vs {})",
                arm_1.len(),
                arm_2.len()
            )));
        }

        let results_1 = self.analyze_one_arm(arm_1)?;
        let results_2 = self.analyze_one_arm(arm_2)?;

        let mut stats = ComparisonStats::default();
        for (section, metrics) in &results_1.sections {
            let outcomes = stats.sections.entry(section.clone()).or_default();
            for (metric, summary_1) in metrics {
                let values_2 = results_2
                    .get(section, metric)
                    .map(|s| s.values.as_slice())
                    .unwrap_or_default();
                let outcome = compare_samples(&summary_1.values, values_2, is_paired, alpha);
                outcomes.insert(metric.clone(), outcome);
            }
        }
        tracing::debug!(is_paired, alpha, "compared two arms");

        Ok((
            ArmComparison {
                arm_1: results_1,
                arm_2: results_2,
            },
            stats,
        ))
    }
}

/// Scalar metrics of an analysis as section -> dotted metric path -> value.
///
/// Event timestamps and duration lists are not scalar and are left out.
fn metric_rows(
    analysis: &ProfileAnalysis,
) -> Result<BTreeMap<String, BTreeMap<String, f64>>, AgataError> {
    let Value::Object(sections) = serde_json::to_value(analysis)? else {
        return Ok(BTreeMap::new());
    };
    Ok(sections
        .into_iter()
        .map(|(section, value)| {
            let mut rows = BTreeMap::new();
            collect_scalars(&value, String::new(), &mut rows);
            (section, rows)
        })
        .collect())
}

fn collect_scalars(value: &Value, path: String, rows: &mut BTreeMap<String, f64>) {
    match value {
        Value::Number(n) => {
            rows.insert(path, n.as_f64().unwrap_or(f64::NAN));
        }
        // NaN metrics serialize as null
        Value::Null => {
            rows.insert(path, f64::NAN);
        }
        Value::Object(fields) => {
            for (key, field) in fields {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                collect_scalars(field, child, rows);
            }
        }
        _ => {}
    }
}

fn summarize(values: Vec<f64>) -> MetricSummary {
    MetricSummary {
        mean: nanmean(&values),
        median: nanmedian(&values),
        std: nanstd(&values, 1),
        prctile25: nanpercentile(&values, 25.0),
        prctile75: nanpercentile(&values, 75.0),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatTest;

    const NAN: f64 = f64::NAN;

    fn profile(glucose: Vec<f64>) -> GlucoseProfile {
        GlucoseProfile::from_vector(glucose, 5, None)
    }

    fn make_test_profile() -> GlucoseProfile {
        profile(vec![40.0, 60.0, 60.0, 80.0, 120.0, 150.0, 200.0, 200.0, 260.0, 260.0, NAN])
    }

    fn round2(x: f64) -> f64 {
        (x * 100.0).round() / 100.0
    }

    fn comparison_arms() -> (Vec<GlucoseProfile>, Vec<GlucoseProfile>) {
        let data_1 = make_test_profile();
        let data_2 = profile(vec![40.0, 50.0, 60.0, 120.0, 120.0, 150.0, 190.0, 200.0, 260.0, 260.0, NAN]);
        let data_3 = profile(vec![100.0, 100.0, 100.0, 120.0, 120.0, 120.0, 190.0, 200.0, 100.0, 100.0, NAN]);
        let data_4 = profile(vec![100.0, 100.0, 100.0, 120.0, 120.0, 120.0, 100.0, 100.0, 100.0, 100.0, NAN]);
        (
            vec![data_1.clone(), data_1, data_2.clone(), data_2],
            vec![data_3.clone(), data_3, data_4.clone(), data_4],
        )
    }

    fn assert_outcomes_consistent(stats: &ComparisonStats, alpha: f64) {
        for outcome in stats.sections.values().flat_map(|m| m.values()) {
            match outcome.h {
                Some(h) => {
                    assert!((0.0..=1.0).contains(&outcome.p));
                    assert_eq!(h, outcome.p < alpha);
                }
                None => assert!(outcome.p.is_nan()),
            }
        }
    }

    #[test]
    fn test_analyze_glucose_profile_diabetes() {
        let results = Agata::new(GlycemicTarget::Diabetes)
            .analyze_glucose_profile(&make_test_profile())
            .unwrap();

        let tir = &results.time_in_ranges;
        assert_eq!(tir.time_in_target, 30.0);
        assert_eq!(tir.time_in_tight_target, 20.0);
        assert_eq!(tir.time_in_hypoglycemia, 30.0);
        assert_eq!(tir.time_in_l1_hypoglycemia, 20.0);
        assert_eq!(tir.time_in_l2_hypoglycemia, 10.0);
        assert_eq!(tir.time_in_hyperglycemia, 40.0);
        assert_eq!(tir.time_in_l1_hyperglycemia, 20.0);
        assert_eq!(tir.time_in_l2_hyperglycemia, 20.0);

        assert_eq!(round2(results.risk.adrr), 61.13);
        assert_eq!(round2(results.risk.lbgi), 6.76);
        assert_eq!(round2(results.risk.hbgi), 7.57);
        assert_eq!(round2(results.risk.bgri), 14.32);
        assert_eq!(round2(results.risk.gri), 100.0);

        assert!((results.data_quality.missing_glucose_percentage - 100.0 / 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_analyze_glucose_profile_pregnancy() {
        let results = Agata::new(GlycemicTarget::Pregnancy)
            .analyze_glucose_profile(&make_test_profile())
            .unwrap();

        let tir = &results.time_in_ranges;
        assert_eq!(tir.time_in_target, 20.0);
        assert_eq!(tir.time_in_tight_target, 20.0);
        assert_eq!(tir.time_in_hypoglycemia, 30.0);
        assert_eq!(tir.time_in_l1_hypoglycemia, 20.0);
        assert_eq!(tir.time_in_l2_hypoglycemia, 10.0);
        assert_eq!(tir.time_in_hyperglycemia, 50.0);
        assert_eq!(tir.time_in_l1_hyperglycemia, 30.0);
        assert_eq!(tir.time_in_l2_hyperglycemia, 20.0);
        assert_eq!(round2(results.risk.adrr), 61.13);
    }

    #[test]
    fn test_analyze_json() {
        let samples: Vec<crate::types::GlucoseSample> = make_test_profile().into();
        let json = serde_json::to_string(&samples).unwrap();

        let output = analyze_glucose_profile_json(&json, "diabetes").unwrap();
        let value: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["time_in_ranges"]["time_in_target"], 30.0);
        assert!(value["events"]["hypoglycemic_events"]["l2"]["duration"].is_array());

        assert!(matches!(
            analyze_glucose_profile_json(&json, "type1"),
            Err(AgataError::UnsupportedGlycemicTarget(_))
        ));
        assert!(matches!(
            analyze_glucose_profile_json("{", "diabetes"),
            Err(AgataError::Json(_))
        ));
    }

    #[test]
    fn test_compare_two_arms_json() {
        let (arm_1, arm_2) = comparison_arms();
        let arm_1 = serde_json::to_string(&arm_1).unwrap();
        let arm_2 = serde_json::to_string(&arm_2).unwrap();

        let output = compare_two_arms_json(&arm_1, &arm_2, true, 0.05, "diabetes").unwrap();
        let value: Value = serde_json::from_str(&output).unwrap();
        let values = &value["results"]["arm_2"]["risk"]["lbgi"]["values"];
        assert_eq!(values.as_array().unwrap().len(), 4);
        assert!(value["stats"]["risk"]["lbgi"]["test"].is_string());
    }

    #[test]
    fn test_analyze_one_arm() {
        let data = make_test_profile();
        let results = Agata::default()
            .analyze_one_arm(&[data.clone(), data])
            .unwrap();

        for section in [
            "variability",
            "time_in_ranges",
            "risk",
            "glycemic_transformation",
            "data_quality",
            "events",
        ] {
            let metrics = results.sections.get(section).unwrap();
            assert!(!metrics.is_empty());
            for summary in metrics.values() {
                assert_eq!(summary.values.len(), 2);
            }
        }

        assert_eq!(results.sections["variability"].len(), 20);
        assert_eq!(results.sections["time_in_ranges"].len(), 8);
        assert_eq!(results.sections["risk"].len(), 5);
        assert_eq!(results.sections["glycemic_transformation"].len(), 8);
        assert_eq!(results.sections["data_quality"].len(), 2);
        for level in ["hyper", "l1", "l2"] {
            for field in ["mean_duration", "events_per_week"] {
                let metric = format!("hyperglycemic_events.{level}.{field}");
                assert!(results.get("events", &metric).is_some(), "{metric}");
            }
        }
        assert!(results
            .get("events", "extended_hypoglycemic_events.events_per_week")
            .is_some());
        assert!(results.get("events", "hypoglycemic_events.hypo.duration").is_none());

        let tit = results.get("time_in_ranges", "time_in_target").unwrap();
        assert_eq!(tit.values, vec![30.0, 30.0]);
        assert_eq!(tit.mean, 30.0);
        assert_eq!(tit.median, 30.0);
        assert_eq!(tit.std, 0.0);
        assert_eq!(tit.prctile25, 30.0);
    }

    #[test]
    fn test_analyze_empty_arm_is_error() {
        assert!(matches!(
            Agata::default().analyze_one_arm(&[]),
            Err(AgataError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_compare_two_arms_paired() {
        let (arm_1, arm_2) = comparison_arms();
        let (results, stats) = Agata::default()
            .compare_two_arms(&arm_1, &arm_2, true, 0.05)
            .unwrap();

        for summary in results.arm_1.sections.values().flat_map(|m| m.values()) {
            assert_eq!(summary.values.len(), 4);
        }
        for summary in results.arm_2.sections.values().flat_map(|m| m.values()) {
            assert_eq!(summary.values.len(), 4);
        }
        assert_eq!(stats.sections["variability"].len(), 20);
        assert_outcomes_consistent(&stats, 0.05);

        let tit = stats.get("time_in_ranges", "time_in_target").unwrap();
        assert!(matches!(
            tit.test,
            StatTest::PairedTTest | StatTest::WilcoxonSignedRank
        ));
    }

    #[test]
    fn test_compare_two_arms_unpaired() {
        let (mut arm_1, arm_2) = comparison_arms();
        arm_1.push(arm_2[3].clone());
        let (results, stats) = Agata::default()
            .compare_two_arms(&arm_1, &arm_2, false, 0.05)
            .unwrap();

        let hyper = results
            .arm_1
            .get("events", "hyperglycemic_events.hyper.mean_duration")
            .unwrap();
        assert_eq!(hyper.values.len(), 5);
        assert_outcomes_consistent(&stats, 0.05);

        let tit = stats.get("time_in_ranges", "time_in_target").unwrap();
        assert!(matches!(
            tit.test,
            StatTest::TwoSampleTTest | StatTest::MannWhitneyU
        ));
    }

    #[test]
    fn test_compare_two_arms_empty_profiles() {
        let agata = Agata::default();
        let empty = GlucoseProfile::empty();

        let (_, paired) = agata
            .compare_two_arms(&vec![empty.clone(); 4], &vec![empty.clone(); 4], true, 0.05)
            .unwrap();
        let (results, unpaired) = agata
            .compare_two_arms(&vec![empty.clone(); 4], &vec![empty; 3], false, 0.05)
            .unwrap();

        assert_eq!(results.arm_2.get("risk", "lbgi").unwrap().values.len(), 3);
        for stats in [&paired, &unpaired] {
            assert!(!stats.sections.is_empty());
            for (metric, outcome) in stats.sections.values().flat_map(|m| m.iter()) {
                assert_eq!(outcome.test, StatTest::NotApplicable, "{metric}");
                assert!(outcome.p.is_nan(), "{metric}");
                assert_eq!(outcome.h, None, "{metric}");
            }
        }
    }

    #[test]
    fn test_paired_arms_must_match() {
        let (mut arm_1, arm_2) = comparison_arms();
        arm_1.pop();
        assert!(matches!(
            Agata::default().compare_two_arms(&arm_1, &arm_2, true, 0.05),
            Err(AgataError::Validation(_))
        ));
    }

    #[test]
    fn test_preprocess_from_config() {
        let mut config = AnalysisConfig::default();
        config.processing.impute_max_gap = Some(10);
        let agata = Agata::from_config(&config);

        let gappy = profile(vec![100.0, NAN, 120.0, 130.0]);
        let prepared = agata.preprocess(&gappy).unwrap();
        assert_eq!(prepared.glucose, vec![100.0, 110.0, 120.0, 130.0]);
    }
}

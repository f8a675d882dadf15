//! Time-in-range metrics
//!
//! Percentage of available readings falling in consensus glycemic bands. Band
//! limits depend on the glycemic target (diabetes or pregnancy).

use crate::types::{GlucoseProfile, GlycemicTarget, TimeInRangeMetrics};

/// Band limits (mg/dl) for a glycemic target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeThresholds {
    pub target_low: f64,
    pub target_high: f64,
    pub tight_low: f64,
    pub tight_high: f64,
    pub hypo: f64,
    pub l2_hypo: f64,
    pub hyper: f64,
    pub l2_hyper: f64,
}

impl RangeThresholds {
    pub fn for_target(target: GlycemicTarget) -> Self {
        match target {
            GlycemicTarget::Diabetes => Self {
                target_low: 70.0,
                target_high: 180.0,
                tight_low: 70.0,
                tight_high: 140.0,
                hypo: 70.0,
                l2_hypo: 54.0,
                hyper: 180.0,
                l2_hyper: 250.0,
            },
            GlycemicTarget::Pregnancy => Self {
                target_low: 63.0,
                target_high: 140.0,
                tight_low: 70.0,
                tight_high: 140.0,
                hypo: 63.0,
                l2_hypo: 54.0,
                hyper: 140.0,
                l2_hyper: 250.0,
            },
        }
    }
}

/// Percentage of available readings matching `predicate` (NaN when none are available)
fn percentage_where<F>(profile: &GlucoseProfile, predicate: F) -> f64
where
    F: Fn(f64) -> bool,
{
    let values = profile.non_missing();
    if values.is_empty() {
        return f64::NAN;
    }
    let hits = values.iter().filter(|&&g| predicate(g)).count();
    100.0 * hits as f64 / values.len() as f64
}

/// Time spent between `th_l` and `th_h`, each bound optionally inclusive
pub fn time_in_given_range(
    profile: &GlucoseProfile,
    th_l: f64,
    th_h: f64,
    include_th_l: bool,
    include_th_h: bool,
) -> f64 {
    percentage_where(profile, |g| {
        let above = if include_th_l { g >= th_l } else { g > th_l };
        let below = if include_th_h { g <= th_h } else { g < th_h };
        above && below
    })
}

/// Time spent above `th`
pub fn time_in_given_above_range(profile: &GlucoseProfile, th: f64, include_th: bool) -> f64 {
    percentage_where(profile, |g| if include_th { g >= th } else { g > th })
}

/// Time spent below `th`
pub fn time_in_given_below_range(profile: &GlucoseProfile, th: f64, include_th: bool) -> f64 {
    percentage_where(profile, |g| if include_th { g <= th } else { g < th })
}

pub fn time_in_target(profile: &GlucoseProfile, target: GlycemicTarget) -> f64 {
    let th = RangeThresholds::for_target(target);
    time_in_given_range(profile, th.target_low, th.target_high, false, false)
}

pub fn time_in_tight_target(profile: &GlucoseProfile, target: GlycemicTarget) -> f64 {
    let th = RangeThresholds::for_target(target);
    time_in_given_range(profile, th.tight_low, th.tight_high, false, false)
}

pub fn time_in_hypoglycemia(profile: &GlucoseProfile, target: GlycemicTarget) -> f64 {
    let th = RangeThresholds::for_target(target);
    time_in_given_below_range(profile, th.hypo, true)
}

pub fn time_in_l1_hypoglycemia(profile: &GlucoseProfile, target: GlycemicTarget) -> f64 {
    let th = RangeThresholds::for_target(target);
    time_in_given_range(profile, th.l2_hypo, th.hypo, false, true)
}

pub fn time_in_l2_hypoglycemia(profile: &GlucoseProfile, target: GlycemicTarget) -> f64 {
    let th = RangeThresholds::for_target(target);
    time_in_given_below_range(profile, th.l2_hypo, true)
}

pub fn time_in_hyperglycemia(profile: &GlucoseProfile, target: GlycemicTarget) -> f64 {
    let th = RangeThresholds::for_target(target);
    time_in_given_above_range(profile, th.hyper, true)
}

pub fn time_in_l1_hyperglycemia(profile: &GlucoseProfile, target: GlycemicTarget) -> f64 {
    let th = RangeThresholds::for_target(target);
    time_in_given_range(profile, th.hyper, th.l2_hyper, true, false)
}

pub fn time_in_l2_hyperglycemia(profile: &GlucoseProfile, target: GlycemicTarget) -> f64 {
    let th = RangeThresholds::for_target(target);
    time_in_given_above_range(profile, th.l2_hyper, true)
}

/// All time-in-range metrics of a profile
pub fn compute_time_in_ranges(
    profile: &GlucoseProfile,
    target: GlycemicTarget,
) -> TimeInRangeMetrics {
    TimeInRangeMetrics {
        time_in_target: time_in_target(profile, target),
        time_in_tight_target: time_in_tight_target(profile, target),
        time_in_hypoglycemia: time_in_hypoglycemia(profile, target),
        time_in_l1_hypoglycemia: time_in_l1_hypoglycemia(profile, target),
        time_in_l2_hypoglycemia: time_in_l2_hypoglycemia(profile, target),
        time_in_hyperglycemia: time_in_hyperglycemia(profile, target),
        time_in_l1_hyperglycemia: time_in_l1_hyperglycemia(profile, target),
        time_in_l2_hyperglycemia: time_in_l2_hyperglycemia(profile, target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAN: f64 = f64::NAN;

    fn make_test_profile() -> GlucoseProfile {
        GlucoseProfile::from_vector(
            vec![40.0, 60.0, 60.0, 80.0, 120.0, 120.0, 200.0, 200.0, 260.0, 260.0, NAN],
            5,
            None,
        )
    }

    #[test]
    fn test_diabetes_ranges() {
        let tir = compute_time_in_ranges(&make_test_profile(), GlycemicTarget::Diabetes);
        assert!((tir.time_in_target - 30.0).abs() < 1e-9);
        assert!((tir.time_in_tight_target - 30.0).abs() < 1e-9);
        assert!((tir.time_in_hypoglycemia - 30.0).abs() < 1e-9);
        assert!((tir.time_in_l1_hypoglycemia - 20.0).abs() < 1e-9);
        assert!((tir.time_in_l2_hypoglycemia - 10.0).abs() < 1e-9);
        assert!((tir.time_in_hyperglycemia - 40.0).abs() < 1e-9);
        assert!((tir.time_in_l1_hyperglycemia - 20.0).abs() < 1e-9);
        assert!((tir.time_in_l2_hyperglycemia - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_pregnancy_ranges() {
        let profile = make_test_profile();
        let target = GlycemicTarget::Pregnancy;
        assert!((time_in_target(&profile, target) - 30.0).abs() < 1e-9);
        assert!((time_in_hypoglycemia(&profile, target) - 30.0).abs() < 1e-9);
        assert!((time_in_l1_hypoglycemia(&profile, target) - 20.0).abs() < 1e-9);
        assert!((time_in_hyperglycemia(&profile, target) - 40.0).abs() < 1e-9);
        assert!((time_in_l2_hyperglycemia(&profile, target) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_inclusion() {
        let profile = GlucoseProfile::from_vector(vec![70.0, 180.0, 54.0, 250.0], 5, None);
        let target = GlycemicTarget::Diabetes;
        assert_eq!(time_in_target(&profile, target), 0.0);
        assert_eq!(time_in_hypoglycemia(&profile, target), 50.0);
        assert_eq!(time_in_l1_hypoglycemia(&profile, target), 25.0);
        assert_eq!(time_in_l2_hypoglycemia(&profile, target), 25.0);
        assert_eq!(time_in_l1_hyperglycemia(&profile, target), 25.0);
        assert_eq!(time_in_l2_hyperglycemia(&profile, target), 25.0);
        assert_eq!(time_in_given_above_range(&profile, 180.0, false), 25.0);
    }

    #[test]
    fn test_all_missing_is_nan() {
        let profile = GlucoseProfile::from_vector(vec![NAN; 11], 5, None);
        let tir = compute_time_in_ranges(&profile, GlycemicTarget::Diabetes);
        assert!(tir.time_in_target.is_nan());
        assert!(tir.time_in_l2_hyperglycemia.is_nan());
        assert!(time_in_given_below_range(&GlucoseProfile::empty(), 70.0, true).is_nan());
    }
}

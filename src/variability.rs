//! Glycemic variability metrics
//!
//! All metrics ignore missing readings and return NaN when no reading is
//! available. Day-based metrics (MODD, SDDM, SDW, EF) group readings by calendar
//! day of their timestamp.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, HashMap};

use crate::stats::{nanmax, nanmean, nanmin, nanpercentile, nanstd};
use crate::time_in_ranges::{time_in_hypoglycemia, time_in_target};
use crate::types::{GlucoseProfile, GlycemicTarget, VariabilityMetrics, MG_DL_PER_MMOL_L};

/// CONGA look-back (hours)
const CONGA_ORDER_HOURS: i64 = 4;

/// Minimum amplitude (mg/dl) of an excursion counted by the EF index
const EF_EXCURSION_AMPLITUDE: f64 = 75.0;

/// Samples spanned by the rate-of-change difference
const ROC_LAG: usize = 3;

pub fn mean_glucose(profile: &GlucoseProfile) -> f64 {
    nanmean(&profile.glucose)
}

pub fn median_glucose(profile: &GlucoseProfile) -> f64 {
    nanpercentile(&profile.glucose, 50.0)
}

/// Sample standard deviation
pub fn std_glucose(profile: &GlucoseProfile) -> f64 {
    nanstd(&profile.glucose, 1)
}

/// Coefficient of variation (%)
pub fn cv_glucose(profile: &GlucoseProfile) -> f64 {
    100.0 * std_glucose(profile) / mean_glucose(profile)
}

pub fn range_glucose(profile: &GlucoseProfile) -> f64 {
    nanmax(&profile.glucose) - nanmin(&profile.glucose)
}

/// Interquartile range
pub fn iqr_glucose(profile: &GlucoseProfile) -> f64 {
    nanpercentile(&profile.glucose, 75.0) - nanpercentile(&profile.glucose, 25.0)
}

/// Area under the glucose curve above `basal` (mg/dl * min)
pub fn auc_glucose_over_basal(profile: &GlucoseProfile, basal: f64) -> f64 {
    let values = profile.non_missing();
    let ts = match profile.sample_time() {
        Some(ts) if !values.is_empty() => ts,
        _ => return f64::NAN,
    };
    values.iter().map(|g| (g - basal) * ts).sum()
}

pub fn auc_glucose(profile: &GlucoseProfile) -> f64 {
    auc_glucose_over_basal(profile, 0.0)
}

/// Glucose management indicator (%), meaningful with at least 12 days of data
pub fn gmi(profile: &GlucoseProfile) -> f64 {
    3.31 + 0.02392 * mean_glucose(profile)
}

/// Continuous glucose monitoring index.
///
/// Combines time in range, time below range and glucose variability into a
/// 0-100 score.
pub fn cogi(profile: &GlucoseProfile) -> f64 {
    let tir = 0.5 * time_in_target(profile, GlycemicTarget::Diabetes);
    let tbr = time_in_hypoglycemia(profile, GlycemicTarget::Diabetes).min(15.0);
    let tbr = 0.35 * (100.0 - 100.0 / 15.0 * tbr);
    let gv = (std_glucose(profile) / MG_DL_PER_MMOL_L).clamp(1.0, 6.0);
    let gv = 0.15 * (120.0 - 20.0 * gv);
    tir + tbr + gv
}

/// Continuous overall net glycemic action (4 h order).
///
/// Standard deviation of the differences between each reading and the most
/// recent reading at least four hours older.
pub fn conga(profile: &GlucoseProfile) -> f64 {
    let lag = Duration::hours(CONGA_ORDER_HOURS);
    let mut differences = Vec::new();
    let mut j: Option<usize> = None;

    for i in 1..profile.len() {
        let limit = profile.t[i] - lag;
        let mut next = j.map_or(0, |j| j + 1);
        while next < i && profile.t[next] <= limit {
            j = Some(next);
            next += 1;
        }
        if let Some(j) = j {
            differences.push(profile.glucose[i] - profile.glucose[j]);
        }
    }

    if differences.is_empty() {
        return f64::NAN;
    }
    nanstd(&differences, 1)
}

/// J-index: `1e-3 * (mean + std)^2`
pub fn j_index(profile: &GlucoseProfile) -> f64 {
    1e-3 * (mean_glucose(profile) + std_glucose(profile)).powi(2)
}

/// Peaks and nadirs of the available readings, including both ends
fn turning_points(profile: &GlucoseProfile) -> Vec<f64> {
    let mut values = profile.non_missing();
    values.dedup();
    if values.len() < 2 {
        return values;
    }

    let mut points = vec![values[0]];
    for w in values.windows(3) {
        let is_peak = w[1] > w[0] && w[1] > w[2];
        let is_nadir = w[1] < w[0] && w[1] < w[2];
        if is_peak || is_nadir {
            points.push(w[1]);
        }
    }
    points.extend(values.last().copied());
    points
}

/// Signed excursions between consecutive turning points
fn excursions(profile: &GlucoseProfile) -> Vec<f64> {
    turning_points(profile).windows(2).map(|w| w[1] - w[0]).collect()
}

/// Excursions larger than one standard deviation
fn significant_excursions(profile: &GlucoseProfile) -> Vec<f64> {
    let sd = std_glucose(profile);
    if sd.is_nan() {
        return Vec::new();
    }
    excursions(profile)
        .into_iter()
        .filter(|e| e.abs() >= sd)
        .collect()
}

/// Mean amplitude of glycemic excursions (both directions)
pub fn mage_index(profile: &GlucoseProfile) -> f64 {
    let amplitudes: Vec<f64> = significant_excursions(profile)
        .iter()
        .map(|e| e.abs())
        .collect();
    nanmean(&amplitudes)
}

/// Mean amplitude of ascending (nadir to peak) excursions
pub fn mage_plus_index(profile: &GlucoseProfile) -> f64 {
    let rises: Vec<f64> = significant_excursions(profile)
        .into_iter()
        .filter(|e| *e > 0.0)
        .collect();
    nanmean(&rises)
}

/// Mean amplitude of descending (peak to nadir) excursions
pub fn mage_minus_index(profile: &GlucoseProfile) -> f64 {
    let falls: Vec<f64> = significant_excursions(profile)
        .into_iter()
        .filter(|e| *e < 0.0)
        .map(|e| -e)
        .collect();
    nanmean(&falls)
}

/// Excursion frequency: excursions wider than 75 mg/dl per calendar day
pub fn ef_index(profile: &GlucoseProfile) -> f64 {
    if profile.non_missing().is_empty() {
        return f64::NAN;
    }
    let days = match (profile.t.first(), profile.t.last()) {
        (Some(first), Some(last)) => (last.date() - first.date()).num_days() + 1,
        _ => return f64::NAN,
    };
    let count = excursions(profile)
        .iter()
        .filter(|e| e.abs() > EF_EXCURSION_AMPLITUDE)
        .count();
    count as f64 / days as f64
}

/// Mean of daily differences: mean absolute change against the reading 24 h earlier
pub fn modd(profile: &GlucoseProfile) -> f64 {
    let by_time: HashMap<NaiveDateTime, f64> = profile
        .t
        .iter()
        .copied()
        .zip(profile.glucose.iter().copied())
        .collect();
    let day = Duration::days(1);
    let differences: Vec<f64> = profile
        .t
        .iter()
        .zip(&profile.glucose)
        .filter_map(|(t, g)| by_time.get(&(*t - day)).map(|prev| (g - prev).abs()))
        .collect();
    nanmean(&differences)
}

fn readings_by_day(profile: &GlucoseProfile) -> BTreeMap<NaiveDate, Vec<f64>> {
    let mut days: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for (t, g) in profile.t.iter().zip(&profile.glucose) {
        if !g.is_nan() {
            days.entry(t.date()).or_default().push(*g);
        }
    }
    days
}

/// Standard deviation of daily mean glucose
pub fn sddm_index(profile: &GlucoseProfile) -> f64 {
    let means: Vec<f64> = readings_by_day(profile)
        .values()
        .map(|v| nanmean(v))
        .collect();
    nanstd(&means, 1)
}

/// Mean of within-day standard deviations
pub fn sdw_index(profile: &GlucoseProfile) -> f64 {
    let stds: Vec<f64> = readings_by_day(profile)
        .values()
        .map(|v| nanstd(v, 1))
        .collect();
    nanmean(&stds)
}

/// Glucose rate of change (mg/dl/min) over the last three samples.
///
/// The first three entries are NaN.
pub fn glucose_roc(profile: &GlucoseProfile) -> Vec<f64> {
    let ts = profile.sample_time().unwrap_or(f64::NAN);
    let g = &profile.glucose;
    (0..g.len())
        .map(|k| {
            if k < ROC_LAG {
                f64::NAN
            } else {
                (g[k] - g[k - ROC_LAG]) / (ROC_LAG as f64 * ts)
            }
        })
        .collect()
}

/// Standard deviation of the glucose rate of change
pub fn std_glucose_roc(profile: &GlucoseProfile) -> f64 {
    nanstd(&glucose_roc(profile), 1)
}

/// Distance from the origin of the control variability grid.
///
/// Uses the 2.5th percentile (clamped to 50-110 mg/dl) and the 97.5th
/// percentile (clamped to 110-400 mg/dl).
pub fn cvga(profile: &GlucoseProfile) -> f64 {
    let low = nanpercentile(&profile.glucose, 2.5).clamp(50.0, 110.0);
    let high = nanpercentile(&profile.glucose, 97.5).clamp(110.0, 400.0);
    (110.0 - low).hypot(high - 110.0)
}

/// All variability metrics of a profile
pub fn compute_variability(profile: &GlucoseProfile) -> VariabilityMetrics {
    VariabilityMetrics {
        mean_glucose: mean_glucose(profile),
        median_glucose: median_glucose(profile),
        std_glucose: std_glucose(profile),
        cv_glucose: cv_glucose(profile),
        range_glucose: range_glucose(profile),
        iqr_glucose: iqr_glucose(profile),
        auc_glucose: auc_glucose(profile),
        gmi: gmi(profile),
        cogi: cogi(profile),
        conga: conga(profile),
        j_index: j_index(profile),
        mage_plus_index: mage_plus_index(profile),
        mage_minus_index: mage_minus_index(profile),
        mage_index: mage_index(profile),
        ef_index: ef_index(profile),
        modd: modd(profile),
        sddm_index: sddm_index(profile),
        sdw_index: sdw_index(profile),
        std_glucose_roc: std_glucose_roc(profile),
        cvga: cvga(profile),
    }
}

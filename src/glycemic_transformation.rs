//! Metrics based on glycemic transformation functions
//!
//! M-value (Schlichtkrull), hypo/hyper indices and IGC (Rodbard), and the
//! GRADE score with its hypo/eu/hyper partitions (Hill). All of them require a
//! homogeneous time grid.

use crate::error::AgataError;
use crate::types::{GlucoseProfile, GlycemicTransformationMetrics};
use crate::validation::check_homogeneous_timegrid;

/// Reference glucose (mg/dl) of the M-value
pub const MR_REFERENCE: f64 = 100.0;

const LOWER_LIMIT_TARGET_RANGE: f64 = 70.0;
const UPPER_LIMIT_TARGET_RANGE: f64 = 180.0;
const HYPO_EXPONENT: f64 = 2.0;
const HYPER_EXPONENT: f64 = 1.1;
const INDEX_SCALE: f64 = 30.0;

/// Available readings of a homogeneous profile (`None` when there are none)
fn checked_values(profile: &GlucoseProfile) -> Result<Option<Vec<f64>>, AgataError> {
    check_homogeneous_timegrid(profile)?;
    let values = profile.non_missing();
    Ok(if values.is_empty() { None } else { Some(values) })
}

/// M-value with reference glucose `r`
pub fn mr_index(profile: &GlucoseProfile, r: f64) -> Result<f64, AgataError> {
    let Some(values) = checked_values(profile)? else {
        return Ok(f64::NAN);
    };
    let total: f64 = values
        .iter()
        .map(|g| 1000.0 * (g / r).log10().abs().powi(3))
        .sum();
    Ok(total / values.len() as f64)
}

/// Rodbard hypoglycemic index
pub fn hypo_index(profile: &GlucoseProfile) -> Result<f64, AgataError> {
    let Some(values) = checked_values(profile)? else {
        return Ok(f64::NAN);
    };
    let total: f64 = values
        .iter()
        .filter(|&&g| g < LOWER_LIMIT_TARGET_RANGE)
        .map(|g| (LOWER_LIMIT_TARGET_RANGE - g).powf(HYPO_EXPONENT))
        .sum();
    Ok(total / (values.len() as f64 * INDEX_SCALE))
}

/// Rodbard hyperglycemic index
pub fn hyper_index(profile: &GlucoseProfile) -> Result<f64, AgataError> {
    let Some(values) = checked_values(profile)? else {
        return Ok(f64::NAN);
    };
    let total: f64 = values
        .iter()
        .filter(|&&g| g > UPPER_LIMIT_TARGET_RANGE)
        .map(|g| (g - UPPER_LIMIT_TARGET_RANGE).powf(HYPER_EXPONENT))
        .sum();
    Ok(total / (values.len() as f64 * INDEX_SCALE))
}

/// Index of glycemic control: hypo index + hyper index
pub fn igc(profile: &GlucoseProfile) -> Result<f64, AgataError> {
    Ok(hypo_index(profile)? + hyper_index(profile)?)
}

fn grade(g: f64) -> f64 {
    425.0 * ((g / 18.0).log10().log10() + 0.16).powi(2)
}

/// Share (%) of the total GRADE contributed by readings matching `predicate`
fn grade_share<F>(profile: &GlucoseProfile, predicate: F) -> Result<f64, AgataError>
where
    F: Fn(f64) -> bool,
{
    let Some(values) = checked_values(profile)? else {
        return Ok(f64::NAN);
    };
    let total: f64 = values.iter().map(|&g| grade(g)).sum();
    let part: f64 = values
        .iter()
        .filter(|&&g| predicate(g))
        .map(|&g| grade(g))
        .sum();
    Ok(100.0 * part / total)
}

/// Mean GRADE score
pub fn grade_score(profile: &GlucoseProfile) -> Result<f64, AgataError> {
    let Some(values) = checked_values(profile)? else {
        return Ok(f64::NAN);
    };
    Ok(values.iter().map(|&g| grade(g)).sum::<f64>() / values.len() as f64)
}

/// Percentage of GRADE due to readings below 70 mg/dl
pub fn grade_hypo_score(profile: &GlucoseProfile) -> Result<f64, AgataError> {
    grade_share(profile, |g| g < LOWER_LIMIT_TARGET_RANGE)
}

/// Percentage of GRADE due to readings above 180 mg/dl
pub fn grade_hyper_score(profile: &GlucoseProfile) -> Result<f64, AgataError> {
    grade_share(profile, |g| g > UPPER_LIMIT_TARGET_RANGE)
}

/// Percentage of GRADE due to readings in 70-180 mg/dl
pub fn grade_eu_score(profile: &GlucoseProfile) -> Result<f64, AgataError> {
    Ok(100.0 - (grade_hypo_score(profile)? + grade_hyper_score(profile)?))
}

/// All glycemic transformation metrics of a profile
pub fn compute_glycemic_transformation(
    profile: &GlucoseProfile,
) -> Result<GlycemicTransformationMetrics, AgataError> {
    Ok(GlycemicTransformationMetrics {
        grade_score: grade_score(profile)?,
        grade_hypo_score: grade_hypo_score(profile)?,
        grade_hyper_score: grade_hyper_score(profile)?,
        grade_eu_score: grade_eu_score(profile)?,
        igc: igc(profile)?,
        hypo_index: hypo_index(profile)?,
        hyper_index: hyper_index(profile)?,
        mr_index: mr_index(profile, MR_REFERENCE)?,
    })
}

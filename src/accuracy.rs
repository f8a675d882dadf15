//! Accuracy of a glucose trace against a reference trace
//!
//! `data` is the reference and `data_hat` the estimate (sensor, prediction).
//! Both must lie on the same homogeneous grid; sample pairs where either value
//! is missing are ignored.

use crate::error::AgataError;
use crate::types::{ClarkeGrid, GlucoseProfile};
use crate::validation::{check_comparable, check_homogeneous_timegrid};

/// Validate the two traces and collect the pairs where both values are present
fn paired_values(
    data: &GlucoseProfile,
    data_hat: &GlucoseProfile,
) -> Result<(Vec<f64>, Vec<f64>), AgataError> {
    check_homogeneous_timegrid(data)?;
    check_homogeneous_timegrid(data_hat)?;
    check_comparable(data, data_hat)?;

    Ok(data
        .glucose
        .iter()
        .zip(&data_hat.glucose)
        .filter(|(y, y_hat)| !y.is_nan() && !y_hat.is_nan())
        .map(|(y, y_hat)| (*y, *y_hat))
        .unzip())
}

fn root_mean_squared(y: &[f64], y_hat: &[f64]) -> f64 {
    let ss: f64 = y.iter().zip(y_hat).map(|(a, b)| (a - b).powi(2)).sum();
    (ss / y.len() as f64).sqrt()
}

/// Root mean squared error
pub fn rmse(data: &GlucoseProfile, data_hat: &GlucoseProfile) -> Result<f64, AgataError> {
    let (y, y_hat) = paired_values(data, data_hat)?;
    if y.is_empty() {
        return Ok(f64::NAN);
    }
    Ok(root_mean_squared(&y, &y_hat))
}

/// Mean absolute relative difference (%)
pub fn mard(data: &GlucoseProfile, data_hat: &GlucoseProfile) -> Result<f64, AgataError> {
    let (y, y_hat) = paired_values(data, data_hat)?;
    if y.is_empty() {
        return Ok(f64::NAN);
    }
    let total: f64 = y.iter().zip(&y_hat).map(|(a, b)| ((a - b) / a).abs()).sum();
    Ok(100.0 * total / y.len() as f64)
}

/// Coefficient of determination (%)
pub fn cod(data: &GlucoseProfile, data_hat: &GlucoseProfile) -> Result<f64, AgataError> {
    let (y, y_hat) = paired_values(data, data_hat)?;
    if y.is_empty() {
        return Ok(f64::NAN);
    }
    let mean = y.iter().sum::<f64>() / y.len() as f64;
    let ss_res: f64 = y.iter().zip(&y_hat).map(|(a, b)| (a - b).powi(2)).sum();
    let ss_tot: f64 = y.iter().map(|a| (a - mean).powi(2)).sum();
    Ok(100.0 * (1.0 - ss_res / ss_tot))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClarkeZone {
    A,
    B,
    C,
    D,
    E,
}

fn clarke_zone(y: f64, y_hat: f64) -> ClarkeZone {
    if (y_hat <= 70.0 && y <= 70.0) || (y_hat <= 1.2 * y && y_hat >= 0.8 * y) {
        ClarkeZone::A
    } else if (y >= 180.0 && y_hat <= 70.0) || (y <= 70.0 && y_hat >= 180.0) {
        ClarkeZone::E
    } else if ((70.0..=290.0).contains(&y) && y_hat >= y + 110.0)
        || ((130.0..=180.0).contains(&y) && y_hat <= 7.0 / 5.0 * y - 182.0)
    {
        ClarkeZone::C
    } else if (y >= 240.0 && (70.0..=180.0).contains(&y_hat))
        || (y <= 175.0 / 3.0 && (70.0..=180.0).contains(&y_hat))
        || ((175.0 / 3.0..=70.0).contains(&y) && y_hat >= 6.0 / 5.0 * y)
    {
        ClarkeZone::D
    } else {
        ClarkeZone::B
    }
}

/// Clarke error grid: percentage of pairs in each zone
pub fn clarke(data: &GlucoseProfile, data_hat: &GlucoseProfile) -> Result<ClarkeGrid, AgataError> {
    let (y, y_hat) = paired_values(data, data_hat)?;
    if y.is_empty() {
        return Ok(ClarkeGrid::nan());
    }

    let zones: Vec<ClarkeZone> = y.iter().zip(&y_hat).map(|(a, b)| clarke_zone(*a, *b)).collect();
    let share = |zone: ClarkeZone| {
        100.0 * zones.iter().filter(|z| **z == zone).count() as f64 / zones.len() as f64
    };

    Ok(ClarkeGrid {
        a: share(ClarkeZone::A),
        b: share(ClarkeZone::B),
        c: share(ClarkeZone::C),
        d: share(ClarkeZone::D),
        e: share(ClarkeZone::E),
    })
}

/// Direction of a C2 sigmoid step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigmoidKind {
    /// Rises over `[a, a + d]`
    GreaterEqual,
    /// Rises over `[a - d, a]`
    LessEqual,
}

/// Twice-differentiable step from 0 to 1 of width `d`
pub fn c2_sigmoid(x: f64, a: f64, d: f64, kind: SigmoidKind) -> f64 {
    let xi = match kind {
        SigmoidKind::GreaterEqual => 2.0 / d * (x - a - d / 2.0),
        SigmoidKind::LessEqual => 2.0 / d * (x - a + d / 2.0),
    };
    if xi <= -1.0 {
        0.0
    } else if xi >= 1.0 {
        1.0
    } else if xi <= 0.0 {
        0.5 * (-xi.powi(4) - 2.0 * xi.powi(3) + 2.0 * xi + 1.0)
    } else {
        0.5 * (xi.powi(4) - 2.0 * xi.powi(3) + 2.0 * xi + 1.0)
    }
}

const G_RMSE_ALPHA_L: f64 = 1.5;
const G_RMSE_ALPHA_H: f64 = 1.0;
const G_RMSE_D_L1: f64 = 10.0;
const G_RMSE_D_L2: f64 = 30.0;
const G_RMSE_D_H1: f64 = 20.0;
const G_RMSE_D_H2: f64 = 100.0;
const G_RMSE_LOW: f64 = 80.0;
const G_RMSE_HIGH: f64 = 250.0;

/// Glucose-specific RMSE.
///
/// Squared errors are weighted by an error-grid inspired cost that penalises
/// overestimation in hypoglycemia and underestimation in hyperglycemia.
pub fn g_rmse(data: &GlucoseProfile, data_hat: &GlucoseProfile) -> Result<f64, AgataError> {
    let (y, y_hat) = paired_values(data, data_hat)?;
    if y.is_empty() {
        return Ok(f64::NAN);
    }
    let total: f64 = y
        .iter()
        .zip(&y_hat)
        .map(|(&a, &b)| {
            let term_l = G_RMSE_ALPHA_L
                * c2_sigmoid(a, b, G_RMSE_D_L1, SigmoidKind::LessEqual)
                * c2_sigmoid(a, G_RMSE_LOW, G_RMSE_D_L2, SigmoidKind::LessEqual);
            let term_h = G_RMSE_ALPHA_H
                * c2_sigmoid(a, b, G_RMSE_D_H1, SigmoidKind::GreaterEqual)
                * c2_sigmoid(a, G_RMSE_HIGH, G_RMSE_D_H2, SigmoidKind::GreaterEqual);
            (1.0 + term_l + term_h) * (a - b).powi(2)
        })
        .sum();
    Ok((total / y.len() as f64).sqrt())
}

/// Delay (min) of a prediction with prediction horizon `ph` (min).
///
/// The estimate is shifted back one sample at a time, up to `ph`, and the
/// shift with the smallest RMSE gives the delay `ph - shift`.
pub fn time_delay(
    data: &GlucoseProfile,
    data_hat: &GlucoseProfile,
    ph: u32,
) -> Result<f64, AgataError> {
    let (y, y_hat) = paired_values(data, data_hat)?;
    let ts = match data.sample_time() {
        Some(ts) if ts > 0.0 && !y.is_empty() => ts,
        _ => return Ok(f64::NAN),
    };
    let max_shift = ((f64::from(ph) / ts) as usize).min(y.len() - 1);

    let mut best_shift = 0;
    let mut best_error = f64::INFINITY;
    for shift in 0..=max_shift {
        let error = root_mean_squared(&y[..y.len() - shift], &y_hat[shift..]);
        if error < best_error {
            best_error = error;
            best_shift = shift;
        }
    }
    Ok(f64::from(ph) - ts * best_shift as f64)
}

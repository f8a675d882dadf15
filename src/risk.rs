//! Glycemic risk indices
//!
//! Static indices built on the Kovatchev symmetrisation of the glucose scale
//! (LBGI, HBGI, BGRI, ADRR), the glycemia risk index (GRI) and the dynamic
//! risk, which modulates the static risk with the glucose rate of change.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::stats::nanmean;
use crate::time_in_ranges::{
    time_in_l1_hyperglycemia, time_in_l1_hypoglycemia, time_in_l2_hyperglycemia,
    time_in_l2_hypoglycemia,
};
use crate::types::{GlucoseProfile, GlycemicTarget, RiskMetrics};

const RISK_ALPHA: f64 = 1.084;
const RISK_BETA: f64 = 5.381;
const RISK_GAMMA: f64 = 1.509;

/// Glucose (mg/dl) at which the symmetrised risk is zero
const RISK_THRESHOLD: f64 = 112.5;

/// Symmetrised glucose scale
fn symmetrize(g: f64) -> f64 {
    RISK_GAMMA * (g.ln().powf(RISK_ALPHA) - RISK_BETA)
}

/// Low (hypo) risk of a reading
fn low_risk(g: f64) -> f64 {
    if g > RISK_THRESHOLD {
        0.0
    } else {
        10.0 * symmetrize(g).powi(2)
    }
}

/// High (hyper) risk of a reading
fn high_risk(g: f64) -> f64 {
    if g < RISK_THRESHOLD {
        0.0
    } else {
        10.0 * symmetrize(g).powi(2)
    }
}

/// Low blood glucose index
pub fn lbgi(profile: &GlucoseProfile) -> f64 {
    let risks: Vec<f64> = profile.non_missing().into_iter().map(low_risk).collect();
    nanmean(&risks)
}

/// High blood glucose index
pub fn hbgi(profile: &GlucoseProfile) -> f64 {
    let risks: Vec<f64> = profile.non_missing().into_iter().map(high_risk).collect();
    nanmean(&risks)
}

/// Blood glucose risk index: LBGI + HBGI
pub fn bgri(profile: &GlucoseProfile) -> f64 {
    lbgi(profile) + hbgi(profile)
}

/// Average daily risk range.
///
/// Mean over calendar days of the daily maximum low risk plus the daily
/// maximum high risk. Days without readings are skipped.
pub fn adrr(profile: &GlucoseProfile) -> f64 {
    let mut daily: BTreeMap<chrono::NaiveDate, (f64, f64)> = BTreeMap::new();
    for (t, &g) in profile.t.iter().zip(&profile.glucose) {
        if g.is_nan() {
            continue;
        }
        let entry = daily.entry(t.date()).or_insert((0.0, 0.0));
        entry.0 = entry.0.max(low_risk(g));
        entry.1 = entry.1.max(high_risk(g));
    }
    let ranges: Vec<f64> = daily.values().map(|(l, h)| l + h).collect();
    nanmean(&ranges)
}

/// Glycemia risk index, capped at 100.
///
/// Weighted sum of time in level 2 / level 1 hypo and hyperglycemia.
pub fn gri(profile: &GlucoseProfile) -> f64 {
    let target = GlycemicTarget::Diabetes;
    let v_low = time_in_l2_hypoglycemia(profile, target);
    let low = time_in_l1_hypoglycemia(profile, target);
    let v_high = time_in_l2_hyperglycemia(profile, target);
    let high = time_in_l1_hyperglycemia(profile, target);
    let gri = 3.0 * v_low + 2.4 * low + 1.6 * v_high + 0.8 * high;
    if gri.is_nan() {
        f64::NAN
    } else {
        gri.min(100.0)
    }
}

/// Function used to amplify the static risk with the rate of change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmplificationFunction {
    #[default]
    Tanh,
    Exp,
}

/// Dynamic risk parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DynamicRiskParams {
    pub amplification_function: AmplificationFunction,
    /// Intensity of amplification (> 1)
    pub maximum_amplification: f64,
    /// Rapidity of amplification (> 0)
    pub amplification_rapidity: f64,
    /// Damping of amplification (> 0)
    pub maximum_damping: f64,
}

impl Default for DynamicRiskParams {
    fn default() -> Self {
        Self {
            amplification_function: AmplificationFunction::Tanh,
            maximum_amplification: 2.5,
            amplification_rapidity: 2.0,
            maximum_damping: 0.6,
        }
    }
}

impl DynamicRiskParams {
    /// Modulation factor for a given risk derivative times rate of change
    fn modulation(&self, slope: f64) -> f64 {
        match self.amplification_function {
            AmplificationFunction::Exp => (self.maximum_amplification * slope).exp(),
            AmplificationFunction::Tanh => {
                let delta = (self.maximum_amplification - self.maximum_damping) / 2.0;
                let beta = delta + self.maximum_damping;
                let x = (1.0 - beta) / delta;
                let arg = self.amplification_rapidity * slope;
                if x.abs() < 1.0 {
                    delta * (arg + x.atanh()).tanh() + beta
                } else if x.abs() > 1.0 {
                    // atanh(x) = g0 + i*pi/2 and tanh(w + i*pi/2) = coth(w)
                    let g0 = 0.5 * ((1.0 + x) / (1.0 - x)).abs().ln();
                    delta / (arg + g0).tanh() + beta
                } else {
                    beta + x.signum() * delta
                }
            }
        }
    }
}

/// Dynamic risk of each reading.
///
/// The first reading has a rate of change of zero; readings next to a missing
/// value are NaN. An empty profile yields an empty series.
pub fn dynamic_risk(profile: &GlucoseProfile, params: &DynamicRiskParams) -> Vec<f64> {
    let g = &profile.glucose;
    if g.is_empty() {
        return Vec::new();
    }
    let ts = profile.sample_time().unwrap_or(f64::NAN);

    g.iter()
        .enumerate()
        .map(|(k, &value)| {
            let roc = if k == 0 { 0.0 } else { (value - g[k - 1]) / ts };
            let f = symmetrize(value);
            let risk = 10.0 * f * f;
            let static_risk = if f > 0.0 {
                risk
            } else if f < 0.0 {
                -risk
            } else {
                0.0
            };
            let l = value.ln();
            let dr_dg = 10.0
                * RISK_GAMMA.powi(2)
                * 2.0
                * RISK_ALPHA
                * (l.powf(2.0 * RISK_ALPHA - 1.0) - RISK_BETA * l.powf(RISK_ALPHA - 1.0))
                / value;
            static_risk * params.modulation(dr_dg * roc)
        })
        .collect()
}

/// Mean dynamic risk ignoring NaNs (NaN for an empty profile)
pub fn mean_dynamic_risk(profile: &GlucoseProfile, params: &DynamicRiskParams) -> f64 {
    nanmean(&dynamic_risk(profile, params))
}

/// All risk indices of a profile
pub fn compute_risk(profile: &GlucoseProfile) -> RiskMetrics {
    RiskMetrics {
        adrr: adrr(profile),
        lbgi: lbgi(profile),
        hbgi: hbgi(profile),
        bgri: bgri(profile),
        gri: gri(profile),
    }
}

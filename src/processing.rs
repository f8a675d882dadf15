//! Glucose trace processing
//!
//! Detrending, gap imputation and retiming onto a homogeneous grid.

use chrono::{Duration, NaiveDateTime, Timelike};
use tracing::debug;

use crate::error::AgataError;
use crate::inspection::find_nan_islands;
use crate::types::GlucoseProfile;
use crate::validation::check_homogeneous_timegrid;

/// Remove the linear trend joining the first and last available readings.
pub fn detrend_glucose(profile: &GlucoseProfile) -> Result<GlucoseProfile, AgataError> {
    check_homogeneous_timegrid(profile)?;

    let available: Vec<usize> = profile
        .glucose
        .iter()
        .enumerate()
        .filter(|(_, g)| !g.is_nan())
        .map(|(k, _)| k)
        .collect();

    let (first, last, ts) = match (available.first(), available.last(), profile.sample_time()) {
        (Some(&first), Some(&last), Some(ts)) if last > first => (first, last, ts),
        _ => return Ok(profile.clone()),
    };

    let slope =
        (profile.glucose[last] - profile.glucose[first]) / ((last - first) as f64 * ts);

    let glucose = profile
        .glucose
        .iter()
        .enumerate()
        .map(|(k, g)| g - slope * k as f64 * ts)
        .collect();

    Ok(GlucoseProfile {
        t: profile.t.clone(),
        glucose,
    })
}

/// Linearly interpolate missing-data gaps no longer than `max_gap` minutes.
///
/// Gaps touching either end of the trace have nothing to interpolate from
/// and stay missing.
pub fn impute_glucose(profile: &GlucoseProfile, max_gap: u32) -> Result<GlucoseProfile, AgataError> {
    check_homogeneous_timegrid(profile)?;

    let ts = match profile.sample_time() {
        Some(ts) if ts > 0.0 => ts,
        _ => return Ok(profile.clone()),
    };
    let th = (f64::from(max_gap) / ts).round() as usize;
    let islands = find_nan_islands(profile, th);

    let mut glucose = profile.glucose.clone();
    for (&start, &end) in islands.nan_start.iter().zip(&islands.nan_end) {
        if end - start + 1 >= th || start == 0 || end + 1 >= glucose.len() {
            continue;
        }
        let (k0, k1) = (start - 1, end + 1);
        let (g0, g1) = (profile.glucose[k0], profile.glucose[k1]);
        for (k, value) in glucose.iter_mut().enumerate().take(end + 1).skip(start) {
            *value = g0 + (g1 - g0) * (k - k0) as f64 / (k1 - k0) as f64;
        }
    }

    debug!(
        imputed = islands.short_nan.len(),
        max_gap, "imputed short missing-data gaps"
    );

    Ok(GlucoseProfile {
        t: profile.t.clone(),
        glucose,
    })
}

/// Retime a profile onto a homogeneous grid with a step of `timestep` minutes.
///
/// The grid starts at the first timestamp truncated to the minute and stops
/// before the last timestamp. Each available reading goes to its nearest grid
/// point (the earlier one on ties); readings sharing a grid point are averaged.
pub fn retime_glucose(profile: &GlucoseProfile, timestep: u32) -> Result<GlucoseProfile, AgataError> {
    if timestep == 0 {
        return Err(AgataError::Validation(
            "retime timestep must be positive".to_string(),
        ));
    }
    let (first, last) = match (profile.t.first(), profile.t.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Ok(GlucoseProfile::empty()),
    };

    let start = truncate_to_minute(first);
    let step = Duration::minutes(i64::from(timestep));
    let mut t = Vec::new();
    let mut current = start;
    while current < last {
        t.push(current);
        current += step;
    }
    if t.is_empty() {
        return Ok(GlucoseProfile::empty());
    }

    let step_seconds = step.num_seconds() as f64;
    let mut sums = vec![0.0; t.len()];
    let mut counts = vec![0usize; t.len()];

    for (ts, g) in profile.t.iter().zip(&profile.glucose) {
        if g.is_nan() {
            continue;
        }
        let offset = (*ts - start).num_milliseconds() as f64 / 1000.0 / step_seconds;
        // Halfway points round down to the earlier grid point
        let nearest = (offset - 0.5).ceil().max(0.0) as usize;
        let idx = nearest.min(t.len() - 1);
        sums[idx] += g;
        counts[idx] += 1;
    }

    let glucose = sums
        .iter()
        .zip(&counts)
        .map(|(s, &c)| if c == 0 { f64::NAN } else { s / c as f64 })
        .collect();

    debug!(
        input_samples = profile.len(),
        grid_points = t.len(),
        timestep,
        "retimed glucose profile"
    );

    Ok(GlucoseProfile { t, glucose })
}

fn truncate_to_minute(t: NaiveDateTime) -> NaiveDateTime {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::default_start_time;
    use chrono::Timelike;

    const NAN: f64 = f64::NAN;

    #[test]
    fn test_detrend_glucose() {
        let mut glucose: Vec<f64> = (0..20).map(|k| 100.0 + 5.0 * k as f64).collect();
        glucose[0..3].fill(NAN);
        glucose[9..20].fill(NAN);
        let profile = GlucoseProfile::from_vector(glucose, 5, None);

        let result = detrend_glucose(&profile).unwrap();
        for k in 3..9 {
            assert!((result.glucose[k] - 100.0).abs() < 1e-9);
        }
        assert!(result.glucose[0..3].iter().all(|g| g.is_nan()));
        assert!(result.glucose[9..20].iter().all(|g| g.is_nan()));
    }

    #[test]
    fn test_detrend_single_sample() {
        let profile = GlucoseProfile::from_vector(vec![100.0], 5, None);
        let result = detrend_glucose(&profile).unwrap();
        assert_eq!(result.glucose, vec![100.0]);
    }

    #[test]
    fn test_impute_glucose() {
        let mut glucose = vec![120.0; 25];
        glucose[1..3].fill(NAN);
        glucose[9..20].fill(NAN);
        glucose[21] = NAN;
        let profile = GlucoseProfile::from_vector(glucose, 5, None);

        let result = impute_glucose(&profile, 15).unwrap();
        assert_eq!(result.len(), profile.len());
        assert_eq!(result.glucose[1], 120.0);
        assert_eq!(result.glucose[2], 120.0);
        assert_eq!(result.glucose[21], 120.0);
        assert!(result.glucose[9..20].iter().all(|g| g.is_nan()));
    }

    #[test]
    fn test_impute_interpolates_linearly_and_skips_borders() {
        let profile =
            GlucoseProfile::from_vector(vec![NAN, 100.0, NAN, NAN, 130.0, NAN], 5, None);
        let result = impute_glucose(&profile, 15).unwrap();
        assert!(result.glucose[0].is_nan());
        assert!((result.glucose[2] - 110.0).abs() < 1e-9);
        assert!((result.glucose[3] - 120.0).abs() < 1e-9);
        assert!(result.glucose[5].is_nan());
    }

    fn make_jittered_profile() -> GlucoseProfile {
        let t0 = default_start_time();
        let seconds = [17, 33, 58, 58, 10, 59];
        let t = seconds
            .iter()
            .enumerate()
            .map(|(k, s)| t0 + Duration::minutes(5 * k as i64) + Duration::seconds(*s))
            .collect();
        GlucoseProfile::new(t, vec![40.0, 50.0, NAN, NAN, 120.0, 120.0]).unwrap()
    }

    #[test]
    fn test_retime_glucose_same_step() {
        let result = retime_glucose(&make_jittered_profile(), 5).unwrap();
        assert_eq!(result.len(), 6);
        assert_eq!(result.glucose[0], 40.0);
        assert_eq!(result.glucose[1], 50.0);
        assert!(result.glucose[2].is_nan());
        assert!(result.glucose[3].is_nan());
        assert_eq!(result.glucose[4], 120.0);
        assert_eq!(result.glucose[5], 120.0);
        for (k, t) in result.t.iter().enumerate() {
            assert_eq!(t.second(), 0);
            assert_eq!(t.minute() as usize, 5 * k);
        }
    }

    #[test]
    fn test_retime_glucose_coarser_steps() {
        let result = retime_glucose(&make_jittered_profile(), 10).unwrap();
        assert_eq!(result.glucose, vec![40.0, 50.0, 120.0]);
        assert_eq!(result.t[2].minute(), 20);

        let result = retime_glucose(&make_jittered_profile(), 12).unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(result.glucose[0], 45.0);
        assert!(result.glucose[1].is_nan());
        assert_eq!(result.glucose[2], 120.0);
        assert_eq!(result.t[1].minute(), 12);
        assert_eq!(result.t[2].minute(), 24);
    }

    #[test]
    fn test_retime_rejects_zero_step() {
        assert!(retime_glucose(&make_jittered_profile(), 0).is_err());
        assert!(retime_glucose(&GlucoseProfile::empty(), 5).unwrap().is_empty());
    }
}

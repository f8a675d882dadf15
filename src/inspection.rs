//! Data inspection
//!
//! Missing-data islands and data quality indicators.

use crate::types::{GlucoseProfile, NanIslands};

const MINUTES_PER_DAY: f64 = 1440.0;

/// Locate runs of missing readings and classify them by length.
///
/// An island is "long" when it spans at least `th` samples.
pub fn find_nan_islands(profile: &GlucoseProfile, th: usize) -> NanIslands {
    let mut islands = NanIslands::default();
    let mut k = 0;
    let g = &profile.glucose;

    while k < g.len() {
        if !g[k].is_nan() {
            k += 1;
            continue;
        }
        let start = k;
        while k + 1 < g.len() && g[k + 1].is_nan() {
            k += 1;
        }
        let end = k;

        islands.nan_start.push(start);
        islands.nan_end.push(end);
        if end - start + 1 >= th {
            islands.long_nan.extend(start..=end);
        } else {
            islands.short_nan.extend(start..=end);
        }
        k += 1;
    }

    islands
}

/// Percentage of missing readings (NaN for an empty profile)
pub fn missing_glucose_percentage(profile: &GlucoseProfile) -> f64 {
    if profile.is_empty() {
        return f64::NAN;
    }
    100.0 * profile.missing_count() as f64 / profile.len() as f64
}

/// Days spanned by the profile, from the first to the last timestamp
pub fn number_days_of_observation(profile: &GlucoseProfile) -> f64 {
    match (profile.t.first(), profile.t.last()) {
        (Some(first), Some(last)) => (*last - *first).num_seconds() as f64 / 60.0 / MINUTES_PER_DAY,
        _ => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAN: f64 = f64::NAN;

    fn make_gappy_profile() -> GlucoseProfile {
        let mut glucose = vec![0.0; 24];
        glucose[..4].copy_from_slice(&[40.0, 50.0, 50.0, 80.0]);
        glucose[4..9].fill(NAN);
        glucose[10..15].copy_from_slice(&[200.0, 200.0, 260.0, 260.0, 260.0]);
        glucose[15] = NAN;
        glucose[16] = NAN;
        glucose[17] = 180.0;
        glucose[18] = NAN;
        glucose[19] = 140.0;
        glucose[20..24].fill(NAN);
        GlucoseProfile::from_vector(glucose, 5, None)
    }

    #[test]
    fn test_nan_island_bounds() {
        let islands = find_nan_islands(&make_gappy_profile(), 2);
        assert_eq!(islands.nan_start, vec![4, 15, 18, 20]);
        assert_eq!(islands.nan_end, vec![8, 16, 18, 23]);
    }

    #[test]
    fn test_nan_island_classification() {
        let profile = make_gappy_profile();

        let islands = find_nan_islands(&profile, 3);
        assert_eq!(islands.short_nan, vec![15, 16, 18]);

        let islands = find_nan_islands(&profile, 4);
        assert_eq!(islands.long_nan, vec![4, 5, 6, 7, 8, 20, 21, 22, 23]);

        let islands = find_nan_islands(&profile, 10_000);
        assert_eq!(islands.short_nan.len(), 12);
        assert!(islands.long_nan.is_empty());

        let islands = find_nan_islands(&profile, 1);
        assert!(islands.short_nan.is_empty());
        assert_eq!(islands.long_nan.len(), 12);
    }

    #[test]
    fn test_nan_islands_edge_cases() {
        let complete = GlucoseProfile::from_vector(vec![40.0, 50.0, 50.0], 5, None);
        assert_eq!(find_nan_islands(&complete, 1), NanIslands::default());

        let single = GlucoseProfile::from_vector(vec![120.0, NAN], 5, None);
        let islands = find_nan_islands(&single, 1);
        assert_eq!(islands.long_nan, vec![1]);
        assert!(islands.short_nan.is_empty());

        let islands = find_nan_islands(&single, 2);
        assert_eq!(islands.short_nan, vec![1]);
        assert_eq!(islands.nan_start, vec![1]);
        assert_eq!(islands.nan_end, vec![1]);
    }

    #[test]
    fn test_missing_glucose_percentage() {
        let profile = GlucoseProfile::from_vector(
            vec![NAN, 50.0, 50.0, 80.0, 120.0, 120.0, 200.0, 200.0, 260.0, 260.0],
            5,
            None,
        );
        assert!((missing_glucose_percentage(&profile) - 10.0).abs() < 1e-9);
        assert!(missing_glucose_percentage(&GlucoseProfile::empty()).is_nan());
    }

    #[test]
    fn test_number_days_of_observation() {
        let mut glucose = vec![120.0; 85];
        glucose[80] = NAN;
        let profile = GlucoseProfile::from_vector(glucose, 5, None);
        assert!((number_days_of_observation(&profile) - 420.0 / 1440.0).abs() < 1e-9);
        assert!(number_days_of_observation(&GlucoseProfile::empty()).is_nan());
    }
}

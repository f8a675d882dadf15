//! Input validation
//!
//! Checks shared by the operations that assume a regular time grid or that
//! compare two traces sample by sample.

use crate::error::AgataError;
use crate::types::GlucoseProfile;

/// Ensure all consecutive timestamps are separated by the same interval
pub fn check_homogeneous_timegrid(profile: &GlucoseProfile) -> Result<(), AgataError> {
    if profile.t.len() < 2 {
        return Ok(());
    }
    let step = profile.t[1] - profile.t[0];
    match profile.t.windows(2).position(|w| w[1] - w[0] != step) {
        None => Ok(()),
        Some(k) => Err(AgataError::Validation(format!(
            "time grid is not homogeneous: step {} min between samples {} and {} differs from {} min",
            (profile.t[k + 1] - profile.t[k]).num_minutes(),
            k,
            k + 1,
            step.num_minutes()
        ))),
    }
}

/// Ensure two profiles have the same number of samples
pub fn check_same_length(a: &GlucoseProfile, b: &GlucoseProfile) -> Result<(), AgataError> {
    if a.len() != b.len() {
        return Err(AgataError::Validation(format!(
            "profiles must have the same length ({} vs {})",
            a.len(),
            b.len()
        )));
    }
    Ok(())
}

/// Ensure two profiles cover the same samples: same length, same first and last timestamp
pub fn check_comparable(a: &GlucoseProfile, b: &GlucoseProfile) -> Result<(), AgataError> {
    check_same_length(a, b)?;
    if a.t.first() != b.t.first() {
        return Err(AgataError::Validation(
            "profiles must start at the same timestamp".to_string(),
        ));
    }
    if a.t.last() != b.t.last() {
        return Err(AgataError::Validation(
            "profiles must end at the same timestamp".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::default_start_time;
    use chrono::Duration;

    #[test]
    fn test_homogeneous_timegrid() {
        let profile = GlucoseProfile::from_vector(vec![100.0; 5], 5, None);
        assert!(check_homogeneous_timegrid(&profile).is_ok());
        assert!(check_homogeneous_timegrid(&GlucoseProfile::empty()).is_ok());

        let t0 = default_start_time();
        let uneven = GlucoseProfile::new(
            vec![t0, t0 + Duration::minutes(5), t0 + Duration::minutes(15)],
            vec![100.0, 110.0, 120.0],
        )
        .unwrap();
        assert!(matches!(
            check_homogeneous_timegrid(&uneven),
            Err(AgataError::Validation(_))
        ));
    }

    #[test]
    fn test_comparable() {
        let a = GlucoseProfile::from_vector(vec![100.0; 4], 5, None);
        let b = GlucoseProfile::from_vector(vec![120.0; 4], 5, None);
        assert!(check_comparable(&a, &b).is_ok());

        let shorter = GlucoseProfile::from_vector(vec![120.0; 3], 5, None);
        assert!(check_same_length(&a, &shorter).is_err());
        assert!(check_comparable(&a, &shorter).is_err());

        let shifted = GlucoseProfile::from_vector(
            vec![120.0; 4],
            5,
            Some(default_start_time() + Duration::minutes(5)),
        );
        assert!(check_comparable(&a, &shifted).is_err());
    }
}

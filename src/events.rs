//! Glycemic event detection
//!
//! An event starts once the glucose has stayed beyond a threshold for at least
//! 15 minutes and ends once it has stayed back on the other side for at least
//! 15 minutes. Missing readings interrupt both runs.

use chrono::{Duration, NaiveDateTime};

use crate::inspection::number_days_of_observation;
use crate::types::{
    GlucoseProfile, GlycemicEvents, HyperglycemicEventsByLevel, HypoglycemicEventsByLevel,
};

/// Minimum duration (minutes) of an excursion to open or close an event
pub const MIN_EVENT_DURATION: f64 = 15.0;

/// Minimum duration (minutes) of an extended hypoglycemic event
pub const EXTENDED_HYPO_DURATION: f64 = 120.0;

pub const HYPO_THRESHOLD: f64 = 70.0;
pub const L2_HYPO_THRESHOLD: f64 = 54.0;
pub const HYPER_THRESHOLD: f64 = 180.0;
pub const L2_HYPER_THRESHOLD: f64 = 250.0;

/// Side of the threshold that counts as "in event"
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventCondition {
    /// Glucose strictly below the threshold
    Below(f64),
    /// Glucose strictly above the threshold
    Above(f64),
}

impl EventCondition {
    fn holds(&self, g: f64) -> bool {
        match *self {
            EventCondition::Below(th) => g < th,
            EventCondition::Above(th) => g > th,
        }
    }
}

/// Find events where the glucose stays on one side of a threshold
pub fn find_events(profile: &GlucoseProfile, condition: EventCondition) -> GlycemicEvents {
    if profile.is_empty() {
        return summarize(Vec::new(), Vec::new(), f64::NAN);
    }
    let days = number_days_of_observation(profile);
    let ts = match profile.sample_time() {
        Some(ts) if ts > 0.0 => ts,
        _ => return summarize(Vec::new(), Vec::new(), days),
    };
    let required = (MIN_EVENT_DURATION / ts).ceil().max(1.0) as usize;

    let mut starts = Vec::new();
    let mut ends = Vec::new();

    let mut in_event = false;
    // First index of the current in-condition (or out-of-condition) run
    let mut run_start = 0usize;
    let mut run_len = 0usize;

    for (k, &g) in profile.glucose.iter().enumerate() {
        if g.is_nan() {
            run_len = 0;
            continue;
        }
        // While outside an event we count in-condition samples, inside we count exits
        let counts = condition.holds(g) != in_event;
        if !counts {
            run_len = 0;
            continue;
        }
        if run_len == 0 {
            run_start = k;
        }
        run_len += 1;
        if run_len >= required {
            if in_event {
                ends.push(profile.t[run_start]);
            } else {
                starts.push(profile.t[run_start]);
            }
            in_event = !in_event;
            run_len = 0;
        }
    }

    if in_event {
        let end = match (run_len > 0, profile.t.last()) {
            (true, _) => profile.t[run_start],
            (false, Some(last)) => *last + Duration::seconds((ts * 60.0).round() as i64),
            (false, None) => profile.t[run_start],
        };
        ends.push(end);
    }

    summarize(starts, ends, days)
}

fn summarize(
    time_start: Vec<NaiveDateTime>,
    time_end: Vec<NaiveDateTime>,
    days_of_observation: f64,
) -> GlycemicEvents {
    let duration: Vec<f64> = time_start
        .iter()
        .zip(&time_end)
        .map(|(s, e)| (*e - *s).num_seconds() as f64 / 60.0)
        .collect();
    events_from_parts(time_start, time_end, duration, days_of_observation)
}

fn events_from_parts(
    time_start: Vec<NaiveDateTime>,
    time_end: Vec<NaiveDateTime>,
    duration: Vec<f64>,
    days_of_observation: f64,
) -> GlycemicEvents {
    let mean_duration = if duration.is_empty() {
        f64::NAN
    } else {
        duration.iter().sum::<f64>() / duration.len() as f64
    };
    let events_per_week = if days_of_observation.is_nan() {
        f64::NAN
    } else if duration.is_empty() {
        0.0
    } else {
        duration.len() as f64 / days_of_observation * 7.0
    };
    GlycemicEvents {
        time_start,
        time_end,
        duration,
        mean_duration,
        events_per_week,
    }
}

/// Keep only the events matching `keep`, recomputing the summary values
fn filter_events<F>(events: &GlycemicEvents, days: f64, keep: F) -> GlycemicEvents
where
    F: Fn(NaiveDateTime, NaiveDateTime, f64) -> bool,
{
    let mut time_start = Vec::new();
    let mut time_end = Vec::new();
    let mut duration = Vec::new();
    for ((s, e), d) in events
        .time_start
        .iter()
        .zip(&events.time_end)
        .zip(&events.duration)
    {
        if keep(*s, *e, *d) {
            time_start.push(*s);
            time_end.push(*e);
            duration.push(*d);
        }
    }
    events_from_parts(time_start, time_end, duration, days)
}

fn overlaps_any(start: NaiveDateTime, end: NaiveDateTime, inner: &GlycemicEvents) -> bool {
    inner
        .time_start
        .iter()
        .zip(&inner.time_end)
        .any(|(s, e)| *s < end && *e > start)
}

/// Hypoglycemic events: glucose below `th` (default 70 mg/dl) for at least 15 minutes
pub fn find_hypoglycemic_events(profile: &GlucoseProfile, th: f64) -> GlycemicEvents {
    find_events(profile, EventCondition::Below(th))
}

/// Hyperglycemic events: glucose above `th` (default 180 mg/dl) for at least 15 minutes
pub fn find_hyperglycemic_events(profile: &GlucoseProfile, th: f64) -> GlycemicEvents {
    find_events(profile, EventCondition::Above(th))
}

/// Hypoglycemic events lasting at least 120 minutes
pub fn find_extended_hypoglycemic_events(profile: &GlucoseProfile, th: f64) -> GlycemicEvents {
    let events = find_hypoglycemic_events(profile, th);
    let days = number_days_of_observation(profile);
    filter_events(&events, days, |_, _, d| d >= EXTENDED_HYPO_DURATION)
}

/// Hypoglycemic events split into level 1 (54-70 mg/dl) and level 2 (< 54 mg/dl)
pub fn find_hypoglycemic_events_by_level(profile: &GlucoseProfile) -> HypoglycemicEventsByLevel {
    let hypo = find_hypoglycemic_events(profile, HYPO_THRESHOLD);
    let l2 = find_hypoglycemic_events(profile, L2_HYPO_THRESHOLD);
    let days = number_days_of_observation(profile);
    let l1 = filter_events(&hypo, days, |s, e, _| !overlaps_any(s, e, &l2));
    HypoglycemicEventsByLevel { hypo, l1, l2 }
}

/// Hyperglycemic events split into level 1 (180-250 mg/dl) and level 2 (> 250 mg/dl)
pub fn find_hyperglycemic_events_by_level(profile: &GlucoseProfile) -> HyperglycemicEventsByLevel {
    let hyper = find_hyperglycemic_events(profile, HYPER_THRESHOLD);
    let l2 = find_hyperglycemic_events(profile, L2_HYPER_THRESHOLD);
    let days = number_days_of_observation(profile);
    let l1 = filter_events(&hyper, days, |s, e, _| !overlaps_any(s, e, &l2));
    HyperglycemicEventsByLevel { hyper, l1, l2 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::default_start_time;

    const NAN: f64 = f64::NAN;

    fn at(hours: i64, minutes: i64) -> NaiveDateTime {
        default_start_time() + Duration::minutes(hours * 60 + minutes)
    }

    /// 85 samples at 5 min with four excursions at `level`
    fn make_excursion_profile(level: f64) -> GlucoseProfile {
        let mut glucose = vec![120.0; 85];
        glucose[9..13].fill(level);
        glucose[29..60].fill(level);
        glucose[31..33].fill(NAN);
        glucose[61..63].fill(level);
        glucose[69..72].fill(level);
        glucose[75..78].fill(level);
        glucose[79..82].fill(level);
        glucose[80] = NAN;
        GlucoseProfile::from_vector(glucose, 5, None)
    }

    #[test]
    fn test_find_hypoglycemic_events() {
        let events = find_hypoglycemic_events(&make_excursion_profile(50.0), HYPO_THRESHOLD);

        assert_eq!(events.len(), 4);
        assert_eq!(events.time_start, vec![at(0, 45), at(2, 45), at(5, 45), at(6, 15)]);
        assert_eq!(events.duration, vec![20.0, 150.0, 15.0, 35.0]);
        assert_eq!(events.time_end[1], at(2, 45) + Duration::minutes(150));
        assert!((events.mean_duration - 55.0).abs() < 1e-9);
        assert!((events.events_per_week - 96.0).abs() < 1e-9);
    }

    #[test]
    fn test_find_hypoglycemic_events_without_events() {
        let events = find_hypoglycemic_events(&make_excursion_profile(50.0), 45.0);
        assert!(events.is_empty());
        assert!(events.mean_duration.is_nan());
        assert_eq!(events.events_per_week, 0.0);

        let flat = GlucoseProfile::from_vector(vec![120.0; 85], 5, None);
        let events = find_hypoglycemic_events(&flat, HYPO_THRESHOLD);
        assert!(events.is_empty());
        assert_eq!(events.events_per_week, 0.0);

        let events = find_hypoglycemic_events(&GlucoseProfile::empty(), HYPO_THRESHOLD);
        assert!(events.is_empty());
        assert!(events.mean_duration.is_nan());
        assert!(events.events_per_week.is_nan());
    }

    #[test]
    fn test_event_open_at_end_of_trace() {
        let mut glucose = vec![120.0; 87];
        glucose[84..87].fill(50.0);
        let profile = GlucoseProfile::from_vector(glucose.clone(), 5, None);
        let events = find_hypoglycemic_events(&profile, HYPO_THRESHOLD);
        assert_eq!(events.time_start.last(), Some(&at(7, 0)));
        assert_eq!(events.time_end.last(), Some(&at(7, 15)));
        assert_eq!(events.duration.last(), Some(&15.0));

        // A pending exit run closes the event at its first sample
        glucose.push(100.0);
        let profile = GlucoseProfile::from_vector(glucose, 5, None);
        let events = find_hypoglycemic_events(&profile, HYPO_THRESHOLD);
        assert_eq!(events.time_end.last(), Some(&at(7, 15)));
        assert_eq!(events.duration.last(), Some(&15.0));
    }

    #[test]
    fn test_find_extended_hypoglycemic_events() {
        let profile = make_excursion_profile(50.0);
        let events = find_extended_hypoglycemic_events(&profile, HYPO_THRESHOLD);
        assert_eq!(events.time_start, vec![at(2, 45)]);
        assert_eq!(events.duration, vec![150.0]);
        assert!((events.mean_duration - 150.0).abs() < 1e-9);
        assert!((events.events_per_week - 24.0).abs() < 1e-9);

        let events = find_extended_hypoglycemic_events(&profile, 45.0);
        assert!(events.is_empty());
        assert_eq!(events.events_per_week, 0.0);

        let events = find_extended_hypoglycemic_events(&GlucoseProfile::empty(), HYPO_THRESHOLD);
        assert!(events.events_per_week.is_nan());
    }

    #[test]
    fn test_find_hyperglycemic_events_by_level() {
        let mut profile = make_excursion_profile(200.0);
        profile.glucose[34..40].fill(300.0);
        profile.glucose[44..50].fill(300.0);

        let events = find_hyperglycemic_events_by_level(&profile);

        assert_eq!(events.hyper.len(), 4);
        assert!((events.hyper.mean_duration - 55.0).abs() < 1e-9);
        assert!((events.hyper.events_per_week - 96.0).abs() < 1e-9);

        assert_eq!(events.l1.time_start, vec![at(0, 45), at(5, 45), at(6, 15)]);
        assert_eq!(events.l1.duration, vec![20.0, 15.0, 35.0]);
        assert!((events.l1.mean_duration - 70.0 / 3.0).abs() < 1e-9);
        assert!((events.l1.events_per_week - 72.0).abs() < 1e-9);

        assert_eq!(events.l2.time_start, vec![at(2, 50), at(3, 40)]);
        assert_eq!(events.l2.duration, vec![30.0, 30.0]);
        assert!((events.l2.events_per_week - 48.0).abs() < 1e-9);
    }

    #[test]
    fn test_find_hypoglycemic_events_by_level() {
        let mut profile = make_excursion_profile(60.0);
        profile.glucose[34..40].fill(45.0);

        let events = find_hypoglycemic_events_by_level(&profile);
        assert_eq!(events.hypo.len(), 4);
        assert_eq!(events.l2.time_start, vec![at(2, 50)]);
        assert_eq!(events.l1.len(), 3);

        let flat = GlucoseProfile::from_vector(vec![120.0; 85], 5, None);
        let events = find_hypoglycemic_events_by_level(&flat);
        assert!(events.l1.is_empty());
        assert!(events.l1.mean_duration.is_nan());
        assert_eq!(events.l2.events_per_week, 0.0);
    }
}

//! Step-size outlier rejection between consecutive points.
//!
//! Each metric is checked on its own against the previous point. A rejected
//! speed or grade holds the previous value; a rejected distance step is
//! replaced by dead reckoning from the previous speed.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::{elapsed_seconds, grade, planar_distance, speed};
use crate::{DerivedPoint, Params, RawPoint, TmError};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StepLimits {
    pub max_speed_step_mph: f64,
    pub max_grade_step_pct: f64,
    pub max_distance_step_mi: f64,
}

impl Default for StepLimits {
    fn default() -> Self {
        Self {
            max_speed_step_mph: 10.0,
            max_grade_step_pct: 20.0,
            max_distance_step_mi: 0.1,
        }
    }
}

impl StepLimits {
    pub fn validate(&self) -> Result<(), TmError> {
        for (name, value) in [
            ("max_speed_step_mph", self.max_speed_step_mph),
            ("max_grade_step_pct", self.max_grade_step_pct),
            ("max_distance_step_mi", self.max_distance_step_mi),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(TmError::InvalidParameter(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ClampedStep {
    pub distance_mi: f64,
    pub speed_mph: f64,
    pub grade_pct: f64,
    pub speed_rejected: bool,
    pub grade_rejected: bool,
    pub distance_rejected: bool,
}

/// Returns `previous` when `candidate` jumps by `max_step` or more.
pub fn hold_if_jump(previous: f64, candidate: f64, max_step: f64) -> (f64, bool) {
    if (candidate - previous).abs() >= max_step {
        (previous, true)
    } else {
        (candidate, false)
    }
}

/// Derive the clamped distance, speed and grade for `next` following `prev`.
pub fn clamp_step(
    prev: &DerivedPoint,
    next: &RawPoint,
    limits: &StepLimits,
    params: &Params,
) -> Result<ClampedStep, TmError> {
    let candidate_speed = speed(&prev.raw, next, params.distance_axes, &params.scale)?;
    let candidate_grade = grade(&prev.raw, next, params.grade_axes, &params.scale)?;
    let candidate_step = planar_distance(&prev.raw, next, params.distance_axes, &params.scale)?;

    let (speed_mph, speed_rejected) =
        hold_if_jump(prev.speed_mph, candidate_speed, limits.max_speed_step_mph);
    if speed_rejected {
        debug!(
            candidate = candidate_speed,
            held = prev.speed_mph,
            "speed step rejected"
        );
    }

    let (grade_pct, grade_rejected) =
        hold_if_jump(prev.grade_pct, candidate_grade, limits.max_grade_step_pct);
    if grade_rejected {
        debug!(
            candidate = candidate_grade,
            held = prev.grade_pct,
            "grade step rejected"
        );
    }

    let distance_rejected = candidate_step >= limits.max_distance_step_mi;
    let step = if distance_rejected {
        let hours = elapsed_seconds(prev.raw.timestamp, next.timestamp) / 3_600.0;
        let reckoned = prev.speed_mph * hours;
        debug!(
            candidate = candidate_step,
            reckoned, "distance step rejected"
        );
        reckoned
    } else {
        candidate_step
    };

    Ok(ClampedStep {
        distance_mi: prev.distance_mi + step,
        speed_mph,
        grade_pct,
        speed_rejected,
        grade_rejected,
        distance_rejected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::FT_PER_DEG_LAT;
    use crate::test_support::pt;

    fn derived(raw: RawPoint, distance_mi: f64, speed_mph: f64, grade_pct: f64) -> DerivedPoint {
        DerivedPoint {
            raw,
            distance_mi,
            speed_mph,
            grade_pct,
            duration_s: 0.0,
            speed_window_avg: speed_mph,
            grade_window_avg: grade_pct,
            elevation_window_avg: Some(raw.elevation),
        }
    }

    #[test]
    fn spike_holds_previous_value() {
        assert_eq!(hold_if_jump(10.0, 10_000.0, 10.0), (10.0, true));
        assert_eq!(hold_if_jump(10.0, 19.5, 10.0), (19.5, false));
        // the threshold itself is a rejection
        assert_eq!(hold_if_jump(10.0, 20.0, 10.0), (10.0, true));
        assert_eq!(hold_if_jump(10.0, 0.0, 10.0), (10.0, true));
    }

    #[test]
    fn checks_are_independent() {
        let params = Params::refined(StepLimits::default());
        let limits = params.clamp.unwrap();
        let prev = derived(pt(40.0, -105.0, 1_000.0, 0), 1.0, 6.0, 2.0);
        // 30 ft north in 1 s: ~20 mph, a speed spike; flat so grade is 0.
        let next = pt(40.0 + 30.0 / FT_PER_DEG_LAT, -105.0, 1_000.0, 1_000);
        let step = clamp_step(&prev, &next, &limits, &params).unwrap();
        assert!(step.speed_rejected);
        assert_eq!(step.speed_mph, 6.0);
        assert!(!step.grade_rejected);
        assert_eq!(step.grade_pct, 0.0);
        assert!(!step.distance_rejected);
        assert!((step.distance_mi - (1.0 + 30.0 / 5_280.0)).abs() < 1e-9);
    }

    #[test]
    fn steep_step_holds_grade_but_keeps_speed() {
        let params = Params::refined(StepLimits::default());
        let limits = params.clamp.unwrap();
        let prev = derived(pt(40.0, -105.0, 1_000.0, 0), 0.5, 1.0, 2.0);
        // 10 ft run with a 5 ft rise in 5 s: 50% grade at ~1.4 mph
        let next = pt(40.0 + 10.0 / FT_PER_DEG_LAT, -105.0, 1_005.0, 5_000);
        let step = clamp_step(&prev, &next, &limits, &params).unwrap();
        assert!(step.grade_rejected);
        assert_eq!(step.grade_pct, 2.0);
        assert!(!step.speed_rejected);
        assert!((step.speed_mph - 105f64.sqrt() / 5_280.0 * 720.0).abs() < 1e-6);
        assert!(!step.distance_rejected);
    }

    #[test]
    fn grade_limit_is_not_the_speed_limit() {
        let params = Params::refined(StepLimits {
            max_speed_step_mph: 100.0,
            max_grade_step_pct: 5.0,
            max_distance_step_mi: 0.1,
        });
        let limits = params.clamp.unwrap();
        let prev = derived(pt(40.0, -105.0, 1_000.0, 0), 0.0, 1.0, 0.0);
        // 100 ft run, 8 ft rise: 8% grade
        let next = pt(40.0 + 100.0 / FT_PER_DEG_LAT, -105.0, 1_008.0, 10_000);
        let step = clamp_step(&prev, &next, &limits, &params).unwrap();
        assert!(step.grade_rejected);
        assert_eq!(step.grade_pct, 0.0);
        assert!(!step.speed_rejected);
    }

    #[test]
    fn long_jump_dead_reckons_from_previous_speed() {
        let params = Params::refined(StepLimits::default());
        let limits = params.clamp.unwrap();
        let prev = derived(pt(40.0, -105.0, 1_000.0, 0), 2.0, 6.0, 0.0);
        // one mile north in one minute
        let next = pt(40.0 + 5_280.0 / FT_PER_DEG_LAT, -105.0, 1_000.0, 60_000);
        let step = clamp_step(&prev, &next, &limits, &params).unwrap();
        assert!(step.distance_rejected);
        assert!(step.speed_rejected);
        assert!((step.distance_mi - (2.0 + 6.0 / 60.0)).abs() < 1e-12);
    }

    #[test]
    fn zero_duration_still_fails() {
        let params = Params::refined(StepLimits::default());
        let limits = params.clamp.unwrap();
        let prev = derived(pt(40.0, -105.0, 1_000.0, 0), 0.0, 0.0, 0.0);
        let next = pt(40.0001, -105.0, 1_000.0, 0);
        let err = clamp_step(&prev, &next, &limits, &params).unwrap_err();
        assert!(matches!(err, TmError::UndefinedSpeed { .. }));
    }

    #[test]
    fn non_positive_limits_rejected() {
        let limits = StepLimits {
            max_grade_step_pct: 0.0,
            ..StepLimits::default()
        };
        assert!(matches!(limits.validate(), Err(TmError::InvalidParameter(_))));
    }
}

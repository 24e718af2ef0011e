//! Per-point kinematic metrics for GPS tracks implemented in Rust.
//!
//! A track is an ordered list of [`RawPoint`]s. [`derive_track`] folds it once,
//! front to back, into [`DerivedPoint`]s carrying cumulative distance, speed,
//! grade, elapsed time and trailing-window averages of those metrics.

pub mod clamp;
pub mod geometry;
pub mod pipeline;
pub mod record;
pub mod source;
pub mod summary;
pub mod window;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use clamp::StepLimits;
pub use geometry::{Axes, Scale};
pub use pipeline::{
    derive_track, derive_track_with_diagnostics, PipelineDiagnostics, TrackPipeline,
};
pub use record::CSV_HEADER;
pub use source::parse_points;
pub use summary::TrackSummary;
pub use window::RollingMean;

pub const DEFAULT_WINDOW: usize = 20;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TmError {
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to parse GPX file: {0}")]
    GpxParse(String),
    #[error("failed to parse FIT file: {0}")]
    FitParse(String),
    #[error("malformed input point #{index}: {reason}")]
    MalformedPoint { index: usize, reason: String },
    #[error("undefined speed at point #{index}: no time elapsed since previous point ({at})")]
    UndefinedSpeed { index: usize, at: DateTime<Utc> },
    #[error("undefined distance at point #{index}: negative quotient {quotient}")]
    UndefinedDistance { index: usize, quotient: f64 },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl TmError {
    /// Re-tag a per-step failure with the index of the point that caused it.
    pub(crate) fn at_index(self, index: usize) -> Self {
        match self {
            TmError::MalformedPoint { reason, .. } => TmError::MalformedPoint { index, reason },
            TmError::UndefinedSpeed { at, .. } => TmError::UndefinedSpeed { index, at },
            TmError::UndefinedDistance { quotient, .. } => {
                TmError::UndefinedDistance { index, quotient }
            }
            other => other,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Params {
    pub scale: Scale,
    /// Trailing window width in points.
    pub window: usize,
    pub distance_axes: Axes,
    pub grade_axes: Axes,
    /// Enables outlier clamping and elevation smoothing when set.
    pub clamp: Option<StepLimits>,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            scale: Scale::default(),
            window: DEFAULT_WINDOW,
            distance_axes: Axes::ALL,
            grade_axes: Axes::HORIZONTAL,
            clamp: None,
        }
    }
}

impl Params {
    pub fn refined(limits: StepLimits) -> Self {
        Self {
            clamp: Some(limits),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), TmError> {
        if self.window == 0 {
            return Err(TmError::InvalidParameter("window must be at least 1".into()));
        }
        self.scale.validate()?;
        if let Some(limits) = self.clamp.as_ref() {
            limits.validate()?;
        }
        Ok(())
    }
}

/// One geodetic sample as read from the track document.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Feet.
    pub elevation: f64,
    pub timestamp: DateTime<Utc>,
}

impl RawPoint {
    pub fn new(latitude: f64, longitude: f64, elevation: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            elevation,
            timestamp,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DerivedPoint {
    pub raw: RawPoint,
    pub distance_mi: f64,
    pub speed_mph: f64,
    pub grade_pct: f64,
    pub duration_s: f64,
    pub speed_window_avg: f64,
    pub grade_window_avg: f64,
    pub elevation_window_avg: Option<f64>,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::RawPoint;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 6, 5, 14, 0, 0).unwrap()
    }

    pub fn at(ms: i64) -> DateTime<Utc> {
        t0() + Duration::milliseconds(ms)
    }

    pub fn pt(lat: f64, lon: f64, ele: f64, ms: i64) -> RawPoint {
        RawPoint::new(lat, lon, ele, at(ms))
    }

    /// A gently climbing walk, one point every 5 seconds.
    pub fn walk(n: usize) -> Vec<RawPoint> {
        (0..n)
            .map(|i| {
                let f = i as f64;
                pt(
                    40.0 + f * 0.00002,
                    -105.0 + f * 0.000015 + (f * 0.7).sin() * 0.000004,
                    5280.0 + f * 0.8 + (f * 1.3).cos() * 0.5,
                    i as i64 * 5_000,
                )
            })
            .collect()
    }
}

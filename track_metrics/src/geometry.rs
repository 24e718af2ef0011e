//! Flat-earth geometry between consecutive track points.
//!
//! Distances use fixed feet-per-degree factors rather than a geodesic model.
//! The elevation delta enters the distance quotient unsquared; historical
//! output depends on it, so it is kept as is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{RawPoint, TmError};

pub const FT_PER_DEG_LAT: f64 = 362_776.87;
pub const FT_PER_DEG_LON: f64 = 365_165.34;
pub const FT_PER_MILE: f64 = 5_280.0;

const SECONDS_PER_HOUR: f64 = 3_600.0;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Scale {
    pub ft_per_deg_lat: f64,
    pub ft_per_deg_lon: f64,
    pub ft_per_mile: f64,
}

impl Default for Scale {
    fn default() -> Self {
        Self {
            ft_per_deg_lat: FT_PER_DEG_LAT,
            ft_per_deg_lon: FT_PER_DEG_LON,
            ft_per_mile: FT_PER_MILE,
        }
    }
}

impl Scale {
    pub fn validate(&self) -> Result<(), TmError> {
        for (name, value) in [
            ("ft_per_deg_lat", self.ft_per_deg_lat),
            ("ft_per_deg_lon", self.ft_per_deg_lon),
            ("ft_per_mile", self.ft_per_mile),
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

/// Which coordinate deltas take part in a distance.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Axes {
    pub latitude: bool,
    pub longitude: bool,
    pub elevation: bool,
}

impl Axes {
    pub const ALL: Axes = Axes {
        latitude: true,
        longitude: true,
        elevation: true,
    };
    pub const HORIZONTAL: Axes = Axes {
        latitude: true,
        longitude: true,
        elevation: false,
    };
}

impl Default for Axes {
    fn default() -> Self {
        Axes::ALL
    }
}

/// Distance in miles between `a` and `b` over the selected axes.
///
/// Latitude and longitude contribute squared foot offsets; elevation
/// contributes its raw foot delta. A negative quotient has no real root and
/// is reported as [`TmError::UndefinedDistance`].
pub fn planar_distance(
    a: &RawPoint,
    b: &RawPoint,
    axes: Axes,
    scale: &Scale,
) -> Result<f64, TmError> {
    let mut quotient = 0.0;
    if axes.latitude {
        quotient += ((b.latitude - a.latitude) * scale.ft_per_deg_lat).powi(2);
    }
    if axes.longitude {
        quotient += ((b.longitude - a.longitude) * scale.ft_per_deg_lon).powi(2);
    }
    if axes.elevation {
        quotient += b.elevation - a.elevation;
    }
    if quotient < 0.0 {
        return Err(TmError::UndefinedDistance { index: 0, quotient });
    }
    Ok(quotient.sqrt() / scale.ft_per_mile)
}

/// Signed seconds from `from` to `to`, keeping sub-second precision.
pub fn elapsed_seconds(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    delta
        .num_nanoseconds()
        .map(|ns| ns as f64 / 1e9)
        .unwrap_or_else(|| delta.num_milliseconds() as f64 / 1000.0)
}

/// Miles per hour from `a` to `b`; identical timestamps are an error.
pub fn speed(a: &RawPoint, b: &RawPoint, axes: Axes, scale: &Scale) -> Result<f64, TmError> {
    let hours = elapsed_seconds(a.timestamp, b.timestamp) / SECONDS_PER_HOUR;
    if hours == 0.0 {
        return Err(TmError::UndefinedSpeed {
            index: 0,
            at: b.timestamp,
        });
    }
    let miles = planar_distance(a, b, axes, scale)?;
    Ok(miles / hours)
}

/// Signed slope in percent: elevation rise over horizontal run.
/// A zero run yields 0.0.
pub fn grade(a: &RawPoint, b: &RawPoint, axes: Axes, scale: &Scale) -> Result<f64, TmError> {
    let rise_mi = (b.elevation - a.elevation) / scale.ft_per_mile;
    let run_mi = planar_distance(a, b, axes, scale)?;
    if run_mi == 0.0 {
        return Ok(0.0);
    }
    Ok(rise_mi / run_mi * 100.0)
}

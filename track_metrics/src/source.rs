//! Decoders that turn GPX or FIT documents into ordered [`RawPoint`]s.
//!
//! Every point must carry latitude, longitude, elevation and a timestamp.
//! A point missing any of them fails the whole track, since dropping it would
//! shift every cumulative and windowed value that follows.

use chrono::{DateTime, Utc};

use crate::{RawPoint, TmError};

const DEG_PER_SEMICIRCLE: f64 = 180.0 / 2_147_483_648.0;

/// Parse GPX or FIT points from bytes using the provided format hint (extension).
pub fn parse_points(input: &[u8], format: &str) -> Result<Vec<RawPoint>, TmError> {
    let ext = format.rsplit('.').next().unwrap_or(format);
    match ext.to_ascii_lowercase().as_str() {
        "gpx" => parse_gpx_points(input),
        "fit" => parse_fit_points(input),
        _ => Err(TmError::UnsupportedFormat(format.to_string())),
    }
}

fn malformed(index: usize, reason: impl Into<String>) -> TmError {
    TmError::MalformedPoint {
        index,
        reason: reason.into(),
    }
}

fn checked_point(
    index: usize,
    latitude: Option<f64>,
    longitude: Option<f64>,
    elevation: Option<f64>,
    timestamp: Option<DateTime<Utc>>,
) -> Result<RawPoint, TmError> {
    let latitude = latitude.ok_or_else(|| malformed(index, "missing latitude"))?;
    let longitude = longitude.ok_or_else(|| malformed(index, "missing longitude"))?;
    let elevation = elevation.ok_or_else(|| malformed(index, "missing elevation"))?;
    let timestamp = timestamp.ok_or_else(|| malformed(index, "missing timestamp"))?;
    for (name, value) in [
        ("latitude", latitude),
        ("longitude", longitude),
        ("elevation", elevation),
    ] {
        if !value.is_finite() {
            return Err(malformed(index, format!("{name} is not finite: {value}")));
        }
    }
    Ok(RawPoint::new(latitude, longitude, elevation, timestamp))
}

fn parse_gpx_points(input: &[u8]) -> Result<Vec<RawPoint>, TmError> {
    use gpx::read;
    use std::io::Cursor;

    let mut cursor = Cursor::new(input);
    let gpx = read(&mut cursor).map_err(|e| TmError::GpxParse(e.to_string()))?;
    let mut out = Vec::new();

    for track in gpx.tracks {
        for segment in track.segments {
            for point in segment.points {
                let index = out.len();
                let timestamp = match point.time {
                    Some(time) => {
                        let iso = time
                            .format()
                            .map_err(|e| malformed(index, format!("unformattable time: {e}")))?;
                        let utc = DateTime::parse_from_rfc3339(&iso)
                            .map_err(|e| malformed(index, format!("unparseable time {iso}: {e}")))?
                            .with_timezone(&Utc);
                        Some(utc)
                    }
                    None => None,
                };
                let geo = point.point();
                out.push(checked_point(
                    index,
                    Some(geo.y()),
                    Some(geo.x()),
                    point.elevation,
                    timestamp,
                )?);
            }
        }
    }
    Ok(out)
}

fn parse_fit_points(input: &[u8]) -> Result<Vec<RawPoint>, TmError> {
    use fitparser::de::from_bytes;
    use fitparser::profile::MesgNum;

    let records = from_bytes(input).map_err(|e| TmError::FitParse(e.to_string()))?;
    let mut out = Vec::new();

    for record in records.into_iter() {
        if record.kind() != MesgNum::Record {
            continue;
        }
        let mut timestamp = None;
        let mut latitude = None;
        let mut longitude = None;
        let mut elevation = None;
        for field in record.fields() {
            match field.name() {
                "timestamp" => {
                    if let fitparser::Value::Timestamp(ts) = field.value() {
                        timestamp = Some(ts.with_timezone(&Utc));
                    }
                }
                "position_lat" => {
                    latitude = fit_value_to_f64(field.value()).map(|v| v * DEG_PER_SEMICIRCLE);
                }
                "position_long" => {
                    longitude = fit_value_to_f64(field.value()).map(|v| v * DEG_PER_SEMICIRCLE);
                }
                "enhanced_altitude" => {
                    elevation = fit_value_to_f64(field.value()).or(elevation);
                }
                "altitude" => {
                    if elevation.is_none() {
                        elevation = fit_value_to_f64(field.value());
                    }
                }
                _ => {}
            }
        }
        let index = out.len();
        out.push(checked_point(
            index, latitude, longitude, elevation, timestamp,
        )?);
    }

    Ok(out)
}

/// Position arrives as SInt32 semicircles; altitude as a scaled float or raw
/// unsigned integer depending on the device.
fn fit_value_to_f64(value: &fitparser::Value) -> Option<f64> {
    use fitparser::Value;
    match value {
        Value::SInt32(v) => Some(f64::from(*v)),
        Value::UInt16(v) => Some(f64::from(*v)),
        Value::UInt32(v) => Some(f64::from(*v)),
        Value::Float32(v) => Some(f64::from(*v)),
        Value::Float64(v) => Some(*v),
        _ => None,
    }
}

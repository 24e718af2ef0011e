//! Row shaping for tabular output. Writers live with the caller.

use chrono::SecondsFormat;

use crate::DerivedPoint;

pub const CSV_HEADER: [&str; 11] = [
    "Timestamp",
    "Latitude",
    "Longitude",
    "Elevation",
    "Distance",
    "Speed",
    "Grade",
    "Duration",
    "Speed (Window Avg)",
    "Grade (Window Avg)",
    "Elevation (Window Avg)",
];

impl DerivedPoint {
    /// One text cell per [`CSV_HEADER`] column. Numbers use plain decimal
    /// notation; the elevation average is blank when it was not computed.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.raw
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            self.raw.latitude.to_string(),
            self.raw.longitude.to_string(),
            self.raw.elevation.to_string(),
            self.distance_mi.to_string(),
            self.speed_mph.to_string(),
            self.grade_pct.to_string(),
            self.duration_s.to_string(),
            self.speed_window_avg.to_string(),
            self.grade_window_avg.to_string(),
            self.elevation_window_avg
                .map(|v| v.to_string())
                .unwrap_or_default(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::pt;

    #[test]
    fn row_lines_up_with_header() {
        let point = DerivedPoint {
            raw: pt(40.5, -105.25, 5_280.0, 1_500),
            distance_mi: 0.000001,
            speed_mph: 3.5,
            grade_pct: -2.0,
            duration_s: 1.5,
            speed_window_avg: 3.25,
            grade_window_avg: -1.0,
            elevation_window_avg: None,
        };
        let row = point.to_row();
        assert_eq!(row.len(), CSV_HEADER.len());
        assert_eq!(row[0], "2021-06-05T14:00:01.500Z");
        assert_eq!(row[1], "40.5");
        assert_eq!(row[2], "-105.25");
        assert_eq!(row[4], "0.000001");
        assert_eq!(row[6], "-2");
        assert_eq!(row[7], "1.5");
        assert_eq!(row[10], "");
    }

    #[test]
    fn tiny_values_stay_decimal() {
        let point = DerivedPoint {
            raw: pt(0.0, 0.0, 0.0, 0),
            distance_mi: 1e-12,
            speed_mph: 0.0,
            grade_pct: 0.0,
            duration_s: 0.0,
            speed_window_avg: 0.0,
            grade_window_avg: 0.0,
            elevation_window_avg: Some(12.75),
        };
        let row = point.to_row();
        assert_eq!(row[4], "0.000000000001");
        assert!(row.iter().all(|cell| !cell.contains('e')));
        assert_eq!(row[10], "12.75");
    }
}

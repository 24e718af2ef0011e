use crate::DerivedPoint;

/// Whole-track totals taken from an already derived sequence.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackSummary {
    pub points: usize,
    pub distance_mi: f64,
    pub elapsed_s: f64,
    pub avg_speed_mph: f64,
    pub max_speed_mph: f64,
    pub max_grade_pct: f64,
    pub min_grade_pct: f64,
    pub ascent_ft: f64,
}

impl TrackSummary {
    pub fn from_points(points: &[DerivedPoint]) -> Self {
        let (first, last) = match (points.first(), points.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Self::default(),
        };
        let distance_mi = last.distance_mi - first.distance_mi;
        let elapsed_s = last.duration_s - first.duration_s;
        let avg_speed_mph = if elapsed_s > 0.0 {
            distance_mi / (elapsed_s / 3_600.0)
        } else {
            0.0
        };
        let ascent_ft = points
            .windows(2)
            .map(|w| w[1].raw.elevation - w[0].raw.elevation)
            .filter(|delta| *delta > 0.0)
            .sum();

        Self {
            points: points.len(),
            distance_mi,
            elapsed_s,
            avg_speed_mph,
            max_speed_mph: points.iter().map(|p| p.speed_mph).fold(0.0, f64::max),
            max_grade_pct: points.iter().map(|p| p.grade_pct).fold(f64::MIN, f64::max),
            min_grade_pct: points.iter().map(|p| p.grade_pct).fold(f64::MAX, f64::min),
            ascent_ft,
        }
    }
}

//! Single forward pass from raw points to derived points.

use chrono::{DateTime, Utc};

use crate::clamp::{clamp_step, ClampedStep};
use crate::geometry::{elapsed_seconds, grade, planar_distance, speed};
use crate::window::RollingMean;
use crate::{DerivedPoint, Params, RawPoint, TmError};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineDiagnostics {
    pub points: usize,
    pub speed_rejected: usize,
    pub grade_rejected: usize,
    pub distance_rejected: usize,
}

impl PipelineDiagnostics {
    fn record(&mut self, step: &ClampedStep) {
        self.speed_rejected += step.speed_rejected as usize;
        self.grade_rejected += step.grade_rejected as usize;
        self.distance_rejected += step.distance_rejected as usize;
    }
}

#[derive(Clone, Debug)]
struct WindowSums {
    speed: RollingMean,
    grade: RollingMean,
    elevation: RollingMean,
}

impl WindowSums {
    fn new(width: usize) -> Self {
        Self {
            speed: RollingMean::new(width),
            grade: RollingMean::new(width),
            elevation: RollingMean::new(width),
        }
    }
}

/// Stateful fold over one track. Holds only the previous derived point and
/// the trailing window sums.
#[derive(Clone, Debug)]
pub struct TrackPipeline {
    params: Params,
    start: Option<DateTime<Utc>>,
    prev: Option<DerivedPoint>,
    windows: WindowSums,
    diagnostics: PipelineDiagnostics,
}

impl TrackPipeline {
    pub fn new(params: Params) -> Result<Self, TmError> {
        params.validate()?;
        let windows = WindowSums::new(params.window);
        Ok(Self {
            params,
            start: None,
            prev: None,
            windows,
            diagnostics: PipelineDiagnostics::default(),
        })
    }

    pub fn diagnostics(&self) -> &PipelineDiagnostics {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> PipelineDiagnostics {
        self.diagnostics
    }

    /// Derive the next point. On error the pipeline state is left untouched.
    pub fn push(&mut self, raw: RawPoint) -> Result<DerivedPoint, TmError> {
        let index = self.diagnostics.points;
        let step = match self.prev.as_ref() {
            None => ClampedStep::default(),
            Some(prev) => self.step(prev, &raw).map_err(|e| e.at_index(index))?,
        };
        self.diagnostics.record(&step);

        let start = *self.start.get_or_insert(raw.timestamp);
        let elevation_window_avg = if self.params.clamp.is_some() {
            Some(self.windows.elevation.push(raw.elevation))
        } else {
            None
        };

        let derived = DerivedPoint {
            raw,
            distance_mi: step.distance_mi,
            speed_mph: step.speed_mph,
            grade_pct: step.grade_pct,
            duration_s: elapsed_seconds(start, raw.timestamp),
            speed_window_avg: self.windows.speed.push(step.speed_mph),
            grade_window_avg: self.windows.grade.push(step.grade_pct),
            elevation_window_avg,
        };
        self.prev = Some(derived);
        self.diagnostics.points += 1;
        Ok(derived)
    }

    fn step(&self, prev: &DerivedPoint, raw: &RawPoint) -> Result<ClampedStep, TmError> {
        let params = &self.params;
        if let Some(limits) = params.clamp.as_ref() {
            return clamp_step(prev, raw, limits, params);
        }
        let increment = planar_distance(&prev.raw, raw, params.distance_axes, &params.scale)?;
        Ok(ClampedStep {
            distance_mi: prev.distance_mi + increment,
            speed_mph: speed(&prev.raw, raw, params.distance_axes, &params.scale)?,
            grade_pct: grade(&prev.raw, raw, params.grade_axes, &params.scale)?,
            ..ClampedStep::default()
        })
    }
}

/// Run a fresh pipeline over `points` and collect the derived sequence.
pub fn derive_track<I>(points: I, params: &Params) -> Result<Vec<DerivedPoint>, TmError>
where
    I: IntoIterator<Item = RawPoint>,
{
    derive_track_with_diagnostics(points, params).map(|(derived, _)| derived)
}

pub fn derive_track_with_diagnostics<I>(
    points: I,
    params: &Params,
) -> Result<(Vec<DerivedPoint>, PipelineDiagnostics), TmError>
where
    I: IntoIterator<Item = RawPoint>,
{
    let mut pipeline = TrackPipeline::new(params.clone())?;
    let iter = points.into_iter();
    let mut out = Vec::with_capacity(iter.size_hint().0);
    for raw in iter {
        out.push(pipeline.push(raw)?);
    }
    Ok((out, pipeline.into_diagnostics()))
}

use std::fs;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueHint};
use rayon::prelude::*;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use track_metrics::{
    derive_track_with_diagnostics, parse_points, DerivedPoint, Params, PipelineDiagnostics,
    StepLimits, TrackSummary, CSV_HEADER,
};

const TRACK_EXTENSIONS: [&str; 2] = ["gpx", "fit"];

#[derive(Parser, Debug)]
#[command(author, version, about = "Per-point track metrics CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert GPX/FIT tracks into one metrics CSV per track
    Convert(ConvertArgs),
    /// Print whole-track totals for one or more GPX/FIT tracks
    Summary(SummaryArgs),
}

#[derive(Parser, Debug)]
struct PipelineArgs {
    /// Optional pipeline parameters JSON path
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Rolling window width (points)
    #[arg(long)]
    window: Option<usize>,

    /// Enable step-size outlier clamping
    #[arg(long, action = ArgAction::SetTrue)]
    clamp: bool,

    /// Maximum speed change between points (mph)
    #[arg(long)]
    max_speed_step: Option<f64>,

    /// Maximum grade change between points (percent)
    #[arg(long)]
    max_grade_step: Option<f64>,

    /// Maximum distance covered between points (miles)
    #[arg(long)]
    max_distance_step: Option<f64>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct ConvertArgs {
    /// GPX/FIT files or directories containing them
    #[arg(required = true, value_hint = ValueHint::AnyPath)]
    inputs: Vec<PathBuf>,

    /// Directory receiving one CSV per track
    #[arg(short, long, default_value = "output", value_hint = ValueHint::DirPath)]
    output_dir: PathBuf,

    /// Number of trailing rows to log per track
    #[arg(long, default_value_t = 6)]
    tail: usize,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Parser, Debug)]
struct SummaryArgs {
    /// GPX/FIT files or directories containing them
    #[arg(required = true, value_hint = ValueHint::AnyPath)]
    inputs: Vec<PathBuf>,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

struct TrackOutput {
    points: Vec<DerivedPoint>,
    diagnostics: PipelineDiagnostics,
}

type TrackResult = (PathBuf, Result<TrackOutput>);

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Convert(args) => args.pipeline.verbose,
        Command::Summary(args) => args.pipeline.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Convert(args) => handle_convert(args),
        Command::Summary(args) => handle_summary(args),
    }
}

fn handle_convert(args: ConvertArgs) -> Result<()> {
    let params = build_params(&args.pipeline)?;
    let inputs = collect_inputs(&args.inputs)?;
    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("failed to create {}", args.output_dir.display()))?;

    let t_run = Instant::now();
    let results = process_tracks(&inputs, &params, |path, track| {
        write_track_csv(&track.points, &output_path(&args.output_dir, path))
    });

    for (path, result) in &results {
        if let Ok(track) = result {
            info!(
                "converted: {} -> {}",
                path.display(),
                output_path(&args.output_dir, path).display()
            );
            log_diagnostics(path, &track.diagnostics, &params);
            log_tail(&track.points, args.tail);
        }
    }

    info!(
        "Processed {} track(s) in {:.1} ms",
        results.len(),
        t_run.elapsed().as_secs_f64() * 1000.0
    );
    report_failures(&results)
}

fn handle_summary(args: SummaryArgs) -> Result<()> {
    let params = build_params(&args.pipeline)?;
    let inputs = collect_inputs(&args.inputs)?;
    let results = process_tracks(&inputs, &params, |_, _| Ok(()));

    let stdout = io::stdout();
    let handle = stdout.lock();
    let mut writer = csv::Writer::from_writer(handle);
    writer.write_record([
        "track",
        "points",
        "distance_mi",
        "elapsed_s",
        "avg_speed_mph",
        "max_speed_mph",
        "max_grade_pct",
        "min_grade_pct",
        "ascent_ft",
    ])?;
    for (path, result) in &results {
        let Ok(track) = result else { continue };
        let summary = TrackSummary::from_points(&track.points);
        writer.write_record([
            path.display().to_string(),
            summary.points.to_string(),
            format!("{:.3}", summary.distance_mi),
            format!("{:.3}", summary.elapsed_s),
            format!("{:.3}", summary.avg_speed_mph),
            format!("{:.3}", summary.max_speed_mph),
            format!("{:.3}", summary.max_grade_pct),
            format!("{:.3}", summary.min_grade_pct),
            format!("{:.3}", summary.ascent_ft),
        ])?;
        log_diagnostics(path, &track.diagnostics, &params);
    }
    writer.flush()?;
    report_failures(&results)
}

/// One independent pipeline per file. `finish` runs inside the same task, so a
/// failing track never holds back the others. Results come back in input order.
fn process_tracks<F>(inputs: &[PathBuf], params: &Params, finish: F) -> Vec<TrackResult>
where
    F: Fn(&Path, &TrackOutput) -> Result<()> + Sync,
{
    let t_parse = Instant::now();
    let results: Vec<TrackResult> = inputs
        .par_iter()
        .map(|path| {
            let result = process_track(path, params).and_then(|track| {
                finish(path.as_path(), &track)?;
                Ok(track)
            });
            if let Err(err) = &result {
                error!("{}: {:#}", path.display(), err);
            }
            (path.clone(), result)
        })
        .collect();
    debug!(
        "Pipeline stage: {:.1} ms ({} tracks)",
        t_parse.elapsed().as_secs_f64() * 1000.0,
        results.len()
    );
    results
}

fn process_track(path: &Path, params: &Params) -> Result<TrackOutput> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let hint = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("gpx");
    let raw = parse_points(&data, hint)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    let (points, diagnostics) = derive_track_with_diagnostics(raw, params)
        .with_context(|| format!("failed to derive metrics for {}", path.display()))?;
    Ok(TrackOutput {
        points,
        diagnostics,
    })
}

fn report_failures(results: &[TrackResult]) -> Result<()> {
    let failed: Vec<String> = results
        .iter()
        .filter(|(_, result)| result.is_err())
        .map(|(path, _)| path.display().to_string())
        .collect();
    if failed.is_empty() {
        return Ok(());
    }
    Err(anyhow!(
        "{} of {} track(s) failed: {}",
        failed.len(),
        results.len(),
        failed.join(", ")
    ))
}

fn build_params(args: &PipelineArgs) -> Result<Params> {
    let mut params = match args.config.as_ref() {
        Some(path) => load_params(path)?,
        None => Params::default(),
    };
    if let Some(window) = args.window {
        params.window = window;
    }
    let overrides_limits = args.max_speed_step.is_some()
        || args.max_grade_step.is_some()
        || args.max_distance_step.is_some();
    if args.clamp || overrides_limits {
        let mut limits = params.clamp.unwrap_or_default();
        if let Some(value) = args.max_speed_step {
            limits.max_speed_step_mph = value;
        }
        if let Some(value) = args.max_grade_step {
            limits.max_grade_step_pct = value;
        }
        if let Some(value) = args.max_distance_step {
            limits.max_distance_step_mi = value;
        }
        params.clamp = Some(limits);
    }
    params.validate()?;
    debug!("Pipeline params: {:?}", params);
    Ok(params)
}

fn load_params(path: &Path) -> Result<Params> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let params: Params = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a valid pipeline config", path.display()))?;
    Ok(params)
}

/// Expand directories into their track files, sorted by name.
fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = fs::read_dir(input)
                .with_context(|| format!("failed to list {}", input.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_file() && is_track_file(path))
                .collect();
            if found.is_empty() {
                warn!("No GPX/FIT files in {}", input.display());
            }
            found.sort();
            out.extend(found);
        } else {
            out.push(input.clone());
        }
    }
    if out.is_empty() {
        return Err(anyhow!("no input tracks found"));
    }
    Ok(out)
}

fn is_track_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            TRACK_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

fn output_path(dir: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "track".to_string());
    dir.join(format!("{stem}.csv"))
}

fn write_track_csv(points: &[DerivedPoint], path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    write_track_rows(points, &mut writer)
        .with_context(|| format!("failed to write {}", path.display()))
}

fn write_track_rows<W: Write>(points: &[DerivedPoint], writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record(CSV_HEADER)?;
    for point in points {
        writer.write_record(point.to_row())?;
    }
    writer.flush()?;
    Ok(())
}

fn log_diagnostics(input: &Path, diagnostics: &PipelineDiagnostics, params: &Params) {
    if params.clamp.is_none() {
        return;
    }
    info!(
        "{}: {} points, rejected speed {} / grade {} / distance {}",
        input.display(),
        diagnostics.points,
        diagnostics.speed_rejected,
        diagnostics.grade_rejected,
        diagnostics.distance_rejected
    );
}

fn log_tail(points: &[DerivedPoint], tail: usize) {
    let start = points.len().saturating_sub(tail);
    for point in &points[start..] {
        info!(
            "  {}  dist {:.3} mi  speed {:.2} mph ({:.2} avg)  grade {:.1}% ({:.1} avg)",
            point.raw.timestamp.format("%Y-%m-%d %H:%M:%S"),
            point.distance_mi,
            point.speed_mph,
            point.speed_window_avg,
            point.grade_pct,
            point.grade_window_avg
        );
    }
}

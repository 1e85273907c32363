//! Replays a recorded detection stream through the speed pipeline.
//!
//! ```text
//! speedtrack --recording drive.jsonl --log log.csv --speed-limit 50
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use speedtrack_rs::integration::replay::{Recording, ReplayDetector, ReplayOpener};
use speedtrack_rs::log::{LogFormat, open_log};
use speedtrack_rs::{PipelineConfig, PipelineController, PipelineState, SourceDescriptor, SpeedEvent};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "speedtrack", about = "Vehicle speed estimation over recorded detections")]
struct Args {
    /// JSON-lines detection recording
    #[arg(long, value_name = "PATH")]
    recording: PathBuf,
    /// YAML pipeline configuration
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Speed log output
    #[arg(long, value_name = "PATH", default_value = "log.csv")]
    log: PathBuf,
    #[arg(long, default_value_t = LogFormat::Csv)]
    log_format: LogFormat,
    /// Meters covered by 100 pixels of displacement
    #[arg(long)]
    distance_meters: Option<f64>,
    #[arg(long)]
    frame_rate: Option<f64>,
    /// Speed limit in km/h
    #[arg(long)]
    speed_limit: Option<f64>,
    /// Sleep between frames to mimic a live stream
    #[arg(long)]
    realtime: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(distance) = args.distance_meters {
        config.calibration.distance_meters = distance;
    }
    if let Some(frame_rate) = args.frame_rate {
        config.calibration.frame_rate = frame_rate;
    }
    if let Some(limit) = args.speed_limit {
        config.calibration.speed_limit_kmh = limit;
    }
    config.validate().context("invalid configuration")?;

    let recording = Arc::new(
        Recording::load(&args.recording)
            .with_context(|| format!("reading recording {}", args.recording.display()))?,
    );
    tracing::info!(frames = recording.len(), "recording loaded");

    let mut opener = ReplayOpener::new(recording.clone());
    if args.realtime {
        opener = opener.with_pace(Duration::from_secs_f64(1.0 / config.calibration.frame_rate));
    }
    let log = open_log(&args.log, args.log_format)
        .with_context(|| format!("creating log {}", args.log.display()))?;

    let calibration = config.calibration;
    let mut controller = PipelineController::new(ReplayDetector::new(recording.clone()), opener, config)?
        .with_log(log)?;
    let events = controller.events();

    controller.start(SourceDescriptor::File(recording.path().to_path_buf()), calibration)?;
    // every event is queued before the run reports Stopped
    loop {
        match events.recv_timeout(Duration::from_millis(50)) {
            Ok(event) => print_event(&event),
            Err(_) if controller.state() == PipelineState::Stopped => break,
            Err(_) => {}
        }
    }
    events.try_iter().for_each(|event| print_event(&event));
    let summary = controller.wait()?;

    if let Some(summary) = summary {
        tracing::info!(
            frames = summary.frames_processed,
            events = summary.events_emitted,
            dropped_events = summary.events_dropped,
            reason = %summary.stop_reason,
            "replay complete"
        );
    }
    Ok(())
}

fn print_event(event: &SpeedEvent) {
    println!(
        "frame {:>6}  {:<4} {:<10} {:>7.1} km/h{}",
        event.frame_index,
        event.track_id,
        event.class,
        event.speed_kmh,
        if event.over_limit { "  SPEEDING" } else { "" }
    );
}

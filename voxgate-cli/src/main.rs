//! `voxgate` — command-line host for the adaptive voice-activity gate.
//!
//! Two modes:
//! - live (default): open a microphone, run the engine, print start/stop
//!   edges until Ctrl+C;
//! - `--wav <file>`: run the same gate over a WAV file offline and print
//!   timestamped edges plus a summary.
//!
//! Configuration merges three layers: built-in defaults, an optional JSON
//! settings file, and command-line flags (highest precedence).

mod settings;
mod wav;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use voxgate_core::{
    audio::device::list_input_devices,
    vad::FilterBand,
    EngineConfig, VoxgateEngine,
};

use settings::{default_settings_path, load_settings, AppSettings};

#[derive(Parser, Debug)]
#[command(name = "voxgate", version, about = "Adaptive voice-activity gate")]
struct Cli {
    /// Preferred input device name (falls back to the system default).
    #[arg(long)]
    device: Option<String>,

    /// List available input devices and exit.
    #[arg(long)]
    list_devices: bool,

    /// Analyze a WAV file offline instead of capturing live.
    #[arg(long, value_name = "PATH")]
    wav: Option<PathBuf>,

    /// JSON settings file (default: the per-user settings path).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// FFT size (power of two; frames carry fft_size/2 bins).
    #[arg(long, value_name = "N")]
    fft_size: Option<usize>,

    /// Samples consumed per tick.
    #[arg(long, value_name = "N")]
    frame_interval: Option<usize>,

    /// Rising threshold multiplier on the noise floor.
    #[arg(long, value_name = "RATIO")]
    ratio_pos: Option<f64>,

    /// Falling threshold multiplier on the noise floor.
    #[arg(long, value_name = "RATIO")]
    ratio_neg: Option<f64>,

    /// Noise-floor adaptation rate.
    #[arg(long, value_name = "RATE")]
    integration_rate: Option<f64>,

    /// Initial noise-floor offset.
    #[arg(long, value_name = "OFFSET")]
    initial_offset: Option<f64>,

    /// Spectral magnitude smoothing in [0, 1).
    #[arg(long, value_name = "TAU")]
    smoothing: Option<f32>,

    /// Band mask as `hz:weight` pairs, e.g. `200:0,2000:1`.
    #[arg(long, value_name = "BANDS", value_parser = parse_filter_shape)]
    filter: Option<FilterShapeArg>,

    /// Suppress per-tick activity logging in live mode.
    #[arg(short, long)]
    quiet: bool,
}

/// Parsed `--filter` value. Newtype so clap takes the whole list as one
/// argument instead of treating `Vec` as repeated occurrences.
#[derive(Debug, Clone)]
struct FilterShapeArg(Vec<FilterBand>);

fn parse_filter_shape(raw: &str) -> Result<FilterShapeArg, String> {
    let mut bands = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (hz, weight) = part
            .split_once(':')
            .ok_or_else(|| format!("band `{part}` must be `<hz>:<weight>`"))?;
        let below_hz: f32 = hz
            .trim()
            .parse()
            .map_err(|_| format!("bad frequency in `{part}`"))?;
        let weight: f32 = weight
            .trim()
            .parse()
            .map_err(|_| format!("bad weight in `{part}`"))?;
        if weight < 0.0 {
            return Err(format!("weight must be non-negative in `{part}`"));
        }
        bands.push(FilterBand::new(below_hz, weight));
    }
    if bands.is_empty() {
        return Err("filter shape must contain at least one band".into());
    }
    Ok(FilterShapeArg(bands))
}

/// Defaults < settings file < flags.
fn resolve_config(cli: &Cli, settings: &AppSettings) -> EngineConfig {
    let mut detector = settings.detector.clone();
    if let Some(v) = cli.fft_size {
        detector.transform_size = v;
    }
    if let Some(v) = cli.frame_interval {
        detector.frame_interval = v;
    }
    if let Some(v) = cli.ratio_pos {
        detector.ratio_pos = v;
    }
    if let Some(v) = cli.ratio_neg {
        detector.ratio_neg = v;
    }
    if let Some(v) = cli.integration_rate {
        detector.integration_rate = v;
    }
    if let Some(v) = cli.initial_offset {
        detector.initial_offset = v;
    }
    if let Some(FilterShapeArg(bands)) = &cli.filter {
        detector.filter_shape = bands.clone();
    }

    EngineConfig {
        detector,
        smoothing_time_constant: cli.smoothing.unwrap_or(settings.smoothing_time_constant),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voxgate=info,voxgate_core=info".parse().unwrap()),
        )
        .init();

    if cli.list_devices {
        let devices = list_input_devices();
        if devices.is_empty() {
            println!("no input devices found");
        }
        for device in &devices {
            println!(
                "{}{}",
                device.name,
                if device.is_default { "  (default)" } else { "" }
            );
        }
        return Ok(());
    }

    let settings_path = cli.config.clone().unwrap_or_else(default_settings_path);
    let app_settings = load_settings(&settings_path);
    info!(settings_path = ?settings_path, "settings loaded");

    let config = resolve_config(&cli, &app_settings);

    if let Some(path) = &cli.wav {
        let summary = wav::analyze(path, config.detector, config.smoothing_time_constant)?;
        println!(
            "{} segment(s), {:.1}s speech / {:.1}s total ({} ticks)",
            summary.segments, summary.speech_secs, summary.total_secs, summary.ticks
        );
        return Ok(());
    }

    run_live(cli, app_settings, config).await
}

async fn run_live(cli: Cli, settings: AppSettings, config: EngineConfig) -> anyhow::Result<()> {
    let engine = Arc::new(VoxgateEngine::new(config).context("invalid configuration")?);

    let speech_started_at = Arc::new(Mutex::new(None::<Instant>));
    {
        let started = Arc::clone(&speech_started_at);
        engine.on_start(move || {
            *started.lock() = Some(Instant::now());
            println!("speech started");
        });
    }
    {
        let started = Arc::clone(&speech_started_at);
        engine.on_stop(move || {
            let held = started
                .lock()
                .take()
                .map(|at| at.elapsed().as_secs_f64())
                .unwrap_or(0.0);
            println!("speech stopped ({held:.1}s)");
        });
    }

    if !cli.quiet {
        let mut activity_rx = engine.subscribe_activity();
        tokio::spawn(async move {
            loop {
                match activity_rx.recv().await {
                    Ok(ev) => debug!(
                        seq = ev.seq,
                        energy = format_args!("{:.3e}", ev.energy),
                        signal = format_args!("{:.3e}", ev.signal),
                        active = ev.active,
                        "activity"
                    ),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("activity receiver lagged by {n} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    let device = cli.device.clone().or(settings.preferred_input_device);
    engine.start_with_device(device)?;
    println!("listening — press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl+C")?;
    engine.stop()?;

    let snap = engine.diagnostics_snapshot();
    println!(
        "done: {} ticks, {} start(s), {} stop(s)",
        snap.ticks, snap.edges_started, snap.edges_stopped
    );
    Ok(())
}

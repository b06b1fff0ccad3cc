//! Offline WAV analysis: run the gate over a file and report the speech
//! segments it finds.
//!
//! The file drives the detector exactly like a live capture would: blocks
//! of `frame_interval` samples slide through the spectrum analyzer, each
//! block becomes one tick, and edges are printed with their timestamp in
//! the file. The file's own sample rate is used; the detector adapts via
//! its bin width.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use voxgate_core::{
    spectrum::SpectrumAnalyzer,
    vad::{Detector, DetectorConfig, Edge},
};

/// Totals from one offline run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub segments: usize,
    pub speech_secs: f64,
    pub total_secs: f64,
    pub ticks: usize,
}

/// Decode `path`, pump it through analyzer + detector, print edges.
pub fn analyze(path: &Path, config: DetectorConfig, smoothing: f32) -> Result<Summary> {
    let (samples, sample_rate) = read_wav_mono_f32(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    info!(sample_rate, samples = samples.len(), "wav loaded");

    let config = DetectorConfig {
        sample_rate,
        ..config
    };
    let mut detector = Detector::new(config)?;
    let mut analyzer = SpectrumAnalyzer::new(
        detector.config().transform_size,
        smoothing,
        sample_rate,
    )?;

    let frame_interval = detector.config().frame_interval;
    let tick_period = detector.config().tick_period();

    let mut summary = Summary {
        segments: 0,
        speech_secs: 0.0,
        total_secs: samples.len() as f64 / f64::from(sample_rate),
        ticks: 0,
    };
    let mut opened_at: Option<f64> = None;

    // Trailing partial block is dropped, same as live capture waiting for
    // more samples that never come.
    for block in samples.chunks_exact(frame_interval) {
        analyzer.push(block);
        let frame = analyzer.db_frame();
        let tick = detector.process(frame);
        summary.ticks += 1;

        let now = summary.ticks as f64 * tick_period;
        match tick.edge {
            Some(Edge::Start) => {
                opened_at = Some(now);
                println!("{}  speech start", format_timestamp(now));
            }
            Some(Edge::Stop) => {
                if let Some(start) = opened_at.take() {
                    summary.segments += 1;
                    summary.speech_secs += now - start;
                }
                println!("{}  speech stop", format_timestamp(now));
            }
            None => {}
        }
    }

    // Close a segment still open at end of file.
    if let Some(start) = opened_at {
        summary.segments += 1;
        summary.speech_secs += summary.ticks as f64 * tick_period - start;
    }

    Ok(summary)
}

fn read_wav_mono_f32(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => {
            if spec.bits_per_sample <= 16 {
                reader
                    .samples::<i16>()
                    .map(|s| s.map(|v| f32::from(v) / f32::from(i16::MAX)))
                    .collect::<std::result::Result<_, _>>()?
            } else {
                let max = ((1_i64 << (spec.bits_per_sample - 1)) - 1) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max))
                    .collect::<std::result::Result<_, _>>()?
            }
        }
    };

    if channels == 1 {
        return Ok((interleaved, spec.sample_rate));
    }
    let mut mono = Vec::with_capacity(interleaved.len() / channels);
    for frame in interleaved.chunks(channels) {
        mono.push(frame.iter().copied().sum::<f32>() / channels as f32);
    }
    Ok((mono, spec.sample_rate))
}

fn format_timestamp(secs: f64) -> String {
    let minutes = (secs / 60.0) as u64;
    let rem = secs - minutes as f64 * 60.0;
    format!("{minutes:02}:{rem:06.3}")
}

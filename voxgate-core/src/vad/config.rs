//! Detector configuration and the per-tick quantities derived from it.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VoxgateError};

/// One step of the frequency weighting shape.
///
/// A shape is an ordered list of bands. A frequency bin takes the `weight`
/// of the FIRST band whose `below_hz` strictly exceeds the bin's center
/// frequency; bins beyond every band get weight 0. The list is scanned in
/// the order given — it is never sorted — so a leading zero-weight band is
/// how a low-frequency notch is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterBand {
    /// Upper edge of the band in Hz (exclusive).
    pub below_hz: f32,
    /// Weight applied to bins inside the band. Typically in `[0, 1]`.
    pub weight: f32,
}

impl FilterBand {
    pub fn new(below_hz: f32, weight: f32) -> Self {
        Self { below_hz, weight }
    }
}

/// Tuning parameters for [`Detector`](super::Detector).
///
/// Immutable once the detector is built. Defaults match a 48 kHz capture
/// with a 512-point transform, one tick per 512 samples (≈10.7 ms), and a
/// 200–2000 Hz pass band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectorConfig {
    /// Capture sample rate in Hz.
    pub sample_rate: u32,
    /// FFT size of the spectral frames. Must be a power of two ≥ 2;
    /// the frame carries `transform_size / 2` bins.
    pub transform_size: usize,
    /// Samples consumed per tick. Together with `sample_rate` this sets
    /// the tick period, which scales the noise-floor adaptation rate.
    pub frame_interval: usize,
    /// Starting value of the noise-floor offset.
    pub initial_offset: f64,
    /// Rising threshold = `offset * ratio_pos`.
    pub ratio_pos: f64,
    /// Falling threshold = `offset * ratio_neg`.
    pub ratio_neg: f64,
    /// Scales how fast the noise floor chases the signal.
    pub integration_rate: f64,
    /// Upper clamp of the trend counter.
    pub trend_max: i32,
    /// Lower clamp of the trend counter.
    pub trend_min: i32,
    /// Trend above this raises the raw start flag.
    pub trend_start: i32,
    /// Trend below this raises the raw end flag.
    pub trend_end: i32,
    /// Frequency weighting shape, first-match-wins (see [`FilterBand`]).
    pub filter_shape: Vec<FilterBand>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            transform_size: 512,
            frame_interval: 512,
            initial_offset: 1e-8,
            ratio_pos: 2.0,
            ratio_neg: 0.5,
            integration_rate: 1.0,
            trend_max: 10,
            trend_min: -10,
            trend_start: 5,
            trend_end: -5,
            filter_shape: vec![FilterBand::new(200.0, 0.0), FilterBand::new(2000.0, 1.0)],
        }
    }
}

impl DetectorConfig {
    /// Number of frequency bins per spectral frame.
    pub fn bin_count(&self) -> usize {
        self.transform_size / 2
    }

    /// Width of one frequency bin in Hz.
    pub fn hertz_per_bin(&self) -> f64 {
        f64::from(self.sample_rate) / self.transform_size as f64
    }

    /// Seconds covered by one tick.
    pub fn tick_period(&self) -> f64 {
        self.frame_interval as f64 / f64::from(self.sample_rate)
    }

    /// Check the config for values the detector cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(VoxgateError::Config("sample_rate must be positive".into()));
        }
        if self.transform_size < 2 || !self.transform_size.is_power_of_two() {
            return Err(VoxgateError::Config(format!(
                "transform_size must be a power of two >= 2, got {}",
                self.transform_size
            )));
        }
        if self.frame_interval == 0 {
            return Err(VoxgateError::Config(
                "frame_interval must be positive".into(),
            ));
        }
        if self.filter_shape.is_empty() {
            return Err(VoxgateError::Config(
                "filter_shape must contain at least one band".into(),
            ));
        }
        Ok(())
    }
}

//! Windowed-FFT spectral frames with exponential magnitude smoothing.
//!
//! [`SpectrumAnalyzer`] produces the measurement the detector consumes: it
//! keeps a rolling window of the most recent `transform_size` time-domain
//! samples (zero-filled at start), and per frame applies a Blackman window,
//! a forward FFT, 1/N magnitude normalization, exponential smoothing across
//! frames, and dB conversion. All buffers are allocated at construction;
//! the per-frame path is allocation-free.

use std::f64::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::error::{Result, VoxgateError};

type Complex32 = Complex<f32>;

/// Magnitude floor for the dB conversion (-180 dB).
const MAG_EPSILON: f32 = 1e-9;

pub struct SpectrumAnalyzer {
    transform_size: usize,
    sample_rate: u32,
    smoothing: f32,
    window: Vec<f32>,
    /// Rolling time-domain window, oldest sample first.
    history: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    fft_buf: Vec<Complex32>,
    /// Exponentially smoothed per-bin magnitudes.
    smoothed: Vec<f32>,
    /// dB output of the last frame.
    db: Vec<f32>,
}

impl SpectrumAnalyzer {
    /// Build an analyzer.
    ///
    /// `transform_size` must be a power of two ≥ 2; the smoothing time
    /// constant must sit in `[0, 1)` (0 disables smoothing entirely, values
    /// near 1 average over many frames).
    pub fn new(
        transform_size: usize,
        smoothing_time_constant: f32,
        sample_rate: u32,
    ) -> Result<Self> {
        if transform_size < 2 || !transform_size.is_power_of_two() {
            return Err(VoxgateError::Config(format!(
                "transform_size must be a power of two >= 2, got {transform_size}"
            )));
        }
        if !(0.0..1.0).contains(&smoothing_time_constant) {
            return Err(VoxgateError::Config(format!(
                "smoothing_time_constant must be in [0, 1), got {smoothing_time_constant}"
            )));
        }
        if sample_rate == 0 {
            return Err(VoxgateError::Config("sample_rate must be positive".into()));
        }

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(transform_size);
        let bin_count = transform_size / 2;

        Ok(Self {
            transform_size,
            sample_rate,
            smoothing: smoothing_time_constant,
            window: blackman_window(transform_size),
            history: vec![0.0; transform_size],
            fft,
            fft_buf: vec![Complex32::new(0.0, 0.0); transform_size],
            smoothed: vec![0.0; bin_count],
            db: vec![20.0 * MAG_EPSILON.log10(); bin_count],
        })
    }

    pub fn bin_count(&self) -> usize {
        self.transform_size / 2
    }

    pub fn hertz_per_bin(&self) -> f64 {
        f64::from(self.sample_rate) / self.transform_size as f64
    }

    /// Slide `samples` into the rolling window.
    ///
    /// Anything older than `transform_size` samples falls out; pushing a
    /// block longer than the window keeps only its tail.
    pub fn push(&mut self, samples: &[f32]) {
        let n = self.transform_size;
        if samples.len() >= n {
            self.history.copy_from_slice(&samples[samples.len() - n..]);
        } else {
            self.history.copy_within(samples.len().., 0);
            self.history[n - samples.len()..].copy_from_slice(samples);
        }
    }

    /// Compute the dB frame for the current window.
    ///
    /// Each call folds the window's magnitudes into the smoothed estimate,
    /// so call it once per tick. The returned slice carries
    /// `bin_count()` values and stays valid until the next call.
    pub fn db_frame(&mut self) -> &[f32] {
        for ((dst, &sample), &w) in self
            .fft_buf
            .iter_mut()
            .zip(&self.history)
            .zip(&self.window)
        {
            *dst = Complex32::new(sample * w, 0.0);
        }
        self.fft.process(&mut self.fft_buf);

        let scale = 1.0 / self.transform_size as f32;
        let tau = self.smoothing;
        for (k, (s, d)) in self.smoothed.iter_mut().zip(self.db.iter_mut()).enumerate() {
            let mag = self.fft_buf[k].norm() * scale;
            *s = tau * *s + (1.0 - tau) * mag;
            *d = 20.0 * s.max(MAG_EPSILON).log10();
        }
        &self.db
    }

    /// Zero the window and the smoothed magnitudes.
    pub fn reset(&mut self) {
        self.history.fill(0.0);
        self.smoothed.fill(0.0);
        self.db.fill(20.0 * MAG_EPSILON.log10());
    }
}

fn blackman_window(n: usize) -> Vec<f32> {
    // Classic Blackman terms (alpha = 0.16).
    let (a0, a1, a2) = (0.42, 0.50, 0.08);
    (0..n)
        .map(|i| {
            let phase = 2.0 * PI * i as f64 / n as f64;
            (a0 - a1 * phase.cos() + a2 * (2.0 * phase).cos()) as f32
        })
        .collect()
}

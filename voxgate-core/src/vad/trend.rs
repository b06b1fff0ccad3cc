//! Bounded trend counter — the hysteresis half of the detector.
//!
//! Each tick the counter moves one step: up while the signal clears the
//! rising threshold, down while it undershoots the falling one, otherwise
//! one step back toward zero. The start/end flags are level conditions on
//! the stepped counter; turning them into state transitions is the
//! detector's job.

use super::config::DetectorConfig;

/// Raw flags from one trend step, read AFTER the counter moved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrendFlags {
    /// Counter is above the start threshold.
    pub start: bool,
    /// Counter is below the end threshold.
    pub end: bool,
}

/// Bounded integrator of per-tick threshold decisions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Trend(i32);

impl Trend {
    pub fn value(&self) -> i32 {
        self.0
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }

    /// Advance the counter by one tick's decision and report the flags.
    ///
    /// Comparisons are strict on both sides; a signal sitting exactly on a
    /// threshold falls into the neutral band and decays the counter.
    pub fn step(
        &mut self,
        signal: f64,
        threshold_pos: f64,
        threshold_neg: f64,
        cfg: &DetectorConfig,
    ) -> TrendFlags {
        if signal > threshold_pos {
            self.0 = (self.0 + 1).min(cfg.trend_max);
        } else if signal < -threshold_neg {
            self.0 = (self.0 - 1).max(cfg.trend_min);
        } else if self.0 > 0 {
            self.0 -= 1;
        } else if self.0 < 0 {
            self.0 += 1;
        }
        TrendFlags {
            start: self.0 > cfg.trend_start,
            end: self.0 < cfg.trend_end,
        }
    }
}

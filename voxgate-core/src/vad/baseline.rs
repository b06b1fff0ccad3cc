//! Adaptive noise-floor estimate and the decision thresholds derived
//! from it.
//!
//! The floor chases the signed signal at a rate proportional to the tick
//! period, so it tracks slow drift in the ambient level while staying well
//! behind speech onsets. Decay is asymmetric: on a falling edge the floor
//! drops ten times faster than it rises, re-arming the gate quickly after
//! an utterance inflated it.

use super::config::DetectorConfig;

/// Sharpened decay factor applied when the floor moves down on a falling
/// edge.
const FALLING_DECAY: f64 = 10.0;

/// Noise-floor offset plus the pos/neg thresholds derived from it.
#[derive(Debug, Clone, Copy)]
pub struct NoiseFloor {
    offset: f64,
    threshold_pos: f64,
    threshold_neg: f64,
}

impl NoiseFloor {
    pub fn new(cfg: &DetectorConfig) -> Self {
        Self {
            offset: cfg.initial_offset,
            threshold_pos: cfg.initial_offset * cfg.ratio_pos,
            threshold_neg: cfg.initial_offset * cfg.ratio_neg,
        }
    }

    /// Current floor estimate. Never negative.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Threshold the signal must exceed to count toward a start.
    pub fn threshold_pos(&self) -> f64 {
        self.threshold_pos
    }

    /// Threshold the signal must fall below (negated) to count toward an
    /// end.
    pub fn threshold_neg(&self) -> f64 {
        self.threshold_neg
    }

    /// Fold one tick's signal into the floor and refresh the thresholds.
    ///
    /// `falling_edge` is THIS tick's raw end flag from the trend step: when
    /// it is up and the integration is negative, the step is scaled by
    /// [`FALLING_DECAY`]. A positive integration always moves at the normal
    /// rate regardless of the flag.
    pub fn update(
        &mut self,
        signal: f64,
        tick_period: f64,
        falling_edge: bool,
        cfg: &DetectorConfig,
    ) {
        let integration = signal * tick_period * cfg.integration_rate;
        if integration > 0.0 || !falling_edge {
            self.offset += integration;
        } else {
            self.offset += integration * FALLING_DECAY;
        }
        self.offset = self.offset.max(0.0);
        self.threshold_pos = self.offset * cfg.ratio_pos;
        self.threshold_neg = self.offset * cfg.ratio_neg;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cfg_with_offset(initial_offset: f64) -> DetectorConfig {
        DetectorConfig {
            initial_offset,
            ..Default::default()
        }
    }

    #[test]
    fn thresholds_track_offset_by_ratios() {
        let cfg = cfg_with_offset(1.0);
        let mut floor = NoiseFloor::new(&cfg);
        assert_relative_eq!(floor.threshold_pos(), 2.0);
        assert_relative_eq!(floor.threshold_neg(), 0.5);

        floor.update(10.0, 0.01, false, &cfg);
        assert_relative_eq!(floor.offset(), 1.1);
        assert_relative_eq!(floor.threshold_pos(), 2.2);
        assert_relative_eq!(floor.threshold_neg(), 0.55);
    }

    #[test]
    fn falling_edge_decays_ten_times_faster() {
        let cfg = cfg_with_offset(1.0);

        let mut slow = NoiseFloor::new(&cfg);
        slow.update(-5.0, 0.01, false, &cfg);
        let slow_drop = 1.0 - slow.offset();

        let mut fast = NoiseFloor::new(&cfg);
        fast.update(-5.0, 0.01, true, &cfg);
        let fast_drop = 1.0 - fast.offset();

        assert_relative_eq!(slow_drop, 0.05);
        assert_relative_eq!(fast_drop, slow_drop * 10.0);
    }

    #[test]
    fn positive_integration_ignores_falling_edge() {
        let cfg = cfg_with_offset(1.0);
        let mut floor = NoiseFloor::new(&cfg);
        // Rising at the normal rate even while the end flag is up.
        floor.update(5.0, 0.01, true, &cfg);
        assert_relative_eq!(floor.offset(), 1.05);
    }

    #[test]
    fn offset_clamps_at_zero() {
        let cfg = cfg_with_offset(0.1);
        let mut floor = NoiseFloor::new(&cfg);
        floor.update(-1000.0, 0.01, true, &cfg);
        assert_eq!(floor.offset(), 0.0);
        assert_eq!(floor.threshold_pos(), 0.0);
        assert_eq!(floor.threshold_neg(), 0.0);
    }

    #[test]
    fn integration_rate_scales_adaptation() {
        let cfg = DetectorConfig {
            initial_offset: 1.0,
            integration_rate: 2.0,
            ..Default::default()
        };
        let mut floor = NoiseFloor::new(&cfg);
        floor.update(10.0, 0.01, false, &cfg);
        assert_relative_eq!(floor.offset(), 1.2);
    }
}

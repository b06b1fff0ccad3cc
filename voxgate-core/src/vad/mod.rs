//! Adaptive spectral voice-activity detection.
//!
//! [`Detector`] consumes one dB-scale spectral frame per tick and tracks a
//! debounced voice-active state. Each tick runs four ordered phases:
//!
//! 1. weighted band energy of the frame, signal = energy − noise floor
//!    (the floor and thresholds as left by the PREVIOUS tick);
//! 2. trend step: the bounded counter moves on the signal vs thresholds
//!    comparison and reports raw start/end flags;
//! 3. noise-floor update — after the trend step, because the decay rate
//!    depends on this tick's end flag;
//! 4. voice-state commit, which turns flag crossings into at most one
//!    [`Edge`] per tick.
//!
//! The detector is synchronous, lock-free, and allocation-free per tick;
//! one instance per stream.

pub mod baseline;
pub mod config;
pub mod energy;
pub mod filter;
pub mod trend;

pub use baseline::NoiseFloor;
pub use config::{DetectorConfig, FilterBand};
pub use energy::{band_energy, db_to_power};
pub use filter::FilterMask;
pub use trend::{Trend, TrendFlags};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VoxgateError};

/// A transition of the voice-active state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    /// Speech onset: the detector went inactive → active.
    Start,
    /// Speech offset: the detector went active → inactive.
    Stop,
}

/// Report of one processing cycle.
///
/// `signal` was measured against the floor as it stood when the tick
/// began; `offset` and the thresholds are the values left for the NEXT
/// tick. Everything a host needs to log or meter without re-entering the
/// detector.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    /// Weighted band energy of the frame.
    pub energy: f64,
    /// `energy` minus the pre-update noise floor.
    pub signal: f64,
    /// Noise-floor offset after this tick's update.
    pub offset: f64,
    /// Rising threshold after this tick's update.
    pub threshold_pos: f64,
    /// Falling threshold after this tick's update.
    pub threshold_neg: f64,
    /// Trend counter after this tick's step.
    pub trend: i32,
    /// Voice-active state after this tick.
    pub active: bool,
    /// The transition this tick committed, if any.
    pub edge: Option<Edge>,
}

/// Mutable per-stream state, kept apart from the immutable config so a
/// reset is a plain rebuild.
#[derive(Debug, Clone)]
struct RunState {
    floor: NoiseFloor,
    trend: Trend,
    active: bool,
}

impl RunState {
    fn new(cfg: &DetectorConfig) -> Self {
        Self {
            floor: NoiseFloor::new(cfg),
            trend: Trend::default(),
            active: false,
        }
    }

    /// Fold this tick's raw flags into the two-state voice machine.
    ///
    /// Only a crossing moves the state, so edges strictly alternate no
    /// matter how long a flag stays up.
    fn commit(&mut self, flags: TrendFlags) -> Option<Edge> {
        if flags.start && !self.active {
            self.active = true;
            Some(Edge::Start)
        } else if flags.end && self.active {
            self.active = false;
            Some(Edge::Stop)
        } else {
            None
        }
    }
}

/// Adaptive voice-activity detector over dB-scale spectral frames.
#[derive(Debug, Clone)]
pub struct Detector {
    config: DetectorConfig,
    mask: FilterMask,
    state: RunState,
}

impl Detector {
    /// Build a detector, or fail with [`VoxgateError::Config`] if the
    /// config cannot be run with.
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        let mask = FilterMask::build(
            &config.filter_shape,
            config.bin_count(),
            config.hertz_per_bin(),
        );
        let state = RunState::new(&config);
        Ok(Self {
            config,
            mask,
            state,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Current debounced voice-active state.
    pub fn is_active(&self) -> bool {
        self.state.active
    }

    /// Process one spectral frame and advance one tick.
    ///
    /// `db_bins` must carry `config.bin_count()` per-bin dB magnitudes.
    pub fn process(&mut self, db_bins: &[f32]) -> Tick {
        debug_assert_eq!(
            db_bins.len(),
            self.config.bin_count(),
            "frame bin count does not match transform_size"
        );

        let energy = band_energy(&self.mask, db_bins);
        let signal = energy - self.state.floor.offset();

        let flags = self.state.trend.step(
            signal,
            self.state.floor.threshold_pos(),
            self.state.floor.threshold_neg(),
            &self.config,
        );

        self.state
            .floor
            .update(signal, self.config.tick_period(), flags.end, &self.config);

        let edge = self.state.commit(flags);

        Tick {
            energy,
            signal,
            offset: self.state.floor.offset(),
            threshold_pos: self.state.floor.threshold_pos(),
            threshold_neg: self.state.floor.threshold_neg(),
            trend: self.state.trend.value(),
            active: self.state.active,
            edge,
        }
    }

    /// Drop all run state back to the configured initial values.
    pub fn reset(&mut self) {
        self.state = RunState::new(&self.config);
    }

    /// Swap the frequency weighting shape.
    ///
    /// Rebuilds the mask and resets the run state: a floor estimated under
    /// the old weighting says nothing about energies under the new one.
    /// Call between ticks only (enforced by `&mut self`).
    pub fn set_filter_shape(&mut self, shape: Vec<FilterBand>) -> Result<()> {
        if shape.is_empty() {
            return Err(VoxgateError::Config(
                "filter_shape must contain at least one band".into(),
            ));
        }
        self.config.filter_shape = shape;
        self.mask = FilterMask::build(
            &self.config.filter_shape,
            self.config.bin_count(),
            self.config.hertz_per_bin(),
        );
        self.reset();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Tiny transform so frames are easy to write by hand: 4 bins at
    /// 100 Hz each, all weight 1, 0.1 s per tick, floor starting at 1.0
    /// and adapting slowly.
    fn test_config() -> DetectorConfig {
        DetectorConfig {
            sample_rate: 800,
            transform_size: 8,
            frame_interval: 80,
            initial_offset: 1.0,
            integration_rate: 0.01,
            filter_shape: vec![FilterBand::new(1_000.0, 1.0)],
            ..Default::default()
        }
    }

    /// Four bins at 0 dB: power 1 per bin, energy 4.0.
    const LOUD: [f32; 4] = [0.0; 4];
    /// Four bins at -100 dB: energy ~4e-20, indistinguishable from zero.
    const QUIET: [f32; 4] = [-100.0; 4];

    fn detector() -> Detector {
        Detector::new(test_config()).unwrap()
    }

    #[test]
    fn construction_rejects_invalid_config() {
        let cfg = DetectorConfig {
            transform_size: 500,
            ..test_config()
        };
        assert!(matches!(
            Detector::new(cfg),
            Err(VoxgateError::Config(_))
        ));
    }

    #[test]
    fn tick_energy_matches_recomputation() {
        let cfg = test_config();
        let mask = FilterMask::build(&cfg.filter_shape, cfg.bin_count(), cfg.hertz_per_bin());
        let mut det = Detector::new(cfg).unwrap();

        let frame = [-12.5, -3.0, -44.0, -9.75];
        let tick = det.process(&frame);
        assert_eq!(tick.energy.to_bits(), band_energy(&mask, &frame).to_bits());
    }

    #[test]
    fn sustained_tone_starts_on_sixth_tick() {
        let mut det = detector();
        // Signal ≈ 3.0 against threshold_pos ≈ 2.0; the floor creeps up by
        // ~0.003/tick, far too slowly to disqualify a tick.
        for i in 0..5 {
            let tick = det.process(&LOUD);
            assert_eq!(tick.edge, None, "tick {i}");
            assert!(!tick.active);
        }
        let sixth = det.process(&LOUD);
        assert_eq!(sixth.edge, Some(Edge::Start));
        assert!(sixth.active);
        assert_eq!(sixth.trend, 6);

        // Staying loud does not re-fire.
        for _ in 0..20 {
            assert_eq!(det.process(&LOUD).edge, None);
        }
        assert!(det.is_active());
    }

    #[test]
    fn removal_stops_exactly_once() {
        let mut det = detector();
        for _ in 0..6 {
            det.process(&LOUD);
        }
        assert!(det.is_active());

        // Silence: signal = -offset, always below -threshold_neg
        // (= -offset/2), so the trend falls one per tick. From +6 it
        // crosses below -5 on the 12th silent tick.
        let mut stops = Vec::new();
        for i in 0..40 {
            if let Some(edge) = det.process(&QUIET).edge {
                stops.push((i, edge));
            }
        }
        assert_eq!(stops, vec![(11, Edge::Stop)]);
        assert!(!det.is_active());
    }

    #[test]
    fn single_tick_blip_never_starts() {
        let mut det = detector();
        det.process(&LOUD);
        for _ in 0..100 {
            let tick = det.process(&QUIET);
            assert_eq!(tick.edge, None);
            assert!(!tick.active);
        }
    }

    #[test]
    fn silence_from_rest_never_fires() {
        let mut det = detector();
        for _ in 0..1000 {
            let tick = det.process(&QUIET);
            assert_eq!(tick.edge, None);
            assert!(tick.offset >= 0.0);
        }
    }

    #[test]
    fn energy_equal_to_floor_is_inert() {
        let cfg = test_config();
        let mut det = Detector::new(cfg).unwrap();
        // One bin at 0 dB contributes exactly 1.0; the -400 dB bins vanish
        // below f64 resolution. signal = 1.0 - 1.0 = 0: neutral band.
        let balanced = [0.0, -400.0, -400.0, -400.0];
        for _ in 0..100 {
            let tick = det.process(&balanced);
            assert_eq!(tick.edge, None);
            assert_eq!(tick.trend, 0);
            assert_relative_eq!(tick.offset, 1.0);
        }
    }

    #[test]
    fn edges_strictly_alternate_under_noise() {
        // Deterministic LCG so the frame sequence is reproducible.
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) as u32
        };

        let mut det = detector();
        let mut edges = Vec::new();
        for i in 0..5000 {
            let frame = if next() % 3 == 0 { LOUD } else { QUIET };
            let tick = det.process(&frame);
            assert!(tick.offset >= 0.0, "offset negative at tick {i}");
            assert!(
                (det.config().trend_min..=det.config().trend_max).contains(&tick.trend),
                "trend out of bounds at tick {i}"
            );
            if let Some(edge) = tick.edge {
                edges.push(edge);
            }
        }

        for pair in edges.chunks(2) {
            assert_eq!(pair[0], Edge::Start);
            if let Some(&second) = pair.get(1) {
                assert_eq!(second, Edge::Stop);
            }
        }
    }

    #[test]
    fn reset_restores_birth_behavior() {
        let fresh = detector();
        let mut used = fresh.clone();
        for _ in 0..50 {
            used.process(&LOUD);
        }
        used.reset();

        // A reset detector and a never-used clone tick identically.
        let mut fresh = fresh;
        let frame = [-6.0, -3.0, -12.0, -60.0];
        let a = fresh.process(&frame);
        let b = used.process(&frame);
        assert_eq!(a.energy.to_bits(), b.energy.to_bits());
        assert_eq!(a.signal.to_bits(), b.signal.to_bits());
        assert_eq!(a.offset.to_bits(), b.offset.to_bits());
        assert_eq!(a.trend, b.trend);
        assert_eq!(a.active, b.active);
        assert_eq!(a.edge, b.edge);
    }

    #[test]
    fn shape_swap_rebuilds_mask_and_resets_state() {
        let mut det = detector();
        for _ in 0..6 {
            det.process(&LOUD);
        }
        assert!(det.is_active());

        // Zero out every band: energy collapses to 0 under the new mask.
        det.set_filter_shape(vec![FilterBand::new(1_000.0, 0.0)])
            .unwrap();
        assert!(!det.is_active());

        let tick = det.process(&LOUD);
        assert_eq!(tick.energy, 0.0);
        // Trend restarted from zero rather than carrying the old +10.
        assert_eq!(tick.trend, -1);
    }

    #[test]
    fn shape_swap_rejects_empty_shape() {
        let mut det = detector();
        assert!(det.set_filter_shape(vec![]).is_err());
        // Detector still usable with the old shape.
        assert_relative_eq!(det.process(&LOUD).energy, 4.0);
    }

    #[test]
    fn edge_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Edge::Start).unwrap(), "\"start\"");
        assert_eq!(serde_json::to_string(&Edge::Stop).unwrap(), "\"stop\"");
    }
}

//! Per-bin frequency weighting mask.

use super::config::FilterBand;

/// Static per-bin weights resolved from a filter shape.
///
/// Built once when the detector is constructed (or when the shape is
/// swapped); applying it costs a single multiply per bin.
#[derive(Debug, Clone)]
pub struct FilterMask {
    weights: Box<[f32]>,
}

impl FilterMask {
    /// Resolve `shape` into one weight per bin.
    ///
    /// Bin `i` sits at `i * hertz_per_bin` Hz and takes the weight of the
    /// first band in `shape` whose `below_hz` strictly exceeds that
    /// frequency, or 0 when none does. The shape is scanned in the order
    /// given; overlapping bands are resolved by position, not by edge.
    pub fn build(shape: &[FilterBand], bin_count: usize, hertz_per_bin: f64) -> Self {
        let weights = (0..bin_count)
            .map(|i| {
                let bin_hz = i as f64 * hertz_per_bin;
                shape
                    .iter()
                    .find(|band| bin_hz < f64::from(band.below_hz))
                    .map_or(0.0, |band| band.weight)
            })
            .collect();
        Self { weights }
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

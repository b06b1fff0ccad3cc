//! Weighted band energy of a dB-scale spectral frame.
//!
//! One pass over the frame: each bin's dB magnitude is converted to linear
//! power, squared, scaled by the mask weight, and accumulated in `f64`.
//! Pure function of (mask, frame) — no state, no allocation.

use super::filter::FilterMask;

/// Convert one dB magnitude to linear power: `10^(db/10)`.
#[inline]
pub fn db_to_power(db: f32) -> f64 {
    10f64.powf(f64::from(db) / 10.0)
}

/// Weighted energy of one frame: `Σ mask[i] · power[i]²`.
///
/// The mask and frame must carry the same bin count; both are fixed by the
/// transform size at construction, so a mismatch is a caller bug.
pub fn band_energy(mask: &FilterMask, db_bins: &[f32]) -> f64 {
    debug_assert_eq!(
        mask.len(),
        db_bins.len(),
        "frame bin count does not match mask"
    );
    mask.weights()
        .iter()
        .zip(db_bins)
        .fold(0.0_f64, |acc, (&weight, &db)| {
            let power = db_to_power(db);
            acc + f64::from(weight) * power * power
        })
}

//! Distribution normalizer — exact-100 percentage distributions.
//!
//! RULES:
//!   - Output always sums to exactly 100, unless every input weight is 0,
//!     in which case the output is all zeros (the "no data" distribution).
//!   - Independent rounding can drift by ±1 per category; the drift is
//!     repaired by adding the difference to the largest rounded category
//!     (largest-remainder correction).
//!   - Ties for the largest category resolve in fixed phase order:
//!     opening, discovery, objection, argument, closing, silence.

use crate::metric::{PhaseBreakdown, PhaseDistribution};

/// Turn a raw phase breakdown into six non-negative integers summing to
/// exactly 100, preserving relative proportions as closely as integer
/// rounding allows. Pure and deterministic.
pub fn normalize_phases(phases: &PhaseBreakdown) -> PhaseDistribution {
    let weights = phases.as_array();
    let sum: f64 = weights.iter().sum();

    // No-data case: an entirely-zero breakdown must not divide by zero.
    if sum <= 0.0 {
        return PhaseDistribution::default();
    }

    let factor = 100.0 / sum;
    let mut rounded = [0i64; 6];
    for (i, w) in weights.iter().enumerate() {
        rounded[i] = (w * factor).round() as i64;
    }

    let total: i64 = rounded.iter().sum();
    let diff = 100 - total;

    if diff != 0 {
        // First category holding the maximum, in fixed enumeration order.
        let mut max_idx = 0;
        for (i, v) in rounded.iter().enumerate() {
            if *v > rounded[max_idx] {
                max_idx = i;
            }
        }
        rounded[max_idx] += diff;
    }

    let mut out = [0u32; 6];
    for (i, v) in rounded.iter().enumerate() {
        // The correction is at most ±3 and the largest category holds at
        // least ceil(100/6) = 17, so values never go negative.
        out[i] = (*v).max(0) as u32;
    }
    PhaseDistribution::from_array(out)
}

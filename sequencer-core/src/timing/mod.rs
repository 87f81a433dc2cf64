//! Step-timing function.
//!
//! The wait between steps shrinks exponentially as the index grows, so the
//! sequence accelerates the further it travels. The formula is evaluated in
//! `f64` in a fixed operation order; changing that order changes the rounding
//! and therefore the observable step cadence.

use core::time::Duration;

/// Growth base of the reduction term.
const GROWTH_BASE: f64 = 3.0;
/// Exponent applied per state index.
const GROWTH_RATE: f64 = 0.014_75;
/// Reduction at index 0, as a percentage of the base interval.
const INITIAL_REDUCTION_PERCENT: f64 = 0.7;
/// Final scale applied to the reduction.
const REDUCTION_SCALE: f64 = 0.8;

/// Returns the adjusted delay in milliseconds for `index` at `base_ms`.
///
/// The result is not clamped and goes negative for high indices; use
/// [`step_wait`] to turn it into an actual wait.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn adjusted_delay(index: usize, base_ms: u32) -> i64 {
    let exponent = GROWTH_RATE * f64::from(u32::try_from(index).unwrap_or(u32::MAX));
    let growth = libm::pow(GROWTH_BASE, exponent);
    let fraction = INITIAL_REDUCTION_PERCENT * growth / 100.0;
    let reduction = libm::floor(fraction * f64::from(base_ms) * REDUCTION_SCALE);
    i64::from(base_ms) - reduction as i64
}

/// Converts an adjusted delay into the wait actually slept, never below `floor`.
#[must_use]
pub fn step_wait(delay_ms: i64, floor: Duration) -> Duration {
    u64::try_from(delay_ms).map_or(floor, |millis| Duration::from_millis(millis).max(floor))
}

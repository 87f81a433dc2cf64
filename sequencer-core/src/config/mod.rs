//! Compile-time controller constants and the runtime configuration bundle.
//!
//! Firmware and emulator both start from [`ControllerConfig::default`]; the
//! emulator overrides individual fields from its command line.

use core::time::Duration;

/// Received switch-time inputs are multiplied by this factor (`<250>` -> 1000 ms).
pub const SWITCH_T_MULT: u32 = 4;
/// Lower bound applied to a received switch time, in milliseconds.
pub const SWITCH_T_MIN: u32 = 50;
/// Base interval between steps after power-up, in milliseconds.
pub const DEFAULT_BASE_INTERVAL_MS: u32 = 600;
/// Shortest wait the control cycle will ever sleep for, in milliseconds.
pub const DEFAULT_DELAY_FLOOR_MS: u64 = 1;
/// Baud rate of the command link.
pub const LINK_BAUD: u32 = 9_600;
/// Line written once at power-up, before the first control cycle.
pub const STARTUP_BANNER: &str = "=== System Start ===";

/// Tunables consumed by the command multiplexer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControllerConfig {
    pub switch_time_mult: u32,
    pub switch_time_min: u32,
    pub base_interval_ms: u32,
    pub delay_floor_ms: u64,
}

impl ControllerConfig {
    /// Configuration matching the shipped firmware constants.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            switch_time_mult: SWITCH_T_MULT,
            switch_time_min: SWITCH_T_MIN,
            base_interval_ms: DEFAULT_BASE_INTERVAL_MS,
            delay_floor_ms: DEFAULT_DELAY_FLOOR_MS,
        }
    }

    /// Overrides the power-up base interval.
    #[must_use]
    pub const fn with_base_interval(mut self, base_interval_ms: u32) -> Self {
        self.base_interval_ms = base_interval_ms;
        self
    }

    /// Overrides the minimum wait applied after each cycle.
    #[must_use]
    pub const fn with_delay_floor(mut self, delay_floor_ms: u64) -> Self {
        self.delay_floor_ms = delay_floor_ms;
        self
    }

    /// Converts a raw switch-time input into a base interval.
    #[must_use]
    pub fn scale_switch_time(&self, input: u16) -> u32 {
        let scaled = u32::from(input).saturating_mul(self.switch_time_mult);
        if scaled < self.switch_time_min {
            self.switch_time_min
        } else {
            scaled
        }
    }

    /// Returns the delay floor as a [`Duration`].
    #[must_use]
    pub const fn delay_floor(&self) -> Duration {
        Duration::from_millis(self.delay_floor_ms)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_time_is_scaled_and_clamped() {
        let config = ControllerConfig::default();
        assert_eq!(config.scale_switch_time(250), 1_000);
        assert_eq!(config.scale_switch_time(13), 52);
        assert_eq!(config.scale_switch_time(12), SWITCH_T_MIN);
        assert_eq!(config.scale_switch_time(0), SWITCH_T_MIN);
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = ControllerConfig::new()
            .with_base_interval(1_200)
            .with_delay_floor(0);
        assert_eq!(config.base_interval_ms, 1_200);
        assert_eq!(config.delay_floor(), Duration::ZERO);
        assert_eq!(config.switch_time_mult, SWITCH_T_MULT);
    }
}

//! Relay bank wiring for the STM32G0 board.
//!
//! [`RELAY_PINS`] maps every state-vector column to the GPIO that drives its
//! relay, in the same column order as the core's relay catalog. The runtime
//! claims the pins in that order when it builds the [`GpioRelayBank`].

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use sequencer_core::states::{ALL_RELAYS, RELAY_COUNT};

#[cfg(target_os = "none")]
use embassy_stm32::gpio::Output;
#[cfg(target_os = "none")]
use sequencer_core::io::RelayOutputs;

/// Board pin assignment for one relay column.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RelayPin {
    pub relay: &'static str,
    pub pin: &'static str,
}

/// Column-ordered pin table; PB0/PB1 stay reserved for the link UART.
pub const RELAY_PINS: [RelayPin; RELAY_COUNT] = [
    pin(0, "PA0"),
    pin(1, "PA1"),
    pin(2, "PA4"),
    pin(3, "PA5"),
    pin(4, "PA6"),
    pin(5, "PA7"),
    pin(6, "PB3"),
    pin(7, "PB4"),
    pin(8, "PB5"),
];

const fn pin(column: usize, pin: &'static str) -> RelayPin {
    RelayPin {
        relay: ALL_RELAYS[column].name,
        pin,
    }
}

/// Push-pull GPIO outputs indexed by state-vector column.
#[cfg(target_os = "none")]
pub struct GpioRelayBank<'d> {
    outputs: [Output<'d>; RELAY_COUNT],
}

#[cfg(target_os = "none")]
impl<'d> GpioRelayBank<'d> {
    pub fn new(outputs: [Output<'d>; RELAY_COUNT]) -> Self {
        Self { outputs }
    }
}

#[cfg(target_os = "none")]
impl RelayOutputs for GpioRelayBank<'_> {
    fn set_output(&mut self, relay: usize, on: bool) {
        if let Some(output) = self.outputs.get_mut(relay) {
            if on {
                output.set_high();
            } else {
                output.set_low();
            }
        }
    }

    fn output(&self, relay: usize) -> bool {
        self.outputs
            .get(relay)
            .is_some_and(|output| output.is_set_high())
    }
}

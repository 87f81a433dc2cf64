//! Collaborator traits for the byte link and the relay output bank.
//!
//! Firmware implements these over UART and GPIO; the emulator and tests use
//! in-memory versions.

use crate::protocol::encode_frame;
use crate::states::{RELAY_COUNT, StateVector};

/// Non-blocking byte link carrying framed commands.
pub trait ByteLink {
    /// Transport-specific write error.
    type Error;

    /// Returns `true` when at least one received byte is ready.
    fn available(&self) -> bool;

    /// Takes the next received byte without blocking.
    fn read_byte(&mut self) -> Option<u8>;

    /// Queues one byte for transmission.
    fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error>;

    /// Writes `code` as a complete `<digits>` frame.
    fn write_frame(&mut self, code: u16) -> Result<(), Self::Error> {
        for byte in encode_frame(code) {
            self.write_byte(byte)?;
        }
        Ok(())
    }
}

/// Digital outputs driving the relay bank, indexed like state-vector columns.
pub trait RelayOutputs {
    /// Drives `relay` on or off. Out-of-range indices are ignored.
    fn set_output(&mut self, relay: usize, on: bool);

    /// Returns the level last written to `relay`.
    fn output(&self, relay: usize) -> bool;

    /// Inverts the current level of `relay` and returns the new level.
    fn toggle_output(&mut self, relay: usize) -> bool {
        let next = !self.output(relay);
        self.set_output(relay, next);
        next
    }

    /// Reads back the level of every relay.
    fn snapshot(&self) -> StateVector {
        core::array::from_fn(|relay| self.output(relay))
    }

    /// Writes every column of `vector` to the matching relay.
    fn apply_vector(&mut self, vector: &StateVector) {
        for (relay, on) in vector.iter().enumerate() {
            self.set_output(relay, *on);
        }
    }
}

/// Relay bank that only remembers the last written levels.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LatchedOutputs {
    levels: StateVector,
}

impl LatchedOutputs {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            levels: [false; RELAY_COUNT],
        }
    }

    /// Snapshot of every relay level.
    #[must_use]
    pub const fn levels(&self) -> StateVector {
        self.levels
    }
}

impl RelayOutputs for LatchedOutputs {
    fn set_output(&mut self, relay: usize, on: bool) {
        if let Some(level) = self.levels.get_mut(relay) {
            *level = on;
        }
    }

    fn output(&self, relay: usize) -> bool {
        self.levels.get(relay).copied().unwrap_or(false)
    }
}

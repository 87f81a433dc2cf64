//! Output state table shared by firmware and host targets.
//!
//! Each entry is a complete relay configuration. The table is ordered: moving
//! one index up or down is one physical step of the controlled process, and
//! the sequencer never visits states out of order. The shipped table counts
//! through every 9-bit pattern with column 0 as the most significant bit, so
//! neighbouring entries differ by a single binary increment.

use core::fmt;

pub mod lockout;

pub use lockout::{ALL_RELAYS, LockoutTable, RELAY_LOCKOUT_MS, RelayLine, relay_by_index};

/// Number of relays driven by the controller.
pub const RELAY_COUNT: usize = 9;

/// Number of entries in the shipped output state table (`2^RELAY_COUNT`).
pub const STATE_COUNT: usize = 1 << RELAY_COUNT;

/// Highest valid index into the shipped table.
pub const MAX_STATE_INDEX: usize = STATE_COUNT - 1;

/// One on/off value per relay, index-aligned with [`ALL_RELAYS`].
pub type StateVector = [bool; RELAY_COUNT];

/// Errors raised by table lookups.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TableError {
    /// State index past the end of the table.
    StateOutOfRange { index: usize, max: usize },
    /// Relay index past the end of the relay bank.
    RelayOutOfRange { relay: usize },
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableError::StateOutOfRange { index, max } => {
                write!(f, "state index {index} outside 0..={max}")
            }
            TableError::RelayOutOfRange { relay } => {
                write!(f, "relay {relay} outside 0..{RELAY_COUNT}")
            }
        }
    }
}

const fn binary_state(index: usize) -> StateVector {
    let mut vector = [false; RELAY_COUNT];
    let mut column = 0;
    while column < RELAY_COUNT {
        let bit = RELAY_COUNT - 1 - column;
        vector[column] = (index >> bit) & 1 == 1;
        column += 1;
    }
    vector
}

const fn build_states() -> [StateVector; STATE_COUNT] {
    let mut states = [[false; RELAY_COUNT]; STATE_COUNT];
    let mut index = 0;
    while index < STATE_COUNT {
        states[index] = binary_state(index);
        index += 1;
    }
    states
}

/// Compile-time catalog of every relay configuration, in sequencing order.
pub static OUTPUT_STATES: [StateVector; STATE_COUNT] = build_states();

/// Read-only, bounds-checked view over an ordered list of state vectors.
#[derive(Copy, Clone, Debug)]
pub struct OutputStateTable<'a> {
    states: &'a [StateVector],
}

impl<'a> OutputStateTable<'a> {
    /// Wraps an ordered list of state vectors.
    #[must_use]
    pub const fn new(states: &'a [StateVector]) -> Self {
        Self { states }
    }

    /// Number of entries in the table.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns `true` when the table holds no states.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Highest valid index (0 for an empty table, which has no valid index).
    #[must_use]
    pub const fn max_index(&self) -> usize {
        self.states.len().saturating_sub(1)
    }

    /// Returns a copy of the vector at `index`.
    pub fn state_vector_at(&self, index: usize) -> Result<StateVector, TableError> {
        self.states
            .get(index)
            .copied()
            .ok_or(TableError::StateOutOfRange {
                index,
                max: self.max_index(),
            })
    }

    /// Iterates over the table in sequencing order.
    pub fn iter(&self) -> core::slice::Iter<'a, StateVector> {
        self.states.iter()
    }
}

impl Default for OutputStateTable<'static> {
    fn default() -> Self {
        Self::new(&OUTPUT_STATES)
    }
}

/// Convenience lookup into the shipped table.
pub fn state_vector_at(index: usize) -> Result<StateVector, TableError> {
    OutputStateTable::default().state_vector_at(index)
}

/// Packs a state vector into a bitmask (bit `n` set when relay `n` is on).
#[must_use]
pub fn vector_mask(vector: &StateVector) -> u16 {
    vector
        .iter()
        .enumerate()
        .filter(|(_, on)| **on)
        .fold(0, |mask, (relay, _)| mask | (1 << relay))
}

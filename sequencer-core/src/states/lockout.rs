//! Relay catalog and per-relay minimum switching intervals.
//!
//! Column `n` of every state vector drives relay `ALL_RELAYS[n]`. Columns are
//! ordered from the slowest-changing relay (R09) to the fastest (R01), so the
//! lockout thresholds grow with the column index: the relays that toggle on
//! every step are the first to be pinned once stepping speeds up.

use super::{RELAY_COUNT, StateVector, TableError};

/// Minimum switching interval per relay column, in milliseconds.
pub const RELAY_LOCKOUT_MS: [u16; RELAY_COUNT] = [1, 1, 3, 6, 12, 25, 50, 100, 200];

/// Metadata describing one relay output.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RelayLine {
    pub index: usize,
    pub name: &'static str,
    pub lockout_ms: u16,
}

impl RelayLine {
    pub const fn new(index: usize, name: &'static str) -> Self {
        Self {
            index,
            name,
            lockout_ms: RELAY_LOCKOUT_MS[index],
        }
    }
}

/// Compile-time catalog of every relay line, in state-vector column order.
pub const ALL_RELAYS: [RelayLine; RELAY_COUNT] = [
    RelayLine::new(0, "R09"),
    RelayLine::new(1, "R08"),
    RelayLine::new(2, "R07"),
    RelayLine::new(3, "R06"),
    RelayLine::new(4, "R05"),
    RelayLine::new(5, "R04"),
    RelayLine::new(6, "R03"),
    RelayLine::new(7, "R02"),
    RelayLine::new(8, "R01"),
];

/// Retrieve relay metadata by column index.
pub fn relay_by_index(relay: usize) -> Result<RelayLine, TableError> {
    ALL_RELAYS
        .get(relay)
        .copied()
        .ok_or(TableError::RelayOutOfRange { relay })
}

/// Read-only view over the per-relay lockout thresholds.
#[derive(Copy, Clone, Debug)]
pub struct LockoutTable<'a> {
    thresholds: &'a [u16; RELAY_COUNT],
}

impl<'a> LockoutTable<'a> {
    #[must_use]
    pub const fn new(thresholds: &'a [u16; RELAY_COUNT]) -> Self {
        Self { thresholds }
    }

    /// Returns the minimum switching interval configured for `relay`.
    pub fn lockout_threshold_for(&self, relay: usize) -> Result<u16, TableError> {
        self.thresholds
            .get(relay)
            .copied()
            .ok_or(TableError::RelayOutOfRange { relay })
    }

    /// Returns `true` when `relay` may no longer switch at `interval_ms`.
    #[must_use]
    pub fn is_locked(&self, relay: usize, interval_ms: i64) -> bool {
        self.thresholds
            .get(relay)
            .is_some_and(|threshold| i64::from(*threshold) > interval_ms)
    }

    /// Bitmask of relays locked out at `interval_ms` (bit `n` == relay `n`).
    #[must_use]
    pub fn locked_mask(&self, interval_ms: i64) -> u16 {
        (0..RELAY_COUNT)
            .filter(|relay| self.is_locked(*relay, interval_ms))
            .fold(0, |mask, relay| mask | (1 << relay))
    }

    /// Pins every locked relay of `raw` to `pinned`, leaving the rest untouched.
    #[must_use]
    pub fn apply(&self, raw: StateVector, interval_ms: i64, pinned: bool) -> StateVector {
        let mut vector = raw;
        for (relay, value) in vector.iter_mut().enumerate() {
            if self.is_locked(relay, interval_ms) {
                *value = pinned;
            }
        }
        vector
    }
}

impl Default for LockoutTable<'static> {
    fn default() -> Self {
        Self::new(&RELAY_LOCKOUT_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_lookup_returns_catalog_entry() {
        let fastest = relay_by_index(8).expect("relay 8");
        assert_eq!(fastest.name, "R01");
        assert_eq!(fastest.lockout_ms, 200);
        assert_eq!(
            relay_by_index(RELAY_COUNT),
            Err(TableError::RelayOutOfRange { relay: RELAY_COUNT })
        );
    }

    #[test]
    fn thresholds_follow_column_order() {
        let table = LockoutTable::default();
        assert_eq!(table.lockout_threshold_for(0), Ok(1));
        assert_eq!(table.lockout_threshold_for(6), Ok(50));
        assert!(table.lockout_threshold_for(9).is_err());
    }

    #[test]
    fn relays_lock_only_when_threshold_exceeds_interval() {
        let table = LockoutTable::default();
        assert!(!table.is_locked(8, 200));
        assert!(table.is_locked(8, 199));
        assert_eq!(table.locked_mask(600), 0);
        assert_eq!(table.locked_mask(60), 0b1_1000_0000);
        assert_eq!(table.locked_mask(-5), 0b1_1111_1111);
    }

    #[test]
    fn apply_pins_locked_columns_only() {
        let table = LockoutTable::default();
        let raw = [false; RELAY_COUNT];
        let pinned = table.apply(raw, 75, true);
        assert_eq!(
            pinned,
            [false, false, false, false, false, false, false, true, true]
        );

        let released = table.apply([true; RELAY_COUNT], 75, false);
        assert_eq!(
            released,
            [true, true, true, true, true, true, true, false, false]
        );
    }
}

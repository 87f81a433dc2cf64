//! Status snapshot surfaced by the emulator `status` command and firmware logs.
//!
//! [`StatusFormatter`] keeps the textual rendering consistent across
//! front-ends; the [`fmt::Display`] impl on [`SequencerStatus`] joins its
//! lines into a single row.

use core::fmt::{self, Write as _};

use crate::sequencer::CycleMode;
use crate::states::{ALL_RELAYS, RELAY_COUNT, StateVector};

/// Point-in-time view of the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SequencerStatus {
    pub index: usize,
    pub max_index: usize,
    pub mode: CycleMode,
    pub end_reached: bool,
    pub base_interval_ms: u32,
    pub step_interval_ms: i64,
    pub switch_time_pending: bool,
    /// Levels read back from the relay bank, including direct toggles.
    pub outputs: StateVector,
    pub locked_mask: u16,
}

impl SequencerStatus {
    /// Returns `true` when `relay` is currently locked out.
    #[must_use]
    pub const fn is_locked(&self, relay: usize) -> bool {
        relay < RELAY_COUNT && self.locked_mask & (1 << relay) != 0
    }
}

impl fmt::Display for SequencerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatter = StatusFormatter::new(self);
        formatter.write_position_line(f)?;
        f.write_char(' ')?;
        formatter.write_timing_line(f)?;
        f.write_char(' ')?;
        formatter.write_relays_line(f)
    }
}

/// Helper that renders a [`SequencerStatus`] into human-readable lines.
#[derive(Clone, Copy, Debug)]
pub struct StatusFormatter<'a> {
    status: &'a SequencerStatus,
}

impl<'a> StatusFormatter<'a> {
    #[must_use]
    pub const fn new(status: &'a SequencerStatus) -> Self {
        Self { status }
    }

    /// Writes the position line (e.g. `state 5/511 mode=decrease-index end=no`).
    pub fn write_position_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(
            writer,
            "state {}/{} mode={} end={}",
            self.status.index,
            self.status.max_index,
            self.status.mode,
            yes_no(self.status.end_reached)
        )
    }

    /// Writes the timing line (e.g. `base=600ms step=597ms switch-pending=no`).
    pub fn write_timing_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(
            writer,
            "base={}ms step={}ms switch-pending={}",
            self.status.base_interval_ms,
            self.status.step_interval_ms,
            yes_no(self.status.switch_time_pending)
        )
    }

    /// Writes one marker per relay: `1`/`0` for the level, `L`/`l` when locked.
    pub fn write_relays_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        writer.write_str("relays ")?;
        for line in &ALL_RELAYS {
            let on = self.status.outputs[line.index];
            let marker = match (self.status.is_locked(line.index), on) {
                (true, true) => 'L',
                (true, false) => 'l',
                (false, true) => '1',
                (false, false) => '0',
            };
            writer.write_char(marker)?;
        }
        Ok(())
    }
}

const fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;
    use heapless::String;

    fn sample() -> SequencerStatus {
        SequencerStatus {
            index: 5,
            max_index: 511,
            mode: CycleMode::DecreaseIndex,
            end_reached: false,
            base_interval_ms: 600,
            step_interval_ms: 75,
            switch_time_pending: true,
            outputs: [false, false, false, false, false, false, true, true, true],
            locked_mask: 0b1_1000_0000,
        }
    }

    #[test]
    fn relays_line_marks_locked_columns() {
        let status = sample();
        let mut line = String::<32>::new();
        StatusFormatter::new(&status)
            .write_relays_line(&mut line)
            .unwrap();
        assert_eq!(line.as_str(), "relays 0000001LL");
    }

    #[test]
    fn display_joins_every_line() {
        let status = sample();
        let mut line = String::<128>::new();
        write!(line, "{status}").unwrap();
        assert_eq!(
            line.as_str(),
            "state 5/511 mode=decrease-index end=no base=600ms step=75ms switch-pending=yes relays 0000001LL"
        );
    }

    #[test]
    fn lock_query_ignores_out_of_range_relays() {
        let status = sample();
        assert!(status.is_locked(8));
        assert!(!status.is_locked(0));
        assert!(!status.is_locked(RELAY_COUNT));
    }
}

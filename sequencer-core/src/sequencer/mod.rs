//! Sequencing state machine.
//!
//! The sequencer owns the current table position and cycle mode. Moving modes
//! walk the table one entry per [`Sequencer::advance`] call and stop at the
//! table boundary; every other mode holds position until a new mode arrives.

use core::fmt;

use crate::config::DEFAULT_BASE_INTERVAL_MS;
use crate::io::RelayOutputs;
use crate::protocol::codes;
use crate::states::{LockoutTable, OutputStateTable, RELAY_COUNT, StateVector};

/// Operating modes selectable over the command link.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CycleMode {
    /// Step toward the highest index; locked relays are held on.
    DecreaseIndex,
    /// Step toward index 0; locked relays are held off.
    IncreaseIndex,
    /// Jump to index 0 and hold.
    ResetToLow,
    /// Jump to the highest index and hold.
    ResetToHigh,
    /// Park at index 0 without touching the outputs.
    Manual,
    /// Hold the current position.
    Idle,
}

impl CycleMode {
    /// Maps a wire code onto a mode.
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            codes::MODE_DECREASE_INDEX => Some(CycleMode::DecreaseIndex),
            codes::MODE_INCREASE_INDEX => Some(CycleMode::IncreaseIndex),
            codes::MODE_RESET_TO_HIGH => Some(CycleMode::ResetToHigh),
            codes::MODE_RESET_TO_LOW => Some(CycleMode::ResetToLow),
            codes::MODE_MANUAL => Some(CycleMode::Manual),
            codes::MODE_IDLE => Some(CycleMode::Idle),
            _ => None,
        }
    }

    /// Wire code selecting this mode.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            CycleMode::DecreaseIndex => codes::MODE_DECREASE_INDEX,
            CycleMode::IncreaseIndex => codes::MODE_INCREASE_INDEX,
            CycleMode::ResetToHigh => codes::MODE_RESET_TO_HIGH,
            CycleMode::ResetToLow => codes::MODE_RESET_TO_LOW,
            CycleMode::Manual => codes::MODE_MANUAL,
            CycleMode::Idle => codes::MODE_IDLE,
        }
    }

    /// Level forced onto locked-out relays, or `None` when the mode never moves.
    #[must_use]
    pub const fn lockout_level(self) -> Option<bool> {
        match self {
            CycleMode::DecreaseIndex => Some(true),
            CycleMode::IncreaseIndex => Some(false),
            _ => None,
        }
    }
}

impl fmt::Display for CycleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CycleMode::DecreaseIndex => "decrease-index",
            CycleMode::IncreaseIndex => "increase-index",
            CycleMode::ResetToLow => "reset-to-low",
            CycleMode::ResetToHigh => "reset-to-high",
            CycleMode::Manual => "manual",
            CycleMode::Idle => "idle",
        };
        f.write_str(label)
    }
}

/// Errors raised while changing modes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModeError {
    /// The code does not name a [`CycleMode`].
    UnknownCommandCode(u16),
}

impl fmt::Display for ModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeError::UnknownCommandCode(code) => write!(f, "unknown command code {code}"),
        }
    }
}

/// Result of a single [`Sequencer::advance`] call.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepOutcome {
    /// The current mode does not move.
    Held,
    /// The end of travel was already reached; nothing changed.
    Finished,
    /// Already sitting on the boundary; the end flag is now set.
    Stopped,
    /// Moved to `index` and applied its outputs.
    Moved { index: usize, end_reached: bool },
}

/// Table position, mode and interval bookkeeping for the relay bank.
#[derive(Clone, Debug)]
pub struct Sequencer<'a> {
    table: OutputStateTable<'a>,
    lockout: LockoutTable<'a>,
    index: usize,
    mode: CycleMode,
    base_interval_ms: u32,
    step_interval_ms: i64,
    output_vector: StateVector,
    end_reached: bool,
}

impl<'a> Sequencer<'a> {
    /// Creates a sequencer parked at index 0 in [`CycleMode::Manual`].
    #[must_use]
    pub fn new(
        table: OutputStateTable<'a>,
        lockout: LockoutTable<'a>,
        base_interval_ms: u32,
    ) -> Self {
        Self {
            table,
            lockout,
            index: 0,
            mode: CycleMode::Manual,
            base_interval_ms,
            step_interval_ms: i64::from(base_interval_ms),
            output_vector: table.state_vector_at(0).unwrap_or([false; RELAY_COUNT]),
            end_reached: false,
        }
    }

    #[must_use]
    pub const fn current_index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub const fn current_mode(&self) -> CycleMode {
        self.mode
    }

    #[must_use]
    pub const fn end_reached(&self) -> bool {
        self.end_reached
    }

    #[must_use]
    pub const fn base_interval(&self) -> u32 {
        self.base_interval_ms
    }

    /// Effective interval last pushed by the control cycle.
    #[must_use]
    pub const fn step_interval(&self) -> i64 {
        self.step_interval_ms
    }

    /// Output vector of the current position, after lockout.
    #[must_use]
    pub const fn output_vector(&self) -> StateVector {
        self.output_vector
    }

    /// Highest reachable index.
    #[must_use]
    pub const fn max_index(&self) -> usize {
        self.table.max_index()
    }

    /// Relays currently locked out at the effective step interval.
    #[must_use]
    pub fn locked_mask(&self) -> u16 {
        self.lockout.locked_mask(self.step_interval_ms)
    }

    /// Stores a new base interval and resets the effective interval to match.
    pub fn set_base_interval(&mut self, base_interval_ms: u32) {
        self.base_interval_ms = base_interval_ms;
        self.step_interval_ms = i64::from(base_interval_ms);
    }

    /// Stores the adjusted delay used for lockout decisions on the next step.
    pub fn set_step_interval(&mut self, delay_ms: i64) {
        self.step_interval_ms = delay_ms;
    }

    /// Switches to the mode named by `code`.
    ///
    /// Unknown codes leave the mode untouched.
    pub fn set_mode<O>(&mut self, code: u16, outputs: &mut O) -> Result<CycleMode, ModeError>
    where
        O: RelayOutputs,
    {
        let mode = CycleMode::from_code(code).ok_or(ModeError::UnknownCommandCode(code))?;
        self.enter(mode, outputs);
        Ok(mode)
    }

    /// Switches to `mode`, performing any jump it implies.
    pub fn enter<O>(&mut self, mode: CycleMode, outputs: &mut O)
    where
        O: RelayOutputs,
    {
        self.end_reached = false;
        self.mode = mode;
        match mode {
            CycleMode::ResetToLow => self.jump(0, Some(outputs)),
            CycleMode::ResetToHigh => self.jump(self.table.max_index(), Some(outputs)),
            CycleMode::Manual => self.jump(0, None::<&mut O>),
            CycleMode::DecreaseIndex | CycleMode::IncreaseIndex | CycleMode::Idle => {}
        }
    }

    /// Moves one step in the current mode and applies the resulting outputs.
    pub fn advance<O>(&mut self, outputs: &mut O) -> StepOutcome
    where
        O: RelayOutputs,
    {
        if self.end_reached {
            return StepOutcome::Finished;
        }

        let max = self.table.max_index();
        let next = match self.mode {
            CycleMode::DecreaseIndex => {
                if self.index >= max {
                    self.end_reached = true;
                    return StepOutcome::Stopped;
                }
                if self.index + 1 == max {
                    self.end_reached = true;
                }
                self.index + 1
            }
            CycleMode::IncreaseIndex => {
                if self.index == 0 {
                    self.end_reached = true;
                    return StepOutcome::Stopped;
                }
                if self.index == 1 {
                    self.end_reached = true;
                }
                self.index - 1
            }
            CycleMode::ResetToLow
            | CycleMode::ResetToHigh
            | CycleMode::Manual
            | CycleMode::Idle => return StepOutcome::Held,
        };

        let Ok(raw) = self.table.state_vector_at(next) else {
            self.end_reached = true;
            return StepOutcome::Stopped;
        };
        let vector = match self.mode.lockout_level() {
            Some(level) => self.lockout.apply(raw, self.step_interval_ms, level),
            None => raw,
        };

        self.index = next;
        self.output_vector = vector;
        outputs.apply_vector(&vector);

        StepOutcome::Moved {
            index: next,
            end_reached: self.end_reached,
        }
    }

    fn jump<O>(&mut self, index: usize, outputs: Option<&mut O>)
    where
        O: RelayOutputs,
    {
        let Ok(vector) = self.table.state_vector_at(index) else {
            return;
        };
        self.index = index;
        self.output_vector = vector;
        if let Some(outputs) = outputs {
            outputs.apply_vector(&vector);
        }
    }
}

impl Default for Sequencer<'static> {
    fn default() -> Self {
        Self::new(
            OutputStateTable::default(),
            LockoutTable::default(),
            DEFAULT_BASE_INTERVAL_MS,
        )
    }
}

//! Command multiplexer and control cycle.
//!
//! The multiplexer owns every piece of mutable controller state: the frame
//! decoder, the sequencer and the pending switch-time flag. One call to
//! [`CommandMultiplexer::run_cycle`] is one iteration of the control loop:
//! decode at most one command, dispatch it, refresh the step interval,
//! advance, and report how long the caller must wait before the next cycle.

use core::fmt;
use core::time::Duration;

use embedded_hal::delay::DelayNs;

use crate::config::ControllerConfig;
use crate::io::{ByteLink, RelayOutputs};
use crate::protocol::{CommandDecoder, DecodedCommand, codes};
use crate::sequencer::{CycleMode, ModeError, Sequencer, StepOutcome};
use crate::states::{LockoutTable, OutputStateTable, RELAY_COUNT, relay_by_index};
use crate::status::SequencerStatus;
use crate::telemetry::{TelemetryEventKind, TelemetryInstant, TelemetryRecorder};
use crate::timing::{adjusted_delay, step_wait};

/// Branch taken for one decoded command.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Dispatch {
    /// The command was the awaited switch-time input; carries the new base interval.
    SwitchTimeApplied(u32),
    /// The next command will be taken as a switch-time input.
    SwitchTimeArmed,
    /// Peer hello answered with an acknowledge frame.
    Acknowledged,
    /// Peer hello received but the acknowledge could not be written.
    AckDropped,
    /// A relay was toggled directly.
    RelayToggled { relay: usize, on: bool },
    /// The sequencer switched modes.
    ModeChanged(CycleMode),
    /// The code matched no branch.
    Rejected(ModeError),
}

impl fmt::Display for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatch::SwitchTimeApplied(base) => write!(f, "base interval set to {base} ms"),
            Dispatch::SwitchTimeArmed => f.write_str("awaiting switch time"),
            Dispatch::Acknowledged => f.write_str("hello acknowledged"),
            Dispatch::AckDropped => f.write_str("hello acknowledge dropped"),
            Dispatch::RelayToggled { relay, on } => {
                let name = relay_by_index(*relay).map_or("R??", |line| line.name);
                write!(f, "relay {name} {}", if *on { "on" } else { "off" })
            }
            Dispatch::ModeChanged(mode) => write!(f, "mode {mode}"),
            Dispatch::Rejected(error) => write!(f, "{error}"),
        }
    }
}

/// Everything that happened during one control cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CycleReport {
    pub command: Option<DecodedCommand>,
    pub dispatch: Option<Dispatch>,
    pub step: StepOutcome,
    /// Unclamped adjusted delay pushed into the sequencer.
    pub delay_ms: i64,
    /// Wait the caller must perform before the next cycle.
    pub wait: Duration,
}

/// Owner of all controller state; routes commands and drives the sequencer.
#[derive(Clone, Debug)]
pub struct CommandMultiplexer<'a> {
    decoder: CommandDecoder,
    sequencer: Sequencer<'a>,
    config: ControllerConfig,
    switch_time_pending: bool,
}

impl<'a> CommandMultiplexer<'a> {
    #[must_use]
    pub fn new(sequencer: Sequencer<'a>, config: ControllerConfig) -> Self {
        Self {
            decoder: CommandDecoder::new(),
            sequencer,
            config,
            switch_time_pending: false,
        }
    }

    #[must_use]
    pub const fn sequencer(&self) -> &Sequencer<'a> {
        &self.sequencer
    }

    #[must_use]
    pub const fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Returns `true` while the next command is awaited as a switch time.
    #[must_use]
    pub const fn switch_time_pending(&self) -> bool {
        self.switch_time_pending
    }

    /// Captures the current controller state with the levels read back from `outputs`.
    #[must_use]
    pub fn status<O>(&self, outputs: &O) -> SequencerStatus
    where
        O: RelayOutputs,
    {
        SequencerStatus {
            index: self.sequencer.current_index(),
            max_index: self.sequencer.max_index(),
            mode: self.sequencer.current_mode(),
            end_reached: self.sequencer.end_reached(),
            base_interval_ms: self.sequencer.base_interval(),
            step_interval_ms: self.sequencer.step_interval(),
            switch_time_pending: self.switch_time_pending,
            outputs: outputs.snapshot(),
            locked_mask: self.sequencer.locked_mask(),
        }
    }

    /// Reads from `link` until one command is decoded or the link runs dry.
    pub fn poll_command<L>(&mut self, link: &mut L) -> Option<DecodedCommand>
    where
        L: ByteLink,
    {
        self.decoder.poll(link)
    }

    /// Routes one decoded command; exactly one branch runs.
    pub fn dispatch<L, O, T, const N: usize>(
        &mut self,
        command: DecodedCommand,
        link: &mut L,
        outputs: &mut O,
        telemetry: &mut TelemetryRecorder<T, N>,
        now: T,
    ) -> Dispatch
    where
        L: ByteLink,
        O: RelayOutputs,
        T: TelemetryInstant,
    {
        let code = command.code;

        if self.switch_time_pending {
            self.switch_time_pending = false;
            let base = self.config.scale_switch_time(code);
            self.sequencer.set_base_interval(base);
            telemetry.record_event(TelemetryEventKind::BaseIntervalUpdated(base), now);
            return Dispatch::SwitchTimeApplied(base);
        }

        if code == codes::CHANGE_SWITCH_TIME {
            self.switch_time_pending = true;
            telemetry.record_event(TelemetryEventKind::SwitchTimeArmed, now);
            return Dispatch::SwitchTimeArmed;
        }

        if code == codes::PEER_HELLO {
            telemetry.record_event(TelemetryEventKind::PeerHello, now);
            return match link.write_frame(codes::PEER_ACK) {
                Ok(()) => Dispatch::Acknowledged,
                Err(_) => {
                    telemetry.record_event(TelemetryEventKind::AckDropped, now);
                    Dispatch::AckDropped
                }
            };
        }

        let relay = usize::from(code);
        if relay < RELAY_COUNT {
            let on = outputs.toggle_output(relay);
            telemetry.record_event(TelemetryEventKind::RelayToggled { relay, on }, now);
            return Dispatch::RelayToggled { relay, on };
        }

        match self.sequencer.set_mode(code, outputs) {
            Ok(mode) => {
                telemetry.record_event(TelemetryEventKind::ModeChanged(mode), now);
                Dispatch::ModeChanged(mode)
            }
            Err(error) => {
                telemetry.record_event(TelemetryEventKind::UnknownCommand(code), now);
                Dispatch::Rejected(error)
            }
        }
    }

    /// Runs one control cycle and returns the wait owed before the next one.
    pub fn run_cycle<L, O, T, const N: usize>(
        &mut self,
        link: &mut L,
        outputs: &mut O,
        telemetry: &mut TelemetryRecorder<T, N>,
        now: T,
    ) -> CycleReport
    where
        L: ByteLink,
        O: RelayOutputs,
        T: TelemetryInstant,
    {
        let command = self.poll_command(link);
        let dispatch = command.map(|command| {
            telemetry.record_command(command, now);
            self.dispatch(command, link, outputs, telemetry, now)
        });

        let delay_ms = adjusted_delay(
            self.sequencer.current_index(),
            self.sequencer.base_interval(),
        );
        self.sequencer.set_step_interval(delay_ms);

        let step = self.sequencer.advance(outputs);
        match step {
            StepOutcome::Moved { index, end_reached } => {
                telemetry.record_step(index, delay_ms, self.sequencer.locked_mask(), now);
                if end_reached {
                    telemetry.record_event(TelemetryEventKind::EndReached(index), now);
                }
            }
            StepOutcome::Stopped => {
                let index = self.sequencer.current_index();
                telemetry.record_event(TelemetryEventKind::EndReached(index), now);
            }
            StepOutcome::Held | StepOutcome::Finished => {}
        }

        CycleReport {
            command,
            dispatch,
            step,
            delay_ms,
            wait: step_wait(delay_ms, self.config.delay_floor()),
        }
    }

    /// Runs one control cycle and blocks on `delay` for the resulting wait.
    pub fn step_blocking<L, O, D, T, const N: usize>(
        &mut self,
        link: &mut L,
        outputs: &mut O,
        delay: &mut D,
        telemetry: &mut TelemetryRecorder<T, N>,
        now: T,
    ) -> CycleReport
    where
        L: ByteLink,
        O: RelayOutputs,
        D: DelayNs,
        T: TelemetryInstant,
    {
        let report = self.run_cycle(link, outputs, telemetry, now);
        delay.delay_ms(u32::try_from(report.wait.as_millis()).unwrap_or(u32::MAX));
        report
    }
}

impl CommandMultiplexer<'static> {
    /// Multiplexer over the shipped tables, starting from `config`.
    #[must_use]
    pub fn with_config(config: ControllerConfig) -> Self {
        let sequencer = Sequencer::new(
            OutputStateTable::default(),
            LockoutTable::default(),
            config.base_interval_ms,
        );
        Self::new(sequencer, config)
    }
}

impl Default for CommandMultiplexer<'static> {
    fn default() -> Self {
        Self::with_config(ControllerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::LatchedOutputs;
    use crate::states::{MAX_STATE_INDEX, state_vector_at};
    use crate::status::StatusFormatter;
    use heapless::{Deque, Vec};

    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    struct Tick(u64);

    impl TelemetryInstant for Tick {
        fn saturating_duration_since(&self, earlier: Self) -> Duration {
            Duration::from_millis(self.0.saturating_sub(earlier.0))
        }
    }

    #[derive(Default)]
    struct ScriptedLink {
        rx: Deque<u8, 64>,
        tx: Vec<u8, 64>,
        reject_writes: bool,
    }

    impl ScriptedLink {
        fn with_input(bytes: &[u8]) -> Self {
            let mut link = Self::default();
            for byte in bytes {
                link.rx.push_back(*byte).unwrap();
            }
            link
        }
    }

    impl ByteLink for ScriptedLink {
        type Error = ();

        fn available(&self) -> bool {
            !self.rx.is_empty()
        }

        fn read_byte(&mut self) -> Option<u8> {
            self.rx.pop_front()
        }

        fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error> {
            if self.reject_writes {
                return Err(());
            }
            self.tx.push(byte).map_err(|_| ())
        }
    }

    struct Harness {
        mux: CommandMultiplexer<'static>,
        link: ScriptedLink,
        outputs: LatchedOutputs,
        telemetry: TelemetryRecorder<Tick, 16>,
    }

    impl Harness {
        fn new(input: &[u8]) -> Self {
            Self {
                mux: CommandMultiplexer::default(),
                link: ScriptedLink::with_input(input),
                outputs: LatchedOutputs::new(),
                telemetry: TelemetryRecorder::new(),
            }
        }

        fn cycle(&mut self) -> CycleReport {
            self.mux.run_cycle(
                &mut self.link,
                &mut self.outputs,
                &mut self.telemetry,
                Tick(0),
            )
        }
    }

    #[test]
    fn hello_is_answered_with_single_ack() {
        let mut harness = Harness::new(b"<254>");
        let report = harness.cycle();
        assert_eq!(report.dispatch, Some(Dispatch::Acknowledged));
        assert_eq!(harness.link.tx.as_slice(), b"<253>");

        harness.cycle();
        assert_eq!(harness.link.tx.as_slice(), b"<253>");
    }

    #[test]
    fn failed_ack_is_reported_not_propagated() {
        let mut harness = Harness::new(b"<254>");
        harness.link.reject_writes = true;
        let report = harness.cycle();
        assert_eq!(report.dispatch, Some(Dispatch::AckDropped));
        assert_eq!(
            harness.telemetry.latest().map(|record| record.event),
            Some(TelemetryEventKind::AckDropped)
        );
    }

    #[test]
    fn switch_time_takes_the_following_code() {
        let mut harness = Harness::new(b"<200><250>");
        assert_eq!(harness.cycle().dispatch, Some(Dispatch::SwitchTimeArmed));
        assert!(harness.mux.switch_time_pending());

        let report = harness.cycle();
        assert_eq!(report.dispatch, Some(Dispatch::SwitchTimeApplied(1_000)));
        assert!(!harness.mux.switch_time_pending());
        assert_eq!(harness.mux.sequencer().base_interval(), 1_000);
        assert_eq!(report.delay_ms, 995);
    }

    #[test]
    fn pending_switch_time_wins_over_every_other_branch() {
        let mut harness = Harness::new(b"<200><254>");
        harness.cycle();
        let report = harness.cycle();
        assert_eq!(report.dispatch, Some(Dispatch::SwitchTimeApplied(1_016)));
        assert!(harness.link.tx.is_empty());

        let mut harness = Harness::new(b"<200><3>");
        harness.cycle();
        let report = harness.cycle();
        assert_eq!(report.dispatch, Some(Dispatch::SwitchTimeApplied(50)));
        assert_eq!(harness.outputs.levels(), [false; RELAY_COUNT]);
    }

    #[test]
    fn low_codes_toggle_relays_directly() {
        let mut harness = Harness::new(b"<4><4>");
        assert_eq!(
            harness.cycle().dispatch,
            Some(Dispatch::RelayToggled { relay: 4, on: true })
        );
        assert!(harness.outputs.output(4));
        assert_eq!(
            harness.cycle().dispatch,
            Some(Dispatch::RelayToggled { relay: 4, on: false })
        );
    }

    #[test]
    fn toggle_dispatch_names_the_relay_line() {
        let mut rendered = heapless::String::<32>::new();
        let dispatch = Dispatch::RelayToggled { relay: 4, on: true };
        fmt::write(&mut rendered, format_args!("{dispatch}")).unwrap();
        assert_eq!(rendered.as_str(), "relay R05 on");
    }

    #[test]
    fn empty_frame_toggles_relay_zero() {
        let mut harness = Harness::new(b"<>");
        let report = harness.cycle();
        assert!(report.command.is_some_and(|command| command.malformed));
        assert_eq!(
            report.dispatch,
            Some(Dispatch::RelayToggled { relay: 0, on: true })
        );
    }

    #[test]
    fn unknown_code_is_rejected_and_mode_kept() {
        let mut harness = Harness::new(b"<42>");
        let report = harness.cycle();
        assert_eq!(
            report.dispatch,
            Some(Dispatch::Rejected(ModeError::UnknownCommandCode(42)))
        );
        assert_eq!(harness.mux.sequencer().current_mode(), CycleMode::Manual);
    }

    #[test]
    fn one_command_per_cycle() {
        let mut harness = Harness::new(b"<100><111>");
        let first = harness.cycle();
        assert_eq!(
            first.dispatch,
            Some(Dispatch::ModeChanged(CycleMode::DecreaseIndex))
        );
        assert_eq!(
            first.step,
            StepOutcome::Moved {
                index: 1,
                end_reached: false
            }
        );

        let second = harness.cycle();
        assert_eq!(second.dispatch, Some(Dispatch::ModeChanged(CycleMode::Idle)));
        assert_eq!(second.step, StepOutcome::Held);
        assert_eq!(harness.mux.sequencer().current_index(), 1);
    }

    #[test]
    fn idle_cycle_reports_floor_clamped_wait() {
        let mut harness = Harness::new(b"");
        let report = harness.cycle();
        assert_eq!(report.command, None);
        assert_eq!(report.dispatch, None);
        assert_eq!(report.step, StepOutcome::Held);
        assert_eq!(report.delay_ms, 597);
        assert_eq!(report.wait, Duration::from_millis(597));
    }

    #[test]
    fn status_reflects_controller_state() {
        let mut harness = Harness::new(b"<200>");
        harness.cycle();
        let status = harness.mux.status(&harness.outputs);
        assert_eq!(status.index, 0);
        assert_eq!(status.mode, CycleMode::Manual);
        assert!(status.switch_time_pending);
        assert_eq!(status.step_interval_ms, 597);
    }

    #[test]
    fn status_shows_directly_toggled_relay() {
        let mut harness = Harness::new(b"<4>");
        harness.cycle();

        let status = harness.mux.status(&harness.outputs);
        assert!(harness.outputs.output(4));
        assert!(status.outputs[4]);

        let mut line = heapless::String::<32>::new();
        StatusFormatter::new(&status)
            .write_relays_line(&mut line)
            .unwrap();
        assert_eq!(line.as_str(), "relays 000010000");
    }

    #[test]
    fn status_after_manual_keeps_levels_left_on_the_bank() {
        let mut harness = Harness::new(b"<102><110>");
        harness.cycle();
        harness.cycle();

        let status = harness.mux.status(&harness.outputs);
        assert_eq!(status.index, 0);
        assert_eq!(status.mode, CycleMode::Manual);
        assert_eq!(Ok(status.outputs), state_vector_at(MAX_STATE_INDEX));
        assert_eq!(status.outputs, harness.outputs.levels());
    }
}

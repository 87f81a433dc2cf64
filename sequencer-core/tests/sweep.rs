use core::time::Duration;

use sequencer_core::io::{ByteLink, LatchedOutputs, RelayOutputs};
use sequencer_core::mux::{CommandMultiplexer, Dispatch};
use sequencer_core::sequencer::{CycleMode, Sequencer, StepOutcome};
use sequencer_core::states::{MAX_STATE_INDEX, RELAY_COUNT, state_vector_at};
use sequencer_core::telemetry::{TelemetryEventKind, TelemetryInstant, TelemetryRecorder};

#[derive(Copy, Clone, Debug, Default)]
struct Tick(u64);

impl TelemetryInstant for Tick {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

#[derive(Default)]
struct OneShotLink {
    rx: Vec<u8>,
    tx: Vec<u8>,
}

impl ByteLink for OneShotLink {
    type Error = core::convert::Infallible;

    fn available(&self) -> bool {
        !self.rx.is_empty()
    }

    fn read_byte(&mut self) -> Option<u8> {
        if self.rx.is_empty() {
            None
        } else {
            Some(self.rx.remove(0))
        }
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.tx.push(byte);
        Ok(())
    }
}

#[test]
fn decrease_sweep_reaches_max_and_marks_end_on_last_step() {
    let mut sequencer = Sequencer::default();
    let mut outputs = LatchedOutputs::new();
    sequencer.enter(CycleMode::DecreaseIndex, &mut outputs);

    for index in 1..=MAX_STATE_INDEX {
        let outcome = sequencer.advance(&mut outputs);
        assert_eq!(
            outcome,
            StepOutcome::Moved {
                index,
                end_reached: index == MAX_STATE_INDEX,
            }
        );
        assert_eq!(Ok(outputs.levels()), state_vector_at(index));
    }

    assert_eq!(sequencer.current_index(), MAX_STATE_INDEX);
    assert!(sequencer.end_reached());
    assert_eq!(sequencer.advance(&mut outputs), StepOutcome::Finished);
    assert_eq!(sequencer.current_index(), MAX_STATE_INDEX);
}

#[test]
fn increase_sweep_mirrors_decrease() {
    let mut sequencer = Sequencer::default();
    let mut outputs = LatchedOutputs::new();
    sequencer.enter(CycleMode::ResetToHigh, &mut outputs);
    sequencer.enter(CycleMode::IncreaseIndex, &mut outputs);

    for index in (0..MAX_STATE_INDEX).rev() {
        let outcome = sequencer.advance(&mut outputs);
        assert_eq!(
            outcome,
            StepOutcome::Moved {
                index,
                end_reached: index == 0,
            }
        );
        assert_eq!(Ok(outputs.levels()), state_vector_at(index));
    }

    assert_eq!(sequencer.advance(&mut outputs), StepOutcome::Finished);
    assert_eq!(outputs.levels(), [false; RELAY_COUNT]);
}

#[test]
fn controller_sweep_pins_fast_relays_once_delay_drops() {
    let mut mux = CommandMultiplexer::default();
    let mut link = OneShotLink {
        rx: b"<100>".to_vec(),
        ..OneShotLink::default()
    };
    let mut outputs = LatchedOutputs::new();
    let mut telemetry = TelemetryRecorder::<Tick, 8>::new();

    let mut moves = 0;
    for tick in 0.. {
        let report = mux.run_cycle(&mut link, &mut outputs, &mut telemetry, Tick(tick));
        if tick == 0 {
            assert_eq!(
                report.dispatch,
                Some(Dispatch::ModeChanged(CycleMode::DecreaseIndex))
            );
        }

        match report.step {
            StepOutcome::Moved { index, .. } => {
                moves += 1;
                let raw = state_vector_at(index).expect("valid index");
                if report.delay_ms >= 200 {
                    assert_eq!(outputs.levels(), raw, "index {index}");
                } else {
                    assert!(outputs.output(RELAY_COUNT - 1), "index {index}");
                }
                if report.delay_ms < 1 {
                    assert_eq!(outputs.levels(), [true; RELAY_COUNT], "index {index}");
                }
                assert!(report.wait >= Duration::from_millis(1));
            }
            StepOutcome::Finished => break,
            other => panic!("unexpected step outcome {other:?}"),
        }
    }

    assert_eq!(moves, MAX_STATE_INDEX);
    assert!(mux.status(&outputs).end_reached);
    let last = telemetry.latest().copied().expect("telemetry recorded");
    assert_eq!(last.event, TelemetryEventKind::EndReached(MAX_STATE_INDEX));
    assert!(link.tx.is_empty());
}

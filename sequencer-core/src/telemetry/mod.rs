//! Telemetry event catalog and bounded history shared by firmware and host targets.
//!
//! The core never logs directly. Every noteworthy decision of the control
//! cycle is recorded here with a caller-supplied timestamp; firmware forwards
//! the latest record to `defmt` and the emulator prints the history on demand.

use core::{fmt, time::Duration};

use heapless::{HistoryBuf, OldestOrdered};

use crate::protocol::DecodedCommand;
use crate::sequencer::CycleMode;
use crate::states::relay_by_index;

/// Monotonic identifier assigned to each recorded event.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Discriminated telemetry events emitted by the control cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TelemetryEventKind {
    CommandReceived(u16),
    FrameMalformed(u16),
    FrameTruncated(u16),
    RelayToggled { relay: usize, on: bool },
    ModeChanged(CycleMode),
    UnknownCommand(u16),
    SwitchTimeArmed,
    BaseIntervalUpdated(u32),
    PeerHello,
    AckDropped,
    StepApplied(usize),
    EndReached(usize),
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::CommandReceived(code) => write!(f, "command-received {code}"),
            TelemetryEventKind::FrameMalformed(code) => write!(f, "frame-malformed -> {code}"),
            TelemetryEventKind::FrameTruncated(code) => write!(f, "frame-truncated -> {code}"),
            TelemetryEventKind::RelayToggled { relay, on } => {
                let name = relay_by_index(*relay).map_or("R??", |line| line.name);
                let level = if *on { "on" } else { "off" };
                write!(f, "relay-toggled {name} {level}")
            }
            TelemetryEventKind::ModeChanged(mode) => write!(f, "mode-changed {mode}"),
            TelemetryEventKind::UnknownCommand(code) => write!(f, "unknown-command {code}"),
            TelemetryEventKind::SwitchTimeArmed => f.write_str("switch-time-armed"),
            TelemetryEventKind::BaseIntervalUpdated(ms) => {
                write!(f, "base-interval-updated {ms} ms")
            }
            TelemetryEventKind::PeerHello => f.write_str("peer-hello"),
            TelemetryEventKind::AckDropped => f.write_str("ack-dropped"),
            TelemetryEventKind::StepApplied(index) => write!(f, "step-applied {index}"),
            TelemetryEventKind::EndReached(index) => write!(f, "end-reached {index}"),
        }
    }
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TelemetryPayload {
    /// No additional metadata accompanies the event.
    None,
    /// Decode diagnostics for a received frame.
    Frame(FrameTelemetry),
    /// Timing and lockout details of an applied step.
    Step(StepTelemetry),
}

impl TelemetryPayload {
    /// Convenience constructor when no payload data is needed.
    #[must_use]
    pub const fn none() -> Self {
        TelemetryPayload::None
    }
}

/// Frame decode payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameTelemetry {
    pub malformed: bool,
    pub truncated: bool,
}

impl From<DecodedCommand> for FrameTelemetry {
    fn from(command: DecodedCommand) -> Self {
        Self {
            malformed: command.malformed,
            truncated: command.truncated,
        }
    }
}

/// Applied step payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StepTelemetry {
    pub delay_ms: i64,
    pub locked_mask: u16,
    pub elapsed_since_previous: Option<Duration>,
}

impl StepTelemetry {
    #[must_use]
    pub const fn new(
        delay_ms: i64,
        locked_mask: u16,
        elapsed_since_previous: Option<Duration>,
    ) -> Self {
        Self {
            delay_ms,
            locked_mask,
            elapsed_since_previous,
        }
    }
}

/// Trait implemented by monotonic instant wrappers used for telemetry tracking.
pub trait TelemetryInstant: Copy {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: TelemetryRing<TInstant, CAPACITY>,
    last_step_at: Option<TInstant>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy + TelemetryInstant,
{
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            last_step_at: None,
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    /// Returns the number of records currently stored.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when no telemetry records are stored.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Identifier the next recorded event will receive.
    pub const fn next_event_id(&self) -> EventId {
        self.next_event_id
    }

    /// Records a decoded frame, flagging decode problems as their own events.
    pub fn record_command(&mut self, command: DecodedCommand, timestamp: TInstant) -> EventId {
        let payload = TelemetryPayload::Frame(FrameTelemetry::from(command));
        let event = if command.truncated {
            TelemetryEventKind::FrameTruncated(command.code)
        } else if command.malformed {
            TelemetryEventKind::FrameMalformed(command.code)
        } else {
            TelemetryEventKind::CommandReceived(command.code)
        };
        self.record(event, payload, timestamp)
    }

    /// Records an applied step and the elapsed time since the previous one.
    pub fn record_step(
        &mut self,
        index: usize,
        delay_ms: i64,
        locked_mask: u16,
        timestamp: TInstant,
    ) -> EventId {
        let elapsed = self
            .last_step_at
            .map(|previous| timestamp.saturating_duration_since(previous));
        self.last_step_at = Some(timestamp);

        let payload = TelemetryPayload::Step(StepTelemetry::new(delay_ms, locked_mask, elapsed));
        self.record(TelemetryEventKind::StepApplied(index), payload, timestamp)
    }

    /// Records an event that carries no payload.
    pub fn record_event(&mut self, event: TelemetryEventKind, timestamp: TInstant) -> EventId {
        self.record(event, TelemetryPayload::none(), timestamp)
    }

    /// Records an arbitrary telemetry event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy + TelemetryInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
    struct MicrosInstant(u64);

    impl TelemetryInstant for MicrosInstant {
        fn saturating_duration_since(&self, earlier: Self) -> Duration {
            Duration::from_micros(self.0.saturating_sub(earlier.0))
        }
    }

    #[test]
    fn records_elapsed_between_steps() {
        let mut recorder = TelemetryRecorder::<MicrosInstant>::new();

        let id1 = recorder.record_step(1, 597, 0, MicrosInstant(100));
        assert_eq!(id1, 0);
        let first = recorder.latest().copied().unwrap();
        assert_eq!(first.event, TelemetryEventKind::StepApplied(1));
        match first.details {
            TelemetryPayload::Step(details) => {
                assert_eq!(details.delay_ms, 597);
                assert_eq!(details.elapsed_since_previous, None);
            }
            _ => panic!("expected step payload"),
        }

        let id2 = recorder.record_step(2, 597, 0, MicrosInstant(250));
        assert_eq!(id2, 1);
        let second = recorder.latest().copied().unwrap();
        match second.details {
            TelemetryPayload::Step(details) => {
                let elapsed = details.elapsed_since_previous.expect("missing elapsed");
                assert_eq!(elapsed.as_micros(), 150);
            }
            _ => panic!("expected step payload"),
        }
    }

    #[test]
    fn decode_problems_get_their_own_event_kinds() {
        let mut recorder = TelemetryRecorder::<MicrosInstant>::new();

        recorder.record_command(DecodedCommand::new(5), MicrosInstant(1));
        assert_eq!(
            recorder.latest().map(|record| record.event),
            Some(TelemetryEventKind::CommandReceived(5))
        );

        let malformed = DecodedCommand {
            code: 0,
            malformed: true,
            truncated: false,
        };
        recorder.record_command(malformed, MicrosInstant(2));
        assert_eq!(
            recorder.latest().map(|record| record.event),
            Some(TelemetryEventKind::FrameMalformed(0))
        );

        let truncated = DecodedCommand {
            code: 1234,
            malformed: false,
            truncated: true,
        };
        recorder.record_command(truncated, MicrosInstant(3));
        let record = recorder.latest().copied().unwrap();
        assert_eq!(record.event, TelemetryEventKind::FrameTruncated(1234));
        assert_eq!(
            record.details,
            TelemetryPayload::Frame(FrameTelemetry {
                malformed: false,
                truncated: true,
            })
        );
    }

    #[test]
    fn ring_keeps_most_recent_entries_in_order() {
        let mut recorder = TelemetryRecorder::<MicrosInstant, 4>::new();
        for tick in 0..6u64 {
            recorder.record_event(TelemetryEventKind::PeerHello, MicrosInstant(tick));
        }

        assert_eq!(recorder.len(), 4);
        assert_eq!(recorder.next_event_id(), 6);
        let ids: heapless::Vec<EventId, 4> =
            recorder.oldest_first().map(|record| record.id).collect();
        assert_eq!(ids.as_slice(), &[2, 3, 4, 5]);
    }

    #[test]
    fn events_render_as_kebab_labels() {
        let mut rendered = heapless::String::<48>::new();
        core::fmt::write(
            &mut rendered,
            format_args!("{}", TelemetryEventKind::RelayToggled { relay: 8, on: true }),
        )
        .unwrap();
        assert_eq!(rendered.as_str(), "relay-toggled R01 on");
    }
}

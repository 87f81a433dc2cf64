//! Firmware side of the controller telemetry.
//!
//! The core records every cycle decision into a [`TelemetryRecorder`]; this
//! module supplies the embassy-backed timestamp and forwards each new record
//! to defmt (or stdout on host builds) exactly once.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::time::Duration;

use embassy_time::Instant;
use sequencer_core::telemetry::{
    EventId, TELEMETRY_RING_CAPACITY, TelemetryEventKind, TelemetryInstant, TelemetryPayload,
    TelemetryRecord, TelemetryRecorder,
};

/// Embassy instant wrapper implementing the core's timestamp trait.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct FirmwareInstant(Instant);

impl FirmwareInstant {
    #[cfg(target_os = "none")]
    pub fn now() -> Self {
        Self(Instant::now())
    }

    pub const fn into_embassy(self) -> Instant {
        self.0
    }
}

impl From<Instant> for FirmwareInstant {
    fn from(value: Instant) -> Self {
        Self(value)
    }
}

impl TelemetryInstant for FirmwareInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_duration_since(earlier.0).as_micros())
    }
}

/// Recorder type owned by the control task.
pub type FirmwareTelemetry = TelemetryRecorder<FirmwareInstant, TELEMETRY_RING_CAPACITY>;

/// Log level a telemetry event is forwarded at.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Severity {
    Debug,
    Info,
    Warn,
}

impl Severity {
    pub const fn of(event: &TelemetryEventKind) -> Self {
        match event {
            TelemetryEventKind::FrameMalformed(_)
            | TelemetryEventKind::FrameTruncated(_)
            | TelemetryEventKind::UnknownCommand(_)
            | TelemetryEventKind::AckDropped => Severity::Warn,
            TelemetryEventKind::CommandReceived(_) | TelemetryEventKind::StepApplied(_) => {
                Severity::Debug
            }
            _ => Severity::Info,
        }
    }
}

/// Forwards records that appeared since the previous call.
#[derive(Debug, Default)]
pub struct TelemetryForwarder {
    next_id: EventId,
}

impl TelemetryForwarder {
    pub const fn new() -> Self {
        Self { next_id: 0 }
    }

    /// Emits every unforwarded record and returns how many were emitted.
    pub fn forward(&mut self, telemetry: &FirmwareTelemetry) -> usize {
        let mut emitted = 0;
        for record in telemetry
            .oldest_first()
            .filter(|record| record.id.wrapping_sub(self.next_id) < u32::MAX / 2)
        {
            emit_record(record);
            emitted += 1;
        }
        self.next_id = telemetry.next_event_id();
        emitted
    }
}

fn emit_record(record: &TelemetryRecord<FirmwareInstant>) {
    let timestamp_ms = record.timestamp.into_embassy().as_millis();
    match record.details {
        TelemetryPayload::Step(step) => emit_step(
            record.id,
            timestamp_ms,
            &record.event,
            step.delay_ms,
            step.locked_mask,
        ),
        TelemetryPayload::None | TelemetryPayload::Frame(_) => {
            emit_event(record.id, timestamp_ms, &record.event);
        }
    }
}

#[cfg(target_os = "none")]
fn emit_event(id: EventId, timestamp_ms: u64, event: &TelemetryEventKind) {
    match Severity::of(event) {
        Severity::Debug => defmt::debug!("telemetry#{} t={}ms {}", id, timestamp_ms, event),
        Severity::Info => defmt::info!("telemetry#{} t={}ms {}", id, timestamp_ms, event),
        Severity::Warn => defmt::warn!("telemetry#{} t={}ms {}", id, timestamp_ms, event),
    }
}

#[cfg(not(target_os = "none"))]
fn emit_event(id: EventId, timestamp_ms: u64, event: &TelemetryEventKind) {
    println!("telemetry#{id} t={timestamp_ms}ms {event}");
}

#[cfg(target_os = "none")]
fn emit_step(id: EventId, timestamp_ms: u64, event: &TelemetryEventKind, delay: i64, mask: u16) {
    defmt::debug!(
        "telemetry#{} t={}ms {} delay={}ms locked={=u16:b}",
        id,
        timestamp_ms,
        event,
        delay,
        mask
    );
}

#[cfg(not(target_os = "none"))]
fn emit_step(id: EventId, timestamp_ms: u64, event: &TelemetryEventKind, delay: i64, mask: u16) {
    println!("telemetry#{id} t={timestamp_ms}ms {event} delay={delay}ms locked={mask:09b}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use sequencer_core::sequencer::CycleMode;

    fn at(ms: u64) -> FirmwareInstant {
        FirmwareInstant::from(Instant::from_millis(ms))
    }

    #[test]
    fn firmware_instant_measures_elapsed_time() {
        assert_eq!(
            at(1_250).saturating_duration_since(at(1_000)),
            Duration::from_millis(250)
        );
        assert_eq!(at(10).saturating_duration_since(at(20)), Duration::ZERO);
    }

    #[test]
    fn decode_problems_are_forwarded_as_warnings() {
        assert_eq!(
            Severity::of(&TelemetryEventKind::FrameMalformed(0)),
            Severity::Warn
        );
        assert_eq!(Severity::of(&TelemetryEventKind::AckDropped), Severity::Warn);
        assert_eq!(
            Severity::of(&TelemetryEventKind::StepApplied(3)),
            Severity::Debug
        );
        assert_eq!(
            Severity::of(&TelemetryEventKind::ModeChanged(CycleMode::Manual)),
            Severity::Info
        );
    }

    #[test]
    fn forwarder_emits_each_record_once() {
        let mut telemetry = FirmwareTelemetry::new();
        let mut forwarder = TelemetryForwarder::new();

        telemetry.record_event(TelemetryEventKind::PeerHello, at(0));
        telemetry.record_step(1, 597, 0, at(600));
        assert_eq!(forwarder.forward(&telemetry), 2);
        assert_eq!(forwarder.forward(&telemetry), 0);

        telemetry.record_event(TelemetryEventKind::EndReached(0), at(700));
        assert_eq!(forwarder.forward(&telemetry), 1);
    }
}

use embassy_time::{Duration, Timer};
use sequencer_core::config::STARTUP_BANNER;
use sequencer_core::io::RelayOutputs;
use sequencer_core::mux::{CommandMultiplexer, CycleReport};
use sequencer_core::sequencer::StepOutcome;
use sequencer_core::states::vector_mask;

use crate::link::ChannelLink;
use crate::relays::GpioRelayBank;
use crate::status;
use crate::telemetry::{FirmwareInstant, FirmwareTelemetry, TelemetryForwarder};

#[embassy_executor::task]
pub async fn run(
    mut mux: CommandMultiplexer<'static>,
    mut link: ChannelLink<'static>,
    mut relays: GpioRelayBank<'static>,
) -> ! {
    let mut telemetry = FirmwareTelemetry::new();
    let mut forwarder = TelemetryForwarder::new();

    if link
        .write_text(STARTUP_BANNER)
        .and_then(|()| link.write_text("\r\n"))
        .is_err()
    {
        defmt::warn!("control: startup banner truncated");
    }

    loop {
        let report = mux.run_cycle(&mut link, &mut relays, &mut telemetry, FirmwareInstant::now());
        forwarder.forward(&telemetry);
        status::record_relay_mask(vector_mask(&relays.snapshot()));

        if worth_reporting(&report) {
            let health = status::snapshot();
            let snapshot = mux.status(&relays);
            if health.degraded() {
                defmt::warn!(
                    "control: {} link={} (UART errors seen)",
                    defmt::Display2Format(&snapshot),
                    health
                );
            } else {
                defmt::info!(
                    "control: {} link={}",
                    defmt::Display2Format(&snapshot),
                    health
                );
            }
        }

        // The only suspension point of the control cycle.
        Timer::after(wait_for(&report)).await;
    }
}

fn worth_reporting(report: &CycleReport) -> bool {
    report.dispatch.is_some()
        || matches!(
            report.step,
            StepOutcome::Moved {
                end_reached: true,
                ..
            } | StepOutcome::Stopped
        )
}

fn wait_for(report: &CycleReport) -> Duration {
    Duration::from_micros(u64::try_from(report.wait.as_micros()).unwrap_or(u64::MAX))
}

use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Level, Output, Speed};
use sequencer_core::config::STARTUP_BANNER;
use sequencer_core::mux::CommandMultiplexer;

use crate::link::LinkQueue;
use crate::relays::{GpioRelayBank, RELAY_PINS};

mod control_task;
mod link_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub(super) static LINK_QUEUE: LinkQueue = LinkQueue::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        PA1,
        PA4,
        PA5,
        PA6,
        PA7,
        PB3,
        PB4,
        PB5,
        PB0,
        PB1,
        USART5,
        ..
    } = hal::init(config);

    // Column order must match RELAY_PINS.
    let relays = GpioRelayBank::new([
        Output::new(PA0, Level::Low, Speed::Low),
        Output::new(PA1, Level::Low, Speed::Low),
        Output::new(PA4, Level::Low, Speed::Low),
        Output::new(PA5, Level::Low, Speed::Low),
        Output::new(PA6, Level::Low, Speed::Low),
        Output::new(PA7, Level::Low, Speed::Low),
        Output::new(PB3, Level::Low, Speed::Low),
        Output::new(PB4, Level::Low, Speed::Low),
        Output::new(PB5, Level::Low, Speed::Low),
    ]);
    for entry in &RELAY_PINS {
        defmt::debug!("relay {} on {}", entry.relay, entry.pin);
    }

    let mux = CommandMultiplexer::default();
    defmt::info!("{}", STARTUP_BANNER);
    defmt::info!("control: {}", defmt::Display2Format(&mux.status(&relays)));

    if spawner
        .spawn(link_task::run(&LINK_QUEUE, USART5, PB0, PB1))
        .is_err()
    {
        defmt::error!("failed to spawn link task");
    }

    if spawner
        .spawn(control_task::run(mux, LINK_QUEUE.control_link(), relays))
        .is_err()
    {
        defmt::error!("failed to spawn control task");
    }

    core::future::pending::<()>().await;
}

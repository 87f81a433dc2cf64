use embassy_futures::join::join;
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::usart::{BufferedUart, Config as UartConfig, DataBits, Parity, StopBits};
use embassy_time::{Duration, Timer};
use embedded_io_async::{Read, Write};
use sequencer_core::config::LINK_BAUD;
use static_cell::StaticCell;

use crate::link::{LINK_QUEUE_DEPTH, LinkQueue};
use crate::status;

const LINK_UART_BUFFER_SIZE: usize = LINK_QUEUE_DEPTH * 2;
const UART_RETRY_DELAY: Duration = Duration::from_millis(5);

static UART_TX_BUFFER: StaticCell<[u8; LINK_UART_BUFFER_SIZE]> = StaticCell::new();
static UART_RX_BUFFER: StaticCell<[u8; LINK_UART_BUFFER_SIZE]> = StaticCell::new();

embassy_stm32::bind_interrupts!(struct UartIrqs {
    USART3_4_5_6_LPUART1 => embassy_stm32::usart::BufferedInterruptHandler<hal::peripherals::USART5>;
});

#[embassy_executor::task]
pub async fn run(
    queue: &'static LinkQueue,
    usart: Peri<'static, hal::peripherals::USART5>,
    tx_pin: Peri<'static, hal::peripherals::PB0>,
    rx_pin: Peri<'static, hal::peripherals::PB1>,
) -> ! {
    let mut config = UartConfig::default();
    config.baudrate = LINK_BAUD;
    config.data_bits = DataBits::DataBits8;
    config.stop_bits = StopBits::STOP1;
    config.parity = Parity::ParityNone;

    let tx_buffer = UART_TX_BUFFER.init([0; LINK_UART_BUFFER_SIZE]);
    let rx_buffer = UART_RX_BUFFER.init([0; LINK_UART_BUFFER_SIZE]);

    let Ok(uart) = BufferedUart::new(
        usart, rx_pin, tx_pin, tx_buffer, rx_buffer, UartIrqs, config,
    ) else {
        defmt::error!("link: UART configuration rejected");
        loop {
            core::future::pending::<()>().await;
        }
    };

    let (mut uart_tx, mut uart_rx) = uart.split();

    let inbound = queue.inbound_sender();
    let outbound = queue.outbound_receiver();

    let control_to_uart = async move {
        let mut chunk = [0u8; LINK_QUEUE_DEPTH];
        loop {
            chunk[0] = outbound.receive().await;
            let mut len = 1;
            while len < chunk.len() {
                match outbound.try_receive() {
                    Ok(byte) => {
                        chunk[len] = byte;
                        len += 1;
                    }
                    Err(_) => break,
                }
            }

            if uart_tx.write_all(&chunk[..len]).await.is_err() {
                defmt::warn!("link: UART write error, {} bytes lost", len);
                status::record_uart_error();
                Timer::after(UART_RETRY_DELAY).await;
                continue;
            }

            if uart_tx.flush().await.is_err() {
                defmt::warn!("link: UART flush error");
                status::record_uart_error();
                Timer::after(UART_RETRY_DELAY).await;
                continue;
            }

            status::record_tx(len);
        }
    };

    let uart_to_control = async move {
        let mut ingress = [0u8; LINK_QUEUE_DEPTH];
        loop {
            match uart_rx.read(&mut ingress).await {
                Ok(count) if count > 0 => {
                    for byte in &ingress[..count] {
                        inbound.send(*byte).await;
                    }
                    status::record_rx(count);
                }
                Ok(_) => {}
                Err(_) => {
                    defmt::warn!("link: UART read error");
                    status::record_uart_error();
                    Timer::after(UART_RETRY_DELAY).await;
                }
            }
        }
    };

    join(control_to_uart, uart_to_control).await;
    loop {
        core::future::pending::<()>().await;
    }
}

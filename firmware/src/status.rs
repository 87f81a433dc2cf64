#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared counters for the firmware target.
//!
//! The link task and the control task run independently; lightweight atomics
//! let either side publish what it observed and let the control task fold the
//! link health into its periodic status line.

use portable_atomic::{AtomicU16, AtomicU32, Ordering};

/// Bytes received from the UART and handed to the control task.
static RX_BYTES: AtomicU32 = AtomicU32::new(0);
/// Bytes written to the UART.
static TX_BYTES: AtomicU32 = AtomicU32::new(0);
/// UART read or write failures.
static UART_ERRORS: AtomicU32 = AtomicU32::new(0);
/// Energized relays after the latest cycle, bit `n` for column `n`.
static RELAY_MASK: AtomicU16 = AtomicU16::new(0);

/// Point-in-time copy of every counter.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct LinkHealth {
    pub rx_bytes: u32,
    pub tx_bytes: u32,
    pub uart_errors: u32,
    pub relay_mask: u16,
}

impl LinkHealth {
    /// Returns `true` once the UART reported an error.
    pub const fn degraded(&self) -> bool {
        self.uart_errors > 0
    }
}

/// Counts received bytes forwarded to the control task.
pub fn record_rx(count: usize) {
    RX_BYTES.fetch_add(saturate(count), Ordering::Relaxed);
}

/// Counts bytes handed to the UART.
pub fn record_tx(count: usize) {
    TX_BYTES.fetch_add(saturate(count), Ordering::Relaxed);
}

/// Counts a UART read or write failure.
pub fn record_uart_error() {
    UART_ERRORS.fetch_add(1, Ordering::Relaxed);
}

/// Stores the relay levels observed after a cycle.
pub fn record_relay_mask(mask: u16) {
    RELAY_MASK.store(mask, Ordering::Relaxed);
}

/// Builds a [`LinkHealth`] from the stored counters.
pub fn snapshot() -> LinkHealth {
    LinkHealth {
        rx_bytes: RX_BYTES.load(Ordering::Relaxed),
        tx_bytes: TX_BYTES.load(Ordering::Relaxed),
        uart_errors: UART_ERRORS.load(Ordering::Relaxed),
        relay_mask: RELAY_MASK.load(Ordering::Relaxed),
    }
}

fn saturate(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

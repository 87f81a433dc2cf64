//! Byte channels between the UART task and the control task.
//!
//! The UART task owns the peripheral and shovels bytes in both directions;
//! the control task only sees a [`ChannelLink`], a non-blocking
//! [`ByteLink`] over the two bounded channels.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::fmt;

use embassy_sync::channel::{Channel, Receiver, Sender};
use sequencer_core::io::ByteLink;

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;

#[cfg(target_os = "none")]
type LinkMutex = ThreadModeRawMutex;
#[cfg(not(target_os = "none"))]
type LinkMutex = NoopRawMutex;

/// Depth of each byte channel; a little over one cycle of traffic at 9600 baud.
pub const LINK_QUEUE_DEPTH: usize = 64;

/// Channel carrying raw link bytes.
pub type ByteChannel = Channel<LinkMutex, u8, LINK_QUEUE_DEPTH>;

/// Sender handle tied to a byte channel.
pub type ByteSender<'a> = Sender<'a, LinkMutex, u8, LINK_QUEUE_DEPTH>;

/// Receiver handle tied to a byte channel.
pub type ByteReceiver<'a> = Receiver<'a, LinkMutex, u8, LINK_QUEUE_DEPTH>;

/// Bundles the inbound and outbound byte channels so tasks can share one instance.
pub struct LinkQueue {
    pub inbound: ByteChannel,
    pub outbound: ByteChannel,
}

impl LinkQueue {
    /// Creates a link queue with both channels empty.
    pub const fn new() -> Self {
        Self {
            inbound: Channel::new(),
            outbound: Channel::new(),
        }
    }

    /// Sender used by the UART task for received bytes.
    pub fn inbound_sender(&self) -> ByteSender<'_> {
        self.inbound.sender()
    }

    /// Receiver used by the UART task for bytes to transmit.
    pub fn outbound_receiver(&self) -> ByteReceiver<'_> {
        self.outbound.receiver()
    }

    /// Control-side view of the queue.
    pub fn control_link(&self) -> ChannelLink<'_> {
        ChannelLink::new(self.inbound.receiver(), self.outbound.sender())
    }
}

impl Default for LinkQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Reasons a byte could not be queued for transmission.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum LinkError {
    /// The outbound channel is full; the byte was dropped.
    OutboundFull,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::OutboundFull => f.write_str("outbound link queue full"),
        }
    }
}

/// Non-blocking [`ByteLink`] backed by the link channels.
pub struct ChannelLink<'a> {
    rx: ByteReceiver<'a>,
    tx: ByteSender<'a>,
}

impl<'a> ChannelLink<'a> {
    pub fn new(rx: ByteReceiver<'a>, tx: ByteSender<'a>) -> Self {
        Self { rx, tx }
    }

    /// Queues every byte of `text`, stopping at the first full-queue error.
    pub fn write_text(&mut self, text: &str) -> Result<(), LinkError> {
        for byte in text.bytes() {
            self.write_byte(byte)?;
        }
        Ok(())
    }
}

impl ByteLink for ChannelLink<'_> {
    type Error = LinkError;

    fn available(&self) -> bool {
        !self.rx.is_empty()
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.rx.try_receive().ok()
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.tx.try_send(byte).map_err(|_| LinkError::OutboundFull)
    }
}

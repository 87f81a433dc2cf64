//! Framed command protocol spoken over the byte link.
//!
//! Frames are ASCII decimal codes wrapped in `<` and `>`. There is no escaping:
//! a `<` inside a frame simply restarts it. The decoder keeps a tiny bounded
//! buffer and never blocks or errors; oversize payloads are truncated and
//! malformed payloads decode to zero.

use core::ops::Deref;

pub mod decoder;

pub use decoder::{CommandDecoder, DecodedCommand, parse_code};

/// Byte that opens a frame.
pub const FRAME_START: u8 = b'<';
/// Byte that closes a frame.
pub const FRAME_END: u8 = b'>';
/// Payload bytes retained per frame; enough for every reserved code.
pub const MAX_FRAME_PAYLOAD: usize = 4;
/// Longest encoded outbound frame (`<65535>`).
pub const MAX_ENCODED_FRAME: usize = 7;

/// Reserved code ranges on the wire.
pub mod codes {
    /// First mode code; see [`crate::sequencer::CycleMode::from_code`].
    pub const MODE_DECREASE_INDEX: u16 = 100;
    pub const MODE_INCREASE_INDEX: u16 = 101;
    pub const MODE_RESET_TO_HIGH: u16 = 102;
    pub const MODE_RESET_TO_LOW: u16 = 103;
    pub const MODE_MANUAL: u16 = 110;
    pub const MODE_IDLE: u16 = 111;
    /// The next code received is a new switch-time input.
    pub const CHANGE_SWITCH_TIME: u16 = 200;
    /// Sent back in reply to [`PEER_HELLO`].
    pub const PEER_ACK: u16 = 253;
    /// Startup hello from the operator panel.
    pub const PEER_HELLO: u16 = 254;
}

/// One encoded outbound frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EncodedFrame {
    bytes: [u8; MAX_ENCODED_FRAME],
    len: usize,
}

impl EncodedFrame {
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

impl Deref for EncodedFrame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl IntoIterator for EncodedFrame {
    type Item = u8;
    type IntoIter = core::iter::Take<core::array::IntoIter<u8, MAX_ENCODED_FRAME>>;

    fn into_iter(self) -> Self::IntoIter {
        self.bytes.into_iter().take(self.len)
    }
}

/// Encodes `code` as `<digits>`.
#[must_use]
pub fn encode_frame(code: u16) -> EncodedFrame {
    let mut digits = [0u8; MAX_ENCODED_FRAME - 2];
    let mut remaining = code;
    let mut start = digits.len();
    loop {
        start -= 1;
        digits[start] = b'0' + u8::try_from(remaining % 10).unwrap_or(0);
        remaining /= 10;
        if remaining == 0 {
            break;
        }
    }

    let payload = &digits[start..];
    let mut bytes = [0u8; MAX_ENCODED_FRAME];
    bytes[0] = FRAME_START;
    bytes[1..=payload.len()].copy_from_slice(payload);
    bytes[payload.len() + 1] = FRAME_END;
    EncodedFrame {
        bytes,
        len: payload.len() + 2,
    }
}

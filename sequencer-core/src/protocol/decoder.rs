//! Byte-at-a-time frame decoder.

use heapless::Vec;
use winnow::ascii::{digit0, multispace0};
use winnow::combinator::{opt, preceded};
use winnow::prelude::*;
use winnow::token::one_of;

use super::{FRAME_END, FRAME_START, MAX_FRAME_PAYLOAD};
use crate::io::ByteLink;

/// Command code produced for every frame terminator.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DecodedCommand {
    pub code: u16,
    /// Payload was empty, had no leading digits, or carried trailing garbage.
    pub malformed: bool,
    /// Payload bytes were dropped because the buffer was full.
    pub truncated: bool,
}

impl DecodedCommand {
    /// A cleanly decoded command.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self {
            code,
            malformed: false,
            truncated: false,
        }
    }
}

/// Accumulates payload bytes until a frame terminator arrives.
#[derive(Clone, Debug, Default)]
pub struct CommandDecoder {
    buffer: Vec<u8, MAX_FRAME_PAYLOAD>,
    truncated: bool,
}

impl CommandDecoder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            truncated: false,
        }
    }

    /// Number of payload bytes buffered for the current frame.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Discards any partially received frame.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.truncated = false;
    }

    /// Feeds one received byte; returns a command when `byte` closes a frame.
    pub fn push(&mut self, byte: u8) -> Option<DecodedCommand> {
        match byte {
            FRAME_START => {
                self.reset();
                None
            }
            FRAME_END => {
                let (code, well_formed) = parse_payload(&self.buffer);
                let command = DecodedCommand {
                    code,
                    malformed: !well_formed,
                    truncated: self.truncated,
                };
                self.reset();
                Some(command)
            }
            other => {
                if self.buffer.push(other).is_err() {
                    self.truncated = true;
                }
                None
            }
        }
    }

    /// Reads from `link` until one command is decoded or no input remains.
    ///
    /// Bytes after the first complete frame stay in the link for the next call.
    pub fn poll<L>(&mut self, link: &mut L) -> Option<DecodedCommand>
    where
        L: ByteLink,
    {
        while link.available() {
            let byte = link.read_byte()?;
            if let Some(command) = self.push(byte) {
                return Some(command);
            }
        }
        None
    }
}

fn numeric_prefix<'i>(input: &mut &'i [u8]) -> Result<&'i [u8], ()> {
    preceded((multispace0, opt(one_of(b'+'))), digit0).parse_next(input)
}

fn parse_payload(payload: &[u8]) -> (u16, bool) {
    let mut input = payload;
    let digits = numeric_prefix(&mut input).unwrap_or_default();
    let code = digits.iter().fold(0u16, |acc, digit| {
        acc.saturating_mul(10)
            .saturating_add(u16::from(digit - b'0'))
    });
    (code, !digits.is_empty() && input.is_empty())
}

/// Parses a frame payload as an unsigned decimal code.
///
/// Leading whitespace and a `+` sign are skipped, parsing stops at the first
/// non-digit, and a payload without digits yields 0.
#[must_use]
pub fn parse_code(payload: &[u8]) -> u16 {
    parse_payload(payload).0
}

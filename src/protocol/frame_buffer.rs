//! Incremental frame parser over a bounded receive window.
//!
//! Bytes arrive in arbitrary chunks from the transport. Each push appends the
//! chunk, trims the buffer to the most recent `max_message_length` bytes and
//! then extracts every complete `@a,c,r,d,s\r` frame it can find, earliest
//! first. Anything before an extracted frame is discarded with it.
//!
//! The window is trimmed before extraction, so a frame must close within one
//! window's worth of bytes counted back from the end of the latest chunk.
//! A long burst of noise can push the start of an unfinished frame out of the
//! window; that frame is then lost.
//!
//! # Example
//!
//! ```
//! use rmf_master::protocol::{FrameParser, ParseEvent};
//!
//! let mut parser = FrameParser::new();
//!
//! assert!(parser.push(b"@5,131,1").is_empty());
//! let events = parser.push(b"0,0,146\r");
//!
//! assert_eq!(events.len(), 1);
//! assert!(matches!(events[0], ParseEvent::Message(m) if m.register == 10));
//! ```

use bytes::{Buf, BytesMut};

use super::frame::{FrameError, Message, ParseEvent};
use super::wire_format::{
    checksum, FIELD_COUNT, FIELD_SEPARATOR, FRAME_END, FRAME_START, MAX_MESSAGE_LENGTH,
};
use crate::error::Field;

/// Stateful decoder owning the receive window.
#[derive(Debug)]
pub struct FrameParser {
    /// Most recent bytes that have not been consumed by a frame.
    buffer: BytesMut,
    /// Window size in bytes.
    max_message_length: usize,
}

impl FrameParser {
    /// Create a parser with the default 200 byte window.
    pub fn new() -> Self {
        Self::with_max_length(MAX_MESSAGE_LENGTH)
    }

    /// Create a parser with a custom window size.
    pub fn with_max_length(max_message_length: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(max_message_length * 2),
            max_message_length,
        }
    }

    /// Push a chunk and extract every complete frame.
    ///
    /// Returns one event per frame in the order the frames close. Frames with
    /// a bad checksum yield [`ParseEvent::Error`] and never a message.
    pub fn push(&mut self, data: &[u8]) -> Vec<ParseEvent> {
        self.buffer.extend_from_slice(data);

        if self.buffer.len() > self.max_message_length {
            let excess = self.buffer.len() - self.max_message_length;
            self.buffer.advance(excess);
        }

        let mut events = Vec::new();
        while let Some(event) = self.try_extract_one() {
            events.push(event);
        }
        events
    }

    fn try_extract_one(&mut self) -> Option<ParseEvent> {
        let (end, fields) = find_frame(&self.buffer)?;
        self.buffer.advance(end);
        Some(decode(fields))
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Window size in bytes.
    pub fn max_message_length(&self) -> usize {
        self.max_message_length
    }

    /// Drop everything buffered so far.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Locate the earliest complete frame.
///
/// Returns the offset just past its terminator together with the five raw
/// field values.
fn find_frame(buf: &[u8]) -> Option<(usize, [u64; FIELD_COUNT])> {
    let mut from = 0;
    while let Some(offset) = buf[from..].iter().position(|&b| b == FRAME_START) {
        let start = from + offset;
        if let Some((len, fields)) = match_frame(&buf[start..]) {
            return Some((start + len, fields));
        }
        from = start + 1;
    }
    None
}

/// Match a frame anchored at `buf[0] == b'@'`.
fn match_frame(buf: &[u8]) -> Option<(usize, [u64; FIELD_COUNT])> {
    let mut fields = [0u64; FIELD_COUNT];
    let mut pos = 1;

    for (i, field) in fields.iter_mut().enumerate() {
        let digits = buf
            .get(pos..)?
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if digits == 0 {
            return None;
        }
        *field = parse_decimal(&buf[pos..pos + digits]);
        pos += digits;

        let terminator = if i + 1 == FIELD_COUNT {
            FRAME_END
        } else {
            FIELD_SEPARATOR
        };
        if buf.get(pos) != Some(&terminator) {
            return None;
        }
        pos += 1;
    }

    Some((pos, fields))
}

/// Parse ASCII digits, saturating at `u64::MAX`.
fn parse_decimal(digits: &[u8]) -> u64 {
    digits.iter().fold(0u64, |acc, &d| {
        acc.saturating_mul(10).saturating_add((d - b'0') as u64)
    })
}

fn decode(fields: [u64; FIELD_COUNT]) -> ParseEvent {
    let [device_address, command, register, data, received] = fields;

    let expected = checksum(device_address, command, register, data);
    if received != expected as u64 {
        return ParseEvent::Error(FrameError::Checksum { expected, received });
    }

    let widths = [
        (Field::DeviceAddress, device_address, u8::MAX as u64),
        (Field::Command, command, u8::MAX as u64),
        (Field::Register, register, u16::MAX as u64),
        (Field::Data, data, u16::MAX as u64),
    ];
    for (field, value, max) in widths {
        if value > max {
            return ParseEvent::Error(FrameError::FieldOverflow { field, value });
        }
    }

    ParseEvent::Message(Message::new(
        device_address as u8,
        command as u8,
        register as u16,
        data as u16,
    ))
}

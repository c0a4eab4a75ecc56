//! Decoded messages and the events the parser produces.
//!
//! # Example
//!
//! ```
//! use rmf_master::protocol::Message;
//!
//! let msg = Message::new(5, 131, 10, 0);
//! assert!(msg.is_response());
//! assert_eq!(msg.to_string(), "@5,131,10,0,146\r");
//! ```

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::wire_format::{checksum, RESPONSE_FLAG};
use crate::error::{Field, Result, RmfError};

/// A checksum-validated frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    pub device_address: u8,
    pub command: u8,
    pub register: u16,
    pub data: u16,
}

impl Message {
    pub fn new(device_address: u8, command: u8, register: u16, data: u16) -> Self {
        Self {
            device_address,
            command,
            register,
            data,
        }
    }

    /// Checksum a sender would attach to this message.
    pub fn checksum(&self) -> u16 {
        checksum(
            self.device_address as u64,
            self.command as u64,
            self.register as u64,
            self.data as u64,
        )
    }

    /// Check if the command carries the response flag.
    #[inline]
    pub fn is_response(&self) -> bool {
        self.command & RESPONSE_FLAG != 0
    }

    /// Encode as a wire frame.
    pub fn to_wire(&self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@{},{},{},{},{}\r",
            self.device_address,
            self.command,
            self.register,
            self.data,
            self.checksum()
        )
    }
}

/// Frame-level failure detected while parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("RX checksum failure: expected {expected}, frame carried {received}")]
    Checksum { expected: u16, received: u64 },

    #[error("RX frame field {field} value {value} does not fit")]
    FieldOverflow { field: Field, value: u64 },
}

/// Output of [`FrameParser::push`](super::FrameParser::push), in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    Message(Message),
    Error(FrameError),
}

impl ParseEvent {
    /// The message, if this event carries one.
    pub fn message(&self) -> Option<&Message> {
        match self {
            ParseEvent::Message(msg) => Some(msg),
            ParseEvent::Error(_) => None,
        }
    }

    /// The error, if this event carries one.
    pub fn error(&self) -> Option<&FrameError> {
        match self {
            ParseEvent::Message(_) => None,
            ParseEvent::Error(err) => Some(err),
        }
    }
}

/// Fields a response must echo back to satisfy the in-flight request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expectation {
    device_address: u8,
    command: u8,
    register: u16,
}

impl Expectation {
    pub fn new(device_address: u8, command: u8, register: u16) -> Self {
        Self {
            device_address,
            command,
            register,
        }
    }

    #[inline]
    pub fn device_address(&self) -> u8 {
        self.device_address
    }

    #[inline]
    pub fn command(&self) -> u8 {
        self.command
    }

    #[inline]
    pub fn register(&self) -> u16 {
        self.register
    }

    /// Compare a response against this expectation.
    ///
    /// Fields are checked in wire order; the first difference is reported.
    pub fn check(&self, msg: &Message) -> Result<()> {
        let pairs = [
            (Field::DeviceAddress, self.device_address as u32, msg.device_address as u32),
            (Field::Command, self.command as u32, msg.command as u32),
            (Field::Register, self.register as u32, msg.register as u32),
        ];

        for (field, expected, actual) in pairs {
            if expected != actual {
                return Err(RmfError::Mismatch {
                    field,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }
}

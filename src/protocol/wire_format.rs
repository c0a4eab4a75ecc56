//! Wire format constants and command encoding.
//!
//! Every RMF frame is a line of decimal ASCII fields:
//! ```text
//! @<device address>,<command>,<register>,<value>,<checksum>\r
//! ```
//!
//! The checksum is the sum of the four preceding fields, truncated to 16 bits.
//! Responses echo the request command with the top bit set.

use std::fmt;

use bytes::Bytes;

use super::frame::Expectation;
use crate::error::{Parameter, Result, RmfError};

/// Default receive window in bytes.
pub const MAX_MESSAGE_LENGTH: usize = 200;

/// Shortest possible frame: `@0,0,0,0,0\r`.
pub const MIN_FRAME_LENGTH: usize = 11;

/// Frame start marker.
pub const FRAME_START: u8 = b'@';

/// Frame terminator.
pub const FRAME_END: u8 = b'\r';

/// Separator between numeric fields.
pub const FIELD_SEPARATOR: u8 = b',';

/// Number of numeric fields in a frame, checksum included.
pub const FIELD_COUNT: usize = 5;

/// Bit set on the command code of every response.
pub const RESPONSE_FLAG: u8 = 0x80;

/// Highest addressable device.
pub const MAX_DEVICE_ADDRESS: u32 = 63;

/// Highest register number.
pub const MAX_REGISTER: u32 = 0xFFFF;

/// Highest register value.
pub const MAX_REGISTER_VALUE: u32 = 0xFFFF;

/// Operations a master can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandCode {
    ReadRegister = 2,
    WriteRegister = 3,
}

impl CommandCode {
    /// Code sent in the request frame.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Code the device answers with.
    #[inline]
    pub fn response_code(self) -> u8 {
        self.code() | RESPONSE_FLAG
    }
}

/// 16-bit wraparound sum of the four numeric frame fields.
///
/// # Example
///
/// ```
/// use rmf_master::protocol::checksum;
///
/// assert_eq!(checksum(5, 131, 10, 0), 146);
/// assert_eq!(checksum(63, 3, 0xFFFF, 0xFFFF), 64);
/// ```
#[inline]
pub fn checksum(device_address: u64, command: u64, register: u64, value: u64) -> u16 {
    // Wrapping in u64 keeps the result congruent mod 2^16.
    let sum = device_address
        .wrapping_add(command)
        .wrapping_add(register)
        .wrapping_add(value);
    (sum & 0xFFFF) as u16
}

fn check_range(parameter: Parameter, value: u32, max: u32) -> Result<u32> {
    if value > max {
        return Err(RmfError::Validation {
            parameter,
            value,
            max,
        });
    }
    Ok(value)
}

/// A validated request ready to be written to the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    device_address: u8,
    code: CommandCode,
    register: u16,
    value: u16,
}

impl Command {
    /// Build a read request. The value field is sent as 0.
    pub fn read(device_address: u32, register: u32) -> Result<Self> {
        let device_address =
            check_range(Parameter::DeviceAddress, device_address, MAX_DEVICE_ADDRESS)?;
        let register = check_range(Parameter::Register, register, MAX_REGISTER)?;
        Ok(Self {
            device_address: device_address as u8,
            code: CommandCode::ReadRegister,
            register: register as u16,
            value: 0,
        })
    }

    /// Build a write request.
    pub fn write(device_address: u32, register: u32, value: u32) -> Result<Self> {
        let device_address =
            check_range(Parameter::DeviceAddress, device_address, MAX_DEVICE_ADDRESS)?;
        let register = check_range(Parameter::Register, register, MAX_REGISTER)?;
        let value = check_range(Parameter::Value, value, MAX_REGISTER_VALUE)?;
        Ok(Self {
            device_address: device_address as u8,
            code: CommandCode::WriteRegister,
            register: register as u16,
            value: value as u16,
        })
    }

    #[inline]
    pub fn device_address(&self) -> u8 {
        self.device_address
    }

    #[inline]
    pub fn code(&self) -> CommandCode {
        self.code
    }

    #[inline]
    pub fn register(&self) -> u16 {
        self.register
    }

    #[inline]
    pub fn value(&self) -> u16 {
        self.value
    }

    /// Checksum field for this command.
    pub fn checksum(&self) -> u16 {
        checksum(
            self.device_address as u64,
            self.code.code() as u64,
            self.register as u64,
            self.value as u64,
        )
    }

    /// What a matching response must carry.
    pub fn expectation(&self) -> Expectation {
        Expectation::new(self.device_address, self.code.response_code(), self.register)
    }

    /// Encode to wire bytes.
    pub fn to_wire(&self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@{},{},{},{},{}\r",
            self.device_address,
            self.code.code(),
            self.register,
            self.value,
            self.checksum()
        )
    }
}

/// Validate and encode a write request.
///
/// # Example
///
/// ```
/// use rmf_master::protocol::encode_write;
///
/// assert_eq!(encode_write(5, 10, 1).unwrap(), "@5,3,10,1,19\r");
/// assert!(encode_write(64, 10, 1).is_err());
/// ```
pub fn encode_write(device_address: u32, register: u32, value: u32) -> Result<String> {
    Ok(Command::write(device_address, register, value)?.to_string())
}

/// Validate and encode a read request.
pub fn encode_read(device_address: u32, register: u32) -> Result<String> {
    Ok(Command::read(device_address, register)?.to_string())
}

//! Protocol module - wire format, command encoding and frame parsing.
//!
//! This module implements the ASCII RMF framing:
//! - `@a,c,r,v,s\r` command encoding with 16-bit checksum
//! - Incremental parser for accumulating partial reads
//! - Decoded message and parse event types

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{Expectation, FrameError, Message, ParseEvent};
pub use frame_buffer::FrameParser;
pub use wire_format::{
    checksum, encode_read, encode_write, Command, CommandCode, FIELD_COUNT, FIELD_SEPARATOR,
    FRAME_END, FRAME_START, MAX_DEVICE_ADDRESS, MAX_MESSAGE_LENGTH, MAX_REGISTER,
    MAX_REGISTER_VALUE, MIN_FRAME_LENGTH, RESPONSE_FLAG,
};

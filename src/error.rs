//! Error types for rmf-master.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::protocol::FrameError;

/// Caller-supplied parameter checked by the command encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    DeviceAddress,
    Register,
    Value,
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Parameter::DeviceAddress => "device address",
            Parameter::Register => "register number",
            Parameter::Value => "register value",
        })
    }
}

/// Message field compared against the in-flight request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    DeviceAddress,
    Command,
    Register,
    Data,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::DeviceAddress => "device address",
            Field::Command => "command",
            Field::Register => "register",
            Field::Data => "data",
        })
    }
}

/// Main error type for all RMF operations.
#[derive(Debug, Error)]
pub enum RmfError {
    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parameter outside its valid range. Raised before anything is sent.
    #[error("{parameter} {value} is out of range 0 to {max}")]
    Validation {
        parameter: Parameter,
        value: u32,
        max: u32,
    },

    /// Received frame failed checksum verification.
    #[error("RX checksum failure: expected {expected}, frame carried {received}")]
    Checksum { expected: u16, received: u64 },

    /// Received frame had a field too wide for its message slot.
    #[error("RX frame field {field} value {value} does not fit")]
    FieldOverflow { field: Field, value: u64 },

    /// Response did not match the request that is waiting for it.
    #[error("expected response with {field} {expected}, but response has {field} {actual}")]
    Mismatch {
        field: Field,
        expected: u32,
        actual: u32,
    },

    /// No response arrived within the configured window.
    #[error("no response within {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Another request is still waiting for its response.
    #[error("a request is already in flight")]
    RequestInFlight,

    /// Transport closed; no further responses can arrive.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Rejected configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<FrameError> for RmfError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Checksum { expected, received } => RmfError::Checksum { expected, received },
            FrameError::FieldOverflow { field, value } => RmfError::FieldOverflow { field, value },
        }
    }
}

/// Result type alias using RmfError.
pub type Result<T> = std::result::Result<T, RmfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_names_parameter_and_range() {
        let err = RmfError::Validation {
            parameter: Parameter::DeviceAddress,
            value: 64,
            max: 63,
        };
        assert_eq!(err.to_string(), "device address 64 is out of range 0 to 63");
    }

    #[test]
    fn test_mismatch_message_names_expected_and_actual() {
        let err = RmfError::Mismatch {
            field: Field::DeviceAddress,
            expected: 5,
            actual: 6,
        };
        assert_eq!(
            err.to_string(),
            "expected response with device address 5, but response has device address 6"
        );
    }

    #[test]
    fn test_frame_error_conversion() {
        let err: RmfError = FrameError::Checksum {
            expected: 146,
            received: 147,
        }
        .into();
        assert!(matches!(
            err,
            RmfError::Checksum {
                expected: 146,
                received: 147
            }
        ));
    }

    #[test]
    fn test_timeout_message() {
        let err = RmfError::Timeout(Duration::from_millis(200));
        assert_eq!(err.to_string(), "no response within 200ms");
    }
}

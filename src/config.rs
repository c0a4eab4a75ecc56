//! Tunables for the protocol engine.
//!
//! Only timing and buffering are configurable; nothing here changes the wire
//! format. Loading the values is left to the embedding application, which
//! can deserialize a [`MasterConfig`] from any serde format.
//!
//! ```
//! use rmf_master::MasterConfig;
//!
//! let config = MasterConfig::default();
//! assert_eq!(config.response_timeout_ms, 200);
//! assert_eq!(config.max_message_length, 200);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RmfError};
use crate::protocol::{MAX_MESSAGE_LENGTH, MIN_FRAME_LENGTH};

/// Default response timeout.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(200);

/// Default capacity of the observer broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    /// How long a request waits for its response.
    pub response_timeout_ms: u64,
    /// Receive window in bytes.
    pub max_message_length: usize,
    /// Events buffered per observer before the slowest one starts lagging.
    pub event_capacity: usize,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT.as_millis() as u64,
            max_message_length: MAX_MESSAGE_LENGTH,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl MasterConfig {
    #[inline]
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.response_timeout_ms == 0 {
            return Err(RmfError::InvalidConfig(
                "response_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_message_length < MIN_FRAME_LENGTH {
            return Err(RmfError::InvalidConfig(format!(
                "max_message_length {} is shorter than the smallest frame ({} bytes)",
                self.max_message_length, MIN_FRAME_LENGTH
            )));
        }
        if self.event_capacity == 0 {
            return Err(RmfError::InvalidConfig(
                "event_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MasterConfig::default();
        assert_eq!(config.response_timeout(), Duration::from_millis(200));
        assert_eq!(config.max_message_length, 200);
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: MasterConfig = serde_json::from_str(r#"{"response_timeout_ms": 50}"#).unwrap();
        assert_eq!(config.response_timeout(), Duration::from_millis(50));
        assert_eq!(config.max_message_length, MAX_MESSAGE_LENGTH);
    }

    #[test]
    fn test_rejects_tiny_window() {
        let config = MasterConfig {
            max_message_length: 10,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("smallest frame"));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let config = MasterConfig {
            response_timeout_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RmfError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_zero_event_capacity() {
        let config = MasterConfig {
            event_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

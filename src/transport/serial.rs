//! Serial port transport.
//!
//! # Example
//!
//! ```ignore
//! use rmf_master::transport::SerialConfig;
//!
//! let port = SerialConfig::new("/dev/ttyUSB0").baud_rate(19200).open()?;
//! ```

use serde::{Deserialize, Serialize};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use crate::error::Result;

/// Default line speed.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

/// Serial line settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub path: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

impl SerialConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }

    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Open the port described by this config.
    pub fn open(&self) -> Result<SerialStream> {
        open_serial(&self.path, self.baud_rate)
    }
}

/// Open a serial port for use as a transport.
///
/// Must be called from within a tokio runtime.
pub fn open_serial(path: &str, baud_rate: u32) -> Result<SerialStream> {
    let port = tokio_serial::new(path, baud_rate)
        .open_native_async()
        .map_err(std::io::Error::from)?;
    tracing::debug!(path, baud_rate, "serial port opened");
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_baud_rate() {
        let config: SerialConfig = serde_json::from_str(r#"{"path": "/dev/ttyUSB0"}"#).unwrap();
        assert_eq!(config, SerialConfig::new("/dev/ttyUSB0"));
        assert_eq!(config.baud_rate, 9600);
    }

    #[test]
    fn test_open_missing_port_fails() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let _guard = rt.enter();
        assert!(open_serial("/dev/rmf-master-does-not-exist", 9600).is_err());
    }
}

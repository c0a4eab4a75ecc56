//! Transport module - the byte pipe between master and devices.
//!
//! The engine only needs something it can read received bytes from and
//! write encoded commands to. Any `AsyncRead + AsyncWrite` stream qualifies:
//! - Serial ports (with the `serial` feature)
//! - TCP bridges to RS-485 gateways
//! - `tokio::io::duplex` for tests and simulators

#[cfg(feature = "serial")]
mod serial;

#[cfg(feature = "serial")]
pub use serial::{open_serial, SerialConfig, DEFAULT_BAUD_RATE};

use tokio::io::{AsyncRead, AsyncWrite};

/// A bidirectional byte stream the master can be attached to.
///
/// Implemented for every type meeting the bounds.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

//! # rmf-master
//!
//! Master-side protocol engine for the RMF serial register-access protocol.
//!
//! A master addresses one of up to 64 devices with read or write commands;
//! each device answers with a single `@...\r` frame. This crate encodes the
//! commands, parses the response stream incrementally, verifies checksums and
//! pairs each response with the request that caused it.
//!
//! ## Architecture
//!
//! - **protocol**: command encoding and the incremental [`protocol::FrameParser`]
//! - **coordinator**: one-request-at-a-time correlation with timeout
//! - **client**: the [`RmfMaster`] facade over an injected [`transport::Transport`]
//!
//! ## Example
//!
//! ```ignore
//! use rmf_master::RmfMaster;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let port = rmf_master::transport::open_serial("/dev/ttyUSB0", 9600)?;
//!     let master = RmfMaster::new(port)?;
//!
//!     master.write_register(5, 10, 1).await?;
//!     println!("{}", master.read_register(5, 10).await?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod transport;

mod client;
mod coordinator;
mod writer;

pub use client::{MasterBuilder, RmfMaster};
pub use config::MasterConfig;
pub use error::{Field, Parameter, Result, RmfError};
pub use protocol::{Message, ParseEvent};

//! Master builder and runtime loop.
//!
//! The [`MasterBuilder`] collects configuration and attaches the engine to a
//! transport. The resulting [`RmfMaster`] owns two background tasks:
//! 1. A writer task holding the transport's write half
//! 2. A read loop feeding received bytes into the frame parser
//!
//! Every decoded message and frame error is broadcast to observers; the one
//! that arrives first after a command is sent also settles that request.
//!
//! # Example
//!
//! ```ignore
//! use rmf_master::RmfMaster;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let port = rmf_master::transport::open_serial("/dev/ttyUSB0", 9600)?;
//!     let master = RmfMaster::builder()
//!         .response_timeout(Duration::from_millis(100))
//!         .connect(port)?;
//!
//!     master.write_register(5, 10, 1).await?;
//!     let value = master.read_register(5, 10).await?;
//!     println!("register 10 = {}", value);
//!
//!     master.close().await?;
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::MasterConfig;
use crate::coordinator::{lock, Dispatcher, RequestCoordinator};
use crate::error::{Field, Result, RmfError};
use crate::protocol::{Command, ParseEvent};
use crate::transport::Transport;
use crate::writer::{spawn_writer_task, DEFAULT_CHANNEL_CAPACITY};

/// Bytes requested from the transport per read.
const READ_CHUNK_SIZE: usize = 256;

/// Builder for configuring and connecting an RMF master.
#[derive(Debug, Clone, Default)]
pub struct MasterBuilder {
    config: MasterConfig,
}

impl MasterBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: MasterConfig) -> Self {
        Self { config }
    }

    /// Set how long a request waits for its response.
    ///
    /// Rounded up to whole milliseconds. Default: 200 ms
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        let millis = timeout.as_nanos().div_ceil(1_000_000);
        self.config.response_timeout_ms = u64::try_from(millis).unwrap_or(u64::MAX);
        self
    }

    /// Set the receive window size in bytes.
    ///
    /// Default: 200
    pub fn max_message_length(mut self, len: usize) -> Self {
        self.config.max_message_length = len;
        self
    }

    /// Set the observer channel capacity.
    ///
    /// Default: 64
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Validate the configuration and attach to `transport`.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect<T: Transport>(self, transport: T) -> Result<RmfMaster> {
        self.config.validate()?;
        Ok(RmfMaster::start(transport, self.config))
    }
}

/// Aborts the read loop when the master goes away.
struct ReadTask(JoinHandle<()>);

impl Drop for ReadTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A connected RMF master.
///
/// Requests are strictly one at a time: a call made while another is still
/// waiting fails with [`RmfError::RequestInFlight`].
pub struct RmfMaster {
    coordinator: RequestCoordinator,
    events: broadcast::Sender<ParseEvent>,
    config: MasterConfig,
    read_task: ReadTask,
    writer_task: JoinHandle<Result<()>>,
}

impl RmfMaster {
    /// Create a new master builder.
    pub fn builder() -> MasterBuilder {
        MasterBuilder::new()
    }

    /// Attach to `transport` with default settings.
    pub fn new<T: Transport>(transport: T) -> Result<Self> {
        MasterBuilder::new().connect(transport)
    }

    fn start<T: Transport>(transport: T, config: MasterConfig) -> Self {
        let (reader, write_half) = tokio::io::split(transport);

        let (writer, writer_task) = spawn_writer_task(write_half, DEFAULT_CHANNEL_CAPACITY);
        let dispatcher = Arc::new(Mutex::new(Dispatcher::new(config.max_message_length)));
        let (events, _) = broadcast::channel(config.event_capacity);

        let read_task = tokio::spawn({
            let dispatcher = dispatcher.clone();
            let events = events.clone();
            async move {
                if let Err(e) = read_loop(reader, &dispatcher, &events).await {
                    tracing::error!("Read loop error: {}", e);
                }
                lock(&dispatcher).close();
            }
        });

        RmfMaster {
            coordinator: RequestCoordinator::new(dispatcher, writer),
            events,
            config,
            read_task: ReadTask(read_task),
            writer_task,
        }
    }

    /// Write `value` to `register` on device `device_address`.
    ///
    /// The device must acknowledge with data 0; anything else is reported as
    /// a [`RmfError::Mismatch`] on the data field.
    pub async fn write_register(&self, device_address: u32, register: u32, value: u32) -> Result<()> {
        let command = Command::write(device_address, register, value)?;
        let response = self
            .coordinator
            .execute(
                command.to_wire(),
                command.expectation(),
                self.config.response_timeout(),
            )
            .await?;

        if response.data != 0 {
            return Err(RmfError::Mismatch {
                field: Field::Data,
                expected: 0,
                actual: response.data as u32,
            });
        }
        Ok(())
    }

    /// Read `register` from device `device_address`.
    pub async fn read_register(&self, device_address: u32, register: u32) -> Result<u16> {
        let command = Command::read(device_address, register)?;
        let response = self
            .coordinator
            .execute(
                command.to_wire(),
                command.expectation(),
                self.config.response_timeout(),
            )
            .await?;
        Ok(response.data)
    }

    /// Observe every decoded message and frame error, solicited or not.
    pub fn subscribe(&self) -> broadcast::Receiver<ParseEvent> {
        self.events.subscribe()
    }

    /// Check if a request is currently waiting for its response.
    pub fn is_pending(&self) -> bool {
        self.coordinator.is_pending()
    }

    /// Configuration the master was started with.
    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    /// Check if both directions of the transport are still usable.
    pub fn is_connected(&self) -> bool {
        !lock(self.coordinator.dispatcher()).is_closed() && !self.coordinator.writer().is_closed()
    }

    /// Stop the read loop, flush and shut down the write side.
    pub async fn close(self) -> Result<()> {
        let RmfMaster {
            coordinator,
            read_task,
            writer_task,
            ..
        } = self;

        lock(coordinator.dispatcher()).close();
        drop(read_task);
        drop(coordinator);

        match writer_task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(RmfError::Io(std::io::Error::other(e))),
        }
    }
}

/// Main read loop - pushes received bytes through the parser and fans the
/// resulting events out to observers.
async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    dispatcher: &Mutex<Dispatcher>,
    events: &broadcast::Sender<ParseEvent>,
) -> Result<()> {
    let mut buf = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => return Ok(()), // Transport closed
            Ok(n) => n,
            Err(e) => return Err(RmfError::Io(e)),
        };

        let parsed = lock(dispatcher).feed(&buf[..n]);

        for event in parsed {
            match &event {
                ParseEvent::Message(msg) => tracing::debug!(
                    device_address = msg.device_address,
                    command = msg.command,
                    register = msg.register,
                    data = msg.data,
                    "received message"
                ),
                ParseEvent::Error(err) => tracing::warn!("{}", err),
            }
            // No observers is fine.
            let _ = events.send(event);
        }
    }
}

//! Dedicated writer task for outbound commands.
//!
//! The write half of the transport is owned by a single task that receives
//! encoded commands over an mpsc channel, so callers never hold the
//! transport across an await. Each command carries a one-shot reply that
//! the task answers once the bytes are written and flushed.
//!
//! ```text
//! RequestCoordinator ─► mpsc::Sender<WriteRequest> ─► Writer Task ─► Transport
//!         ▲                                                │
//!         └────────────── oneshot io::Result<()> ──────────┘
//! ```

use std::io;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Result, RmfError};

/// Default channel capacity.
///
/// Only one request is in flight at a time, so a small queue is plenty.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 8;

/// One command plus the channel its write outcome is reported on.
struct WriteRequest {
    bytes: Bytes,
    done: oneshot::Sender<io::Result<()>>,
}

/// Handle for sending encoded commands to the writer task.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<WriteRequest>,
}

impl WriterHandle {
    /// Write bytes to the transport and wait until they are flushed.
    ///
    /// Fails with `Io` if the transport rejects the write, and with
    /// `ConnectionClosed` once the writer task has stopped.
    pub async fn send(&self, bytes: Bytes) -> Result<()> {
        let (done, written) = oneshot::channel();
        self.tx
            .send(WriteRequest { bytes, done })
            .await
            .map_err(|_| RmfError::ConnectionClosed)?;

        match written.await {
            Ok(result) => result.map_err(RmfError::Io),
            // Task stopped before reaching this command.
            Err(_) => Err(RmfError::ConnectionClosed),
        }
    }

    /// Check if the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending commands.
pub fn spawn_writer_task<W>(writer: W, capacity: usize) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity);
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

/// Main writer loop - writes and flushes each command in order.
///
/// The first write error is reported to the waiting caller and stops the task.
async fn writer_loop<W>(mut rx: mpsc::Receiver<WriteRequest>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(WriteRequest { bytes, done }) = rx.recv().await {
        match write_flushed(&mut writer, &bytes).await {
            Ok(()) => {
                tracing::trace!(len = bytes.len(), "command written");
                // Caller may have given up already.
                let _ = done.send(Ok(()));
            }
            Err(e) => {
                tracing::error!("Writer error: {}", e);
                let _ = done.send(Err(io::Error::new(e.kind(), e.to_string())));
                return Err(RmfError::Io(e));
            }
        }
    }

    // Channel closed, clean shutdown
    writer.shutdown().await?;
    Ok(())
}

async fn write_flushed<W>(writer: &mut W, bytes: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await?;
    writer.flush().await
}

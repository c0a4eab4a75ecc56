//! Request/response correlation.
//!
//! The [`Dispatcher`] owns the frame parser and the single pending-request
//! slot. The read loop feeds it raw bytes; the first event produced while a
//! request is armed resolves that request's one-shot channel.
//!
//! [`RequestCoordinator::execute`] runs one request through
//! `Idle → Sent → {Matched | Mismatched | ChecksumFailed | TimedOut} → Done`.
//! The subscription is held by a [`PendingGuard`]; dropping it disarms the
//! slot, so every exit path, including a caller dropping the future, leaves
//! no pending state behind.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::error::{Result, RmfError};
use crate::protocol::{Expectation, FrameParser, Message, ParseEvent};
use crate::writer::WriterHandle;

/// Subscription slot for the request currently in flight.
#[derive(Debug)]
struct PendingSlot {
    id: u64,
    /// Taken when the first event arrives.
    tx: Option<oneshot::Sender<ParseEvent>>,
}

/// Parser plus pending-request slot, shared between the read loop and the
/// coordinator.
#[derive(Debug)]
pub(crate) struct Dispatcher {
    parser: FrameParser,
    pending: Option<PendingSlot>,
    next_id: u64,
    closed: bool,
}

impl Dispatcher {
    pub(crate) fn new(max_message_length: usize) -> Self {
        Self {
            parser: FrameParser::with_max_length(max_message_length),
            pending: None,
            next_id: 0,
            closed: false,
        }
    }

    /// Parse a chunk and hand the first resulting event to the armed request.
    ///
    /// All events are returned so they can be passed on to observers.
    pub(crate) fn feed(&mut self, data: &[u8]) -> Vec<ParseEvent> {
        let events = self.parser.push(data);

        if let Some(first) = events.first() {
            if let Some(tx) = self.pending.as_mut().and_then(|slot| slot.tx.take()) {
                // Receiver gone means the caller already gave up.
                let _ = tx.send(first.clone());
            }
        }

        events
    }

    /// Clear the receive window and arm a fresh one-shot subscription.
    fn arm(&mut self) -> Result<(u64, oneshot::Receiver<ParseEvent>)> {
        if self.closed {
            return Err(RmfError::ConnectionClosed);
        }
        if self.pending.is_some() {
            return Err(RmfError::RequestInFlight);
        }

        self.parser.clear();

        let (tx, rx) = oneshot::channel();
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.pending = Some(PendingSlot { id, tx: Some(tx) });

        Ok((id, rx))
    }

    fn disarm(&mut self, id: u64) {
        if self.pending.as_ref().is_some_and(|slot| slot.id == id) {
            self.pending = None;
        }
    }

    /// Mark the transport as gone. A waiting request sees its channel close.
    pub(crate) fn close(&mut self) {
        self.closed = true;
        self.pending = None;
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    #[cfg(test)]
    fn buffered(&self) -> usize {
        self.parser.len()
    }
}

/// Lock the dispatcher. Its state stays consistent across a panic in
/// another holder, so poisoning is ignored.
pub(crate) fn lock(dispatcher: &Mutex<Dispatcher>) -> MutexGuard<'_, Dispatcher> {
    dispatcher.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keeps a request armed for as long as it lives.
struct PendingGuard {
    dispatcher: Arc<Mutex<Dispatcher>>,
    id: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        lock(&self.dispatcher).disarm(self.id);
    }
}

/// Sends one command at a time and waits for the response that belongs to it.
pub struct RequestCoordinator {
    dispatcher: Arc<Mutex<Dispatcher>>,
    writer: WriterHandle,
}

impl RequestCoordinator {
    pub(crate) fn new(dispatcher: Arc<Mutex<Dispatcher>>, writer: WriterHandle) -> Self {
        Self { dispatcher, writer }
    }

    /// Transmit `command` and wait up to `timeout` for a matching response.
    ///
    /// # Errors
    ///
    /// - `RequestInFlight` if another call is still waiting
    /// - `Io` if the transport rejects the write; no timeout is waited out
    /// - `Mismatch` if the response does not match `expect`
    /// - `Checksum` / `FieldOverflow` if a corrupted frame arrives first
    /// - `Timeout` if nothing arrives in time
    /// - `ConnectionClosed` if the transport goes away
    pub async fn execute(
        &self,
        command: Bytes,
        expect: Expectation,
        timeout: Duration,
    ) -> Result<Message> {
        let (rx, _guard) = self.subscribe()?;

        tracing::debug!(
            device_address = expect.device_address(),
            register = expect.register(),
            "sending {:?}",
            String::from_utf8_lossy(&command)
        );
        // Resolves once the bytes are flushed; the response window starts then.
        self.writer.send(command).await?;

        let event = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(event)) => event,
            Ok(Err(_)) => return Err(RmfError::ConnectionClosed),
            Err(_) => {
                tracing::debug!(
                    device_address = expect.device_address(),
                    register = expect.register(),
                    "no response within {:?}",
                    timeout
                );
                return Err(RmfError::Timeout(timeout));
            }
        };

        match event {
            ParseEvent::Message(msg) => {
                expect.check(&msg)?;
                Ok(msg)
            }
            ParseEvent::Error(err) => Err(err.into()),
        }
    }

    fn subscribe(&self) -> Result<(oneshot::Receiver<ParseEvent>, PendingGuard)> {
        let (id, rx) = lock(&self.dispatcher).arm()?;
        let guard = PendingGuard {
            dispatcher: self.dispatcher.clone(),
            id,
        };
        Ok((rx, guard))
    }

    /// Check if a request is currently waiting for its response.
    pub fn is_pending(&self) -> bool {
        lock(&self.dispatcher).is_pending()
    }

    pub(crate) fn dispatcher(&self) -> &Arc<Mutex<Dispatcher>> {
        &self.dispatcher
    }

    pub(crate) fn writer(&self) -> &WriterHandle {
        &self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Field;
    use crate::protocol::{Command, FrameError};
    use crate::writer::{spawn_writer_task, DEFAULT_CHANNEL_CAPACITY};
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    const TIMEOUT: Duration = Duration::from_millis(200);

    fn coordinator() -> (RequestCoordinator, DuplexStream) {
        let (client, server) = duplex(256);
        let (writer, _task) = spawn_writer_task(client, DEFAULT_CHANNEL_CAPACITY);
        let dispatcher = Arc::new(Mutex::new(Dispatcher::new(200)));
        (RequestCoordinator::new(dispatcher, writer), server)
    }

    /// Plays the device: waits for the command, then feeds `reply`.
    fn reply_with(
        dispatcher: Arc<Mutex<Dispatcher>>,
        mut server: DuplexStream,
        reply: &'static [u8],
    ) -> tokio::task::JoinHandle<Vec<u8>> {
        tokio::spawn(async move {
            let mut buf = vec![0u8; 64];
            let n = server.read(&mut buf).await.unwrap();
            lock(&dispatcher).feed(reply);
            buf.truncate(n);
            buf
        })
    }

    #[test]
    fn test_arm_rejects_second_request() {
        let mut dispatcher = Dispatcher::new(200);

        let _first = dispatcher.arm().unwrap();
        assert!(matches!(dispatcher.arm(), Err(RmfError::RequestInFlight)));
    }

    #[test]
    fn test_arm_clears_receive_window() {
        let mut dispatcher = Dispatcher::new(200);

        dispatcher.feed(b"@5,131,10,");
        assert_eq!(dispatcher.buffered(), 10);

        let _ = dispatcher.arm().unwrap();
        assert_eq!(dispatcher.buffered(), 0);
    }

    #[test]
    fn test_feed_resolves_with_first_event_only() {
        let mut dispatcher = Dispatcher::new(200);
        let (_, mut rx) = dispatcher.arm().unwrap();

        let events = dispatcher.feed(b"@5,131,10,0,999\r@5,131,10,0,146\r");

        assert_eq!(events.len(), 2);
        let got = rx.try_recv().unwrap();
        assert!(matches!(got, ParseEvent::Error(FrameError::Checksum { .. })));
    }

    #[test]
    fn test_feed_without_pending_request() {
        let mut dispatcher = Dispatcher::new(200);
        let events = dispatcher.feed(b"@5,131,10,0,146\r");
        assert_eq!(events.len(), 1);
        assert!(!dispatcher.is_pending());
    }

    #[test]
    fn test_disarm_ignores_stale_id() {
        let mut dispatcher = Dispatcher::new(200);
        let (first, _rx) = dispatcher.arm().unwrap();
        dispatcher.disarm(first);

        let (_second, _rx2) = dispatcher.arm().unwrap();
        dispatcher.disarm(first);
        assert!(dispatcher.is_pending());
    }

    #[test]
    fn test_close_fails_waiting_request() {
        let mut dispatcher = Dispatcher::new(200);
        let (_, mut rx) = dispatcher.arm().unwrap();

        dispatcher.close();

        assert!(rx.try_recv().is_err());
        assert!(matches!(dispatcher.arm(), Err(RmfError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_execute_matched() {
        let (coordinator, server) = coordinator();
        let device = reply_with(coordinator.dispatcher().clone(), server, b"@5,130,10,42,187\r");

        let cmd = Command::read(5, 10).unwrap();
        let msg = coordinator
            .execute(cmd.to_wire(), cmd.expectation(), TIMEOUT)
            .await
            .unwrap();

        assert_eq!(msg.data, 42);
        assert_eq!(device.await.unwrap(), b"@5,2,10,0,17\r");
        assert!(!coordinator.is_pending());
    }

    #[tokio::test]
    async fn test_execute_mismatched_register() {
        let (coordinator, server) = coordinator();
        let _device = reply_with(coordinator.dispatcher().clone(), server, b"@5,130,11,42,188\r");

        let cmd = Command::read(5, 10).unwrap();
        let err = coordinator
            .execute(cmd.to_wire(), cmd.expectation(), TIMEOUT)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RmfError::Mismatch {
                field: Field::Register,
                expected: 10,
                actual: 11
            }
        ));
        assert!(!coordinator.is_pending());
    }

    #[tokio::test]
    async fn test_execute_checksum_failure() {
        let (coordinator, server) = coordinator();
        let _device = reply_with(coordinator.dispatcher().clone(), server, b"@5,130,10,42,188\r");

        let cmd = Command::read(5, 10).unwrap();
        let err = coordinator
            .execute(cmd.to_wire(), cmd.expectation(), TIMEOUT)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RmfError::Checksum {
                expected: 187,
                received: 188
            }
        ));
        assert!(!coordinator.is_pending());
    }

    #[tokio::test]
    async fn test_execute_timeout_cleans_up() {
        let (coordinator, _server) = coordinator();

        let cmd = Command::read(5, 10).unwrap();
        let err = coordinator
            .execute(cmd.to_wire(), cmd.expectation(), Duration::from_millis(20))
            .await
            .unwrap_err();

        assert!(matches!(err, RmfError::Timeout(d) if d == Duration::from_millis(20)));
        assert!(!coordinator.is_pending());

        // A late response has no recipient but is still parsed.
        let events = lock(coordinator.dispatcher()).feed(b"@5,130,10,42,187\r");
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_future_disarms() {
        let (coordinator, _server) = coordinator();

        let cmd = Command::read(5, 10).unwrap();
        let outer = tokio::time::timeout(
            Duration::from_millis(20),
            coordinator.execute(cmd.to_wire(), cmd.expectation(), Duration::from_secs(10)),
        )
        .await;

        assert!(outer.is_err());
        assert!(!coordinator.is_pending());
    }

    #[tokio::test]
    async fn test_execute_after_close() {
        let (coordinator, _server) = coordinator();
        lock(coordinator.dispatcher()).close();

        let cmd = Command::read(5, 10).unwrap();
        let err = coordinator
            .execute(cmd.to_wire(), cmd.expectation(), TIMEOUT)
            .await
            .unwrap_err();

        assert!(matches!(err, RmfError::ConnectionClosed));
    }
}

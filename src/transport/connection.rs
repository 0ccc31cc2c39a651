//! Pooled connection handle and its I/O tasks.
//!
//! Writes go straight to the stream from the caller's thread, so records
//! reach the sockets in the order they were dispatched across the whole
//! pool. A record the stream cannot take at once is dropped; only the tail
//! of a partially written record is kept and finished by a flush task.
//!
//! Each started connection runs two tokio tasks:
//!
//! - a reader forwarding every inbound chunk to the pool event channel
//! - a flusher finishing partial writes and pending TLS flushes
//!
//! Neither task exists until [`Connection::start`] is called, which the
//! pool manager does after it has admitted the connection. Termination is
//! reported once as [`PoolEvent::Closed`].

// ============================================================================
// Imports
// ============================================================================

use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll, Waker, ready};

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::Error;
use crate::identifiers::SlotId;
use crate::protocol::RequestRecord;

use super::tls::BoxedTransport;

// ============================================================================
// Constants
// ============================================================================

/// Read buffer size per connection.
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Source of unique connection ids.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// PoolEvent
// ============================================================================

/// Lifecycle and data events consumed by the pool manager.
#[derive(Debug)]
pub enum PoolEvent {
    /// Handshake finished; the connection is ready for writes.
    Ready {
        /// Slot the attempt was made for.
        slot: SlotId,
        /// The new connection, not yet started.
        connection: Connection,
    },
    /// Connect or handshake failed.
    Failed {
        /// Slot the attempt was made for.
        slot: SlotId,
        /// Why it failed.
        error: Error,
    },
    /// Bytes arrived on a connection.
    Data {
        /// Slot of the connection.
        slot: SlotId,
        /// Raw chunk as read.
        chunk: Vec<u8>,
    },
    /// The connection ended or broke.
    Closed {
        /// Slot of the connection.
        slot: SlotId,
        /// Connection id, to tell a stale close from a replacement.
        id: u64,
        /// `None` on clean end of stream.
        reason: Option<Error>,
    },
}

// ============================================================================
// Connection
// ============================================================================

/// Write side of the stream.
struct WriteState {
    /// Stream write half.
    half: WriteHalf<BoxedTransport>,
    /// Unwritten tail of a partially accepted record.
    backlog: Vec<u8>,
    /// Bytes written but not yet flushed.
    needs_flush: bool,
}

/// State shared by the handle and its tasks.
struct Shared {
    slot: SlotId,
    id: u64,
    writer: Mutex<WriteState>,
    /// Read half, taken by the reader task on start.
    reader: Mutex<Option<ReadHalf<BoxedTransport>>>,
    /// Wakes the flush task.
    flush: Notify,
    /// Set once the connection is closed or shut down.
    closed: AtomicBool,
    events: mpsc::UnboundedSender<PoolEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Handle to one pooled connection.
///
/// Cloning shares the same stream and tasks.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("slot", &self.shared.slot)
            .field("id", &self.shared.id)
            .finish()
    }
}

impl Connection {
    /// Wraps a connected stream. No task runs and no event is emitted until
    /// [`start`](Self::start).
    pub(crate) fn new(
        slot: SlotId,
        stream: BoxedTransport,
        events: mpsc::UnboundedSender<PoolEvent>,
    ) -> Self {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let (read_half, write_half) = tokio::io::split(stream);

        Self {
            shared: Arc::new(Shared {
                slot,
                id,
                writer: Mutex::new(WriteState {
                    half: write_half,
                    backlog: Vec::new(),
                    needs_flush: false,
                }),
                reader: Mutex::new(Some(read_half)),
                flush: Notify::new(),
                closed: AtomicBool::new(false),
                events,
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Spawns the reader and flush tasks. Later calls do nothing.
    pub(crate) fn start(&self) {
        let Some(read_half) = self.shared.reader.lock().take() else {
            return;
        };

        let reader = tokio::spawn(Self::run_reader(Arc::clone(&self.shared), read_half));
        let flusher = tokio::spawn(Self::run_flusher(Arc::clone(&self.shared)));
        self.shared.tasks.lock().extend([reader, flusher]);
    }

    /// Returns the pool slot.
    #[inline]
    #[must_use]
    pub fn slot(&self) -> SlotId {
        self.shared.slot
    }

    /// Returns the unique connection id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Returns `true` if a write would currently be attempted.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        !self.shared.closed.load(Ordering::Acquire) && self.shared.writer.lock().backlog.is_empty()
    }

    /// Returns `true` if every accepted byte has been written and flushed.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let writer = self.shared.writer.lock();
        writer.backlog.is_empty() && !writer.needs_flush
    }

    /// Writes a record to the stream without waiting.
    ///
    /// Returns `false` and drops the record if the connection is closed or
    /// the stream cannot take it right now. There is no retry.
    pub fn try_send(&self, record: &RequestRecord) -> bool {
        if self.shared.closed.load(Ordering::Acquire) {
            trace!(slot = %self.shared.slot, "Connection closed, write dropped");
            return false;
        }

        let mut cx = Context::from_waker(Waker::noop());
        let mut writer = self.shared.writer.lock();
        if !writer.backlog.is_empty() {
            trace!(slot = %self.shared.slot, "Stream busy, write dropped");
            return false;
        }

        let bytes = record.as_bytes();
        let written = match Pin::new(&mut writer.half).poll_write(&mut cx, bytes) {
            Poll::Ready(Ok(0)) if !bytes.is_empty() => {
                drop(writer);
                self.shared.close(Some(Error::Io(io::ErrorKind::WriteZero.into())));
                return false;
            }
            Poll::Ready(Ok(n)) => n,
            Poll::Ready(Err(e)) => {
                drop(writer);
                debug!(slot = %self.shared.slot, id = self.shared.id, error = %e, "Write failed");
                self.shared.close(Some(Error::Io(e)));
                return false;
            }
            Poll::Pending => {
                trace!(slot = %self.shared.slot, "Stream would block, write dropped");
                return false;
            }
        };

        if written < bytes.len() {
            writer.backlog.extend_from_slice(&bytes[written..]);
        }
        writer.needs_flush = true;
        if writer.backlog.is_empty()
            && let Poll::Ready(Ok(())) = Pin::new(&mut writer.half).poll_flush(&mut cx)
        {
            writer.needs_flush = false;
        }
        let settled = !writer.needs_flush;
        drop(writer);

        if !settled {
            self.shared.flush.notify_one();
        }
        trace!(slot = %self.shared.slot, bytes = bytes.len(), "Record written");
        true
    }

    /// Stops both I/O tasks. The stream is dropped with the last handle.
    pub fn shutdown(&self) {
        self.shared.closed.store(true, Ordering::Release);
        for task in self.shared.tasks.lock().drain(..) {
            task.abort();
        }
    }

    /// Forwards inbound chunks until EOF or error.
    async fn run_reader(shared: Arc<Shared>, mut read_half: ReadHalf<BoxedTransport>) {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        let reason = loop {
            match read_half.read(&mut buf).await {
                Ok(0) => break None,
                Ok(n) => {
                    let chunk = buf[..n].to_vec();
                    if shared.events.send(PoolEvent::Data { slot: shared.slot, chunk }).is_err() {
                        return;
                    }
                }
                Err(e) => break Some(Error::Io(e)),
            }
        };

        debug!(slot = %shared.slot, id = shared.id, "Reader finished");
        shared.close(reason);
    }

    /// Finishes partial writes and flushes whenever woken.
    ///
    /// A write from [`try_send`](Self::try_send) may replace the stream's
    /// registered waker, so a new notification restarts the poll.
    async fn run_flusher(shared: Arc<Shared>) {
        loop {
            shared.flush.notified().await;
            loop {
                tokio::select! {
                    result = poll_fn(|cx| shared.poll_settle(cx)) => match result {
                        Ok(()) => break,
                        Err(e) => {
                            debug!(slot = %shared.slot, id = shared.id, error = %e, "Flush failed");
                            shared.close(Some(Error::Io(e)));
                            return;
                        }
                    },
                    () = shared.flush.notified() => {}
                }
            }
        }
    }
}

impl Shared {
    /// Writes the backlog and flushes the stream.
    fn poll_settle(&self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut writer = self.writer.lock();
        let WriteState {
            half,
            backlog,
            needs_flush,
        } = &mut *writer;

        while !backlog.is_empty() {
            let n = ready!(Pin::new(&mut *half).poll_write(cx, &backlog[..]))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            backlog.drain(..n);
        }
        if *needs_flush {
            ready!(Pin::new(&mut *half).poll_flush(cx))?;
            *needs_flush = false;
        }
        Poll::Ready(Ok(()))
    }

    /// Marks the connection closed and reports it once.
    fn close(&self, reason: Option<Error>) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.events.send(PoolEvent::Closed {
            slot: self.slot,
            id: self.id,
            reason,
        });
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::io::{AsyncWriteExt, duplex};
    use tokio::sync::mpsc::error::TryRecvError;

    use crate::protocol::keep_alive_record;

    fn started(
        slot: usize,
        stream: BoxedTransport,
    ) -> (Connection, mpsc::UnboundedReceiver<PoolEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let conn = Connection::new(SlotId::new(slot), stream, events_tx);
        conn.start();
        (conn, events_rx)
    }

    #[tokio::test]
    async fn test_writes_reach_peer_in_order() {
        let (local, mut peer) = duplex(4096);
        let (conn, _events) = started(0, Box::new(local));

        let first = keep_alive_record("a");
        let second = keep_alive_record("b");
        assert!(conn.try_send(&first));
        assert!(conn.try_send(&second));

        let mut received = vec![0u8; first.len() + second.len()];
        peer.read_exact(&mut received).await.unwrap();

        let mut expected = first.as_bytes().to_vec();
        expected.extend_from_slice(second.as_bytes());
        assert_eq!(received, expected);
        assert!(conn.is_idle());

        conn.shutdown();
    }

    #[tokio::test]
    async fn test_write_is_on_the_stream_when_send_returns() {
        let (local, mut peer) = duplex(4096);
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        // Not started: no task could have written it later.
        let conn = Connection::new(SlotId::new(0), Box::new(local), events_tx);

        let record = keep_alive_record("h");
        assert!(conn.try_send(&record));

        let mut received = vec![0u8; record.len()];
        peer.read_exact(&mut received).await.unwrap();
        assert_eq!(received, record.as_bytes());
    }

    #[tokio::test]
    async fn test_inbound_data_becomes_event() {
        let (local, mut peer) = duplex(4096);
        let (_conn, mut events_rx) = started(2, Box::new(local));

        peer.write_all(b"HTTP/1.1 204 No Content\r\n\r\n").await.unwrap();

        match events_rx.recv().await {
            Some(PoolEvent::Data { slot, chunk }) => {
                assert_eq!(slot, SlotId::new(2));
                assert!(chunk.starts_with(b"HTTP/1.1 204"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_peer_close_emits_closed_once() {
        let (local, peer) = duplex(4096);
        let (conn, mut events_rx) = started(1, Box::new(local));

        drop(peer);

        match events_rx.recv().await {
            Some(PoolEvent::Closed { slot, id, reason }) => {
                assert_eq!(slot, SlotId::new(1));
                assert_eq!(id, conn.id());
                assert!(reason.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // A write after the close is dropped without a second event.
        assert!(!conn.try_send(&keep_alive_record("h")));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(matches!(events_rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_no_event_before_start() {
        let (local, peer) = duplex(64);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let conn = Connection::new(SlotId::new(0), Box::new(local), events_tx);
        drop(peer);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(matches!(events_rx.try_recv(), Err(TryRecvError::Empty)));

        conn.start();
        assert!(matches!(
            events_rx.recv().await,
            Some(PoolEvent::Closed { reason: None, .. })
        ));
    }

    #[tokio::test]
    async fn test_busy_stream_drops_writes() {
        // One-byte buffer the peer never reads: the first record leaves a
        // backlog and everything after it is dropped.
        let (local, _peer) = duplex(1);
        let (conn, _events) = started(0, Box::new(local));

        let record = keep_alive_record("host");
        let accepted = (0..16).filter(|_| conn.try_send(&record)).count();

        assert_eq!(accepted, 1);
        assert!(!conn.is_idle());
        assert!(!conn.is_writable());
        conn.shutdown();
    }

    #[tokio::test]
    async fn test_partial_write_is_finished_by_flusher() {
        let (local, mut peer) = duplex(8);
        let (conn, _events) = started(0, Box::new(local));

        let record = keep_alive_record("host");
        assert!(conn.try_send(&record));

        let mut received = vec![0u8; record.len()];
        peer.read_exact(&mut received).await.unwrap();
        assert_eq!(received, record.as_bytes());

        for _ in 0..100 {
            if conn.is_idle() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(conn.is_idle());
        conn.shutdown();
    }

    #[tokio::test]
    async fn test_send_after_shutdown_is_dropped() {
        let (local, _peer) = duplex(4096);
        let (conn, _events) = started(0, Box::new(local));

        conn.shutdown();

        assert!(!conn.try_send(&keep_alive_record("host")));
        assert!(!conn.is_writable());
    }

    #[tokio::test]
    async fn test_connection_ids_are_unique() {
        let (a, _pa) = duplex(64);
        let (b, _pb) = duplex(64);
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let first = Connection::new(SlotId::new(0), Box::new(a), events_tx.clone());
        let second = Connection::new(SlotId::new(0), Box::new(b), events_tx);

        assert_ne!(first.id(), second.id());
    }
}

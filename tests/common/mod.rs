//! Shared helpers for integration tests.

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf, duplex};

use vanity_swapper::config::{Credential, TransferPlan};
use vanity_swapper::identifiers::{Alias, ResourceId};
use vanity_swapper::notify::{NotificationEvent, NotificationSink};
use vanity_swapper::transport::{BoxedTransport, Connector, PoolOptions};
use vanity_swapper::Result;

// ============================================================================
// Connectors
// ============================================================================

/// Hands out in-memory streams and keeps the far ends for inspection.
#[derive(Default)]
pub struct MemoryConnector {
    peers: Mutex<Vec<DuplexStream>>,
}

impl MemoryConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Takes every peer opened so far, in connect order.
    pub fn take_peers(&self) -> Vec<DuplexStream> {
        self.peers.lock().drain(..).collect()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<BoxedTransport> {
        let (local, peer) = duplex(256 * 1024);
        self.peers.lock().push(peer);
        Ok(Box::new(local))
    }
}

/// One accepted socket write: the connection it hit and the bytes taken.
#[derive(Debug, Clone)]
pub struct SocketWrite {
    pub connection: usize,
    pub bytes: Vec<u8>,
}

/// Like [`MemoryConnector`], but logs every accepted write across all
/// connections in the order the streams took them.
#[derive(Default)]
pub struct RecordingConnector {
    writes: Arc<Mutex<Vec<SocketWrite>>>,
    opened: Mutex<usize>,
    peers: Mutex<Vec<DuplexStream>>,
}

impl RecordingConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of the write log.
    pub fn writes(&self) -> Vec<SocketWrite> {
        self.writes.lock().clone()
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    async fn connect(&self) -> Result<BoxedTransport> {
        let (local, peer) = duplex(256 * 1024);
        self.peers.lock().push(peer);

        let connection = {
            let mut opened = self.opened.lock();
            *opened += 1;
            *opened - 1
        };
        Ok(Box::new(RecordingStream {
            inner: local,
            connection,
            writes: self.writes.clone(),
        }))
    }
}

struct RecordingStream {
    inner: DuplexStream,
    connection: usize,
    writes: Arc<Mutex<Vec<SocketWrite>>>,
}

impl AsyncRead for RecordingStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for RecordingStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let polled = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = polled {
            self.writes.lock().push(SocketWrite {
                connection: self.connection,
                bytes: buf[..n].to_vec(),
            });
        }
        polled
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

// ============================================================================
// Notifiers
// ============================================================================

/// Records every notification.
#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<NotificationEvent>>,
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify(&self, event: NotificationEvent) {
        self.events.lock().push(event);
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub const SOURCE_GUILD: &str = "111111111111111111";
pub const TARGET_GUILD: &str = "222222222222222222";

pub fn plan() -> TransferPlan {
    TransferPlan {
        source_resource_id: ResourceId::new(SOURCE_GUILD).unwrap(),
        target_resource_id: ResourceId::new(TARGET_GUILD).unwrap(),
        temp_alias: Alias::new("parked").unwrap(),
        final_alias: Alias::new("cool").unwrap(),
        source_credential: Credential::new("source-token").unwrap(),
        source_mfa_credential: Credential::new("source-mfa").unwrap(),
        target_credential: Credential::new("target-token").unwrap(),
        target_mfa_credential: Credential::new("target-mfa").unwrap(),
    }
}

/// Pool options with heartbeats far enough out not to interleave.
pub fn pool_options(capacity: usize) -> PoolOptions {
    PoolOptions::new()
        .with_host("api.test")
        .with_capacity(capacity)
        .with_heartbeat_interval(Duration::from_secs(3600))
}

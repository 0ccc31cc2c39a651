//! Fixed-capacity pool of persistent connections to one remote host.
//!
//! All lifecycle and data events are funneled through a single ordered
//! channel consumed by one manager task. That task is the only writer of
//! the ready list; everything else only reads it.
//!
//! # Architecture
//!
//! ```text
//! connect attempts ──┐
//! reader tasks ──────┼──► PoolEvent channel ──► manager task ──► ready list
//! writer tasks ──────┘                            │   ▲             (RwLock)
//!                                                 │   └── heartbeat tick
//!                                                 └──► ResponseClassifier
//! ```
//!
//! # Slot lifecycle
//!
//! `Connecting → Ready → Closed → Connecting → ...`
//!
//! A slot that loses its connection, or fails to get one, is always
//! reconnected after the same fixed delay. There is no backoff and no
//! attempt limit.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::SlotId;
use crate::protocol::{RequestRecord, ResponseClassifier, keep_alive_record};
use crate::transfer::Dispatcher;

use super::connection::{Connection, PoolEvent};
use super::options::{MIN_HEARTBEAT_INTERVAL, PoolOptions};
use super::tls::{Connector, connect_with_timeout};

// ============================================================================
// Constants
// ============================================================================

/// How often [`ConnectionPool::drain`] rechecks the connections.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

// ============================================================================
// ConnectionState
// ============================================================================

/// State of one pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connect or handshake in progress, or waiting to reconnect.
    Connecting,
    /// Connected and in the ready list.
    Ready,
    /// Lost; a replacement is scheduled.
    Closed,
}

// ============================================================================
// PoolStats
// ============================================================================

/// Counters kept for observability only.
#[derive(Debug, Default)]
struct PoolCounters {
    connect_attempts: AtomicU64,
    replacements_scheduled: AtomicU64,
    heartbeats_sent: AtomicU64,
}

/// Point-in-time copy of the pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Connect attempts started, initial ones included.
    pub connect_attempts: u64,
    /// Replacements scheduled after a failure or close.
    pub replacements_scheduled: u64,
    /// Keep-alive requests written.
    pub heartbeats_sent: u64,
}

// ============================================================================
// ConnectionPool
// ============================================================================

/// Self-healing pool of persistent connections.
///
/// # Example
///
/// ```ignore
/// let options = PoolOptions::new();
/// let connector = Arc::new(TlsConnector::new(&options)?);
/// let pool = ConnectionPool::init(options, connector, ResponseClassifier::new());
///
/// pool.wait_for_connections(4, Duration::from_secs(5)).await?;
/// for slot in pool.ready_slots() {
///     pool.send(slot, &record);
/// }
/// ```
pub struct ConnectionPool {
    /// Pool tuning.
    options: PoolOptions,

    /// Stream factory.
    connector: Arc<dyn Connector>,

    /// Ready connections in the order they became ready.
    connections: RwLock<Vec<Connection>>,

    /// Per-slot state, indexed by slot.
    states: RwLock<Vec<ConnectionState>>,

    /// Sender side of the event channel, cloned into every task.
    events_tx: mpsc::UnboundedSender<PoolEvent>,

    /// Ready connection count, for waiters.
    ready_tx: watch::Sender<usize>,

    /// Heartbeat request bytes.
    keep_alive: RequestRecord,

    /// Counters.
    counters: Arc<PoolCounters>,

    /// Shutdown flag checked by pending connect attempts.
    shutdown: Arc<AtomicBool>,

    /// Wakes the manager on shutdown.
    shutdown_notify: Notify,

    /// Manager task handle.
    manager: Mutex<Option<JoinHandle<()>>>,
}

// ============================================================================
// ConnectionPool - Constructor
// ============================================================================

impl ConnectionPool {
    /// Starts the manager task and opens `options.capacity` connections
    /// concurrently.
    ///
    /// Returns immediately; connections join the ready list as their
    /// handshakes complete. Must be called inside a tokio runtime.
    pub fn init(
        options: PoolOptions,
        connector: Arc<dyn Connector>,
        classifier: ResponseClassifier,
    ) -> Arc<Self> {
        let capacity = options.capacity.max(1);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (ready_tx, _) = watch::channel(0);

        info!(size = capacity, host = %options.host, "Initializing connection pool");

        let pool = Arc::new(Self {
            keep_alive: keep_alive_record(&options.host),
            options,
            connector,
            connections: RwLock::new(Vec::with_capacity(capacity)),
            states: RwLock::new(vec![ConnectionState::Connecting; capacity]),
            events_tx,
            ready_tx,
            counters: Arc::new(PoolCounters::default()),
            shutdown: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Notify::new(),
            manager: Mutex::new(None),
        });

        let manager = tokio::spawn(Arc::clone(&pool).run_manager(events_rx, classifier));
        *pool.manager.lock() = Some(manager);

        for index in 0..capacity {
            pool.spawn_attempt(SlotId::new(index), Duration::ZERO);
        }

        pool
    }
}

// ============================================================================
// ConnectionPool - Public API
// ============================================================================

impl ConnectionPool {
    /// Returns the configured capacity.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.options.capacity.max(1)
    }

    /// Returns the number of ready connections.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Returns the slots of ready connections, in ready order.
    #[must_use]
    pub fn ready_slots(&self) -> Vec<SlotId> {
        self.connections.read().iter().map(Connection::slot).collect()
    }

    /// Returns the state of one slot.
    #[must_use]
    pub fn slot_state(&self, slot: SlotId) -> Option<ConnectionState> {
        self.states.read().get(slot.index()).copied()
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            connect_attempts: self.counters.connect_attempts.load(Ordering::Relaxed),
            replacements_scheduled: self.counters.replacements_scheduled.load(Ordering::Acquire),
            heartbeats_sent: self.counters.heartbeats_sent.load(Ordering::Relaxed),
        }
    }

    /// Best-effort write to the connection in `slot`.
    ///
    /// Returns `false` if the slot has no ready connection or its stream
    /// cannot take the record. Dropped writes are not retried.
    pub fn send(&self, slot: SlotId, record: &RequestRecord) -> bool {
        let connections = self.connections.read();
        connections
            .iter()
            .find(|c| c.slot() == slot)
            .is_some_and(|c| c.try_send(record))
    }

    /// Waits until at least `count` connections are ready.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the count is not reached in time
    /// - [`Error::ConnectionClosed`] if the pool shuts down meanwhile
    pub async fn wait_for_connections(&self, count: usize, limit: Duration) -> Result<()> {
        let mut ready_rx = self.ready_tx.subscribe();
        match timeout(limit, ready_rx.wait_for(|ready| *ready >= count)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => Err(Error::connection_timeout(limit.as_millis() as u64)),
        }
    }

    /// Waits until every ready connection has written and flushed what it
    /// accepted, or `limit` elapses.
    ///
    /// Returns `true` if everything was flushed in time.
    pub async fn drain(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            let pending = self
                .connections
                .read()
                .iter()
                .filter(|c| !c.is_idle())
                .count();
            if pending == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                warn!(connections = pending, "Writes not flushed in time");
                return false;
            }
            sleep(DRAIN_POLL_INTERVAL).await;
        }
    }

    /// Stops the manager, pending reconnects and every connection.
    pub async fn shutdown(&self) {
        info!("ConnectionPool shutting down");

        self.shutdown.store(true, Ordering::SeqCst);
        self.shutdown_notify.notify_one();

        let manager = self.manager.lock().take();
        if let Some(manager) = manager
            && let Err(e) = manager.await
            && !e.is_cancelled()
        {
            warn!(error = %e, "Pool manager ended abnormally");
        }

        let connections: Vec<_> = self.connections.write().drain(..).collect();
        for connection in connections {
            connection.shutdown();
            debug!(slot = %connection.slot(), "Connection closed during shutdown");
        }
        self.ready_tx.send_replace(0);

        info!("ConnectionPool shutdown complete");
    }
}

impl Dispatcher for ConnectionPool {
    fn ready_slots(&self) -> Vec<SlotId> {
        ConnectionPool::ready_slots(self)
    }

    fn dispatch(&self, slot: SlotId, record: &RequestRecord) -> bool {
        self.send(slot, record)
    }
}

// ============================================================================
// ConnectionPool - Connect Attempts
// ============================================================================

impl ConnectionPool {
    /// Spawns one connect attempt for `slot` after `delay`.
    ///
    /// The outcome comes back to the manager as `Ready` or `Failed`.
    fn spawn_attempt(&self, slot: SlotId, delay: Duration) {
        let connector = Arc::clone(&self.connector);
        let events = self.events_tx.clone();
        let counters = Arc::clone(&self.counters);
        let shutdown = Arc::clone(&self.shutdown);
        let handshake_timeout = self.options.handshake_timeout;

        tokio::spawn(async move {
            if !delay.is_zero() {
                sleep(delay).await;
            }
            if shutdown.load(Ordering::SeqCst) {
                return;
            }

            counters.connect_attempts.fetch_add(1, Ordering::Relaxed);
            debug!(%slot, "Connecting");

            let event = match connect_with_timeout(connector.as_ref(), handshake_timeout).await {
                Ok(stream) => PoolEvent::Ready {
                    slot,
                    connection: Connection::new(slot, stream, events.clone()),
                },
                Err(error) => PoolEvent::Failed { slot, error },
            };

            // Manager already gone: don't leave the new connection running.
            if let Err(mpsc::error::SendError(PoolEvent::Ready { connection, .. })) =
                events.send(event)
            {
                connection.shutdown();
            }
        });
    }

    /// Marks `slot` as reconnecting and spawns the delayed attempt.
    fn schedule_replacement(&self, slot: SlotId) {
        if self.shutdown.load(Ordering::SeqCst) {
            return;
        }

        self.set_state(slot, ConnectionState::Connecting);
        self.counters
            .replacements_scheduled
            .fetch_add(1, Ordering::Release);

        debug!(
            %slot,
            delay_ms = self.options.reconnect_delay.as_millis() as u64,
            "Replacement scheduled"
        );
        self.spawn_attempt(slot, self.options.reconnect_delay);
    }

    fn set_state(&self, slot: SlotId, state: ConnectionState) {
        if let Some(entry) = self.states.write().get_mut(slot.index()) {
            *entry = state;
        }
    }

    fn publish_ready_count(&self, count: usize) {
        self.ready_tx.send_replace(count);
    }
}

// ============================================================================
// ConnectionPool - Manager
// ============================================================================

impl ConnectionPool {
    /// Consumes pool events and drives the heartbeat until shutdown.
    async fn run_manager(
        self: Arc<Self>,
        mut events_rx: mpsc::UnboundedReceiver<PoolEvent>,
        classifier: ResponseClassifier,
    ) {
        let period = self.options.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL);
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!("Pool manager started");

        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event, &classifier),
                        None => break,
                    }
                }

                _ = heartbeat.tick() => {
                    self.write_heartbeat();
                }

                _ = self.shutdown_notify.notified() => {
                    debug!("Pool manager shutting down");
                    break;
                }
            }
        }

        debug!("Pool manager terminated");
    }

    /// Applies one event. Runs to completion before the next is read.
    fn handle_event(&self, event: PoolEvent, classifier: &ResponseClassifier) {
        match event {
            PoolEvent::Ready { slot, connection } => self.on_ready(slot, connection),

            PoolEvent::Failed { slot, error } => {
                if error.is_connection_error() {
                    warn!(%slot, error = %error, "Connect attempt failed");
                } else {
                    error!(%slot, error = %error, "Connection error");
                }
                self.set_state(slot, ConnectionState::Closed);
                self.schedule_replacement(slot);
            }

            PoolEvent::Data { slot, chunk } => {
                classifier.observe(slot, &chunk);
            }

            PoolEvent::Closed { slot, id, reason } => self.on_closed(slot, id, reason),
        }
    }

    fn on_ready(&self, slot: SlotId, connection: Connection) {
        if self.shutdown.load(Ordering::SeqCst) {
            connection.shutdown();
            return;
        }

        let count = {
            let mut connections = self.connections.write();
            let occupied = connections.iter().any(|c| c.slot() == slot);
            if occupied || connections.len() >= self.capacity() {
                drop(connections);
                warn!(%slot, "Surplus connection discarded");
                connection.shutdown();
                return;
            }
            connections.push(connection.clone());
            connections.len()
        };

        // I/O tasks only start once the connection is in the ready list, so
        // its close can never be seen before its arrival.
        connection.start();

        self.set_state(slot, ConnectionState::Ready);
        self.publish_ready_count(count);
        info!(%slot, ready = count, "Connection ready");
    }

    fn on_closed(&self, slot: SlotId, id: u64, reason: Option<Error>) {
        let (removed, count) = {
            let mut connections = self.connections.write();
            let position = connections.iter().position(|c| c.id() == id);
            let removed = position.map(|index| connections.remove(index));
            (removed, connections.len())
        };

        // Both I/O tasks report a close; only the first one counts.
        let Some(connection) = removed else {
            return;
        };
        connection.shutdown();

        match reason {
            Some(e) => error!(%slot, error = %e, "Connection error"),
            None => warn!(%slot, "Connection ended by remote"),
        }

        self.set_state(slot, ConnectionState::Closed);
        self.publish_ready_count(count);
        self.schedule_replacement(slot);
    }

    /// Writes the keep-alive request to every ready connection.
    fn write_heartbeat(&self) {
        let connections = self.connections.read();
        let sent = connections
            .iter()
            .filter(|c| c.try_send(&self.keep_alive))
            .count();

        self.counters
            .heartbeats_sent
            .fetch_add(sent as u64, Ordering::Relaxed);
        debug!(sent, ready = connections.len(), "Heartbeat written");
    }
}

// ============================================================================
// Tests
// ============================================================================

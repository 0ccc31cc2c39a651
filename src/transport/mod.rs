//! Persistent TLS transport layer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                        ┌──────────────────┐
//! │  ConnectionPool      │   N x TLS 1.3 streams  │  Remote host     │
//! │                      │◄──────────────────────►│  (HTTP/1.1,      │
//! │  manager task        │   keep-alive, raw      │   keep-alive)    │
//! │  → Connection x N    │   pre-encoded requests │                  │
//! └──────────────────────┘                        └──────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `ConnectionPool::init` - Spawn manager, start N connect attempts
//! 2. `Connector::connect` - TCP + TLS handshake, bounded by a timeout
//! 3. `Connection` - Write in call order, forward inbound bytes as events
//! 4. Error or end of stream - Remove, reconnect after a fixed delay
//! 5. `ConnectionPool::shutdown` - Stop manager and all connections
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Connection handle, I/O tasks, pool events |
//! | `options` | Pool tuning |
//! | `pool` | Pool manager and heartbeat |
//! | `tls` | Connector trait and TLS connector |

// ============================================================================
// Submodules
// ============================================================================

/// Connection handle and I/O tasks.
pub mod connection;

/// Pool tuning.
pub mod options;

/// Self-healing connection pool.
pub mod pool;

/// Stream establishment.
pub mod tls;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, PoolEvent};
pub use options::PoolOptions;
pub use pool::{ConnectionPool, ConnectionState, PoolStats};
pub use tls::{BoxedTransport, Connector, TlsConnector, Transport};

//! Connection pool tuning.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use vanity_swapper::PoolOptions;
//!
//! let options = PoolOptions::new()
//!     .with_capacity(8)
//!     .with_reconnect_delay(Duration::from_millis(500))
//!     .with_strict_tls();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Default remote host.
pub const DEFAULT_HOST: &str = "canary.discord.com";

/// Default remote port.
pub const DEFAULT_PORT: u16 = 443;

/// Default number of pooled connections.
pub const DEFAULT_CAPACITY: usize = 4;

/// Default bound on TCP connect plus TLS handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(3000);

/// Fixed delay before a lost slot is reconnected.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Interval between keep-alive writes.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(7500);

/// Shortest accepted heartbeat interval.
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

// ============================================================================
// PoolOptions
// ============================================================================

/// Configuration for [`ConnectionPool`](super::ConnectionPool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    /// Remote host, also used for SNI and the `Host` header.
    pub host: String,

    /// Remote port.
    pub port: u16,

    /// Maximum number of live connections.
    pub capacity: usize,

    /// Bound on connect plus handshake per attempt.
    pub handshake_timeout: Duration,

    /// Delay before a removed slot is reconnected. Never grows.
    pub reconnect_delay: Duration,

    /// Interval between keep-alive requests on every ready connection.
    pub heartbeat_interval: Duration,

    /// Accept any server certificate.
    pub insecure_tls: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl PoolOptions {
    /// Creates options with the default tuning.
    ///
    /// Certificate validation is disabled by default to keep the handshake
    /// as short as possible.
    #[must_use]
    pub fn new() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            capacity: DEFAULT_CAPACITY,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            insecure_tls: true,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl PoolOptions {
    /// Sets the remote host.
    #[inline]
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the remote port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the pool capacity. Values below 1 are raised to 1.
    #[inline]
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the reconnect delay.
    #[inline]
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Sets the heartbeat interval. Zero is raised to
    /// [`MIN_HEARTBEAT_INTERVAL`].
    #[inline]
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval.max(MIN_HEARTBEAT_INTERVAL);
        self
    }

    /// Enables certificate validation against the bundled web PKI roots.
    #[inline]
    #[must_use]
    pub fn with_strict_tls(mut self) -> Self {
        self.insecure_tls = false;
        self
    }

    /// Sets whether server certificates are accepted unverified.
    #[inline]
    #[must_use]
    pub fn with_insecure_tls(mut self, insecure: bool) -> Self {
        self.insecure_tls = insecure;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = PoolOptions::default();
        assert_eq!(options.host, "canary.discord.com");
        assert_eq!(options.port, 443);
        assert_eq!(options.capacity, 4);
        assert_eq!(options.handshake_timeout, Duration::from_secs(3));
        assert_eq!(options.reconnect_delay, Duration::from_secs(1));
        assert_eq!(options.heartbeat_interval, Duration::from_millis(7500));
        assert!(options.insecure_tls);
    }

    #[test]
    fn test_builder_chain() {
        let options = PoolOptions::new()
            .with_host("example.com")
            .with_port(8443)
            .with_capacity(0)
            .with_strict_tls();

        assert_eq!(options.host, "example.com");
        assert_eq!(options.port, 8443);
        assert_eq!(options.capacity, 1);
        assert!(!options.insecure_tls);
    }

    #[test]
    fn test_zero_heartbeat_is_raised() {
        let options = PoolOptions::new().with_heartbeat_interval(Duration::ZERO);
        assert_eq!(options.heartbeat_interval, MIN_HEARTBEAT_INTERVAL);
    }
}

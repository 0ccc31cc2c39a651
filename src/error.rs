//! Error types for the vanity swapper.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use vanity_swapper::{Result, SwapperConfig};
//!
//! async fn example() -> Result<()> {
//!     let config = SwapperConfig::load("config.json").await?;
//!     let plan = config.plan(credentials)?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Startup (fatal) | [`Error::Config`], [`Error::Credential`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Delivery | [`Error::Notification`] |
//! | External | [`Error::Io`], [`Error::Tls`], [`Error::Http`] |
//!
//! Whether a claim actually succeeded on the remote side is not an error
//! condition anywhere in this crate. The transfer reports success once its
//! writes are dispatched.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::path::PathBuf;
use std::result::Result as StdResult;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Startup Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when the transfer plan is missing, unparsable or invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Configuration file could not be read.
    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        /// Path that was read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: IoError,
    },

    /// Credential error.
    ///
    /// Returned when MFA credentials are missing or empty.
    #[error("Credential error: {message}")]
    Credential {
        /// Description of the credential error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// TCP connect or TLS handshake did not finish in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection closed by the remote end.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Delivery Errors
    // ========================================================================
    /// Webhook delivery failed.
    #[error("Notification failed: {message}")]
    Notification {
        /// Description of the delivery failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// TLS configuration or handshake error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a config read error.
    #[inline]
    pub fn config_read(path: impl Into<PathBuf>, source: IoError) -> Self {
        Self::ConfigRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a credential error.
    #[inline]
    pub fn credential(message: impl Into<String>) -> Self {
        Self::Credential {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a notification error.
    #[inline]
    pub fn notification(message: impl Into<String>) -> Self {
        Self::Notification {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection error.
    ///
    /// Connection errors are recovered inside the pool and never reach
    /// the orchestrator.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::Tls(_)
        )
    }

    /// Returns `true` if this error must terminate the process.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::ConfigRead { .. } | Self::Credential { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

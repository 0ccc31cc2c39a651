//! Vanity swapper - move a guild vanity URL from one guild to another.
//!
//! The swap is a race: the source guild releases the alias by switching to a
//! temporary one, and the target guild claims it from many pre-warmed
//! connections at once, hoping one claim lands in the short window where the
//! alias is free.
//!
//! # Architecture
//!
//! ```text
//! config.json + mfa.json
//!         │
//!         ▼
//!   TransferPlan ──► Session ──► TransferOrchestrator
//!                       │              │ release ×2, claim ×N ×(1+R)
//!                       ▼              ▼
//!                ConnectionPool ◄── RequestRecordCache
//!                 N × TLS 1.3
//! ```
//!
//! Key design principles:
//!
//! - Requests are rendered once into immutable byte buffers and shared
//! - Connections are opened ahead of time and kept alive with heartbeats
//! - Writes never wait for responses; responses are only logged
//! - Lost connections are replaced forever at a fixed delay
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use vanity_swapper::config::{CredentialProvider, FileCredentialProvider};
//! use vanity_swapper::notify::NoopNotifier;
//! use vanity_swapper::transfer::Session;
//! use vanity_swapper::transport::TlsConnector;
//! use vanity_swapper::{Result, SwapperConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = SwapperConfig::load("config.json").await?;
//!     let mfa = FileCredentialProvider::current_dir().load().await?;
//!     let plan = config.plan(mfa)?;
//!
//!     let pool_options = config.pool_options();
//!     let connector = Arc::new(TlsConnector::new(&pool_options)?);
//!     let session = Session::start(
//!         plan,
//!         pool_options,
//!         config.transfer_options(),
//!         connector,
//!         Arc::new(NoopNotifier),
//!     )?;
//!
//!     let outcome = session.run_with_grace(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     }).await;
//!     println!("{outcome:?}");
//!
//!     session.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Config file, MFA credentials, [`TransferPlan`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Validated guild ids, aliases, pool slots |
//! | [`notify`] | Completion webhook |
//! | [`protocol`] | Raw HTTP/1.1 request records and response classes |
//! | [`transfer`] | Orchestrator and session |
//! | [`transport`] | TLS connection pool |

// ============================================================================
// Modules
// ============================================================================

/// Startup configuration.
///
/// Loads `config.json` and the MFA credential file into a [`TransferPlan`].
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Completion notifications.
pub mod notify;

/// HTTP/1.1 wire messages.
pub mod protocol;

/// Release-then-claim orchestration.
pub mod transfer;

/// Persistent TLS transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration
pub use config::{SwapperConfig, TransferPlan};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{Alias, ResourceId, SlotId};

// Orchestration
pub use transfer::{RunOutcome, Session, TransferOptions, TransferReport};

// Transport
pub use transport::{ConnectionPool, PoolOptions};

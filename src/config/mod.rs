//! Startup configuration.
//!
//! Everything here runs once before the pool starts; any failure is fatal.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SwapperConfig`] | Raw `config.json` contents |
//! | [`CredentialProvider`] | Source of MFA credentials |
//! | [`FileCredentialProvider`] | `mfa.json` / `mfa.txt` reader |
//! | [`TransferPlan`] | Immutable plan handed to the session |

// ============================================================================
// Submodules
// ============================================================================

/// MFA credential loading.
pub mod credentials;

/// `config.json` loading and validation.
pub mod loader;

/// Transfer plan and credential types.
pub mod plan;

// ============================================================================
// Re-exports
// ============================================================================

pub use credentials::{CredentialProvider, FileCredentialProvider};
pub use loader::{SwapperConfig, TransportSettings};
pub use plan::{Credential, MfaCredentials, TransferPlan};

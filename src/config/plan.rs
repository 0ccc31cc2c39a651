//! Immutable transfer plan and credential wrappers.
//!
//! A [`TransferPlan`] is assembled once at startup from the loaded config
//! and MFA credentials and is read-only afterwards.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::error::{Error, Result};
use crate::identifiers::{Alias, ResourceId};

// ============================================================================
// Credential
// ============================================================================

/// Bearer secret used in an authorization header.
///
/// `Debug` output is redacted so plans can be logged safely.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    /// Wraps a secret value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credential`] if the trimmed value is empty or
    /// contains control characters (it ends up verbatim in a header line).
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into().trim().to_string();
        if value.is_empty() {
            return Err(Error::credential("credential value is empty"));
        }
        if value.chars().any(char::is_control) {
            return Err(Error::credential("credential contains control characters"));
        }
        Ok(Self(value))
    }

    /// Returns the raw secret for header encoding.
    #[inline]
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(***{} chars)", self.0.len())
    }
}

// ============================================================================
// MfaCredentials
// ============================================================================

/// MFA authorization values for both sides of the transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfaCredentials {
    /// MFA token of the account owning the source guild.
    pub source: Credential,
    /// MFA token of the account owning the target guild.
    pub target: Credential,
}

// ============================================================================
// TransferPlan
// ============================================================================

/// Everything the race needs to know, fixed before the pool starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    /// Guild currently holding the final alias.
    pub source_resource_id: ResourceId,
    /// Guild that should end up with the final alias.
    pub target_resource_id: ResourceId,
    /// Disposable alias the source guild moves to.
    pub temp_alias: Alias,
    /// Alias being transferred.
    pub final_alias: Alias,
    /// Source account authorization.
    pub source_credential: Credential,
    /// Source account MFA authorization.
    pub source_mfa_credential: Credential,
    /// Target account authorization.
    pub target_credential: Credential,
    /// Target account MFA authorization.
    pub target_mfa_credential: Credential,
}

impl TransferPlan {
    /// Checks cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if both guilds are the same or the
    /// temporary alias equals the final alias.
    pub fn validate(&self) -> Result<()> {
        if self.source_resource_id == self.target_resource_id {
            return Err(Error::config(
                "sourceGuildId and targetGuildId must differ",
            ));
        }
        if self.temp_alias == self.final_alias {
            return Err(Error::config("tempVanity must differ from targetVanity"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

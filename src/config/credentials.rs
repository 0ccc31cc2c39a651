//! MFA credential loading.
//!
//! The MFA generator writes `mfa.json` with one token per account. Older
//! generators wrote a single token to `mfa.txt`, which is then used for
//! both sides.

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::plan::{Credential, MfaCredentials};

// ============================================================================
// Constants
// ============================================================================

/// Per-account token store.
pub const MFA_JSON_FILE: &str = "mfa.json";

/// Single shared token fallback.
pub const MFA_TEXT_FILE: &str = "mfa.txt";

// ============================================================================
// CredentialProvider
// ============================================================================

/// Source of the MFA credentials for a transfer.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Loads source and target MFA credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credential`] if either credential is missing or empty.
    async fn load(&self) -> Result<MfaCredentials>;
}

// ============================================================================
// FileCredentialProvider
// ============================================================================

/// Raw `mfa.json` shape.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MfaFile {
    #[serde(default)]
    source_token: String,
    #[serde(default)]
    target_token: String,
}

/// Reads MFA tokens from a directory on disk.
#[derive(Debug, Clone)]
pub struct FileCredentialProvider {
    dir: PathBuf,
}

impl FileCredentialProvider {
    /// Creates a provider reading from `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Creates a provider reading from the working directory.
    #[must_use]
    pub fn current_dir() -> Self {
        Self::new(".")
    }

    async fn read_json(path: &Path) -> Option<(String, String)> {
        let raw = tokio::fs::read_to_string(path).await.ok()?;
        match serde_json::from_str::<MfaFile>(&raw) {
            Ok(file) => Some((file.source_token, file.target_token)),
            Err(e) => {
                debug!(error = %e, path = %path.display(), "Unparsable MFA json, trying text fallback");
                None
            }
        }
    }

    async fn read_text(path: &Path) -> Result<(String, String)> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::credential(format!(
                "failed to read {}: {e} (is the MFA generator running?)",
                path.display()
            ))
        })?;
        let token = raw.trim().to_string();
        Ok((token.clone(), token))
    }
}

#[async_trait]
impl CredentialProvider for FileCredentialProvider {
    async fn load(&self) -> Result<MfaCredentials> {
        let (source, target) = match Self::read_json(&self.dir.join(MFA_JSON_FILE)).await {
            Some(tokens) => tokens,
            None => Self::read_text(&self.dir.join(MFA_TEXT_FILE)).await?,
        };

        if source.trim().is_empty() || target.trim().is_empty() {
            return Err(Error::credential("Missing MFA tokens"));
        }

        let credentials = MfaCredentials {
            source: Credential::new(source)?,
            target: Credential::new(target)?,
        };

        info!("MFA tokens loaded");
        Ok(credentials)
    }
}

// ============================================================================
// Tests
// ============================================================================

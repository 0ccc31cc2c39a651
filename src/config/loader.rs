//! `config.json` loading.
//!
//! # Format
//!
//! ```json
//! {
//!   "sourceToken": "...",
//!   "targetToken": "...",
//!   "sourceGuildId": "111",
//!   "targetGuildId": "222",
//!   "targetVanity": "cool",
//!   "tempVanity": "tmp123",
//!   "webhookUrl": "https://discord.com/api/webhooks/...",
//!   "transport": { "poolSize": 4, "insecureTls": true }
//! }
//! ```
//!
//! The `transport` block and every key inside it are optional.

// ============================================================================
// Imports
// ============================================================================

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{Alias, ResourceId};
use crate::transfer::TransferOptions;
use crate::transport::PoolOptions;
use crate::transport::options::{
    DEFAULT_CAPACITY, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HOST,
    DEFAULT_PORT, DEFAULT_RECONNECT_DELAY,
};

use super::plan::{Credential, MfaCredentials, TransferPlan};

// ============================================================================
// Constants
// ============================================================================

/// Config file name looked up in the working directory.
pub const CONFIG_FILE: &str = "config.json";

// ============================================================================
// SwapperConfig
// ============================================================================

/// Raw contents of `config.json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapperConfig {
    /// Authorization of the account owning the source guild.
    pub source_token: String,
    /// Authorization of the account owning the target guild.
    pub target_token: String,
    /// Guild currently holding the vanity.
    pub source_guild_id: String,
    /// Guild receiving the vanity.
    pub target_guild_id: String,
    /// Vanity being transferred.
    pub target_vanity: String,
    /// Placeholder vanity for the source guild.
    pub temp_vanity: String,
    /// Optional webhook for the completion message.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Pool and race tuning.
    #[serde(default)]
    pub transport: TransportSettings,
}

/// Optional `transport` block of `config.json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportSettings {
    /// Remote host.
    pub host: String,
    /// Remote port.
    pub port: u16,
    /// Number of pooled connections.
    pub pool_size: usize,
    /// Connect plus handshake bound in milliseconds.
    pub handshake_timeout_ms: u64,
    /// Reconnect delay in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Keep-alive interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Connections used for the release write.
    pub release_fanout: usize,
    /// Extra claim rounds after the first.
    pub claim_redundancy: usize,
    /// Skip server certificate validation.
    pub insecure_tls: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        let transfer = TransferOptions::default();
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            pool_size: DEFAULT_CAPACITY,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT.as_millis() as u64,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY.as_millis() as u64,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL.as_millis() as u64,
            release_fanout: transfer.release_fanout,
            claim_redundancy: transfer.claim_redundancy,
            insecure_tls: true,
        }
    }
}

// ============================================================================
// SwapperConfig - Loading
// ============================================================================

impl SwapperConfig {
    /// Reads and validates a config file.
    ///
    /// # Errors
    ///
    /// - [`Error::ConfigRead`] if the file cannot be read
    /// - [`Error::Config`] if it does not parse or fails validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::config_read(path, e))?;

        let config = Self::from_json(&raw)?;

        info!(
            vanity = %config.target_vanity,
            source = %config.source_guild_id,
            target = %config.target_guild_id,
            "Transfer configured"
        );
        info!(temp = %config.temp_vanity, "Temporary vanity");

        Ok(config)
    }

    /// Parses and validates config JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on malformed JSON or invalid values.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| Error::config(format!("{CONFIG_FILE}: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates individual fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        ResourceId::new(self.source_guild_id.as_str())?;
        ResourceId::new(self.target_guild_id.as_str())?;
        Alias::new(self.target_vanity.as_str())?;
        Alias::new(self.temp_vanity.as_str())?;

        if self.source_token.trim().is_empty() || self.target_token.trim().is_empty() {
            return Err(Error::config("sourceToken and targetToken are required"));
        }
        if self.transport.pool_size == 0 {
            return Err(Error::config("transport.poolSize must be at least 1"));
        }
        if self.transport.host.is_empty() {
            return Err(Error::config("transport.host must not be empty"));
        }
        for (name, value) in [
            ("heartbeatIntervalMs", self.transport.heartbeat_interval_ms),
            ("handshakeTimeoutMs", self.transport.handshake_timeout_ms),
            ("reconnectDelayMs", self.transport.reconnect_delay_ms),
        ] {
            if value == 0 {
                return Err(Error::config(format!("transport.{name} must be at least 1")));
            }
        }
        self.webhook_url()?;

        Ok(())
    }
}

// ============================================================================
// SwapperConfig - Conversion
// ============================================================================

impl SwapperConfig {
    /// Parsed webhook URL, if one is configured.
    ///
    /// Blank strings count as not configured.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for unparsable or non-http(s) URLs.
    pub fn webhook_url(&self) -> Result<Option<Url>> {
        let Some(raw) = self.webhook_url.as_deref().map(str::trim) else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }

        let url = Url::parse(raw).map_err(|e| Error::config(format!("webhookUrl: {e}")))?;
        match url.scheme() {
            "http" | "https" => Ok(Some(url)),
            other => Err(Error::config(format!(
                "webhookUrl: unsupported scheme '{other}'"
            ))),
        }
    }

    /// Combines the config with MFA credentials into a transfer plan.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] or [`Error::Credential`] for invalid values.
    pub fn plan(&self, mfa: MfaCredentials) -> Result<TransferPlan> {
        let plan = TransferPlan {
            source_resource_id: ResourceId::new(self.source_guild_id.as_str())?,
            target_resource_id: ResourceId::new(self.target_guild_id.as_str())?,
            temp_alias: Alias::new(self.temp_vanity.as_str())?,
            final_alias: Alias::new(self.target_vanity.as_str())?,
            source_credential: Credential::new(self.source_token.as_str())?,
            source_mfa_credential: mfa.source,
            target_credential: Credential::new(self.target_token.as_str())?,
            target_mfa_credential: mfa.target,
        };
        plan.validate()?;
        Ok(plan)
    }

    /// Pool tuning from the `transport` block.
    #[must_use]
    pub fn pool_options(&self) -> PoolOptions {
        let t = &self.transport;
        PoolOptions::new()
            .with_host(t.host.as_str())
            .with_port(t.port)
            .with_capacity(t.pool_size)
            .with_handshake_timeout(Duration::from_millis(t.handshake_timeout_ms))
            .with_reconnect_delay(Duration::from_millis(t.reconnect_delay_ms))
            .with_heartbeat_interval(Duration::from_millis(t.heartbeat_interval_ms))
            .with_insecure_tls(t.insecure_tls)
    }

    /// Race tuning from the `transport` block.
    #[must_use]
    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions::new()
            .with_release_fanout(self.transport.release_fanout)
            .with_claim_redundancy(self.transport.claim_redundancy)
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Pre-encoded wire requests.
//!
//! Every request the race sends is rendered to bytes once and cached for
//! the lifetime of the process, so the hot path is a buffer clone and a
//! socket write.
//!
//! # Vanity PATCH format
//!
//! ```text
//! PATCH /api/v8/guilds/{guild}/vanity-url HTTP/1.1
//! Host: {host}
//! Authorization: {token}
//! X-Discord-MFA-Authorization: {mfa}
//! User-Agent: Mozilla/5.0
//! X-Super-Properties: {base64 client metadata}
//! Content-Type: application/json
//! Connection: keep-alive
//! Content-Length: {n}
//!
//! {"code":"{alias}"}
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, LazyLock};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::json;
use tracing::debug;

use crate::config::Credential;
use crate::identifiers::{Alias, ResourceId};

// ============================================================================
// Constants
// ============================================================================

/// User agent sent with every vanity request.
const USER_AGENT: &str = "Mozilla/5.0";

/// Client build number advertised in the super properties header.
const CLIENT_BUILD_NUMBER: u64 = 355_624;

/// Base64 client metadata for the `X-Super-Properties` header.
static SUPER_PROPERTIES: LazyLock<String> = LazyLock::new(|| {
    let properties = json!({
        "browser": "Chrome",
        "browser_user_agent": "Chrome",
        "client_build_number": CLIENT_BUILD_NUMBER,
    });
    STANDARD.encode(properties.to_string())
});

// ============================================================================
// RequestRecord
// ============================================================================

/// Immutable, fully-formed HTTP/1.1 request bytes.
///
/// Cloning shares the underlying buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct RequestRecord(Arc<[u8]>);

impl RequestRecord {
    fn from_string(raw: String) -> Self {
        Self(Arc::from(raw.into_bytes()))
    }

    /// Returns the raw request bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the encoded length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the record holds no bytes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if both records share one allocation.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Returns the request line, without the trailing CRLF.
    #[must_use]
    pub fn request_line(&self) -> &str {
        let end = self
            .0
            .windows(2)
            .position(|w| w == b"\r\n")
            .unwrap_or(self.0.len());
        std::str::from_utf8(&self.0[..end]).unwrap_or("<binary>")
    }
}

impl fmt::Debug for RequestRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestRecord")
            .field("request_line", &self.request_line())
            .field("len", &self.len())
            .finish()
    }
}

// ============================================================================
// Encoders
// ============================================================================

/// Renders the idle request written by the heartbeat.
#[must_use]
pub fn keep_alive_record(host: &str) -> RequestRecord {
    RequestRecord::from_string(format!(
        "GET / HTTP/1.1\r\nHost: {host}\r\nConnection: keep-alive\r\n\r\n"
    ))
}

/// Renders a vanity PATCH request. Pure and deterministic.
#[must_use]
pub fn encode_vanity_patch(
    host: &str,
    resource_id: &ResourceId,
    alias: &Alias,
    credential: &Credential,
    mfa_credential: &Credential,
) -> RequestRecord {
    let body = json!({ "code": alias }).to_string();

    RequestRecord::from_string(format!(
        "PATCH /api/v8/guilds/{resource_id}/vanity-url HTTP/1.1\r\n\
         Host: {host}\r\n\
         Authorization: {auth}\r\n\
         X-Discord-MFA-Authorization: {mfa}\r\n\
         User-Agent: {USER_AGENT}\r\n\
         X-Super-Properties: {props}\r\n\
         Content-Type: application/json\r\n\
         Connection: keep-alive\r\n\
         Content-Length: {len}\r\n\
         \r\n\
         {body}",
        auth = credential.expose(),
        mfa = mfa_credential.expose(),
        props = SUPER_PROPERTIES.as_str(),
        len = body.len(),
    ))
}

// ============================================================================
// RequestRecordCache
// ============================================================================

/// Cache key: the full input tuple of [`encode_vanity_patch`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RecordKey {
    resource_id: ResourceId,
    alias: Alias,
    credential: Credential,
    mfa_credential: Credential,
}

/// Memoizes vanity requests for the process lifetime.
///
/// Records are never mutated or evicted.
pub struct RequestRecordCache {
    /// Host header value.
    host: String,

    /// Built records.
    records: Mutex<FxHashMap<RecordKey, RequestRecord>>,
}

impl RequestRecordCache {
    /// Creates an empty cache for `host`.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            records: Mutex::new(FxHashMap::default()),
        }
    }

    /// Returns the cached record for this key, building it on first use.
    pub fn build_or_get(
        &self,
        resource_id: &ResourceId,
        alias: &Alias,
        credential: &Credential,
        mfa_credential: &Credential,
    ) -> RequestRecord {
        let key = RecordKey {
            resource_id: resource_id.clone(),
            alias: alias.clone(),
            credential: credential.clone(),
            mfa_credential: mfa_credential.clone(),
        };

        let mut records = self.records.lock();
        records
            .entry(key)
            .or_insert_with(|| {
                debug!(guild = %resource_id, vanity = %alias, "Request record built");
                encode_vanity_patch(&self.host, resource_id, alias, credential, mfa_credential)
            })
            .clone()
    }

    /// Returns the number of cached records.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns `true` if nothing has been cached yet.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    fn cred(value: &str) -> Credential {
        Credential::new(value).unwrap()
    }

    fn guild(value: &str) -> ResourceId {
        ResourceId::new(value).unwrap()
    }

    fn alias(value: &str) -> Alias {
        Alias::new(value).unwrap()
    }

    #[test]
    fn test_super_properties_encoding() {
        assert_eq!(
            SUPER_PROPERTIES.as_str(),
            "eyJicm93c2VyIjoiQ2hyb21lIiwiYnJvd3Nlcl91c2VyX2FnZW50IjoiQ2hyb21lIiwiY2xpZW50X2J1aWxkX251bWJlciI6MzU1NjI0fQ=="
        );
    }

    #[test]
    fn test_vanity_patch_wire_format() {
        let record = encode_vanity_patch(
            "canary.discord.com",
            &guild("111"),
            &alias("cool"),
            &cred("tok"),
            &cred("mfa"),
        );
        let text = std::str::from_utf8(record.as_bytes()).unwrap();

        assert_eq!(
            record.request_line(),
            "PATCH /api/v8/guilds/111/vanity-url HTTP/1.1"
        );
        assert!(text.contains("\r\nHost: canary.discord.com\r\n"));
        assert!(text.contains("\r\nAuthorization: tok\r\n"));
        assert!(text.contains("\r\nX-Discord-MFA-Authorization: mfa\r\n"));
        assert!(text.contains("\r\nContent-Type: application/json\r\n"));
        assert!(text.contains("\r\nConnection: keep-alive\r\n"));
        assert!(text.ends_with("\r\nContent-Length: 15\r\n\r\n{\"code\":\"cool\"}"));
    }

    #[test]
    fn test_header_order() {
        let record = encode_vanity_patch("h", &guild("1"), &alias("a"), &cred("t"), &cred("m"));
        let text = std::str::from_utf8(record.as_bytes()).unwrap();
        let names: Vec<&str> = text
            .split("\r\n")
            .skip(1)
            .take_while(|line| !line.is_empty())
            .filter_map(|line| line.split(':').next())
            .collect();

        assert_eq!(
            names,
            [
                "Host",
                "Authorization",
                "X-Discord-MFA-Authorization",
                "User-Agent",
                "X-Super-Properties",
                "Content-Type",
                "Connection",
                "Content-Length",
            ]
        );
    }

    #[test]
    fn test_keep_alive_record() {
        let record = keep_alive_record("canary.discord.com");
        assert_eq!(
            record.as_bytes(),
            b"GET / HTTP/1.1\r\nHost: canary.discord.com\r\nConnection: keep-alive\r\n\r\n"
        );
    }

    #[test]
    fn test_cache_returns_shared_record() {
        let cache = RequestRecordCache::new("h");
        let first = cache.build_or_get(&guild("1"), &alias("a"), &cred("t"), &cred("m"));
        let second = cache.build_or_get(&guild("1"), &alias("a"), &cred("t"), &cred("m"));

        assert!(first.ptr_eq(&second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_distinguishes_alias_and_credentials() {
        let cache = RequestRecordCache::new("h");
        let base = cache.build_or_get(&guild("1"), &alias("a"), &cred("t"), &cred("m"));
        let other_alias = cache.build_or_get(&guild("1"), &alias("b"), &cred("t"), &cred("m"));
        let other_token = cache.build_or_get(&guild("1"), &alias("a"), &cred("u"), &cred("m"));
        let other_mfa = cache.build_or_get(&guild("1"), &alias("a"), &cred("t"), &cred("n"));

        assert_ne!(base, other_alias);
        assert_ne!(base, other_token);
        assert_ne!(base, other_mfa);
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_debug_hides_credentials() {
        let record = encode_vanity_patch("h", &guild("1"), &alias("a"), &cred("secret"), &cred("m"));
        assert!(!format!("{record:?}").contains("secret"));
    }

    proptest! {
        #[test]
        fn prop_cache_matches_fresh_encoding(
            id in "[0-9]{1,19}",
            code in "[a-z0-9-]{1,24}",
            token in "[A-Za-z0-9._-]{1,40}",
        ) {
            let cache = RequestRecordCache::new("h");
            let (g, a, t, m) = (guild(&id), alias(&code), cred(&token), cred("mfa"));

            let cached = cache.build_or_get(&g, &a, &t, &m);
            let again = cache.build_or_get(&g, &a, &t, &m);
            let fresh = encode_vanity_patch("h", &g, &a, &t, &m);

            prop_assert!(cached.ptr_eq(&again));
            prop_assert_eq!(cached.as_bytes(), fresh.as_bytes());
        }
    }
}

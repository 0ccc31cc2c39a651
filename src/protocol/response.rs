//! Inbound response classification.
//!
//! Labels each chunk read from a pooled connection by the status line it
//! starts with. The label is only logged; nothing in the pool or the race
//! acts on it.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tracing::{debug, info, warn};

use crate::identifiers::SlotId;

// ============================================================================
// Constants
// ============================================================================

/// Longest status line worth echoing into the log.
const MAX_STATUS_LINE: usize = 128;

// ============================================================================
// ResponseClass
// ============================================================================

/// Classification of an inbound chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseClass {
    /// `2xx` status.
    Success,
    /// `4xx` status.
    ClientError,
    /// Anything else, including partial or non-HTTP chunks.
    Other,
}

impl fmt::Display for ResponseClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::ClientError => f.write_str("client_error"),
            Self::Other => f.write_str("other"),
        }
    }
}

// ============================================================================
// ResponseClassifier
// ============================================================================

/// Stateless classifier for raw HTTP/1.1 response bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseClassifier;

impl ResponseClassifier {
    /// Creates a classifier.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Classifies a chunk by its leading status line.
    ///
    /// Never fails: truncated or garbage input is [`ResponseClass::Other`].
    #[must_use]
    pub fn classify(&self, chunk: &[u8]) -> ResponseClass {
        match status_code(chunk) {
            Some(200..=299) => ResponseClass::Success,
            Some(400..=499) => ResponseClass::ClientError,
            _ => ResponseClass::Other,
        }
    }

    /// Classifies a chunk and logs the result.
    pub fn observe(&self, slot: SlotId, chunk: &[u8]) -> ResponseClass {
        let class = self.classify(chunk);
        match class {
            ResponseClass::Success => {
                info!(%slot, "Success response received");
            }
            ResponseClass::ClientError => {
                warn!(%slot, status = %status_line(chunk), "Error response");
            }
            ResponseClass::Other => {
                debug!(%slot, bytes = chunk.len(), "Unclassified response chunk");
            }
        }
        class
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Parses the status code from `HTTP/1.x NNN ...`.
fn status_code(chunk: &[u8]) -> Option<u16> {
    let rest = chunk.strip_prefix(b"HTTP/1.")?;
    let (_minor, rest) = rest.split_first()?;
    let rest = rest.strip_prefix(b" ")?;
    let digits = rest.get(..3)?;

    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    if rest.get(3).is_some_and(|&b| !matches!(b, b' ' | b'\r' | b'\n')) {
        return None;
    }

    Some(
        digits
            .iter()
            .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0')),
    )
}

/// First line of the chunk, lossily decoded and length-capped.
fn status_line(chunk: &[u8]) -> String {
    let end = chunk
        .iter()
        .position(|&b| b == b'\r' || b == b'\n')
        .unwrap_or(chunk.len())
        .min(MAX_STATUS_LINE);
    String::from_utf8_lossy(&chunk[..end]).into_owned()
}

// ============================================================================
// Tests
// ============================================================================

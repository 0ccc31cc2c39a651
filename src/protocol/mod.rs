//! HTTP/1.1 wire messages.
//!
//! The swapper speaks raw HTTP/1.1 over pooled TLS streams instead of going
//! through an HTTP client, so requests are pre-rendered byte buffers and
//! responses are only inspected for their status line.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `request` | Request records and their cache |
//! | `response` | Status-line classification |

// ============================================================================
// Submodules
// ============================================================================

/// Pre-encoded request buffers.
pub mod request;

/// Response classification.
pub mod response;

// ============================================================================
// Re-exports
// ============================================================================

pub use request::{RequestRecord, RequestRecordCache, encode_vanity_patch, keep_alive_record};
pub use response::{ResponseClass, ResponseClassifier};

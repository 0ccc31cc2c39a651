//! Type-safe identifiers.
//!
//! Newtype wrappers keep guild ids, vanity codes and pool slots from being
//! mixed up at call sites that take several strings in a row.
//!
//! | Type | Wraps | Meaning |
//! |------|-------|---------|
//! | [`ResourceId`] | `String` | Guild snowflake owning a vanity |
//! | [`Alias`] | `String` | Vanity code |
//! | [`SlotId`] | `usize` | Pool slot index (0-based) |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};

// ============================================================================
// ResourceId
// ============================================================================

/// Guild identifier (decimal snowflake).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Creates a resource ID after checking it is a non-empty decimal string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the value is empty or not all digits.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::config(format!(
                "Invalid guild id '{value}': expected a decimal snowflake"
            )));
        }
        Ok(Self(value))
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Alias
// ============================================================================

/// Vanity code claimable by at most one guild at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Alias(String);

impl Alias {
    /// Creates an alias.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the value is empty or contains whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() || value.chars().any(char::is_whitespace) {
            return Err(Error::config(format!("Invalid vanity code '{value}'")));
        }
        Ok(Self(value))
    }

    /// Returns the alias as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SlotId
// ============================================================================

/// Index of a connection slot in the pool.
///
/// Displayed 1-based to match the connection numbering in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(usize);

impl SlotId {
    /// Creates a slot ID from a 0-based index.
    #[inline]
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the 0-based index.
    #[inline]
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0 + 1)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_accepts_snowflake() {
        let id = ResourceId::new("1234567890123").expect("valid id");
        assert_eq!(id.as_str(), "1234567890123");
        assert_eq!(id.to_string(), "1234567890123");
    }

    #[test]
    fn test_resource_id_rejects_garbage() {
        assert!(ResourceId::new("").is_err());
        assert!(ResourceId::new("12ab").is_err());
        assert!(ResourceId::new("../1").is_err());
    }

    #[test]
    fn test_resource_id_rejects_symbolic_names() {
        for name in ["G1", "G2", "guild"] {
            let err = ResourceId::new(name).unwrap_err();
            assert!(err.to_string().contains("decimal snowflake"));
        }
    }

    #[test]
    fn test_alias_validation() {
        assert!(Alias::new("cool").is_ok());
        assert!(Alias::new("").is_err());
        assert!(Alias::new("two words").is_err());
    }

    #[test]
    fn test_slot_display_is_one_based() {
        assert_eq!(SlotId::new(0).to_string(), "#1");
        assert_eq!(SlotId::new(3).index(), 3);
    }

    #[test]
    fn test_alias_serializes_as_plain_string() {
        let alias = Alias::new("cool").expect("valid alias");
        assert_eq!(serde_json::to_string(&alias).expect("serialize"), "\"cool\"");
    }
}

//! Race tuning.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Connections that carry the release write.
pub const DEFAULT_RELEASE_FANOUT: usize = 2;

/// Extra claim rounds after the first one.
pub const DEFAULT_CLAIM_REDUNDANCY: usize = 5;

/// Wait after pool init before announcing readiness.
pub const DEFAULT_WARMUP: Duration = Duration::from_millis(1000);

/// Last chance to cancel before the race.
pub const DEFAULT_COUNTDOWN: Duration = Duration::from_millis(1000);

// ============================================================================
// TransferOptions
// ============================================================================

/// Configuration for [`TransferOrchestrator`](super::TransferOrchestrator)
/// and the session grace period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    /// Number of ready connections the release record goes to.
    pub release_fanout: usize,

    /// Claim rounds repeated after the first, one scheduler tick apart.
    pub claim_redundancy: usize,

    /// Cancellable wait for the pool to connect.
    pub warmup: Duration,

    /// Cancellable countdown before the release write.
    pub countdown: Duration,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferOptions {
    /// Creates options with the default tuning.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            release_fanout: DEFAULT_RELEASE_FANOUT,
            claim_redundancy: DEFAULT_CLAIM_REDUNDANCY,
            warmup: DEFAULT_WARMUP,
            countdown: DEFAULT_COUNTDOWN,
        }
    }

    /// Sets the release fanout.
    #[inline]
    #[must_use]
    pub fn with_release_fanout(mut self, fanout: usize) -> Self {
        self.release_fanout = fanout;
        self
    }

    /// Sets the number of extra claim rounds.
    #[inline]
    #[must_use]
    pub fn with_claim_redundancy(mut self, rounds: usize) -> Self {
        self.claim_redundancy = rounds;
        self
    }

    /// Sets both grace waits.
    #[inline]
    #[must_use]
    pub fn with_grace(mut self, warmup: Duration, countdown: Duration) -> Self {
        self.warmup = warmup;
        self.countdown = countdown;
        self
    }

    /// Total claim rounds including the first.
    #[inline]
    #[must_use]
    pub fn claim_rounds(&self) -> usize {
        self.claim_redundancy + 1
    }
}

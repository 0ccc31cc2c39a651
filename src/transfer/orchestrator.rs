//! Release-then-claim race.
//!
//! The orchestrator walks a strictly linear state machine:
//!
//! ```text
//! Idle → PoolReady → ReleaseSent → ClaimSent → Done
//! ```
//!
//! 1. **Release**: the source guild's vanity PATCH (to the temporary
//!    alias) goes to the first `release_fanout` ready connections.
//! 2. **Claim**: with no delay, the target guild's vanity PATCH (to the
//!    final alias) goes to every ready connection, then again on each of
//!    the next `claim_redundancy` scheduler ticks.
//! 3. **Notify**: the sink is told the claim succeeded.
//!
//! No step waits for or looks at a response. The release is assumed to
//! land before the claims, and the claim is reported as successful once
//! its writes are handed to the sockets. Whether the remote side actually moved the alias
//! is never checked.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tracing::{debug, info};

use crate::config::TransferPlan;
use crate::identifiers::SlotId;
use crate::notify::{NotificationEvent, NotificationSink};
use crate::protocol::{RequestRecord, RequestRecordCache};

use super::options::TransferOptions;

// ============================================================================
// Dispatcher
// ============================================================================

/// Where the orchestrator writes records.
///
/// Implemented by [`ConnectionPool`](crate::transport::ConnectionPool).
pub trait Dispatcher: Send + Sync {
    /// Slots with a ready connection, in iteration order.
    fn ready_slots(&self) -> Vec<SlotId>;

    /// Best-effort, non-blocking write. Returns `false` if dropped.
    fn dispatch(&self, slot: SlotId, record: &RequestRecord) -> bool;
}

// ============================================================================
// TransferState
// ============================================================================

/// Orchestrator progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransferState {
    /// Not started.
    Idle,
    /// Pool snapshot taken, records built.
    PoolReady,
    /// Release writes handed to the sockets.
    ReleaseSent,
    /// All claim rounds written.
    ClaimSent,
    /// Notification delivered.
    Done,
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::PoolReady => "pool_ready",
            Self::ReleaseSent => "release_sent",
            Self::ClaimSent => "claim_sent",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

// ============================================================================
// TransferReport
// ============================================================================

/// Counts of what the orchestrator wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferReport {
    /// Ready connections when the race started.
    pub pool_size: usize,
    /// Release records accepted by a connection.
    pub release_writes: usize,
    /// Claim records accepted by a connection, across all rounds.
    pub claim_writes: usize,
    /// Claim rounds issued, the first one included.
    pub claim_rounds: usize,
}

// ============================================================================
// TransferOrchestrator
// ============================================================================

/// Runs one release-then-claim race against a [`Dispatcher`].
pub struct TransferOrchestrator<'a> {
    plan: &'a TransferPlan,
    cache: &'a RequestRecordCache,
    dispatcher: &'a dyn Dispatcher,
    notifier: &'a dyn NotificationSink,
    options: TransferOptions,
    state: TransferState,
}

impl<'a> TransferOrchestrator<'a> {
    /// Creates an idle orchestrator.
    #[must_use]
    pub fn new(
        plan: &'a TransferPlan,
        cache: &'a RequestRecordCache,
        dispatcher: &'a dyn Dispatcher,
        notifier: &'a dyn NotificationSink,
        options: TransferOptions,
    ) -> Self {
        Self {
            plan,
            cache,
            dispatcher,
            notifier,
            options,
            state: TransferState::Idle,
        }
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Runs the race to completion.
    ///
    /// Not cancellable once started: the returned future should be driven
    /// to the end.
    pub async fn run(&mut self) -> TransferReport {
        let plan = self.plan;
        info!(
            vanity = %plan.final_alias,
            source = %plan.source_resource_id,
            target = %plan.target_resource_id,
            "Starting vanity transfer"
        );

        let release = self.cache.build_or_get(
            &plan.source_resource_id,
            &plan.temp_alias,
            &plan.source_credential,
            &plan.source_mfa_credential,
        );
        let claim = self.cache.build_or_get(
            &plan.target_resource_id,
            &plan.final_alias,
            &plan.target_credential,
            &plan.target_mfa_credential,
        );

        let mut report = TransferReport {
            pool_size: self.dispatcher.ready_slots().len(),
            ..TransferReport::default()
        };
        self.advance(TransferState::PoolReady);

        // Release: source vanity → temporary alias.
        info!(from = %plan.final_alias, to = %plan.temp_alias, "Releasing source vanity");
        for slot in self
            .dispatcher
            .ready_slots()
            .into_iter()
            .take(self.options.release_fanout)
        {
            if self.dispatcher.dispatch(slot, &release) {
                report.release_writes += 1;
                debug!(%slot, "Release request sent");
            }
        }
        self.advance(TransferState::ReleaseSent);

        // Claim: no delay after the release.
        info!(vanity = %plan.final_alias, "Claiming on target");
        report.claim_writes += self.broadcast(&claim);
        report.claim_rounds = 1;

        for _ in 0..self.options.claim_redundancy {
            tokio::task::yield_now().await;
            report.claim_writes += self.broadcast(&claim);
            report.claim_rounds += 1;
        }
        self.advance(TransferState::ClaimSent);

        info!(
            release_writes = report.release_writes,
            claim_writes = report.claim_writes,
            rounds = report.claim_rounds,
            "Claim writes dispatched"
        );

        self.notifier
            .notify(NotificationEvent {
                alias: plan.final_alias.clone(),
                success: true,
            })
            .await;
        self.advance(TransferState::Done);

        info!(vanity = %plan.final_alias, "Transfer completed");
        info!(temp = %plan.temp_alias, "Source guild now uses temporary vanity");

        report
    }

    /// Writes `record` to every ready connection; returns accepted writes.
    fn broadcast(&self, record: &RequestRecord) -> usize {
        self.dispatcher
            .ready_slots()
            .into_iter()
            .filter(|&slot| self.dispatcher.dispatch(slot, record))
            .count()
    }

    fn advance(&mut self, next: TransferState) {
        debug_assert!(next > self.state, "transfer state must only move forward");
        debug!(from = %self.state, to = %next, "Transfer state");
        self.state = next;
    }
}

// ============================================================================
// Tests
// ============================================================================

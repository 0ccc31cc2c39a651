//! One process-lifetime run: pool warm-up, grace countdown, race.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::TransferPlan;
use crate::error::Result;
use crate::notify::NotificationSink;
use crate::protocol::{RequestRecordCache, ResponseClassifier};
use crate::transport::{ConnectionPool, Connector, PoolOptions};

use super::options::TransferOptions;
use super::orchestrator::{TransferOrchestrator, TransferReport};

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on waiting for partially written claims to flush.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// RunOutcome
// ============================================================================

/// How [`Session::run_with_grace`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Cancelled during warm-up or countdown; nothing was sent.
    Cancelled,
    /// The race ran.
    Completed(TransferReport),
}

// ============================================================================
// Session
// ============================================================================

/// Owns everything a transfer needs.
///
/// The pool starts connecting as soon as the session is created.
pub struct Session {
    plan: TransferPlan,
    options: TransferOptions,
    cache: RequestRecordCache,
    pool: Arc<ConnectionPool>,
    notifier: Arc<dyn NotificationSink>,
}

impl Session {
    /// Validates the plan and starts the connection pool.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the plan is invalid.
    pub fn start(
        plan: TransferPlan,
        pool_options: PoolOptions,
        options: TransferOptions,
        connector: Arc<dyn Connector>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        plan.validate()?;

        let cache = RequestRecordCache::new(pool_options.host.as_str());
        let pool = ConnectionPool::init(pool_options, connector, ResponseClassifier::new());

        Ok(Self {
            plan,
            options,
            cache,
            pool,
            notifier,
        })
    }

    /// Returns the connection pool.
    #[inline]
    #[must_use]
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Returns the transfer plan.
    #[inline]
    #[must_use]
    pub fn plan(&self) -> &TransferPlan {
        &self.plan
    }

    /// Runs the race immediately with whatever connections are ready.
    ///
    /// Waits for the claim writes to flush before returning.
    pub async fn run(&self) -> TransferReport {
        let report = TransferOrchestrator::new(
            &self.plan,
            &self.cache,
            &*self.pool,
            self.notifier.as_ref(),
            self.options,
        )
        .run()
        .await;

        self.pool.drain(DRAIN_TIMEOUT).await;
        report
    }

    /// Waits the warm-up and countdown, then runs the race.
    ///
    /// `cancel` resolving during either wait aborts the run before anything
    /// is written. Once the race starts it runs to completion.
    pub async fn run_with_grace<F>(&self, cancel: F) -> RunOutcome
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(cancel);

        tokio::select! {
            () = &mut cancel => return self.cancelled(),
            () = sleep(self.options.warmup) => {}
        }

        let ready = self.pool.connection_count();
        if ready == 0 {
            warn!("No connections ready, claim writes will be dropped");
        }
        info!(
            ready,
            capacity = self.pool.capacity(),
            countdown_ms = self.options.countdown.as_millis() as u64,
            "Ready, press Ctrl+C to cancel"
        );
        info!(
            vanity = %self.plan.final_alias,
            "Transfer from source to target"
        );

        tokio::select! {
            () = &mut cancel => return self.cancelled(),
            () = sleep(self.options.countdown) => {}
        }

        RunOutcome::Completed(self.run().await)
    }

    /// Stops the pool.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    fn cancelled(&self) -> RunOutcome {
        info!("Cancelled by user");
        RunOutcome::Cancelled
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Runs `work` unless `cancel` resolves first.
///
/// `cancel` is polled first, so an already resolved cancel always wins.
/// It is borrowed and can be awaited again afterwards.
pub async fn unless_cancelled<C, W>(cancel: &mut C, work: W) -> Option<W::Output>
where
    C: Future + Unpin,
    W: Future,
{
    tokio::select! {
        biased;
        _ = cancel => None,
        out = work => Some(out),
    }
}

// ============================================================================
// Tests
// ============================================================================

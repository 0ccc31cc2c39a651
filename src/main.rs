//! `vanity-swapper` binary.
//!
//! Reads `config.json` and `mfa.json` (or `mfa.txt`) from the working
//! directory, warms up the connection pool, waits a short cancellable
//! countdown and runs the transfer.
//!
//! Ctrl+C is honoured from the moment the process starts until the race
//! begins, including while files are loaded and the pool connects.
//!
//! Exit codes: `0` on completion or Ctrl+C before the race, `1` on any
//! startup error.

// ============================================================================
// Imports
// ============================================================================

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vanity_swapper::config::{CredentialProvider, FileCredentialProvider, SwapperConfig};
use vanity_swapper::config::loader::CONFIG_FILE;
use vanity_swapper::notify::{NoopNotifier, NotificationSink, WebhookNotifier};
use vanity_swapper::transfer::{RunOutcome, Session, unless_cancelled};
use vanity_swapper::transport::TlsConnector;

// ============================================================================
// Constants
// ============================================================================

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "vanity_swapper=info";

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_fatal() => {
            error!(error = %e, "Startup failed, check config.json and the MFA file");
            ExitCode::from(1)
        }
        Err(e) => {
            error!(error = %e, "Fatal error");
            ExitCode::from(1)
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing/logging.
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run() -> vanity_swapper::Result<()> {
    let mut cancel = tokio::spawn(interrupted());

    let Some(session) = unless_cancelled(&mut cancel, prepare()).await else {
        info!("Cancelled by user");
        return Ok(());
    };
    let session = session?;

    let outcome = session
        .run_with_grace(async move {
            let _ = cancel.await;
        })
        .await;
    if let RunOutcome::Completed(report) = outcome {
        info!(
            pool_size = report.pool_size,
            claim_writes = report.claim_writes,
            "Transfer completed, exiting"
        );
    }

    session.shutdown().await;
    Ok(())
}

/// Loads the config and credentials and starts the session.
async fn prepare() -> vanity_swapper::Result<Session> {
    let config = SwapperConfig::load(CONFIG_FILE).await?;
    info!(file = CONFIG_FILE, "Config loaded");

    let mfa = FileCredentialProvider::current_dir().load().await?;
    info!("MFA credentials loaded");

    let plan = config.plan(mfa)?;
    let pool_options = config.pool_options();
    let connector = Arc::new(TlsConnector::new(&pool_options)?);

    let notifier: Arc<dyn NotificationSink> = match config.webhook_url()? {
        Some(url) => Arc::new(WebhookNotifier::new(url)?),
        None => Arc::new(NoopNotifier),
    };

    Session::start(
        plan,
        pool_options,
        config.transfer_options(),
        connector,
        notifier,
    )
}

/// Resolves on Ctrl+C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

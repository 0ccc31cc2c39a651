//! Release-then-claim orchestration.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `options` | Fanout, redundancy and grace tuning |
//! | `orchestrator` | State machine and the [`Dispatcher`] seam |
//! | `session` | Warm-up, countdown and the process-lifetime run |

// ============================================================================
// Submodules
// ============================================================================

/// Race tuning.
pub mod options;

/// Release-then-claim state machine.
pub mod orchestrator;

/// Process-lifetime run.
pub mod session;

// ============================================================================
// Re-exports
// ============================================================================

pub use options::TransferOptions;
pub use orchestrator::{Dispatcher, TransferOrchestrator, TransferReport, TransferState};
pub use session::{RunOutcome, Session, unless_cancelled};

//! The seam between the scheduler and whatever performs the action.

use futures::future::BoxFuture;
use tracing::info;

/// Result of one attempt to perform the action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The action was performed.
    Completed,
    /// The action ran and failed.
    Failed(String),
    /// The executor's prerequisites are not in place yet; nothing happened.
    NotReady(String),
}

/// Performs the external side effect for a payload.
///
/// Implementations must not mutate scheduler state; the scheduler interprets
/// the returned outcome.
pub trait ActionExecutor: Send + Sync {
    fn attempt(&self, payload: String) -> BoxFuture<'static, AttemptOutcome>;
}

/// Logs the payload and reports success. Used when no command is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunExecutor;

impl ActionExecutor for DryRunExecutor {
    fn attempt(&self, payload: String) -> BoxFuture<'static, AttemptOutcome> {
        Box::pin(async move {
            info!(%payload, "dry run: action performed");
            AttemptOutcome::Completed
        })
    }
}

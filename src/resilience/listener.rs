//! Observer hooks around retry attempts.

use crate::resilience::context::{AttemptFailure, RetryContext};

/// Observes a logical call. All hooks default to no-ops.
///
/// Hook order for a call that fails once and then succeeds:
/// `on_error` → `on_before_attempt` → `on_close(None)`.
pub trait RetryListener: Send + Sync {
    /// Called before every retry, after the failure was registered and before backoff.
    /// Returning `false` terminates the call.
    fn on_before_attempt(&self, _ctx: &RetryContext) -> bool {
        true
    }

    /// Called after every failed attempt, including retryable-status responses.
    fn on_error(&self, _ctx: &RetryContext, _failure: &AttemptFailure) {}

    /// Called once when the call finishes, with the failure that ended it, if any.
    fn on_close(&self, _ctx: &RetryContext, _failure: Option<&AttemptFailure>) {}
}

/// Logs every hook at debug level.
#[derive(Debug, Default)]
pub struct LoggingListener;

impl RetryListener for LoggingListener {
    fn on_error(&self, ctx: &RetryContext, failure: &AttemptFailure) {
        tracing::debug!(
            execution_id = %ctx.execution_id,
            service = %ctx.service,
            attempt = ctx.attempt_count(),
            error = %failure,
            "Attempt failed"
        );
    }

    fn on_close(&self, ctx: &RetryContext, failure: Option<&AttemptFailure>) {
        tracing::debug!(
            execution_id = %ctx.execution_id,
            service = %ctx.service,
            attempts = ctx.attempt_count(),
            failed = failure.is_some(),
            "Call closed"
        );
    }
}

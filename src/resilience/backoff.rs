//! Backoff between retry attempts.
//!
//! # Design Decisions
//! - Strategies are pluggable behind `BackoffStrategy`; the default waits zero time
//! - Exponential delays carry 0-10% jitter to avoid synchronized retries

use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::config::BackoffConfig;
use crate::resilience::context::RetryContext;

/// Calculate exponential backoff delay with jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Waits between a failed attempt and the next one.
#[async_trait]
pub trait BackoffStrategy: Send + Sync {
    async fn wait(&self, ctx: &RetryContext);
}

/// Build the strategy described by a service's configuration.
pub fn from_config(config: &BackoffConfig) -> Arc<dyn BackoffStrategy> {
    match *config {
        BackoffConfig::None => Arc::new(NoBackoff),
        BackoffConfig::Fixed { delay_ms } => Arc::new(FixedBackoff::new(Duration::from_millis(delay_ms))),
        BackoffConfig::Exponential { base_delay_ms, max_delay_ms } => {
            Arc::new(ExponentialBackoff::new(base_delay_ms, max_delay_ms))
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackoff;

#[async_trait]
impl BackoffStrategy for NoBackoff {
    async fn wait(&self, _ctx: &RetryContext) {}
}

#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff {
    delay: Duration,
}

impl FixedBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl BackoffStrategy for FixedBackoff {
    async fn wait(&self, _ctx: &RetryContext) {
        tokio::time::sleep(self.delay).await;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    base_ms: u64,
    max_ms: u64,
}

impl ExponentialBackoff {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self { base_ms, max_ms }
    }

    /// Delay before the retry that follows `ctx`'s latest failure.
    pub fn delay_for(&self, ctx: &RetryContext) -> Duration {
        let failures = u32::try_from(ctx.attempt_count()).unwrap_or(u32::MAX);
        calculate_backoff(failures, self.base_ms, self.max_ms)
    }
}

#[async_trait]
impl BackoffStrategy for ExponentialBackoff {
    async fn wait(&self, ctx: &RetryContext) {
        let delay = self.delay_for(ctx);
        tracing::trace!(delay = ?delay, attempt = ctx.attempt_count(), "Backing off");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::TransportError;
    use crate::load_balancer::ServerIdentity;
    use crate::resilience::context::{AttemptFailure, AttemptOutcome};
    use hyper::Method;

    #[test]
    fn test_backoff_calculation() {
        let b1 = calculate_backoff(1, 100, 2000);
        assert!(b1.as_millis() >= 100 && b1.as_millis() < 110);

        let b2 = calculate_backoff(2, 100, 2000);
        assert!(b2.as_millis() >= 200);

        let max = calculate_backoff(10, 100, 1000);
        assert!(max.as_millis() >= 1000 && max.as_millis() < 1100);

        assert_eq!(calculate_backoff(0, 100, 1000), Duration::ZERO);
    }

    #[test]
    fn test_exponential_grows_with_attempts() {
        let backoff = ExponentialBackoff::new(50, 10_000);
        let mut ctx = RetryContext::new("users", Method::GET);
        let server = ServerIdentity::new("10.0.0.1", 80);
        let failure = AttemptFailure::Transport(TransportError::Io("eof".into()));

        ctx.record(server.clone(), AttemptOutcome::Failed(failure.clone()));
        assert!(backoff.delay_for(&ctx) >= Duration::from_millis(50));
        ctx.record(server.clone(), AttemptOutcome::Failed(failure.clone()));
        ctx.record(server, AttemptOutcome::Failed(failure));
        assert!(backoff.delay_for(&ctx) >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_fixed_backoff_sleeps() {
        let strategy = from_config(&BackoffConfig::Fixed { delay_ms: 20 });
        let ctx = RetryContext::new("users", Method::GET);
        let start = std::time::Instant::now();
        strategy.wait(&ctx).await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}

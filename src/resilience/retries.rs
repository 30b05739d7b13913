//! Load-balanced retry policy.
//!
//! # Responsibilities
//! - Derive the retry budget of a service from its settings
//! - Decide whether a failed call may retry on the same server or hop to another one
//! - Roll to a freshly chosen server once same-server retries are spent
//! - Charge circuit-related failures to the failing server
//!
//! # Design Decisions
//! - Only GET is retried unless `retry_on_all_operations` is set
//! - The policy is stateless; all per-call state lives in `RetryContext`
//! - Malformed retryable status tokens are dropped, never reported
//! - A disabled budget is the no-op policy: one attempt, no reselection

use hyper::{Method, StatusCode};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::ServiceProperties;
use crate::load_balancer::ServerDirectory;
use crate::resilience::context::{AttemptFailure, RetryContext};
use crate::stats::ServerStatsRegistry;

/// Parse a comma-separated list of status codes, skipping anything that is not a number.
pub fn parse_status_codes(raw: &str) -> BTreeSet<u16> {
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter_map(|token| token.parse::<u16>().ok())
        .collect()
}

/// Retry limits of one service. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryBudget {
    pub max_retries_same_server: u32,
    pub max_retries_next_server: u32,
    pub retry_on_all_operations: bool,
    pub retryable_status_codes: BTreeSet<u16>,
    pub enabled: bool,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::from_properties(&ServiceProperties::default())
    }
}

impl RetryBudget {
    pub fn from_properties(props: &ServiceProperties) -> Self {
        Self {
            max_retries_same_server: props.max_retries_same_server,
            max_retries_next_server: props.max_retries_next_server,
            retry_on_all_operations: props.retry_on_all_operations,
            retryable_status_codes: parse_status_codes(&props.retryable_status_codes),
            enabled: props.retry_enabled,
        }
    }

    /// A budget that never retries.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn is_method_retryable(&self, method: &Method) -> bool {
        self.enabled && (*method == Method::GET || self.retry_on_all_operations)
    }
}

/// Retry policy bound to one service for one call.
pub struct LoadBalancedRetryPolicy {
    service: String,
    budget: RetryBudget,
    directory: Arc<dyn ServerDirectory>,
    stats: Arc<ServerStatsRegistry>,
}

impl LoadBalancedRetryPolicy {
    pub fn new(
        service: impl Into<String>,
        budget: RetryBudget,
        directory: Arc<dyn ServerDirectory>,
        stats: Arc<ServerStatsRegistry>,
    ) -> Self {
        Self {
            service: service.into(),
            budget,
            directory,
            stats,
        }
    }

    pub fn budget(&self) -> &RetryBudget {
        &self.budget
    }

    pub fn can_retry(&self, ctx: &RetryContext) -> bool {
        self.budget.is_method_retryable(&ctx.method)
    }

    pub fn can_retry_same_server(&self, ctx: &RetryContext) -> bool {
        !ctx.is_exhausted()
            && ctx.same_server_count < self.budget.max_retries_same_server
            && self.can_retry(ctx)
    }

    pub fn can_retry_next_server(&self, ctx: &RetryContext) -> bool {
        !ctx.is_exhausted()
            && ctx.next_server_count <= self.budget.max_retries_next_server
            && self.can_retry(ctx)
    }

    /// Whether another attempt may follow the failure just registered.
    pub fn can_continue(&self, ctx: &RetryContext) -> bool {
        !ctx.is_exhausted() && (self.can_retry_same_server(ctx) || self.can_retry_next_server(ctx))
    }

    pub fn retryable_status_code(&self, status: StatusCode) -> bool {
        self.budget.retryable_status_codes.contains(&status.as_u16())
    }

    /// Account for a failed attempt against `ctx.server`.
    ///
    /// Circuit-related failures penalize the server (and mark it down once its
    /// circuit trips). When the same-server budget is spent a new server is chosen
    /// and recorded on the context; when both budgets are spent the context is
    /// exhausted.
    pub async fn register_failure(&self, ctx: &mut RetryContext, failure: &AttemptFailure) {
        if failure.is_circuit_related() {
            if let Some(server) = ctx.server.clone() {
                if self.stats.record_circuit_failure(&server) {
                    self.directory.mark_down(&server).await;
                }
            }
        }

        if !self.can_retry_same_server(ctx) && self.can_retry_next_server(ctx) {
            let next = self.directory.choose(&self.service).await;
            tracing::debug!(
                service = %self.service,
                server = ?next.as_ref().map(|s| s.host_port()),
                "Server reselected for retry"
            );
            ctx.set_server(next);
        }

        if ctx.same_server_count >= self.budget.max_retries_same_server && self.can_retry(ctx) {
            ctx.same_server_count = 0;
            ctx.next_server_count += 1;
            if !self.can_retry_next_server(ctx) {
                ctx.set_exhausted();
            }
        } else {
            ctx.same_server_count += 1;
        }
    }
}

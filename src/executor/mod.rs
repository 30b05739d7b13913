//! Load-balanced request execution.
//!
//! # Data Flow
//! ```text
//! execute(service, request, overrides)
//!     → ConfigStore snapshot (+ call overrides) → RetryBudget, timeouts, backoff
//!     → ServerDirectory::choose
//!     → loop:
//!         reconstruct.rs (absolute URI on chosen server, secure upgrade)
//!         → stats: attempt start
//!         → Transport::execute
//!         → stats: attempt end, circuit success
//!         → response with non-retryable status: return it
//!         → otherwise: policy.register_failure → listeners → backoff → loop
//! ```
//!
//! # Design Decisions
//! - Attempts of one call are strictly sequential
//! - A response is never an error; status interpretation belongs to the caller
//! - Budget exhaustion on a retryable status returns that (buffered) response
//! - Budget exhaustion on a transport error returns that error unchanged

pub mod client;
pub mod error;
pub mod invoke;
pub mod reconstruct;

use hyper::header::HeaderValue;
use std::sync::Arc;
use tracing::Instrument;

use crate::config::{ConfigStore, ServiceOverrides, ServiceSettings};
use crate::http::{LbRequest, LbResponse, Transport, TransportError, X_REQUEST_ID};
use crate::load_balancer::ServerDirectory;
use crate::observability::metrics::{self, AttemptOutcome as MetricOutcome};
use crate::resilience::backoff;
use crate::resilience::{
    AttemptFailure, AttemptOutcome, BackoffStrategy, LoadBalancedRetryPolicy, RetryBudget,
    RetryContext, RetryListener,
};
use crate::stats::ServerStatsRegistry;

pub use client::LoadBalancerClient;
pub use error::ExecuteError;
pub use invoke::{InvokeError, MethodSpec, ServiceClient};

/// A failed attempt, keeping the response of a retryable status around.
enum Failed {
    Transport(TransportError),
    Status(LbResponse),
}

impl Failed {
    fn as_failure(&self) -> AttemptFailure {
        match self {
            Failed::Transport(e) => AttemptFailure::Transport(e.clone()),
            Failed::Status(response) => AttemptFailure::RetryableStatus(response.status),
        }
    }
}

/// Executes requests against logical services with retries and server failover.
pub struct LoadBalancedExecutor {
    directory: Arc<dyn ServerDirectory>,
    transport: Arc<dyn Transport>,
    store: Arc<ConfigStore>,
    stats: Arc<ServerStatsRegistry>,
    backoff: Option<Arc<dyn BackoffStrategy>>,
    listeners: Vec<Arc<dyn RetryListener>>,
}

impl LoadBalancedExecutor {
    pub fn builder(
        directory: Arc<dyn ServerDirectory>,
        transport: Arc<dyn Transport>,
    ) -> ExecutorBuilder {
        ExecutorBuilder {
            directory,
            transport,
            store: None,
            stats: None,
            backoff: None,
            listeners: Vec::new(),
        }
    }

    pub fn stats(&self) -> &Arc<ServerStatsRegistry> {
        &self.stats
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Address-only client sharing this executor's directory, stats and configuration.
    pub fn lb_client(&self) -> LoadBalancerClient {
        LoadBalancerClient::new(
            Arc::clone(&self.directory),
            Arc::clone(&self.stats),
            Arc::clone(&self.store),
        )
    }

    /// Execute `request` against some server of `service`.
    pub async fn execute(
        &self,
        service: &str,
        request: LbRequest,
        overrides: Option<&ServiceOverrides>,
    ) -> Result<LbResponse, ExecuteError> {
        let settings = match overrides {
            Some(overrides) => Arc::new(self.store.settings_for(service).with_overrides(overrides)),
            None => self.store.settings_for(service),
        };
        let ctx = RetryContext::new(service, request.method.clone());
        let span = tracing::info_span!(
            "lb_execute",
            service = %service,
            execution_id = %ctx.execution_id,
            method = %request.method,
        );
        self.run(ctx, settings, request).instrument(span).await
    }

    async fn run(
        &self,
        mut ctx: RetryContext,
        settings: Arc<ServiceSettings>,
        mut request: LbRequest,
    ) -> Result<LbResponse, ExecuteError> {
        let service = ctx.service.clone();
        let budget = if request.retryable == Some(false) {
            RetryBudget::disabled()
        } else {
            settings.budget.clone()
        };
        let policy = LoadBalancedRetryPolicy::new(
            service.clone(),
            budget,
            Arc::clone(&self.directory),
            Arc::clone(&self.stats),
        );
        let backoff = self
            .backoff
            .clone()
            .unwrap_or_else(|| backoff::from_config(&settings.properties.backoff));

        if !request.headers.contains_key(X_REQUEST_ID) {
            if let Ok(value) = HeaderValue::from_str(&ctx.execution_id.to_string()) {
                request.headers.insert(X_REQUEST_ID, value);
            }
        }

        ctx.set_server(self.directory.choose(&service).await);

        loop {
            let server = match ctx.server.clone() {
                Some(server) => server,
                None => {
                    tracing::warn!(attempts = ctx.attempt_count(), "No server available");
                    self.close(&ctx, ctx.last_failure.as_ref());
                    return Err(ExecuteError::NoServerAvailable { service });
                }
            };

            let secure = reconstruct::is_secure(&server, settings.is_secure());
            let uri = match reconstruct::reconstruct_uri(&server, &request.uri, secure) {
                Ok(uri) => uri,
                Err(e) => {
                    self.close(&ctx, None);
                    return Err(e);
                }
            };

            tracing::debug!(server = %server, uri = %uri, attempt = ctx.attempt_count() + 1, "Dispatching attempt");
            let guard = self.stats.start_attempt(&server);
            let result = self
                .transport
                .execute(request.to_attempt(uri), &settings.transport)
                .await;

            let failed = match result {
                Ok(response) => {
                    let elapsed = guard.finish(true);
                    self.stats.record_circuit_success(&server);
                    let status = response.status;

                    if !policy.retryable_status_code(status) {
                        metrics::record_attempt(&service, &server, MetricOutcome::Response, elapsed);
                        ctx.record(server, AttemptOutcome::Response(status));
                        tracing::debug!(status = %status, attempts = ctx.attempt_count(), "Call completed");
                        self.close(&ctx, None);
                        return Ok(response);
                    }

                    metrics::record_attempt(&service, &server, MetricOutcome::RetryableStatus, elapsed);
                    tracing::info!(server = %server, status = %status, "Retryable status received");
                    Failed::Status(response)
                }
                Err(error) => {
                    let elapsed = guard.finish(false);
                    metrics::record_attempt(&service, &server, MetricOutcome::TransportError, elapsed);
                    tracing::warn!(server = %server, error = %error, "Attempt failed");
                    Failed::Transport(error)
                }
            };

            let failure = failed.as_failure();
            ctx.record(server, AttemptOutcome::Failed(failure.clone()));
            let hops_before = ctx.next_server_count;
            policy.register_failure(&mut ctx, &failure).await;
            for listener in &self.listeners {
                listener.on_error(&ctx, &failure);
            }

            if !policy.can_continue(&ctx) {
                tracing::info!(
                    attempts = ctx.attempt_count(),
                    exhausted = ctx.is_exhausted(),
                    error = %failure,
                    "Giving up"
                );
                self.close(&ctx, Some(&failure));
                return match failed {
                    Failed::Transport(error) => Err(ExecuteError::Transport(error)),
                    Failed::Status(response) => Ok(response),
                };
            }

            if self.listeners.iter().any(|l| !l.on_before_attempt(&ctx)) {
                tracing::warn!(attempts = ctx.attempt_count(), "Retry vetoed by listener");
                self.close(&ctx, Some(&failure));
                return Err(ExecuteError::RetryTerminated {
                    service,
                    attempts: ctx.attempt_count(),
                });
            }

            let next_server = ctx.next_server_count > hops_before;
            metrics::record_retry(&service, next_server);
            tracing::debug!(
                next_server,
                same_server_count = ctx.same_server_count,
                next_server_count = ctx.next_server_count,
                "Retrying"
            );
            backoff.wait(&ctx).await;
        }
    }

    fn close(&self, ctx: &RetryContext, failure: Option<&AttemptFailure>) {
        for listener in &self.listeners {
            listener.on_close(ctx, failure);
        }
    }
}

/// Builder for [`LoadBalancedExecutor`].
pub struct ExecutorBuilder {
    directory: Arc<dyn ServerDirectory>,
    transport: Arc<dyn Transport>,
    store: Option<Arc<ConfigStore>>,
    stats: Option<Arc<ServerStatsRegistry>>,
    backoff: Option<Arc<dyn BackoffStrategy>>,
    listeners: Vec<Arc<dyn RetryListener>>,
}

impl ExecutorBuilder {
    pub fn config_store(mut self, store: Arc<ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn stats(mut self, stats: Arc<ServerStatsRegistry>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Use `backoff` for every service instead of the configured strategy.
    pub fn backoff(mut self, backoff: Arc<dyn BackoffStrategy>) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn RetryListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn build(self) -> LoadBalancedExecutor {
        let store = self.store.unwrap_or_default();
        let stats = self.stats.unwrap_or_else(|| {
            Arc::new(ServerStatsRegistry::new(store.config().circuit_breaker.clone()))
        });
        LoadBalancedExecutor {
            directory: self.directory,
            transport: self.transport,
            store,
            stats,
            backoff: self.backoff,
            listeners: self.listeners,
        }
    }
}

//! Per-call retry state.

use hyper::{Method, StatusCode};
use std::fmt;
use uuid::Uuid;

use crate::http::TransportError;
use crate::load_balancer::ServerIdentity;

/// Why an attempt did not produce a final result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    Transport(TransportError),
    /// A response arrived but its status is configured as retryable.
    RetryableStatus(StatusCode),
}

impl AttemptFailure {
    pub fn is_circuit_related(&self) -> bool {
        match self {
            AttemptFailure::Transport(e) => e.is_circuit_related(),
            AttemptFailure::RetryableStatus(_) => false,
        }
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Transport(e) => write!(f, "{}", e),
            AttemptFailure::RetryableStatus(status) => write!(f, "retryable status {}", status),
        }
    }
}

/// Outcome of one finished attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Response(StatusCode),
    Failed(AttemptFailure),
}

/// One entry of the attempt history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub server: ServerIdentity,
    pub outcome: AttemptOutcome,
}

/// State of one logical call, owned by a single `execute()`.
///
/// Retry counters are zero-based: `same_server_count` counts retries already spent
/// on the current server, `next_server_count` counts hops to a fresh server.
#[derive(Debug, Clone)]
pub struct RetryContext {
    pub execution_id: Uuid,
    pub service: String,
    pub method: Method,
    pub attempts: Vec<AttemptRecord>,
    pub same_server_count: u32,
    pub next_server_count: u32,
    pub last_failure: Option<AttemptFailure>,
    /// Server the next attempt goes to. `None` once a reselection found nothing.
    pub server: Option<ServerIdentity>,
    exhausted: bool,
}

impl RetryContext {
    pub fn new(service: impl Into<String>, method: Method) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            service: service.into(),
            method,
            attempts: Vec::new(),
            same_server_count: 0,
            next_server_count: 0,
            last_failure: None,
            server: None,
            exhausted: false,
        }
    }

    /// Number of attempts made so far.
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Mark the budget spent. Never reverts.
    pub fn set_exhausted(&mut self) {
        self.exhausted = true;
    }

    pub fn set_server(&mut self, server: Option<ServerIdentity>) {
        self.server = server;
    }

    pub fn record(&mut self, server: ServerIdentity, outcome: AttemptOutcome) {
        if let AttemptOutcome::Failed(failure) = &outcome {
            self.last_failure = Some(failure.clone());
        }
        self.attempts.push(AttemptRecord { server, outcome });
    }

    /// Distinct servers attempted, in first-use order.
    pub fn distinct_servers(&self) -> Vec<ServerIdentity> {
        let mut seen: Vec<ServerIdentity> = Vec::new();
        for attempt in &self.attempts {
            if !seen.contains(&attempt.server) {
                seen.push(attempt.server.clone());
            }
        }
        seen
    }
}

//! Errors surfaced by a load-balanced call.

use crate::http::TransportError;

/// Every way a call can fail. A response, whatever its status, is not an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecuteError {
    #[error("no server available for service '{service}'")]
    NoServerAvailable { service: String },

    /// The last attempt's transport failure once retries are spent.
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("retry terminated by listener after {attempts} attempt(s) to '{service}'")]
    RetryTerminated { service: String, attempts: usize },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

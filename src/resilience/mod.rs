//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Attempt fails (transport error or retryable status):
//!     → context.rs (record attempt on the call's RetryContext)
//!     → retries.rs (charge circuit, move same/next counters, maybe reselect server)
//!     → listener.rs (observers may veto the next attempt)
//!     → backoff.rs (wait before the next attempt)
//! ```
//!
//! # Design Decisions
//! - Timeouts belong to the transport; the executor has no overall deadline
//! - Retries only for GET unless the service retries all operations
//! - Same-server retries are spent before hopping to another server
//! - Listener vetoes are fatal to the call

pub mod backoff;
pub mod context;
pub mod listener;
pub mod retries;

pub use backoff::{BackoffStrategy, ExponentialBackoff, FixedBackoff, NoBackoff};
pub use context::{AttemptFailure, AttemptOutcome, AttemptRecord, RetryContext};
pub use listener::{LoggingListener, RetryListener};
pub use retries::{parse_status_codes, LoadBalancedRetryPolicy, RetryBudget};

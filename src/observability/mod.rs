//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Executor, policy and stats produce:
//!     → logging.rs (structured log events, one span per logical call)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape, opt-in)
//! ```
//!
//! # Design Decisions
//! - Every logical call carries an execution id that is also sent as `x-request-id`
//! - Metrics are cheap (atomic increments behind the facade)

pub mod logging;
pub mod metrics;

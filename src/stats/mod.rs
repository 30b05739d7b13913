//! Server statistics subsystem.
//!
//! # Data Flow
//! ```text
//! Executor dispatches attempt
//!     → registry.rs (record_attempt_start: active++, total++)
//!     → transport call
//!     → registry.rs (record_attempt_end: active--, latency sample)
//!     → on circuit-related error: record_circuit_failure (successive failures++)
//!     → on any response: record_circuit_success (successive failures = 0)
//!
//! Directory selection reads:
//!     → active request counts (least connections)
//!     → circuit tripped flag (skip blacked-out servers)
//! ```
//!
//! # Design Decisions
//! - One entry per `host:port`, created lazily, shared by all concurrent calls
//! - Atomic per-field updates; no registry-wide lock on the request path
//! - Blackout period grows exponentially with successive failures, capped

pub mod registry;
pub mod server_stats;

pub use registry::{AttemptGuard, ServerStatsRegistry, ServerStatsSnapshot};
pub use server_stats::ServerStats;

//! Client-side load-balanced request execution.
//!
//! # Architecture Overview
//!
//! ```text
//!   caller
//!     │ execute(service, request)
//!     ▼
//! ┌────────────────────────────────────────────────────────────┐
//! │                  LoadBalancedExecutor                      │
//! │                                                            │
//! │  config store ──▶ retry budget, timeouts, backoff          │
//! │        │                                                   │
//! │        ▼                                                   │
//! │  ServerDirectory::choose ──▶ reconstruct URI ──▶ Transport │──▶ server
//! │        ▲                                           │       │
//! │        │            ┌──────────────────────────────┘       │
//! │        │            ▼                                      │
//! │  retry policy ◀── classify ──▶ ServerStatsRegistry         │
//! │        │                                                   │
//! │        └──▶ listeners ──▶ backoff ──▶ next attempt         │
//! └────────────────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod executor;
pub mod http;

// Server selection and health
pub mod load_balancer;
pub mod stats;

// Cross-cutting concerns
pub mod observability;
pub mod resilience;

pub use config::ClientConfig;
pub use executor::{ExecuteError, LoadBalancedExecutor, LoadBalancerClient, ServiceClient};
pub use http::{LbRequest, LbResponse};

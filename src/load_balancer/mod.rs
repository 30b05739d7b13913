//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Logical service name
//!     → directory.rs (server list, down marks, circuit filtering)
//!     → Apply selection rule:
//!         - round_robin.rs (rotate through servers)
//!         - least_conn.rs (fewest in-flight requests)
//!         - random.rs (uniform pick)
//!     → server.rs (ServerIdentity handed to the executor)
//! ```
//!
//! # Design Decisions
//! - Rules are stateless apart from their own cursor; counters live in the stats registry
//! - Rule selection per service, from configuration
//! - Servers marked down are excluded from selection

pub mod directory;
pub mod least_conn;
pub mod random;
pub mod round_robin;
pub mod server;

use std::fmt::Debug;

use crate::stats::ServerStatsRegistry;

pub use directory::{ServerDirectory, StaticServerDirectory};
pub use least_conn::LeastConnections;
pub use random::Random;
pub use round_robin::RoundRobin;
pub use server::{ServerIdentity, ServerParseError};

/// Trait for selection rules.
pub trait LoadBalancer: Send + Sync + Debug {
    /// Select a server from the candidates.
    fn next_server(
        &self,
        servers: &[ServerIdentity],
        stats: &ServerStatsRegistry,
    ) -> Option<ServerIdentity>;
}

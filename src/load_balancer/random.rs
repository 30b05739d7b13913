//! Uniform random selection rule.

use crate::load_balancer::{LoadBalancer, ServerIdentity};
use crate::stats::ServerStatsRegistry;

#[derive(Debug, Default)]
pub struct Random;

impl LoadBalancer for Random {
    fn next_server(
        &self,
        servers: &[ServerIdentity],
        _stats: &ServerStatsRegistry,
    ) -> Option<ServerIdentity> {
        if servers.is_empty() {
            return None;
        }
        Some(servers[fastrand::usize(..servers.len())].clone())
    }
}

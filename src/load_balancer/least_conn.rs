//! Least-active-requests selection rule.

use crate::load_balancer::{LoadBalancer, ServerIdentity};
use crate::stats::ServerStatsRegistry;

/// Selects the server with the fewest in-flight requests in the stats registry.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for LeastConnections {
    fn next_server(
        &self,
        servers: &[ServerIdentity],
        stats: &ServerStatsRegistry,
    ) -> Option<ServerIdentity> {
        // In case of tie, the first one is selected (stability)
        servers
            .iter()
            .min_by_key(|s| stats.active_requests(s))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_least_conn() {
        let lb = LeastConnections::new();
        let stats = ServerStatsRegistry::default();
        let s1 = ServerIdentity::new("127.0.0.1", 8080);
        let s2 = ServerIdentity::new("127.0.0.1", 8081);
        let servers = vec![s1.clone(), s2.clone()];

        stats.record_attempt_start(&s1);
        assert_eq!(lb.next_server(&servers, &stats), Some(s2.clone()));

        stats.record_attempt_start(&s2);
        stats.record_attempt_start(&s2);
        assert_eq!(lb.next_server(&servers, &stats), Some(s1));
    }
}

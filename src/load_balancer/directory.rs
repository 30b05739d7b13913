//! Server directory abstraction and the static, config-backed implementation.
//!
//! # Responsibilities
//! - Map a logical service name to its candidate servers
//! - Choose one server per request using the service's selection rule
//! - Track servers marked down after persistent circuit failures
//!
//! # Design Decisions
//! - A down mark expires with the server's blackout, so a recovered server returns
//!   to rotation on its own; `mark_up` and a reload re-listing it clear it early
//! - Tripped circuits are avoided while any untripped alive server exists
//! - Groups live in a `DashMap` so reloads never block selection on other services

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{ClientConfig, RuleKind};
use crate::load_balancer::{LeastConnections, LoadBalancer, Random, RoundRobin, ServerIdentity};
use crate::stats::ServerStatsRegistry;

/// Source of candidate servers for logical services.
#[async_trait]
pub trait ServerDirectory: Send + Sync {
    /// Pick a server for `service`, or `None` if none is available.
    async fn choose(&self, service: &str) -> Option<ServerIdentity>;

    /// Called when a server's circuit trips. Default: ignored.
    async fn mark_down(&self, _server: &ServerIdentity) {}

    /// Every server currently listed for `service`, alive or not.
    async fn all_servers(&self, service: &str) -> Vec<ServerIdentity>;
}

fn rule_for(kind: RuleKind) -> Arc<dyn LoadBalancer> {
    match kind {
        RuleKind::RoundRobin => Arc::new(RoundRobin::new()),
        RuleKind::LeastConnections => Arc::new(LeastConnections::new()),
        RuleKind::Random => Arc::new(Random),
    }
}

#[derive(Debug)]
struct ServiceGroup {
    servers: Vec<ServerIdentity>,
    kind: RuleKind,
    rule: Arc<dyn LoadBalancer>,
}

/// Directory over fixed server lists, refreshed on configuration reload.
#[derive(Debug)]
pub struct StaticServerDirectory {
    groups: DashMap<String, ServiceGroup>,
    /// `host:port` of servers marked down, with the instant the mark expires.
    down: DashMap<String, Instant>,
    stats: Arc<ServerStatsRegistry>,
}

impl StaticServerDirectory {
    pub fn new(stats: Arc<ServerStatsRegistry>) -> Self {
        Self {
            groups: DashMap::new(),
            down: DashMap::new(),
            stats,
        }
    }

    /// Build a directory from every `[services.<name>]` table.
    pub fn from_config(config: &ClientConfig, stats: Arc<ServerStatsRegistry>) -> Self {
        let directory = Self::new(stats);
        directory.update_servers(config);
        directory
    }

    /// Replace the server list and rule of one service.
    pub fn set_service(&self, service: &str, servers: Vec<ServerIdentity>, kind: RuleKind) {
        let rule = match self.groups.get(service) {
            Some(existing) if existing.kind == kind => Arc::clone(&existing.rule),
            _ => rule_for(kind),
        };
        self.groups
            .insert(service.to_string(), ServiceGroup { servers, kind, rule });
    }

    /// Re-sync every service with a freshly loaded configuration.
    ///
    /// Services missing from `config` are dropped and stats of servers no longer
    /// listed anywhere are evicted. Re-listed servers lose their down mark.
    pub fn update_servers(&self, config: &ClientConfig) {
        let previous: HashSet<ServerIdentity> = self
            .groups
            .iter()
            .flat_map(|g| g.servers.clone())
            .collect();
        let mut listed = HashSet::new();

        for (name, service) in &config.services {
            let kind = service.overrides.rule.unwrap_or(config.defaults.rule);
            let mut servers = Vec::with_capacity(service.servers.len());
            for address in &service.servers {
                match ServerIdentity::parse(address) {
                    Ok(server) => {
                        self.down.remove(&server.host_port());
                        listed.insert(server.clone());
                        servers.push(server);
                    }
                    Err(e) => tracing::warn!(service = %name, error = %e, "Skipping invalid server"),
                }
            }
            tracing::debug!(service = %name, servers = servers.len(), rule = ?kind, "Service servers updated");
            self.set_service(name, servers, kind);
        }

        self.groups.retain(|name, _| config.services.contains_key(name));

        for gone in previous.difference(&listed) {
            self.down.remove(&gone.host_port());
            self.stats.evict(gone);
        }
    }

    pub fn stats(&self) -> &Arc<ServerStatsRegistry> {
        &self.stats
    }

    /// Take `server` out of rotation for `period`.
    pub fn mark_down_for(&self, server: &ServerIdentity, period: Duration) {
        let until = Instant::now() + period;
        if self.down.insert(server.host_port(), until).is_none() {
            tracing::warn!(server = %server, down_for = ?period, "Server marked down");
        }
    }

    /// Bring a server marked down back into rotation.
    pub fn mark_up(&self, server: &ServerIdentity) {
        if self.down.remove(&server.host_port()).is_some() {
            tracing::info!(server = %server, "Server marked up");
        }
    }

    /// Whether `server` is marked down. An expired mark is dropped here.
    pub fn is_down(&self, server: &ServerIdentity) -> bool {
        let key = server.host_port();
        let now = Instant::now();
        match self.down.get(&key).map(|until| *until) {
            None => false,
            Some(until) if until > now => true,
            Some(_) => {
                if self.down.remove_if(&key, |_, until| *until <= now).is_some() {
                    tracing::info!(server = %server, "Down mark expired, server back in rotation");
                }
                false
            }
        }
    }

    /// Names of every configured service.
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.iter().map(|g| g.key().clone()).collect();
        names.sort();
        names
    }

    fn select(&self, service: &str) -> Option<ServerIdentity> {
        let group = match self.groups.get(service) {
            Some(group) => group,
            None => {
                tracing::debug!(service = %service, "Service not found in directory");
                return None;
            }
        };

        let alive: Vec<ServerIdentity> = group
            .servers
            .iter()
            .filter(|s| !self.is_down(s))
            .cloned()
            .collect();
        let healthy: Vec<ServerIdentity> = alive
            .iter()
            .filter(|s| !self.stats.is_circuit_tripped(s))
            .cloned()
            .collect();

        let candidates = if healthy.is_empty() { &alive } else { &healthy };
        let chosen = group.rule.next_server(candidates, &self.stats);
        if chosen.is_none() {
            tracing::debug!(
                service = %service,
                listed = group.servers.len(),
                alive = alive.len(),
                "No server available"
            );
        }
        chosen
    }
}

#[async_trait]
impl ServerDirectory for StaticServerDirectory {
    async fn choose(&self, service: &str) -> Option<ServerIdentity> {
        self.select(service)
    }

    /// The mark lasts for the server's remaining blackout, and at least one
    /// blackout step when its circuit is not tripped.
    async fn mark_down(&self, server: &ServerIdentity) {
        let floor = Duration::from_secs(self.stats.circuit_config().tripped_timeout_factor_secs);
        let period = self.stats.remaining_blackout(server).max(floor);
        self.mark_down_for(server, period);
    }

    async fn all_servers(&self, service: &str) -> Vec<ServerIdentity> {
        self.groups
            .get(service)
            .map(|g| g.servers.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CircuitBreakerConfig, ServiceConfig};

    fn server(port: u16) -> ServerIdentity {
        ServerIdentity::new("127.0.0.1", port)
    }

    fn config(services: &[(&str, &[&str])]) -> ClientConfig {
        let mut config = ClientConfig::default();
        for (name, servers) in services {
            config.services.insert(
                name.to_string(),
                ServiceConfig {
                    servers: servers.iter().map(|s| s.to_string()).collect(),
                    ..Default::default()
                },
            );
        }
        config
    }

    #[tokio::test]
    async fn test_choose_rotates_and_skips_down() {
        let stats = Arc::new(ServerStatsRegistry::default());
        let directory = StaticServerDirectory::from_config(
            &config(&[("users", &["127.0.0.1:9001", "127.0.0.1:9002"])]),
            stats,
        );

        let first = directory.choose("users").await.unwrap();
        let second = directory.choose("users").await.unwrap();
        assert_ne!(first, second);

        directory.mark_down(&server(9001)).await;
        for _ in 0..4 {
            assert_eq!(directory.choose("users").await, Some(server(9002)));
        }

        directory.mark_down(&server(9002)).await;
        assert_eq!(directory.choose("users").await, None);
        assert_eq!(directory.all_servers("users").await.len(), 2);

        directory.mark_up(&server(9001));
        assert_eq!(directory.choose("users").await, Some(server(9001)));
        assert_eq!(directory.choose("missing").await, None);
    }

    #[tokio::test]
    async fn test_tripped_servers_avoided_when_possible() {
        let stats = Arc::new(ServerStatsRegistry::default());
        let directory = StaticServerDirectory::new(stats.clone());
        directory.set_service("users", vec![server(9001), server(9002)], RuleKind::RoundRobin);

        for _ in 0..3 {
            stats.record_circuit_failure(&server(9001));
        }
        for _ in 0..4 {
            assert_eq!(directory.choose("users").await, Some(server(9002)));
        }

        // Every server tripped: fall back to the alive set.
        for _ in 0..3 {
            stats.record_circuit_failure(&server(9002));
        }
        assert!(directory.choose("users").await.is_some());
    }

    #[tokio::test]
    async fn test_down_mark_expires_with_blackout() {
        let stats = Arc::new(ServerStatsRegistry::new(CircuitBreakerConfig {
            connection_failure_threshold: 3,
            tripped_timeout_factor_secs: 1,
            max_tripped_timeout_secs: 1,
        }));
        let directory = StaticServerDirectory::new(stats.clone());
        directory.set_service("users", vec![server(9001)], RuleKind::RoundRobin);

        let mut tripped = false;
        for _ in 0..3 {
            tripped = stats.record_circuit_failure(&server(9001));
        }
        assert!(tripped);
        directory.mark_down(&server(9001)).await;
        assert_eq!(directory.choose("users").await, None);

        tokio::time::sleep(Duration::from_millis(1_200)).await;

        assert!(!stats.is_circuit_tripped(&server(9001)));
        assert!(!directory.is_down(&server(9001)));
        assert_eq!(directory.choose("users").await, Some(server(9001)));
    }

    #[tokio::test]
    async fn test_explicit_down_period() {
        let stats = Arc::new(ServerStatsRegistry::default());
        let directory = StaticServerDirectory::new(stats);
        directory.set_service("users", vec![server(9001), server(9002)], RuleKind::RoundRobin);

        directory.mark_down_for(&server(9001), Duration::from_millis(50));
        for _ in 0..4 {
            assert_eq!(directory.choose("users").await, Some(server(9002)));
        }

        tokio::time::sleep(Duration::from_millis(80)).await;
        let chosen: HashSet<_> = [
            directory.choose("users").await.unwrap(),
            directory.choose("users").await.unwrap(),
        ]
        .into_iter()
        .collect();
        assert_eq!(chosen.len(), 2);
    }

    #[tokio::test]
    async fn test_update_servers_relists_and_evicts() {
        let stats = Arc::new(ServerStatsRegistry::default());
        let directory = StaticServerDirectory::from_config(
            &config(&[("users", &["127.0.0.1:9001"]), ("billing", &["127.0.0.1:9101"])]),
            stats.clone(),
        );
        stats.record_attempt_start(&server(9101));
        directory.mark_down(&server(9001)).await;

        directory.update_servers(&config(&[("users", &["127.0.0.1:9001", "127.0.0.1:9003"])]));

        assert_eq!(directory.services(), vec!["users".to_string()]);
        assert!(!directory.is_down(&server(9001)));
        assert!(stats.get(&server(9101)).is_none());
        assert_eq!(directory.all_servers("users").await.len(), 2);
    }
}

//! Shared registry of per-server statistics.

use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::Serialize;
use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::CircuitBreakerConfig;
use crate::load_balancer::ServerIdentity;
use crate::observability::metrics;
use crate::stats::server_stats::ServerStats;

/// Registry of [`ServerStats`] keyed by `host:port`.
///
/// Entries are created lazily on first use and live until evicted. The circuit
/// settings can be swapped at runtime; counters are kept across a swap.
#[derive(Debug)]
pub struct ServerStatsRegistry {
    servers: DashMap<String, Arc<ServerStats>>,
    circuit: ArcSwap<CircuitBreakerConfig>,
    epoch: Instant,
}

impl Default for ServerStatsRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl ServerStatsRegistry {
    pub fn new(circuit: CircuitBreakerConfig) -> Self {
        Self {
            servers: DashMap::new(),
            circuit: ArcSwap::from_pointee(circuit),
            epoch: Instant::now(),
        }
    }

    /// Stats entry for `server`, created on first use.
    pub fn stats(&self, server: &ServerIdentity) -> Arc<ServerStats> {
        let key = server.host_port();
        if let Some(existing) = self.servers.get(&key) {
            return Arc::clone(existing.value());
        }
        Arc::clone(self.servers.entry(key).or_default().value())
    }

    /// Stats entry for `server` without creating one.
    pub fn get(&self, server: &ServerIdentity) -> Option<Arc<ServerStats>> {
        self.servers.get(&server.host_port()).map(|s| Arc::clone(s.value()))
    }

    /// Drop the entry of a server the directory no longer knows about.
    pub fn evict(&self, server: &ServerIdentity) {
        self.servers.remove(&server.host_port());
    }

    pub fn circuit_config(&self) -> Arc<CircuitBreakerConfig> {
        self.circuit.load_full()
    }

    /// Apply new circuit settings to every server, including already tripped ones.
    pub fn reload_circuit(&self, circuit: CircuitBreakerConfig) {
        if **self.circuit.load() != circuit {
            tracing::info!(?circuit, "Circuit breaker settings reloaded");
            self.circuit.store(Arc::new(circuit));
        }
    }

    /// Time left before the circuit of `server` closes again; zero when not tripped.
    pub fn remaining_blackout(&self, server: &ServerIdentity) -> Duration {
        self.get(server)
            .map(|s| s.remaining_blackout(&self.circuit.load(), self.now_ms()))
            .unwrap_or(Duration::ZERO)
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    pub fn record_attempt_start(&self, server: &ServerIdentity) {
        let stats = self.stats(server);
        stats.note_open();
        metrics::record_active_requests(server, stats.active_requests());
    }

    pub fn record_attempt_end(&self, server: &ServerIdentity, elapsed: Duration, success: bool) {
        let stats = self.stats(server);
        stats.note_close(elapsed, success);
        metrics::record_active_requests(server, stats.active_requests());
    }

    /// Count a circuit-related failure. Returns true if the circuit is now tripped.
    pub fn record_circuit_failure(&self, server: &ServerIdentity) -> bool {
        let now = self.now_ms();
        let stats = self.stats(server);
        let failures = stats.note_connection_failure(now);
        let tripped = stats.is_circuit_tripped(&self.circuit.load(), now);
        metrics::record_circuit_failure(server);
        tracing::debug!(
            server = %server,
            successive_failures = failures,
            circuit_tripped = tripped,
            "Circuit-related failure recorded"
        );
        tripped
    }

    pub fn record_circuit_success(&self, server: &ServerIdentity) {
        if let Some(stats) = self.get(server) {
            stats.clear_connection_failures();
        }
    }

    pub fn is_circuit_tripped(&self, server: &ServerIdentity) -> bool {
        self.get(server)
            .map(|s| s.is_circuit_tripped(&self.circuit.load(), self.now_ms()))
            .unwrap_or(false)
    }

    pub fn active_requests(&self, server: &ServerIdentity) -> usize {
        self.get(server).map(|s| s.active_requests()).unwrap_or(0)
    }

    /// Start an attempt and return a guard that records its completion.
    ///
    /// Dropping the guard without calling [`AttemptGuard::finish`] records a failed
    /// completion, so cancelled or panicking callers never leak an active request.
    pub fn start_attempt(self: &Arc<Self>, server: &ServerIdentity) -> AttemptGuard {
        self.record_attempt_start(server);
        AttemptGuard {
            registry: self.clone(),
            server: server.clone(),
            started: Instant::now(),
            finished: false,
        }
    }

    /// Point-in-time view of every tracked server, sorted by key.
    pub fn snapshot(&self) -> Vec<ServerStatsSnapshot> {
        let now = self.now_ms();
        let circuit = self.circuit.load();
        let mut out: Vec<ServerStatsSnapshot> = self
            .servers
            .iter()
            .map(|entry| {
                let stats = entry.value();
                ServerStatsSnapshot {
                    server: entry.key().clone(),
                    active_requests: stats.active_requests(),
                    total_requests: stats.total_requests(),
                    failure_count: stats.failure_count(),
                    successive_connection_failures: stats.successive_connection_failures(),
                    circuit_tripped: stats.is_circuit_tripped(&circuit, now),
                    mean_response_time_ms: stats
                        .mean_response_time()
                        .map(|d| d.as_secs_f64() * 1000.0),
                    samples: stats.sample_count(),
                }
            })
            .collect();
        out.sort_by(|a, b| a.server.cmp(&b.server));
        out
    }
}

/// Serializable view of one server's counters.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatsSnapshot {
    pub server: String,
    pub active_requests: usize,
    pub total_requests: u64,
    pub failure_count: u64,
    pub successive_connection_failures: u32,
    pub circuit_tripped: bool,
    pub mean_response_time_ms: Option<f64>,
    pub samples: usize,
}

/// RAII guard around one in-flight attempt.
#[derive(Debug)]
pub struct AttemptGuard {
    registry: Arc<ServerStatsRegistry>,
    server: ServerIdentity,
    started: Instant,
    finished: bool,
}

impl AttemptGuard {
    /// Record completion and return the elapsed time.
    pub fn finish(mut self, success: bool) -> Duration {
        let elapsed = self.started.elapsed();
        self.registry.record_attempt_end(&self.server, elapsed, success);
        self.finished = true;
        elapsed
    }
}

impl Deref for AttemptGuard {
    type Target = ServerIdentity;
    fn deref(&self) -> &Self::Target {
        &self.server
    }
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.registry
                .record_attempt_end(&self.server, self.started.elapsed(), false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(port: u16) -> ServerIdentity {
        ServerIdentity::new("127.0.0.1", port)
    }

    #[test]
    fn test_concurrent_attempts_balance_out() {
        let registry = Arc::new(ServerStatsRegistry::default());
        let target = server(8080);
        let threads = 16;
        let per_thread = 250;

        std::thread::scope(|scope| {
            for _ in 0..threads {
                let registry = registry.clone();
                let target = target.clone();
                scope.spawn(move || {
                    for _ in 0..per_thread {
                        registry.record_attempt_start(&target);
                        registry.record_attempt_end(&target, Duration::from_micros(50), true);
                    }
                });
            }
        });

        let stats = registry.stats(&target);
        assert_eq!(stats.active_requests(), 0);
        assert_eq!(stats.total_requests(), (threads * per_thread) as u64);
    }

    #[test]
    fn test_guard_records_on_drop() {
        let registry = Arc::new(ServerStatsRegistry::default());
        let target = server(8081);
        {
            let _guard = registry.start_attempt(&target);
            assert_eq!(registry.active_requests(&target), 1);
        }
        let stats = registry.stats(&target);
        assert_eq!(stats.active_requests(), 0);
        assert_eq!(stats.failure_count(), 1);

        let guard = registry.start_attempt(&target);
        guard.finish(true);
        assert_eq!(stats.total_requests(), 2);
        assert_eq!(stats.failure_count(), 1);
    }

    #[test]
    fn test_circuit_failure_and_reset() {
        let registry = ServerStatsRegistry::default();
        let target = server(8082);
        assert!(!registry.record_circuit_failure(&target));
        assert!(!registry.record_circuit_failure(&target));
        assert!(registry.record_circuit_failure(&target));
        assert!(registry.is_circuit_tripped(&target));

        registry.record_circuit_success(&target);
        assert_eq!(registry.stats(&target).successive_connection_failures(), 0);
        assert!(!registry.is_circuit_tripped(&target));
    }

    #[test]
    fn test_circuit_settings_reload() {
        let registry = ServerStatsRegistry::default();
        let target = server(8083);
        for _ in 0..3 {
            registry.record_circuit_failure(&target);
        }
        assert!(registry.is_circuit_tripped(&target));
        assert!(registry.remaining_blackout(&target) > Duration::from_secs(9));

        registry.reload_circuit(CircuitBreakerConfig {
            connection_failure_threshold: 5,
            ..Default::default()
        });
        assert_eq!(registry.circuit_config().connection_failure_threshold, 5);
        assert!(!registry.is_circuit_tripped(&target));
        assert_eq!(registry.remaining_blackout(&target), Duration::ZERO);
        assert_eq!(registry.stats(&target).successive_connection_failures(), 3);
    }

    #[test]
    fn test_snapshot_and_evict() {
        let registry = ServerStatsRegistry::default();
        registry.record_attempt_start(&server(9001));
        registry.record_attempt_start(&server(9000));
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].server, "127.0.0.1:9000");
        assert_eq!(snapshot[0].active_requests, 1);

        registry.evict(&server(9000));
        assert!(registry.get(&server(9000)).is_none());
        assert_eq!(registry.snapshot().len(), 1);
    }
}

//! Per-server counters.
//!
//! # Responsibilities
//! - Track in-flight and total requests for one server
//! - Track successive connection failures for circuit tripping
//! - Keep a small window of recent response times
//!
//! # Design Decisions
//! - Every field is an independent atomic; no lock is taken on the request path
//! - Response-time samples live in a fixed ring indexed by an atomic cursor

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::CircuitBreakerConfig;

/// Number of response-time samples retained per server.
pub const SAMPLE_WINDOW: usize = 64;

/// Exponent cap for the blackout period, matching the classic client-side LB behavior.
const MAX_BLACKOUT_EXPONENT: u32 = 16;

/// Counters for a single server. Shared between all in-flight calls.
#[derive(Debug)]
pub struct ServerStats {
    active_requests: AtomicUsize,
    total_requests: AtomicU64,
    failure_count: AtomicU64,
    successive_connection_failures: AtomicU32,
    /// Millis since registry epoch plus one; zero means "never failed".
    last_connection_failure: AtomicU64,
    samples: [AtomicU64; SAMPLE_WINDOW],
    sample_cursor: AtomicU64,
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            active_requests: AtomicUsize::new(0),
            total_requests: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            successive_connection_failures: AtomicU32::new(0),
            last_connection_failure: AtomicU64::new(0),
            samples: std::array::from_fn(|_| AtomicU64::new(0)),
            sample_cursor: AtomicU64::new(0),
        }
    }

    pub fn active_requests(&self) -> usize {
        self.active_requests.load(Ordering::Relaxed)
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn successive_connection_failures(&self) -> u32 {
        self.successive_connection_failures.load(Ordering::Relaxed)
    }

    pub(crate) fn note_open(&self) {
        self.active_requests.fetch_add(1, Ordering::Relaxed);
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_close(&self, elapsed: Duration, success: bool) {
        // Saturating: an unmatched close must not wrap the gauge.
        let _ = self
            .active_requests
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));

        if !success {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
        }

        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        let slot = self.sample_cursor.fetch_add(1, Ordering::Relaxed) as usize % SAMPLE_WINDOW;
        self.samples[slot].store(micros, Ordering::Relaxed);
    }

    pub(crate) fn note_connection_failure(&self, now_ms: u64) -> u32 {
        self.last_connection_failure
            .store(now_ms.saturating_add(1), Ordering::Relaxed);
        self.successive_connection_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn clear_connection_failures(&self) {
        self.successive_connection_failures.store(0, Ordering::Relaxed);
    }

    /// Number of samples recorded so far, capped at the window size.
    pub fn sample_count(&self) -> usize {
        (self.sample_cursor.load(Ordering::Relaxed) as usize).min(SAMPLE_WINDOW)
    }

    /// Recent response times, oldest first.
    pub fn recent_response_times(&self) -> Vec<Duration> {
        let written = self.sample_cursor.load(Ordering::Relaxed) as usize;
        let count = written.min(SAMPLE_WINDOW);
        let start = written - count;
        (start..written)
            .map(|i| Duration::from_micros(self.samples[i % SAMPLE_WINDOW].load(Ordering::Relaxed)))
            .collect()
    }

    /// Mean of the retained samples, if any.
    pub fn mean_response_time(&self) -> Option<Duration> {
        let samples = self.recent_response_times();
        if samples.is_empty() {
            return None;
        }
        let total: Duration = samples.iter().sum();
        Some(total / samples.len() as u32)
    }

    /// Blackout length implied by the current successive-failure count.
    pub fn blackout_period(&self, config: &CircuitBreakerConfig) -> Duration {
        let failures = self.successive_connection_failures();
        if config.connection_failure_threshold == 0 || failures < config.connection_failure_threshold {
            return Duration::ZERO;
        }
        let exponent = (failures - config.connection_failure_threshold).min(MAX_BLACKOUT_EXPONENT);
        let secs = (1u64 << exponent)
            .saturating_mul(config.tripped_timeout_factor_secs)
            .min(config.max_tripped_timeout_secs);
        Duration::from_secs(secs)
    }

    /// True while `now_ms` falls inside the blackout following the last connection failure.
    pub fn is_circuit_tripped(&self, config: &CircuitBreakerConfig, now_ms: u64) -> bool {
        !self.remaining_blackout(config, now_ms).is_zero()
    }

    /// Blackout time left at `now_ms`.
    pub fn remaining_blackout(&self, config: &CircuitBreakerConfig, now_ms: u64) -> Duration {
        let blackout = self.blackout_period(config);
        let last = self.last_connection_failure.load(Ordering::Relaxed);
        if blackout.is_zero() || last == 0 {
            return Duration::ZERO;
        }
        let tripped_until = (last - 1).saturating_add(blackout.as_millis() as u64);
        Duration::from_millis(tripped_until.saturating_sub(now_ms))
    }
}

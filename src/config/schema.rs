//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Default namespace applied to every service.
    pub defaults: ServiceProperties,

    /// Per-service server lists and overrides, keyed by logical service name.
    pub services: BTreeMap<String, ServiceConfig>,

    /// Blackout rules for servers with successive connection failures.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Fully-populated settings for one service.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceProperties {
    /// Retries against the server that just failed.
    pub max_retries_same_server: u32,

    /// Hops to a freshly chosen server once same-server retries are spent.
    pub max_retries_next_server: u32,

    /// Retry non-GET requests too.
    pub retry_on_all_operations: bool,

    /// Comma-separated status codes that trigger a retry (e.g. "502,503").
    pub retryable_status_codes: String,

    /// Per-attempt connect timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Per-attempt read timeout in milliseconds.
    pub read_timeout_ms: u64,

    /// Forces https on or off regardless of what the server reports.
    pub is_secure: Option<bool>,

    /// Master switch; when false every call makes a single attempt.
    pub retry_enabled: bool,

    /// Server selection rule.
    pub rule: RuleKind,

    /// Delay between attempts.
    pub backoff: BackoffConfig,
}

impl Default for ServiceProperties {
    fn default() -> Self {
        Self {
            max_retries_same_server: 0,
            max_retries_next_server: 1,
            retry_on_all_operations: false,
            retryable_status_codes: String::new(),
            connect_timeout_ms: 1000,
            read_timeout_ms: 1000,
            is_secure: None,
            retry_enabled: true,
            rule: RuleKind::RoundRobin,
            backoff: BackoffConfig::None,
        }
    }
}

impl ServiceProperties {
    /// Copy of `self` with every field set in `overrides` replaced.
    pub fn merged(&self, overrides: &ServiceOverrides) -> Self {
        Self {
            max_retries_same_server: overrides
                .max_retries_same_server
                .unwrap_or(self.max_retries_same_server),
            max_retries_next_server: overrides
                .max_retries_next_server
                .unwrap_or(self.max_retries_next_server),
            retry_on_all_operations: overrides
                .retry_on_all_operations
                .unwrap_or(self.retry_on_all_operations),
            retryable_status_codes: overrides
                .retryable_status_codes
                .clone()
                .unwrap_or_else(|| self.retryable_status_codes.clone()),
            connect_timeout_ms: overrides.connect_timeout_ms.unwrap_or(self.connect_timeout_ms),
            read_timeout_ms: overrides.read_timeout_ms.unwrap_or(self.read_timeout_ms),
            is_secure: overrides.is_secure.or(self.is_secure),
            retry_enabled: overrides.retry_enabled.unwrap_or(self.retry_enabled),
            rule: overrides.rule.unwrap_or(self.rule),
            backoff: overrides.backoff.clone().unwrap_or_else(|| self.backoff.clone()),
        }
    }
}

/// Optional per-field overrides. Used both in `[services.<name>]` and at call time.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceOverrides {
    pub max_retries_same_server: Option<u32>,
    pub max_retries_next_server: Option<u32>,
    pub retry_on_all_operations: Option<bool>,
    pub retryable_status_codes: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    pub is_secure: Option<bool>,
    pub retry_enabled: Option<bool>,
    pub rule: Option<RuleKind>,
    pub backoff: Option<BackoffConfig>,
}

/// One logical service.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Server addresses (`host:port`, `http://host:port`, `https://host:port`).
    #[serde(default)]
    pub servers: Vec<String>,

    #[serde(flatten)]
    pub overrides: ServiceOverrides,
}

/// Selection rule used by the static directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    #[default]
    RoundRobin,
    LeastConnections,
    Random,
}

/// Backoff between attempts.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffConfig {
    #[default]
    None,
    Fixed {
        delay_ms: u64,
    },
    Exponential {
        base_delay_ms: u64,
        max_delay_ms: u64,
    },
}

/// Circuit blackout configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Successive connection failures before a server is blacked out. Zero disables.
    pub connection_failure_threshold: u32,

    /// Blackout base in seconds, doubled for every failure past the threshold.
    pub tripped_timeout_factor_secs: u64,

    /// Upper bound of the blackout in seconds.
    pub max_tripped_timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            connection_failure_threshold: 3,
            tripped_timeout_factor_secs: 10,
            max_tripped_timeout_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

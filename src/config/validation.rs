//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check every server address parses and is unique within its service
//! - Validate value ranges (timeouts > 0, backoff bounds)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Retryable status codes are never rejected; malformed tokens are dropped at parse time
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use crate::config::schema::{BackoffConfig, ClientConfig, ServiceProperties};
use crate::load_balancer::ServerIdentity;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{scope}: {field} must be greater than zero")]
    ZeroValue { scope: String, field: &'static str },

    #[error("{scope}: exponential backoff base {base_ms}ms exceeds max {max_ms}ms")]
    BackoffBounds { scope: String, base_ms: u64, max_ms: u64 },

    #[error("service '{service}': {reason}")]
    InvalidServer { service: String, reason: String },

    #[error("service '{service}': duplicate server {server}")]
    DuplicateServer { service: String, server: String },

    #[error("unknown log level '{0}'")]
    LogLevel(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_properties("defaults", &config.defaults, &mut errors);

    for (name, service) in &config.services {
        let scope = format!("service '{}'", name);
        let effective = config.defaults.merged(&service.overrides);
        check_properties(&scope, &effective, &mut errors);

        let mut seen = HashSet::new();
        for address in &service.servers {
            match ServerIdentity::parse(address) {
                Ok(server) => {
                    if !seen.insert(server.host_port()) {
                        errors.push(ValidationError::DuplicateServer {
                            service: name.clone(),
                            server: server.host_port(),
                        });
                    }
                }
                Err(e) => errors.push(ValidationError::InvalidServer {
                    service: name.clone(),
                    reason: e.to_string(),
                }),
            }
        }
    }

    if !LOG_LEVELS.contains(&config.logging.level.to_lowercase().as_str()) {
        errors.push(ValidationError::LogLevel(config.logging.level.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_properties(scope: &str, props: &ServiceProperties, errors: &mut Vec<ValidationError>) {
    if props.connect_timeout_ms == 0 {
        errors.push(ValidationError::ZeroValue {
            scope: scope.to_string(),
            field: "connect_timeout_ms",
        });
    }
    if props.read_timeout_ms == 0 {
        errors.push(ValidationError::ZeroValue {
            scope: scope.to_string(),
            field: "read_timeout_ms",
        });
    }
    match props.backoff {
        BackoffConfig::None => {}
        BackoffConfig::Fixed { delay_ms } => {
            if delay_ms == 0 {
                errors.push(ValidationError::ZeroValue {
                    scope: scope.to_string(),
                    field: "backoff.delay_ms",
                });
            }
        }
        BackoffConfig::Exponential { base_delay_ms, max_delay_ms } => {
            if base_delay_ms == 0 {
                errors.push(ValidationError::ZeroValue {
                    scope: scope.to_string(),
                    field: "backoff.base_delay_ms",
                });
            }
            if base_delay_ms > max_delay_ms {
                errors.push(ValidationError::BackoffBounds {
                    scope: scope.to_string(),
                    base_ms: base_delay_ms,
                    max_ms: max_delay_ms,
                });
            }
        }
    }
}

//! Resolved, atomically swappable service settings.
//!
//! # Responsibilities
//! - Resolve `[defaults]` plus `[services.<name>]` into one immutable snapshot per service
//! - Hand out snapshots without locking
//! - Swap in a whole new set of snapshots on reload
//!
//! # Design Decisions
//! - Readers clone an `Arc`; a reload never mutates a snapshot in place
//! - Unknown services fall back to the defaults namespace

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::schema::{ClientConfig, ServiceOverrides, ServiceProperties};
use crate::http::TransportOptions;
use crate::resilience::RetryBudget;

/// Everything the executor needs to know about one service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSettings {
    pub properties: ServiceProperties,
    pub budget: RetryBudget,
    pub transport: TransportOptions,
}

impl ServiceSettings {
    pub fn from_properties(properties: ServiceProperties) -> Self {
        Self {
            budget: RetryBudget::from_properties(&properties),
            transport: TransportOptions::from_properties(&properties),
            properties,
        }
    }

    /// Settings for a single call with `overrides` applied on top.
    pub fn with_overrides(&self, overrides: &ServiceOverrides) -> Self {
        Self::from_properties(self.properties.merged(overrides))
    }

    pub fn is_secure(&self) -> Option<bool> {
        self.properties.is_secure
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from_properties(ServiceProperties::default())
    }
}

#[derive(Debug)]
struct Resolved {
    config: Arc<ClientConfig>,
    defaults: Arc<ServiceSettings>,
    services: HashMap<String, Arc<ServiceSettings>>,
}

impl Resolved {
    fn new(config: ClientConfig) -> Self {
        let defaults = Arc::new(ServiceSettings::from_properties(config.defaults.clone()));
        let services = config
            .services
            .iter()
            .map(|(name, service)| {
                let props = config.defaults.merged(&service.overrides);
                (name.clone(), Arc::new(ServiceSettings::from_properties(props)))
            })
            .collect();
        Self {
            config: Arc::new(config),
            defaults,
            services,
        }
    }
}

/// Lock-free holder of the current configuration.
#[derive(Debug)]
pub struct ConfigStore {
    current: ArcSwap<Resolved>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::from_config(ClientConfig::default())
    }
}

impl ConfigStore {
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(Resolved::new(config)),
        }
    }

    /// Snapshot for `service`, or the defaults if the service is not configured.
    pub fn settings_for(&self, service: &str) -> Arc<ServiceSettings> {
        let current = self.current.load();
        current
            .services
            .get(service)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&current.defaults))
    }

    /// The configuration the current snapshots were resolved from.
    pub fn config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.current.load().config)
    }

    /// Replace every snapshot at once.
    pub fn reload(&self, config: ClientConfig) {
        let services = config.services.len();
        self.current.store(Arc::new(Resolved::new(config)));
        tracing::info!(services, "Configuration snapshot swapped");
    }
}

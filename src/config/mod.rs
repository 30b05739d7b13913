//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → store.rs (one immutable ServiceSettings per service)
//!     → shared via Arc with the executor
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap of the store, directory server lists refreshed
//! ```
//!
//! # Design Decisions
//! - Snapshots are immutable; changes require a full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Per-call overrides are merged into a private copy, never into the store

pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BackoffConfig, CircuitBreakerConfig, ClientConfig, LogFormat, LoggingConfig, RuleKind,
    ServiceConfig, ServiceOverrides, ServiceProperties,
};
pub use store::{ConfigStore, ServiceSettings};
pub use validation::{validate_config, ValidationError};
pub use watcher::{spawn_reload_task, ConfigWatcher};

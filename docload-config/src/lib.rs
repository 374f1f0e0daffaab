//! Domain-driven configuration management for docload
//!
//! Configuration is split by functional domain (data store endpoints, scenario
//! shape, metrics, logging), with validation, defaults, and environment
//! variable support.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    datastore::DataStoreConfig,
    logging::{LogFormat, LogLevel, LogTarget, LoggingConfig},
    metrics::MetricsConfig,
    scenario::{BatchErrorPolicyConfig, FeedType, ScenarioConfig, ScenarioKind, UserCredConfig},
    DocloadConfig,
};

// Re-export utilities
pub use domains::utils::{serde_duration, serde_duration_ms};

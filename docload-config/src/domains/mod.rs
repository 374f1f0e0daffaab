//! Domain-specific configuration modules

pub mod datastore;
pub mod logging;
pub mod metrics;
pub mod scenario;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main docload configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DocloadConfig {
    /// Identifier scoping channel and user names to one run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Document service endpoints
    #[serde(default)]
    pub datastore: datastore::DataStoreConfig,

    /// Load shape
    #[serde(default)]
    pub scenario: scenario::ScenarioConfig,

    /// Metrics export
    #[serde(default)]
    pub metrics: metrics::MetricsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl DocloadConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.datastore.validate()?;
        self.scenario.validate()?;
        self.metrics.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// The configured session id, or a freshly generated one
    pub fn session_id_or_generate(&self) -> String {
        match &self.session_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => {
                let mut id = uuid::Uuid::new_v4().simple().to_string();
                id.truncate(8);
                id
            }
        }
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = DocloadConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}

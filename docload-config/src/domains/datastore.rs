//! Data store endpoint configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_string, validate_url, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where the document service lives and how to talk to it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataStoreConfig {
    /// Public database endpoint, e.g. `http://localhost:4984/db`
    #[serde(default = "default_url")]
    pub url: String,

    /// Admin database endpoint used for user provisioning
    #[serde(default = "default_admin_url")]
    pub admin_url: String,

    /// Request timeout
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_timeout"
    )]
    pub timeout: Duration,

    /// User agent string
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Whether to verify SSL certificates
    #[serde(default = "crate::domains::utils::default_true")]
    pub verify_ssl: bool,

    /// Maximum idle connections per host
    #[serde(default = "default_max_idle_per_host")]
    pub max_idle_per_host: usize,

    /// Heartbeat sent with longpoll changes requests, in milliseconds
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
}

impl Default for DataStoreConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            admin_url: default_admin_url(),
            timeout: default_timeout(),
            user_agent: default_user_agent(),
            verify_ssl: true,
            max_idle_per_host: default_max_idle_per_host(),
            heartbeat_ms: default_heartbeat_ms(),
        }
    }
}

impl Validatable for DataStoreConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_url(&self.url, "url", self.domain_name())?;
        validate_url(&self.admin_url, "admin_url", self.domain_name())?;
        validate_positive(self.timeout.as_secs(), "timeout", self.domain_name())?;
        validate_required_string(&self.user_agent, "user_agent", self.domain_name())?;
        validate_positive(self.max_idle_per_host, "max_idle_per_host", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "datastore"
    }
}

fn default_url() -> String {
    "http://localhost:4984/db".to_string()
}

fn default_admin_url() -> String {
    "http://localhost:4985/db".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_user_agent() -> String {
    format!("docload/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_idle_per_host() -> usize {
    100
}

fn default_heartbeat_ms() -> u64 {
    30_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datastore_defaults() {
        let config = DataStoreConfig::default();
        assert_eq!(config.heartbeat_ms, 30_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_datastore_validation() {
        let mut config = DataStoreConfig::default();
        config.admin_url = "localhost:4985".to_string();
        assert!(config.validate().is_err());

        config = DataStoreConfig::default();
        config.timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}

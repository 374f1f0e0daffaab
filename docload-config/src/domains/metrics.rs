//! Metrics export configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_string, validate_url, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// When false every agent records into a no-op sink
    #[serde(default = "crate::domains::utils::default_false")]
    pub enabled: bool,

    /// Push gateway endpoint metrics are exported to
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Prefix prepended to every metric name
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// How often metrics are pushed
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_push_interval"
    )]
    pub push_interval: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_endpoint(),
            prefix: default_prefix(),
            push_interval: default_push_interval(),
        }
    }
}

impl Validatable for MetricsConfig {
    fn validate(&self) -> ConfigResult<()> {
        if !self.enabled {
            return Ok(());
        }
        validate_url(&self.endpoint, "endpoint", self.domain_name())?;
        validate_required_string(&self.prefix, "prefix", self.domain_name())?;
        validate_positive(self.push_interval.as_secs(), "push_interval", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "metrics"
    }
}

fn default_endpoint() -> String {
    "http://localhost:9091/metrics/job/docload".to_string()
}

fn default_prefix() -> String {
    "docload".to_string()
}

fn default_push_interval() -> Duration {
    Duration::from_secs(10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_metrics_skip_validation() {
        let config = MetricsConfig {
            enabled: false,
            endpoint: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = MetricsConfig {
            enabled: true,
            endpoint: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

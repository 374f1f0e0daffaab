//! Configuration loading and environment variable handling

use crate::domains::DocloadConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;
use std::str::FromStr;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "DOCLOAD".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<DocloadConfig> {
        let content = std::fs::read_to_string(path)?;
        let mut config: DocloadConfig = serde_yaml::from_str(&content)?;

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<DocloadConfig> {
        let mut config = DocloadConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<DocloadConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut DocloadConfig) -> ConfigResult<()> {
        if let Ok(session) = self.get_env_var("SESSION_ID") {
            config.session_id = Some(session);
        }

        self.apply_datastore_overrides(&mut config.datastore)?;
        self.apply_scenario_overrides(&mut config.scenario)?;
        self.apply_metrics_overrides(&mut config.metrics)?;
        self.apply_logging_overrides(&mut config.logging)?;

        Ok(())
    }

    fn apply_datastore_overrides(
        &self,
        config: &mut crate::domains::datastore::DataStoreConfig,
    ) -> ConfigResult<()> {
        if let Ok(url) = self.get_env_var("URL") {
            config.url = url;
        }

        if let Ok(admin_url) = self.get_env_var("ADMIN_URL") {
            config.admin_url = admin_url;
        }

        if let Some(seconds) = self.parse_env_var::<u64>("HTTP_TIMEOUT")? {
            config.timeout = std::time::Duration::from_secs(seconds);
        }

        Ok(())
    }

    fn apply_scenario_overrides(
        &self,
        config: &mut crate::domains::scenario::ScenarioConfig,
    ) -> ConfigResult<()> {
        if let Some(v) = self.parse_env_var("NUM_WRITERS")? {
            config.num_writers = v;
        }
        if let Some(v) = self.parse_env_var("NUM_READERS")? {
            config.num_readers = v;
        }
        if let Some(v) = self.parse_env_var("NUM_UPDATERS")? {
            config.num_updaters = v;
        }
        if let Some(v) = self.parse_env_var("NUM_CHANNELS")? {
            config.num_channels = v;
        }
        if let Some(v) = self.parse_env_var("NUM_DOCS")? {
            config.num_docs = v;
        }
        if let Some(v) = self.parse_env_var("DOC_SIZE_BYTES")? {
            config.doc_size_bytes = v;
        }
        if let Some(v) = self.parse_env_var("BATCH_SIZE")? {
            config.batch_size = v;
        }
        if let Some(ms) = self.parse_env_var::<u64>("DELAY_MS")? {
            config.delay_between_ops_ms = std::time::Duration::from_millis(ms);
        }
        if let Some(v) = self.parse_env_var("FEED_TYPE")? {
            config.feed_type = v;
        }
        if let Some(v) = self.parse_env_var("MAX_CONCURRENT_CREATE_USER")? {
            config.max_concurrent_create_user = v;
        }

        Ok(())
    }

    fn apply_metrics_overrides(
        &self,
        config: &mut crate::domains::metrics::MetricsConfig,
    ) -> ConfigResult<()> {
        if let Some(enabled) = self.parse_env_var("METRICS_ENABLED")? {
            config.enabled = enabled;
        }

        if let Ok(endpoint) = self.get_env_var("METRICS_ENDPOINT") {
            config.endpoint = endpoint;
        }

        if let Ok(prefix) = self.get_env_var("METRICS_PREFIX") {
            config.prefix = prefix;
        }

        Ok(())
    }

    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Some(level) = self.parse_env_var("LOG_LEVEL")? {
            config.level = level;
        }

        if let Some(format) = self.parse_env_var("LOG_FORMAT")? {
            config.format = format;
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }

    /// Parse an optional prefixed environment variable
    fn parse_env_var<T>(&self, name: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_env_var(name) {
            Ok(raw) => raw.parse::<T>().map(Some).map_err(|e| {
                ConfigError::EnvError(format!("Invalid {}_{}: {}", self.prefix, name, e))
            }),
            Err(_) => Ok(None),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

//! HTTP adapter configuration

use docload_config::DataStoreConfig;
use std::time::Duration;

/// Settings the adapter needs, derived from the data store domain config
#[derive(Debug, Clone)]
pub struct HttpStoreConfig {
    /// Public database endpoint
    pub url: String,

    /// Admin database endpoint
    pub admin_url: String,

    /// Request timeout
    pub timeout: Duration,

    /// User agent string
    pub user_agent: String,

    /// Whether to verify SSL certificates
    pub verify_ssl: bool,

    /// Maximum idle connections per host
    pub max_idle_per_host: usize,

    /// Longpoll heartbeat in milliseconds
    pub heartbeat_ms: u64,
}

impl Default for HttpStoreConfig {
    fn default() -> Self {
        DataStoreConfig::default().into()
    }
}

impl From<DataStoreConfig> for HttpStoreConfig {
    fn from(config: DataStoreConfig) -> Self {
        Self {
            url: config.url.trim_end_matches('/').to_string(),
            admin_url: config.admin_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
            user_agent: config.user_agent,
            verify_ssl: config.verify_ssl,
            max_idle_per_host: config.max_idle_per_host,
            heartbeat_ms: config.heartbeat_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slashes_trimmed() {
        let config: HttpStoreConfig = DataStoreConfig {
            url: "http://sg:4984/db/".to_string(),
            admin_url: "http://sg:4985/db//".to_string(),
            ..Default::default()
        }
        .into();
        assert_eq!(config.url, "http://sg:4984/db");
        assert_eq!(config.admin_url, "http://sg:4985/db");
        assert_eq!(config.heartbeat_ms, 30_000);
    }
}

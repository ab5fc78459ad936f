//! Cache Configuration

use gk_common::{GkError, GkResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries (attribute + flow) across all devices
    pub capacity: usize,
    /// Expiry applied when a request does not carry its own TTL
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: crate::DEFAULT_CAPACITY,
            default_ttl_secs: crate::DEFAULT_TTL.as_secs(),
        }
    }
}

impl CacheConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &str) -> GkResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            serde_json::from_str(&content).map_err(|e| GkError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save to file
    pub fn save(&self, path: &str) -> GkResult<()> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| GkError::ConfigError(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject configurations the cache cannot run with
    pub fn validate(&self) -> GkResult<()> {
        if self.capacity == 0 {
            return Err(GkError::ConfigError("capacity must be greater than 0".into()));
        }
        Ok(())
    }

    /// Default TTL as a duration
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

//! Cache configuration with TTL settings.

use std::time::Duration;

use integration_overpass::{OverpassError, OverpassResult};
use serde::{Deserialize, Serialize};

/// Cache sizes and TTLs for the OSM caches
///
/// `max_size` bounds each of the buildings and boundaries caches; the raw
/// query cache gets a third of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Estimated bytes per cache (default: 50 MiB)
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Default TTL in milliseconds, used for buildings (default: 10 minutes)
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    /// TTL for boundary lookups (default: 1 hour)
    #[serde(default = "default_boundaries_ttl_ms")]
    pub boundaries_ttl_ms: u64,

    /// TTL for boundary name searches (default: 2 hours)
    #[serde(default = "default_search_ttl_ms")]
    pub search_ttl_ms: u64,

    /// TTL for raw Overpass responses (default: 5 minutes)
    #[serde(default = "default_query_ttl_ms")]
    pub query_ttl_ms: u64,

    /// Background cleanup period (default: 1 minute)
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,
}

const fn default_max_size() -> usize {
    50 * 1024 * 1024
}

const fn default_ttl_ms() -> u64 {
    10 * 60 * 1000
}

const fn default_boundaries_ttl_ms() -> u64 {
    60 * 60 * 1000
}

const fn default_search_ttl_ms() -> u64 {
    2 * 60 * 60 * 1000
}

const fn default_query_ttl_ms() -> u64 {
    5 * 60 * 1000
}

const fn default_cleanup_interval_ms() -> u64 {
    60 * 1000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            ttl_ms: default_ttl_ms(),
            boundaries_ttl_ms: default_boundaries_ttl_ms(),
            search_ttl_ms: default_search_ttl_ms(),
            query_ttl_ms: default_query_ttl_ms(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub const fn buildings_ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    #[must_use]
    pub const fn boundaries_ttl(&self) -> Duration {
        Duration::from_millis(self.boundaries_ttl_ms)
    }

    #[must_use]
    pub const fn search_ttl(&self) -> Duration {
        Duration::from_millis(self.search_ttl_ms)
    }

    #[must_use]
    pub const fn query_ttl(&self) -> Duration {
        Duration::from_millis(self.query_ttl_ms)
    }

    #[must_use]
    pub const fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    /// Capacity of the raw query cache
    #[must_use]
    pub const fn query_max_size(&self) -> usize {
        self.max_size / 3
    }

    /// Validate sizes and durations
    ///
    /// # Errors
    ///
    /// Returns `OverpassError::Configuration` for a zero size, TTL or
    /// cleanup interval.
    pub fn validate(&self) -> OverpassResult<()> {
        if self.max_size == 0 {
            return Err(OverpassError::Configuration(
                "cache.max_size must be greater than 0".to_string(),
            ));
        }
        let durations = [
            ("ttl_ms", self.ttl_ms),
            ("boundaries_ttl_ms", self.boundaries_ttl_ms),
            ("search_ttl_ms", self.search_ttl_ms),
            ("query_ttl_ms", self.query_ttl_ms),
            ("cleanup_interval_ms", self.cleanup_interval_ms),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, value)| *value == 0) {
            return Err(OverpassError::Configuration(format!(
                "cache.{name} must be greater than 0"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.buildings_ttl(), Duration::from_secs(600));
        assert_eq!(config.boundaries_ttl(), Duration::from_secs(3600));
        assert_eq!(config.search_ttl(), Duration::from_secs(7200));
        assert_eq!(config.query_ttl(), Duration::from_secs(300));
        assert_eq!(config.query_max_size(), config.max_size / 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_values_rejected() {
        let config = CacheConfig {
            query_ttl_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(OverpassError::Configuration(msg)) if msg.contains("query_ttl_ms")
        ));

        let config = CacheConfig {
            max_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: CacheConfig = serde_json::from_str(r#"{"ttl_ms": 1000}"#).unwrap();
        assert_eq!(config.ttl_ms, 1000);
        assert_eq!(config.max_size, default_max_size());
    }
}

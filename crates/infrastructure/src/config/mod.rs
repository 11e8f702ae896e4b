//! Application configuration
//!
//! Split into focused sub-modules:
//! - `cache`: cache sizes and TTLs
//!
//! HTTP settings live next to the client in `integration_overpass`.

mod cache;

use std::path::Path;

use integration_overpass::{HttpConfig, OverpassResult};
use serde::{Deserialize, Serialize};

use crate::telemetry::TelemetryConfig;

pub use cache::CacheConfig;

/// Prefix for environment overrides, e.g. `OSM_HTTP__TIMEOUT_MS=20000`
pub const ENV_PREFIX: &str = "OSM";

/// Configuration of one OSM client instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OsmClientConfig {
    /// Overpass servers, timeouts, rate limiting and retries
    #[serde(default)]
    pub http: HttpConfig,

    /// Cache sizes and TTLs
    #[serde(default)]
    pub cache: CacheConfig,

    /// Log OSM operations at debug level
    #[serde(default)]
    pub debug: bool,
}

impl OsmClientConfig {
    /// Configuration for tests against local mock servers
    #[must_use]
    pub fn for_testing(servers: Vec<String>) -> Self {
        Self {
            http: HttpConfig {
                servers,
                ..HttpConfig::for_testing()
            },
            ..Default::default()
        }
    }

    /// Validate the HTTP and cache sections
    ///
    /// # Errors
    ///
    /// Returns `OverpassError::Configuration` describing the first problem.
    pub fn validate(&self) -> OverpassResult<()> {
        self.http.validate()?;
        self.cache.validate()
    }
}

/// Top-level configuration: the client plus logging
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(flatten)]
    pub osm: OsmClientConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load from `osm.toml` in the working directory (if present) and the
    /// environment
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(None)
    }

    /// Load defaults, then `path` (or an optional `osm.toml`), then
    /// `OSM_`-prefixed environment variables
    ///
    /// Nested keys use `__`, and `OSM_HTTP__SERVERS` takes a comma-separated
    /// list.
    pub fn load_from(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("osm").required(false),
        };

        let builder = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("http.servers")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}

//! Overpass HTTP client configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::{OverpassError, OverpassResult};
use crate::retry::RetryConfig;

/// Public Overpass mirrors used when no servers are configured
pub const DEFAULT_SERVERS: [&str; 3] = [
    "https://overpass-api.de/api/interpreter",
    "https://overpass.kumi.systems/api/interpreter",
    "https://overpass.openstreetmap.ru/api/interpreter",
];

/// Configuration for the Overpass HTTP client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Interpreter endpoints, tried in health order
    #[serde(default = "default_servers")]
    pub servers: Vec<String>,

    /// Per-attempt deadline in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Advisory request rate per server
    #[serde(default = "default_rate_limit_rps")]
    pub rate_limit_rps: f64,

    /// Total attempts per server, including the first
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Base backoff delay in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Backoff growth factor
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound for a single backoff delay in milliseconds
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    /// Consecutive failures before a server's circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Time an open circuit waits before allowing a trial request
    #[serde(default = "default_recovery_timeout_ms")]
    pub recovery_timeout_ms: u64,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Accept `http://` URLs for configured hosts (local mirrors)
    #[serde(default)]
    pub allow_insecure_http: bool,
}

fn default_servers() -> Vec<String> {
    DEFAULT_SERVERS.iter().map(ToString::to_string).collect()
}

const fn default_timeout_ms() -> u64 {
    45_000
}

const fn default_rate_limit_rps() -> f64 {
    0.5
}

const fn default_retry_attempts() -> u32 {
    5
}

const fn default_retry_delay_ms() -> u64 {
    3_000
}

const fn default_backoff_multiplier() -> f64 {
    2.0
}

const fn default_max_retry_delay_ms() -> u64 {
    30_000
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_recovery_timeout_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    concat!("osm-overpass-client/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            timeout_ms: default_timeout_ms(),
            rate_limit_rps: default_rate_limit_rps(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            failure_threshold: default_failure_threshold(),
            recovery_timeout_ms: default_recovery_timeout_ms(),
            user_agent: default_user_agent(),
            allow_insecure_http: false,
        }
    }
}

impl HttpConfig {
    /// Create a configuration suitable for testing against local mock servers
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            timeout_ms: 2_000,
            rate_limit_rps: 1_000.0,
            retry_attempts: 2,
            retry_delay_ms: 10,
            max_retry_delay_ms: 50,
            allow_insecure_http: true,
            ..Default::default()
        }
    }

    /// Per-attempt deadline
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Retry policy derived from the backoff settings
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(
            self.retry_attempts,
            self.retry_delay_ms,
            self.backoff_multiplier,
            self.max_retry_delay_ms,
        )
    }

    /// Circuit breaker settings shared by all servers
    #[must_use]
    pub const fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::custom(self.failure_threshold, self.recovery_timeout_ms)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `OverpassError::Configuration` describing the first invalid field.
    pub fn validate(&self) -> OverpassResult<()> {
        if self.servers.is_empty() {
            return Err(OverpassError::Configuration(
                "servers must not be empty".to_string(),
            ));
        }

        for server in &self.servers {
            let url = url::Url::parse(server).map_err(|e| {
                OverpassError::Configuration(format!("invalid server URL '{server}': {e}"))
            })?;
            match url.scheme() {
                "https" => {},
                "http" if self.allow_insecure_http => {},
                scheme => {
                    return Err(OverpassError::Configuration(format!(
                        "server '{server}' uses unsupported scheme '{scheme}'"
                    )));
                },
            }
        }

        if self.timeout_ms == 0 {
            return Err(OverpassError::Configuration(
                "timeout_ms must be greater than 0".to_string(),
            ));
        }

        if !(self.rate_limit_rps.is_finite() && self.rate_limit_rps > 0.0) {
            return Err(OverpassError::Configuration(
                "rate_limit_rps must be a positive number".to_string(),
            ));
        }

        if self.retry_attempts == 0 {
            return Err(OverpassError::Configuration(
                "retry_attempts must be at least 1".to_string(),
            ));
        }

        if self.backoff_multiplier < 1.0 {
            return Err(OverpassError::Configuration(
                "backoff_multiplier must be at least 1.0".to_string(),
            ));
        }

        if self.failure_threshold == 0 {
            return Err(OverpassError::Configuration(
                "failure_threshold must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

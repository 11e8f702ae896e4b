//! Resilient Overpass HTTP client
//!
//! Each configured interpreter URL gets its own circuit breaker and rate
//! limiter. [`OverpassHttpClient::request`] runs one server with retries;
//! [`OverpassClient::execute_query`] walks the servers in health order until
//! one answers.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;

use domain::text::{check_allowed_url, hosts_from_urls};

use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::config::HttpConfig;
use crate::error::{OverpassError, OverpassResult};
use crate::metrics::{MetricsRecorder, MetricsSummary, QueryMetrics};
use crate::rate_limiter::RateLimiter;
use crate::retry::{RetryConfig, with_retry};

/// Longest response body excerpt kept in an HTTP error message
const ERROR_BODY_EXCERPT: usize = 200;

/// Health snapshot of one configured server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHealth {
    pub url: String,
    pub circuit_state: CircuitState,
    pub consecutive_failures: u32,
    /// Whether the breaker would admit a request right now
    pub available: bool,
    /// Requests sent within the current rate-limit window
    pub window_usage: usize,
}

/// Trait for Overpass query execution
#[async_trait]
pub trait OverpassClient: Send + Sync {
    /// Execute Overpass QL and return the raw response body
    async fn execute_query(&self, query: &str) -> OverpassResult<String>;

    /// Per-server health snapshot
    fn server_health(&self) -> Vec<ServerHealth>;

    /// Aggregate over the recorded attempts
    fn metrics_summary(&self) -> MetricsSummary;
}

#[derive(Debug)]
struct ServerState {
    url: String,
    breaker: CircuitBreaker,
    limiter: RateLimiter,
}

/// Overpass client with per-server circuit breakers, rate limiting and retries
#[derive(Debug)]
pub struct OverpassHttpClient {
    client: Client,
    config: HttpConfig,
    allowed_hosts: HashSet<String>,
    servers: Vec<ServerState>,
    metrics: MetricsRecorder,
}

impl OverpassHttpClient {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns `OverpassError::Configuration` if the configuration is invalid or
    /// the HTTP client cannot be initialized.
    pub fn new(config: HttpConfig) -> OverpassResult<Self> {
        config.validate()?;

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| OverpassError::Configuration(e.to_string()))?;

        let breaker_config = config.circuit_breaker_config();
        let servers = config
            .servers
            .iter()
            .map(|url| ServerState {
                url: url.clone(),
                breaker: CircuitBreaker::with_config(url.clone(), breaker_config),
                limiter: RateLimiter::new(config.rate_limit_rps),
            })
            .collect();

        let allowed_hosts = hosts_from_urls(&config.servers);

        info!(
            servers = config.servers.len(),
            timeout_ms = config.timeout_ms,
            "Overpass HTTP client initialized"
        );

        Ok(Self {
            client,
            config,
            allowed_hosts,
            servers,
            metrics: MetricsRecorder::new(),
        })
    }

    /// Client configuration
    #[must_use]
    pub const fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Recorded per-attempt metrics
    #[must_use]
    pub const fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    /// Close every circuit and forget failure counts
    pub fn reset_circuits(&self) {
        for server in &self.servers {
            server.breaker.reset();
        }
    }

    fn server_for(&self, url: &Url) -> Option<&ServerState> {
        self.servers
            .iter()
            .find(|s| s.url == url.as_str())
            .or_else(|| {
                self.servers.iter().find(|s| {
                    Url::parse(&s.url).is_ok_and(|configured| {
                        configured.host_str() == url.host_str()
                            && configured.port_or_known_default() == url.port_or_known_default()
                    })
                })
            })
    }

    /// POST a query to a single server with retries
    ///
    /// The URL must be `https` (or `http` with `allow_insecure_http`) and its
    /// host must belong to a configured server. `retry` defaults to the policy
    /// derived from the configuration.
    ///
    /// # Errors
    ///
    /// - `Network` if the URL is not allowed or the transport fails
    /// - `CircuitOpen` if the server's breaker rejects the request
    /// - `Timeout` if the last attempt exceeded the deadline
    /// - `Http` for a non-success status that was not (or no longer) retryable
    #[instrument(skip(self, query, retry), fields(query_len = query.len()))]
    pub async fn request(
        &self,
        url: &str,
        query: &str,
        retry: Option<&RetryConfig>,
    ) -> OverpassResult<String> {
        let url = check_allowed_url(url, &self.allowed_hosts, self.config.allow_insecure_http)?;
        let server = self
            .server_for(&url)
            .ok_or_else(|| OverpassError::Network(format!("no server configured for {url}")))?;

        if !server.breaker.can_execute() {
            warn!(server = %server.url, "Circuit breaker preventing request");
            return Err(OverpassError::CircuitOpen {
                server: server.url.clone(),
            });
        }

        let default_retry;
        let retry = if let Some(retry) = retry {
            retry
        } else {
            default_retry = self.config.retry_config();
            &default_retry
        };

        let outcome = with_retry(retry, |attempt| self.attempt(server, &url, query, attempt)).await;

        match outcome.result {
            Ok(body) => {
                server.breaker.record_success();
                debug!(
                    server = %server.url,
                    attempts = outcome.attempts,
                    bytes = body.len(),
                    "Overpass request succeeded"
                );
                Ok(body)
            },
            Err(err) => {
                server.breaker.record_failure();
                warn!(
                    server = %server.url,
                    attempts = outcome.attempts,
                    error = %err,
                    "Overpass request failed"
                );
                Err(err)
            },
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn attempt(
        &self,
        server: &ServerState,
        url: &Url,
        query: &str,
        attempt: u32,
    ) -> OverpassResult<String> {
        server.limiter.acquire().await;

        let started_at = Utc::now();
        let start = Instant::now();
        let timeout_ms = self.config.timeout_ms;
        let result = tokio::time::timeout(self.config.timeout(), self.send(url, query))
            .await
            .unwrap_or(Err(OverpassError::Timeout { timeout_ms }));

        self.metrics.record(QueryMetrics {
            server: server.url.clone(),
            attempt,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            success: result.is_ok(),
            status: match &result {
                Ok(_) => Some(200),
                Err(err) => err.status(),
            },
            error: result.as_ref().err().map(ToString::to_string),
        });

        result
    }

    async fn send(&self, url: &Url, query: &str) -> OverpassResult<String> {
        let timeout_ms = self.config.timeout_ms;
        let transport_error = |e: reqwest::Error| {
            if e.is_timeout() {
                OverpassError::Timeout { timeout_ms }
            } else {
                OverpassError::Network(e.to_string())
            }
        };

        let response = self
            .client
            .post(url.clone())
            .form(&[("data", query)])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.trim().chars().take(ERROR_BODY_EXCERPT).collect();
            let message = if excerpt.is_empty() {
                status.canonical_reason().unwrap_or("unknown status").to_string()
            } else {
                excerpt
            };
            return Err(OverpassError::Http {
                status: status.as_u16(),
                message,
            });
        }

        response.text().await.map_err(transport_error)
    }

    /// Servers ordered by availability, then by fewest consecutive failures
    fn ordered_servers(&self) -> Vec<&ServerState> {
        let mut ordered: Vec<&ServerState> = self.servers.iter().collect();
        ordered.sort_by_key(|s| (!s.breaker.is_available(), s.breaker.consecutive_failures()));
        ordered
    }
}

#[async_trait]
impl OverpassClient for OverpassHttpClient {
    #[instrument(skip(self, query), fields(query_len = query.len()))]
    async fn execute_query(&self, query: &str) -> OverpassResult<String> {
        let mut last_error = None;

        for server in self.ordered_servers() {
            match self.request(&server.url, query, None).await {
                Ok(body) => return Ok(body),
                Err(err) if err.is_client_error() => {
                    warn!(
                        server = %server.url,
                        error = %err,
                        "Client error, not trying other servers"
                    );
                    return Err(err);
                },
                Err(err) => {
                    debug!(server = %server.url, error = %err, "Server failed, trying next");
                    last_error = Some(err);
                },
            }
        }

        Err(last_error
            .unwrap_or_else(|| OverpassError::Configuration("no servers configured".to_string())))
    }

    fn server_health(&self) -> Vec<ServerHealth> {
        self.servers
            .iter()
            .map(|s| ServerHealth {
                url: s.url.clone(),
                circuit_state: s.breaker.state(),
                consecutive_failures: s.breaker.consecutive_failures(),
                available: s.breaker.is_available(),
                window_usage: s.limiter.current_usage(),
            })
            .collect()
    }

    fn metrics_summary(&self) -> MetricsSummary {
        self.metrics.summary()
    }
}

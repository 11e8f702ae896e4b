//! Overpass API integration
//!
//! Resilient HTTP access to Overpass API mirrors (<https://overpass-api.de>)
//! with per-server circuit breakers, rate limiting, retries and failover,
//! a builder for Overpass QL and parsers that turn raw responses into
//! GeoJSON building and administrative boundary features.

pub mod circuit_breaker;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod parser;
pub mod query;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use client::{OverpassClient, OverpassHttpClient, ServerHealth};
pub use config::{DEFAULT_SERVERS, HttpConfig};
pub use error::{OverpassError, OverpassResult};
pub use metrics::{MetricsRecorder, MetricsSummary, QueryMetrics};
pub use parser::{BoundariesParser, BuildingsParser, ParseResult, ParseStats};
pub use query::{OutputMode, OverpassQueryBuilder, TagFilter, TagOperator};
pub use rate_limiter::RateLimiter;
pub use retry::{RetryConfig, RetryResult, Retryable, with_retry, with_retry_if};

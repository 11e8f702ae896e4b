//! Overpass error types

use domain::DomainError;
use thiserror::Error;

/// HTTP status codes that are worth another attempt on the same server
pub const RETRYABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Errors that can occur while talking to Overpass or interpreting its output
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverpassError {
    /// Transport failure or a URL rejected by the allow-list
    #[error("Network error: {0}")]
    Network(String),

    /// The server's circuit breaker rejected the request
    #[error("Circuit breaker open for {server}")]
    CircuitOpen {
        /// Server URL
        server: String,
    },

    /// The per-attempt deadline elapsed
    #[error("Request timed out after {timeout_ms} ms")]
    Timeout {
        /// Deadline in milliseconds
        timeout_ms: u64,
    },

    /// Non-2xx response
    #[error("HTTP {status}: {message}")]
    Http {
        /// Response status code
        status: u16,
        /// Status text or a body excerpt
        message: String,
    },

    /// Response body was not valid Overpass JSON
    #[error("Parse error: {0}")]
    Parse(String),

    /// Input rejected before any request was made
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result alias used by every public Overpass operation
pub type OverpassResult<T> = Result<T, OverpassError>;

impl OverpassError {
    /// Returns true if the same server may succeed on another attempt
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout { .. } => true,
            Self::Http { status, .. } => RETRYABLE_STATUS_CODES.contains(status),
            Self::CircuitOpen { .. }
            | Self::Parse(_)
            | Self::Validation(_)
            | Self::Configuration(_) => false,
        }
    }

    /// Returns true for 4xx responses that no other server will answer differently
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        match self {
            Self::Http { status, .. } => {
                *status >= 400 && *status < 500 && *status != 408 && *status != 429
            },
            _ => false,
        }
    }

    /// Returns true for the network failure category (transport, allow-list, open circuit)
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network(_) | Self::CircuitOpen { .. })
    }

    /// HTTP status carried by the error, if any
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<DomainError> for OverpassError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::UrlNotAllowed(url) => Self::Network(format!("URL not allowed: {url}")),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for OverpassError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

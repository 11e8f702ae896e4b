//! Circuit breaker guarding a single Overpass server
//!
//! # States
//!
//! - **Closed**: Normal operation, requests pass through
//! - **Open**: Server is failing, requests are rejected without a network call
//! - **Half-Open**: Recovery timeout elapsed, exactly one trial request is allowed
//!
//! A trial that never reports back (its future was dropped) is abandoned
//! after another recovery timeout and the next caller gets a new trial.
//!
//! The caller asks [`CircuitBreaker::can_execute`] before a request and reports
//! the outcome with [`CircuitBreaker::record_success`] or
//! [`CircuitBreaker::record_failure`].

use std::{fmt, time::Duration};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Configuration for a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Time in milliseconds to wait before transitioning from Open to Half-Open
    pub recovery_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 30_000,
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a custom configuration
    #[must_use]
    pub const fn custom(failure_threshold: u32, recovery_timeout_ms: u64) -> Self {
        Self {
            failure_threshold,
            recovery_timeout_ms,
        }
    }

    const fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }
}

/// State of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Normal operation, requests pass through
    Closed,
    /// Server is down, requests fail fast
    Open,
    /// A single trial request is in flight
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Internal state tracking
#[derive(Debug)]
struct CircuitBreakerState {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
    trial_started_at: Option<Instant>,
}

/// Per-server circuit breaker
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: RwLock<CircuitBreakerState>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Creates a new circuit breaker with default configuration
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, CircuitBreakerConfig::default())
    }

    /// Creates a new circuit breaker with custom configuration
    #[must_use]
    pub fn with_config(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: RwLock::new(CircuitBreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
                trial_started_at: None,
            }),
        }
    }

    /// Returns the name of this circuit breaker
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current state without triggering any transition
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.state.read().state
    }

    /// Number of consecutive failures recorded since the last success
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.state.read().failure_count
    }

    fn recovery_elapsed(&self, state: &CircuitBreakerState) -> bool {
        state
            .opened_at
            .is_some_and(|opened_at| opened_at.elapsed() >= self.config.recovery_timeout())
    }

    fn trial_abandoned(&self, state: &CircuitBreakerState) -> bool {
        state
            .trial_started_at
            .is_some_and(|started| started.elapsed() >= self.config.recovery_timeout())
    }

    /// Whether a request would currently be admitted, without consuming the
    /// half-open trial
    #[must_use]
    pub fn is_available(&self) -> bool {
        let state = self.state.read();
        match state.state {
            CircuitState::Closed => true,
            CircuitState::Open => self.recovery_elapsed(&state),
            CircuitState::HalfOpen => self.trial_abandoned(&state),
        }
    }

    /// Admission check before a request
    ///
    /// An open circuit whose recovery timeout has elapsed moves to half-open
    /// and admits exactly one caller; everyone else is rejected until that
    /// trial reports its outcome or is abandoned.
    pub fn can_execute(&self) -> bool {
        let mut state = self.state.write();
        match state.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if self.recovery_elapsed(&state) {
                    tracing::debug!(
                        server = %self.name,
                        "Circuit transitioning from Open to HalfOpen"
                    );
                    state.state = CircuitState::HalfOpen;
                    state.trial_started_at = Some(Instant::now());
                    true
                } else {
                    false
                }
            },
            CircuitState::HalfOpen => {
                if self.trial_abandoned(&state) {
                    tracing::debug!(
                        server = %self.name,
                        "Half-open trial never reported, admitting a new one"
                    );
                    state.trial_started_at = Some(Instant::now());
                    true
                } else {
                    false
                }
            },
        }
    }

    /// Records a successful call
    pub fn record_success(&self) {
        let mut state = self.state.write();
        state.failure_count = 0;

        if state.state != CircuitState::Closed {
            tracing::info!(
                server = %self.name,
                from = %state.state,
                "Circuit transitioning to Closed"
            );
            state.state = CircuitState::Closed;
            state.opened_at = None;
            state.trial_started_at = None;
        }
    }

    /// Records a failed call
    pub fn record_failure(&self) {
        let mut state = self.state.write();
        state.failure_count = state.failure_count.saturating_add(1);

        match state.state {
            CircuitState::Closed => {
                if state.failure_count >= self.config.failure_threshold {
                    tracing::warn!(
                        server = %self.name,
                        failures = state.failure_count,
                        "Circuit transitioning from Closed to Open"
                    );
                    state.state = CircuitState::Open;
                    state.opened_at = Some(Instant::now());
                }
            },
            CircuitState::HalfOpen => {
                tracing::warn!(
                    server = %self.name,
                    "Circuit transitioning from HalfOpen to Open after failed trial"
                );
                state.state = CircuitState::Open;
                state.opened_at = Some(Instant::now());
                state.trial_started_at = None;
            },
            CircuitState::Open => {},
        }
    }

    /// Force the breaker back to closed, forgetting all failures
    pub fn reset(&self) {
        let mut state = self.state.write();
        state.state = CircuitState::Closed;
        state.failure_count = 0;
        state.opened_at = None;
        state.trial_started_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, recovery_ms: u64) -> CircuitBreaker {
        CircuitBreaker::with_config(
            "https://overpass.test/api/interpreter",
            CircuitBreakerConfig::custom(threshold, recovery_ms),
        )
    }

    #[test]
    fn circuit_breaker_creation() {
        let cb = CircuitBreaker::new("test-server");
        assert_eq!(cb.name(), "test-server");
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.is_available());
    }

    #[test]
    fn circuit_breaker_debug() {
        let cb = CircuitBreaker::new("test");
        let debug = format!("{cb:?}");
        assert!(debug.contains("CircuitBreaker"));
        assert!(debug.contains("test"));
    }

    #[test]
    fn circuit_state_display() {
        assert_eq!(format!("{}", CircuitState::Closed), "closed");
        assert_eq!(format!("{}", CircuitState::Open), "open");
        assert_eq!(format!("{}", CircuitState::HalfOpen), "half-open");
    }

    #[test]
    fn config_default() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.recovery_timeout_ms, 30_000);
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_failures() {
        let cb = breaker(3, 1_000);

        cb.record_failure();
        cb.record_failure();
        assert!(cb.can_execute());
        assert_eq!(cb.consecutive_failures(), 2);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_execute());
        assert!(!cb.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_failure_count() {
        let cb = breaker(3, 1_000);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_admits_exactly_one_trial() {
        let cb = breaker(2, 1_000);
        cb.record_failure();
        cb.record_failure();
        assert!(!cb.can_execute());

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(!cb.can_execute());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cb.is_available());
        assert!(cb.can_execute());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(!cb.can_execute());
        assert!(!cb.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_success_closes() {
        let cb = breaker(1, 500);
        cb.record_failure();
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(cb.can_execute());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.can_execute());
        assert!(cb.can_execute());
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reopens() {
        let cb = breaker(1, 500);
        cb.record_failure();
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(cb.can_execute());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_execute());

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(cb.can_execute());
    }

    #[tokio::test(start_paused = true)]
    async fn is_available_does_not_consume_trial() {
        let cb = breaker(1, 100);
        cb.record_failure();
        tokio::time::advance(Duration::from_millis(100)).await;

        assert!(cb.is_available());
        assert!(cb.is_available());
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.can_execute());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_trial_is_replaced_after_recovery_timeout() {
        let cb = breaker(1, 100);
        cb.record_failure();
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(cb.can_execute());

        // The trial's caller goes away without recording an outcome
        tokio::time::advance(Duration::from_millis(99)).await;
        assert!(!cb.is_available());
        assert!(!cb.can_execute());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cb.is_available());
        assert!(cb.can_execute());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(!cb.can_execute());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_closes_circuit() {
        let cb = breaker(1, 60_000);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }
}

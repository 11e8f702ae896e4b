//! Sliding-window rate limiter for a single server
//!
//! The limiter is advisory: a denied caller waits `1000 / rps` ms and then
//! proceeds regardless, so a slow mirror is never hard-blocked.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(1);

/// Per-server request rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    requests_per_second: f64,
    requests: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter allowing `requests_per_second` requests per sliding second
    #[must_use]
    pub fn new(requests_per_second: f64) -> Self {
        Self {
            requests_per_second,
            requests: Mutex::new(VecDeque::new()),
        }
    }

    fn prune(requests: &mut VecDeque<Instant>, now: Instant) {
        while requests
            .front()
            .is_some_and(|at| now.duration_since(*at) >= WINDOW)
        {
            requests.pop_front();
        }
    }

    /// Whether another request fits into the current one-second window
    #[allow(clippy::cast_precision_loss)]
    pub fn can_make_request(&self) -> bool {
        let mut requests = self.requests.lock();
        Self::prune(&mut requests, Instant::now());
        (requests.len() as f64) < self.requests_per_second
    }

    /// Record that a request is being sent now
    pub fn record_request(&self) {
        let mut requests = self.requests.lock();
        let now = Instant::now();
        Self::prune(&mut requests, now);
        requests.push_back(now);
    }

    /// Advisory wait applied when the window is full
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn backoff(&self) -> Duration {
        Duration::from_millis((1000.0 / self.requests_per_second).ceil() as u64)
    }

    /// Wait if the window is full, then record the request
    #[allow(clippy::cast_possible_truncation)]
    pub async fn acquire(&self) {
        if !self.can_make_request() {
            let wait = self.backoff();
            tracing::debug!(
                wait_ms = wait.as_millis() as u64,
                "Rate limit reached, delaying request"
            );
            tokio::time::sleep(wait).await;
        }
        self.record_request();
    }

    /// Requests recorded within the current window
    pub fn current_usage(&self) -> usize {
        let mut requests = self.requests.lock();
        Self::prune(&mut requests, Instant::now());
        requests.len()
    }
}

//! Per-attempt query metrics
//!
//! Every HTTP attempt is appended to a bounded in-process buffer and mirrored
//! to the `metrics` facade so an installed exporter can pick it up.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Buffer size that triggers pruning
pub const METRICS_CAPACITY: usize = 1000;

/// Number of oldest entries dropped when the buffer overflows
pub const METRICS_PRUNE_COUNT: usize = 100;

/// One HTTP attempt against one server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryMetrics {
    pub server: String,
    /// 1-based attempt number within the request
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate view over the buffered attempts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// 0.0..=1.0, zero when nothing was recorded
    pub success_rate: f64,
    pub avg_response_ms: f64,
}

/// Bounded append-only log of [`QueryMetrics`]
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    entries: Mutex<VecDeque<QueryMetrics>>,
}

impl MetricsRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attempt, pruning the oldest entries once the buffer overflows
    #[allow(clippy::cast_precision_loss)]
    pub fn record(&self, entry: QueryMetrics) {
        let outcome = if entry.success { "success" } else { "failure" };
        ::metrics::counter!(
            "overpass_requests_total",
            "server" => entry.server.clone(),
            "outcome" => outcome
        )
        .increment(1);
        ::metrics::histogram!("overpass_request_duration_ms", "server" => entry.server.clone())
            .record(entry.duration_ms as f64);

        let mut entries = self.entries.lock();
        entries.push_back(entry);
        if entries.len() > METRICS_CAPACITY {
            entries.drain(..METRICS_PRUNE_COUNT);
        }
    }

    /// Number of buffered entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// The most recent `limit` entries, newest last
    pub fn recent(&self, limit: usize) -> Vec<QueryMetrics> {
        let entries = self.entries.lock();
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Summary over all buffered entries
    pub fn summary(&self) -> MetricsSummary {
        let entries = self.entries.lock();
        summarize(entries.iter())
    }

    /// Summary restricted to one server
    pub fn summary_for(&self, server: &str) -> MetricsSummary {
        let entries = self.entries.lock();
        summarize(entries.iter().filter(|e| e.server == server))
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[allow(clippy::cast_precision_loss)]
fn summarize<'a>(entries: impl Iterator<Item = &'a QueryMetrics>) -> MetricsSummary {
    let (mut total, mut successful, mut total_ms) = (0usize, 0usize, 0u64);
    for entry in entries {
        total += 1;
        total_ms = total_ms.saturating_add(entry.duration_ms);
        if entry.success {
            successful += 1;
        }
    }

    if total == 0 {
        return MetricsSummary::default();
    }

    MetricsSummary {
        total,
        successful,
        failed: total - successful,
        success_rate: successful as f64 / total as f64,
        avg_response_ms: total_ms as f64 / total as f64,
    }
}

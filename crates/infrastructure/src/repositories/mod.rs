//! Repositories: query building, caching and parsing for one feature type
//!
//! A lookup checks the typed cache, then coalesces concurrent misses per
//! cache key, runs the Overpass query through the raw query cache and the
//! HTTP client, parses the body and post-filters the collection.

mod boundaries;
mod buildings;

use std::sync::Arc;

use integration_overpass::{OverpassClient, OverpassResult};
use tracing::{debug, warn};

use domain::{Severity, ValidationIssue};

use crate::cache::{OsmCacheManager, query_cache_key};

pub use boundaries::{BoundariesRepository, BoundarySearchConfig, DEFAULT_ADMIN_LEVELS};
pub use buildings::{BuildingQueryConfig, BuildingsRepository, MAX_NEAR_RADIUS_M};

/// Runs Overpass queries through the raw query cache
#[derive(Clone)]
pub(crate) struct QueryExecutor {
    client: Arc<dyn OverpassClient>,
    cache: Arc<OsmCacheManager>,
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor").finish_non_exhaustive()
    }
}

impl QueryExecutor {
    pub(crate) fn new(client: Arc<dyn OverpassClient>, cache: Arc<OsmCacheManager>) -> Self {
        Self { client, cache }
    }

    pub(crate) fn cache(&self) -> &OsmCacheManager {
        &self.cache
    }

    /// Raw response body for `query`, cached for the query TTL
    pub(crate) async fn execute(&self, query: &str) -> OverpassResult<Arc<String>> {
        let key = query_cache_key(query);
        if let Some(body) = self.cache.queries().get(&key) {
            debug!(key = %key, "Raw query cache hit");
            return Ok(body);
        }

        let body = Arc::new(self.client.execute_query(query).await?);
        self.cache.queries().set_arc(key, Arc::clone(&body), None);
        Ok(body)
    }
}

/// Log parse issues at a level matching their severity
fn log_issues(operation: &str, issues: &[ValidationIssue]) {
    for issue in issues {
        match issue.severity {
            Severity::Error | Severity::Warning => warn!(
                operation,
                code = %issue.code,
                element_id = ?issue.element_id,
                "{}",
                issue.message
            ),
            Severity::Info => debug!(
                operation,
                code = %issue.code,
                element_id = ?issue.element_id,
                "{}",
                issue.message
            ),
        }
    }
}

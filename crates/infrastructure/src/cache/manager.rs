//! Per-domain cache instances for the OSM client

use std::sync::Arc;

use domain::{BoundaryCollection, BuildingCollection};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::layera_cache::{CacheStats, LayeraCache, LayeraCacheConfig};
use crate::config::CacheConfig;

/// Statistics over all three caches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedCacheStats {
    pub buildings: CacheStats,
    pub boundaries: CacheStats,
    pub queries: CacheStats,
    pub total_entries: usize,
    pub total_size_bytes: usize,
    /// Hits over lookups across all caches
    pub hit_rate: f64,
}

/// Owns the buildings, boundaries and raw query caches
///
/// Buildings default to a 10 minute TTL, boundaries to 60 minutes and raw
/// Overpass responses to 5 minutes with a third of the capacity.
pub struct OsmCacheManager {
    buildings: Arc<LayeraCache<BuildingCollection>>,
    boundaries: Arc<LayeraCache<BoundaryCollection>>,
    queries: Arc<LayeraCache<String>>,
    cleanup_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for OsmCacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OsmCacheManager")
            .field("buildings", &self.buildings)
            .field("boundaries", &self.boundaries)
            .field("queries", &self.queries)
            .field("cleanup_tasks", &self.cleanup_tasks.lock().len())
            .finish()
    }
}

impl OsmCacheManager {
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        let cache_config = |name: &str, max_size_bytes, default_ttl| LayeraCacheConfig {
            name: name.to_string(),
            max_size_bytes,
            default_ttl,
            cleanup_interval: config.cleanup_interval(),
        };

        Self {
            buildings: Arc::new(LayeraCache::new(cache_config(
                "buildings",
                config.max_size,
                config.buildings_ttl(),
            ))),
            boundaries: Arc::new(LayeraCache::new(cache_config(
                "boundaries",
                config.max_size,
                config.boundaries_ttl(),
            ))),
            queries: Arc::new(LayeraCache::new(cache_config(
                "queries",
                config.query_max_size(),
                config.query_ttl(),
            ))),
            cleanup_tasks: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn buildings(&self) -> &Arc<LayeraCache<BuildingCollection>> {
        &self.buildings
    }

    #[must_use]
    pub fn boundaries(&self) -> &Arc<LayeraCache<BoundaryCollection>> {
        &self.boundaries
    }

    #[must_use]
    pub fn queries(&self) -> &Arc<LayeraCache<String>> {
        &self.queries
    }

    /// Spawn the periodic cleanup of every cache
    ///
    /// Does nothing outside a Tokio runtime or if the tasks already run.
    pub fn start_cleanup(&self) {
        if tokio::runtime::Handle::try_current().is_err() {
            debug!("No Tokio runtime, periodic cache cleanup disabled");
            return;
        }
        let mut tasks = self.cleanup_tasks.lock();
        if !tasks.is_empty() {
            return;
        }
        tasks.push(self.buildings.spawn_cleanup_task());
        tasks.push(self.boundaries.spawn_cleanup_task());
        tasks.push(self.queries.spawn_cleanup_task());
    }

    /// Abort the periodic cleanup tasks
    pub fn stop_cleanup(&self) {
        for task in self.cleanup_tasks.lock().drain(..) {
            task.abort();
        }
    }

    /// Whether periodic cleanup is running
    pub fn cleanup_running(&self) -> bool {
        self.cleanup_tasks.lock().iter().any(|task| !task.is_finished())
    }

    /// Drop all cached entries
    pub fn clear_all(&self) {
        self.buildings.clear();
        self.boundaries.clear();
        self.queries.clear();
        info!("All OSM caches cleared");
    }

    /// Sweep expired entries from every cache, returning the number removed
    pub fn cleanup(&self) -> usize {
        self.buildings.cleanup() + self.boundaries.cleanup() + self.queries.cleanup()
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CombinedCacheStats {
        let buildings = self.buildings.stats();
        let boundaries = self.boundaries.stats();
        let queries = self.queries.stats();

        let all = [&buildings, &boundaries, &queries];
        let hits: u64 = all.iter().map(|s| s.hits).sum();
        let lookups: u64 = all.iter().map(|s| s.hits + s.misses).sum();

        CombinedCacheStats {
            total_entries: all.iter().map(|s| s.entries).sum(),
            total_size_bytes: all.iter().map(|s| s.size_bytes).sum(),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            buildings,
            boundaries,
            queries,
        }
    }
}

impl Drop for OsmCacheManager {
    fn drop(&mut self) {
        self.stop_cleanup();
    }
}

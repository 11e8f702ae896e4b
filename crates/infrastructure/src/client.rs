//! OSM client facade
//!
//! [`OsmClient`] wires one HTTP client, one cache manager and the two
//! repositories together. [`OsmService`] holds a configuration and builds
//! its client on first use; callers construct and pass it explicitly.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use integration_overpass::{
    MetricsSummary, OverpassClient, OverpassHttpClient, OverpassResult, ServerHealth,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use domain::{BBox, BoundaryCollection, BuildingCollection, Point};

use crate::{
    cache::{CombinedCacheStats, OsmCacheManager},
    config::OsmClientConfig,
    repositories::{
        BoundariesRepository, BoundarySearchConfig, BuildingQueryConfig, BuildingsRepository,
    },
};

/// Snapshot returned by [`OsmClient::get_health`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientHealth {
    /// At least one server would accept a request
    pub healthy: bool,
    pub servers: Vec<ServerHealth>,
    pub metrics: MetricsSummary,
    pub cache: CombinedCacheStats,
}

/// Buildings and boundaries lookups over one Overpass client and cache set
pub struct OsmClient {
    buildings: BuildingsRepository,
    boundaries: BoundariesRepository,
    http: Arc<dyn OverpassClient>,
    cache: Arc<OsmCacheManager>,
    destroyed: AtomicBool,
}

impl std::fmt::Debug for OsmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OsmClient")
            .field("cache", &self.cache)
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

/// Validate `config` and build a client with background cache cleanup
///
/// Cleanup tasks only start when called inside a Tokio runtime.
///
/// # Errors
///
/// Returns `OverpassError::Configuration` for an invalid configuration or
/// if the HTTP client cannot be built.
pub fn create_osm_client(config: OsmClientConfig) -> OverpassResult<OsmClient> {
    config.validate()?;
    let http = Arc::new(OverpassHttpClient::new(config.http.clone())?);
    let client = OsmClient::new(http, &config);
    client.cache.start_cleanup();
    info!(
        servers = config.http.servers.len(),
        debug = config.debug,
        "OSM client created"
    );
    Ok(client)
}

impl OsmClient {
    /// Assemble a client around an existing Overpass implementation
    ///
    /// Does not start background cleanup; see [`create_osm_client`].
    #[must_use]
    pub fn new(http: Arc<dyn OverpassClient>, config: &OsmClientConfig) -> Self {
        let cache = Arc::new(OsmCacheManager::new(&config.cache));
        Self {
            buildings: BuildingsRepository::new(Arc::clone(&http), Arc::clone(&cache)),
            boundaries: BoundariesRepository::new(
                Arc::clone(&http),
                Arc::clone(&cache),
                &config.cache,
            ),
            http,
            cache,
            destroyed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub const fn buildings(&self) -> &BuildingsRepository {
        &self.buildings
    }

    #[must_use]
    pub const fn boundaries(&self) -> &BoundariesRepository {
        &self.boundaries
    }

    #[must_use]
    pub fn cache(&self) -> &OsmCacheManager {
        &self.cache
    }

    pub fn get_health(&self) -> ClientHealth {
        let servers = self.http.server_health();
        ClientHealth {
            healthy: servers.iter().any(|s| s.available),
            servers,
            metrics: self.http.metrics_summary(),
            cache: self.cache.stats(),
        }
    }

    pub fn clear_caches(&self) {
        self.cache.clear_all();
    }

    /// Sweep expired cache entries now, returning how many were removed
    pub fn cleanup(&self) -> usize {
        let removed = self.cache.cleanup();
        debug!(removed, "Manual cache cleanup");
        removed
    }

    /// Stop background cleanup and drop cached data; safe to call repeatedly
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cache.stop_cleanup();
        self.cache.clear_all();
        info!("OSM client destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

impl Drop for OsmClient {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Lazily created client with default-config shortcuts
#[derive(Debug)]
pub struct OsmService {
    config: OsmClientConfig,
    client: Mutex<Option<Arc<OsmClient>>>,
}

impl Default for OsmService {
    fn default() -> Self {
        Self::new(OsmClientConfig::default())
    }
}

impl OsmService {
    #[must_use]
    pub fn new(config: OsmClientConfig) -> Self {
        Self {
            config,
            client: Mutex::new(None),
        }
    }

    /// The client, created on the first call
    ///
    /// # Errors
    ///
    /// Propagates [`create_osm_client`] failures; a later call retries.
    pub fn client(&self) -> OverpassResult<Arc<OsmClient>> {
        let mut slot = self.client.lock();
        if let Some(client) = slot.as_ref() {
            return Ok(Arc::clone(client));
        }
        let client = Arc::new(create_osm_client(self.config.clone())?);
        *slot = Some(Arc::clone(&client));
        Ok(client)
    }

    /// Whether the client has been created
    pub fn is_initialized(&self) -> bool {
        self.client.lock().is_some()
    }

    /// Destroy the current client; the next call creates a fresh one
    pub fn reset(&self) {
        if let Some(client) = self.client.lock().take() {
            client.destroy();
        }
    }

    /// Buildings in `bbox` with the default filters
    ///
    /// # Errors
    ///
    /// See [`BuildingsRepository::find_in_bbox`].
    pub async fn buildings_in_bbox(&self, bbox: &BBox) -> OverpassResult<Arc<BuildingCollection>> {
        self.client()?
            .buildings()
            .find_in_bbox(bbox, &BuildingQueryConfig::default())
            .await
    }

    /// Boundaries matching `name` with the default search options
    ///
    /// # Errors
    ///
    /// See [`BoundariesRepository::search_by_name`].
    pub async fn search_boundaries(&self, name: &str) -> OverpassResult<Arc<BoundaryCollection>> {
        self.client()?
            .boundaries()
            .search_by_name(name, &BoundarySearchConfig::default())
            .await
    }

    /// Boundaries containing `point` at the default admin levels
    ///
    /// # Errors
    ///
    /// See [`BoundariesRepository::find_containing_point`].
    pub async fn boundaries_at(&self, point: Point) -> OverpassResult<Arc<BoundaryCollection>> {
        self.client()?
            .boundaries()
            .find_containing_point(point, None)
            .await
    }

    /// # Errors
    ///
    /// Fails only if the client cannot be created.
    pub fn health(&self) -> OverpassResult<ClientHealth> {
        Ok(self.client()?.get_health())
    }
}

//! Infrastructure layer - Caching, repositories and the client facade
//!
//! Composes the Overpass integration into the public OSM client.
//! Contains the TTL/LRU caches, request coalescing, the buildings and
//! boundaries repositories, configuration loading and logging setup.

pub mod cache;
pub mod client;
pub mod config;
pub mod repositories;
pub mod single_flight;
pub mod telemetry;

pub use cache::{
    CacheEvent, CacheStats, CombinedCacheStats, EvictionReason, LayeraCache, LayeraCacheConfig,
    OsmCacheManager, generate_cache_key,
};
pub use client::{ClientHealth, OsmClient, OsmService, create_osm_client};
pub use config::{AppConfig, CacheConfig, OsmClientConfig};
pub use repositories::{
    BoundariesRepository, BoundarySearchConfig, BuildingQueryConfig, BuildingsRepository,
    DEFAULT_ADMIN_LEVELS, MAX_NEAR_RADIUS_M,
};
pub use single_flight::SingleFlight;
pub use telemetry::{TelemetryConfig, TelemetryError, init_tracing};

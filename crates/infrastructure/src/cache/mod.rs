//! Cache implementations
//!
//! - `LayeraCache`: in-memory TTL cache with LRU eviction by access sequence
//! - `OsmCacheManager`: the buildings, boundaries and raw query caches

mod layera_cache;
mod manager;

pub use layera_cache::{
    CacheEvent, CacheStats, EntryInfo, EvictionReason, LayeraCache, LayeraCacheConfig,
    estimate_size,
};
pub use manager::{CombinedCacheStats, OsmCacheManager};

use domain::BBox;

/// Generate a cache key from components using blake3 hash
///
/// This ensures consistent key generation across the application
/// and handles variable-length inputs efficiently.
#[must_use]
pub fn generate_cache_key(prefix: &str, components: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for component in components {
        hasher.update(component.as_bytes());
        hasher.update(b"|"); // Separator to avoid collisions
    }
    let hash = hasher.finalize();
    format!("{}:{}", prefix, hash.to_hex())
}

/// Bounding box rendered with fixed precision for use in cache keys
///
/// Six decimals is roughly 10 cm, so boxes that differ only by float noise
/// share a key.
#[must_use]
pub fn bbox_component(bbox: &BBox) -> String {
    format!(
        "{:.6},{:.6},{:.6},{:.6}",
        bbox.south, bbox.west, bbox.north, bbox.east
    )
}

/// Key of a raw Overpass response in the query cache
#[must_use]
pub fn query_cache_key(query: &str) -> String {
    generate_cache_key("query", &[query])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_cache_key_is_deterministic() {
        let key1 = generate_cache_key("test", &["a", "b", "c"]);
        let key2 = generate_cache_key("test", &["a", "b", "c"]);
        assert_eq!(key1, key2);
    }

    #[test]
    fn generate_cache_key_differs_for_different_inputs() {
        let key1 = generate_cache_key("test", &["a", "b"]);
        let key2 = generate_cache_key("test", &["a", "c"]);
        assert_ne!(key1, key2);
    }

    #[test]
    fn generate_cache_key_separates_components() {
        let key1 = generate_cache_key("test", &["ab", "c"]);
        let key2 = generate_cache_key("test", &["a", "bc"]);
        assert_ne!(key1, key2);
    }

    #[test]
    fn generate_cache_key_starts_with_prefix() {
        let key = generate_cache_key("myprefix", &["data"]);
        assert!(key.starts_with("myprefix:"));
    }

    #[test]
    fn bbox_component_rounds_float_noise() {
        let a = BBox::new(40.5, 22.9, 40.6, 23.0).unwrap();
        let b = BBox::new(40.500_000_000_1, 22.9, 40.6, 23.0).unwrap();
        assert_eq!(bbox_component(&a), "40.500000,22.900000,40.600000,23.000000");
        assert_eq!(bbox_component(&a), bbox_component(&b));
    }

    #[test]
    fn query_keys_follow_query_text() {
        assert_eq!(query_cache_key("way;"), query_cache_key("way;"));
        assert_ne!(query_cache_key("way;"), query_cache_key("node;"));
        assert!(query_cache_key("way;").starts_with("query:"));
    }
}

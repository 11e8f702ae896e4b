//! In-memory TTL cache with LRU eviction
//!
//! Entries are evicted by access sequence rather than wall-clock recency:
//! every `set` and every successful `get` stamps the entry with the next
//! value of a monotonically increasing counter, and the entry with the
//! smallest stamp is evicted first.
//!
//! Timing uses `tokio::time::Instant` so tests can drive expiry with a
//! paused clock.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{Arc, Weak},
    time::Duration,
};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{sync::broadcast, task::JoinHandle, time::Instant};
use tracing::{debug, trace, warn};

/// Capacity of the event channel; slow subscribers miss older events
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Configuration for a single cache instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayeraCacheConfig {
    /// Name used in logs, metrics and stats
    pub name: String,
    /// Upper bound for the summed estimated entry sizes
    pub max_size_bytes: usize,
    /// TTL applied when `set` is called without one
    pub default_ttl: Duration,
    /// Period of the background cleanup sweep
    pub cleanup_interval: Duration,
}

impl Default for LayeraCacheConfig {
    fn default() -> Self {
        Self {
            name: "cache".to_string(),
            max_size_bytes: 50 * 1024 * 1024,
            default_ttl: Duration::from_secs(600),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// Why an entry left the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionReason {
    Expired,
    Lru,
    Manual,
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expired => write!(f, "expired"),
            Self::Lru => write!(f, "lru"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Notifications published by a cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Set { key: String, size: usize },
    Hit { key: String },
    Miss { key: String },
    Evicted { key: String, reason: EvictionReason },
}

/// Point-in-time statistics of one cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub name: String,
    pub entries: usize,
    pub size_bytes: usize,
    pub max_size_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    /// Expiry and LRU removals; manual deletes are not counted
    pub evictions: u64,
    /// `hits / (hits + misses)`, zero before the first lookup
    pub hit_rate: f64,
    /// `size_bytes / max_size_bytes`
    pub memory_usage: f64,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

/// Metadata of a single entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryInfo {
    pub size: usize,
    /// Successful `get`s since the entry was stored
    pub access_count: u64,
    pub created_at: DateTime<Utc>,
    /// Time since the last `set` or successful `get`
    pub idle: Duration,
    pub expires_in: Duration,
}

#[derive(Debug)]
struct CacheEntry<T> {
    value: Arc<T>,
    created_at: DateTime<Utc>,
    expires_at: Instant,
    size: usize,
    access_count: u64,
    last_access_at: Instant,
    access_order: u64,
}

impl<T> CacheEntry<T> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug)]
struct Inner<T> {
    entries: HashMap<String, CacheEntry<T>>,
    /// access stamp -> key, smallest stamp is the LRU victim
    lru: BTreeMap<u64, String>,
    counter: u64,
    size_bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<T> Inner<T> {
    fn next_stamp(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    fn remove(&mut self, key: &str, reason: EvictionReason) -> Option<CacheEntry<T>> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(&entry.access_order);
        self.size_bytes = self.size_bytes.saturating_sub(entry.size);
        if reason != EvictionReason::Manual {
            self.evictions += 1;
        }
        Some(entry)
    }
}

/// Estimated memory footprint: serialized JSON length times two
///
/// Values that fail to serialize are counted as empty.
pub fn estimate_size<T: Serialize>(value: &T) -> usize {
    serde_json::to_vec(value).map_or(0, |bytes| bytes.len() * 2)
}

/// Thread-safe TTL + LRU cache
///
/// Values are stored behind `Arc` so hits hand out the cached object
/// without cloning it.
pub struct LayeraCache<T> {
    config: LayeraCacheConfig,
    inner: Mutex<Inner<T>>,
    events: broadcast::Sender<CacheEvent>,
}

impl<T> fmt::Debug for LayeraCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("LayeraCache")
            .field("name", &self.config.name)
            .field("entries", &inner.entries.len())
            .field("size_bytes", &inner.size_bytes)
            .field("hits", &inner.hits)
            .field("misses", &inner.misses)
            .finish_non_exhaustive()
    }
}

impl<T> LayeraCache<T>
where
    T: Serialize + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(config: LayeraCacheConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                lru: BTreeMap::new(),
                counter: 0,
                size_bytes: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            events,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    #[must_use]
    pub const fn config(&self) -> &LayeraCacheConfig {
        &self.config
    }

    /// Receive `set`, `hit`, `miss` and eviction events
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: CacheEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    fn emit_eviction(&self, key: String, reason: EvictionReason) {
        ::metrics::counter!(
            "osm_cache_evictions_total",
            "cache" => self.config.name.clone(),
            "reason" => reason.to_string()
        )
        .increment(1);
        self.emit(CacheEvent::Evicted { key, reason });
    }

    /// Store `value` under `key` with `ttl` or the configured default
    ///
    /// Least recently used entries are evicted until the new entry fits.
    /// Returns `false` without storing if the entry alone exceeds the
    /// cache's capacity.
    pub fn set(&self, key: impl Into<String>, value: T, ttl: Option<Duration>) -> bool {
        self.set_arc(key, Arc::new(value), ttl)
    }

    /// [`set`](Self::set) for a value that is already shared
    pub fn set_arc(&self, key: impl Into<String>, value: Arc<T>, ttl: Option<Duration>) -> bool {
        let key = key.into();
        let size = estimate_size(value.as_ref());
        if size > self.config.max_size_bytes {
            warn!(
                cache = %self.config.name,
                key = %key,
                size,
                max_size = self.config.max_size_bytes,
                "Entry larger than cache capacity, not caching"
            );
            return false;
        }

        let now = Instant::now();
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let mut evicted = Vec::new();
        {
            let mut inner = self.inner.lock();
            inner.remove(&key, EvictionReason::Manual);

            while inner.size_bytes + size > self.config.max_size_bytes {
                let Some(victim) = inner.lru.first_key_value().map(|(_, key)| key.clone()) else {
                    break;
                };
                inner.remove(&victim, EvictionReason::Lru);
                evicted.push(victim);
            }

            let stamp = inner.next_stamp();
            inner.lru.insert(stamp, key.clone());
            inner.size_bytes += size;
            inner.entries.insert(
                key.clone(),
                CacheEntry {
                    value,
                    created_at: Utc::now(),
                    expires_at: now + ttl,
                    size,
                    access_count: 0,
                    last_access_at: now,
                    access_order: stamp,
                },
            );
        }

        for victim in evicted {
            debug!(cache = %self.config.name, key = %victim, "Evicted least recently used entry");
            self.emit_eviction(victim, EvictionReason::Lru);
        }
        trace!(cache = %self.config.name, key = %key, size, ttl_ms = ttl.as_millis(), "Cache set");
        self.emit(CacheEvent::Set { key, size });
        true
    }

    /// Look up an unexpired value, refreshing its LRU position
    ///
    /// Expired entries are removed on access.
    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        let now = Instant::now();
        let (value, expired) = {
            let mut inner = self.inner.lock();
            match inner.entries.get(key).map(|e| e.is_expired(now)) {
                None => {
                    inner.misses += 1;
                    (None, false)
                },
                Some(true) => {
                    inner.remove(key, EvictionReason::Expired);
                    inner.misses += 1;
                    (None, true)
                },
                Some(false) => {
                    let stamp = inner.next_stamp();
                    inner.hits += 1;
                    let Inner { entries, lru, .. } = &mut *inner;
                    let value = entries.get_mut(key).map(|entry| {
                        lru.remove(&entry.access_order);
                        lru.insert(stamp, key.to_string());
                        entry.access_order = stamp;
                        entry.access_count += 1;
                        entry.last_access_at = now;
                        Arc::clone(&entry.value)
                    });
                    (value, false)
                },
            }
        };

        let name = self.config.name.clone();
        let key = key.to_string();
        if value.is_some() {
            ::metrics::counter!("osm_cache_hits_total", "cache" => name).increment(1);
            self.emit(CacheEvent::Hit { key });
        } else {
            ::metrics::counter!("osm_cache_misses_total", "cache" => name).increment(1);
            if expired {
                self.emit_eviction(key.clone(), EvictionReason::Expired);
            }
            self.emit(CacheEvent::Miss { key });
        }
        value
    }

    /// Unexpired value without counting a hit or miss or refreshing LRU order
    ///
    /// Expired entries are left for `get` or the cleanup sweep.
    pub fn peek(&self, key: &str) -> Option<Arc<T>> {
        let now = Instant::now();
        self.inner
            .lock()
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| Arc::clone(&entry.value))
    }

    /// Whether an unexpired entry exists; does not touch LRU order
    ///
    /// An expired entry found here is removed.
    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        let expired = {
            let mut inner = self.inner.lock();
            match inner.entries.get(key).map(|e| e.is_expired(now)) {
                None => return false,
                Some(false) => return true,
                Some(true) => inner.remove(key, EvictionReason::Expired).is_some(),
            }
        };
        if expired {
            self.emit_eviction(key.to_string(), EvictionReason::Expired);
        }
        false
    }

    /// Access metadata of an unexpired entry, without touching LRU order
    pub fn entry_info(&self, key: &str) -> Option<EntryInfo> {
        let now = Instant::now();
        let inner = self.inner.lock();
        inner
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| EntryInfo {
                size: entry.size,
                access_count: entry.access_count,
                created_at: entry.created_at,
                idle: now.duration_since(entry.last_access_at),
                expires_in: entry.expires_at.duration_since(now),
            })
    }

    /// Remove an entry; only non-manual removals count as evictions
    pub fn delete(&self, key: &str, reason: EvictionReason) -> bool {
        let removed = self.inner.lock().remove(key, reason).is_some();
        if removed {
            self.emit_eviction(key.to_string(), reason);
        }
        removed
    }

    /// Number of stored entries, expired ones included until swept
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry; counters are kept
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.lru.clear();
        inner.size_bytes = 0;
    }

    /// Remove all expired entries and return how many were removed
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let removed: Vec<String> = {
            let mut inner = self.inner.lock();
            let expired: Vec<String> = inner
                .entries
                .iter()
                .filter(|(_, entry)| entry.is_expired(now))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &expired {
                inner.remove(key, EvictionReason::Expired);
            }
            expired
        };

        let count = removed.len();
        for key in removed {
            self.emit_eviction(key, EvictionReason::Expired);
        }
        if count > 0 {
            debug!(cache = %self.config.name, removed = count, "Cache cleanup");
        }
        count
    }

    /// Current statistics
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let lookups = inner.hits + inner.misses;
        CacheStats {
            name: self.config.name.clone(),
            entries: inner.entries.len(),
            size_bytes: inner.size_bytes,
            max_size_bytes: self.config.max_size_bytes,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                inner.hits as f64 / lookups as f64
            },
            memory_usage: if self.config.max_size_bytes == 0 {
                0.0
            } else {
                inner.size_bytes as f64 / self.config.max_size_bytes as f64
            },
            oldest_entry: inner.entries.values().map(|e| e.created_at).min(),
            newest_entry: inner.entries.values().map(|e| e.created_at).max(),
        }
    }

    /// Run [`cleanup`](Self::cleanup) every `cleanup_interval`
    ///
    /// The task holds only a weak reference and exits once the cache is
    /// dropped. Must be called from within a Tokio runtime.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        let period = self.config.cleanup_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                cache.cleanup();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(max_size_bytes: usize) -> LayeraCache<String> {
        LayeraCache::new(LayeraCacheConfig {
            name: "test".to_string(),
            max_size_bytes,
            default_ttl: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(10),
        })
    }

    /// `"aaaa"` serializes to 6 bytes, estimated at 12
    fn value(c: char) -> String {
        std::iter::repeat_n(c, 4).collect()
    }

    #[test]
    fn size_estimate_doubles_json_length() {
        assert_eq!(estimate_size(&"aaaa".to_string()), 12);
        assert_eq!(estimate_size(&vec![1, 2]), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn get_returns_value_before_expiry_only() {
        let cache = cache(1_000);
        cache.set("k", value('a'), Some(Duration::from_secs(10)));

        tokio::time::advance(Duration::from_millis(9_999)).await;
        assert_eq!(cache.get("k").as_deref(), Some(&value('a')));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn default_ttl_applies() {
        let cache = cache(1_000);
        cache.set("k", value('a'), None);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.has("k"));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!cache.has("k"));
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn evicts_smallest_access_stamp() {
        // Room for exactly three 12-byte entries
        let cache = cache(36);
        cache.set("a", value('a'), None);
        cache.set("b", value('b'), None);
        cache.set("c", value('c'), None);

        // "a" was inserted first but is now the most recently accessed
        assert!(cache.get("a").is_some());

        cache.set("d", value('d'), None);
        assert!(cache.has("a"));
        assert!(!cache.has("b"));
        assert!(cache.has("c"));
        assert!(cache.has("d"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn peek_leaves_stats_and_lru_order_alone() {
        let cache = cache(24);
        cache.set("a", value('a'), Some(Duration::from_secs(5)));
        cache.set("b", value('b'), None);

        assert_eq!(cache.peek("a").as_deref(), Some(&value('a')));
        assert!(cache.peek("missing").is_none());
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (0, 0));

        cache.set("c", value('c'), None);
        assert!(cache.peek("a").is_none());
        assert!(cache.peek("b").is_some());

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(cache.peek("b").is_none());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn has_does_not_refresh_lru_order() {
        let cache = cache(24);
        cache.set("a", value('a'), None);
        cache.set("b", value('b'), None);

        assert!(cache.has("a"));
        cache.set("c", value('c'), None);

        assert!(!cache.has("a"));
        assert!(cache.has("b"));
    }

    #[tokio::test]
    async fn oversized_entry_is_rejected() {
        let cache = cache(10);
        assert!(!cache.set("k", value('a'), None));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn overwrite_replaces_size() {
        let cache = cache(1_000);
        cache.set("k", value('a'), None);
        cache.set("k", "bb".to_string(), None);
        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.size_bytes, 8);
        assert_eq!(stats.evictions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn entry_info_tracks_access() {
        let cache = cache(1_000);
        cache.set("k", value('a'), Some(Duration::from_secs(30)));
        tokio::time::advance(Duration::from_secs(10)).await;
        cache.get("k");
        cache.get("k");
        tokio::time::advance(Duration::from_secs(5)).await;

        let info = cache.entry_info("k").unwrap();
        assert_eq!(info.size, 12);
        assert_eq!(info.access_count, 2);
        assert_eq!(info.idle, Duration::from_secs(5));
        assert_eq!(info.expires_in, Duration::from_secs(15));
        assert!(cache.entry_info("missing").is_none());
    }

    #[tokio::test]
    async fn manual_delete_is_not_an_eviction() {
        let cache = cache(1_000);
        cache.set("a", value('a'), None);
        cache.set("b", value('b'), None);

        assert!(cache.delete("a", EvictionReason::Manual));
        assert!(cache.delete("b", EvictionReason::Lru));
        assert!(!cache.delete("missing", EvictionReason::Manual));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_removes_only_expired() {
        let cache = cache(1_000);
        cache.set("short", value('a'), Some(Duration::from_secs(1)));
        cache.set("long", value('b'), Some(Duration::from_secs(100)));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.cleanup(), 1);
        assert!(cache.has("long"));
        assert_eq!(cache.cleanup(), 0);
    }

    #[tokio::test]
    async fn stats_track_hits_and_misses() {
        let cache = cache(1_000);
        cache.set("k", value('a'), None);
        cache.get("k");
        cache.get("k");
        cache.get("missing");

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < f64::EPSILON);
        assert!((stats.memory_usage - 0.012).abs() < 1e-9);
        assert!(stats.oldest_entry.is_some());
        assert!(stats.oldest_entry <= stats.newest_entry);
    }

    #[tokio::test]
    async fn events_are_published() {
        let cache = cache(24);
        let mut events = cache.subscribe();

        cache.set("a", value('a'), None);
        cache.get("a");
        cache.get("zz");
        cache.set("b", value('b'), None);
        cache.set("c", value('c'), None);

        assert_eq!(
            events.recv().await.unwrap(),
            CacheEvent::Set {
                key: "a".to_string(),
                size: 12
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            CacheEvent::Hit {
                key: "a".to_string()
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            CacheEvent::Miss {
                key: "zz".to_string()
            }
        );
        assert!(matches!(events.recv().await.unwrap(), CacheEvent::Set { .. }));
        assert_eq!(
            events.recv().await.unwrap(),
            CacheEvent::Evicted {
                key: "a".to_string(),
                reason: EvictionReason::Lru
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn background_cleanup_sweeps_and_stops_on_drop() {
        let cache = Arc::new(cache(1_000));
        cache.set("k", value('a'), Some(Duration::from_secs(5)));
        let handle = cache.spawn_cleanup_task();

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(cache.len(), 0);

        drop(cache);
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(handle.is_finished());
    }
}

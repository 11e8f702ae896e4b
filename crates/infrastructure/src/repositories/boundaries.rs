//! Administrative boundary lookups

use std::{sync::Arc, time::Duration};

use integration_overpass::{
    BoundariesParser, OutputMode, OverpassClient, OverpassError, OverpassQueryBuilder,
    OverpassResult, TagFilter,
};
use tracing::{debug, info, instrument};

use domain::{
    ADMIN_LEVEL_RANGE, BBox, BoundaryCollection, Point,
    text::{escape_regex, validate_search_query},
};

use super::{QueryExecutor, log_issues};
use crate::{
    cache::{OsmCacheManager, bbox_component, generate_cache_key},
    config::CacheConfig,
    single_flight::SingleFlight,
};

/// Regions, regional units, municipalities and municipal units
pub const DEFAULT_ADMIN_LEVELS: [u8; 5] = [4, 5, 6, 7, 8];

/// Half-width in degrees of the box queried around a point
const CONTAINMENT_BUFFER_DEG: f64 = 0.01;

/// Options for [`BoundariesRepository::search_by_name`]
#[derive(Debug, Clone, PartialEq)]
pub struct BoundarySearchConfig {
    pub admin_levels: Vec<u8>,
    /// Match `name` exactly instead of a case-insensitive substring regex
    pub exact: bool,
    pub max_results: usize,
    /// Restrict the search area
    pub bbox: Option<BBox>,
    pub timeout_secs: u32,
}

impl Default for BoundarySearchConfig {
    fn default() -> Self {
        Self {
            admin_levels: DEFAULT_ADMIN_LEVELS.to_vec(),
            exact: false,
            max_results: 10,
            bbox: None,
            timeout_secs: integration_overpass::query::DEFAULT_QUERY_TIMEOUT_SECS,
        }
    }
}

impl BoundarySearchConfig {
    fn validate(&self) -> OverpassResult<()> {
        validate_admin_levels(&self.admin_levels)?;
        if self.max_results == 0 {
            return Err(OverpassError::Validation(
                "max_results must be greater than 0".to_string(),
            ));
        }
        if let Some(bbox) = &self.bbox {
            bbox.validate()?;
        }
        Ok(())
    }
}

fn validate_admin_levels(levels: &[u8]) -> OverpassResult<()> {
    if levels.is_empty() {
        return Err(OverpassError::Validation(
            "at least one admin level is required".to_string(),
        ));
    }
    if let Some(level) = levels.iter().find(|l| !ADMIN_LEVEL_RANGE.contains(*l)) {
        return Err(OverpassError::Validation(format!(
            "admin level must be within {}..={}, got {level}",
            ADMIN_LEVEL_RANGE.start(),
            ADMIN_LEVEL_RANGE.end()
        )));
    }
    Ok(())
}

/// `["admin_level"="8"]` for one level, an anchored alternation otherwise
fn admin_level_filter(levels: &[u8]) -> TagFilter {
    match levels {
        [level] => TagFilter::equals("admin_level", level.to_string()),
        _ => {
            let alternatives: Vec<String> = levels.iter().map(ToString::to_string).collect();
            TagFilter::regex("admin_level", format!("^({})$", alternatives.join("|")))
        },
    }
}

fn administrative_relations(levels: &[u8], timeout_secs: u32) -> OverpassQueryBuilder {
    OverpassQueryBuilder::new()
        .relation()
        .filter(TagFilter::equals("boundary", "administrative"))
        .filter(admin_level_filter(levels))
        .timeout(timeout_secs)
        .output(OutputMode::Geom)
}

fn levels_component(levels: &[u8]) -> String {
    let mut levels = levels.to_vec();
    levels.sort_unstable();
    levels.dedup();
    levels
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Administrative boundaries from Overpass
pub struct BoundariesRepository {
    executor: QueryExecutor,
    flight: SingleFlight<OverpassResult<Arc<BoundaryCollection>>>,
    search_ttl: Duration,
}

impl std::fmt::Debug for BoundariesRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundariesRepository")
            .field("flight", &self.flight)
            .field("search_ttl", &self.search_ttl)
            .finish_non_exhaustive()
    }
}

impl BoundariesRepository {
    #[must_use]
    pub fn new(
        client: Arc<dyn OverpassClient>,
        cache: Arc<OsmCacheManager>,
        config: &CacheConfig,
    ) -> Self {
        Self {
            executor: QueryExecutor::new(client, cache),
            flight: SingleFlight::new(),
            search_ttl: config.search_ttl(),
        }
    }

    /// Overpass QL for a name search
    ///
    /// # Errors
    ///
    /// Returns `OverpassError::Validation` if the name fails the injection
    /// checks or the config is invalid.
    pub fn search_query(name: &str, config: &BoundarySearchConfig) -> OverpassResult<String> {
        let name = validate_search_query(name)?;
        config.validate()?;

        let name_filter = if config.exact {
            TagFilter::equals("name", name)
        } else {
            TagFilter::regex("name", escape_regex(name)).case_insensitive()
        };
        let mut builder =
            administrative_relations(&config.admin_levels, config.timeout_secs).filter(name_filter);
        if let Some(bbox) = config.bbox {
            builder = builder.bbox(bbox);
        }
        builder.build()
    }

    /// Boundaries whose `name` matches, at most `max_results`
    ///
    /// Results are cached for the search TTL (two hours by default).
    ///
    /// # Errors
    ///
    /// Returns `OverpassError::Validation` for rejected input, or the HTTP
    /// or parse error of the request.
    #[instrument(skip(self, config))]
    pub async fn search_by_name(
        &self,
        name: &str,
        config: &BoundarySearchConfig,
    ) -> OverpassResult<Arc<BoundaryCollection>> {
        let query = Self::search_query(name, config)?;
        let name = name.trim();
        let key = generate_cache_key(
            "boundaries:search",
            &[
                name,
                &levels_component(&config.admin_levels),
                if config.exact { "exact" } else { "regex" },
                &config.max_results.to_string(),
                &config.bbox.as_ref().map(bbox_component).unwrap_or_default(),
            ],
        );

        let max_results = config.max_results;
        self.cached(&key, Some(self.search_ttl), "search_by_name", || async move {
            let mut collection = self.run(&query, "search_by_name").await?;
            collection.features.truncate(max_results);
            Ok(collection)
        })
        .await
    }

    /// All boundaries at `admin_level`, optionally restricted to `bbox`
    ///
    /// # Errors
    ///
    /// Returns `OverpassError::Validation` for a level outside 1..=11 or an
    /// invalid box, otherwise the HTTP or parse error of the request.
    #[instrument(skip(self))]
    pub async fn find_by_admin_level(
        &self,
        admin_level: u8,
        bbox: Option<BBox>,
    ) -> OverpassResult<Arc<BoundaryCollection>> {
        validate_admin_levels(&[admin_level])?;
        let mut builder = administrative_relations(
            &[admin_level],
            integration_overpass::query::DEFAULT_QUERY_TIMEOUT_SECS,
        );
        if let Some(bbox) = bbox {
            bbox.validate()?;
            builder = builder.bbox(bbox);
        }
        let query = builder.build()?;

        let key = generate_cache_key(
            "boundaries:level",
            &[
                &admin_level.to_string(),
                &bbox.as_ref().map(bbox_component).unwrap_or_default(),
            ],
        );
        self.cached(&key, None, "find_by_admin_level", || async move {
            self.run(&query, "find_by_admin_level").await
        })
        .await
    }

    /// Boundaries containing `point`, lowest admin level first
    ///
    /// Relations intersecting a ±0.01° box around the point are fetched and
    /// those whose geometry does not contain the point are dropped.
    ///
    /// # Errors
    ///
    /// Returns `OverpassError::Validation` for invalid coordinates or level,
    /// otherwise the HTTP or parse error of the request.
    #[instrument(skip(self, point), fields(point = %point))]
    pub async fn find_containing_point(
        &self,
        point: Point,
        admin_level: Option<u8>,
    ) -> OverpassResult<Arc<BoundaryCollection>> {
        let point = Point::new(point.lat(), point.lng())?;
        let levels = admin_level.map_or_else(|| DEFAULT_ADMIN_LEVELS.to_vec(), |l| vec![l]);
        validate_admin_levels(&levels)?;

        let bbox = BBox::buffer(point, CONTAINMENT_BUFFER_DEG)?;
        let query = administrative_relations(
            &levels,
            integration_overpass::query::DEFAULT_QUERY_TIMEOUT_SECS,
        )
        .bbox(bbox)
        .build()?;

        let key = generate_cache_key(
            "boundaries:point",
            &[
                &format!("{:.6},{:.6}", point.lat(), point.lng()),
                &levels_component(&levels),
            ],
        );
        self.cached(&key, None, "find_containing_point", || async move {
            let mut collection = self.run(&query, "find_containing_point").await?;
            let candidates = collection.len();
            collection
                .features
                .retain(|f| f.geometry.contains_point(&point));
            collection
                .features
                .sort_by_key(|f| f.properties.admin_level);
            debug!(candidates, containing = collection.len(), "Containment filter");
            Ok(collection)
        })
        .await
    }

    /// Serve `key` from the boundaries cache or compute it once for all
    /// concurrent callers
    async fn cached<F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        operation: &str,
        fetch: F,
    ) -> OverpassResult<Arc<BoundaryCollection>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = OverpassResult<BoundaryCollection>>,
    {
        let cache = self.executor.cache().boundaries();
        if let Some(hit) = cache.get(key) {
            debug!(operation, features = hit.len(), "Boundaries cache hit");
            return Ok(hit);
        }

        self.flight
            .work(key, || async move {
                if let Some(hit) = cache.peek(key) {
                    return Ok(hit);
                }
                let collection = Arc::new(fetch().await?);
                info!(operation, features = collection.len(), "Boundaries loaded");
                cache.set_arc(key, Arc::clone(&collection), ttl);
                Ok(collection)
            })
            .await
    }

    async fn run(&self, query: &str, operation: &str) -> OverpassResult<BoundaryCollection> {
        let body = self.executor.execute(query).await?;
        let parsed = BoundariesParser::parse(&body)?;
        log_issues(operation, &parsed.issues);
        Ok(parsed.collection)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use integration_overpass::{MetricsSummary, ServerHealth};
    use mockall::mock;
    use serde_json::{Value, json};

    use super::*;

    mock! {
        pub Overpass {}

        #[async_trait::async_trait]
        impl OverpassClient for Overpass {
            async fn execute_query(&self, query: &str) -> OverpassResult<String>;
            fn server_health(&self) -> Vec<ServerHealth>;
            fn metrics_summary(&self) -> MetricsSummary;
        }
    }

    /// Administrative relation with one closed square outer ring
    fn boundary(id: i64, name: &str, level: u8, lat: f64, lng: f64, size: f64) -> Value {
        let corners = [
            (lat, lng),
            (lat, lng + size),
            (lat + size, lng + size),
            (lat + size, lng),
            (lat, lng),
        ];
        json!({
            "type": "relation",
            "id": id,
            "tags": {
                "boundary": "administrative",
                "admin_level": level.to_string(),
                "name": name,
                "name:el": name,
            },
            "members": [{
                "type": "way",
                "ref": id * 100,
                "role": "outer",
                "geometry": corners
                    .iter()
                    .map(|(lat, lon)| json!({"lat": lat, "lon": lon}))
                    .collect::<Vec<_>>(),
            }],
        })
    }

    fn response(elements: Vec<Value>) -> String {
        json!({"version": 0.6, "generator": "test", "elements": elements}).to_string()
    }

    fn repository(mock: MockOverpass) -> BoundariesRepository {
        let config = CacheConfig::default();
        let cache = Arc::new(OsmCacheManager::new(&config));
        BoundariesRepository::new(Arc::new(mock), cache, &config)
    }

    #[test]
    fn search_query_is_case_insensitive_regex() {
        let query =
            BoundariesRepository::search_query("Θεσσαλονίκη", &BoundarySearchConfig::default())
                .unwrap();

        assert!(query.contains("[\"boundary\"=\"administrative\"]"));
        assert!(query.contains("[\"admin_level\"~\"^(4|5|6|7|8)$\"]"));
        assert!(query.contains("[\"name\"~\"Θεσσαλονίκη\",i]"));
    }

    #[test]
    fn exact_search_with_single_level() {
        let config = BoundarySearchConfig {
            admin_levels: vec![8],
            exact: true,
            ..Default::default()
        };
        let query = BoundariesRepository::search_query("Καλαμαριά", &config).unwrap();

        assert!(query.contains("[\"admin_level\"=\"8\"]"));
        assert!(query.contains("[\"name\"=\"Καλαμαριά\"]"));
    }

    #[test]
    fn search_query_rejects_injection() {
        let config = BoundarySearchConfig::default();
        for name in ["", "<b>x</b>", "a; drop", "javascript:alert(1)", "x union select"] {
            assert!(
                matches!(
                    BoundariesRepository::search_query(name, &config),
                    Err(OverpassError::Validation(_))
                ),
                "{name}"
            );
        }
    }

    #[test]
    fn invalid_admin_levels_rejected() {
        for levels in [vec![], vec![0], vec![12]] {
            let config = BoundarySearchConfig {
                admin_levels: levels,
                ..Default::default()
            };
            assert!(BoundariesRepository::search_query("Αθήνα", &config).is_err());
        }
    }

    #[tokio::test]
    async fn search_truncates_and_caches() {
        let mut mock = MockOverpass::new();
        mock.expect_execute_query().times(1).returning(|_| {
            Ok(response(vec![
                boundary(1, "Δήμος Αθηναίων", 7, 37.9, 23.7, 0.1),
                boundary(2, "Αθήνα", 8, 37.95, 23.72, 0.02),
                boundary(3, "Νέα Αθήνα", 8, 38.0, 23.8, 0.02),
            ]))
        });
        let repo = repository(mock);
        let config = BoundarySearchConfig {
            max_results: 2,
            ..Default::default()
        };

        let first = repo.search_by_name("Αθήν", &config).await.unwrap();
        let second = repo.search_by_name("  Αθήν ", &config).await.unwrap();

        assert_eq!(first.len(), 2);
        assert!(Arc::ptr_eq(&first, &second));
    }

    /// Overpass stub that stays in flight for a second per query
    struct SlowOverpass {
        body: String,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl OverpassClient for SlowOverpass {
        async fn execute_query(&self, _query: &str) -> OverpassResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(self.body.clone())
        }

        fn server_health(&self) -> Vec<ServerHealth> {
            Vec::new()
        }

        fn metrics_summary(&self) -> MetricsSummary {
            MetricsSummary::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_searches_share_one_request() {
        let overpass = Arc::new(SlowOverpass {
            body: response(vec![boundary(2, "Αθήνα", 8, 37.95, 23.72, 0.02)]),
            calls: AtomicUsize::new(0),
        });
        let config = CacheConfig::default();
        let cache = Arc::new(OsmCacheManager::new(&config));
        let repo = BoundariesRepository::new(
            Arc::clone(&overpass) as Arc<dyn OverpassClient>,
            Arc::clone(&cache),
            &config,
        );
        let search = BoundarySearchConfig::default();

        let (a, b) = tokio::join!(
            repo.search_by_name("Αθήνα", &search),
            repo.search_by_name("Αθήνα", &search)
        );

        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(overpass.calls.load(Ordering::SeqCst), 1);
        let stats = cache.boundaries().stats();
        assert_eq!((stats.hits, stats.misses), (0, 2));

        repo.search_by_name("Αθήνα", &search).await.unwrap();
        assert_eq!(cache.boundaries().stats().hits, 1);
    }

    #[tokio::test]
    async fn search_uses_two_hour_ttl() {
        let mut mock = MockOverpass::new();
        mock.expect_execute_query()
            .returning(|_| Ok(response(vec![boundary(2, "Αθήνα", 8, 37.95, 23.72, 0.02)])));
        let config = CacheConfig::default();
        let cache = Arc::new(OsmCacheManager::new(&config));
        let repo = BoundariesRepository::new(Arc::new(mock), Arc::clone(&cache), &config);

        repo.search_by_name("Αθήνα", &BoundarySearchConfig::default())
            .await
            .unwrap();

        let key = generate_cache_key(
            "boundaries:search",
            &["Αθήνα", "4,5,6,7,8", "regex", "10", ""],
        );
        let info = cache.boundaries().entry_info(&key).unwrap();
        assert!(info.expires_in > Duration::from_secs(3600));
        assert!(info.expires_in <= Duration::from_secs(7200));
    }

    #[tokio::test]
    async fn find_by_admin_level_queries_level() {
        let mut mock = MockOverpass::new();
        mock.expect_execute_query()
            .withf(|query| {
                query.contains("[\"admin_level\"=\"6\"]") && query.contains("(37,23,38,24)")
            })
            .times(1)
            .returning(|_| Ok(response(vec![boundary(5, "Αττική", 6, 37.5, 23.0, 1.0)])));
        let repo = repository(mock);

        let bbox = BBox::new(37.0, 23.0, 38.0, 24.0).unwrap();
        let collection = repo.find_by_admin_level(6, Some(bbox)).await.unwrap();

        assert_eq!(collection.len(), 1);
        assert_eq!(collection.features[0].properties.admin_level, 6);
        assert!(repo.find_by_admin_level(12, None).await.is_err());
    }

    #[tokio::test]
    async fn containing_point_drops_non_containing_candidates() {
        let mut mock = MockOverpass::new();
        mock.expect_execute_query().returning(|_| {
            Ok(response(vec![
                // Municipality containing the point
                boundary(1, "Θεσσαλονίκη", 7, 40.6, 22.9, 0.1),
                // Region containing the point
                boundary(2, "Κεντρική Μακεδονία", 4, 40.0, 22.0, 2.0),
                // Neighbour intersecting the buffer only
                boundary(3, "Καλαμαριά", 7, 40.635, 22.945, 0.1),
            ]))
        });
        let repo = repository(mock);

        let point = Point::new(40.63, 22.94).unwrap();
        let collection = repo.find_containing_point(point, None).await.unwrap();

        let ids: Vec<&str> = collection.features.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, ["relation/2", "relation/1"]);
    }

    #[tokio::test]
    async fn errors_propagate() {
        let mut mock = MockOverpass::new();
        mock.expect_execute_query()
            .returning(|_| Err(OverpassError::Network("connection reset".to_string())));
        let repo = repository(mock);

        let err = repo
            .find_containing_point(Point::new(40.63, 22.94).unwrap(), Some(8))
            .await
            .unwrap_err();
        assert!(err.is_network());
    }
}

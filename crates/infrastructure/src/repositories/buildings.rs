//! Building lookups

use std::{cmp::Ordering, sync::Arc};

use integration_overpass::{
    BuildingsParser, OutputMode, OverpassClient, OverpassError, OverpassQueryBuilder,
    OverpassResult, TagFilter,
};
use tracing::{debug, info, instrument};

use domain::{
    BBox, BuildingCollection, BuildingFeature, OsmElementType, Point, text::escape_regex,
};

use super::{QueryExecutor, log_issues};
use crate::{
    cache::{OsmCacheManager, bbox_component, generate_cache_key},
    single_flight::SingleFlight,
};

/// Largest radius accepted by [`BuildingsRepository::find_near_point`]
pub const MAX_NEAR_RADIUS_M: f64 = 5_000.0;

/// Filters for building queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildingQueryConfig {
    /// Only these `building` values are queried (empty: all)
    pub include_types: Vec<String>,
    /// `building` values removed from the result
    pub exclude_types: Vec<String>,
    /// Truncate the result to this many features
    pub max_results: Option<usize>,
    /// Server-side query timeout
    pub timeout_secs: u32,
}

impl Default for BuildingQueryConfig {
    fn default() -> Self {
        Self {
            include_types: Vec::new(),
            exclude_types: Vec::new(),
            max_results: None,
            timeout_secs: integration_overpass::query::DEFAULT_QUERY_TIMEOUT_SECS,
        }
    }
}

impl BuildingQueryConfig {
    fn validate(&self) -> OverpassResult<()> {
        if self.timeout_secs == 0 {
            return Err(OverpassError::Validation(
                "timeout must be greater than 0".to_string(),
            ));
        }
        if self.max_results == Some(0) {
            return Err(OverpassError::Validation(
                "max_results must be greater than 0".to_string(),
            ));
        }
        if let Some(t) = self
            .include_types
            .iter()
            .chain(&self.exclude_types)
            .find(|t| t.trim().is_empty())
        {
            return Err(OverpassError::Validation(format!(
                "building type filter must not be blank, got {t:?}"
            )));
        }
        Ok(())
    }

    fn cache_components(&self) -> [String; 4] {
        // JSON arrays keep `["a,b"]` and `["a", "b"]` apart
        let sorted = |types: &[String]| {
            let mut types = types.to_vec();
            types.sort();
            serde_json::Value::from(types).to_string()
        };
        [
            sorted(&self.include_types),
            sorted(&self.exclude_types),
            self.max_results.map_or_else(String::new, |n| n.to_string()),
            self.timeout_secs.to_string(),
        ]
    }

    fn type_filter(&self) -> Option<TagFilter> {
        if self.include_types.is_empty() {
            return None;
        }
        let alternatives: Vec<String> = self
            .include_types
            .iter()
            .map(|t| escape_regex(t.trim()))
            .collect();
        Some(TagFilter::regex(
            "building",
            format!("^({})$", alternatives.join("|")),
        ))
    }

    fn is_excluded(&self, feature: &BuildingFeature) -> bool {
        self.exclude_types
            .iter()
            .any(|t| t.trim() == feature.properties.building)
    }
}

/// Buildings from Overpass, cached per bounding box and filter set
pub struct BuildingsRepository {
    executor: QueryExecutor,
    flight: SingleFlight<OverpassResult<Arc<BuildingCollection>>>,
}

impl std::fmt::Debug for BuildingsRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildingsRepository")
            .field("flight", &self.flight)
            .finish_non_exhaustive()
    }
}

impl BuildingsRepository {
    #[must_use]
    pub fn new(client: Arc<dyn OverpassClient>, cache: Arc<OsmCacheManager>) -> Self {
        Self {
            executor: QueryExecutor::new(client, cache),
            flight: SingleFlight::new(),
        }
    }

    /// Overpass QL for buildings in `bbox`
    ///
    /// # Errors
    ///
    /// Returns `OverpassError::Validation` for an invalid box or config.
    pub fn bbox_query(bbox: &BBox, config: &BuildingQueryConfig) -> OverpassResult<String> {
        config.validate()?;
        let mut builder = OverpassQueryBuilder::new()
            .way()
            .relation()
            .filter(TagFilter::exists("building"));
        if let Some(filter) = config.type_filter() {
            builder = builder.filter(filter);
        }
        builder
            .bbox(*bbox)
            .timeout(config.timeout_secs)
            .output(OutputMode::Geom)
            .build()
    }

    /// All buildings inside `bbox`
    ///
    /// Repeated calls with the same box and config are served from the
    /// buildings cache until the TTL expires; concurrent identical misses
    /// share a single request.
    ///
    /// # Errors
    ///
    /// Returns `OverpassError::Validation` for invalid input, or the HTTP
    /// or parse error of the request.
    #[instrument(skip(self, config), fields(bbox = %bbox))]
    pub async fn find_in_bbox(
        &self,
        bbox: &BBox,
        config: &BuildingQueryConfig,
    ) -> OverpassResult<Arc<BuildingCollection>> {
        bbox.validate()?;
        config.validate()?;

        let [include, exclude, max_results, timeout] = config.cache_components();
        let key = generate_cache_key(
            "buildings:bbox",
            &[&bbox_component(bbox), &include, &exclude, &max_results, &timeout],
        );
        if let Some(hit) = self.executor.cache().buildings().get(&key) {
            debug!(features = hit.len(), "Buildings cache hit");
            return Ok(hit);
        }

        self.flight
            .work(&key, || self.fetch_bbox(&key, bbox, config))
            .await
    }

    async fn fetch_bbox(
        &self,
        key: &str,
        bbox: &BBox,
        config: &BuildingQueryConfig,
    ) -> OverpassResult<Arc<BuildingCollection>> {
        // A previous leader may have filled the cache since the first lookup
        if let Some(hit) = self.executor.cache().buildings().peek(key) {
            return Ok(hit);
        }

        let query = Self::bbox_query(bbox, config)?;
        let body = self.executor.execute(&query).await?;
        let parsed = BuildingsParser::parse(&body)?;
        log_issues("find_in_bbox", &parsed.issues);

        let mut collection = parsed.collection;
        let before = collection.len();
        collection.features.retain(|f| !config.is_excluded(f));
        if let Some(max) = config.max_results {
            collection.features.truncate(max);
        }

        info!(
            parsed = before,
            returned = collection.len(),
            issues = parsed.issues.len(),
            "Buildings loaded"
        );

        let collection = Arc::new(collection);
        self.executor
            .cache()
            .buildings()
            .set_arc(key, Arc::clone(&collection), None);
        Ok(collection)
    }

    /// Buildings whose centroid lies within `radius_m` of `point`, nearest first
    ///
    /// # Errors
    ///
    /// Returns `OverpassError::Validation` for invalid coordinates or a
    /// radius outside `(0, MAX_NEAR_RADIUS_M]`, otherwise as
    /// [`find_in_bbox`](Self::find_in_bbox).
    #[instrument(skip(self, point, config), fields(point = %point))]
    pub async fn find_near_point(
        &self,
        point: Point,
        radius_m: f64,
        config: &BuildingQueryConfig,
    ) -> OverpassResult<BuildingCollection> {
        let point = Point::new(point.lat(), point.lng())?;
        if !radius_m.is_finite() || radius_m <= 0.0 || radius_m > MAX_NEAR_RADIUS_M {
            return Err(OverpassError::Validation(format!(
                "radius must be in (0, {MAX_NEAR_RADIUS_M}] meters, got {radius_m}"
            )));
        }

        let bbox = BBox::around(point, radius_m)?;
        let unbounded = BuildingQueryConfig {
            max_results: None,
            ..config.clone()
        };
        let candidates = self.find_in_bbox(&bbox, &unbounded).await?;

        let mut nearby: Vec<(f64, BuildingFeature)> = candidates
            .features
            .iter()
            .filter_map(|feature| {
                let distance = feature.geometry.centroid()?.distance_m(&point);
                (distance <= radius_m).then(|| (distance, feature.clone()))
            })
            .collect();
        nearby.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        if let Some(max) = config.max_results {
            nearby.truncate(max);
        }

        debug!(candidates = candidates.len(), nearby = nearby.len(), "Near-point filter");
        Ok(BuildingCollection::new(
            nearby.into_iter().map(|(_, feature)| feature).collect(),
        ))
    }

    /// A single building by OSM way or relation id
    ///
    /// Returns `Ok(None)` if the element does not exist, is not a building
    /// or has no usable footprint.
    ///
    /// # Errors
    ///
    /// Returns `OverpassError::Validation` for a non-positive id or a node
    /// type, otherwise the HTTP or parse error of the request.
    #[instrument(skip(self))]
    pub async fn find_by_id(
        &self,
        osm_id: i64,
        element_type: OsmElementType,
    ) -> OverpassResult<Option<BuildingFeature>> {
        if element_type == OsmElementType::Node {
            return Err(OverpassError::Validation(
                "buildings are ways or relations, not nodes".to_string(),
            ));
        }
        if osm_id <= 0 {
            return Err(OverpassError::Validation(format!(
                "element id must be positive, got {osm_id}"
            )));
        }

        let feature_id = format!("{element_type}/{osm_id}");
        let key = generate_cache_key("buildings:id", &[&feature_id]);
        let collection = match self.executor.cache().buildings().get(&key) {
            Some(hit) => hit,
            None => {
                self.flight
                    .work(&key, || self.fetch_by_id(&key, osm_id, element_type))
                    .await?
            },
        };

        Ok(collection.features.iter().find(|f| f.id == feature_id).cloned())
    }

    async fn fetch_by_id(
        &self,
        key: &str,
        osm_id: i64,
        element_type: OsmElementType,
    ) -> OverpassResult<Arc<BuildingCollection>> {
        let query = OverpassQueryBuilder::new()
            .element(element_type)
            .ids(&[osm_id])
            .filter(TagFilter::exists("building"))
            .output(OutputMode::Geom)
            .build()?;
        let body = self.executor.execute(&query).await?;
        let parsed = BuildingsParser::parse(&body)?;
        log_issues("find_by_id", &parsed.issues);

        let collection = Arc::new(parsed.collection);
        self.executor
            .cache()
            .buildings()
            .set_arc(key, Arc::clone(&collection), None);
        Ok(collection)
    }
}

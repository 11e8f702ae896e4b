//! Buildings parser
//!
//! Emits one polygon per way or relation carrying a `building` tag. For
//! relations only the first `outer` member is used as the footprint.

use tracing::debug;

use domain::{
    BuildingCategory, BuildingCollection, BuildingFeature, BuildingProperties, FeatureGeometry,
    IssueCode, OsmElementType, OsmRelation, OsmWay, Tags, ValidationIssue, format_address,
    osm::tag_value,
};

use super::{
    ElementIndex, ParseResult, ParseStats, ResolvedWay, close_ring, distinct_positions, prepare,
};
use crate::error::OverpassResult;

const MIN_DISTINCT_POSITIONS: usize = 3;

/// Converts Overpass responses into building features
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildingsParser;

impl BuildingsParser {
    /// Parse a raw Overpass response
    ///
    /// # Errors
    ///
    /// Returns `OverpassError::Parse` only if the response is not Overpass
    /// JSON; problems with individual buildings are reported as issues.
    pub fn parse(raw: &str) -> OverpassResult<ParseResult<BuildingProperties>> {
        let prepared = prepare(raw)?;
        let index = prepared.index;
        let mut issues = prepared.issues;
        let mut stats = ParseStats {
            elements: prepared.element_count,
            ..ParseStats::default()
        };
        let mut features = Vec::new();

        for way in index.ways().filter(|w| tag_value(&w.tags, "building").is_some()) {
            stats.candidates += 1;
            match Self::way_feature(way, &index, &mut issues) {
                Some(feature) => features.push(feature),
                None => stats.skipped += 1,
            }
        }

        for relation in index
            .relations()
            .iter()
            .filter(|r| tag_value(&r.tags, "building").is_some())
        {
            stats.candidates += 1;
            match Self::relation_feature(relation, &index, &mut issues) {
                Some(feature) => features.push(feature),
                None => stats.skipped += 1,
            }
        }

        stats.features = features.len();
        debug!(
            elements = stats.elements,
            features = stats.features,
            skipped = stats.skipped,
            issues = issues.len(),
            "Parsed buildings"
        );

        Ok(ParseResult {
            collection: BuildingCollection::new(features),
            issues,
            stats,
        })
    }

    /// Normalized properties for a building element
    #[must_use]
    pub fn properties(osm_id: i64, osm_type: OsmElementType, tags: &Tags) -> BuildingProperties {
        let building = tag_value(tags, "building").unwrap_or("yes").to_string();
        BuildingProperties {
            osm_id,
            osm_type,
            category: BuildingCategory::classify(&building),
            building,
            name: tag_value(tags, "name:el")
                .or_else(|| tag_value(tags, "name"))
                .map(str::to_string),
            address: format_address(tags),
            height: tag_value(tags, "height").map(str::to_string),
            levels: tag_value(tags, "building:levels").map(str::to_string),
            tags: tags.clone(),
        }
    }

    fn footprint(
        resolved: ResolvedWay,
        element_type: OsmElementType,
        id: i64,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<FeatureGeometry> {
        if !resolved.missing_nodes.is_empty() {
            issues.push(ValidationIssue::warning(
                IssueCode::MissingNode,
                format!(
                    "{element_type} {id} references {} node(s) missing from the response",
                    resolved.missing_nodes.len()
                ),
                Some(id),
            ));
        }

        let ring = close_ring(resolved.positions);
        let distinct = distinct_positions(&ring, MIN_DISTINCT_POSITIONS);
        if distinct < MIN_DISTINCT_POSITIONS {
            issues.push(ValidationIssue::error(
                IssueCode::InsufficientCoordinates,
                format!(
                    "{element_type} {id} has {distinct} distinct coordinates, \
                     at least {MIN_DISTINCT_POSITIONS} required"
                ),
                Some(id),
            ));
            return None;
        }

        Some(FeatureGeometry::Polygon(vec![ring]))
    }

    fn way_feature(
        way: &OsmWay,
        index: &ElementIndex,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<BuildingFeature> {
        let geometry = Self::footprint(
            index.way_positions(way),
            OsmElementType::Way,
            way.id,
            issues,
        )?;
        Some(BuildingFeature {
            id: format!("way/{}", way.id),
            geometry,
            properties: Self::properties(way.id, OsmElementType::Way, &way.tags),
        })
    }

    fn relation_feature(
        relation: &OsmRelation,
        index: &ElementIndex,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<BuildingFeature> {
        let Some(outer) = relation
            .members
            .iter()
            .find(|m| m.member_type == OsmElementType::Way && m.role == "outer")
        else {
            issues.push(ValidationIssue::error(
                IssueCode::NoOuterRing,
                format!("building relation {} has no outer member", relation.id),
                Some(relation.id),
            ));
            return None;
        };

        let Some(resolved) = index.member_positions(outer) else {
            issues.push(ValidationIssue::error(
                IssueCode::MissingWay,
                format!(
                    "building relation {} references way {} which is not in the response",
                    relation.id, outer.reference
                ),
                Some(relation.id),
            ));
            return None;
        };

        let geometry =
            Self::footprint(resolved, OsmElementType::Relation, relation.id, issues)?;
        Some(BuildingFeature {
            id: format!("relation/{}", relation.id),
            geometry,
            properties: Self::properties(relation.id, OsmElementType::Relation, &relation.tags),
        })
    }
}

//! Administrative boundaries parser

use tracing::debug;

use domain::{
    BoundaryCollection, BoundaryFeature, BoundaryProperties, IssueCode, NameVariants,
    OsmRelation, ValidationIssue,
    measure::{parse_area_km2, parse_population},
    osm::tag_value,
    parse_admin_level,
    text::normalize_area_name,
};

use super::{ElementIndex, ParseResult, ParseStats, RingAssembler, prepare};
use crate::error::OverpassResult;

/// Converts Overpass responses into administrative boundary features
///
/// Only relations tagged `boundary=administrative` are considered. Their
/// member ways are joined into rings by [`RingAssembler`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundariesParser;

impl BoundariesParser {
    /// Parse a raw Overpass response
    ///
    /// # Errors
    ///
    /// Returns `OverpassError::Parse` only if the response is not Overpass
    /// JSON; problems with individual boundaries are reported as issues.
    pub fn parse(raw: &str) -> OverpassResult<ParseResult<BoundaryProperties>> {
        let prepared = prepare(raw)?;
        let index = prepared.index;
        let mut issues = prepared.issues;
        let mut stats = ParseStats {
            elements: prepared.element_count,
            ..ParseStats::default()
        };
        let mut features = Vec::new();

        for relation in index
            .relations()
            .iter()
            .filter(|r| tag_value(&r.tags, "boundary") == Some("administrative"))
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
            "Parsed boundaries"
        );

        Ok(ParseResult {
            collection: BoundaryCollection::new(features),
            issues,
            stats,
        })
    }

    fn admin_level(relation: &OsmRelation, issues: &mut Vec<ValidationIssue>) -> Option<u8> {
        let Some(raw) = tag_value(&relation.tags, "admin_level") else {
            issues.push(ValidationIssue::error(
                IssueCode::MissingAdminLevel,
                format!("boundary {} has no admin_level", relation.id),
                Some(relation.id),
            ));
            return None;
        };
        let level = parse_admin_level(raw);
        if level.is_none() {
            issues.push(ValidationIssue::error(
                IssueCode::InvalidAdminLevel,
                format!("boundary {} has invalid admin_level '{raw}'", relation.id),
                Some(relation.id),
            ));
        }
        level
    }

    fn population(relation: &OsmRelation, issues: &mut Vec<ValidationIssue>) -> Option<u64> {
        let raw = tag_value(&relation.tags, "population")?;
        let population = parse_population(raw);
        if population.is_none() {
            issues.push(ValidationIssue::warning(
                IssueCode::InvalidPopulation,
                format!("boundary {} has unusable population '{raw}'", relation.id),
                Some(relation.id),
            ));
        }
        population
    }

    fn area(relation: &OsmRelation, issues: &mut Vec<ValidationIssue>) -> Option<f64> {
        let raw = tag_value(&relation.tags, "area")?;
        let area = parse_area_km2(raw);
        if area.is_none() {
            issues.push(ValidationIssue::warning(
                IssueCode::InvalidArea,
                format!("boundary {} has unusable area '{raw}'", relation.id),
                Some(relation.id),
            ));
        }
        area
    }

    fn relation_feature(
        relation: &OsmRelation,
        index: &ElementIndex,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<BoundaryFeature> {
        let admin_level = Self::admin_level(relation, issues)?;

        let names = NameVariants::from_tags(&relation.tags);
        let Some(name) = names.preferred() else {
            issues.push(ValidationIssue::error(
                IssueCode::MissingName,
                format!("boundary {} has no name", relation.id),
                Some(relation.id),
            ));
            return None;
        };
        if names.el.is_none() {
            issues.push(ValidationIssue::warning(
                IssueCode::MissingGreekName,
                format!("boundary {} ({name}) has no name:el", relation.id),
                Some(relation.id),
            ));
        }

        let rings = RingAssembler::new(index).assemble(relation, issues)?;
        let (geometry, orphans) = rings.into_geometry();
        if !orphans.is_empty() {
            issues.push(ValidationIssue::warning(
                IssueCode::InvalidElement,
                format!(
                    "boundary {} has {} inner ring(s) outside every outer ring",
                    relation.id,
                    orphans.len()
                ),
                Some(relation.id),
            ));
        }

        let properties = BoundaryProperties {
            osm_id: relation.id,
            admin_level,
            name: name.to_string(),
            normalized_name: normalize_area_name(name),
            name_el: names.el.map(str::to_string),
            name_en: names.en.map(str::to_string),
            official_name: names.official.map(str::to_string),
            population: Self::population(relation, issues),
            area_km2: Self::area(relation, issues),
            wikidata: tag_value(&relation.tags, "wikidata").map(str::to_string),
            tags: relation.tags.clone(),
        };

        Some(BoundaryFeature {
            id: format!("relation/{}", relation.id),
            geometry,
            properties,
        })
    }
}

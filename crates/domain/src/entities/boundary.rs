//! Administrative boundary features

use serde::{Deserialize, Serialize};

use super::feature::{Feature, FeatureCollection};
use crate::osm::{Tags, tag_value};

/// Lowest and highest admin levels defined by OSM
pub const ADMIN_LEVEL_RANGE: std::ops::RangeInclusive<u8> = 1..=11;

/// Normalized properties of an administrative boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryProperties {
    pub osm_id: i64,
    pub admin_level: u8,
    /// Display name chosen by priority: `name:el`, `name`, `name:en`, `official_name`
    pub name: String,
    /// Output of `normalize_area_name(name)`
    pub normalized_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_el: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub official_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_km2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wikidata: Option<String>,
    #[serde(default)]
    pub tags: Tags,
}

pub type BoundaryFeature = Feature<BoundaryProperties>;
pub type BoundaryCollection = FeatureCollection<BoundaryProperties>;

/// Name variants of a boundary in priority order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NameVariants<'a> {
    pub el: Option<&'a str>,
    pub default: Option<&'a str>,
    pub en: Option<&'a str>,
    pub official: Option<&'a str>,
}

impl<'a> NameVariants<'a> {
    #[must_use]
    pub fn from_tags(tags: &'a Tags) -> Self {
        Self {
            el: tag_value(tags, "name:el"),
            default: tag_value(tags, "name"),
            en: tag_value(tags, "name:en"),
            official: tag_value(tags, "official_name"),
        }
    }

    /// Preferred display name: Greek, then default, English, official
    #[must_use]
    pub fn preferred(&self) -> Option<&'a str> {
        self.el.or(self.default).or(self.en).or(self.official)
    }
}

/// Parse and range-check an `admin_level` tag
#[must_use]
pub fn parse_admin_level(raw: &str) -> Option<u8> {
    raw.trim()
        .parse::<u8>()
        .ok()
        .filter(|level| ADMIN_LEVEL_RANGE.contains(level))
}

//! Building features and classification helpers

use serde::{Deserialize, Serialize};
use std::fmt;

use super::feature::{Feature, FeatureCollection};
use crate::osm::{OsmElementType, Tags, tag_value};

/// Assumed storey height used for height/level estimation
pub const METERS_PER_LEVEL: f64 = 3.5;

/// Canonical building category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildingCategory {
    Residential,
    Commercial,
    Industrial,
    Public,
    Religious,
    Other,
}

impl BuildingCategory {
    /// Map a raw `building=*` value to its category
    #[must_use]
    pub fn classify(building: &str) -> Self {
        match building.trim().to_ascii_lowercase().as_str() {
            "residential" | "house" | "apartments" | "detached" | "semidetached_house"
            | "terrace" | "bungalow" | "cabin" | "dormitory" | "farm" | "static_caravan"
            | "houseboat" | "villa" | "hut" => Self::Residential,
            "commercial" | "retail" | "office" | "supermarket" | "kiosk" | "hotel" | "shop"
            | "mall" => Self::Commercial,
            "industrial" | "warehouse" | "factory" | "manufacture" | "hangar"
            | "storage_tank" | "silo" | "depot" => Self::Industrial,
            "public" | "civic" | "government" | "school" | "university" | "college"
            | "hospital" | "kindergarten" | "fire_station" | "train_station"
            | "transportation" | "museum" | "library" | "townhall" | "stadium"
            | "sports_hall" => Self::Public,
            "religious" | "church" | "chapel" | "cathedral" | "mosque" | "synagogue"
            | "temple" | "monastery" | "shrine" => Self::Religious,
            _ => Self::Other,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Residential => "residential",
            Self::Commercial => "commercial",
            Self::Industrial => "industrial",
            Self::Public => "public",
            Self::Religious => "religious",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for BuildingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized properties of a building feature
///
/// Height and levels are kept as the raw tag strings; use
/// [`parse_height_m`] and the estimation helpers to convert them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingProperties {
    pub osm_id: i64,
    pub osm_type: OsmElementType,
    /// Raw `building` tag value
    pub building: String,
    pub category: BuildingCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Formatted address, e.g. `Τσιμισκή 12, 54623 Θεσσαλονίκη`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<String>,
    #[serde(default)]
    pub tags: Tags,
}

pub type BuildingFeature = Feature<BuildingProperties>;
pub type BuildingCollection = FeatureCollection<BuildingProperties>;

/// Consolidate `addr:*` tags into one display string
///
/// Layout: `street housenumber, postcode city`; missing parts are skipped.
#[must_use]
pub fn format_address(tags: &Tags) -> Option<String> {
    let street = tag_value(tags, "addr:street");
    let number = tag_value(tags, "addr:housenumber");
    let postcode = tag_value(tags, "addr:postcode");
    let city = tag_value(tags, "addr:city").or_else(|| tag_value(tags, "addr:place"));

    let first = match (street, number) {
        (Some(s), Some(n)) => Some(format!("{s} {n}")),
        (Some(s), None) => Some(s.to_string()),
        (None, Some(n)) => Some(n.to_string()),
        (None, None) => None,
    };
    let second = match (postcode, city) {
        (Some(p), Some(c)) => Some(format!("{p} {c}")),
        (Some(p), None) => Some(p.to_string()),
        (None, Some(c)) => Some(c.to_string()),
        (None, None) => None,
    };

    match (first, second) {
        (Some(a), Some(b)) => Some(format!("{a}, {b}")),
        (a, b) => a.or(b),
    }
}

/// Parse an OSM `height` value in meters
///
/// Accepts plain numbers, `m` suffixes, decimal commas and feet (`ft` or `'`).
#[must_use]
pub fn parse_height_m(raw: &str) -> Option<f64> {
    let value = raw.trim().to_ascii_lowercase().replace(',', ".");
    let (number, factor) = if let Some(n) = value.strip_suffix("ft") {
        (n, 0.3048)
    } else if let Some(n) = value.strip_suffix('\'') {
        (n, 0.3048)
    } else if let Some(n) = value.strip_suffix('m') {
        (n, 1.0)
    } else {
        (value.as_str(), 1.0)
    };
    number
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|h| h.is_finite() && *h > 0.0)
        .map(|h| h * factor)
}

/// Estimate the number of levels from a height in meters (at least one)
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn estimate_levels_from_height(height_m: f64) -> u32 {
    if !height_m.is_finite() || height_m <= 0.0 {
        return 1;
    }
    // Bounded by the check above; heights beyond u32 are not realistic
    ((height_m / METERS_PER_LEVEL).round() as u32).max(1)
}

/// Estimate a building height in meters from its level count
#[must_use]
pub fn estimate_height_from_levels(levels: u32) -> f64 {
    f64::from(levels) * METERS_PER_LEVEL
}

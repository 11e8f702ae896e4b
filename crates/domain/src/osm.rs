//! Raw OpenStreetMap element model as returned by the Overpass JSON API

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Tag map of an OSM element
pub type Tags = BTreeMap<String, String>;

/// Kind of OSM element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsmElementType {
    Node,
    Way,
    Relation,
}

impl OsmElementType {
    /// Overpass QL statement keyword
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        }
    }

    /// Parse the `type` field of a raw element
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "node" => Some(Self::Node),
            "way" => Some(Self::Way),
            "relation" => Some(Self::Relation),
            _ => None,
        }
    }
}

impl fmt::Display for OsmElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inline coordinate emitted by `out geom`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometryPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeometryPoint {
    /// GeoJSON `[lng, lat]` position
    #[must_use]
    pub const fn position(&self) -> [f64; 2] {
        [self.lon, self.lat]
    }
}

/// OSM node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsmNode {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub tags: Tags,
}

impl OsmNode {
    #[must_use]
    pub const fn position(&self) -> [f64; 2] {
        [self.lon, self.lat]
    }
}

/// OSM way referencing nodes by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsmWay {
    pub id: i64,
    #[serde(default)]
    pub nodes: Vec<i64>,
    #[serde(default)]
    pub tags: Tags,
    /// Present when the query used `out geom`; entries may be null
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Vec<Option<GeometryPoint>>>,
}

/// Member of a relation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsmMember {
    #[serde(rename = "type")]
    pub member_type: OsmElementType,
    #[serde(rename = "ref")]
    pub reference: i64,
    #[serde(default)]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Vec<Option<GeometryPoint>>>,
}

/// OSM relation referencing nodes, ways or relations by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsmRelation {
    pub id: i64,
    #[serde(default)]
    pub members: Vec<OsmMember>,
    #[serde(default)]
    pub tags: Tags,
}

/// Any OSM element, discriminated by the `type` field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OsmElement {
    Node(OsmNode),
    Way(OsmWay),
    Relation(OsmRelation),
}

impl OsmElement {
    #[must_use]
    pub const fn id(&self) -> i64 {
        match self {
            Self::Node(n) => n.id,
            Self::Way(w) => w.id,
            Self::Relation(r) => r.id,
        }
    }

    #[must_use]
    pub const fn element_type(&self) -> OsmElementType {
        match self {
            Self::Node(_) => OsmElementType::Node,
            Self::Way(_) => OsmElementType::Way,
            Self::Relation(_) => OsmElementType::Relation,
        }
    }

    #[must_use]
    pub const fn tags(&self) -> &Tags {
        match self {
            Self::Node(n) => &n.tags,
            Self::Way(w) => &w.tags,
            Self::Relation(r) => &r.tags,
        }
    }

    /// Tag value with surrounding whitespace removed; empty values count as absent
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        tag_value(self.tags(), key)
    }
}

/// Trimmed, non-empty tag lookup
#[must_use]
pub fn tag_value<'a>(tags: &'a Tags, key: &str) -> Option<&'a str> {
    tags.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

//! Domain layer for the Overpass client
//!
//! Contains the coordinate value objects, the raw OSM element model, the
//! GeoJSON feature types produced by the parsers and the pure helper
//! functions shared by all other crates. No I/O happens here.

pub mod entities;
pub mod errors;
pub mod measure;
pub mod osm;
pub mod text;
pub mod validation;
pub mod value_objects;

pub use entities::*;
pub use errors::DomainError;
pub use osm::{
    GeometryPoint, OsmElement, OsmElementType, OsmMember, OsmNode, OsmRelation, OsmWay, Tags,
};
pub use validation::{IssueCode, Severity, ValidationIssue};
pub use value_objects::*;

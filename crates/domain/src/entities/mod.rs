//! Entities - GeoJSON features produced from OSM data

pub mod boundary;
pub mod building;
pub mod feature;

pub use boundary::{
    ADMIN_LEVEL_RANGE, BoundaryCollection, BoundaryFeature, BoundaryProperties, NameVariants,
    parse_admin_level,
};
pub use building::{
    BuildingCategory, BuildingCollection, BuildingFeature, BuildingProperties, METERS_PER_LEVEL,
    estimate_height_from_levels, estimate_levels_from_height, format_address, parse_height_m,
};
pub use feature::{Feature, FeatureCollection, FeatureGeometry, Position, Ring};

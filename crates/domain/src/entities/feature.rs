//! GeoJSON feature model for parsed OSM geometry

use geo::{BoundingRect, Centroid, Contains};
use serde::{Deserialize, Serialize};

use crate::value_objects::{BBox, Point};

/// GeoJSON position, longitude first
pub type Position = [f64; 2];

/// Closed coordinate ring (first position equals last)
pub type Ring = Vec<Position>;

/// Polygonal geometry produced by the parsers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum FeatureGeometry {
    /// One outer ring followed by zero or more holes
    Polygon(Vec<Ring>),
    /// Several polygons, each an outer ring followed by its holes
    MultiPolygon(Vec<Vec<Ring>>),
}

fn to_geo_ring(ring: &Ring) -> geo::LineString<f64> {
    ring.iter()
        .map(|p| geo::coord! { x: p[0], y: p[1] })
        .collect::<Vec<_>>()
        .into()
}

fn to_geo_polygon(rings: &[Ring]) -> Option<geo::Polygon<f64>> {
    let (outer, holes) = rings.split_first()?;
    Some(geo::Polygon::new(
        to_geo_ring(outer),
        holes.iter().map(to_geo_ring).collect(),
    ))
}

impl FeatureGeometry {
    /// Polygons as slices of rings, regardless of variant
    #[must_use]
    pub fn polygons(&self) -> Vec<&[Ring]> {
        match self {
            Self::Polygon(rings) => vec![rings.as_slice()],
            Self::MultiPolygon(polygons) => polygons.iter().map(Vec::as_slice).collect(),
        }
    }

    /// First outer ring, used as the footprint of simple features
    #[must_use]
    pub fn exterior(&self) -> Option<&Ring> {
        match self {
            Self::Polygon(rings) => rings.first(),
            Self::MultiPolygon(polygons) => polygons.first().and_then(|p| p.first()),
        }
    }

    /// Convert to a `geo` multipolygon for spatial predicates
    #[must_use]
    pub fn to_geo(&self) -> geo::MultiPolygon<f64> {
        geo::MultiPolygon::new(
            self.polygons()
                .into_iter()
                .filter_map(to_geo_polygon)
                .collect(),
        )
    }

    /// Exact point-in-polygon test honouring holes
    #[must_use]
    pub fn contains_point(&self, point: &Point) -> bool {
        let coord: geo::Coord<f64> = (*point).into();
        self.to_geo().contains(&geo::Point::from(coord))
    }

    /// Area-weighted centroid
    #[must_use]
    pub fn centroid(&self) -> Option<Point> {
        self.to_geo()
            .centroid()
            .map(|c| Point::new_unchecked(c.y(), c.x()))
    }

    /// Bounding box of all rings
    #[must_use]
    pub fn bounds(&self) -> Option<BBox> {
        self.to_geo().bounding_rect().map(|rect| BBox {
            south: rect.min().y,
            west: rect.min().x,
            north: rect.max().y,
            east: rect.max().x,
        })
    }

    /// Convert into a `geojson` geometry
    #[must_use]
    pub fn to_geojson(&self) -> geojson::Geometry {
        let ring = |r: &Ring| r.iter().map(|p| p.to_vec()).collect::<Vec<_>>();
        let value = match self {
            Self::Polygon(rings) => geojson::Value::Polygon(rings.iter().map(ring).collect()),
            Self::MultiPolygon(polygons) => geojson::Value::MultiPolygon(
                polygons
                    .iter()
                    .map(|rings| rings.iter().map(ring).collect())
                    .collect(),
            ),
        };
        geojson::Geometry::new(value)
    }
}

/// A GeoJSON feature with typed properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct Feature<P> {
    /// `"{type}/{id}"`, e.g. `way/123`
    pub id: String,
    pub geometry: FeatureGeometry,
    pub properties: P,
}

impl<P: Serialize> Feature<P> {
    /// Convert into an untyped `geojson` feature
    ///
    /// # Errors
    ///
    /// Returns an error if the properties do not serialize to a JSON object.
    pub fn to_geojson(&self) -> Result<geojson::Feature, serde_json::Error> {
        let properties = match serde_json::to_value(&self.properties)? {
            serde_json::Value::Object(map) => Some(map),
            serde_json::Value::Null => None,
            other => {
                return Err(serde::ser::Error::custom(format!(
                    "feature properties must be an object, got {other}"
                )));
            },
        };
        Ok(geojson::Feature {
            bbox: None,
            geometry: Some(self.geometry.to_geojson()),
            id: Some(geojson::feature::Id::String(self.id.clone())),
            properties,
            foreign_members: None,
        })
    }
}

/// A GeoJSON feature collection with typed properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct FeatureCollection<P> {
    pub features: Vec<Feature<P>>,
}

impl<P> Default for FeatureCollection<P> {
    fn default() -> Self {
        Self {
            features: Vec::new(),
        }
    }
}

impl<P> FeatureCollection<P> {
    #[must_use]
    pub const fn new(features: Vec<Feature<P>>) -> Self {
        Self { features }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl<P: Serialize> FeatureCollection<P> {
    /// Convert into an untyped `geojson` collection
    ///
    /// # Errors
    ///
    /// Propagates property serialization failures.
    pub fn to_geojson(&self) -> Result<geojson::FeatureCollection, serde_json::Error> {
        Ok(geojson::FeatureCollection {
            bbox: None,
            features: self
                .features
                .iter()
                .map(Feature::to_geojson)
                .collect::<Result<_, _>>()?,
            foreign_members: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> Ring {
        vec![
            [x0, y0],
            [x0 + size, y0],
            [x0 + size, y0 + size],
            [x0, y0 + size],
            [x0, y0],
        ]
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Props {
        name: String,
    }

    #[test]
    fn polygon_serializes_as_geojson() {
        let geometry = FeatureGeometry::Polygon(vec![square(23.0, 40.0, 1.0)]);
        let json = serde_json::to_value(&geometry).unwrap();
        assert_eq!(json["type"], "Polygon");
        assert_eq!(json["coordinates"][0][0][0], 23.0);
    }

    #[test]
    fn feature_has_type_tag() {
        let feature = Feature {
            id: "way/1".to_string(),
            geometry: FeatureGeometry::Polygon(vec![square(23.0, 40.0, 1.0)]),
            properties: Props {
                name: "x".to_string(),
            },
        };
        let collection = FeatureCollection::new(vec![feature]);
        let json = serde_json::to_value(&collection).unwrap();
        assert_eq!(json["type"], "FeatureCollection");
        assert_eq!(json["features"][0]["type"], "Feature");
        assert_eq!(json["features"][0]["properties"]["name"], "x");

        let back: FeatureCollection<Props> = serde_json::from_value(json).unwrap();
        assert_eq!(back, collection);
    }

    #[test]
    fn contains_point_respects_holes() {
        let geometry =
            FeatureGeometry::Polygon(vec![square(0.0, 0.0, 10.0), square(4.0, 4.0, 2.0)]);
        assert!(geometry.contains_point(&Point::new_unchecked(1.0, 1.0)));
        assert!(!geometry.contains_point(&Point::new_unchecked(5.0, 5.0)));
        assert!(!geometry.contains_point(&Point::new_unchecked(20.0, 20.0)));
    }

    #[test]
    fn multipolygon_contains_either_part() {
        let geometry = FeatureGeometry::MultiPolygon(vec![
            vec![square(0.0, 0.0, 1.0)],
            vec![square(5.0, 5.0, 1.0)],
        ]);
        assert_eq!(geometry.polygons().len(), 2);
        assert!(geometry.contains_point(&Point::new_unchecked(5.5, 5.5)));
        assert!(geometry.contains_point(&Point::new_unchecked(0.5, 0.5)));
    }

    #[test]
    fn centroid_and_bounds() {
        let geometry = FeatureGeometry::Polygon(vec![square(22.0, 40.0, 2.0)]);
        let centroid = geometry.centroid().unwrap();
        assert!((centroid.lat() - 41.0).abs() < 1e-9);
        assert!((centroid.lng() - 23.0).abs() < 1e-9);

        let bounds = geometry.bounds().unwrap();
        assert!((bounds.south - 40.0).abs() < f64::EPSILON);
        assert!((bounds.east - 24.0).abs() < f64::EPSILON);
    }

    #[test]
    fn converts_to_geojson_crate_types() {
        let feature = Feature {
            id: "relation/9".to_string(),
            geometry: FeatureGeometry::Polygon(vec![square(23.0, 40.0, 1.0)]),
            properties: Props {
                name: "Καλαμαριά".to_string(),
            },
        };
        let gj = feature.to_geojson().unwrap();
        assert!(gj.geometry.is_some());
        assert_eq!(
            gj.properties.unwrap()["name"],
            serde_json::json!("Καλαμαριά")
        );
    }
}

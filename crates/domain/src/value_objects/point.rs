//! Geographic point value object

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::DomainError;

/// Mean earth radius used for great-circle calculations
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Latitude in degrees (-90 to 90)
    lat: f64,
    /// Longitude in degrees (-180 to 180)
    lng: f64,
}

impl Point {
    /// Create a new point with validation
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidCoordinates` if a component is not finite,
    /// latitude is not in [-90, 90] or longitude is not in [-180, 180]
    pub fn new(lat: f64, lng: f64) -> Result<Self, DomainError> {
        if !lat.is_finite()
            || !lng.is_finite()
            || !(-90.0..=90.0).contains(&lat)
            || !(-180.0..=180.0).contains(&lng)
        {
            return Err(DomainError::InvalidCoordinates { lat, lng });
        }
        Ok(Self { lat, lng })
    }

    /// Create a point without validation (for trusted sources)
    #[must_use]
    pub const fn new_unchecked(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Get the latitude
    #[must_use]
    pub const fn lat(&self) -> f64 {
        self.lat
    }

    /// Get the longitude
    #[must_use]
    pub const fn lng(&self) -> f64 {
        self.lng
    }

    /// Great-circle distance to another point in meters (Haversine)
    #[must_use]
    pub fn distance_m(&self, other: &Self) -> f64 {
        let lat1_rad = self.lat.to_radians();
        let lat2_rad = other.lat.to_radians();
        let delta_lat = (other.lat - self.lat).to_radians();
        let delta_lng = (other.lng - self.lng).to_radians();

        let a = (lat1_rad.cos() * lat2_rad.cos()).mul_add(
            (delta_lng / 2.0).sin().powi(2),
            (delta_lat / 2.0).sin().powi(2),
        );
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_M * c
    }

    /// Initial bearing towards another point in degrees, normalized to [0, 360)
    #[must_use]
    pub fn bearing_deg(&self, other: &Self) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let delta_lng = (other.lng - self.lng).to_radians();

        let y = delta_lng.sin() * lat2.cos();
        let x = lat1
            .cos()
            .mul_add(lat2.sin(), -(lat1.sin() * lat2.cos() * delta_lng.cos()));

        (y.atan2(x).to_degrees() + 360.0) % 360.0
    }

    /// Leaflet-style `[lat, lng]` pair
    #[must_use]
    pub const fn to_lat_lng_array(&self) -> [f64; 2] {
        [self.lat, self.lng]
    }

    /// Build a point from a Leaflet-style `[lat, lng]` pair
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidCoordinates` for out-of-range values.
    pub fn from_lat_lng_array(pair: [f64; 2]) -> Result<Self, DomainError> {
        Self::new(pair[0], pair[1])
    }

    /// GeoJSON position, which orders longitude first
    #[must_use]
    pub const fn to_geojson_position(&self) -> [f64; 2] {
        [self.lng, self.lat]
    }

    /// Build a point from a GeoJSON `[lng, lat]` position
    #[must_use]
    pub const fn from_geojson_position(position: [f64; 2]) -> Self {
        Self::new_unchecked(position[1], position[0])
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.lat, self.lng)
    }
}

impl From<Point> for geo::Coord<f64> {
    fn from(point: Point) -> Self {
        geo::coord! { x: point.lng, y: point.lat }
    }
}

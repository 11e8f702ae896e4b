//! Axis-aligned bounding box value object

use serde::{Deserialize, Serialize};
use std::fmt;

use super::point::{EARTH_RADIUS_M, Point};
use crate::errors::DomainError;

/// Meters per degree of latitude (spherical approximation)
const METERS_PER_DEGREE: f64 = std::f64::consts::PI * EARTH_RADIUS_M / 180.0;

/// A bounding rectangle in WGS84 degrees
///
/// Invariant: `south < north` and `west < east`. Boxes crossing the
/// antimeridian are not supported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BBox {
    /// Create a validated bounding box
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidBoundingBox` if any edge is not finite,
    /// outside WGS84, or the edges are not strictly ordered.
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Result<Self, DomainError> {
        let bbox = Self {
            south,
            west,
            north,
            east,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    /// Check the invariants of a box built from a struct literal
    ///
    /// # Errors
    ///
    /// See [`BBox::new`].
    pub fn validate(&self) -> Result<(), DomainError> {
        let edges = [self.south, self.west, self.north, self.east];
        if edges.iter().any(|v| !v.is_finite()) {
            return Err(DomainError::InvalidBoundingBox(
                "edges must be finite numbers".to_string(),
            ));
        }
        if !(-90.0..=90.0).contains(&self.south) || !(-90.0..=90.0).contains(&self.north) {
            return Err(DomainError::InvalidBoundingBox(format!(
                "latitude out of range: south={}, north={}",
                self.south, self.north
            )));
        }
        if !(-180.0..=180.0).contains(&self.west) || !(-180.0..=180.0).contains(&self.east) {
            return Err(DomainError::InvalidBoundingBox(format!(
                "longitude out of range: west={}, east={}",
                self.west, self.east
            )));
        }
        if self.south >= self.north {
            return Err(DomainError::InvalidBoundingBox(format!(
                "south ({}) must be less than north ({})",
                self.south, self.north
            )));
        }
        if self.west >= self.east {
            return Err(DomainError::InvalidBoundingBox(format!(
                "west ({}) must be less than east ({})",
                self.west, self.east
            )));
        }
        Ok(())
    }

    /// Square box around a point, `radius_m` meters to each side, clamped to WGS84
    ///
    /// # Errors
    ///
    /// Returns an error if the radius is not positive.
    pub fn around(center: Point, radius_m: f64) -> Result<Self, DomainError> {
        if !radius_m.is_finite() || radius_m <= 0.0 {
            return Err(DomainError::ValidationError(format!(
                "radius must be positive, got {radius_m}"
            )));
        }
        let delta_lat = radius_m / METERS_PER_DEGREE;
        let cos_lat = center.lat().to_radians().cos().max(1e-6);
        let delta_lng = radius_m / (METERS_PER_DEGREE * cos_lat);

        Self::new(
            (center.lat() - delta_lat).max(-90.0),
            (center.lng() - delta_lng).max(-180.0),
            (center.lat() + delta_lat).min(90.0),
            (center.lng() + delta_lng).min(180.0),
        )
    }

    /// Box extending `degrees` in every direction from a point
    ///
    /// # Errors
    ///
    /// Returns an error if `degrees` is not positive.
    pub fn buffer(center: Point, degrees: f64) -> Result<Self, DomainError> {
        if !degrees.is_finite() || degrees <= 0.0 {
            return Err(DomainError::ValidationError(format!(
                "buffer must be positive, got {degrees}"
            )));
        }
        Self::new(
            (center.lat() - degrees).max(-90.0),
            (center.lng() - degrees).max(-180.0),
            (center.lat() + degrees).min(90.0),
            (center.lng() + degrees).min(180.0),
        )
    }

    /// Center of the box
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new_unchecked(
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }

    /// Whether the point lies inside or on the edge of the box
    #[must_use]
    pub fn contains(&self, point: &Point) -> bool {
        (self.south..=self.north).contains(&point.lat())
            && (self.west..=self.east).contains(&point.lng())
    }

    /// Whether two boxes overlap (touching edges count)
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.south <= other.north
            && other.south <= self.north
            && self.west <= other.east
            && other.west <= self.east
    }

    /// Grow the box by `degrees` on every side, clamped to WGS84
    #[must_use]
    pub fn expand(&self, degrees: f64) -> Self {
        Self {
            south: (self.south - degrees).max(-90.0),
            west: (self.west - degrees).max(-180.0),
            north: (self.north + degrees).min(90.0),
            east: (self.east + degrees).min(180.0),
        }
    }

    /// Approximate area in square kilometers
    #[must_use]
    pub fn area_km2(&self) -> f64 {
        let height_m = (self.north - self.south) * METERS_PER_DEGREE;
        let mid_lat = f64::midpoint(self.south, self.north).to_radians();
        let width_m = (self.east - self.west) * METERS_PER_DEGREE * mid_lat.cos();
        height_m * width_m / 1_000_000.0
    }

    /// Overpass QL bbox clause body: `south,west,north,east`
    #[must_use]
    pub fn to_overpass(&self) -> String {
        format!("{},{},{},{}", self.south, self.west, self.north, self.east)
    }
}

impl fmt::Display for BBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.to_overpass())
    }
}

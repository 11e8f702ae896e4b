//! Domain-level errors

use thiserror::Error;

/// Errors raised when constructing or validating domain values
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    /// Coordinates outside the WGS84 range or not finite
    #[error("Invalid coordinates: lat={lat}, lng={lng}")]
    InvalidCoordinates { lat: f64, lng: f64 },

    /// Bounding box violates south < north, west < east
    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    /// Free-text search input rejected by the injection checks
    #[error("Invalid search query: {0}")]
    InvalidSearchQuery(String),

    /// URL is malformed or not on the allow-list
    #[error("URL not allowed: {0}")]
    UrlNotAllowed(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

//! Value Objects - Immutable, identity-less domain primitives

mod bbox;
mod point;

pub use bbox::BBox;
pub use point::{EARTH_RADIUS_M, Point};

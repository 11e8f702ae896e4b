//! Structural validation of raw Overpass elements
//!
//! Elements are checked one by one from untyped JSON so a single malformed
//! element becomes an issue instead of failing the whole response.

use serde_json::Value;

use domain::{IssueCode, OsmElement, OsmElementType, ValidationIssue};

/// Minimum node references for a way to describe any geometry
pub const MIN_WAY_NODES: usize = 2;

fn array_len(value: &Value, key: &str) -> usize {
    value.get(key).and_then(Value::as_array).map_or(0, Vec::len)
}

fn check_coordinates(value: &Value, id: i64) -> Result<(), ValidationIssue> {
    let lat = value.get("lat").and_then(Value::as_f64);
    let lon = value.get("lon").and_then(Value::as_f64);
    match (lat, lon) {
        (Some(lat), Some(lon))
            if lat.is_finite()
                && lon.is_finite()
                && (-90.0..=90.0).contains(&lat)
                && (-180.0..=180.0).contains(&lon) =>
        {
            Ok(())
        },
        _ => Err(ValidationIssue::error(
            IssueCode::InvalidCoordinates,
            format!("node {id} has missing or out-of-range coordinates"),
            Some(id),
        )),
    }
}

/// Validate one raw element and decode it
///
/// Checks, in order: object shape, positive integer id, known element type,
/// node coordinates, minimum way node count and relation member shape.
///
/// # Errors
///
/// Returns the first error-severity issue found.
pub fn validate_element(value: &Value) -> Result<OsmElement, ValidationIssue> {
    if !value.is_object() {
        return Err(ValidationIssue::error(
            IssueCode::InvalidElement,
            "element is not a JSON object",
            None,
        ));
    }

    let id = match value.get("id").and_then(Value::as_i64) {
        Some(id) if id > 0 => id,
        _ => {
            return Err(ValidationIssue::error(
                IssueCode::InvalidId,
                format!("element id must be a positive integer, got {}", value["id"]),
                None,
            ));
        },
    };

    let element_type = value
        .get("type")
        .and_then(Value::as_str)
        .and_then(OsmElementType::parse)
        .ok_or_else(|| {
            ValidationIssue::error(
                IssueCode::InvalidElementType,
                format!("element {id} has unknown type {}", value["type"]),
                Some(id),
            )
        })?;

    match element_type {
        OsmElementType::Node => check_coordinates(value, id)?,
        OsmElementType::Way => {
            let count = array_len(value, "nodes").max(array_len(value, "geometry"));
            if count < MIN_WAY_NODES {
                return Err(ValidationIssue::error(
                    IssueCode::InsufficientNodes,
                    format!("way {id} references {count} nodes, at least {MIN_WAY_NODES} required"),
                    Some(id),
                ));
            }
        },
        OsmElementType::Relation => {
            if value.get("members").is_some_and(|m| !m.is_array()) {
                return Err(ValidationIssue::error(
                    IssueCode::InvalidElement,
                    format!("relation {id} members is not an array"),
                    Some(id),
                ));
            }
        },
    }

    serde_json::from_value(value.clone()).map_err(|e| {
        ValidationIssue::error(
            IssueCode::InvalidElement,
            format!("{element_type} {id} could not be decoded: {e}"),
            Some(id),
        )
    })
}

/// Validate every element, keeping the valid ones in input order
pub fn validate_elements(values: &[Value]) -> (Vec<OsmElement>, Vec<ValidationIssue>) {
    let mut elements = Vec::with_capacity(values.len());
    let mut issues = Vec::new();
    for value in values {
        match validate_element(value) {
            Ok(element) => elements.push(element),
            Err(issue) => issues.push(issue),
        }
    }
    (elements, issues)
}

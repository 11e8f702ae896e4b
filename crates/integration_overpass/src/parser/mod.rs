//! Overpass JSON parsers
//!
//! Each parse builds its own [`ElementIndex`] over the response, resolves way
//! and relation references through it and drops it afterwards. Problems with
//! individual elements or features become [`ValidationIssue`]s on the
//! [`ParseResult`]; only a response that is not Overpass JSON at all fails
//! the whole parse.

mod boundaries;
mod buildings;
mod rings;
pub mod validation;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use domain::{
    FeatureCollection, GeometryPoint, IssueCode, OsmElement, OsmMember, OsmNode, OsmRelation,
    OsmWay, Position, ValidationIssue, validation::has_errors,
};

use crate::error::{OverpassError, OverpassResult};

pub use boundaries::BoundariesParser;
pub use buildings::BuildingsParser;
pub use rings::{AssembledRings, RingAssembler, close_ring, distinct_positions};

/// Counters describing one parse
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStats {
    /// Raw elements in the response
    pub elements: usize,
    /// Candidate features considered by the parser
    pub candidates: usize,
    /// Features emitted
    pub features: usize,
    /// Candidates dropped because of an error
    pub skipped: usize,
}

/// Parsed collection plus everything noticed along the way
#[derive(Debug, Clone, PartialEq)]
pub struct ParseResult<P> {
    pub collection: FeatureCollection<P>,
    pub issues: Vec<ValidationIssue>,
    pub stats: ParseStats,
}

impl<P> ParseResult<P> {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        has_errors(&self.issues)
    }

    /// Error-severity issues
    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.is_error())
    }

    /// Issues with the given code
    pub fn issues_with(&self, code: IssueCode) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.code == code)
    }
}

/// Top-level shape of an Overpass JSON response
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub elements: Vec<Value>,
    pub remark: Option<String>,
}

/// Decode the response envelope without interpreting the elements
///
/// # Errors
///
/// Returns `OverpassError::Parse` if the body is not JSON or has no
/// `elements` array.
pub fn parse_envelope(raw: &str) -> OverpassResult<RawResponse> {
    let mut value: Value = serde_json::from_str(raw)?;
    let object = value
        .as_object_mut()
        .ok_or_else(|| OverpassError::Parse("response is not a JSON object".to_string()))?;

    let elements = match object.remove("elements") {
        Some(Value::Array(elements)) => elements,
        Some(_) => {
            return Err(OverpassError::Parse(
                "response field 'elements' is not an array".to_string(),
            ));
        },
        None => {
            return Err(OverpassError::Parse(
                "response has no 'elements' field".to_string(),
            ));
        },
    };

    let remark = object
        .get("remark")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(RawResponse { elements, remark })
}

/// Turn an Overpass `remark` into an issue; runtime errors mean truncated data
#[must_use]
pub fn remark_issue(remark: &str) -> ValidationIssue {
    let message = format!("Overpass remark: {}", remark.trim());
    if remark.to_ascii_lowercase().contains("runtime error") {
        ValidationIssue::warning(IssueCode::OverpassRemark, message, None)
    } else {
        ValidationIssue::info(IssueCode::OverpassRemark, message, None)
    }
}

/// Coordinates resolved for a way, plus the nodes that could not be found
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedWay {
    pub positions: Vec<Position>,
    /// Id of each missing node, `None` when the id is not known (a `null`
    /// in a relation member's inline geometry)
    pub missing_nodes: Vec<Option<i64>>,
}

/// Per-parse lookup tables over the response elements
#[derive(Debug, Default)]
pub struct ElementIndex {
    nodes: HashMap<i64, OsmNode>,
    ways: HashMap<i64, OsmWay>,
    way_order: Vec<i64>,
    relations: Vec<OsmRelation>,
}

impl ElementIndex {
    /// Build the index; the first occurrence of a way or relation wins,
    /// since recursed output repeats elements without tags
    #[must_use]
    pub fn new(elements: Vec<OsmElement>) -> Self {
        let mut index = Self::default();
        let mut seen_relations = std::collections::HashSet::new();
        for element in elements {
            match element {
                OsmElement::Node(node) => {
                    index.nodes.entry(node.id).or_insert(node);
                },
                OsmElement::Way(way) => {
                    if !index.ways.contains_key(&way.id) {
                        index.way_order.push(way.id);
                        index.ways.insert(way.id, way);
                    }
                },
                OsmElement::Relation(relation) => {
                    if seen_relations.insert(relation.id) {
                        index.relations.push(relation);
                    }
                },
            }
        }
        index
    }

    #[must_use]
    pub fn node(&self, id: i64) -> Option<&OsmNode> {
        self.nodes.get(&id)
    }

    #[must_use]
    pub fn way(&self, id: i64) -> Option<&OsmWay> {
        self.ways.get(&id)
    }

    /// Ways in response order
    pub fn ways(&self) -> impl Iterator<Item = &OsmWay> {
        self.way_order.iter().filter_map(|id| self.ways.get(id))
    }

    #[must_use]
    pub fn relations(&self) -> &[OsmRelation] {
        &self.relations
    }

    fn resolve(
        &self,
        node_ids: &[i64],
        geometry: Option<&Vec<Option<GeometryPoint>>>,
    ) -> ResolvedWay {
        let mut resolved = ResolvedWay::default();
        if let Some(geometry) = geometry {
            for (i, point) in geometry.iter().enumerate() {
                match point {
                    Some(point) => resolved.positions.push(point.position()),
                    None => resolved.missing_nodes.push(node_ids.get(i).copied()),
                }
            }
        } else {
            for id in node_ids {
                match self.nodes.get(id) {
                    Some(node) => resolved.positions.push(node.position()),
                    None => resolved.missing_nodes.push(Some(*id)),
                }
            }
        }
        resolved
    }

    /// Coordinates of a way, preferring inline geometry
    #[must_use]
    pub fn way_positions(&self, way: &OsmWay) -> ResolvedWay {
        self.resolve(&way.nodes, way.geometry.as_ref())
    }

    /// Coordinates of a way member, from inline geometry or the referenced way
    ///
    /// Returns `None` if the member carries no geometry and its way is not
    /// part of the response.
    #[must_use]
    pub fn member_positions(&self, member: &OsmMember) -> Option<ResolvedWay> {
        if let Some(geometry) = &member.geometry {
            let node_ids = self
                .ways
                .get(&member.reference)
                .map_or(&[][..], |way| way.nodes.as_slice());
            return Some(self.resolve(node_ids, Some(geometry)));
        }
        self.ways.get(&member.reference).map(|way| self.way_positions(way))
    }
}

/// Envelope, element validation and index construction shared by both parsers
pub(crate) struct Prepared {
    pub index: ElementIndex,
    pub issues: Vec<ValidationIssue>,
    pub element_count: usize,
}

pub(crate) fn prepare(raw: &str) -> OverpassResult<Prepared> {
    let envelope = parse_envelope(raw)?;
    let element_count = envelope.elements.len();
    let (elements, mut issues) = validation::validate_elements(&envelope.elements);
    if let Some(remark) = envelope.remark.as_deref() {
        issues.push(remark_issue(remark));
    }
    Ok(Prepared {
        index: ElementIndex::new(elements),
        issues,
        element_count,
    })
}

#[cfg(test)]
mod tests {
    use domain::OsmElementType;

    use super::*;

    #[test]
    fn envelope_requires_elements_array() {
        assert!(matches!(
            parse_envelope("not json"),
            Err(OverpassError::Parse(_))
        ));
        assert!(matches!(parse_envelope("[]"), Err(OverpassError::Parse(_))));
        assert!(matches!(
            parse_envelope(r#"{"version":0.6}"#),
            Err(OverpassError::Parse(msg)) if msg.contains("elements")
        ));
        assert!(matches!(
            parse_envelope(r#"{"elements":{}}"#),
            Err(OverpassError::Parse(_))
        ));

        let envelope = parse_envelope(r#"{"version":0.6,"elements":[]}"#).unwrap();
        assert!(envelope.elements.is_empty());
        assert_eq!(envelope.remark, None);
    }

    #[test]
    fn remark_severity() {
        let issue = remark_issue("runtime error: Query timed out in \"query\" at line 3");
        assert_eq!(issue.code, IssueCode::OverpassRemark);
        assert_eq!(issue.severity, domain::Severity::Warning);

        let issue = remark_issue("something informational");
        assert_eq!(issue.severity, domain::Severity::Info);
    }

    #[test]
    fn prepare_attaches_remark() {
        let raw = r#"{"elements":[],"remark":"runtime error: out of memory"}"#;
        let prepared = prepare(raw).unwrap();
        assert_eq!(prepared.issues.len(), 1);
        assert_eq!(prepared.element_count, 0);
    }

    #[test]
    fn index_resolves_nodes_and_reports_missing() {
        let raw = r#"{"elements":[
            {"type":"node","id":1,"lat":40.0,"lon":22.0},
            {"type":"node","id":2,"lat":40.0,"lon":22.1},
            {"type":"way","id":10,"nodes":[1,2,3]}
        ]}"#;
        let prepared = prepare(raw).unwrap();
        let way = prepared.index.way(10).unwrap();
        let resolved = prepared.index.way_positions(way);
        assert_eq!(resolved.positions, vec![[22.0, 40.0], [22.1, 40.0]]);
        assert_eq!(resolved.missing_nodes, vec![Some(3)]);
    }

    #[test]
    fn index_prefers_inline_geometry() {
        let raw = r#"{"elements":[
            {"type":"way","id":10,"nodes":[1,2],
             "geometry":[{"lat":1.0,"lon":2.0},null]}
        ]}"#;
        let prepared = prepare(raw).unwrap();
        let way = prepared.index.way(10).unwrap();
        let resolved = prepared.index.way_positions(way);
        assert_eq!(resolved.positions, vec![[2.0, 1.0]]);
        assert_eq!(resolved.missing_nodes, vec![Some(2)]);
    }

    #[test]
    fn member_geometry_gap_has_no_made_up_node_id() {
        let prepared = prepare(r#"{"elements":[]}"#).unwrap();
        let member = OsmMember {
            member_type: OsmElementType::Way,
            reference: 77,
            role: "outer".to_string(),
            geometry: Some(vec![
                Some(GeometryPoint { lat: 1.0, lon: 2.0 }),
                None,
                Some(GeometryPoint { lat: 1.5, lon: 2.5 }),
            ]),
        };

        let resolved = prepared.index.member_positions(&member).unwrap();
        assert_eq!(resolved.positions, vec![[2.0, 1.0], [2.5, 1.5]]);
        assert_eq!(resolved.missing_nodes, vec![None]);
    }

    #[test]
    fn member_geometry_gap_uses_ids_of_known_way() {
        let raw = r#"{"elements":[
            {"type":"way","id":77,"nodes":[5,6,7]}
        ]}"#;
        let prepared = prepare(raw).unwrap();
        let member = OsmMember {
            member_type: OsmElementType::Way,
            reference: 77,
            role: "outer".to_string(),
            geometry: Some(vec![Some(GeometryPoint { lat: 1.0, lon: 2.0 }), None]),
        };

        let resolved = prepared.index.member_positions(&member).unwrap();
        assert_eq!(resolved.missing_nodes, vec![Some(6)]);
    }

    #[test]
    fn index_keeps_first_occurrence() {
        let raw = r#"{"elements":[
            {"type":"way","id":10,"nodes":[1,2],"tags":{"building":"yes"}},
            {"type":"way","id":10,"nodes":[1,2]}
        ]}"#;
        let prepared = prepare(raw).unwrap();
        assert_eq!(prepared.index.ways().count(), 1);
        assert!(prepared.index.way(10).unwrap().tags.contains_key("building"));
    }
}

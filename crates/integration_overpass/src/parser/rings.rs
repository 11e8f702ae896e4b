//! Multipolygon ring assembly
//!
//! Way members of a relation are split by role, chained end to end where
//! they share endpoints, and closed if the chain does not return to its
//! start. Rings with fewer than three distinct positions are dropped.

use domain::{
    FeatureGeometry, IssueCode, OsmElementType, OsmRelation, Point, Position, Ring,
    ValidationIssue,
};

use super::ElementIndex;

/// Minimum distinct positions for a ring to enclose an area
const MIN_DISTINCT_POSITIONS: usize = 3;

/// Close a coordinate sequence by repeating its first position if needed
#[must_use]
pub fn close_ring(mut positions: Vec<Position>) -> Ring {
    if let (Some(first), Some(last)) = (positions.first().copied(), positions.last()) {
        if first != *last {
            positions.push(first);
        }
    }
    positions
}

/// Number of distinct positions, counting stops at `limit`
///
/// Scans the ring once and keeps at most `limit` positions, so large rings
/// stay linear.
#[must_use]
pub fn distinct_positions(ring: &[Position], limit: usize) -> usize {
    let mut seen: Vec<Position> = Vec::with_capacity(limit);
    for position in ring {
        if seen.len() >= limit {
            break;
        }
        if !seen.contains(position) {
            seen.push(*position);
        }
    }
    seen.len()
}

fn is_closed(positions: &[Position]) -> bool {
    positions.len() > 1 && positions.first() == positions.last()
}

/// Chain segments that share endpoints; returns each chain and whether it
/// closed on its own
fn join_segments(mut segments: Vec<Vec<Position>>) -> Vec<(Vec<Position>, bool)> {
    segments.retain(|s| !s.is_empty());
    segments.reverse();

    let mut chains = Vec::new();
    while let Some(mut current) = segments.pop() {
        while !is_closed(&current) {
            let Some(end) = current.last().copied() else {
                break;
            };
            let Some(i) = segments
                .iter()
                .position(|s| s.first() == Some(&end) || s.last() == Some(&end))
            else {
                break;
            };
            let mut next = segments.remove(i);
            if next.first() != Some(&end) {
                next.reverse();
            }
            current.extend(next.into_iter().skip(1));
        }
        let closed = is_closed(&current);
        chains.push((current, closed));
    }
    chains
}

fn ring_contains(ring: &Ring, position: &Position) -> bool {
    FeatureGeometry::Polygon(vec![ring.clone()])
        .contains_point(&Point::new_unchecked(position[1], position[0]))
}

/// Outer and inner rings of one relation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledRings {
    pub outer: Vec<Ring>,
    pub inner: Vec<Ring>,
}

impl AssembledRings {
    /// `Polygon` for a single outer ring (all inner rings become its holes),
    /// otherwise `MultiPolygon` with each hole placed in the outer ring that
    /// contains it
    ///
    /// Holes that fit no outer ring are returned separately.
    #[must_use]
    pub fn into_geometry(self) -> (FeatureGeometry, Vec<Ring>) {
        let Self { outer, inner } = self;

        if outer.len() == 1 {
            let mut rings = outer;
            rings.extend(inner);
            return (FeatureGeometry::Polygon(rings), Vec::new());
        }

        let mut polygons: Vec<Vec<Ring>> = outer.into_iter().map(|ring| vec![ring]).collect();
        let mut orphans = Vec::new();
        for hole in inner {
            let target = polygons
                .iter_mut()
                .find(|polygon| hole.iter().any(|p| ring_contains(&polygon[0], p)));
            match target {
                Some(polygon) => polygon.push(hole),
                None => orphans.push(hole),
            }
        }
        (FeatureGeometry::MultiPolygon(polygons), orphans)
    }
}

/// Builds closed rings for relation members
#[derive(Debug, Clone, Copy)]
pub struct RingAssembler<'a> {
    index: &'a ElementIndex,
}

impl<'a> RingAssembler<'a> {
    #[must_use]
    pub const fn new(index: &'a ElementIndex) -> Self {
        Self { index }
    }

    /// Assemble the rings of `relation`, appending issues to `issues`
    ///
    /// Members with an empty role count as outer. Returns `None` (after
    /// recording a `NO_OUTER_RING` error) when no usable outer ring remains.
    pub fn assemble(
        &self,
        relation: &OsmRelation,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<AssembledRings> {
        let mut outer_segments = Vec::new();
        let mut inner_segments = Vec::new();

        for member in relation
            .members
            .iter()
            .filter(|m| m.member_type == OsmElementType::Way)
        {
            let Some(resolved) = self.index.member_positions(member) else {
                issues.push(ValidationIssue::warning(
                    IssueCode::MissingWay,
                    format!(
                        "relation {} references way {} which is not in the response",
                        relation.id, member.reference
                    ),
                    Some(relation.id),
                ));
                continue;
            };
            if !resolved.missing_nodes.is_empty() {
                issues.push(ValidationIssue::warning(
                    IssueCode::MissingNode,
                    format!(
                        "way {} of relation {} is missing {} node(s)",
                        member.reference,
                        relation.id,
                        resolved.missing_nodes.len()
                    ),
                    Some(relation.id),
                ));
            }
            match member.role.as_str() {
                "inner" => inner_segments.push(resolved.positions),
                "outer" | "" => outer_segments.push(resolved.positions),
                _ => {},
            }
        }

        let outer = Self::build_rings(relation.id, outer_segments, issues);
        let inner = Self::build_rings(relation.id, inner_segments, issues);

        if outer.is_empty() {
            issues.push(ValidationIssue::error(
                IssueCode::NoOuterRing,
                format!("relation {} has no usable outer ring", relation.id),
                Some(relation.id),
            ));
            return None;
        }

        Some(AssembledRings { outer, inner })
    }

    fn build_rings(
        relation_id: i64,
        segments: Vec<Vec<Position>>,
        issues: &mut Vec<ValidationIssue>,
    ) -> Vec<Ring> {
        join_segments(segments)
            .into_iter()
            .filter_map(|(chain, closed)| {
                if !closed {
                    issues.push(ValidationIssue::info(
                        IssueCode::UnclosedRing,
                        format!("relation {relation_id} has an open ring, closing it"),
                        Some(relation_id),
                    ));
                }
                let ring = close_ring(chain);
                let distinct = distinct_positions(&ring, MIN_DISTINCT_POSITIONS);
                if distinct < MIN_DISTINCT_POSITIONS {
                    issues.push(ValidationIssue::warning(
                        IssueCode::InsufficientCoordinates,
                        format!(
                            "relation {relation_id} has a ring with {distinct} distinct positions"
                        ),
                        Some(relation_id),
                    ));
                    return None;
                }
                Some(ring)
            })
            .collect()
    }
}

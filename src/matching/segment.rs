use geo::{coord, Coord, Distance, Haversine, LineString, Point};
use log::{error, warn};

use crate::graph::{edge_shape, linestring_length, EdgeId, GraphReader};
use crate::matching::error::MatchError;
use crate::matching::offline::MatchResult;
use crate::matching::state::{Lattice, StateId};

/// A contiguous sub-arc of one edge: `edge` with offsets
/// `source <= target` in `[0, 1]`. `edge == None` is the dummy segment
/// that heads every reconstructed chain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeSegment {
    pub edge: Option<EdgeId>,
    pub source: f64,
    pub target: f64,
}

impl EdgeSegment {
    pub fn new(edge: Option<EdgeId>, source: f64, target: f64) -> Result<Self, MatchError> {
        let source = source.clamp(0.0, 1.0);
        let target = target.clamp(0.0, 1.0);

        if source > target {
            return Err(MatchError::InvalidRoute(format!(
                "expected 0 <= source <= target <= 1, got source = {source} and target = {target}"
            )));
        }

        Ok(Self {
            edge,
            source,
            target,
        })
    }

    pub fn dummy() -> Self {
        Self {
            edge: None,
            source: 0.0,
            target: 0.0,
        }
    }

    pub fn is_dummy(&self) -> bool {
        self.edge.is_none()
    }

    /// The segment's geometry, clipped from the directed edge's oriented
    /// shape.
    pub fn shape<R: GraphReader + ?Sized>(&self, reader: &R) -> Option<LineString> {
        let edge = self.edge?;
        let shape = edge_shape(reader, edge)?;
        Some(clip_linestring(&shape, self.source, self.target))
    }
}

fn lerp(a: Coord, b: Coord, t: f64) -> Coord {
    coord! { x: a.x + (b.x - a.x) * t, y: a.y + (b.y - a.y) * t }
}

/// Clip a linestring to the fractional range `[from, to]` of its length.
fn clip_linestring(shape: &LineString, from: f64, to: f64) -> LineString {
    let total = linestring_length(shape);
    if total == 0.0 || shape.0.len() < 2 {
        return shape.clone();
    }

    let start = total * from;
    let end = total * to;

    let mut out: Vec<Coord> = Vec::new();
    let mut walked = 0.0;

    for pair in shape.0.windows(2) {
        let [a, b] = pair else { continue };
        let length = Haversine.distance(Point::from(*a), Point::from(*b));
        let segment_end = walked + length;

        if out.is_empty() && segment_end >= start {
            let t = if length > 0.0 {
                ((start - walked) / length).clamp(0.0, 1.0)
            } else {
                0.0
            };
            out.push(lerp(*a, *b, t));
        }

        if !out.is_empty() {
            if segment_end >= end {
                let t = if length > 0.0 {
                    ((end - walked) / length).clamp(0.0, 1.0)
                } else {
                    1.0
                };
                out.push(lerp(*a, *b, t));
                break;
            }
            out.push(*b);
        }

        walked = segment_end;
    }

    LineString::new(out)
}

/// Debug rendering of a segment route:
/// `[dummy] [<start> e<id> <end>] ...` with node ids standing in for
/// full-edge offsets.
pub fn route_to_string<R: GraphReader + ?Sized>(reader: &R, segments: &[EdgeSegment]) -> String {
    segments
        .iter()
        .map(|segment| match segment.edge {
            None => "[dummy]".to_string(),
            Some(edge) => {
                let source = if segment.source == 0.0 {
                    reader
                        .start_node(edge)
                        .map_or_else(|| "?".to_string(), |node| format!("{node:?}"))
                } else {
                    format!("{}", segment.source)
                };
                let target = if segment.target == 1.0 {
                    reader
                        .end_node(edge)
                        .map_or_else(|| "?".to_string(), |node| format!("{node:?}"))
                } else {
                    format!("{}", segment.target)
                };
                format!("[{source} {edge:?} {target}]")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Check that a chronological segment chain is well-formed: a dummy head,
/// valid edges thereafter, and adjoined successive segments.
///
/// A self-loop edge appearing consecutively with mismatched offsets is a
/// known map-data pathology; with `tolerate_loops` it passes with a
/// warning instead of failing validation.
pub fn validate_route<R: GraphReader + ?Sized>(
    reader: &R,
    segments: &[EdgeSegment],
    tolerate_loops: bool,
) -> Result<(), MatchError> {
    if segments.is_empty() {
        return Ok(());
    }

    let first = &segments[0];
    if !(first.is_dummy() && first.source == 0.0 && first.target == 0.0) {
        error!(
            "found a route whose first segment is not dummy: {}",
            route_to_string(reader, segments)
        );
        return Err(MatchError::InvalidRoute(
            "first segment is not dummy".to_string(),
        ));
    }

    for index in 1..segments.len() {
        let segment = &segments[index];
        let Some(edge) = segment.edge else {
            error!(
                "found invalid edge at segment {index}: {}",
                route_to_string(reader, segments)
            );
            return Err(MatchError::InvalidRoute(format!(
                "invalid edge at segment {index}"
            )));
        };

        // The first non-dummy segment has nothing to adjoin to.
        if index == 1 {
            continue;
        }

        let previous = &segments[index - 1];
        let previous_edge = previous.edge.ok_or(MatchError::MissingGraphData)?;

        if previous_edge == edge {
            if previous.target != segment.source {
                // A self-loop edge ends and starts at the same node, so
                // consecutive traversals legitimately restart offsets.
                let end = reader.end_node(previous_edge);
                let start = reader.start_node(edge);
                if tolerate_loops && end.is_some() && end == start {
                    warn!(
                        "disconnected segments at {index} form a loop, letting it go: {}",
                        route_to_string(reader, segments)
                    );
                    return Ok(());
                }

                error!(
                    "found disconnected segments at {index}: {}",
                    route_to_string(reader, segments)
                );
                return Err(MatchError::InvalidRoute(format!(
                    "disconnected segments at {index}"
                )));
            }
        } else {
            let end = reader.end_node(previous_edge);
            let start = reader.start_node(edge);
            let adjoined =
                previous.target == 1.0 && segment.source == 0.0 && end.is_some() && end == start;
            if !adjoined {
                error!(
                    "found disconnected segments at {index}: {}",
                    route_to_string(reader, segments)
                );
                return Err(MatchError::InvalidRoute(format!(
                    "disconnected segments at {index}"
                )));
            }
        }
    }

    Ok(())
}

/// Append a validated chain onto `route`, collapsing adjacent pieces of
/// the same edge into one segment with the furthest target offset.
pub fn merge_route(route: &mut Vec<EdgeSegment>, segments: &[EdgeSegment]) {
    // Skip the dummy head.
    for (index, segment) in segments.iter().enumerate().skip(1) {
        debug_assert!(segment.edge.is_some());

        match route.last_mut() {
            Some(last) if last.edge == segment.edge => {
                if last.target != segment.source && index != 1 {
                    error!(
                        "still found a disconnected route: segment {} ends at {} but the next starts at {}",
                        index, last.target, segment.source
                    );
                }
                last.target = last.target.max(segment.target);
            }
            _ => route.push(*segment),
        }
    }
}

/// Reconstruct the full edge-segment route from a session's match
/// results, reading each adjacent pair's routed chain out of the lattice.
pub fn construct_route<R: GraphReader + ?Sized>(
    reader: &R,
    lattice: &Lattice,
    matches: &[MatchResult],
    tolerate_loops: bool,
) -> Result<Vec<EdgeSegment>, MatchError> {
    let mut route = Vec::new();
    let mut previous: Option<StateId> = None;

    for result in matches {
        let Some(state) = result.state else { continue };

        if let Some(source) = previous {
            let mut segments = lattice
                .route_path(source, state)
                .map(|label| EdgeSegment::new(label.edge, label.source, label.target))
                .collect::<Result<Vec<_>, _>>()?;

            // The chain walks target back to source; flip it around.
            segments.reverse();

            validate_route(reader, &segments, tolerate_loops)?;
            merge_route(&mut route, &segments);
        }

        previous = Some(state);
    }

    Ok(route)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::RoadNetworkBuilder;

    const DEG_100M: f64 = 100.0 / 111_319.49;

    fn network() -> crate::graph::RoadNetwork {
        RoadNetworkBuilder::new()
            .node(1, 0.0, 0.0)
            .node(2, DEG_100M, 0.0)
            .node(3, 2.0 * DEG_100M, 0.0)
            .two_way(10, 11, 1, 2)
            .two_way(12, 13, 2, 3)
            .build()
    }

    fn segment(edge: u64, source: f64, target: f64) -> EdgeSegment {
        EdgeSegment::new(Some(EdgeId(edge)), source, target).unwrap()
    }

    #[test]
    fn segments_clamp_and_reject_inverted_offsets() {
        let clamped = EdgeSegment::new(Some(EdgeId(1)), -0.5, 1.5).unwrap();
        assert_eq!((clamped.source, clamped.target), (0.0, 1.0));

        assert!(EdgeSegment::new(Some(EdgeId(1)), 0.8, 0.2).is_err());
    }

    #[test]
    fn validation_requires_a_dummy_head() {
        let network = network();

        let headless = vec![segment(10, 0.0, 1.0)];
        assert!(validate_route(&network, &headless, false).is_err());

        let headed = vec![EdgeSegment::dummy(), segment(10, 0.0, 1.0)];
        assert!(validate_route(&network, &headed, false).is_ok());
    }

    #[test]
    fn validation_accepts_adjoined_chains() {
        let network = network();

        let route = vec![
            EdgeSegment::dummy(),
            segment(10, 0.3, 1.0),
            segment(12, 0.0, 0.7),
        ];
        assert!(validate_route(&network, &route, false).is_ok());
    }

    #[test]
    fn validation_rejects_disconnected_chains() {
        let network = network();

        // Same edge, gap between offsets.
        let gap = vec![
            EdgeSegment::dummy(),
            segment(10, 0.0, 0.4),
            segment(10, 0.6, 1.0),
        ];
        assert!(validate_route(&network, &gap, false).is_err());

        // Cross-edge without meeting at the shared node.
        let apart = vec![
            EdgeSegment::dummy(),
            segment(10, 0.0, 0.9),
            segment(12, 0.0, 1.0),
        ];
        assert!(validate_route(&network, &apart, false).is_err());
    }

    #[test]
    fn self_loop_mismatch_is_tolerated_when_asked() {
        let loop_network = RoadNetworkBuilder::new()
            .node(1, 0.0, 0.0)
            .node(2, DEG_100M, 0.0)
            .one_way(20, 2, 2)
            .build();

        let looped = vec![
            EdgeSegment::dummy(),
            segment(20, 0.8, 1.0),
            segment(20, 0.0, 0.4),
        ];

        assert!(validate_route(&loop_network, &looped, true).is_ok());
        assert!(validate_route(&loop_network, &looped, false).is_err());
    }

    #[test]
    fn merge_collapses_same_edge_runs() {
        let chain = vec![
            EdgeSegment::dummy(),
            segment(10, 0.0, 0.5),
            segment(10, 0.5, 1.0),
            segment(12, 0.0, 0.25),
        ];

        let mut route = Vec::new();
        merge_route(&mut route, &chain);

        assert_eq!(route, vec![segment(10, 0.0, 1.0), segment(12, 0.0, 0.25)]);
    }

    #[test]
    fn merge_is_idempotent() {
        let chain = vec![
            EdgeSegment::dummy(),
            segment(10, 0.0, 0.5),
            segment(10, 0.5, 1.0),
            segment(12, 0.0, 0.25),
        ];

        let mut once = Vec::new();
        merge_route(&mut once, &chain);

        let mut again = Vec::new();
        let mut redecorated = vec![EdgeSegment::dummy()];
        redecorated.extend(once.iter().copied());
        merge_route(&mut again, &redecorated);

        assert_eq!(once, again);
    }

    #[test]
    fn shape_clips_to_the_offset_range() {
        let network = network();

        let full = segment(10, 0.0, 1.0).shape(&network).unwrap();
        assert!((linestring_length(&full) - 100.0).abs() < 1.0);

        let half = segment(10, 0.25, 0.75).shape(&network).unwrap();
        assert!((linestring_length(&half) - 50.0).abs() < 1.0);
    }
}

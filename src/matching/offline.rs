use geo::{Distance, Haversine, Point};
use log::debug;
use measure_time::debug_time;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::candidate::{Candidate, CandidateQuery};
use crate::graph::{GraphAttachment, GraphReader};
use crate::matching::model::MapMatching;
use crate::matching::state::{Lattice, Measurement, StateId, Time};
use crate::matching::viterbi::ViterbiSearch;

/// The per-measurement outcome of a match.
///
/// `state` links back into the matcher's lattice for route reconstruction
/// and stays valid until the next session clears it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchResult {
    /// The matched coordinate, or the raw measurement when unmatched.
    pub lnglat: Point,

    /// Metres from the measurement to the matched point.
    pub distance: f64,

    pub attachment: GraphAttachment,

    pub state: Option<StateId>,
}

impl MatchResult {
    fn unmatched(lnglat: Point) -> Self {
        Self {
            lnglat,
            distance: 0.0,
            attachment: GraphAttachment::Unknown,
            state: None,
        }
    }
}

fn sq_great_circle(a: &Measurement, b: &Measurement) -> f64 {
    let distance = Haversine.distance(a.lnglat, b.lnglat);
    distance * distance
}

/// Match a full trace against the graph, producing one result per input
/// measurement.
///
/// Measurements closer than `interpolation_distance` to the previously
/// admitted one are skipped from the lattice and interpolated against the
/// chosen route afterwards; the first and last measurements are always
/// admitted.
pub fn offline_match<R, Q>(
    matching: &mut MapMatching<R>,
    search: &mut ViterbiSearch,
    rangequery: &Q,
    measurements: &[Measurement],
    max_sq_search_radius: f64,
    interpolation_distance: f64,
) -> Vec<MatchResult>
where
    R: GraphReader,
    Q: CandidateQuery + ?Sized,
{
    matching.clear();
    search.clear();

    if measurements.is_empty() {
        return Vec::new();
    }

    debug_time!("offline match");

    let sq_interpolation_distance = interpolation_distance * interpolation_distance;
    let mut proximate: FxHashMap<Time, Vec<usize>> = FxHashMap::default();

    // Build columns, attaching skipped measurements to the column of the
    // measurement last admitted before them.
    let mut time = 0;
    let end_idx = measurements.len() - 1;
    let mut last_idx = 0;
    for (idx, measurement) in measurements.iter().enumerate() {
        let sq_distance = sq_great_circle(&measurements[last_idx], measurement);
        if sq_interpolation_distance <= sq_distance || idx == 0 || idx == end_idx {
            let candidates = rangequery.query(
                measurement.lnglat,
                max_sq_search_radius,
                matching.costing(),
            );
            time = matching.append_state(*measurement, candidates);
            last_idx = idx;
        } else {
            proximate.entry(time).or_default().push(idx);
        }
    }

    let columns = matching.lattice().columns();
    debug!(
        "admitted {} of {} measurements into the lattice",
        columns,
        measurements.len()
    );

    let mut iterpath = search.search_path(matching, time).collect::<Vec<_>>();
    iterpath.reverse();
    debug_assert_eq!(iterpath.len(), columns);

    if columns == 1 {
        return vec![single_column_result(
            matching.reader(),
            matching.lattice(),
            iterpath[0],
            &measurements[0],
        )];
    }

    let mut results = Vec::with_capacity(measurements.len());
    results.push(MatchResult::unmatched(measurements[0].lnglat));

    for t in 1..columns {
        let source = iterpath[t - 1];
        let target = iterpath[t];

        // The previous iteration (or the initial placeholder) may have
        // left the source measurement unattached; looking forward along
        // this pair can do better.
        let source_index = results.len() - 1;
        if !results[source_index].attachment.is_known() {
            results[source_index] = guess_source_result(
                matching.lattice(),
                source,
                target,
                &measurements[source_index],
            );
        }

        if let Some(skipped) = proximate.get(&((t - 1) as Time)) {
            let graphset = collect_graphset(matching.reader(), matching.lattice(), source, target);
            for &idx in skipped {
                let candidates = rangequery.query(
                    measurements[idx].lnglat,
                    max_sq_search_radius,
                    matching.costing(),
                );
                results.push(interpolate(
                    matching.reader(),
                    &graphset,
                    &candidates,
                    &measurements[idx],
                ));
            }
        }

        let measurement = &measurements[results.len()];
        results.push(guess_target_result(
            matching.lattice(),
            source,
            target,
            measurement,
        ));
    }

    debug_assert_eq!(results.len(), measurements.len());
    results
}

/// Result for a trace that produced a single column: attach the winning
/// candidate directly, or fall back to the raw measurement.
fn single_column_result<R: GraphReader + ?Sized>(
    reader: &R,
    lattice: &Lattice,
    winner: Option<StateId>,
    measurement: &Measurement,
) -> MatchResult {
    let Some(state) = winner else {
        return MatchResult::unmatched(measurement.lnglat);
    };

    let candidate = lattice.state(state).candidate();
    let attachment = if candidate.is_node {
        collect_nodes(reader, candidate)
            .into_iter()
            .min()
            .map(GraphAttachment::Node)
            .unwrap_or(GraphAttachment::Edge(candidate.edges[0].edge))
    } else {
        GraphAttachment::Edge(candidate.edges[0].edge)
    };

    MatchResult {
        lnglat: candidate.vertex,
        distance: candidate.distance(),
        attachment,
        state: Some(state),
    }
}

/// Attach the source measurement of a pair by walking the routed chain
/// and keeping the last attachable label, which sits at the source end.
fn guess_source_result(
    lattice: &Lattice,
    source: Option<StateId>,
    target: Option<StateId>,
    measurement: &Measurement,
) -> MatchResult {
    match (source, target) {
        (Some(source), Some(target)) => {
            let mut attachment = GraphAttachment::Unknown;
            for label in lattice.route_path(source, target) {
                if let Some(node) = label.node {
                    attachment = GraphAttachment::Node(node);
                } else if let Some(edge) = label.edge {
                    attachment = GraphAttachment::Edge(edge);
                }
            }

            // An empty chain (the pair straddles a chain break) leaves
            // the raw coordinate in place.
            if !attachment.is_known() {
                return MatchResult {
                    state: Some(source),
                    ..MatchResult::unmatched(measurement.lnglat)
                };
            }

            let candidate = lattice.state(source).candidate();
            MatchResult {
                lnglat: candidate.vertex,
                distance: candidate.distance(),
                attachment,
                state: Some(source),
            }
        }
        (Some(source), None) => MatchResult {
            state: Some(source),
            ..MatchResult::unmatched(measurement.lnglat)
        },
        _ => MatchResult::unmatched(measurement.lnglat),
    }
}

/// Attach the target measurement of a pair from the first label of the
/// routed chain, which sits at the target end.
fn guess_target_result(
    lattice: &Lattice,
    source: Option<StateId>,
    target: Option<StateId>,
    measurement: &Measurement,
) -> MatchResult {
    match (source, target) {
        (Some(source), Some(target)) => {
            let mut attachment = GraphAttachment::Unknown;
            if let Some(label) = lattice.route_path(source, target).next() {
                if let Some(node) = label.node {
                    attachment = GraphAttachment::Node(node);
                } else if let Some(edge) = label.edge {
                    attachment = GraphAttachment::Edge(edge);
                }
            }

            if !attachment.is_known() {
                return MatchResult {
                    state: Some(target),
                    ..MatchResult::unmatched(measurement.lnglat)
                };
            }

            let candidate = lattice.state(target).candidate();
            MatchResult {
                lnglat: candidate.vertex,
                distance: candidate.distance(),
                attachment,
                state: Some(target),
            }
        }
        (None, Some(target)) => MatchResult {
            state: Some(target),
            ..MatchResult::unmatched(measurement.lnglat)
        },
        _ => MatchResult::unmatched(measurement.lnglat),
    }
}

/// Node ids a node-snapped candidate touches, resolved through its edge
/// projections.
pub(crate) fn collect_nodes<R: GraphReader + ?Sized>(
    reader: &R,
    candidate: &Candidate,
) -> FxHashSet<crate::graph::NodeId> {
    let mut nodes = FxHashSet::default();

    for projection in &candidate.edges {
        if projection.dist == 0.0 {
            if let Some(end) = reader
                .opposing_edge(projection.edge)
                .and_then(|opposing| reader.end_node(opposing))
            {
                nodes.insert(end);
            }
        } else if projection.dist == 1.0 {
            if let Some(end) = reader.end_node(projection.edge) {
                nodes.insert(end);
            }
        }
    }

    nodes
}

/// Every edge and node id on the routed chain between a chosen pair; the
/// degenerate cases fall back to the source candidate's own attachments.
fn collect_graphset<R: GraphReader + ?Sized>(
    reader: &R,
    lattice: &Lattice,
    source: Option<StateId>,
    target: Option<StateId>,
) -> FxHashSet<GraphAttachment> {
    let mut graphset = FxHashSet::default();

    match (source, target) {
        (Some(source), Some(target)) => {
            for label in lattice.route_path(source, target) {
                if let Some(edge) = label.edge {
                    graphset.insert(GraphAttachment::Edge(edge));
                }
                if let Some(node) = label.node {
                    graphset.insert(GraphAttachment::Node(node));
                }
            }
        }
        (Some(source), None) => {
            let candidate = lattice.state(source).candidate();
            if !candidate.is_node {
                for projection in &candidate.edges {
                    graphset.insert(GraphAttachment::Edge(projection.edge));
                }
            } else {
                for node in collect_nodes(reader, candidate) {
                    graphset.insert(GraphAttachment::Node(node));
                }
            }
        }
        _ => {}
    }

    graphset
}

/// Match a skipped measurement against the pairwise graph set: the
/// closest candidate sharing an edge (or node) with the chosen route
/// wins; otherwise the raw measurement is kept.
fn interpolate<R: GraphReader + ?Sized>(
    reader: &R,
    graphset: &FxHashSet<GraphAttachment>,
    candidates: &[Candidate],
    measurement: &Measurement,
) -> MatchResult {
    let mut closest_sq = f64::INFINITY;
    let mut closest: Option<(Point, f64, GraphAttachment)> = None;

    for candidate in candidates {
        if candidate.sq_distance >= closest_sq {
            continue;
        }

        if !candidate.is_node {
            for projection in &candidate.edges {
                let attachment = GraphAttachment::Edge(projection.edge);
                if graphset.contains(&attachment) {
                    closest_sq = candidate.sq_distance;
                    closest = Some((candidate.vertex, candidate.distance(), attachment));
                }
            }
        } else {
            for node in collect_nodes(reader, candidate) {
                let attachment = GraphAttachment::Node(node);
                if graphset.contains(&attachment) {
                    closest_sq = candidate.sq_distance;
                    closest = Some((candidate.vertex, candidate.distance(), attachment));
                }
            }
        }
    }

    match closest {
        Some((lnglat, distance, attachment)) => MatchResult {
            lnglat,
            distance,
            attachment,
            state: None,
        },
        None => MatchResult::unmatched(measurement.lnglat),
    }
}

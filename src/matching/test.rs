use std::sync::Arc;

use geo::{Distance, Haversine};

use crate::costing::TravelMode;
use crate::graph::{GraphAttachment, GraphReader, RoadNetwork, RoadNetworkBuilder};
use crate::matching::config::MatcherConfig;
use crate::matching::matcher::{MapMatcher, MapMatcherFactory};
use crate::matching::state::Measurement;

/// Metres per degree on the sphere geo's Haversine assumes.
const METRE: f64 = 1.0 / 111_195.08;

/// A measurement at `(east, north)` metres from the origin node.
fn at(east: f64, north: f64) -> Measurement {
    Measurement::new(east * METRE, north * METRE)
}

/// An L-shaped network at the equator:
///
///                      4
///                      |
///                      | edges 30/31 (100m)
///                      |
///   1 ---------------- 2 ---------------- 3
///      edges 10/11        edges 12/13
///        (100m)             (100m)
///
/// Node 1 sits at the origin, east is +x, north is +y.
fn network() -> Arc<RoadNetwork> {
    Arc::new(
        RoadNetworkBuilder::new()
            .node(1, 0.0, 0.0)
            .node(2, 100.0 * METRE, 0.0)
            .node(3, 200.0 * METRE, 0.0)
            .node(4, 100.0 * METRE, 100.0 * METRE)
            .two_way(10, 11, 1, 2)
            .two_way(12, 13, 2, 3)
            .two_way(30, 31, 2, 4)
            .build(),
    )
}

fn matcher_with(config: serde_json::Value) -> MapMatcher {
    env_logger::try_init().ok();

    let config: MatcherConfig = serde_json::from_value(config).unwrap();
    let factory = MapMatcherFactory::new(config, network()).unwrap();
    factory.create(TravelMode::Auto).unwrap()
}

fn default_matcher() -> MapMatcher {
    matcher_with(serde_json::json!({
        "default": {
            "sigma_z": 5.0,
            "beta": 3.0,
            "breakage_distance": 2000.0,
            "max_route_distance_factor": 3.0,
            "turn_penalty_factor": 0.0,
            "search_radius": 50.0,
            "max_search_radius": 100.0,
            "interpolation_distance": 10.0
        }
    }))
}

#[test]
fn empty_input_yields_empty_results() {
    let mut matcher = default_matcher();
    assert!(matcher.offline_match(&[]).is_empty());
}

#[test]
fn collinear_trace_stays_on_its_edge() {
    let mut matcher = default_matcher();
    let trace = [at(0.0, 0.0), at(50.0, 0.0), at(100.0, 0.0)];

    let results = matcher.offline_match(&trace);
    assert_eq!(results.len(), trace.len());

    for (result, measurement) in results.iter().zip(&trace) {
        assert_eq!(result.attachment, GraphAttachment::Edge(crate::graph::EdgeId(10)));
        assert!(result.distance < 1.0);
        assert!(Haversine.distance(result.lnglat, measurement.lnglat) < 1.0);
    }

    // The reconstructed route covers the edge with monotonic offsets.
    let route = matcher.construct_route(&results).unwrap();
    assert_eq!(route.len(), 1);
    assert_eq!(route[0].edge, Some(crate::graph::EdgeId(10)));
    assert!(route[0].source <= route[0].target);
    assert!(route[0].source < 0.05 && route[0].target > 0.95);
}

#[test]
fn transition_respects_the_route_distance_budget() {
    let mut matcher = default_matcher();
    let trace = [at(10.0, 0.0), at(60.0, 0.0), at(110.0, 0.0)];

    let results = matcher.offline_match(&trace);
    let params = *matcher.params();

    for pair in results.windows(2) {
        let (Some(left), Some(right)) = (pair[0].state, pair[1].state) else {
            continue;
        };

        let Some(label) = matcher
            .lattice()
            .route_path(left, right)
            .next()
            .map(|label| label.cost)
        else {
            continue;
        };

        let gc = Haversine.distance(pair[0].lnglat, pair[1].lnglat);
        assert!(
            label <= (gc * params.max_route_distance_factor).max(1.0)
                || label <= params.breakage_distance
        );
    }
}

#[test]
fn skipped_measurements_interpolate_against_the_chosen_route() {
    let mut matcher = matcher_with(serde_json::json!({
        "default": {
            "sigma_z": 5.0,
            "beta": 3.0,
            "interpolation_distance": 20.0,
            "search_radius": 50.0,
            "max_search_radius": 100.0
        }
    }));

    // The 10m point is within interpolation distance of the first.
    let trace = [at(0.0, 0.0), at(10.0, 0.0), at(50.0, 0.0)];
    let results = matcher.offline_match(&trace);

    assert_eq!(results.len(), 3);
    // Only two columns were admitted; the middle result was interpolated.
    assert_eq!(matcher.lattice().columns(), 2);

    let interpolated = &results[1];
    assert_eq!(
        interpolated.attachment,
        GraphAttachment::Edge(crate::graph::EdgeId(10))
    );
    assert!(interpolated.state.is_none());
    assert!(Haversine.distance(interpolated.lnglat, trace[1].lnglat) < 1.0);
}

#[test]
fn huge_interpolation_distance_admits_only_the_ends() {
    let mut matcher = matcher_with(serde_json::json!({
        "default": { "interpolation_distance": 10_000.0, "search_radius": 50.0, "max_search_radius": 100.0 }
    }));

    let trace = [
        at(0.0, 0.0),
        at(40.0, 0.0),
        at(80.0, 0.0),
        at(120.0, 0.0),
        at(160.0, 0.0),
    ];
    let results = matcher.offline_match(&trace);

    assert_eq!(matcher.lattice().columns(), 2);
    assert_eq!(results.len(), trace.len());

    // Intermediates resolve against the pairwise graph set.
    for result in &results[1..4] {
        assert!(result.attachment.is_known());
        assert!(result.state.is_none());
    }
}

#[test]
fn single_measurement_attaches_to_its_best_candidate() {
    let mut matcher = default_matcher();

    let results = matcher.offline_match(&[at(50.0, 5.0)]);
    assert_eq!(results.len(), 1);

    let result = &results[0];
    assert_eq!(result.attachment, GraphAttachment::Edge(crate::graph::EdgeId(10)));
    assert!((result.distance - 5.0).abs() < 1.0);
    assert!(result.state.is_some());
}

#[test]
fn single_measurement_on_a_junction_attaches_to_the_node() {
    let mut matcher = default_matcher();

    // Exactly on node 2, where three roads meet: every projection snaps
    // to the node, so the attachment is the node itself rather than an
    // arbitrary incident edge.
    let results = matcher.offline_match(&[at(100.0, 0.0)]);
    assert_eq!(results.len(), 1);

    let result = &results[0];
    assert_eq!(
        result.attachment,
        GraphAttachment::Node(crate::graph::NodeId(2))
    );
    assert!(result.distance < 1.0);
    assert!(result.state.is_some());
}

#[test]
fn two_nearby_measurements_are_both_admitted() {
    let mut matcher = matcher_with(serde_json::json!({
        "default": { "interpolation_distance": 20.0, "search_radius": 50.0, "max_search_radius": 100.0 }
    }));

    let results = matcher.offline_match(&[at(40.0, 0.0), at(45.0, 0.0)]);
    assert_eq!(results.len(), 2);
    assert_eq!(matcher.lattice().columns(), 2);
}

#[test]
fn unmatched_traces_keep_their_raw_coordinates() {
    let mut matcher = default_matcher();

    // ~5.5km north of any road.
    let trace = [at(0.0, 5500.0), at(100.0, 5500.0), at(200.0, 5500.0)];
    let results = matcher.offline_match(&trace);

    assert_eq!(results.len(), 3);
    for (result, measurement) in results.iter().zip(&trace) {
        assert_eq!(result.attachment, GraphAttachment::Unknown);
        assert_eq!(result.lnglat, measurement.lnglat);
    }
}

#[test]
fn empty_column_breaks_the_chain_gracefully() {
    let mut matcher = default_matcher();

    // The middle point is ~500m off the network, beyond the search radius.
    let trace = [at(20.0, 0.0), at(100.0, 500.0), at(180.0, 0.0)];
    let results = matcher.offline_match(&trace);

    assert_eq!(results.len(), 3);
    assert_eq!(results[1].attachment, GraphAttachment::Unknown);
    assert_eq!(results[1].lnglat, trace[1].lnglat);
}

#[test]
fn turn_penalties_survive_crossing_the_junction() {
    let mut matcher = matcher_with(serde_json::json!({
        "default": {
            "sigma_z": 5.0,
            "beta": 3.0,
            "turn_penalty_factor": 1.0,
            "search_radius": 50.0,
            "max_search_radius": 100.0,
            "interpolation_distance": 10.0
        }
    }));

    // East along 1->2, then north up the branch to 4.
    let trace = [at(20.0, 0.0), at(70.0, 0.0), at(100.0, 30.0), at(100.0, 80.0)];
    let results = matcher.offline_match(&trace);

    let route = matcher.construct_route(&results).unwrap();
    let edges = route
        .iter()
        .filter_map(|segment| segment.edge)
        .collect::<Vec<_>>();
    assert_eq!(
        edges,
        vec![crate::graph::EdgeId(10), crate::graph::EdgeId(30)]
    );

    // The transition crossing the 90-degree junction reports e^-2.
    let (left, right) = (results[1].state.unwrap(), results[2].state.unwrap());
    let turn_cost = matcher
        .lattice()
        .route_path(left, right)
        .next()
        .unwrap()
        .turn_cost;
    assert!((turn_cost - (-2.0f64).exp()).abs() < 1e-6);
}

#[test]
fn matching_is_deterministic() {
    let mut matcher = default_matcher();
    let trace = [
        at(10.0, 2.0),
        at(60.0, -3.0),
        at(110.0, 1.0),
        at(160.0, -2.0),
    ];

    let first = matcher.offline_match(&trace);
    let second = matcher.offline_match(&trace);

    assert_eq!(first, second);
}

#[test]
fn reversal_preserves_the_visited_roads_without_turn_penalties() {
    let network = network();
    let canonical = |edge: crate::graph::EdgeId| {
        network
            .opposing_edge(edge)
            .map_or(edge, |opposing| edge.min(opposing))
    };

    let forward_trace = [at(20.0, 0.0), at(70.0, 0.0), at(100.0, 30.0), at(100.0, 80.0)];
    let mut reversed_trace = forward_trace;
    reversed_trace.reverse();

    let mut matcher = default_matcher();

    let forward = matcher.offline_match(&forward_trace);
    let forward_roads = matcher
        .construct_route(&forward)
        .unwrap()
        .iter()
        .filter_map(|segment| segment.edge)
        .map(canonical)
        .collect::<std::collections::BTreeSet<_>>();

    let reversed = matcher.offline_match(&reversed_trace);
    let reversed_roads = matcher
        .construct_route(&reversed)
        .unwrap()
        .iter()
        .filter_map(|segment| segment.edge)
        .map(canonical)
        .collect::<std::collections::BTreeSet<_>>();

    assert_eq!(forward_roads, reversed_roads);
}

#[test]
fn each_state_routes_at_most_once_per_session() {
    let mut matcher = default_matcher();
    let trace = [at(10.0, 0.0), at(60.0, 0.0), at(110.0, 0.0)];

    let results = matcher.offline_match(&trace);

    // Chosen states of non-final columns routed exactly once (further
    // lookups hit the cache); final-column states never route.
    for result in &results[..results.len() - 1] {
        let state = result.state.unwrap();
        assert!(matcher.lattice().routed(state));
    }
    let last = results.last().unwrap().state.unwrap();
    assert!(!matcher.lattice().routed(last));
}

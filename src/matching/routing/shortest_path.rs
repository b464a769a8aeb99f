use log::trace;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::candidate::Candidate;
use crate::costing::Costing;
use crate::graph::{edge_length, EdgeId, GraphReader};
use crate::matching::routing::label::LabelKey;
use crate::matching::routing::{bend_angle, EdgeLabel, Label, LabelSet, TurnCostTable};

/// Destinations projected onto one edge: `(location index, offset)`.
type DestList = SmallVec<[(u16, f64); 4]>;

/// One-to-many shortest path from a source candidate to every other
/// location, over directed edges costed in road metres with per-degree
/// turn penalties steering the expansion.
///
/// `locations[origin_idx]` is the source; all other entries are
/// destinations. `seed` is the last edge taken to enter the source, used
/// for the first turn cost; without it the first label carries no turn
/// penalty. Destinations that cannot be reached within the label set's
/// budget are simply absent from the result.
///
/// Returns `location index -> label index` into `labelset`; the chain
/// from that label back to its root is the cheapest admissible path and
/// ends on one of the destination candidate's own edges.
pub fn find_shortest_path<R: GraphReader + ?Sized>(
    reader: &R,
    locations: &[Candidate],
    origin_idx: usize,
    labelset: &mut LabelSet,
    costing: &dyn Costing,
    seed: Option<EdgeLabel>,
    turn_costs: &TurnCostTable,
) -> FxHashMap<u16, u32> {
    let mut results = FxHashMap::default();
    let Some(origin) = locations.get(origin_idx) else {
        return results;
    };

    // Group destination projections per edge so settling an edge can
    // test every destination it carries in one pass.
    let mut dest_edges: FxHashMap<EdgeId, DestList> = FxHashMap::default();
    for (index, location) in locations.iter().enumerate() {
        if index == origin_idx {
            continue;
        }
        for projection in &location.edges {
            dest_edges
                .entry(projection.edge)
                .or_default()
                .push((index as u16, projection.dist));
        }
    }
    let destinations = locations.len().saturating_sub(1);

    // The chain root: the source itself, attached to nothing. Route
    // validation downstream relies on every chain ending in this dummy.
    let root = labelset.put_root(Label {
        predecessor: None,
        cost: 0.0,
        turn_cost: 0.0,
        node: None,
        edge: None,
        source: 0.0,
        target: 0.0,
        edge_label: seed,
    });

    // Seed the search from every edge the origin projects onto.
    for projection in &origin.edges {
        let edge = projection.edge;
        let Some(directed) = reader.directed_edge(edge) else {
            continue;
        };
        let Some(info) = reader.edge_info(directed.info) else {
            continue;
        };
        if !costing.filter(&directed, info) {
            continue;
        }

        let Some(length) = edge_length(reader, edge) else {
            continue;
        };

        let entry_turn = match seed {
            Some(inbound) if inbound.edge != edge => turn_costs
                .cost(bend_angle(reader, inbound.edge, edge).unwrap_or(0.0)),
            _ => 0.0,
        };

        // Destinations sharing the origin's edge settle without leaving it.
        if let Some(dests) = dest_edges.get(&edge) {
            for &(dest, offset) in dests {
                if offset >= projection.dist {
                    labelset.put(
                        LabelKey::Destination(dest),
                        Label {
                            predecessor: Some(root),
                            cost: length * (offset - projection.dist),
                            turn_cost: entry_turn,
                            node: None,
                            edge: Some(edge),
                            source: projection.dist,
                            target: offset,
                            edge_label: Some(EdgeLabel { edge }),
                        },
                    );
                }
            }
        }

        labelset.put(
            LabelKey::Node(directed.end_node),
            Label {
                predecessor: Some(root),
                cost: length * (1.0 - projection.dist),
                turn_cost: entry_turn,
                node: Some(directed.end_node),
                edge: Some(edge),
                source: projection.dist,
                target: 1.0,
                edge_label: Some(EdgeLabel { edge }),
            },
        );
    }

    while let Some((settled, key)) = labelset.pop() {
        let node = match key {
            LabelKey::Destination(dest) => {
                results.insert(dest, settled);
                if results.len() == destinations {
                    break;
                }
                continue;
            }
            LabelKey::Node(node) => node,
        };

        let (base_cost, base_turn, inbound) = {
            let label = labelset.label(settled);
            (label.cost, label.turn_cost, label.edge_label)
        };

        for edge in reader.outgoing_edges(node) {
            let Some(directed) = reader.directed_edge(edge) else {
                continue;
            };
            let Some(info) = reader.edge_info(directed.info) else {
                continue;
            };
            if !costing.filter(&directed, info) {
                continue;
            }
            let Some(length) = edge_length(reader, edge) else {
                continue;
            };

            let turn = match inbound {
                Some(inbound) if inbound.edge != edge => turn_costs
                    .cost(bend_angle(reader, inbound.edge, edge).unwrap_or(0.0)),
                _ => 0.0,
            };
            let turn_cost = base_turn + turn;

            if let Some(dests) = dest_edges.get(&edge) {
                for &(dest, offset) in dests {
                    labelset.put(
                        LabelKey::Destination(dest),
                        Label {
                            predecessor: Some(settled),
                            cost: base_cost + length * offset,
                            turn_cost,
                            node: None,
                            edge: Some(edge),
                            source: 0.0,
                            target: offset,
                            edge_label: Some(EdgeLabel { edge }),
                        },
                    );
                }
            }

            labelset.put(
                LabelKey::Node(directed.end_node),
                Label {
                    predecessor: Some(settled),
                    cost: base_cost + length,
                    turn_cost,
                    node: Some(directed.end_node),
                    edge: Some(edge),
                    source: 0.0,
                    target: 1.0,
                    edge_label: Some(EdgeLabel { edge }),
                },
            );
        }
    }

    trace!(
        "shortest path settled {} labels, reached {}/{} destinations",
        labelset.len(),
        results.len(),
        destinations
    );

    results
}

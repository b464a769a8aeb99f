use std::fmt::{Debug, Formatter};
use std::hash::BuildHasherDefault;

use geo::{LineString, Point};
use log::{info, warn};
use petgraph::prelude::DiGraphMap;
use petgraph::Direction;
use rstar::{RTree, RTreeObject, AABB};
use rustc_hash::{FxHashMap, FxHasher};

use crate::graph::{
    Access, DirectedEdge, EdgeId, EdgeInfo, EdgeInfoOffset, GraphReader, NodeId,
};

pub type NetworkStructure = DiGraphMap<NodeId, EdgeId, BuildHasherDefault<FxHasher>>;

/// A directed-edge record of the in-memory network.
#[derive(Clone, Copy, Debug)]
struct EdgeRecord {
    start: NodeId,
    end: NodeId,
    forward: bool,
    info: EdgeInfoOffset,
    opposing: Option<EdgeId>,
}

/// Flyweight stored in the spatial index: an edge identifier with the
/// bounding box of its shape. The full record stays in the network.
pub(crate) struct IndexedEdge {
    pub id: EdgeId,
    lower: Point,
    upper: Point,
}

impl RTreeObject for IndexedEdge {
    type Envelope = AABB<Point>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.lower, self.upper)
    }
}

/// The bundled in-memory [`GraphReader`] implementation.
///
/// Built once through [`RoadNetworkBuilder`] and read-only thereafter;
/// adjacency lives in a [`DiGraphMap`] keyed by [`NodeId`] and the shape
/// bounding boxes in an [`RTree`] for the candidate search.
pub struct RoadNetwork {
    graph: NetworkStructure,
    nodes: FxHashMap<NodeId, Point>,
    edges: FxHashMap<EdgeId, EdgeRecord>,
    infos: Vec<EdgeInfo>,
    index: RTree<IndexedEdge>,
}

impl Debug for RoadNetwork {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RoadNetwork {{ nodes: {}, edges: {} }}",
            self.nodes.len(),
            self.edges.len()
        )
    }
}

impl RoadNetwork {
    /// Edges whose shape bounding box intersects the given envelope.
    ///
    /// Only forward records are indexed; the candidate query mirrors an
    /// interior projection onto the opposing edge itself.
    pub(crate) fn edges_in_envelope(
        &self,
        envelope: &AABB<Point>,
    ) -> impl Iterator<Item = EdgeId> + '_ {
        self.index
            .locate_in_envelope_intersecting(envelope)
            .map(|indexed| indexed.id)
    }
}

impl GraphReader for RoadNetwork {
    fn directed_edge(&self, edge: EdgeId) -> Option<DirectedEdge> {
        self.edges.get(&edge).map(|record| DirectedEdge {
            end_node: record.end,
            forward: record.forward,
            info: record.info,
        })
    }

    fn edge_info(&self, offset: EdgeInfoOffset) -> Option<&EdgeInfo> {
        self.infos.get(offset.0 as usize)
    }

    fn opposing_edge(&self, edge: EdgeId) -> Option<EdgeId> {
        self.edges.get(&edge).and_then(|record| record.opposing)
    }

    fn start_node(&self, edge: EdgeId) -> Option<NodeId> {
        self.edges.get(&edge).map(|record| record.start)
    }

    fn end_node(&self, edge: EdgeId) -> Option<NodeId> {
        self.edges.get(&edge).map(|record| record.end)
    }

    fn outgoing_edges(&self, node: NodeId) -> Vec<EdgeId> {
        let mut edges = self
            .graph
            .edges_directed(node, Direction::Outgoing)
            .map(|(_, _, edge)| *edge)
            .collect::<Vec<_>>();

        // Expansion order feeds deterministic tie-breaks downstream.
        edges.sort_unstable();
        edges
    }

    fn node_position(&self, node: NodeId) -> Option<Point> {
        self.nodes.get(&node).copied()
    }
}

struct PendingEdge {
    forward: EdgeId,
    backward: Option<EdgeId>,
    start: NodeId,
    end: NodeId,
    access: Access,
}

/// Assembles a [`RoadNetwork`] from plain node and edge declarations.
///
/// Edge shapes default to the straight line between the end nodes; the
/// shape record is shared between both directions of a two-way road.
///
/// ### Example
///
/// ```rust
/// use tether::graph::RoadNetworkBuilder;
///
/// let network = RoadNetworkBuilder::new()
///     .node(1, 0.0, 0.0)
///     .node(2, 0.001, 0.0)
///     .two_way(10, 11, 1, 2)
///     .build();
/// ```
#[derive(Default)]
pub struct RoadNetworkBuilder {
    nodes: FxHashMap<NodeId, Point>,
    pending: Vec<PendingEdge>,
    access: FxHashMap<EdgeId, Access>,
}

impl RoadNetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, id: u64, lon: f64, lat: f64) -> Self {
        self.nodes.insert(NodeId(id), Point::new(lon, lat));
        self
    }

    /// A single directed edge from `start` to `end`.
    pub fn one_way(mut self, id: u64, start: u64, end: u64) -> Self {
        self.pending.push(PendingEdge {
            forward: EdgeId(id),
            backward: None,
            start: NodeId(start),
            end: NodeId(end),
            access: Access::default(),
        });
        self
    }

    /// A pair of opposing edges covering the same road.
    pub fn two_way(mut self, forward: u64, backward: u64, start: u64, end: u64) -> Self {
        self.pending.push(PendingEdge {
            forward: EdgeId(forward),
            backward: Some(EdgeId(backward)),
            start: NodeId(start),
            end: NodeId(end),
            access: Access::default(),
        });
        self
    }

    /// Override the access flags of a previously-declared edge. Applies to
    /// both directions, as the flags live on the shared shape record.
    pub fn access(mut self, edge: u64, access: Access) -> Self {
        self.access.insert(EdgeId(edge), access);
        self
    }

    pub fn build(self) -> RoadNetwork {
        let mut graph = NetworkStructure::default();
        let mut edges = FxHashMap::default();
        let mut infos = Vec::with_capacity(self.pending.len());
        let mut indexed = Vec::with_capacity(self.pending.len());

        for pending in self.pending {
            let (Some(&start), Some(&end)) =
                (self.nodes.get(&pending.start), self.nodes.get(&pending.end))
            else {
                warn!(
                    "skipping edge {:?}: endpoint node missing from builder",
                    pending.forward
                );
                continue;
            };

            // The adjacency map keys one edge per ordered node pair; a
            // second edge on the same pair would silently replace the
            // first, leaving its record unreachable as a through edge.
            if graph.contains_edge(pending.start, pending.end)
                || (pending.backward.is_some()
                    && graph.contains_edge(pending.end, pending.start))
            {
                warn!(
                    "skipping edge {:?}: a parallel edge already occupies {:?} -> {:?}",
                    pending.forward, pending.start, pending.end
                );
                continue;
            }

            let access = self
                .access
                .get(&pending.forward)
                .copied()
                .unwrap_or(pending.access);

            let info = EdgeInfoOffset(infos.len() as u32);
            infos.push(EdgeInfo {
                shape: LineString::from(vec![start, end]),
                access,
            });

            edges.insert(
                pending.forward,
                EdgeRecord {
                    start: pending.start,
                    end: pending.end,
                    forward: true,
                    info,
                    opposing: pending.backward,
                },
            );
            graph.add_edge(pending.start, pending.end, pending.forward);
            indexed.push(IndexedEdge {
                id: pending.forward,
                lower: start,
                upper: end,
            });

            if let Some(backward) = pending.backward {
                edges.insert(
                    backward,
                    EdgeRecord {
                        start: pending.end,
                        end: pending.start,
                        forward: false,
                        info,
                        opposing: Some(pending.forward),
                    },
                );
                graph.add_edge(pending.end, pending.start, backward);
            }
        }

        info!(
            "built road network: {} nodes, {} directed edges",
            self.nodes.len(),
            edges.len()
        );

        RoadNetwork {
            graph,
            nodes: self.nodes,
            edges,
            infos,
            index: RTree::bulk_load(indexed),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parallel_edges_on_one_node_pair_are_rejected() {
        let network = RoadNetworkBuilder::new()
            .node(1, 0.0, 0.0)
            .node(2, 0.001, 0.0)
            .one_way(10, 1, 2)
            .one_way(20, 1, 2)
            .build();

        // The first declaration wins; the duplicate never registers.
        assert_eq!(network.outgoing_edges(NodeId(1)), vec![EdgeId(10)]);
        assert!(network.directed_edge(EdgeId(20)).is_none());
    }

    #[test]
    fn opposing_one_ways_are_not_parallel() {
        let network = RoadNetworkBuilder::new()
            .node(1, 0.0, 0.0)
            .node(2, 0.001, 0.0)
            .one_way(10, 1, 2)
            .one_way(20, 2, 1)
            .build();

        assert_eq!(network.outgoing_edges(NodeId(1)), vec![EdgeId(10)]);
        assert_eq!(network.outgoing_edges(NodeId(2)), vec![EdgeId(20)]);
    }

    #[test]
    fn two_way_collision_with_an_existing_reverse_edge_is_rejected() {
        let network = RoadNetworkBuilder::new()
            .node(1, 0.0, 0.0)
            .node(2, 0.001, 0.0)
            .one_way(10, 2, 1)
            .two_way(20, 21, 1, 2)
            .build();

        assert_eq!(network.outgoing_edges(NodeId(2)), vec![EdgeId(10)]);
        assert!(network.directed_edge(EdgeId(20)).is_none());
        assert!(network.directed_edge(EdgeId(21)).is_none());
    }
}

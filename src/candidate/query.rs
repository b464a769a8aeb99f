use std::sync::{Arc, Mutex};

use geo::{Destination, Distance, Haversine, LineInterpolatePoint, LineLocatePoint, Point};
use log::debug;
use rstar::AABB;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::candidate::{Candidate, EdgeProjection};
use crate::costing::Costing;
use crate::graph::{EdgeId, GraphReader, NodeId, RoadNetwork};

/// Radius-bounded candidate search over the road graph.
pub trait CandidateQuery {
    /// Candidates within `sqrt(max_sq_radius)` metres of `point` whose
    /// edges pass the costing filter. May return an empty list.
    fn query(&self, point: Point, max_sq_radius: f64, costing: &dyn Costing) -> Vec<Candidate>;
}

type GridCell = (i32, i32);

/// Candidate search backed by the network's edge index, with a
/// cell-quantised read-through cache of edge lists.
///
/// The cache is a plain keyed map filled on first touch: repeated queries
/// near the same cell skip the spatial index entirely. It grows without
/// bound until [`clear`](CandidateGridQuery::clear) drops it; the matcher
/// factory does so once the cell count exceeds its configured budget.
pub struct CandidateGridQuery {
    network: Arc<RoadNetwork>,

    /// Cell width in degrees.
    cell_size: f64,

    cache: Mutex<FxHashMap<GridCell, Arc<Vec<EdgeId>>>>,
}

impl CandidateGridQuery {
    pub fn new(network: Arc<RoadNetwork>, cell_size: f64) -> Self {
        Self {
            network,
            cell_size,
            cache: Mutex::new(FxHashMap::default()),
        }
    }

    /// Number of cached cells.
    pub fn size(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    /// Drop every cached cell.
    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            debug!("dropping {} cached candidate cells", cache.len());
            cache.clear();
        }
    }

    fn cell_of(&self, value: f64) -> i32 {
        (value / self.cell_size).floor() as i32
    }

    fn cell_edges(&self, cell: GridCell) -> Arc<Vec<EdgeId>> {
        let mut cache = self.cache.lock().expect("candidate cache poisoned");
        if let Some(edges) = cache.get(&cell) {
            return Arc::clone(edges);
        }

        let lower = Point::new(cell.0 as f64 * self.cell_size, cell.1 as f64 * self.cell_size);
        let upper = Point::new(
            (cell.0 + 1) as f64 * self.cell_size,
            (cell.1 + 1) as f64 * self.cell_size,
        );
        let envelope = AABB::from_corners(lower, upper);

        let edges = Arc::new(
            self.network
                .edges_in_envelope(&envelope)
                .collect::<Vec<_>>(),
        );
        cache.insert(cell, Arc::clone(&edges));
        edges
    }

    /// Edges whose bounding box may fall within `radius` metres of `point`.
    fn nearby_edges(&self, point: Point, radius: f64) -> Vec<EdgeId> {
        let top_left = Haversine.destination(point, 315.0, radius);
        let bottom_right = Haversine.destination(point, 135.0, radius);

        let mut seen = FxHashSet::default();
        let mut edges = Vec::new();

        for cx in self.cell_of(top_left.x())..=self.cell_of(bottom_right.x()) {
            for cy in self.cell_of(bottom_right.y())..=self.cell_of(top_left.y()) {
                for &edge in self.cell_edges((cx, cy)).iter() {
                    if seen.insert(edge) {
                        edges.push(edge);
                    }
                }
            }
        }

        edges.sort_unstable();
        edges
    }
}

struct NodeSnap {
    vertex: Point,
    sq_distance: f64,
    edges: Vec<EdgeProjection>,
}

impl CandidateQuery for CandidateGridQuery {
    fn query(&self, point: Point, max_sq_radius: f64, costing: &dyn Costing) -> Vec<Candidate> {
        let network = self.network.as_ref();
        let radius = max_sq_radius.sqrt();

        let mut candidates = Vec::new();
        let mut snapped: FxHashMap<NodeId, NodeSnap> = FxHashMap::default();

        for edge in self.nearby_edges(point, radius) {
            let Some(directed) = network.directed_edge(edge) else {
                continue;
            };
            let Some(info) = network.edge_info(directed.info) else {
                continue;
            };

            let Some(frac) = info.shape.line_locate_point(&point) else {
                continue;
            };
            let Some(vertex) = info.shape.line_interpolate_point(frac) else {
                continue;
            };

            let distance = Haversine.distance(point, vertex);
            let sq_distance = distance * distance;
            if sq_distance > max_sq_radius {
                continue;
            }

            let opposing = network.opposing_edge(edge);
            let admit_forward = costing.filter(&directed, info);
            let admit_opposing = opposing
                .and_then(|opp| network.directed_edge(opp))
                .is_some_and(|opp_edge| costing.filter(&opp_edge, info));

            if frac == 0.0 || frac == 1.0 {
                // The projection landed on an endpoint: fold it into a
                // node candidate together with every other edge snapping
                // to the same node.
                let node = if frac == 0.0 {
                    network.start_node(edge)
                } else {
                    network.end_node(edge)
                };
                let Some(node) = node else { continue };

                let snap = snapped.entry(node).or_insert_with(|| NodeSnap {
                    vertex,
                    sq_distance,
                    edges: Vec::new(),
                });
                snap.sq_distance = snap.sq_distance.min(sq_distance);

                if admit_forward {
                    snap.edges.push(EdgeProjection { edge, dist: frac });
                }
                if let (true, Some(opp)) = (admit_opposing, opposing) {
                    snap.edges.push(EdgeProjection {
                        edge: opp,
                        dist: 1.0 - frac,
                    });
                }
                continue;
            }

            let mut edges = Vec::with_capacity(2);
            if admit_forward {
                edges.push(EdgeProjection { edge, dist: frac });
            }
            if let (true, Some(opp)) = (admit_opposing, opposing) {
                edges.push(EdgeProjection {
                    edge: opp,
                    dist: 1.0 - frac,
                });
            }

            if !edges.is_empty() {
                candidates.push(Candidate {
                    vertex,
                    sq_distance,
                    is_node: false,
                    edges,
                });
            }
        }

        candidates.extend(snapped.into_values().filter_map(|snap| {
            if snap.edges.is_empty() {
                return None;
            }

            Some(Candidate {
                vertex: snap.vertex,
                sq_distance: snap.sq_distance,
                is_node: true,
                edges: snap.edges,
            })
        }));

        // Closest-first, edge id as the stable tie-break.
        candidates.sort_by(|a, b| {
            a.sq_distance
                .total_cmp(&b.sq_distance)
                .then_with(|| a.edges[0].edge.cmp(&b.edges[0].edge))
        });

        candidates
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::costing::{AutoCost, PedestrianCost};
    use crate::graph::{Access, RoadNetworkBuilder};

    // ~111.32m of longitude at the equator.
    const DEG_100M: f64 = 100.0 / 111_319.49;

    fn network() -> Arc<RoadNetwork> {
        Arc::new(
            RoadNetworkBuilder::new()
                .node(1, 0.0, 0.0)
                .node(2, DEG_100M, 0.0)
                .node(3, 2.0 * DEG_100M, 0.0)
                .two_way(10, 11, 1, 2)
                .one_way(12, 2, 3)
                .access(
                    12,
                    Access {
                        auto: true,
                        bicycle: true,
                        pedestrian: false,
                    },
                )
                .build(),
        )
    }

    #[test]
    fn interior_projection_carries_both_directions() {
        let query = CandidateGridQuery::new(network(), 0.01);

        let point = Point::new(DEG_100M / 2.0, 0.00001);
        let found = query.query(point, 50.0 * 50.0, &AutoCost);

        let interior = found
            .iter()
            .find(|candidate| !candidate.is_node)
            .expect("interior candidate");
        let edges = interior
            .edges
            .iter()
            .map(|projection| projection.edge)
            .collect::<Vec<_>>();

        assert!(edges.contains(&EdgeId(10)));
        assert!(edges.contains(&EdgeId(11)));
        assert!(interior.distance() < 2.0);
    }

    #[test]
    fn endpoint_projection_snaps_to_node() {
        let query = CandidateGridQuery::new(network(), 0.01);

        // Just beyond node 1, so the projection clamps to the endpoint.
        let point = Point::new(-0.00002, 0.0);
        let found = query.query(point, 50.0 * 50.0, &AutoCost);

        assert!(found.iter().any(|candidate| candidate.is_node));
    }

    #[test]
    fn filter_excludes_inadmissible_edges() {
        let query = CandidateGridQuery::new(network(), 0.01);

        let point = Point::new(1.5 * DEG_100M, 0.00001);
        let found = query.query(point, 30.0 * 30.0, &PedestrianCost);

        assert!(found
            .iter()
            .all(|candidate| candidate.edges.iter().all(|p| p.edge != EdgeId(12))));
    }

    #[test]
    fn cache_fills_and_clears() {
        let query = CandidateGridQuery::new(network(), 0.01);
        assert_eq!(query.size(), 0);

        query.query(Point::new(0.0, 0.0), 100.0, &AutoCost);
        assert!(query.size() > 0);

        query.clear();
        assert_eq!(query.size(), 0);
    }

    #[test]
    fn out_of_radius_yields_nothing() {
        let query = CandidateGridQuery::new(network(), 0.01);

        // ~555m north of the only road, radius 50m.
        let point = Point::new(0.0, 0.005);
        assert!(query.query(point, 50.0 * 50.0, &AutoCost).is_empty());
    }
}

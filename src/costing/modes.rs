use crate::costing::{Costing, TravelMode};
use crate::graph::{DirectedEdge, EdgeInfo};

/// Drive-only admissibility.
#[derive(Default)]
pub struct AutoCost;

impl Costing for AutoCost {
    fn filter(&self, _edge: &DirectedEdge, info: &EdgeInfo) -> bool {
        info.access.auto
    }

    fn travel_mode(&self) -> TravelMode {
        TravelMode::Auto
    }
}

#[derive(Default)]
pub struct BicycleCost;

impl Costing for BicycleCost {
    fn filter(&self, _edge: &DirectedEdge, info: &EdgeInfo) -> bool {
        info.access.bicycle
    }

    fn travel_mode(&self) -> TravelMode {
        TravelMode::Bicycle
    }
}

#[derive(Default)]
pub struct PedestrianCost;

impl Costing for PedestrianCost {
    fn filter(&self, _edge: &DirectedEdge, info: &EdgeInfo) -> bool {
        info.access.pedestrian
    }

    fn travel_mode(&self) -> TravelMode {
        TravelMode::Pedestrian
    }
}

/// Universal admissibility: any edge some mode can traverse is allowed.
#[derive(Default)]
pub struct MultimodalCost;

impl Costing for MultimodalCost {
    fn filter(&self, _edge: &DirectedEdge, info: &EdgeInfo) -> bool {
        info.access.auto || info.access.bicycle || info.access.pedestrian
    }

    fn travel_mode(&self) -> TravelMode {
        TravelMode::Multimodal
    }
}

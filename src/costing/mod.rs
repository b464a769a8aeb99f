//! Travel modes and the admissibility seam between the matcher and the
//! road graph. A [`Costing`] decides which edges a mode may traverse; the
//! matching engine treats it as an opaque filter.

pub mod modes;

#[doc(inline)]
pub use modes::*;

use crate::graph::{DirectedEdge, EdgeInfo};

/// The travel modes a matcher can be created for.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TravelMode {
    Auto,
    Bicycle,
    Pedestrian,
    Multimodal,
}

impl TravelMode {
    pub const COUNT: usize = 4;

    pub fn from_name(name: &str) -> Option<TravelMode> {
        match name {
            "auto" => Some(TravelMode::Auto),
            "bicycle" => Some(TravelMode::Bicycle),
            "pedestrian" => Some(TravelMode::Pedestrian),
            "multimodal" => Some(TravelMode::Multimodal),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TravelMode::Auto => "auto",
            TravelMode::Bicycle => "bicycle",
            TravelMode::Pedestrian => "pedestrian",
            TravelMode::Multimodal => "multimodal",
        }
    }

    /// Dense index into the factory's costing registry.
    pub fn index(&self) -> usize {
        match self {
            TravelMode::Auto => 0,
            TravelMode::Bicycle => 1,
            TravelMode::Pedestrian => 2,
            TravelMode::Multimodal => 3,
        }
    }
}

/// Per-edge admissibility for one travel mode.
pub trait Costing {
    /// Whether the mode may traverse this edge.
    fn filter(&self, edge: &DirectedEdge, info: &EdgeInfo) -> bool;

    fn travel_mode(&self) -> TravelMode;
}

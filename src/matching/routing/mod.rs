//! Pairwise routing between candidate positions: a label-setting search
//! over directed edges, costed in road metres and steered by per-degree
//! turn penalties.

pub mod label;
pub mod shortest_path;
pub mod turn;


#[doc(inline)]
pub use label::{EdgeLabel, Label, LabelSet, RoutePath};
#[doc(inline)]
pub use shortest_path::*;
#[doc(inline)]
pub use turn::*;

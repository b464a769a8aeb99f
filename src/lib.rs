//! Offline hidden-Markov map matching.
//!
//! Takes a noisy trace of geographic measurements and attaches every one
//! of them to the most likely edge or node of a road graph. Matching is
//! offline: the whole trace is available before it begins.
//!
//! The engine consumes a read-only [graph oracle](graph::GraphReader) and
//! a [candidate query](candidate::CandidateQuery); a bundled
//! [in-memory network](graph::RoadNetwork) implements both ends for
//! callers that do not bring their own.
//!
//! ### Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tether::{MapMatcherFactory, MatcherConfig, Measurement, RoadNetworkBuilder, TravelMode};
//!
//! // A single ~111m two-way road along the equator.
//! let network = Arc::new(
//!     RoadNetworkBuilder::new()
//!         .node(1, 0.0, 0.0)
//!         .node(2, 0.001, 0.0)
//!         .two_way(10, 11, 1, 2)
//!         .build(),
//! );
//!
//! let factory = MapMatcherFactory::new(MatcherConfig::default(), network).unwrap();
//! let mut matcher = factory.create(TravelMode::Auto).unwrap();
//!
//! let results = matcher.offline_match(&[
//!     Measurement::new(0.0002, 0.00001),
//!     Measurement::new(0.0008, -0.00001),
//! ]);
//! assert_eq!(results.len(), 2);
//! ```

pub mod candidate;
pub mod costing;
pub mod graph;
pub mod matching;

pub use candidate::*;
pub use costing::*;
pub use graph::*;
pub use matching::*;

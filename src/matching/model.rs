use std::sync::Arc;

use geo::{Distance, Haversine};

use crate::candidate::Candidate;
use crate::costing::Costing;
use crate::graph::GraphReader;
use crate::matching::config::ParamBlock;
use crate::matching::error::ConfigError;
use crate::matching::routing::TurnCostTable;
use crate::matching::state::{Lattice, Measurement, StateId, Time};
use crate::matching::viterbi::{HmmModel, TransitionContext};

/// The hidden-Markov cost model for map matching.
///
/// Emission follows the standard Gaussian noise model on the squared
/// projection distance; transition penalises the gap between routed road
/// distance and the great-circle distance between the measurements, plus
/// accumulated turn penalties (Newson & Krumm, extended with turns).
///
/// Owns the lattice for one matching session. Not safe for concurrent
/// use; a matcher instance drives exactly one session at a time.
pub struct MapMatching<R: GraphReader> {
    reader: Arc<R>,
    costing: Arc<dyn Costing + Send + Sync>,

    params: ParamBlock,

    // 1 / (2 * sigma_z^2)
    inv_double_sq_sigma_z: f64,
    // 1 / beta
    inv_beta: f64,

    turn_costs: TurnCostTable,

    lattice: Lattice,
}

impl<R: GraphReader> MapMatching<R> {
    pub fn new(
        reader: Arc<R>,
        costing: Arc<dyn Costing + Send + Sync>,
        params: ParamBlock,
    ) -> Result<Self, ConfigError> {
        if params.sigma_z <= 0.0 {
            return Err(ConfigError::NonPositiveSigmaZ(params.sigma_z));
        }
        if params.beta <= 0.0 {
            return Err(ConfigError::NonPositiveBeta(params.beta));
        }

        let turn_costs = TurnCostTable::new(params.turn_penalty_factor)?;

        Ok(Self {
            reader,
            costing,
            inv_double_sq_sigma_z: 1.0 / (2.0 * params.sigma_z * params.sigma_z),
            inv_beta: 1.0 / params.beta,
            params,
            turn_costs,
            lattice: Lattice::default(),
        })
    }

    /// Drop all session state: columns, states and routing caches.
    pub fn clear(&mut self) {
        self.lattice.clear();
    }

    /// Append one measurement's candidate column.
    pub fn append_state(
        &mut self,
        measurement: Measurement,
        candidates: Vec<Candidate>,
    ) -> Time {
        self.lattice.append_column(measurement, candidates)
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn reader(&self) -> &R {
        self.reader.as_ref()
    }

    pub fn costing(&self) -> &dyn Costing {
        self.costing.as_ref()
    }

    pub fn params(&self) -> &ParamBlock {
        &self.params
    }

    /// The routing budget for one transition: a slack ratio over the
    /// great-circle distance, capped by the breakage distance.
    fn max_route_distance(&self, left: StateId, right: StateId) -> f64 {
        let gc = Haversine.distance(
            self.lattice.measurement_of(left).lnglat,
            self.lattice.measurement_of(right).lnglat,
        );

        (gc * self.params.max_route_distance_factor).min(self.params.breakage_distance)
    }
}

impl<R: GraphReader> HmmModel for MapMatching<R> {
    fn columns(&self) -> usize {
        self.lattice.columns()
    }

    fn column(&self, time: Time) -> &[StateId] {
        self.lattice.column(time)
    }

    fn emission_cost(&self, state: StateId) -> f64 {
        self.lattice.state(state).candidate().sq_distance * self.inv_double_sq_sigma_z
    }

    fn transition_cost(&mut self, context: TransitionContext<'_>) -> Option<f64> {
        if !self.lattice.routed(context.left) {
            // The single point where shortest-path work happens for this
            // state. The seed edge comes from the chosen predecessor's
            // cache so turn penalties continue across the hop.
            let seed = context
                .left_predecessor
                .and_then(|previous| self.lattice.last_label(previous, context.left))
                .and_then(|label| label.edge_label);

            let budget = self.max_route_distance(context.left, context.right);
            self.lattice.route(
                context.left,
                context.unreached,
                self.reader.as_ref(),
                budget,
                self.costing.as_ref(),
                seed,
                &self.turn_costs,
            );
        }

        let label = self.lattice.last_label(context.left, context.right)?;
        let gc = Haversine.distance(
            self.lattice.measurement_of(context.left).lnglat,
            self.lattice.measurement_of(context.right).lnglat,
        );

        Some((label.turn_cost + (label.cost - gc).abs()) * self.inv_beta)
    }

    fn cost_sofar(&self, prev: f64, transition: f64, emission: f64) -> f64 {
        prev + transition + emission
    }
}

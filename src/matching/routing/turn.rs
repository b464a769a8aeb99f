use crate::graph::{heading_at_end, heading_at_start, EdgeId, GraphReader};
use crate::matching::error::ConfigError;

/// Degrees of bend the table distinguishes.
const TABLE_DEGREES: usize = 181;

/// Penalty per degree of bend between two successive directed edges.
///
/// Precomputed once per model as `factor * exp(-deg / 45)` and immutable
/// thereafter. A factor of zero disables turn penalties entirely (the
/// table stays all-zero).
#[derive(Clone, Debug)]
pub struct TurnCostTable {
    table: [f64; TABLE_DEGREES],
}

impl TurnCostTable {
    pub fn new(turn_penalty_factor: f64) -> Result<Self, ConfigError> {
        if !turn_penalty_factor.is_finite() || turn_penalty_factor < 0.0 {
            return Err(ConfigError::InvalidTurnPenaltyFactor(turn_penalty_factor));
        }

        let mut table = [0.0; TABLE_DEGREES];
        if turn_penalty_factor > 0.0 {
            for (deg, cost) in table.iter_mut().enumerate() {
                *cost = turn_penalty_factor * (-(deg as f64) / 45.0).exp();
            }
        }

        Ok(Self { table })
    }

    /// Penalty for a bend of `angle` degrees, rounded to the nearest
    /// tabulated degree.
    pub fn cost(&self, angle: f64) -> f64 {
        let deg = angle.round().clamp(0.0, 180.0) as usize;
        self.table[deg]
    }
}

/// Bend angle in degrees, in `[0, 180]`, between the heading with which
/// `inbound` arrives at a node and the heading with which `outbound`
/// leaves it. `None` if either shape is unavailable.
pub fn bend_angle<R: GraphReader + ?Sized>(
    reader: &R,
    inbound: EdgeId,
    outbound: EdgeId,
) -> Option<f64> {
    if inbound == outbound {
        return Some(0.0);
    }

    let arrive = heading_at_end(reader, inbound)?;
    let depart = heading_at_start(reader, outbound)?;

    let mut delta = (depart - arrive).abs() % 360.0;
    if delta > 180.0 {
        delta = 360.0 - delta;
    }

    Some(delta)
}

use thiserror::Error;

use crate::costing::TravelMode;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("expected sigma_z to be positive, got {0}")]
    NonPositiveSigmaZ(f64),

    #[error("expected beta to be positive, got {0}")]
    NonPositiveBeta(f64),

    #[error("expected turn penalty factor to be finite and nonnegative, got {0}")]
    InvalidTurnPenaltyFactor(f64),

    #[error("unknown travel mode name: {0:?}")]
    UnknownTravelMode(String),

    #[error("found duplicate costing registration for travel mode {}", .0.name())]
    DuplicateTravelMode(TravelMode),

    #[error("no costing registered for travel mode {}", .0.name())]
    MissingCosting(TravelMode),
}

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("configuration rejected: {0}")]
    Config(#[from] ConfigError),

    #[error("found invalid route: {0}")]
    InvalidRoute(String),

    #[error("graph data missing while reconstructing route")]
    MissingGraphData,
}

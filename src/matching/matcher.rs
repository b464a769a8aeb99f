use std::sync::Arc;

use log::info;

use crate::candidate::CandidateGridQuery;
use crate::costing::{
    AutoCost, BicycleCost, Costing, MultimodalCost, PedestrianCost, TravelMode,
};
use crate::graph::{GraphReader, RoadNetwork};
use crate::matching::config::{MatcherConfig, OverrideBlock, ParamBlock, Preferences};
use crate::matching::error::{ConfigError, MatchError};
use crate::matching::model::MapMatching;
use crate::matching::offline::{offline_match, MatchResult};
use crate::matching::segment::{construct_route, EdgeSegment};
use crate::matching::state::{Lattice, Measurement};
use crate::matching::viterbi::ViterbiSearch;

/// Width, in degrees, of the pseudo-tile the candidate grid divides into
/// `grid.size` cells per axis.
const TILE_SIZE_DEGREES: f64 = 0.25;

/// The facade connecting one travel mode's model, the candidate query and
/// route reconstruction.
///
/// One matcher drives one session at a time; results and their lattice
/// links stay valid until the next [`offline_match`](MapMatcher::offline_match)
/// or [`clear`](MapMatcher::clear).
pub struct MapMatcher {
    travel_mode: TravelMode,
    params: ParamBlock,

    network: Arc<RoadNetwork>,
    rangequery: Arc<CandidateGridQuery>,

    matching: MapMatching<RoadNetwork>,
    search: ViterbiSearch,
}

impl MapMatcher {
    pub fn travel_mode(&self) -> TravelMode {
        self.travel_mode
    }

    /// The merged parameters this matcher runs with.
    pub fn params(&self) -> &ParamBlock {
        &self.params
    }

    pub fn lattice(&self) -> &Lattice {
        self.matching.lattice()
    }

    /// Match a trace, producing one result per measurement.
    pub fn offline_match(&mut self, measurements: &[Measurement]) -> Vec<MatchResult> {
        let search_radius = self.params.search_radius.min(self.params.max_search_radius);

        offline_match(
            &mut self.matching,
            &mut self.search,
            self.rangequery.as_ref(),
            measurements,
            search_radius * search_radius,
            self.params.interpolation_distance,
        )
    }

    /// Reconstruct the matched edge-segment route from the current
    /// session's results, tolerating the self-loop map pathology.
    pub fn construct_route(&self, matches: &[MatchResult]) -> Result<Vec<EdgeSegment>, MatchError> {
        self.construct_route_with(matches, true)
    }

    pub fn construct_route_with(
        &self,
        matches: &[MatchResult],
        tolerate_loops: bool,
    ) -> Result<Vec<EdgeSegment>, MatchError> {
        construct_route(
            self.network.as_ref(),
            self.matching.lattice(),
            matches,
            tolerate_loops,
        )
    }

    /// Drop the session's lattice and search state, invalidating any
    /// outstanding result links.
    pub fn clear(&mut self) {
        self.matching.clear();
        self.search.clear();
    }
}

/// Builds matchers over one shared network and candidate index, serving
/// one matcher per request.
pub struct MapMatcherFactory {
    config: MatcherConfig,

    network: Arc<RoadNetwork>,
    rangequery: Arc<CandidateGridQuery>,

    costings: [Option<Arc<dyn Costing + Send + Sync>>; TravelMode::COUNT],
}

impl MapMatcherFactory {
    pub fn new(config: MatcherConfig, network: Arc<RoadNetwork>) -> Result<Self, ConfigError> {
        let cell_size = TILE_SIZE_DEGREES / config.grid.size.max(1) as f64;
        let rangequery = Arc::new(CandidateGridQuery::new(Arc::clone(&network), cell_size));

        let mut factory = Self {
            config,
            network,
            rangequery,
            costings: [None, None, None, None],
        };

        factory.register_costing(Arc::new(AutoCost))?;
        factory.register_costing(Arc::new(BicycleCost))?;
        factory.register_costing(Arc::new(PedestrianCost))?;
        factory.register_costing(Arc::new(MultimodalCost))?;

        Ok(factory)
    }

    fn register_costing(
        &mut self,
        costing: Arc<dyn Costing + Send + Sync>,
    ) -> Result<(), ConfigError> {
        let mode = costing.travel_mode();
        let slot = &mut self.costings[mode.index()];

        if slot.is_some() {
            return Err(ConfigError::DuplicateTravelMode(mode));
        }

        *slot = Some(costing);
        Ok(())
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn rangequery(&self) -> &CandidateGridQuery {
        self.rangequery.as_ref()
    }

    pub fn travel_mode(&self, name: &str) -> Result<TravelMode, ConfigError> {
        TravelMode::from_name(name).ok_or_else(|| ConfigError::UnknownTravelMode(name.to_string()))
    }

    /// A matcher for `mode` with the merged mode configuration.
    pub fn create(&self, mode: TravelMode) -> Result<MapMatcher, ConfigError> {
        self.create_merged(mode, &OverrideBlock::default())
    }

    pub fn create_by_name(&self, name: &str) -> Result<MapMatcher, ConfigError> {
        self.create(self.travel_mode(name)?)
    }

    /// A matcher for per-call preferences: the named (or default) mode's
    /// merged configuration with the preference overrides on top.
    pub fn create_with_overrides(
        &self,
        preferences: &Preferences,
    ) -> Result<MapMatcher, ConfigError> {
        let name = preferences.mode.as_deref().unwrap_or(&self.config.mode);
        let mode = self.travel_mode(name)?;

        self.create_merged(mode, &preferences.overrides)
    }

    fn create_merged(
        &self,
        mode: TravelMode,
        overrides: &OverrideBlock,
    ) -> Result<MapMatcher, ConfigError> {
        let params = self.config.merged(mode, overrides);
        let costing = self.costings[mode.index()]
            .clone()
            .ok_or(ConfigError::MissingCosting(mode))?;

        let matching = MapMatching::new(Arc::clone(&self.network), costing, params)?;
        info!("created {} matcher", mode.name());

        Ok(MapMatcher {
            travel_mode: mode,
            params,
            network: Arc::clone(&self.network),
            rangequery: Arc::clone(&self.rangequery),
            matching,
            search: ViterbiSearch::default(),
        })
    }

    /// Drop caches that have outgrown their budget.
    pub fn clear_cache_if_possible(&self) {
        if self.network.over_committed() {
            self.network.clear();
        }

        if self.rangequery.size() as f64 > self.config.grid.cache_size {
            info!(
                "candidate cache at {} cells exceeds budget, clearing",
                self.rangequery.size()
            );
            self.rangequery.clear();
        }
    }

    /// Drop all caches unconditionally.
    pub fn clear_cache(&self) {
        self.network.clear();
        self.rangequery.clear();
    }
}

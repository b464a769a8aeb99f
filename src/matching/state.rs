use geo::Point;
use log::debug;
use measure_time::debug_time;
use rustc_hash::FxHashMap;

use crate::candidate::Candidate;
use crate::costing::Costing;
use crate::graph::GraphReader;
use crate::matching::routing::{
    find_shortest_path, EdgeLabel, Label, LabelSet, RoutePath, TurnCostTable,
};

/// Column index within the lattice.
pub type Time = u32;

/// Dense identifier of a state, assigned sequentially on append.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct StateId(pub u32);

/// An immutable geographic measurement. An ordered sequence of these
/// forms the trace handed to the matcher.
#[derive(Clone, Copy, Debug)]
pub struct Measurement {
    pub lnglat: Point,
}

impl Measurement {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self {
            lnglat: Point::new(lon, lat),
        }
    }
}

/// A candidate elevated to a node of the lattice.
#[derive(Clone, Debug)]
pub struct State {
    id: StateId,
    time: Time,
    candidate: Candidate,
}

impl State {
    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn time(&self) -> Time {
        self.time
    }

    pub fn candidate(&self) -> &Candidate {
        &self.candidate
    }
}

/// The one-shot routing result of a state: the label arena plus the
/// mapping from reached target states into it.
pub(crate) struct RoutingCache {
    labelset: LabelSet,
    label_idx: FxHashMap<StateId, u32>,
}

/// The column structure of the hidden Markov model.
///
/// States live in a flat arena; a parallel vector of `Option<RoutingCache>`
/// carries each state's routing side effect, so `routed` is simply the
/// option's tag and routing stays at-most-once per state per session.
#[derive(Default)]
pub struct Lattice {
    states: Vec<State>,
    caches: Vec<Option<RoutingCache>>,
    columns: Vec<Vec<StateId>>,
    measurements: Vec<Measurement>,
}

impl Lattice {
    pub fn clear(&mut self) {
        self.states.clear();
        self.caches.clear();
        self.columns.clear();
        self.measurements.clear();
    }

    /// Append one column of candidate states for `measurement`.
    ///
    /// Returns the new column's index whether or not any candidates were
    /// supplied; an empty column later breaks the Viterbi chain at that
    /// point rather than erroring here.
    pub fn append_column(
        &mut self,
        measurement: Measurement,
        candidates: Vec<Candidate>,
    ) -> Time {
        let time = self.columns.len() as Time;

        let mut column = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let id = StateId(self.states.len() as u32);
            self.states.push(State {
                id,
                time,
                candidate,
            });
            self.caches.push(None);
            column.push(id);
        }

        debug!("appended column {} with {} states", time, column.len());
        self.columns.push(column);
        self.measurements.push(measurement);

        time
    }

    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.0 as usize]
    }

    pub fn column(&self, time: Time) -> &[StateId] {
        &self.columns[time as usize]
    }

    /// Number of columns appended so far.
    pub fn columns(&self) -> usize {
        self.columns.len()
    }

    pub fn measurement(&self, time: Time) -> &Measurement {
        &self.measurements[time as usize]
    }

    pub fn measurement_of(&self, id: StateId) -> &Measurement {
        self.measurement(self.state(id).time)
    }

    /// Whether `route` has been applied to this state.
    pub fn routed(&self, id: StateId) -> bool {
        self.caches[id.0 as usize].is_some()
    }

    /// One-shot routing from `id` to the given target states.
    ///
    /// `targets` is the unreached frontier of the next column, so a state
    /// never routes to targets already pruned from consideration. Must not
    /// be called on an already-routed state.
    #[allow(clippy::too_many_arguments)]
    pub fn route<R: GraphReader + ?Sized>(
        &mut self,
        id: StateId,
        targets: &[StateId],
        reader: &R,
        max_route_distance: f64,
        costing: &dyn Costing,
        seed: Option<EdgeLabel>,
        turn_costs: &TurnCostTable,
    ) {
        debug_assert!(!self.routed(id), "state routing is at-most-once");
        debug_time!("route state");

        let locations = std::iter::once(self.state(id).candidate.clone())
            .chain(targets.iter().map(|target| self.state(*target).candidate.clone()))
            .collect::<Vec<_>>();

        let mut labelset = LabelSet::new(max_route_distance.ceil());
        let results = find_shortest_path(
            reader,
            &locations,
            0,
            &mut labelset,
            costing,
            seed,
            turn_costs,
        );

        // Only targets reached within budget enter the cache.
        let mut label_idx = FxHashMap::default();
        for (index, target) in targets.iter().enumerate() {
            if let Some(&label) = results.get(&((index + 1) as u16)) {
                label_idx.insert(*target, label);
            }
        }

        self.caches[id.0 as usize] = Some(RoutingCache { labelset, label_idx });
    }

    /// The final label of the routed path from `id` to `target`, if the
    /// target was reached.
    pub fn last_label(&self, id: StateId, target: StateId) -> Option<&Label> {
        let cache = self.caches[id.0 as usize].as_ref()?;
        let index = cache.label_idx.get(&target)?;
        Some(cache.labelset.label(*index))
    }

    /// Labels of the routed path from `target` back to `id`'s root.
    /// Empty if the target was never reached.
    pub fn route_path(&self, id: StateId, target: StateId) -> RoutePath<'_> {
        match self.caches[id.0 as usize].as_ref() {
            Some(cache) => match cache.label_idx.get(&target) {
                Some(index) => cache.labelset.route_path(*index),
                None => RoutePath::empty(),
            },
            None => RoutePath::empty(),
        }
    }
}

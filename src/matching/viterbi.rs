use log::{debug, warn};
use rustc_hash::FxHashMap;

use crate::matching::state::{StateId, Time};

/// Everything a model needs to evaluate one transition.
///
/// `unreached` is the frontier of the right state's column: the targets
/// still under consideration there, which is exactly the set a lazily
/// routed left state should route towards.
#[derive(Clone, Copy, Debug)]
pub struct TransitionContext<'a> {
    pub left: StateId,
    pub right: StateId,

    /// The left state's own Viterbi back-pointer, for seeding
    /// turn-penalty continuity in the model's routing.
    pub left_predecessor: Option<StateId>,

    pub unreached: &'a [StateId],
}

/// The cost hooks a concrete model supplies to the column DP.
///
/// The search is polymorphic over the model only through these; it never
/// inspects states beyond their identifiers.
pub trait HmmModel {
    fn columns(&self) -> usize;

    fn column(&self, time: Time) -> &[StateId];

    fn emission_cost(&self, state: StateId) -> f64;

    /// Cost of moving between two adjacent-column states, or `None` when
    /// the pairing is infeasible. May lazily perform routing work.
    fn transition_cost(&mut self, context: TransitionContext<'_>) -> Option<f64>;

    fn cost_sofar(&self, prev: f64, transition: f64, emission: f64) -> f64;
}

/// Column-by-column dynamic programming over lattice states.
///
/// After a column is processed, every feasible state in it has a best
/// predecessor and an accumulated cost; ties break toward the lower
/// [`StateId`] so results are deterministic. A column with no feasible
/// state breaks the chain: the following column restarts from emission
/// costs alone.
#[derive(Default)]
pub struct ViterbiSearch {
    cost: FxHashMap<StateId, f64>,
    predecessor: FxHashMap<StateId, StateId>,
    winner: Vec<Option<StateId>>,
    unreached: Vec<Vec<StateId>>,
}

impl ViterbiSearch {
    pub fn clear(&mut self) {
        self.cost.clear();
        self.predecessor.clear();
        self.winner.clear();
        self.unreached.clear();
    }

    /// The chosen back-pointer of a state, absent for chain roots and
    /// states that were never reached.
    pub fn predecessor(&self, state: StateId) -> Option<StateId> {
        self.predecessor.get(&state).copied()
    }

    pub fn cost_sofar(&self, state: StateId) -> Option<f64> {
        self.cost.get(&state).copied()
    }

    /// The cheapest feasible state of an already-processed column.
    pub fn winner(&self, time: Time) -> Option<StateId> {
        self.winner.get(time as usize).copied().flatten()
    }

    /// Walk back from the winner of `end`, yielding one chosen state per
    /// column in reverse chronological order. Broken columns yield `None`
    /// and the walk continues from the previous column's winner.
    pub fn search_path<'s, M: HmmModel>(
        &'s mut self,
        model: &mut M,
        end: Time,
    ) -> SearchPath<'s> {
        self.process_until(model, end);
        let cursor = self.winner(end);

        SearchPath {
            search: &*self,
            time: Some(end),
            cursor,
        }
    }

    fn process_until<M: HmmModel>(&mut self, model: &mut M, end: Time) {
        debug_assert!((end as usize) < model.columns());

        while self.winner.len() <= end as usize {
            let time = self.winner.len() as Time;
            if time == 0 || self.winner[time as usize - 1].is_none() {
                self.init_column(model, time);
            } else {
                self.advance(model, time);
            }
        }
    }

    /// Start (or restart) the chain at `time`: states are costed by
    /// emission alone and carry no predecessor.
    fn init_column<M: HmmModel>(&mut self, model: &M, time: Time) {
        let column = model.column(time).to_vec();

        for &state in &column {
            self.cost.insert(state, model.emission_cost(state));
        }

        self.winner.push(Self::argmin(&column, &self.cost));
        self.unreached.push(column);
    }

    fn advance<M: HmmModel>(&mut self, model: &mut M, time: Time) {
        let column = model.column(time).to_vec();
        if column.is_empty() {
            debug!("column {time} is empty; viterbi chain breaks here");
            self.winner.push(None);
            self.unreached.push(Vec::new());
            return;
        }

        // Feasible predecessors, in ascending id order for tie-breaks.
        let previous = model
            .column(time - 1)
            .iter()
            .filter_map(|state| self.cost.get(state).map(|cost| (*state, *cost)))
            .collect::<Vec<_>>();

        let mut unreached = column.clone();
        let mut reached_any = false;

        for &right in &column {
            let emission = model.emission_cost(right);
            let mut best: Option<(f64, StateId)> = None;

            for &(left, left_cost) in &previous {
                let context = TransitionContext {
                    left,
                    right,
                    left_predecessor: self.predecessor.get(&left).copied(),
                    unreached: &unreached,
                };

                if let Some(transition) = model.transition_cost(context) {
                    let cost = model.cost_sofar(left_cost, transition, emission);
                    if best.is_none_or(|(current, _)| cost < current) {
                        best = Some((cost, left));
                    }
                }
            }

            match best {
                Some((cost, left)) => {
                    self.cost.insert(right, cost);
                    self.predecessor.insert(right, left);
                    reached_any = true;
                }
                None => {
                    // Every transition into this state is forbidden: drop
                    // it from further consideration.
                    unreached.retain(|state| *state != right);
                    debug!("pruned {right:?} from column {time}: no feasible transition");
                }
            }
        }

        if !reached_any {
            warn!("viterbi chain broken entering column {time}; restarting there");
            unreached = column.clone();
            for &state in &column {
                self.cost.insert(state, model.emission_cost(state));
                self.predecessor.remove(&state);
            }
        }

        self.winner.push(Self::argmin(&column, &self.cost));
        self.unreached.push(unreached);
    }

    fn argmin(column: &[StateId], cost: &FxHashMap<StateId, f64>) -> Option<StateId> {
        let mut best: Option<(f64, StateId)> = None;
        for &state in column {
            let Some(&c) = cost.get(&state) else { continue };
            if best.is_none_or(|(current, _)| c < current) {
                best = Some((c, state));
            }
        }
        best.map(|(_, state)| state)
    }
}

/// Reverse-chronological walk over the chosen states, one entry per
/// column from the end time down to zero.
pub struct SearchPath<'a> {
    search: &'a ViterbiSearch,
    time: Option<Time>,
    cursor: Option<StateId>,
}

impl Iterator for SearchPath<'_> {
    type Item = Option<StateId>;

    fn next(&mut self) -> Option<Self::Item> {
        let time = self.time?;
        let item = self.cursor;

        if time == 0 {
            self.time = None;
        } else {
            self.time = Some(time - 1);
            self.cursor = match item.and_then(|state| self.search.predecessor(state)) {
                Some(previous) => Some(previous),
                // The chain broke here: continue from that column's own
                // winner, if it has one.
                None => self.search.winner(time - 1),
            };
        }

        Some(item)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// A model with explicit per-pair transition costs, no routing.
    struct TableModel {
        columns: Vec<Vec<StateId>>,
        emission: FxHashMap<StateId, f64>,
        transition: FxHashMap<(StateId, StateId), f64>,
    }

    impl TableModel {
        fn new(columns: Vec<Vec<u32>>) -> Self {
            Self {
                columns: columns
                    .into_iter()
                    .map(|column| column.into_iter().map(StateId).collect())
                    .collect(),
                emission: FxHashMap::default(),
                transition: FxHashMap::default(),
            }
        }

        fn emit(mut self, state: u32, cost: f64) -> Self {
            self.emission.insert(StateId(state), cost);
            self
        }

        fn link(mut self, left: u32, right: u32, cost: f64) -> Self {
            self.transition.insert((StateId(left), StateId(right)), cost);
            self
        }
    }

    impl HmmModel for TableModel {
        fn columns(&self) -> usize {
            self.columns.len()
        }

        fn column(&self, time: Time) -> &[StateId] {
            &self.columns[time as usize]
        }

        fn emission_cost(&self, state: StateId) -> f64 {
            self.emission.get(&state).copied().unwrap_or(0.0)
        }

        fn transition_cost(&mut self, context: TransitionContext<'_>) -> Option<f64> {
            self.transition
                .get(&(context.left, context.right))
                .copied()
        }

        fn cost_sofar(&self, prev: f64, transition: f64, emission: f64) -> f64 {
            prev + transition + emission
        }
    }

    fn chosen(model: &mut TableModel, end: Time) -> Vec<Option<StateId>> {
        let mut search = ViterbiSearch::default();
        let mut path = search.search_path(model, end).collect::<Vec<_>>();
        path.reverse();
        path
    }

    #[test]
    fn picks_the_cheapest_chain() {
        let mut model = TableModel::new(vec![vec![0, 1], vec![2, 3]])
            .emit(0, 1.0)
            .emit(1, 5.0)
            .emit(2, 1.0)
            .emit(3, 1.0)
            .link(0, 2, 10.0)
            .link(0, 3, 1.0)
            .link(1, 2, 1.0)
            .link(1, 3, 10.0);

        let path = chosen(&mut model, 1);
        assert_eq!(path, vec![Some(StateId(0)), Some(StateId(3))]);
    }

    #[test]
    fn ties_break_toward_the_lower_state_id() {
        let mut model = TableModel::new(vec![vec![0, 1], vec![2]])
            .link(0, 2, 1.0)
            .link(1, 2, 1.0);

        let mut search = ViterbiSearch::default();
        search.search_path(&mut model, 1).for_each(drop);

        assert_eq!(search.predecessor(StateId(2)), Some(StateId(0)));
    }

    #[test]
    fn empty_column_breaks_and_restarts_the_chain() {
        let mut model = TableModel::new(vec![vec![0], vec![], vec![1]]).emit(1, 2.0);

        let path = chosen(&mut model, 2);
        assert_eq!(path, vec![Some(StateId(0)), None, Some(StateId(1))]);

        let mut search = ViterbiSearch::default();
        search.search_path(&mut model, 2).for_each(drop);
        assert_eq!(search.predecessor(StateId(1)), None);
        assert_eq!(search.cost_sofar(StateId(1)), Some(2.0));
    }

    #[test]
    fn fully_infeasible_column_restarts_from_emissions() {
        // No transitions at all between the columns.
        let mut model = TableModel::new(vec![vec![0], vec![1, 2]])
            .emit(1, 3.0)
            .emit(2, 2.0);

        let path = chosen(&mut model, 1);
        assert_eq!(path, vec![Some(StateId(0)), Some(StateId(2))]);
    }

    #[test]
    fn pruned_state_leaves_the_frontier() {
        let mut model = TableModel::new(vec![vec![0], vec![1, 2]]).link(0, 2, 1.0);

        let mut search = ViterbiSearch::default();
        search.search_path(&mut model, 1).for_each(drop);

        assert_eq!(search.cost_sofar(StateId(1)), None);
        assert!(!search.unreached[1].contains(&StateId(1)));
        assert!(search.unreached[1].contains(&StateId(2)));
    }
}

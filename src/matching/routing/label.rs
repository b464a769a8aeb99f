use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;

use crate::graph::{EdgeId, NodeId};

/// The last directed edge taken to reach a position.
///
/// Handed from one pairwise route to the next so turn penalties stay
/// continuous across state transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EdgeLabel {
    pub edge: EdgeId,
}

/// One entry of a [`LabelSet`].
///
/// Labels chain backwards through [`predecessor`](#structfield.predecessor)
/// (an index within the same set); walking the chain from a destination
/// label yields the route back to the source.
#[derive(Clone, Debug)]
pub struct Label {
    pub predecessor: Option<u32>,

    /// Cumulative road distance from the source, in metres.
    pub cost: f64,

    /// Sum of turn penalties accumulated along the way.
    pub turn_cost: f64,

    pub node: Option<NodeId>,
    pub edge: Option<EdgeId>,

    /// Offsets within [`edge`](#structfield.edge), in `[0, 1]`.
    pub source: f64,
    pub target: f64,

    pub edge_label: Option<EdgeLabel>,
}

impl Label {
    /// Queue ordering includes accumulated penalties so the search
    /// prefers straighter paths of equal length.
    pub(crate) fn sortcost(&self) -> f64 {
        self.cost + self.turn_cost
    }
}

/// What a label settles: an interior network node, or one of the
/// destination locations handed to the search.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub(crate) enum LabelKey {
    Node(NodeId),
    Destination(u16),
}

#[derive(Clone, Copy)]
struct Status {
    label: u32,
    settled: bool,
}

struct QueueEntry {
    sortcost: f64,
    label: u32,
    key: LabelKey,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.sortcost == other.sortcost && self.label == other.label
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap over sortcost; earlier labels win ties for determinism.
        other
            .sortcost
            .total_cmp(&self.sortcost)
            .then_with(|| other.label.cmp(&self.label))
    }
}

/// Append-only arena of shortest-path labels rooted at one source
/// candidate, bounded by a route-distance budget.
///
/// Improvements append a fresh label and repoint the per-key status; stale
/// queue entries are skipped on pop, the same discipline the bounded
/// Dijkstra uses elsewhere in the crate's lineage.
pub struct LabelSet {
    bound: f64,
    labels: Vec<Label>,
    queue: BinaryHeap<QueueEntry>,
    node_status: FxHashMap<NodeId, Status>,
    dest_status: FxHashMap<u16, Status>,
}

impl LabelSet {
    pub fn new(bound: f64) -> Self {
        Self {
            bound,
            labels: Vec::with_capacity(64),
            queue: BinaryHeap::with_capacity(64),
            node_status: FxHashMap::default(),
            dest_status: FxHashMap::default(),
        }
    }

    pub fn label(&self, index: u32) -> &Label {
        &self.labels[index as usize]
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Append the source's own label. Never enqueued; it exists so every
    /// chain terminates in a dummy entry with no edge.
    pub(crate) fn put_root(&mut self, label: Label) -> u32 {
        let index = self.labels.len() as u32;
        self.labels.push(label);
        index
    }

    /// Offer a label for `key`, keeping it only if it is within budget and
    /// improves on the best unsettled label seen so far.
    pub(crate) fn put(&mut self, key: LabelKey, label: Label) {
        if label.cost > self.bound {
            return;
        }

        let sortcost = label.sortcost();
        let status = match key {
            LabelKey::Node(node) => self.node_status.get(&node),
            LabelKey::Destination(dest) => self.dest_status.get(&dest),
        };

        if let Some(status) = status {
            if status.settled || self.labels[status.label as usize].sortcost() <= sortcost {
                return;
            }
        }

        let index = self.labels.len() as u32;
        self.labels.push(label);

        let status = Status {
            label: index,
            settled: false,
        };
        match key {
            LabelKey::Node(node) => {
                self.node_status.insert(node, status);
            }
            LabelKey::Destination(dest) => {
                self.dest_status.insert(dest, status);
            }
        }

        self.queue.push(QueueEntry {
            sortcost,
            label: index,
            key,
        });
    }

    /// Settle and return the cheapest open label, skipping entries
    /// superseded by later improvements.
    pub(crate) fn pop(&mut self) -> Option<(u32, LabelKey)> {
        while let Some(entry) = self.queue.pop() {
            let status = match entry.key {
                LabelKey::Node(node) => self.node_status.get_mut(&node),
                LabelKey::Destination(dest) => self.dest_status.get_mut(&dest),
            };

            let Some(status) = status else { continue };
            if status.settled || status.label != entry.label {
                continue;
            }

            status.settled = true;
            return Some((entry.label, entry.key));
        }

        None
    }

    /// Walk the chain from `from` back to the root, inclusive.
    pub fn route_path(&self, from: u32) -> RoutePath<'_> {
        RoutePath {
            labels: &self.labels,
            next: Some(from),
        }
    }
}

/// Iterator over a label chain, destination first, root (dummy) last.
pub struct RoutePath<'a> {
    labels: &'a [Label],
    next: Option<u32>,
}

impl RoutePath<'_> {
    /// A path that yields nothing, for unreachable targets.
    pub(crate) fn empty() -> RoutePath<'static> {
        RoutePath {
            labels: &[],
            next: None,
        }
    }
}

impl<'a> Iterator for RoutePath<'a> {
    type Item = &'a Label;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.next?;
        let label = &self.labels[index as usize];
        self.next = label.predecessor;
        Some(label)
    }
}

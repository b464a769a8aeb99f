use std::fmt;

/// Identifier of a node within the road network.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// Identifier of a directed edge within the road network.
///
/// Opposing directions of a two-way road are distinct edges,
/// related through [`GraphReader::opposing_edge`](crate::graph::GraphReader::opposing_edge).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub u64);

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Debug for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// The element of the road network a matched point is attached to.
///
/// `Unknown` marks points that could not be attached; their reported
/// position falls back to the raw measurement.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum GraphAttachment {
    #[default]
    Unknown,
    Edge(EdgeId),
    Node(NodeId),
}

impl GraphAttachment {
    /// Whether the attachment points at an actual network element.
    pub fn is_known(&self) -> bool {
        !matches!(self, GraphAttachment::Unknown)
    }
}

use geo::{Bearing, Distance, Haversine, LineString, Point};

use crate::graph::{EdgeId, NodeId};

/// Offset of a shared shape record within the oracle's storage.
///
/// Opposing edges of a two-way road reference the same record; the
/// [`DirectedEdge::forward`] flag tells which orientation applies.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct EdgeInfoOffset(pub u32);

/// Per-mode access permissions of an edge.
#[derive(Clone, Copy, Debug)]
pub struct Access {
    pub auto: bool,
    pub bicycle: bool,
    pub pedestrian: bool,
}

impl Default for Access {
    fn default() -> Self {
        Access {
            auto: true,
            bicycle: true,
            pedestrian: true,
        }
    }
}

/// The directed-edge record handed out by the oracle.
#[derive(Clone, Copy, Debug)]
pub struct DirectedEdge {
    /// The node this edge arrives at.
    pub end_node: NodeId,

    /// Whether the edge traverses its shape record in stored order.
    pub forward: bool,

    /// Where the shared shape record lives.
    pub info: EdgeInfoOffset,
}

/// The shape record shared between a pair of opposing edges.
///
/// The shape is stored in the forward orientation; a directed edge with
/// `forward == false` traverses it reversed.
#[derive(Clone, Debug)]
pub struct EdgeInfo {
    pub shape: LineString,
    pub access: Access,
}

/// Read-only access to the road graph.
///
/// The matching engine never mutates the graph; implementations may
/// perform I/O and keep internal caches, which [`clear`](GraphReader::clear)
/// and [`over_committed`](GraphReader::over_committed) manage.
pub trait GraphReader {
    fn directed_edge(&self, edge: EdgeId) -> Option<DirectedEdge>;

    fn edge_info(&self, offset: EdgeInfoOffset) -> Option<&EdgeInfo>;

    /// The edge covering the same road in the opposite direction, if the
    /// road is traversable both ways.
    fn opposing_edge(&self, edge: EdgeId) -> Option<EdgeId>;

    fn start_node(&self, edge: EdgeId) -> Option<NodeId>;

    fn end_node(&self, edge: EdgeId) -> Option<NodeId>;

    /// All edges leaving `node`, in a stable order.
    fn outgoing_edges(&self, node: NodeId) -> Vec<EdgeId>;

    fn node_position(&self, node: NodeId) -> Option<Point>;

    /// Whether the reader's internal caches have outgrown their budget.
    fn over_committed(&self) -> bool {
        false
    }

    /// Drop internal caches. A no-op for readers that keep none.
    fn clear(&self) {}
}

/// Shape of a directed edge, oriented in its direction of travel.
pub fn edge_shape<R: GraphReader + ?Sized>(reader: &R, edge: EdgeId) -> Option<LineString> {
    let directed = reader.directed_edge(edge)?;
    let info = reader.edge_info(directed.info)?;

    if directed.forward {
        Some(info.shape.clone())
    } else {
        let mut coords = info.shape.0.clone();
        coords.reverse();
        Some(LineString::new(coords))
    }
}

/// Length of an edge in metres, accumulated along its shape.
pub fn edge_length<R: GraphReader + ?Sized>(reader: &R, edge: EdgeId) -> Option<f64> {
    let directed = reader.directed_edge(edge)?;
    let info = reader.edge_info(directed.info)?;

    Some(linestring_length(&info.shape))
}

/// Haversine length of a linestring in metres.
pub fn linestring_length(shape: &LineString) -> f64 {
    shape
        .points()
        .zip(shape.points().skip(1))
        .fold(0.0, |length, (a, b)| length + Haversine.distance(a, b))
}

/// Heading, in degrees from north, of a directed edge as it leaves its
/// start node.
pub fn heading_at_start<R: GraphReader + ?Sized>(reader: &R, edge: EdgeId) -> Option<f64> {
    let shape = edge_shape(reader, edge)?;
    let mut points = shape.points();

    let first = points.next()?;
    let second = points.next()?;
    Some(Haversine.bearing(first, second))
}

/// Heading, in degrees from north, of a directed edge as it arrives at
/// its end node.
pub fn heading_at_end<R: GraphReader + ?Sized>(reader: &R, edge: EdgeId) -> Option<f64> {
    let shape = edge_shape(reader, edge)?;
    let len = shape.0.len();
    if len < 2 {
        return None;
    }

    let last = Point::from(shape.0[len - 1]);
    let before = Point::from(shape.0[len - 2]);
    Some(Haversine.bearing(before, last))
}

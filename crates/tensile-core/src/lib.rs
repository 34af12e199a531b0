//! Core types shared across the tensile workspace: node identity, 2D geometry,
//! and the graph abstraction the layout engine consumes.

use petgraph::graphmap::{DiGraphMap, GraphMap, UnGraphMap};
use petgraph::EdgeType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

// =============================================================================
// Node Identity
// =============================================================================

/// Bounds every node type used by the layout engine must satisfy.
///
/// `Ord` keeps every iteration over nodes deterministic, so seeded runs
/// reproduce exactly.
pub trait NodeKey: Copy + Ord + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T> NodeKey for T where T: Copy + Ord + Hash + fmt::Debug + Send + Sync + 'static {}

/// Identifier for nodes loaded from a [`GraphDocument`].
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// =============================================================================
// Geometry
// =============================================================================

/// A 2D vector used for positions, velocities and forces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

/// Node position, in world units.
pub type Position = Vec2;

/// Node velocity, in model units (world units divided by the distance scale).
pub type Velocity = Vec2;

/// Node → position map returned by every layout.
pub type Positions<N> = BTreeMap<N, Position>;

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing at `angle` radians.
    pub fn from_angle(angle: f64) -> Self {
        Self::new(angle.cos(), angle.sin())
    }

    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn length_squared(self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    pub fn distance(self, other: Vec2) -> f64 {
        (self - other).length()
    }

    /// Direction angle in radians, `atan2(y, x)`.
    pub fn angle(self) -> f64 {
        self.y.atan2(self.x)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Rescale to at most `max` length, keeping the direction.
    pub fn clamp_length(self, max: f64) -> Self {
        let len = self.length();
        if len > max && len > 0.0 {
            self * (max / len)
        } else {
            self
        }
    }

    /// Mean of a set of points, `None` when empty.
    pub fn centroid<I: IntoIterator<Item = Vec2>>(points: I) -> Option<Vec2> {
        let mut sum = Vec2::ZERO;
        let mut count = 0usize;
        for p in points {
            sum += p;
            count += 1;
        }
        (count > 0).then(|| sum / count as f64)
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f64> for Vec2 {
    type Output = Vec2;
    fn div(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x / rhs, self.y / rhs)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;
    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Vec2) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

/// Axis-aligned bounding box over a set of positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl Bounds {
    /// Bounding box of `points`, `None` when empty.
    pub fn of<I: IntoIterator<Item = Vec2>>(points: I) -> Option<Bounds> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bounds = Bounds {
            min: first,
            max: first,
        };
        for p in iter {
            bounds.include(p);
        }
        Some(bounds)
    }

    pub fn include(&mut self, p: Vec2) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
    }
}

// =============================================================================
// Graph Abstraction
// =============================================================================

/// The adjacency view the layout engine needs from a graph.
///
/// Implementations must report stable node identities for the duration of a
/// layout run. `adjacent` never includes the node itself.
pub trait Topology<N: NodeKey> {
    /// All nodes, in a stable order.
    fn node_ids(&self) -> Vec<N>;

    /// Nodes adjacent to `node`; outgoing neighbours for directed graphs.
    fn adjacent(&self, node: N) -> Vec<N>;

    fn is_directed(&self) -> bool;

    fn has_node(&self, node: N) -> bool;

    /// Number of nodes.
    fn order(&self) -> usize {
        self.node_ids().len()
    }
}

impl<N: NodeKey, E, Ty: EdgeType> Topology<N> for GraphMap<N, E, Ty> {
    fn node_ids(&self) -> Vec<N> {
        self.nodes().collect()
    }

    fn adjacent(&self, node: N) -> Vec<N> {
        let mut out: Vec<N> = self.neighbors(node).filter(|&n| n != node).collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    fn is_directed(&self) -> bool {
        Ty::is_directed()
    }

    fn has_node(&self, node: N) -> bool {
        self.contains_node(node)
    }

    fn order(&self) -> usize {
        self.node_count()
    }
}

/// Copy any topology into an undirected graph map.
///
/// Directed edges become undirected edges; the source graph is untouched.
pub fn undirected_copy<N, G>(graph: &G) -> UnGraphMap<N, ()>
where
    N: NodeKey,
    G: Topology<N> + ?Sized,
{
    let nodes = graph.node_ids();
    let mut out = UnGraphMap::with_capacity(nodes.len(), nodes.len());
    for &n in &nodes {
        out.add_node(n);
    }
    for &n in &nodes {
        for m in graph.adjacent(n) {
            out.add_edge(n, m, ());
        }
    }
    out
}

/// Graph container used by the CLI and tests: either an undirected or a
/// directed petgraph map.
#[derive(Debug, Clone)]
pub enum LayoutGraph<N: NodeKey> {
    Undirected(UnGraphMap<N, ()>),
    Directed(DiGraphMap<N, ()>),
}

impl<N: NodeKey> LayoutGraph<N> {
    pub fn undirected() -> Self {
        LayoutGraph::Undirected(UnGraphMap::new())
    }

    pub fn directed() -> Self {
        LayoutGraph::Directed(DiGraphMap::new())
    }

    /// Build from an edge list; endpoints are added as nodes.
    pub fn from_edges<I: IntoIterator<Item = (N, N)>>(directed: bool, edges: I) -> Self {
        let mut graph = if directed {
            Self::directed()
        } else {
            Self::undirected()
        };
        for (a, b) in edges {
            graph.add_edge(a, b);
        }
        graph
    }

    pub fn add_node(&mut self, node: N) {
        match self {
            LayoutGraph::Undirected(g) => {
                g.add_node(node);
            }
            LayoutGraph::Directed(g) => {
                g.add_node(node);
            }
        }
    }

    pub fn add_edge(&mut self, a: N, b: N) {
        match self {
            LayoutGraph::Undirected(g) => {
                g.add_edge(a, b, ());
            }
            LayoutGraph::Directed(g) => {
                g.add_edge(a, b, ());
            }
        }
    }

    pub fn remove_node(&mut self, node: N) -> bool {
        match self {
            LayoutGraph::Undirected(g) => g.remove_node(node),
            LayoutGraph::Directed(g) => g.remove_node(node),
        }
    }

    pub fn edge_count(&self) -> usize {
        match self {
            LayoutGraph::Undirected(g) => g.edge_count(),
            LayoutGraph::Directed(g) => g.edge_count(),
        }
    }
}

impl<N: NodeKey> Topology<N> for LayoutGraph<N> {
    fn node_ids(&self) -> Vec<N> {
        match self {
            LayoutGraph::Undirected(g) => g.node_ids(),
            LayoutGraph::Directed(g) => g.node_ids(),
        }
    }

    fn adjacent(&self, node: N) -> Vec<N> {
        match self {
            LayoutGraph::Undirected(g) => g.adjacent(node),
            LayoutGraph::Directed(g) => g.adjacent(node),
        }
    }

    fn is_directed(&self) -> bool {
        matches!(self, LayoutGraph::Directed(_))
    }

    fn has_node(&self, node: N) -> bool {
        match self {
            LayoutGraph::Undirected(g) => g.contains_node(node),
            LayoutGraph::Directed(g) => g.contains_node(node),
        }
    }

    fn order(&self) -> usize {
        match self {
            LayoutGraph::Undirected(g) => g.node_count(),
            LayoutGraph::Directed(g) => g.node_count(),
        }
    }
}

// =============================================================================
// Graph Document
// =============================================================================

/// Serializable edge-list description of a graph.
///
/// ```json
/// { "directed": false, "nodes": [7], "edges": [[1, 2], [2, 3]] }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    /// Whether edges are directed. Layout treats both kinds as undirected.
    #[serde(default)]
    pub directed: bool,
    /// Extra nodes, typically isolates; edge endpoints are added implicitly.
    #[serde(default)]
    pub nodes: Vec<u64>,
    /// Edges as `[from, to]` pairs.
    #[serde(default)]
    pub edges: Vec<(u64, u64)>,
}

impl GraphDocument {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Materialize the document as a [`LayoutGraph`].
    pub fn to_graph(&self) -> LayoutGraph<NodeId> {
        let mut graph = LayoutGraph::from_edges(
            self.directed,
            self.edges.iter().map(|&(a, b)| (NodeId(a), NodeId(b))),
        );
        for &n in &self.nodes {
            graph.add_node(NodeId(n));
        }
        graph
    }
}

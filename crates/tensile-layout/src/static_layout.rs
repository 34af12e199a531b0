//! Blocking run to convergence.
//!
//! The static runner strips isolates and leaves from the graph, relaxes what
//! remains from a circular start with the iterative engine on a quadratic
//! cooling schedule, then places the stripped nodes back with cheap
//! heuristics: leaves fan out around their anchor, leaf pairs and isolates
//! are packed into grids beside the relaxed drawing.

use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::{FRAC_PI_2, TAU};

use petgraph::graphmap::UnGraphMap;
use tensile_core::{undirected_copy, Bounds, NodeKey, Position, Positions, Topology, Vec2};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::LayoutError;
use crate::iterative::IterativeLayout;
use crate::params::StaticLayoutParameters;
use crate::state::LayoutState;
use crate::Result;

/// Nodes bucketed by undirected degree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DegreeClasses<N> {
    /// Degree 0.
    pub isolates: Vec<N>,
    /// Degree 1.
    pub leaves: Vec<N>,
    /// Degree 2.
    pub connectors: Vec<N>,
    /// Degree 3 and above.
    pub core: Vec<N>,
}

impl<N: NodeKey> DegreeClasses<N> {
    /// Classify every node of `graph`, each class in ascending node order.
    pub fn classify<G: Topology<N> + ?Sized>(graph: &G) -> Self {
        let mut classes = Self {
            isolates: Vec::new(),
            leaves: Vec::new(),
            connectors: Vec::new(),
            core: Vec::new(),
        };
        let mut nodes = graph.node_ids();
        nodes.sort_unstable();
        for node in nodes {
            match graph.adjacent(node).len() {
                0 => classes.isolates.push(node),
                1 => classes.leaves.push(node),
                2 => classes.connectors.push(node),
                _ => classes.core.push(node),
            }
        }
        classes
    }

    /// Connector and core nodes: the members of the reduced graph.
    pub fn reduced_nodes(&self) -> BTreeSet<N> {
        self.connectors.iter().chain(&self.core).copied().collect()
    }
}

/// Subgraph induced by the connector and core nodes.
pub fn reduce_graph<N, G>(graph: &G, classes: &DegreeClasses<N>) -> UnGraphMap<N, ()>
where
    N: NodeKey,
    G: Topology<N> + ?Sized,
{
    let keep = classes.reduced_nodes();
    let mut reduced = UnGraphMap::with_capacity(keep.len(), keep.len());
    for &node in &keep {
        reduced.add_node(node);
    }
    for &node in &keep {
        for other in graph.adjacent(node) {
            if keep.contains(&other) {
                reduced.add_edge(node, other, ());
            }
        }
    }
    reduced
}

/// `nodes` evenly spaced on a circle of `radius` around the origin, in the
/// given order starting on the positive x axis.
pub fn circle_positions<N: NodeKey>(nodes: &[N], radius: f64) -> Positions<N> {
    let count = nodes.len().max(1) as f64;
    nodes
        .iter()
        .enumerate()
        .map(|(i, &node)| (node, Vec2::from_angle(TAU * i as f64 / count) * radius))
        .collect()
}

/// Outcome of a static layout run.
#[derive(Debug, Clone)]
pub struct StaticLayoutReport<N> {
    /// Final position of every graph node.
    pub positions: Positions<N>,
    /// Iterations run on the reduced graph.
    pub steps: usize,
    /// Energy of the last iteration.
    pub final_energy: f64,
    /// Whether the last energy change was within the threshold.
    pub converged: bool,
    pub reduced_node_count: usize,
    pub reduced_edge_count: usize,
}

/// Blocking layout runner.
#[derive(Debug, Clone)]
pub struct StaticLayout<N: NodeKey> {
    pinned: BTreeSet<N>,
}

impl<N: NodeKey> Default for StaticLayout<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: NodeKey> StaticLayout<N> {
    pub fn new() -> Self {
        Self {
            pinned: BTreeSet::new(),
        }
    }

    /// Runner whose `pinned` reduced-graph nodes keep their seed or hint
    /// position for the whole run.
    pub fn with_pinned<I: IntoIterator<Item = N>>(pinned: I) -> Self {
        Self {
            pinned: pinned.into_iter().collect(),
        }
    }

    pub fn pinned(&self) -> &BTreeSet<N> {
        &self.pinned
    }

    /// Lay out `graph`, blocking until convergence or `max_steps`.
    ///
    /// `hints` override the circular start for reduced-graph nodes.
    pub fn layout<G>(
        &self,
        graph: &G,
        hints: &Positions<N>,
        params: &StaticLayoutParameters,
    ) -> Result<StaticLayoutReport<N>>
    where
        G: Topology<N> + ?Sized,
    {
        self.layout_with_cancel(graph, hints, params, &CancellationToken::new())
    }

    /// Like [`layout`](Self::layout), checking `cancel` after every step.
    ///
    /// A cancelled run returns [`LayoutError::Canceled`], never a partial map.
    pub fn layout_with_cancel<G>(
        &self,
        graph: &G,
        hints: &Positions<N>,
        params: &StaticLayoutParameters,
        cancel: &CancellationToken,
    ) -> Result<StaticLayoutReport<N>>
    where
        G: Topology<N> + ?Sized,
    {
        params.validate()?;
        if cancel.is_cancelled() {
            return Err(LayoutError::Canceled { steps: 0 });
        }

        let graph = undirected_copy(graph);
        let classes = DegreeClasses::classify(&graph);
        let reduced = reduce_graph(&graph, &classes);

        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            reduced_nodes = reduced.node_count(),
            reduced_edges = reduced.edge_count(),
            leaves = classes.leaves.len(),
            isolates = classes.isolates.len(),
            "static layout started"
        );

        let relaxed = self.relax(&reduced, hints, params, cancel)?;
        let mut positions = relaxed.positions;
        place_leaves(&graph, &classes, &mut positions, params)?;
        place_isolates(&classes.isolates, &mut positions, params.isolate_spacing());

        if positions.len() != graph.node_count() {
            return Err(LayoutError::InconsistentState {
                message: format!(
                    "placed {} of {} nodes",
                    positions.len(),
                    graph.node_count()
                ),
            });
        }

        info!(
            steps = relaxed.steps,
            energy = relaxed.energy,
            converged = relaxed.converged,
            "static layout finished"
        );

        Ok(StaticLayoutReport {
            positions,
            steps: relaxed.steps,
            final_energy: relaxed.energy,
            converged: relaxed.converged,
            reduced_node_count: reduced.node_count(),
            reduced_edge_count: reduced.edge_count(),
        })
    }

    fn relax(
        &self,
        reduced: &UnGraphMap<N, ()>,
        hints: &Positions<N>,
        params: &StaticLayoutParameters,
        cancel: &CancellationToken,
    ) -> Result<Relaxed<N>> {
        if reduced.node_count() == 0 {
            return Ok(Relaxed {
                positions: Positions::new(),
                steps: 0,
                energy: 0.0,
                converged: true,
            });
        }

        let (state, mut engine) = match params.layout.seed {
            Some(seed) => (
                LayoutState::with_seed(seed),
                IterativeLayout::with_seed(seed.wrapping_add(1)),
            ),
            None => (LayoutState::new(), IterativeLayout::new()),
        };

        let mut nodes: Vec<N> = reduced.nodes().collect();
        nodes.sort_unstable();
        let mut start = circle_positions(&nodes, params.circle_radius);
        for (node, pos) in hints {
            let Some(slot) = start.get_mut(node) else {
                continue;
            };
            if pos.is_finite() {
                *slot = *pos;
            } else {
                warn!(?node, "ignoring non-finite position hint");
            }
        }
        state.request_positions(start, true);
        state.set_pinned(self.pinned.iter().copied().filter(|n| reduced.contains_node(*n)));

        let threshold = params.energy_change_threshold;
        let mut step = 0;
        let mut energy = 0.0;
        let mut change = f64::INFINITY;
        while step < params.min_steps || (step < params.max_steps && change.abs() > threshold) {
            let damping = params.cooling_at(step);
            let next = engine.iterate_with_damping(reduced, &state, &params.layout, damping)?;
            change = next - energy;
            energy = next;
            step += 1;
            if cancel.is_cancelled() {
                info!(steps = step, "static layout canceled");
                return Err(LayoutError::Canceled { steps: step });
            }
        }

        Ok(Relaxed {
            positions: state.positions_copy(),
            steps: step,
            energy,
            converged: change.abs() <= threshold,
        })
    }
}

struct Relaxed<N> {
    positions: Positions<N>,
    steps: usize,
    energy: f64,
    converged: bool,
}

/// Fan single leaves around their anchors and pack leaf pairs below the
/// drawing.
fn place_leaves<N: NodeKey>(
    graph: &UnGraphMap<N, ()>,
    classes: &DegreeClasses<N>,
    positions: &mut Positions<N>,
    params: &StaticLayoutParameters,
) -> Result<()> {
    let leaf_set: BTreeSet<N> = classes.leaves.iter().copied().collect();
    let mut fans: BTreeMap<N, Vec<N>> = BTreeMap::new();
    let mut pairs: Vec<(N, N)> = Vec::new();

    for &leaf in &classes.leaves {
        let Some(anchor) = graph.neighbors(leaf).find(|&n| n != leaf) else {
            continue;
        };
        if leaf_set.contains(&anchor) {
            if leaf < anchor {
                pairs.push((leaf, anchor));
            }
        } else {
            fans.entry(anchor).or_default().push(leaf);
        }
    }

    let relaxed = positions.clone();
    let distance = params.leaf_distance();
    for (anchor, leaves) in &fans {
        let anchor_pos = relaxed
            .get(anchor)
            .copied()
            .ok_or_else(|| LayoutError::MissingPosition {
                node: format!("{anchor:?}"),
            })?;
        let located = graph.neighbors(*anchor).filter_map(|n| relaxed.get(&n).copied());
        for (leaf, pos) in fan_out(anchor_pos, Vec2::centroid(located), leaves, distance) {
            positions.insert(leaf, pos);
        }
    }

    if !pairs.is_empty() {
        let spacing = params.isolate_spacing();
        let columns = grid_columns(pairs.len());
        let bounds = Bounds::of(positions.values().copied());
        let (x0, y0) = match bounds {
            Some(b) => (b.min.x, b.min.y - spacing),
            None => (-(columns as f64 * 3.0 - 2.0) * spacing / 2.0, 0.0),
        };
        for (i, (a, b)) in pairs.iter().enumerate() {
            let column = (i % columns) as f64;
            let row = (i / columns) as f64;
            let left = Vec2::new(x0 + column * 3.0 * spacing, y0 - row * spacing);
            positions.insert(*a, left);
            positions.insert(*b, left + Vec2::new(spacing, 0.0));
        }
        debug!(pairs = pairs.len(), "packed leaf pairs");
    }

    debug!(anchors = fans.len(), "fanned leaves");
    Ok(())
}

/// Positions for `leaves` around `anchor`.
///
/// With positioned neighbours the leaves share a quarter-circle arc facing
/// away from their centroid; otherwise they spread over the full circle. The
/// radius grows when needed to keep neighbouring leaves at least half of
/// `distance` apart.
fn fan_out<N: NodeKey>(
    anchor: Position,
    neighbour_centroid: Option<Position>,
    leaves: &[N],
    distance: f64,
) -> Vec<(N, Position)> {
    let away = neighbour_centroid
        .map(|c| anchor - c)
        .filter(|d| d.length() > 0.0);
    let (heading, arc) = match away {
        Some(d) => (d.angle(), FRAC_PI_2),
        None => (0.0, TAU),
    };

    let count = leaves.len();
    if count < 2 {
        let pos = anchor + Vec2::from_angle(heading) * distance;
        return leaves.iter().map(|&leaf| (leaf, pos)).collect();
    }
    let gap = if away.is_some() {
        arc / (count - 1) as f64
    } else {
        arc / count as f64
    };
    let first = if away.is_some() {
        heading - arc / 2.0
    } else {
        heading
    };
    // Chord between neighbouring leaves is 2 r sin(gap / 2).
    let radius = distance.max(distance / (4.0 * (gap / 2.0).sin()));

    leaves
        .iter()
        .enumerate()
        .map(|(i, &leaf)| {
            let angle = first + gap * i as f64;
            (leaf, anchor + Vec2::from_angle(angle) * radius)
        })
        .collect()
}

/// Row-filling square grid to the right of everything placed so far, or
/// centred on the origin when nothing is placed.
fn place_isolates<N: NodeKey>(isolates: &[N], positions: &mut Positions<N>, spacing: f64) {
    if isolates.is_empty() {
        return;
    }
    let columns = grid_columns(isolates.len());
    let rows = isolates.len().div_ceil(columns);
    let (x0, y0) = match Bounds::of(positions.values().copied()) {
        Some(b) => (b.max.x + spacing, b.max.y),
        None => (
            -((columns - 1) as f64) * spacing / 2.0,
            (rows - 1) as f64 * spacing / 2.0,
        ),
    };
    for (i, &node) in isolates.iter().enumerate() {
        let column = (i % columns) as f64;
        let row = (i / columns) as f64;
        positions.insert(node, Vec2::new(x0 + column * spacing, y0 - row * spacing));
    }
    debug!(isolates = isolates.len(), columns, "packed isolates");
}

fn grid_columns(count: usize) -> usize {
    ((count as f64).sqrt().ceil() as usize).max(1)
}

//! Named layout algorithms and the registry that selects them.
//!
//! Every algorithm honours the same contract: take a graph, optional position
//! hints and static parameters, and return a position for every graph node.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tensile_core::{NodeKey, Position, Positions, Topology, Vec2};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::LayoutError;
use crate::forces::seed_position;
use crate::params::StaticLayoutParameters;
use crate::static_layout::{circle_positions, StaticLayout};
use crate::Result;

/// A whole-graph layout strategy.
pub trait LayoutAlgorithm<N: NodeKey>: Send + Sync {
    /// Registry name.
    fn name(&self) -> &str;

    /// Position every node of `graph`.
    fn layout(
        &self,
        graph: &dyn Topology<N>,
        hints: &Positions<N>,
        params: &StaticLayoutParameters,
        cancel: &CancellationToken,
    ) -> Result<Positions<N>>;
}

fn sorted_nodes<N: NodeKey>(graph: &dyn Topology<N>) -> Vec<N> {
    let mut nodes = graph.node_ids();
    nodes.sort_unstable();
    nodes
}

fn rng_for(params: &StaticLayoutParameters) -> StdRng {
    match params.layout.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

fn prepare(params: &StaticLayoutParameters, cancel: &CancellationToken) -> Result<()> {
    params.validate()?;
    if cancel.is_cancelled() {
        Err(LayoutError::Canceled { steps: 0 })
    } else {
        Ok(())
    }
}

/// Every node evenly spaced on a circle of `circle_radius`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CircleLayout;

impl<N: NodeKey> LayoutAlgorithm<N> for CircleLayout {
    fn name(&self) -> &str {
        "circle"
    }

    fn layout(
        &self,
        graph: &dyn Topology<N>,
        _hints: &Positions<N>,
        params: &StaticLayoutParameters,
        cancel: &CancellationToken,
    ) -> Result<Positions<N>> {
        prepare(params, cancel)?;
        Ok(circle_positions(&sorted_nodes(graph), params.circle_radius))
    }
}

/// Uniform random positions in the square `[-circle_radius, circle_radius]²`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomBoxLayout;

impl<N: NodeKey> LayoutAlgorithm<N> for RandomBoxLayout {
    fn name(&self) -> &str {
        "random-box"
    }

    fn layout(
        &self,
        graph: &dyn Topology<N>,
        _hints: &Positions<N>,
        params: &StaticLayoutParameters,
        cancel: &CancellationToken,
    ) -> Result<Positions<N>> {
        prepare(params, cancel)?;
        let half = params.circle_radius;
        let mut rng = rng_for(params);
        Ok(sorted_nodes(graph)
            .into_iter()
            .map(|node| {
                let x = rng.random_range(-half..=half);
                let y = rng.random_range(-half..=half);
                (node, Vec2::new(x, y))
            })
            .collect())
    }
}

/// The force-directed static runner.
#[derive(Debug, Clone)]
pub struct SpringLayout<N: NodeKey> {
    runner: StaticLayout<N>,
}

impl<N: NodeKey> Default for SpringLayout<N> {
    fn default() -> Self {
        Self {
            runner: StaticLayout::new(),
        }
    }
}

impl<N: NodeKey> SpringLayout<N> {
    /// Spring layout whose `pinned` nodes keep their hint position.
    pub fn with_pinned<I: IntoIterator<Item = N>>(pinned: I) -> Self {
        Self {
            runner: StaticLayout::with_pinned(pinned),
        }
    }
}

impl<N: NodeKey> LayoutAlgorithm<N> for SpringLayout<N> {
    fn name(&self) -> &str {
        "spring"
    }

    fn layout(
        &self,
        graph: &dyn Topology<N>,
        hints: &Positions<N>,
        params: &StaticLayoutParameters,
        cancel: &CancellationToken,
    ) -> Result<Positions<N>> {
        self.runner
            .layout_with_cancel(graph, hints, params, cancel)
            .map(|report| report.positions)
    }
}

/// Keeps every hinted position and seeds the remaining nodes next to their
/// already positioned neighbours, in node order.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionalAddingLayout;

impl<N: NodeKey> LayoutAlgorithm<N> for PositionalAddingLayout {
    fn name(&self) -> &str {
        "positional-adding"
    }

    fn layout(
        &self,
        graph: &dyn Topology<N>,
        hints: &Positions<N>,
        params: &StaticLayoutParameters,
        cancel: &CancellationToken,
    ) -> Result<Positions<N>> {
        prepare(params, cancel)?;
        let nodes = sorted_nodes(graph);
        let mut rng = rng_for(params);
        let mut positions: Positions<N> = nodes
            .iter()
            .filter_map(|n| hints.get(n).map(|p| (*n, *p)))
            .collect();
        let hinted = positions.len();

        for node in nodes {
            if positions.contains_key(&node) {
                continue;
            }
            let located: Vec<Position> = graph
                .adjacent(node)
                .iter()
                .filter_map(|n| positions.get(n).copied())
                .collect();
            let pos = seed_position(&located, &params.layout, &mut rng);
            positions.insert(node, pos);
        }

        debug!(hinted, added = positions.len() - hinted, "positional adding");
        Ok(positions)
    }
}

/// Runs another algorithm, then restores the hint position of every fixed
/// node.
pub struct FixableLayout<N: NodeKey> {
    name: String,
    inner: Arc<dyn LayoutAlgorithm<N>>,
    fixed: BTreeSet<N>,
}

impl<N: NodeKey> FixableLayout<N> {
    pub fn new<I: IntoIterator<Item = N>>(inner: Arc<dyn LayoutAlgorithm<N>>, fixed: I) -> Self {
        Self {
            name: format!("fixable-{}", inner.name()),
            inner,
            fixed: fixed.into_iter().collect(),
        }
    }

    pub fn fixed(&self) -> &BTreeSet<N> {
        &self.fixed
    }
}

impl<N: NodeKey> LayoutAlgorithm<N> for FixableLayout<N> {
    fn name(&self) -> &str {
        &self.name
    }

    fn layout(
        &self,
        graph: &dyn Topology<N>,
        hints: &Positions<N>,
        params: &StaticLayoutParameters,
        cancel: &CancellationToken,
    ) -> Result<Positions<N>> {
        let mut positions = self.inner.layout(graph, hints, params, cancel)?;
        for node in &self.fixed {
            if !graph.has_node(*node) {
                continue;
            }
            if let Some(pos) = hints.get(node) {
                positions.insert(*node, *pos);
            }
        }
        Ok(positions)
    }
}

impl<N: NodeKey> fmt::Debug for FixableLayout<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixableLayout")
            .field("inner", &self.inner.name())
            .field("fixed", &self.fixed)
            .finish()
    }
}

/// Name → algorithm map, built explicitly by the application.
pub struct LayoutRegistry<N: NodeKey> {
    algorithms: HashMap<String, Arc<dyn LayoutAlgorithm<N>>>,
}

impl<N: NodeKey> Default for LayoutRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: NodeKey> LayoutRegistry<N> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            algorithms: HashMap::new(),
        }
    }

    /// Registry with circle, random-box, spring and positional-adding.
    pub fn builtin() -> Self {
        Self::new()
            .with_algorithm(Arc::new(CircleLayout))
            .with_algorithm(Arc::new(RandomBoxLayout))
            .with_algorithm(Arc::new(SpringLayout::default()))
            .with_algorithm(Arc::new(PositionalAddingLayout))
    }

    /// Register an algorithm under its own name, replacing any previous one.
    pub fn register(&mut self, algorithm: Arc<dyn LayoutAlgorithm<N>>) {
        self.algorithms
            .insert(algorithm.name().to_string(), algorithm);
    }

    /// Register an algorithm (builder pattern).
    pub fn with_algorithm(mut self, algorithm: Arc<dyn LayoutAlgorithm<N>>) -> Self {
        self.register(algorithm);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn LayoutAlgorithm<N>>> {
        self.algorithms.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.algorithms.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.algorithms.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run the algorithm registered as `name`.
    pub fn layout(
        &self,
        name: &str,
        graph: &dyn Topology<N>,
        hints: &Positions<N>,
        params: &StaticLayoutParameters,
        cancel: &CancellationToken,
    ) -> Result<Positions<N>> {
        let algorithm = self
            .get(name)
            .ok_or_else(|| LayoutError::UnknownAlgorithm {
                name: name.to_string(),
            })?;
        algorithm.layout(graph, hints, params, cancel)
    }

    pub fn len(&self) -> usize {
        self.algorithms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.algorithms.is_empty()
    }
}

impl<N: NodeKey> fmt::Debug for LayoutRegistry<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutRegistry")
            .field("algorithm_count", &self.algorithms.len())
            .field("algorithms", &self.names())
            .finish()
    }
}

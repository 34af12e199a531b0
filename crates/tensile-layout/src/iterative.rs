//! One-step force-directed iteration.
//!
//! [`IterativeLayout::iterate`] advances a [`LayoutState`] by a single step:
//! sync pending overrides, rebuild the region grid, accumulate forces for
//! every unpinned node, integrate and commit. The engine is `Send` and is
//! meant to be driven from one background worker at a time.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tensile_core::{undirected_copy, NodeKey, Position, Positions, Topology, Vec2};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::LayoutError;
use crate::forces::{
    check_finite, displacement, energy, global_force, integrate_velocity, repulsive_force,
    spring_force,
};
use crate::params::LayoutParameters;
use crate::state::LayoutState;
use crate::Result;

/// Iteration driver: owns the step counter, the tie-breaking RNG and an
/// optional cancellation token.
#[derive(Debug)]
pub struct IterativeLayout {
    iteration: u64,
    rng: StdRng,
    cancel: Option<CancellationToken>,
}

impl IterativeLayout {
    /// Engine with OS-seeded randomness.
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    /// Engine seeded from `params.seed` when set.
    pub fn from_params(params: &LayoutParameters) -> Self {
        match params.seed {
            Some(seed) => Self::with_seed(seed),
            None => Self::new(),
        }
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            iteration: 0,
            rng,
            cancel: None,
        }
    }

    /// Abort with [`LayoutError::Canceled`] once `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn set_cancellation(&mut self, token: Option<CancellationToken>) {
        self.cancel = token;
    }

    /// Steps completed so far; drives the cooling curve.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Restart the cooling curve.
    pub fn reset(&mut self) {
        self.iteration = 0;
    }

    /// Advance one step using the logarithmic cooling curve and return the
    /// step's energy.
    pub fn iterate<N, G>(
        &mut self,
        graph: &G,
        state: &LayoutState<N>,
        params: &LayoutParameters,
    ) -> Result<f64>
    where
        N: NodeKey,
        G: Topology<N> + ?Sized,
    {
        let damping = params.damping_at(self.iteration);
        self.iterate_with_damping(graph, state, params, damping)
    }

    /// Advance one step with an explicit damping coefficient.
    pub fn iterate_with_damping<N, G>(
        &mut self,
        graph: &G,
        state: &LayoutState<N>,
        params: &LayoutParameters,
        damping: f64,
    ) -> Result<f64>
    where
        N: NodeKey,
        G: Topology<N> + ?Sized,
    {
        if graph.is_directed() {
            let undirected = undirected_copy(graph);
            self.step(&undirected, state, params, damping)
        } else {
            self.step(graph, state, params, damping)
        }
    }

    fn step<N, G>(
        &mut self,
        graph: &G,
        state: &LayoutState<N>,
        params: &LayoutParameters,
        damping: f64,
    ) -> Result<f64>
    where
        N: NodeKey,
        G: Topology<N> + ?Sized,
    {
        state.node_location_sync(graph, params);
        let grid = state.rebuild_regions(params.region_size_world());
        let snapshot = state.snapshot();

        let mut nodes = graph.node_ids();
        nodes.sort_unstable();

        let mut updates = Vec::with_capacity(nodes.len());
        let mut total_energy = 0.0;

        for node in nodes {
            if snapshot.pinned.contains(&node) {
                continue;
            }
            let pos = position_of(&snapshot.positions, node)?;
            let neighbours = graph.adjacent(node);

            let mut force = Vec2::ZERO;
            add_finite(&mut force, global_force(pos, params), node, "global");
            for &other in &neighbours {
                let other_pos = position_of(&snapshot.positions, other)?;
                add_finite(
                    &mut force,
                    spring_force(node, pos, other, other_pos, params),
                    node,
                    "spring",
                );
            }
            for (other, other_pos) in grid.nearby(node) {
                if other != node {
                    add_finite(
                        &mut force,
                        repulsive_force(pos, other_pos, params, &mut self.rng),
                        node,
                        "repulsion",
                    );
                }
            }

            if !check_finite(force) {
                error!(
                    ?node,
                    fx = force.x,
                    fy = force.y,
                    "non-finite force, dropping it for this step"
                );
                force = Vec2::ZERO;
            }

            let velocity = snapshot
                .velocities
                .get(&node)
                .copied()
                .unwrap_or(Vec2::ZERO);
            let cap = params.max_force_for(neighbours.len());
            let velocity = integrate_velocity(velocity, force, cap, damping, params);
            total_energy += energy(velocity);
            updates.push((node, pos + displacement(velocity, params), velocity));
        }

        let moved = updates.len();
        state.commit(updates);
        self.iteration += 1;

        debug!(
            iteration = self.iteration,
            moved,
            regions = grid.region_count(),
            damping,
            energy = total_energy,
            "layout step"
        );

        if let Some(token) = &self.cancel {
            if token.is_cancelled() {
                return Err(LayoutError::Canceled {
                    steps: self.iteration as usize,
                });
            }
        }
        Ok(total_energy)
    }
}

impl Default for IterativeLayout {
    fn default() -> Self {
        Self::new()
    }
}

/// Add `term` to `force` unless it has a NaN or infinite component; such a
/// term is logged and skipped so the node's other forces still apply.
fn add_finite<N: NodeKey>(force: &mut Vec2, term: Vec2, node: N, kind: &'static str) {
    if check_finite(term) {
        *force += term;
    } else {
        error!(
            ?node,
            kind,
            fx = term.x,
            fy = term.y,
            "non-finite force term, dropping it for this step"
        );
    }
}

fn position_of<N: NodeKey>(positions: &Positions<N>, node: N) -> Result<Position> {
    positions
        .get(&node)
        .copied()
        .ok_or_else(|| LayoutError::MissingPosition {
            node: format!("{node:?}"),
        })
}

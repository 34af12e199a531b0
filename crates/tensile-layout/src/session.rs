//! A long-lived iterative layout over a shared graph.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};

use tensile_core::{NodeKey, Position, Positions, Topology};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::iterative::IterativeLayout;
use crate::params::LayoutParameters;
use crate::state::LayoutState;
use crate::Result;

/// Graph, state, engine and parameters for one interactive layout.
///
/// Any thread may read positions or request overrides while one worker calls
/// [`run_one_step`](Self::run_one_step); iteration calls are serialized on the
/// engine lock.
pub struct LayoutSession<N: NodeKey, G> {
    graph: Arc<RwLock<G>>,
    state: Arc<LayoutState<N>>,
    engine: Mutex<IterativeLayout>,
    params: RwLock<LayoutParameters>,
    _node: PhantomData<fn() -> N>,
}

impl<N, G> LayoutSession<N, G>
where
    N: NodeKey,
    G: Topology<N> + Send + Sync,
{
    /// Session over `graph`, seeded from `params.seed` when set.
    pub fn new(graph: G, params: LayoutParameters) -> Result<Self> {
        Self::with_shared_graph(Arc::new(RwLock::new(graph)), params)
    }

    /// Session over a graph the caller keeps editing through its own handle.
    pub fn with_shared_graph(graph: Arc<RwLock<G>>, params: LayoutParameters) -> Result<Self> {
        params.validate()?;
        let state = match params.seed {
            Some(seed) => LayoutState::with_seed(seed),
            None => LayoutState::new(),
        };
        Ok(Self {
            graph,
            state: Arc::new(state),
            engine: Mutex::new(IterativeLayout::from_params(&params)),
            params: RwLock::new(params),
            _node: PhantomData,
        })
    }

    /// Abort iteration with a cancellation error once `token` fires.
    pub fn with_cancellation(self, token: CancellationToken) -> Self {
        self.engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_cancellation(Some(token));
        self
    }

    /// Advance the layout by one step and return its energy.
    pub fn run_one_step(&self) -> Result<f64> {
        self.run_one_loop(1)
    }

    /// Advance the layout by `steps` steps and return the energy of the last
    /// one. Zero steps only syncs pending overrides.
    pub fn run_one_loop(&self, steps: usize) -> Result<f64> {
        let params = self.parameters();
        let graph = self.graph.read().unwrap_or_else(PoisonError::into_inner);
        let mut engine = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
        if steps == 0 {
            self.state.node_location_sync(&*graph, &params);
            return Ok(0.0);
        }
        let mut energy = 0.0;
        for _ in 0..steps {
            energy = engine.iterate(&*graph, &self.state, &params)?;
        }
        Ok(energy)
    }

    /// Queue position overrides for the next step.
    pub fn request_positions<I>(&self, positions: I, reset_node_set: bool)
    where
        I: IntoIterator<Item = (N, Position)>,
    {
        self.state.request_positions(positions, reset_node_set);
    }

    pub fn positions_copy(&self) -> Positions<N> {
        self.state.positions_copy()
    }

    /// Replace the parameters used from the next step on.
    pub fn set_parameters(&self, params: LayoutParameters) -> Result<()> {
        params.validate()?;
        info!(?params, "layout parameters updated");
        *self.params.write().unwrap_or_else(PoisonError::into_inner) = params;
        Ok(())
    }

    pub fn parameters(&self) -> LayoutParameters {
        self.params
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Shared handle to the graph; take the write lock to edit it.
    pub fn graph(&self) -> Arc<RwLock<G>> {
        Arc::clone(&self.graph)
    }

    /// Read access to the graph for the duration of the guard.
    pub fn read_graph(&self) -> RwLockReadGuard<'_, G> {
        self.graph.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> Arc<LayoutState<N>> {
        Arc::clone(&self.state)
    }

    /// Steps completed since the session started or was reset.
    pub fn iteration(&self) -> u64 {
        self.engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iteration()
    }

    /// Restart the cooling curve, e.g. after a large graph edit.
    pub fn reheat(&self) {
        self.engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
    }
}

impl<N: NodeKey, G> fmt::Debug for LayoutSession<N, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutSession")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

//! Per-node position and velocity store shared between the layout worker and
//! its callers.
//!
//! Positions, velocities, the pending-override buffer, the pinned set and the
//! latest region grid live behind one mutex, so a sync always sees the
//! overrides and the maps as a single consistent unit. Callers never touch
//! the maps directly; every read returns an owned copy.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tensile_core::{NodeKey, Position, Positions, Topology, Velocity};
use tracing::{debug, warn};

use crate::forces::seed_position;
use crate::params::LayoutParameters;
use crate::region::RegionGrid;

/// Position overrides waiting for the next sync.
#[derive(Debug, Clone)]
pub struct PendingUpdate<N> {
    pub positions: BTreeMap<N, Position>,
    /// Let the tracked node set shrink to the graph plus these keys.
    pub reset_nodes: bool,
}

impl<N> Default for PendingUpdate<N> {
    fn default() -> Self {
        Self {
            positions: BTreeMap::new(),
            reset_nodes: false,
        }
    }
}

impl<N> PendingUpdate<N> {
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() && !self.reset_nodes
    }
}

/// What a sync changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Nodes relocated by a pending override.
    pub overridden: usize,
    /// Graph nodes that received a first position.
    pub seeded: usize,
    /// Tracked nodes dropped by a reset.
    pub removed: usize,
    /// Overrides ignored because a coordinate was NaN or infinite.
    pub rejected: usize,
}

impl SyncReport {
    pub fn changed(&self) -> bool {
        self.overridden + self.seeded + self.removed + self.rejected > 0
    }
}

/// Consistent copy of the mutable state taken at the start of a step.
#[derive(Debug, Clone)]
pub struct StateSnapshot<N> {
    pub positions: Positions<N>,
    pub velocities: BTreeMap<N, Velocity>,
    pub pinned: BTreeSet<N>,
}

struct StateInner<N> {
    positions: Positions<N>,
    velocities: BTreeMap<N, Velocity>,
    pending: PendingUpdate<N>,
    pinned: BTreeSet<N>,
    regions: Arc<RegionGrid<N>>,
    rng: StdRng,
}

/// Thread-safe layout state for one layout session.
pub struct LayoutState<N: NodeKey> {
    inner: Mutex<StateInner<N>>,
}

impl<N: NodeKey> LayoutState<N> {
    /// Empty state; seeding randomness comes from the OS.
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    /// Empty state with reproducible seeding.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            inner: Mutex::new(StateInner {
                positions: BTreeMap::new(),
                velocities: BTreeMap::new(),
                pending: PendingUpdate::default(),
                pinned: BTreeSet::new(),
                regions: Arc::new(RegionGrid::empty(1.0)),
                rng,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StateInner<N>> {
        // Every writer leaves the maps consistent, so a poisoned lock is safe to reuse.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue position overrides to be applied at the next sync.
    ///
    /// Requests accumulate until consumed: later positions for the same node
    /// win, and `reset_node_set` stays set once any request sets it.
    pub fn request_positions<I>(&self, positions: I, reset_node_set: bool)
    where
        I: IntoIterator<Item = (N, Position)>,
    {
        let mut inner = self.lock();
        inner.pending.positions.extend(positions);
        inner.pending.reset_nodes |= reset_node_set;
    }

    /// Whether overrides are waiting for the next sync.
    pub fn has_pending(&self) -> bool {
        !self.lock().pending.is_empty()
    }

    /// Reconcile the tracked nodes with `graph` and apply pending overrides.
    ///
    /// - Pending overrides replace the stored position and zero the velocity.
    ///   Override keys outside the graph become tracked members. Overrides
    ///   with a non-finite coordinate are dropped with a warning.
    /// - With `reset_nodes` pending, entries for nodes in neither the graph nor
    ///   the override keys are dropped; otherwise nothing is removed.
    /// - Every graph node still without a position is seeded next to its
    ///   located neighbours, with zero velocity.
    ///
    /// The pending buffer is cleared, so a second call without new requests
    /// changes nothing.
    pub fn node_location_sync<G>(&self, graph: &G, params: &LayoutParameters) -> SyncReport
    where
        G: Topology<N> + ?Sized,
    {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let pending = std::mem::take(&mut inner.pending);
        let mut report = SyncReport::default();

        let mut overrides = BTreeMap::new();
        for (node, pos) in pending.positions {
            if pos.is_finite() {
                overrides.insert(node, pos);
            } else {
                warn!(?node, x = pos.x, y = pos.y, "ignoring non-finite position override");
                report.rejected += 1;
            }
        }

        let mut graph_nodes = graph.node_ids();
        graph_nodes.sort_unstable();

        if pending.reset_nodes {
            let keep: BTreeSet<N> = graph_nodes
                .iter()
                .copied()
                .chain(overrides.keys().copied())
                .collect();
            let before = inner.positions.len();
            inner.positions.retain(|n, _| keep.contains(n));
            inner.velocities.retain(|n, _| keep.contains(n));
            inner.pinned.retain(|n| keep.contains(n));
            report.removed = before - inner.positions.len();
        }

        for (node, pos) in overrides {
            inner.positions.insert(node, pos);
            inner.velocities.insert(node, Velocity::ZERO);
            report.overridden += 1;
        }

        for node in graph_nodes {
            if inner.positions.contains_key(&node) {
                continue;
            }
            let located: Vec<Position> = graph
                .adjacent(node)
                .iter()
                .filter_map(|n| inner.positions.get(n).copied())
                .collect();
            let pos = seed_position(&located, params, &mut inner.rng);
            inner.positions.insert(node, pos);
            inner.velocities.insert(node, Velocity::ZERO);
            report.seeded += 1;
        }

        if report.changed() {
            debug!(
                overridden = report.overridden,
                seeded = report.seeded,
                removed = report.removed,
                rejected = report.rejected,
                tracked = inner.positions.len(),
                "node_location_sync"
            );
        }
        report
    }

    /// Snapshot of every tracked position.
    pub fn positions_copy(&self) -> Positions<N> {
        self.lock().positions.clone()
    }

    /// Snapshot of every tracked velocity.
    pub fn velocities_copy(&self) -> BTreeMap<N, Velocity> {
        self.lock().velocities.clone()
    }

    pub fn position(&self, node: N) -> Option<Position> {
        self.lock().positions.get(&node).copied()
    }

    pub fn velocity(&self, node: N) -> Option<Velocity> {
        self.lock().velocities.get(&node).copied()
    }

    /// Exclude `node` from forces and movement.
    pub fn pin(&self, node: N) {
        self.lock().pinned.insert(node);
    }

    pub fn unpin(&self, node: N) {
        self.lock().pinned.remove(&node);
    }

    pub fn set_pinned<I: IntoIterator<Item = N>>(&self, nodes: I) {
        self.lock().pinned = nodes.into_iter().collect();
    }

    pub fn pinned(&self) -> BTreeSet<N> {
        self.lock().pinned.clone()
    }

    pub fn is_pinned(&self, node: N) -> bool {
        self.lock().pinned.contains(&node)
    }

    /// Re-bucket the current positions into regions of side `cell_size`.
    pub fn rebuild_regions(&self, cell_size: f64) -> Arc<RegionGrid<N>> {
        let mut inner = self.lock();
        let grid = Arc::new(RegionGrid::build(
            inner.positions.iter().map(|(n, p)| (*n, *p)),
            cell_size,
        ));
        inner.regions = Arc::clone(&grid);
        grid
    }

    /// The grid built by the last [`rebuild_regions`](Self::rebuild_regions).
    pub fn regions(&self) -> Arc<RegionGrid<N>> {
        Arc::clone(&self.lock().regions)
    }

    pub fn snapshot(&self) -> StateSnapshot<N> {
        let inner = self.lock();
        StateSnapshot {
            positions: inner.positions.clone(),
            velocities: inner.velocities.clone(),
            pinned: inner.pinned.clone(),
        }
    }

    /// Write integrated positions and velocities back in one critical section.
    ///
    /// Updates for nodes that are no longer tracked are ignored.
    pub fn commit<I>(&self, updates: I)
    where
        I: IntoIterator<Item = (N, Position, Velocity)>,
    {
        let mut guard = self.lock();
        let inner = &mut *guard;
        for (node, pos, vel) in updates {
            if let Some(slot) = inner.positions.get_mut(&node) {
                *slot = pos;
                inner.velocities.insert(node, vel);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().positions.is_empty()
    }

    /// Forget every node, override and pin.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.positions.clear();
        inner.velocities.clear();
        inner.pending = PendingUpdate::default();
        inner.pinned.clear();
        inner.regions = Arc::new(RegionGrid::empty(inner.regions.cell_size()));
    }
}

impl<N: NodeKey> Default for LayoutState<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: NodeKey> fmt::Debug for LayoutState<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("LayoutState")
            .field("tracked", &inner.positions.len())
            .field("pinned", &inner.pinned.len())
            .field("pending", &inner.pending.positions.len())
            .finish()
    }
}

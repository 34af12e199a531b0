//! Iterative force-directed graph layout.
//!
//! Nodes carry a position and a velocity. Every step, each unpinned node feels
//! a spring force along its edges, repulsion from nearby nodes and a weak
//! pull toward the origin; the net force updates a damped velocity, and the
//! velocity moves the node. The returned energy (`Σ 0.5·|v|²`) falls as the
//! drawing settles.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  request_positions   ┌───────────────────────────────┐
//! │ caller / UI  │─────────────────────▶│ LayoutState                   │
//! │              │◀─────────────────────│  positions, velocities,       │
//! └──────────────┘   positions_copy     │  pending overrides, pinned    │
//!                                       └───────────────┬───────────────┘
//!                                                       │ sync → regions → forces → commit
//! ┌──────────────┐   run_one_loop       ┌───────────────▼───────────────┐
//! │ LayoutService│─────────────────────▶│ IterativeLayout::iterate      │
//! └──────────────┘                      └───────────────────────────────┘
//! ```
//!
//! [`StaticLayout`] runs the same step to convergence on a reduced graph
//! (isolates and leaves stripped) and places the stripped nodes afterwards.
//! [`LayoutRegistry`] selects whole-graph algorithms by name.
//!
//! ## Example
//!
//! ```
//! use petgraph::graphmap::UnGraphMap;
//! use tensile_layout::{StaticLayout, StaticLayoutParameters};
//!
//! let graph: UnGraphMap<u32, ()> = UnGraphMap::from_edges([(0, 1), (1, 2), (2, 3), (3, 0)]);
//! let mut params = StaticLayoutParameters::default();
//! params.layout.seed = Some(42);
//!
//! let report = StaticLayout::<u32>::new()
//!     .layout(&graph, &Default::default(), &params)
//!     .unwrap();
//! assert_eq!(report.positions.len(), 4);
//! ```

mod algorithms;
mod error;
mod forces;
mod iterative;
mod params;
mod region;
mod service;
mod session;
mod state;
mod static_layout;

pub use algorithms::{
    CircleLayout, FixableLayout, LayoutAlgorithm, LayoutRegistry, PositionalAddingLayout,
    RandomBoxLayout, SpringLayout,
};
pub use error::LayoutError;
pub use forces::{
    check_finite, displacement, energy, global_force, integrate_velocity, repulsive_force,
    seed_position, spring_force,
};
pub use iterative::IterativeLayout;
pub use params::{LayoutParameters, StaticLayoutParameters};
pub use region::{LayoutRegion, RegionGrid, RegionKey};
pub use service::{LayoutService, ServiceConfig, ServiceEvent, ServiceListener, ServiceStatus};
pub use session::LayoutSession;
pub use state::{LayoutState, PendingUpdate, StateSnapshot, SyncReport};
pub use static_layout::{
    circle_positions, reduce_graph, DegreeClasses, StaticLayout, StaticLayoutReport,
};

/// Result type for layout operations.
pub type Result<T> = std::result::Result<T, LayoutError>;

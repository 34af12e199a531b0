//! End-to-end properties of the iterative engine and the static runner.

use std::time::Duration;

use petgraph::graphmap::UnGraphMap;
use tensile_core::{LayoutGraph, Positions, Vec2};
use tensile_layout::{
    IterativeLayout, LayoutError, LayoutParameters, LayoutSession, LayoutState, StaticLayout,
    StaticLayoutParameters,
};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Fixtures
// ============================================================================

fn seeded(seed: u64) -> StaticLayoutParameters {
    let mut params = StaticLayoutParameters::default();
    params.layout.seed = Some(seed);
    params
}

fn four_cycle() -> UnGraphMap<u32, ()> {
    UnGraphMap::from_edges([(0, 1), (1, 2), (2, 3), (3, 0)])
}

/// Triangle 0-1-2, leaf 3 on node 0, leaf 4 on node 1, isolates 5, 6, 7.
fn triangle_with_strays() -> UnGraphMap<u32, ()> {
    let mut graph = UnGraphMap::from_edges([(0, 1), (1, 2), (2, 0), (0, 3), (1, 4)]);
    for isolate in [5, 6, 7] {
        graph.add_node(isolate);
    }
    graph
}

fn grid_graph(side: u32) -> UnGraphMap<u32, ()> {
    let mut graph = UnGraphMap::new();
    for row in 0..side {
        for col in 0..side {
            let id = row * side + col;
            graph.add_node(id);
            if col + 1 < side {
                graph.add_edge(id, id + 1, ());
            }
            if row + 1 < side {
                graph.add_edge(id, id + side, ());
            }
        }
    }
    graph
}

fn assert_pairwise_apart(positions: &Positions<u32>, nodes: &[u32], min: f64) {
    for (i, a) in nodes.iter().enumerate() {
        for b in &nodes[i + 1..] {
            let d = positions[a].distance(positions[b]);
            assert!(d >= min, "nodes {a} and {b} only {d} apart");
        }
    }
}

// ============================================================================
// Static runner
// ============================================================================

#[test]
fn four_cycle_converges_to_natural_edge_length() {
    let params = seeded(42);
    let report = StaticLayout::<u32>::new()
        .layout(&four_cycle(), &Positions::new(), &params)
        .unwrap();

    assert!(report.converged);
    assert!(report.steps >= params.min_steps);
    assert!(report.final_energy < params.energy_change_threshold);

    let natural = params.layout.spring_length_world();
    for (a, b) in [(0, 1), (1, 2), (2, 3), (3, 0)] {
        let length = report.positions[&a].distance(report.positions[&b]);
        assert!(
            (length - natural).abs() < 0.15 * natural,
            "edge {a}-{b} has length {length}, natural {natural}"
        );
    }
}

#[test]
fn seeded_runs_reproduce() {
    let params = seeded(7);
    let first = StaticLayout::<u32>::new()
        .layout(&triangle_with_strays(), &Positions::new(), &params)
        .unwrap();
    let second = StaticLayout::<u32>::new()
        .layout(&triangle_with_strays(), &Positions::new(), &params)
        .unwrap();
    assert_eq!(first.positions, second.positions);
}

#[test]
fn leaves_and_isolates_are_reintegrated() {
    let report = StaticLayout::<u32>::new()
        .layout(&triangle_with_strays(), &Positions::new(), &seeded(3))
        .unwrap();
    let positions = &report.positions;

    assert_eq!(positions.len(), 8);
    assert_eq!(report.reduced_node_count, 3);
    assert_eq!(report.reduced_edge_count, 3);

    assert_pairwise_apart(positions, &[5, 6, 7], 1.0);

    for (leaf, anchor) in [(3u32, 0u32), (4, 1)] {
        let to_anchor = positions[&leaf].distance(positions[&anchor]);
        for other in [0u32, 1, 2].into_iter().filter(|&n| n != anchor) {
            assert!(
                to_anchor < positions[&leaf].distance(positions[&other]),
                "leaf {leaf} is closer to {other} than to its anchor {anchor}"
            );
        }
    }
}

#[test]
fn star_is_placed_entirely_by_leaf_fanning() {
    let graph: UnGraphMap<u32, ()> = UnGraphMap::from_edges((1..=8).map(|leaf| (0, leaf)));
    let report = StaticLayout::<u32>::new()
        .layout(&graph, &Positions::new(), &seeded(5))
        .unwrap();

    assert_eq!(report.reduced_edge_count, 0);
    assert_eq!(report.reduced_node_count, 1);
    assert_eq!(report.positions.len(), 9);
    let nodes: Vec<u32> = (0..=8).collect();
    assert_pairwise_apart(&report.positions, &nodes, 1.0);
}

#[test]
fn leaf_pairs_and_directed_graphs_are_handled() {
    let graph = LayoutGraph::from_edges(true, [(0u32, 1), (1, 2), (2, 0), (10, 11)]);
    let report = StaticLayout::<u32>::new()
        .layout(&graph, &Positions::new(), &seeded(8))
        .unwrap();
    assert_eq!(report.positions.len(), 5);
    assert_eq!(report.reduced_node_count, 3);
    assert_pairwise_apart(&report.positions, &[0, 1, 2, 10, 11], 1.0);
}

#[test]
fn pinned_hint_survives_the_static_run() {
    let anchor = Vec2::new(300.0, -120.0);
    let hints: Positions<u32> = [(2, anchor)].into_iter().collect();
    let report = StaticLayout::with_pinned([2])
        .layout(&four_cycle(), &hints, &seeded(9))
        .unwrap();
    assert_eq!(report.positions[&2], anchor);
}

// ============================================================================
// Iterative engine and state
// ============================================================================

#[test]
fn pinned_nodes_never_move() {
    let graph = grid_graph(4);
    let state = LayoutState::with_seed(1);
    let params = LayoutParameters {
        seed: Some(1),
        ..Default::default()
    };
    let pinned_at = Vec2::new(40.0, -40.0);
    state.request_positions([(5, pinned_at)], false);
    state.pin(5);
    state.pin(10);

    let mut engine = IterativeLayout::with_seed(1);
    engine.iterate(&graph, &state, &params).unwrap();
    let before = state.positions_copy();

    for _ in 0..50 {
        engine.iterate(&graph, &state, &params).unwrap();
    }
    let after = state.positions_copy();

    assert_eq!(after[&5], pinned_at);
    assert_eq!(after[&10], before[&10]);
    let moved = (0..16u32)
        .filter(|n| *n != 5 && *n != 10)
        .filter(|n| after[n] != before[n])
        .count();
    assert!(moved > 0);
}

#[test]
fn sync_twice_changes_nothing_the_second_time() {
    let graph = four_cycle();
    let params = LayoutParameters::default();
    let state = LayoutState::with_seed(2);
    let mut engine = IterativeLayout::with_seed(2);
    for _ in 0..5 {
        engine.iterate(&graph, &state, &params).unwrap();
    }
    state.request_positions([(1, Vec2::new(9.0, 9.0))], true);

    state.node_location_sync(&graph, &params);
    let positions = state.positions_copy();
    let velocities = state.velocities_copy();
    let report = state.node_location_sync(&graph, &params);

    assert!(!report.changed());
    assert_eq!(state.positions_copy(), positions);
    assert_eq!(state.velocities_copy(), velocities);
}

#[test]
fn override_takes_precedence_over_momentum() {
    let graph = four_cycle();
    let params = LayoutParameters::default();
    let state = LayoutState::with_seed(3);
    let mut engine = IterativeLayout::with_seed(3);
    for _ in 0..3 {
        engine.iterate(&graph, &state, &params).unwrap();
    }
    assert_ne!(state.velocity(0), Some(Vec2::ZERO));

    let target = Vec2::new(-75.0, 12.5);
    state.request_positions([(0, target)], false);
    state.node_location_sync(&graph, &params);
    assert_eq!(state.position(0), Some(target));
    assert_eq!(state.velocity(0), Some(Vec2::ZERO));
}

#[test]
fn session_reads_are_snapshots() {
    let session = LayoutSession::new(
        four_cycle(),
        LayoutParameters {
            seed: Some(4),
            ..Default::default()
        },
    )
    .unwrap();
    session.run_one_step().unwrap();
    let mut snapshot = session.positions_copy();
    snapshot.insert(0, Vec2::new(1e6, 1e6));
    session.run_one_step().unwrap();
    assert_ne!(session.positions_copy()[&0], Vec2::new(1e6, 1e6));
}

// ============================================================================
// Cancellation
// ============================================================================

#[test]
fn precancelled_layout_returns_canceled() {
    let token = CancellationToken::new();
    token.cancel();
    let err = StaticLayout::<u32>::new()
        .layout_with_cancel(&grid_graph(10), &Positions::new(), &seeded(1), &token)
        .unwrap_err();
    assert!(err.is_canceled());
}

#[tokio::test]
async fn cancelling_a_running_layout_yields_no_positions() {
    let token = CancellationToken::new();
    let mut params = seeded(6);
    params.min_steps = 5000;
    params.max_steps = 5000;

    let task = {
        let token = token.clone();
        tokio::task::spawn_blocking(move || {
            let graph = grid_graph(40);
            StaticLayout::<u32>::new().layout_with_cancel(&graph, &Positions::new(), &params, &token)
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    token.cancel();

    let result = task.await.unwrap();
    match result {
        Err(LayoutError::Canceled { steps }) => assert!(steps < 5000),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(report) => panic!("canceled run returned {} positions", report.positions.len()),
    }
}

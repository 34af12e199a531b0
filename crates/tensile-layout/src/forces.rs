//! Force model.
//!
//! Pure functions: global pull, edge springs, pairwise repulsion, velocity
//! integration and position seeding. Positions come in world units and are
//! converted to model units (`/ distance_scale`) before any force is computed;
//! forces and velocities stay in model units.

use std::f64::consts::TAU;

use rand::Rng;
use tensile_core::{NodeKey, Position, Vec2, Velocity};
use tracing::warn;

use crate::params::LayoutParameters;

/// Pull toward the origin with constant magnitude `global_constant`, skipped
/// inside `min_global_distance`.
pub fn global_force(pos: Position, params: &LayoutParameters) -> Vec2 {
    let model = pos / params.distance_scale;
    let dist = model.length();
    if dist > params.min_global_distance {
        -model * (params.global_constant / dist)
    } else {
        Vec2::ZERO
    }
}

/// Spring force on `node` from its neighbour `other`.
///
/// Attractive beyond the natural length, repulsive inside it. Coincident
/// endpoints get a fixed escape force along x whose sign depends on node
/// order, so the two ends are pushed apart instead of together.
pub fn spring_force<N: NodeKey>(
    node: N,
    pos: Position,
    other: N,
    other_pos: Position,
    params: &LayoutParameters,
) -> Vec2 {
    let delta = (other_pos - pos) / params.distance_scale;
    let dist = delta.length();
    if dist == 0.0 {
        warn!(?node, ?other, "spring endpoints coincide; applying escape force");
        let sign = if node < other { -1.0 } else { 1.0 };
        return Vec2::new(sign * params.max_force, 0.0);
    }
    delta * (params.spring_constant * (dist - params.spring_length) / dist)
}

/// Repulsion pushing a node at `pos` away from one at `other_pos`.
///
/// Magnitude is `min(repulsive_constant / d², max_force)`, zero at or beyond
/// `max_repel_distance`. Coincident nodes get `max_force` in a random
/// direction.
pub fn repulsive_force<R: Rng + ?Sized>(
    pos: Position,
    other_pos: Position,
    params: &LayoutParameters,
    rng: &mut R,
) -> Vec2 {
    let delta = (pos - other_pos) / params.distance_scale;
    let dist = delta.length();
    if dist >= params.max_repel_distance {
        return Vec2::ZERO;
    }
    if dist == 0.0 {
        warn!("coincident nodes; applying random repulsion");
        return Vec2::from_angle(rng.random_range(0.0..TAU)) * params.max_force;
    }
    let magnitude = (params.repulsive_constant / (dist * dist)).min(params.max_force);
    delta * (magnitude / dist)
}

/// Damped velocity update: `damping * (v + step_time * F)`, with the force
/// clamped to `force_cap` and the result clamped to `max_speed`.
pub fn integrate_velocity(
    velocity: Velocity,
    force: Vec2,
    force_cap: f64,
    damping: f64,
    params: &LayoutParameters,
) -> Velocity {
    let force = force.clamp_length(force_cap);
    ((velocity + force * params.step_time) * damping).clamp_length(params.max_speed)
}

/// World-space displacement produced by `velocity` over one step.
pub fn displacement(velocity: Velocity, params: &LayoutParameters) -> Vec2 {
    velocity * (params.step_time * params.distance_scale)
}

/// Kinetic-energy proxy of one node, `0.5 * |v|²`.
pub fn energy(velocity: Velocity) -> f64 {
    0.5 * velocity.length_squared()
}

/// Whether both components of `force` are finite.
pub fn check_finite(force: Vec2) -> bool {
    force.is_finite()
}

/// Starting position for a node that has none yet.
///
/// No located neighbours: a random point within one spring length of the
/// origin. One: a random point one spring length from it. Several: their
/// centroid.
pub fn seed_position<R: Rng + ?Sized>(
    located_neighbours: &[Position],
    params: &LayoutParameters,
    rng: &mut R,
) -> Position {
    let reach = params.spring_length_world();
    match located_neighbours {
        [] => {
            let radius = reach * rng.random::<f64>().sqrt();
            Vec2::from_angle(rng.random_range(0.0..TAU)) * radius
        }
        [only] => *only + Vec2::from_angle(rng.random_range(0.0..TAU)) * reach,
        many => Vec2::centroid(many.iter().copied()).unwrap_or(Vec2::ZERO),
    }
}

//! Layout parameters.
//!
//! Parameters are plain serde data objects with named, independently settable
//! fields. Lengths are expressed in model units unless stated otherwise; one
//! model unit spans `distance_scale` world units.

use serde::{Deserialize, Serialize};

use crate::error::LayoutError;
use crate::Result;

/// Tunables for the iterative force model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutParameters {
    /// Natural (rest) length of an edge spring.
    pub spring_length: f64,
    /// Spring stiffness.
    pub spring_constant: f64,
    /// Strength of pairwise repulsion.
    pub repulsive_constant: f64,
    /// Pairs farther apart than this do not repel. Also the region cell size.
    pub max_repel_distance: f64,
    /// Magnitude of the pull toward the origin.
    pub global_constant: f64,
    /// No pull toward the origin inside this radius.
    pub min_global_distance: f64,
    /// Damping coefficient at iteration 0 of the cooling curve.
    pub damping_start: f64,
    /// Damping coefficient the cooling curve decays toward.
    pub damping_end: f64,
    /// Cap on the net force applied to a node.
    pub max_force: f64,
    /// Cap on node speed.
    pub max_speed: f64,
    /// Integration time step.
    pub step_time: f64,
    /// World units per model unit.
    pub distance_scale: f64,
    /// Nodes above this degree get a proportionally smaller force cap.
    pub hub_degree_threshold: usize,
    /// Seed for tie-breaking and placement randomness; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for LayoutParameters {
    fn default() -> Self {
        Self {
            spring_length: 0.5,
            spring_constant: 1.0,
            repulsive_constant: 0.01,
            max_repel_distance: 1.5,
            global_constant: 0.1,
            min_global_distance: 0.05,
            damping_start: 1.0,
            damping_end: 0.1,
            max_force: 5.0,
            max_speed: 2.0,
            step_time: 0.5,
            distance_scale: 50.0,
            hub_degree_threshold: 15,
            seed: None,
        }
    }
}

impl LayoutParameters {
    /// Larger steps and a faster cool-down, for interactive previews.
    pub fn fast() -> Self {
        Self {
            step_time: 0.7,
            max_speed: 3.0,
            damping_start: 0.8,
            ..Default::default()
        }
    }

    /// Smaller steps, for large or dense graphs where stability matters more
    /// than speed.
    pub fn thorough() -> Self {
        Self {
            step_time: 0.3,
            max_speed: 1.0,
            damping_end: 0.05,
            ..Default::default()
        }
    }

    /// Fail fast on values that would make the simulation diverge or stall.
    pub fn validate(&self) -> Result<()> {
        positive("spring_length", self.spring_length)?;
        positive("spring_constant", self.spring_constant)?;
        non_negative("repulsive_constant", self.repulsive_constant)?;
        positive("max_repel_distance", self.max_repel_distance)?;
        non_negative("global_constant", self.global_constant)?;
        non_negative("min_global_distance", self.min_global_distance)?;
        unit_interval("damping_start", self.damping_start)?;
        unit_interval("damping_end", self.damping_end)?;
        if self.damping_end > self.damping_start {
            return Err(LayoutError::invalid(
                "damping_end",
                format!(
                    "{} exceeds damping_start {}",
                    self.damping_end, self.damping_start
                ),
            ));
        }
        positive("max_force", self.max_force)?;
        positive("max_speed", self.max_speed)?;
        positive("step_time", self.step_time)?;
        positive("distance_scale", self.distance_scale)?;
        if self.hub_degree_threshold == 0 {
            return Err(LayoutError::invalid(
                "hub_degree_threshold",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Damping coefficient for `iteration` on the logarithmic cooling curve.
    ///
    /// Equals `damping_start` at iteration 0 and decays toward `damping_end`;
    /// with the defaults this is `0.1 + 0.9 / log10(iteration + 10)`.
    pub fn damping_at(&self, iteration: u64) -> f64 {
        let decay = 1.0 / (iteration as f64 + 10.0).log10();
        self.damping_end + (self.damping_start - self.damping_end) * decay
    }

    /// Force cap for a node of the given degree.
    pub fn max_force_for(&self, degree: usize) -> f64 {
        if degree > self.hub_degree_threshold {
            self.max_force * self.hub_degree_threshold as f64 / degree as f64
        } else {
            self.max_force
        }
    }

    /// Spring rest length in world units.
    pub fn spring_length_world(&self) -> f64 {
        self.spring_length * self.distance_scale
    }

    /// Side of a repulsion region in world units.
    pub fn region_size_world(&self) -> f64 {
        self.max_repel_distance * self.distance_scale
    }
}

/// Parameters for a blocking run to convergence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticLayoutParameters {
    /// Force model used by every step.
    pub layout: LayoutParameters,
    /// Steps always run, even when energy is already flat.
    pub min_steps: usize,
    /// Hard cap on steps regardless of convergence.
    pub max_steps: usize,
    /// The run stops once `|energy change|` drops to this value.
    pub energy_change_threshold: f64,
    /// Damping at step 0 of the quadratic cooling schedule.
    pub cool_start: f64,
    /// Damping reached at `max_steps`.
    pub cool_end: f64,
    /// Radius of the initial circle, in world units.
    pub circle_radius: f64,
    /// Distance from a leaf to its anchor, in world units. Defaults to the
    /// spring length.
    pub leaf_distance: Option<f64>,
    /// Grid spacing for packed isolates and leaf pairs, in world units.
    /// Defaults to the spring length.
    pub isolate_spacing: Option<f64>,
}

impl Default for StaticLayoutParameters {
    fn default() -> Self {
        Self {
            layout: LayoutParameters::default(),
            min_steps: 100,
            max_steps: 5000,
            energy_change_threshold: 1e-3,
            cool_start: 0.5,
            cool_end: 0.1,
            circle_radius: 100.0,
            leaf_distance: None,
            isolate_spacing: None,
        }
    }
}

impl StaticLayoutParameters {
    pub fn validate(&self) -> Result<()> {
        self.layout.validate()?;
        if self.max_steps == 0 {
            return Err(LayoutError::invalid("max_steps", "must be at least 1"));
        }
        if self.min_steps > self.max_steps {
            return Err(LayoutError::invalid(
                "min_steps",
                format!("{} exceeds max_steps {}", self.min_steps, self.max_steps),
            ));
        }
        positive("energy_change_threshold", self.energy_change_threshold)?;
        unit_interval("cool_start", self.cool_start)?;
        unit_interval("cool_end", self.cool_end)?;
        positive("circle_radius", self.circle_radius)?;
        if let Some(d) = self.leaf_distance {
            positive("leaf_distance", d)?;
        }
        if let Some(s) = self.isolate_spacing {
            positive("isolate_spacing", s)?;
        }
        Ok(())
    }

    /// Damping for `step` on the quadratic cooling schedule.
    pub fn cooling_at(&self, step: usize) -> f64 {
        let t = (step as f64 / self.max_steps as f64).powi(2).min(1.0);
        self.cool_start + (self.cool_end - self.cool_start) * t
    }

    pub fn leaf_distance(&self) -> f64 {
        self.leaf_distance
            .unwrap_or_else(|| self.layout.spring_length_world())
    }

    pub fn isolate_spacing(&self) -> f64 {
        self.isolate_spacing
            .unwrap_or_else(|| self.layout.spring_length_world())
    }
}

fn positive(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(LayoutError::invalid(
            name,
            format!("{value} must be finite and > 0"),
        ))
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(LayoutError::invalid(
            name,
            format!("{value} must be finite and >= 0"),
        ))
    }
}

fn unit_interval(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(LayoutError::invalid(name, format!("{value} must be in (0, 1]")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(LayoutParameters::default().validate().is_ok());
        assert!(LayoutParameters::fast().validate().is_ok());
        assert!(LayoutParameters::thorough().validate().is_ok());
        assert!(StaticLayoutParameters::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_lengths() {
        let params = LayoutParameters {
            spring_length: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(LayoutError::InvalidParameter {
                name: "spring_length",
                ..
            })
        ));

        let params = LayoutParameters {
            step_time: -0.5,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = LayoutParameters {
            distance_scale: f64::NAN,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn rejects_inverted_damping_and_step_bounds() {
        let params = LayoutParameters {
            damping_start: 0.2,
            damping_end: 0.5,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = StaticLayoutParameters {
            min_steps: 10,
            max_steps: 5,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(LayoutError::InvalidParameter {
                name: "min_steps",
                ..
            })
        ));
    }

    #[test]
    fn cooling_curve_matches_log_decay() {
        let params = LayoutParameters::default();
        assert!((params.damping_at(0) - 1.0).abs() < 1e-12);
        assert!((params.damping_at(90) - (0.1 + 0.9 / 2.0)).abs() < 1e-12);
        assert!(params.damping_at(10_000) < params.damping_at(100));
        assert!(params.damping_at(u32::MAX as u64) > 0.1);
    }

    #[test]
    fn quadratic_cooling_schedule() {
        let params = StaticLayoutParameters {
            max_steps: 100,
            cool_start: 0.5,
            cool_end: 0.1,
            ..Default::default()
        };
        assert!((params.cooling_at(0) - 0.5).abs() < 1e-12);
        assert!((params.cooling_at(50) - 0.4).abs() < 1e-12);
        assert!((params.cooling_at(100) - 0.1).abs() < 1e-12);
        assert!((params.cooling_at(500) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn hub_force_cap_scales_with_degree() {
        let params = LayoutParameters::default();
        assert_eq!(params.max_force_for(3), params.max_force);
        assert_eq!(params.max_force_for(15), params.max_force);
        assert!((params.max_force_for(30) - params.max_force / 2.0).abs() < 1e-12);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let params: StaticLayoutParameters =
            serde_json::from_str(r#"{ "max_steps": 42, "layout": { "seed": 7 } }"#).unwrap();
        assert_eq!(params.max_steps, 42);
        assert_eq!(params.layout.seed, Some(7));
        assert_eq!(params.layout.spring_length, 0.5);
        assert_eq!(params.min_steps, 100);
    }
}

//! CLI configuration management.
//!
//! Layout parameters come from an optional JSON file, then environment
//! variables (a `.env` file is read first when present), and are validated
//! before any layout runs.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tensile_layout::StaticLayoutParameters;

/// Environment variables that override file settings.
pub const ENV_MIN_STEPS: &str = "TENSILE_MIN_STEPS";
pub const ENV_MAX_STEPS: &str = "TENSILE_MAX_STEPS";
pub const ENV_THRESHOLD: &str = "TENSILE_THRESHOLD";
pub const ENV_SEED: &str = "TENSILE_SEED";

/// Resolved settings for one CLI invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub params: StaticLayoutParameters,
}

impl Config {
    /// Load from `path` (if given) and the environment, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // Load .env file if present (silently ignore if missing)
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config
            .params
            .validate()
            .context("Invalid layout configuration")?;
        Ok(config)
    }

    /// Parse a JSON `StaticLayoutParameters` file; missing fields keep their
    /// defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let params: StaticLayoutParameters = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(Self { params })
    }

    /// Apply overrides looked up through `var`.
    pub fn apply_overrides<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = var(ENV_MIN_STEPS) {
            self.params.min_steps = parse(ENV_MIN_STEPS, &value)?;
        }
        if let Some(value) = var(ENV_MAX_STEPS) {
            self.params.max_steps = parse(ENV_MAX_STEPS, &value)?;
        }
        if let Some(value) = var(ENV_THRESHOLD) {
            self.params.energy_change_threshold = parse(ENV_THRESHOLD, &value)?;
        }
        if let Some(value) = var(ENV_SEED) {
            self.params.layout.seed = Some(parse(ENV_SEED, &value)?);
        }
        Ok(())
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("{key}={value:?} is not a valid value"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[(ENV_MAX_STEPS, "250"), (ENV_SEED, " 9 ")]))
            .unwrap();
        assert_eq!(config.params.max_steps, 250);
        assert_eq!(config.params.layout.seed, Some(9));
        assert_eq!(config.params.min_steps, 100);
    }

    #[test]
    fn malformed_override_names_the_variable() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(env(&[(ENV_THRESHOLD, "tiny")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_THRESHOLD));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.json");
        std::fs::write(&path, r#"{ "circle_radius": 40.0, "layout": { "spring_length": 0.8 } }"#)
            .unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.params.circle_radius, 40.0);
        assert_eq!(config.params.layout.spring_length, 0.8);
        assert_eq!(config.params.max_steps, 5000);
    }
}

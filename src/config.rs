// src/config.rs
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Environment variable naming an optional JSON file that overrides [`FieldConfig`].
pub const CONFIG_ENV_VAR: &str = "PARTICLEFIELD_CONFIG";

/// Tunables of the particle field. Every field falls back to its default when
/// missing from a JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    pub particle_count: usize,
    /// Pairs closer than this (in logical pixels) get a connecting line.
    pub connection_distance: f32,
    pub max_neighbors: u32,
    /// How far past the viewport edge a particle may drift before wrapping.
    pub wrap_margin: f32,

    // Half-open `[min, max)` ranges used when the population is created.
    pub speed_range: [f32; 2],
    pub radius_range: [f32; 2],
    pub opacity_range: [f32; 2],
    pub phase_speed_range: [f32; 2],
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            particle_count: 80,
            connection_distance: 120.0,
            max_neighbors: 3,
            wrap_margin: 10.0,
            speed_range: [-0.75, 0.75],
            radius_range: [1.0, 3.0],
            opacity_range: [0.4, 1.0],
            phase_speed_range: [0.02, 0.04],
        }
    }
}

impl FieldConfig {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: FieldConfig = serde_json::from_str(json).context("Malformed field config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read field config {}", path.display()))?;
        Self::from_json(&json)
    }

    /// Reads the file named by [`CONFIG_ENV_VAR`], falling back to defaults when the
    /// variable is unset or the file is unusable.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env_or_default() -> Self {
        let Some(path) = std::env::var_os(CONFIG_ENV_VAR) else {
            return Self::default();
        };
        match Self::from_file(Path::new(&path)) {
            Ok(config) => {
                log::info!("Loaded field config from {}", Path::new(&path).display());
                config
            }
            Err(e) => {
                log::warn!("Ignoring field config: {:#}", e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.connection_distance > 0.0 && self.connection_distance.is_finite(),
            "connection_distance must be positive, got {}",
            self.connection_distance
        );
        anyhow::ensure!(
            self.wrap_margin >= 0.0 && self.wrap_margin.is_finite(),
            "wrap_margin must be non-negative, got {}",
            self.wrap_margin
        );

        let ranges = [
            ("speed_range", self.speed_range),
            ("radius_range", self.radius_range),
            ("opacity_range", self.opacity_range),
            ("phase_speed_range", self.phase_speed_range),
        ];
        for (name, [min, max]) in ranges {
            anyhow::ensure!(
                min.is_finite() && max.is_finite() && min < max,
                "{} must be a non-empty range, got [{}, {})",
                name,
                min,
                max
            );
        }
        anyhow::ensure!(self.radius_range[0] > 0.0, "radius_range must be positive");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_constants() {
        let config = FieldConfig::default();
        assert_eq!(config.particle_count, 80);
        assert_eq!(config.connection_distance, 120.0);
        assert_eq!(config.max_neighbors, 3);
        assert_eq!(config.wrap_margin, 10.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = FieldConfig::from_json(r#"{ "particle_count": 120 }"#).unwrap();
        assert_eq!(config.particle_count, 120);
        assert_eq!(config.connection_distance, 120.0);
        assert_eq!(config.opacity_range, [0.4, 1.0]);
    }

    #[test]
    fn test_rejects_empty_range() {
        let err = FieldConfig::from_json(r#"{ "radius_range": [2.0, 2.0] }"#).unwrap_err();
        assert!(format!("{:#}", err).contains("radius_range"));
    }

    #[test]
    fn test_rejects_non_positive_distance() {
        assert!(FieldConfig::from_json(r#"{ "connection_distance": 0.0 }"#).is_err());
        assert!(FieldConfig::from_json("not json").is_err());
    }
}

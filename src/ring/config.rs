//! Ring configuration (all scalar parameters, loadable from JSON).
//!
//! Radial profile curves live in `RingProfile` (`profile.rs`).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::types::Result;
use crate::streaming::{CELLS_PER_OCTAVE, MAX_OCTAVES};

/// Geometry of the annulus in ring-local space. The ring axis is local +Y.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingShape {
    /// Radius where the debris field starts.
    pub inner_radius: f64,
    /// Radius where the debris field ends.
    pub outer_radius: f64,
    /// Base half-height of the debris slab.
    pub thickness: f64,
    /// Blend (0-1) from base thickness towards the sampled thickness curve.
    pub squash: f64,
    /// Exponent on the vertical falloff; higher packs particles into the midplane.
    pub weight_exponent: f64,
}

impl Default for RingShape {
    fn default() -> Self {
        Self {
            inner_radius: 100.0,
            outer_radius: 200.0,
            thickness: 2.0,
            squash: 0.5,
            weight_exponent: 1.0,
        }
    }
}

/// Chunk pool sizing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Chunks allocated up front.
    pub initial: usize,
    /// Top up when fewer than this many chunks are free.
    pub low_water: usize,
    /// Chunks allocated per top-up.
    pub batch: usize,
    /// Hard limit on chunks ever allocated (current + stale + free).
    pub ceiling: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial: 512,
            low_water: 64,
            batch: 128,
            ceiling: 4096,
        }
    }
}

/// Grid, sampling and seeding parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Cell edge length at octave 0, in local units.
    pub cell_size: f64,
    /// Number of octaves (clamped to `MAX_OCTAVES`).
    pub octaves: u8,
    /// Target rejection-sampling attempts per octave footprint.
    pub density: u32,
    /// Sampling attempts allowed per frame across all chunks.
    pub spawn_budget: u32,
    /// Global seed mixed into every chunk's RNG.
    pub seed: u64,
    /// Threads in the engine's frame pool; 0 lets rayon decide.
    pub worker_threads: usize,
    pub pool: PoolConfig,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            cell_size: 32.0,
            octaves: 4,
            density: 12_500,
            spawn_budget: 5_000,
            seed: 0,
            worker_threads: 0,
            pool: PoolConfig::default(),
        }
    }
}

impl StreamingConfig {
    /// Octaves actually used: zero when the grid is unusable.
    pub fn octave_count(&self) -> u8 {
        if self.cell_size.is_finite() && self.cell_size > 0.0 {
            self.octaves.min(MAX_OCTAVES)
        } else {
            0
        }
    }

    /// Edge length of cells at `octave`.
    pub fn cell_size_at(&self, octave: u8) -> f64 {
        self.cell_size * f64::from(1u32 << octave.min(31))
    }

    /// Sampling attempts each chunk is entitled to.
    pub fn sample_quota(&self) -> u32 {
        (self.density / CELLS_PER_OCTAVE).max(1)
    }
}

/// Procedural per-particle drift.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Maximum displacement from the spawn position.
    pub distance: f64,
    /// Angular speed of the drift cycle (radians per second).
    pub speed: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            distance: 0.25,
            speed: 0.1,
        }
    }
}

/// Proximity search settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub enabled: bool,
    /// Query radius in local units.
    pub radius: f64,
    /// Particles tested per frame.
    pub speed: u32,
    /// Maximum number of results held.
    pub capacity: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            radius: 10.0,
            speed: 2048,
            capacity: 64,
        }
    }
}

/// Settings forwarded to the rendering backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Particle radius at octave 0; doubles per octave.
    pub particle_radius: f32,
    /// Render layer; viewers whose mask excludes it skip the ring.
    pub layer: u8,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            particle_radius: 0.05,
            layer: 0,
        }
    }
}

/// Complete ring configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    pub shape: RingShape,
    pub streaming: StreamingConfig,
    pub drift: DriftConfig,
    pub search: SearchConfig,
    pub render: RenderConfig,
}

impl RingConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&json)?;
        log::info!("Loaded ring config from {}", path.display());
        Ok(config)
    }

    /// Save as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Problems that degrade the ring. None of them are fatal: the engine
    /// renders nothing (or less) instead of failing.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let s = &self.streaming;

        if !(s.cell_size.is_finite() && s.cell_size > 0.0) {
            problems.push(format!("cell_size must be positive, got {}", s.cell_size));
        }
        if s.octaves == 0 {
            problems.push("octaves is 0, no cells will be selected".to_string());
        } else if s.octaves > MAX_OCTAVES {
            problems.push(format!("octaves {} clamped to {}", s.octaves, MAX_OCTAVES));
        }
        if s.spawn_budget == 0 {
            problems.push("spawn_budget is 0, chunks will never fill".to_string());
        }
        if s.pool.ceiling < s.pool.initial {
            problems.push(format!(
                "pool ceiling {} is below initial size {}",
                s.pool.ceiling, s.pool.initial
            ));
        }
        if !(self.shape.outer_radius > self.shape.inner_radius) {
            problems.push(format!(
                "outer_radius {} must exceed inner_radius {}",
                self.shape.outer_radius, self.shape.inner_radius
            ));
        }
        if !(self.shape.thickness > 0.0) {
            problems.push(format!("thickness must be positive, got {}", self.shape.thickness));
        }
        if self.search.enabled && (self.search.capacity == 0 || self.search.speed == 0) {
            problems.push("search enabled with zero capacity or speed".to_string());
        }

        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(RingConfig::default().validate().is_empty());
    }

    #[test]
    fn test_quota_clamped_to_one() {
        let mut s = StreamingConfig::default();
        s.density = 12_500;
        assert_eq!(s.sample_quota(), 100);
        s.density = 3;
        assert_eq!(s.sample_quota(), 1);
    }

    #[test]
    fn test_octave_count_degrades() {
        let mut s = StreamingConfig::default();
        s.octaves = 20;
        assert_eq!(s.octave_count(), MAX_OCTAVES);
        s.cell_size = 0.0;
        assert_eq!(s.octave_count(), 0);
        s.cell_size = f64::NAN;
        assert_eq!(s.octave_count(), 0);
    }

    #[test]
    fn test_cell_size_doubles_per_octave() {
        let s = StreamingConfig { cell_size: 10.0, ..Default::default() };
        assert_eq!(s.cell_size_at(0), 10.0);
        assert_eq!(s.cell_size_at(3), 80.0);
    }

    #[test]
    fn test_validate_reports_problems() {
        let mut config = RingConfig::default();
        config.streaming.cell_size = -1.0;
        config.streaming.octaves = 0;
        config.shape.inner_radius = 300.0;
        assert_eq!(config.validate().len(), 3);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = RingConfig::from_json_str(
            r#"{ "shape": { "inner_radius": 50.0 }, "streaming": { "seed": 42 } }"#,
        ).unwrap();
        assert_eq!(config.shape.inner_radius, 50.0);
        assert_eq!(config.shape.outer_radius, RingShape::default().outer_radius);
        assert_eq!(config.streaming.seed, 42);
    }

    #[test]
    fn test_bad_json_is_error() {
        assert!(RingConfig::from_json_str("{ not json").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rings").join("saturn.json");

        let mut config = RingConfig::default();
        config.streaming.seed = 7;
        config.search.enabled = true;
        config.save(&path).unwrap();

        let loaded = RingConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = RingConfig::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, crate::core::Error::Io(_)));
    }
}

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::math::{Rotator, Vec3};
use crate::record::ArchetypeId;

pub const MIN_UPDATE_RATE_SECONDS: f32 = 0.025;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config json: {source}")]
    Parse {
        #[source]
        source: serde_json::Error,
    },
    #[error("parse config json at {path}: {source}")]
    ParseAt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("config validation failed at {path}: {message}")]
    Invalid { path: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerRadii {
    pub first: f32,
    pub second: f32,
    pub third: f32,
    /// Added to `first` to form the foreground keep-alive boundary.
    pub offset: f32,
}

impl Default for LayerRadii {
    fn default() -> Self {
        Self {
            first: 3000.0,
            second: 15000.0,
            third: 30000.0,
            offset: 500.0,
        }
    }
}

impl LayerRadii {
    pub fn validate(&self, path: &str) -> Result<(), ConfigError> {
        let fields = [
            ("first", self.first),
            ("second", self.second),
            ("third", self.third),
            ("offset", self.offset),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid {
                    path: format!("{path}.{name}"),
                    message: format!("expected finite non-negative radius, got {value}"),
                });
            }
        }
        if self.first > self.second || self.second > self.third {
            return Err(ConfigError::Invalid {
                path: path.to_string(),
                message: format!(
                    "expected first <= second <= third, got {} / {} / {}",
                    self.first, self.second, self.third
                ),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerEntityConfig {
    pub wander: bool,
    pub wander_radius: f32,
    pub speed: f32,
    /// Height added to path targets and to the spawn location of pawns.
    pub ground_offset_z: f32,
    pub override_layers: bool,
    pub layers: LayerRadii,
    pub random_yaw_on_spawn: bool,
    pub random_pitch_on_spawn: bool,
    pub random_roll_on_spawn: bool,
    pub pivot_offset_location: Vec3,
    pub pivot_offset_rotation: Rotator,
    pub instance_visual: Option<String>,
    pub use_roads: bool,
    pub use_interesting_places: bool,
    pub accessible_road_tags: Vec<String>,
    pub max_distance_search_road: f32,
    /// Demotion leaves the live entity in the host world instead of destroying it.
    pub population_control_support: bool,
}

impl Default for PerEntityConfig {
    fn default() -> Self {
        Self {
            wander: true,
            wander_radius: 3000.0,
            speed: 600.0,
            ground_offset_z: 80.0,
            override_layers: false,
            layers: LayerRadii::default(),
            random_yaw_on_spawn: false,
            random_pitch_on_spawn: false,
            random_roll_on_spawn: false,
            pivot_offset_location: Vec3::ZERO,
            pivot_offset_rotation: Rotator::ZERO,
            instance_visual: None,
            use_roads: false,
            use_interesting_places: false,
            accessible_road_tags: Vec::new(),
            max_distance_search_road: 2000.0,
            population_control_support: false,
        }
    }
}

impl PerEntityConfig {
    /// Per-entity radii when overridden, else the director defaults.
    pub fn effective_layers<'a>(&'a self, defaults: &'a LayerRadii) -> &'a LayerRadii {
        if self.override_layers {
            &self.layers
        } else {
            defaults
        }
    }

    pub fn randomizes_spawn_rotation(&self) -> bool {
        self.random_yaw_on_spawn || self.random_pitch_on_spawn || self.random_roll_on_spawn
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub sleep_ms: u64,
    pub startup_delay_ms: u64,
    pub near_batch: usize,
    pub far_batch: usize,
    /// Ticks skipped between two budgeted waypoint passes.
    pub skip_ticks: u32,
    pub arrival_tolerance: f32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            sleep_ms: 10,
            startup_delay_ms: 500,
            near_batch: 15,
            far_batch: 5,
            skip_ticks: 1,
            arrival_tolerance: 10.0,
        }
    }
}

impl WorkerConfig {
    pub fn sleep_interval(&self) -> Duration {
        Duration::from_millis(self.sleep_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorConfig {
    pub layers: LayerRadii,
    pub observer_archetypes: Vec<ArchetypeId>,
    pub update_rate_seconds: f32,
    pub debug: bool,
    pub use_instance_simulate: bool,
    pub max_distance_show_simulation: f32,
    pub instance_cast_shadows: bool,
    pub rng_seed: Option<u64>,
    pub worker: WorkerConfig,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            layers: LayerRadii::default(),
            observer_archetypes: Vec::new(),
            update_rate_seconds: 0.2,
            debug: false,
            use_instance_simulate: false,
            max_distance_show_simulation: 15000.0,
            instance_cast_shadows: false,
            rng_seed: None,
            worker: WorkerConfig::default(),
        }
    }
}

impl DirectorConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let config = match serde_path_to_error::deserialize::<_, DirectorConfig>(&mut deserializer)
        {
            Ok(config) => config,
            Err(error) => {
                let path = error.path().to_string();
                let source = error.into_inner();
                if path.is_empty() || path == "." {
                    return Err(ConfigError::Parse { source });
                }
                return Err(ConfigError::ParseAt { path, source });
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.layers.validate("layers")?;
        if !self.update_rate_seconds.is_finite()
            || self.update_rate_seconds < MIN_UPDATE_RATE_SECONDS
        {
            return Err(ConfigError::Invalid {
                path: "update_rate_seconds".to_string(),
                message: format!(
                    "expected at least {MIN_UPDATE_RATE_SECONDS}, got {}",
                    self.update_rate_seconds
                ),
            });
        }
        if !self.max_distance_show_simulation.is_finite() || self.max_distance_show_simulation < 0.0
        {
            return Err(ConfigError::Invalid {
                path: "max_distance_show_simulation".to_string(),
                message: format!(
                    "expected finite non-negative distance, got {}",
                    self.max_distance_show_simulation
                ),
            });
        }
        if self.worker.near_batch == 0 || self.worker.far_batch == 0 {
            return Err(ConfigError::Invalid {
                path: "worker".to_string(),
                message: "near_batch and far_batch must be at least 1".to_string(),
            });
        }
        if !self.worker.arrival_tolerance.is_finite() || self.worker.arrival_tolerance < 0.0 {
            return Err(ConfigError::Invalid {
                path: "worker.arrival_tolerance".to_string(),
                message: format!(
                    "expected finite non-negative tolerance, got {}",
                    self.worker.arrival_tolerance
                ),
            });
        }
        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs_f32(self.update_rate_seconds.max(MIN_UPDATE_RATE_SECONDS))
    }
}

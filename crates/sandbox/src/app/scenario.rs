use std::fs;
use std::path::Path;

use director::{
    ArchetypeId, DirectorConfig, EntityKind, InterestingPlace, PerEntityConfig, Vec3,
};
use serde::Deserialize;

use super::SandboxError;

/// Everything the sandbox needs to stand up a world: director config, terrain,
/// scripted observers, initial population and world features.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Scenario {
    pub(crate) director: DirectorConfig,
    pub(crate) grid: GridSpec,
    pub(crate) observers: Vec<ObserverSpec>,
    pub(crate) populations: Vec<PopulationSpec>,
    pub(crate) places: Vec<InterestingPlace>,
    pub(crate) roads: Vec<RoadSpec>,
    pub(crate) run: RunSpec,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct GridSpec {
    pub(crate) origin: Vec3,
    pub(crate) cell_size: f32,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) blocked: Vec<CellRect>,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            cell_size: 250.0,
            width: 64,
            height: 64,
            blocked: Vec::new(),
        }
    }
}

/// Rectangle of impassable cells, in cell coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub(crate) struct CellRect {
    pub(crate) x: u32,
    pub(crate) y: u32,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

impl CellRect {
    pub(crate) fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x
            && y >= self.y
            && x < self.x.saturating_add(self.width)
            && y < self.y.saturating_add(self.height)
    }
}

/// An observer that loops over a fixed route.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct ObserverSpec {
    pub(crate) archetype: ArchetypeId,
    pub(crate) speed: f32,
    pub(crate) route: Vec<Vec3>,
}

impl Default for ObserverSpec {
    fn default() -> Self {
        Self {
            archetype: ArchetypeId(0),
            speed: 1200.0,
            route: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct PopulationSpec {
    pub(crate) name: String,
    pub(crate) archetype: ArchetypeId,
    pub(crate) kind: EntityKind,
    pub(crate) count: usize,
    pub(crate) center: Vec3,
    pub(crate) radius: f32,
    pub(crate) config: PerEntityConfig,
}

impl Default for PopulationSpec {
    fn default() -> Self {
        Self {
            name: "entity".to_string(),
            archetype: ArchetypeId(1),
            kind: EntityKind::Pawn,
            count: 0,
            center: Vec3::ZERO,
            radius: 1000.0,
            config: PerEntityConfig::default(),
        }
    }
}

/// Road authored as a polyline; points are resampled onto the grid at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct RoadSpec {
    pub(crate) name: String,
    pub(crate) tags: Vec<String>,
    pub(crate) polyline: Vec<Vec3>,
    pub(crate) spacing: f32,
    pub(crate) snap_radius: f32,
    pub(crate) attraction_chance: f32,
    pub(crate) max_walking_points: usize,
    pub(crate) radius_random_point_near_point: f32,
}

impl Default for RoadSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            tags: Vec::new(),
            polyline: Vec::new(),
            spacing: 500.0,
            snap_radius: 100.0,
            attraction_chance: 100.0,
            max_walking_points: 10,
            radius_random_point_near_point: 50.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct RunSpec {
    pub(crate) ticks: u32,
    pub(crate) max_ticks_per_frame: u32,
    /// Sleep between frames; off runs ticks back to back.
    pub(crate) real_time: bool,
    pub(crate) save_slot: String,
    pub(crate) save_index: u32,
    pub(crate) save_at_tick: Option<u32>,
    pub(crate) reload_after_save: bool,
}

impl Default for RunSpec {
    fn default() -> Self {
        Self {
            ticks: 300,
            max_ticks_per_frame: 4,
            real_time: true,
            save_slot: "sandbox".to_string(),
            save_index: 0,
            save_at_tick: None,
            reload_after_save: false,
        }
    }
}

impl Scenario {
    pub(crate) fn load(path: &Path) -> Result<Self, SandboxError> {
        let raw = fs::read_to_string(path).map_err(|source| SandboxError::ReadScenario {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub(crate) fn from_json_str(raw: &str) -> Result<Self, SandboxError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let scenario = serde_path_to_error::deserialize::<_, Scenario>(&mut deserializer)
            .map_err(|error| {
                let path = error.path().to_string();
                let source = error.into_inner();
                if path.is_empty() || path == "." {
                    SandboxError::Parse { source }
                } else {
                    SandboxError::ParseAt { path, source }
                }
            })?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> Result<(), SandboxError> {
        self.director.validate()?;

        if self.grid.width == 0 || self.grid.height == 0 {
            return Err(invalid(
                "grid",
                format!(
                    "expected non-empty grid, got {}x{}",
                    self.grid.width, self.grid.height
                ),
            ));
        }
        if !self.grid.cell_size.is_finite() || self.grid.cell_size <= 0.0 {
            return Err(invalid(
                "grid.cell_size",
                format!("expected positive cell size, got {}", self.grid.cell_size),
            ));
        }

        for (index, observer) in self.observers.iter().enumerate() {
            if observer.route.is_empty() {
                return Err(invalid(
                    format!("observers[{index}].route"),
                    "expected at least one route point",
                ));
            }
            if !observer.speed.is_finite() || observer.speed < 0.0 {
                return Err(invalid(
                    format!("observers[{index}].speed"),
                    format!("expected finite non-negative speed, got {}", observer.speed),
                ));
            }
        }

        for (index, population) in self.populations.iter().enumerate() {
            if population.name.trim().is_empty() {
                return Err(invalid(
                    format!("populations[{index}].name"),
                    "expected non-empty name prefix",
                ));
            }
            if !population.radius.is_finite() || population.radius < 0.0 {
                return Err(invalid(
                    format!("populations[{index}].radius"),
                    format!(
                        "expected finite non-negative radius, got {}",
                        population.radius
                    ),
                ));
            }
            if population.config.override_layers {
                population
                    .config
                    .layers
                    .validate(&format!("populations[{index}].config.layers"))?;
            }
        }

        if self.run.save_slot.trim().is_empty() {
            return Err(invalid("run.save_slot", "expected non-empty slot name"));
        }
        Ok(())
    }
}

fn invalid(path: impl Into<String>, message: impl Into<String>) -> SandboxError {
    SandboxError::Invalid {
        path: path.into(),
        message: message.into(),
    }
}

use std::env;
use std::path::{Path, PathBuf};

use director::{RoadPath, WorldDirector, WorldFeatures};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::actors::SandboxActors;
use super::nav::GridNavigation;
use super::scenario::{RoadSpec, RunSpec, Scenario};
use super::SandboxError;

const SCENARIO_ENV_VAR: &str = "DIRECTOR_SANDBOX_SCENARIO";
const SAVE_DIR_ENV_VAR: &str = "DIRECTOR_SANDBOX_SAVE_DIR";
const DEFAULT_SCENARIO: &str = "assets/sandbox.json";
const DEFAULT_SAVE_DIR_NAME: &str = "director-sandbox";

pub(crate) type SandboxDirector = WorldDirector<SandboxActors, GridNavigation>;

pub(crate) struct AppWiring {
    pub(crate) director: SandboxDirector,
    pub(crate) run: RunSpec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SandboxPaths {
    pub(crate) scenario: PathBuf,
    pub(crate) save_dir: PathBuf,
}

pub(crate) fn build_app() -> Result<AppWiring, SandboxError> {
    init_tracing();
    info!("=== Director Sandbox Startup ===");

    let paths = resolve_paths(env::args().skip(1), |var| env::var(var).ok());
    info!(
        scenario = %paths.scenario.display(),
        save_dir = %paths.save_dir.display(),
        "sandbox_paths_resolved"
    );
    let scenario = Scenario::load(&paths.scenario)?;
    build_from_scenario(scenario, paths.save_dir)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

/// First positional argument, then the environment, then the bundled defaults.
/// The second positional argument overrides the save directory the same way.
pub(crate) fn resolve_paths(
    mut args: impl Iterator<Item = String>,
    lookup_env: impl Fn(&str) -> Option<String>,
) -> SandboxPaths {
    let scenario = args
        .next()
        .or_else(|| lookup_env(SCENARIO_ENV_VAR))
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_SCENARIO));
    let save_dir = args
        .next()
        .or_else(|| lookup_env(SAVE_DIR_ENV_VAR))
        .map(PathBuf::from)
        .unwrap_or_else(|| env::temp_dir().join(DEFAULT_SAVE_DIR_NAME));
    SandboxPaths { scenario, save_dir }
}

pub(crate) fn build_from_scenario(
    scenario: Scenario,
    save_dir: PathBuf,
) -> Result<AppWiring, SandboxError> {
    let mut nav = GridNavigation::from_spec(&scenario.grid, scenario.director.rng_seed);

    let roads: Vec<RoadPath> = scenario
        .roads
        .iter()
        .filter_map(|spec| build_road(spec, &mut nav))
        .collect();
    let features = WorldFeatures {
        places: scenario.places,
        roads,
    };

    let mut actors = SandboxActors::new(&scenario.observers);
    let handles = actors.populate(&scenario.populations, &mut nav);
    info!(
        walkable_cells = nav.walkable_cells(),
        spawned = handles.len(),
        observers = scenario.observers.len(),
        "sandbox_world_built"
    );

    let mut director = WorldDirector::new(scenario.director, actors, nav, features, save_dir)?;
    let registered = handles
        .into_iter()
        .filter(|handle| director.register_candidate(*handle))
        .count();
    info!(registered, "population_registered");

    Ok(AppWiring {
        director,
        run: scenario.run,
    })
}

fn build_road(spec: &RoadSpec, nav: &mut GridNavigation) -> Option<RoadPath> {
    let points = RoadPath::from_polyline(&spec.polyline, spec.spacing, spec.snap_radius, nav);
    if points.is_empty() {
        warn!(road = %spec.name, "road_has_no_navigable_points");
        return None;
    }
    Some(RoadPath {
        name: spec.name.clone(),
        tags: spec.tags.clone(),
        points,
        attraction_chance: spec.attraction_chance,
        max_walking_points: spec.max_walking_points,
        radius_random_point_near_point: spec.radius_random_point_near_point,
    })
}

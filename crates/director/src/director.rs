use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bridge::{ActorLayer, EntityHandle, ForegroundBridge};
use crate::classifier::keeps_foreground;
use crate::config::{ConfigError, DirectorConfig};
use crate::features::WorldFeatures;
use crate::instancing::visible_instances;
use crate::persistence::{read_save, save_path, write_save, PersistenceError, SaveState};
use crate::record::EntityRecord;
use crate::waypoint::{NavigationService, Resolution, WaypointResolver};
use crate::worker::{BackgroundWorker, WorkerError, WorkerMetricsSnapshot};

#[derive(Debug, Error)]
pub enum DirectorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
}

/// Counts from one owning-thread tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub observers: usize,
    pub demoted: usize,
    pub promoted: usize,
    pub waypoints_resolved: usize,
    pub waypoints_deferred: usize,
    pub instances: usize,
}

/// Owning-thread side of the background population: demotes entities that leave
/// every observer, resolves waypoints for the worker and promotes returning ones.
pub struct WorldDirector<A: ActorLayer, N: NavigationService> {
    config: DirectorConfig,
    actors: A,
    nav: N,
    features: WorldFeatures,
    bridge: ForegroundBridge,
    worker: BackgroundWorker,
    rng: ChaCha8Rng,
    save_dir: PathBuf,
    background: Arc<Vec<EntityRecord>>,
}

impl<A: ActorLayer, N: NavigationService> WorldDirector<A, N> {
    pub fn new(
        config: DirectorConfig,
        actors: A,
        nav: N,
        features: WorldFeatures,
        save_dir: impl Into<PathBuf>,
    ) -> Result<Self, DirectorError> {
        config.validate()?;
        let worker = BackgroundWorker::start(config.layers, &config.worker)?;
        let rng = match config.rng_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let save_dir = save_dir.into();
        info!(
            observers = config.observer_archetypes.len(),
            places = features.places.len(),
            roads = features.roads.len(),
            save_dir = %save_dir.display(),
            "director_started"
        );

        Ok(Self {
            bridge: ForegroundBridge::default(),
            config,
            actors,
            nav,
            features,
            worker,
            rng,
            save_dir,
            background: Arc::default(),
        })
    }

    pub fn config(&self) -> &DirectorConfig {
        &self.config
    }

    pub fn actors(&self) -> &A {
        &self.actors
    }

    pub fn actors_mut(&mut self) -> &mut A {
        &mut self.actors
    }

    pub fn features_mut(&mut self) -> &mut WorldFeatures {
        &mut self.features
    }

    pub fn registered(&self) -> &[EntityHandle] {
        self.bridge.registered()
    }

    pub fn demoted_names(&self) -> &[String] {
        self.bridge.demoted_names()
    }

    /// Background records as of the last tick's exchange.
    pub fn background(&self) -> &[EntityRecord] {
        &self.background
    }

    pub fn worker_metrics(&self) -> WorkerMetricsSnapshot {
        self.worker.metrics().snapshot()
    }

    /// Hands a live entity to the director. `false` when it is dead or already known.
    pub fn register_candidate(&mut self, handle: EntityHandle) -> bool {
        if !self.actors.is_alive(handle) {
            return false;
        }
        self.bridge.register(handle)
    }

    /// Stops tracking a live entity without touching it.
    pub fn remove_entity(&mut self, handle: EntityHandle) -> bool {
        self.bridge.unregister(handle)
    }

    pub fn background_entity_count(&self) -> usize {
        self.worker.exchange().background_count()
    }

    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        self.bridge.prune_stale(&self.actors);
        let actors = &self.actors;
        let pruned = self
            .features
            .prune_dead_places(|handle| actors.is_alive(handle));
        if pruned > 0 {
            debug!(pruned, "interesting_places_pruned");
        }

        let observers = self
            .actors
            .observer_locations(&self.config.observer_archetypes);
        report.observers = observers.len();
        if observers.is_empty() {
            return report;
        }

        let mut demotions = Vec::new();
        for handle in self.bridge.registered().to_vec() {
            let Some(captured) = self.actors.capture_entity(handle) else {
                continue;
            };
            let layers = captured.config.effective_layers(&self.config.layers);
            if keeps_foreground(captured.transform.location, &observers, layers) {
                continue;
            }
            if let Some(record) = self.bridge.demote(&mut self.actors, handle) {
                demotions.push(record);
            }
        }
        report.demoted = demotions.len();

        let first_observer = observers[0];
        let exchange = self.worker.exchange().exchange_main(demotions, observers);

        let mut requests = exchange.waypoint_requests;
        if !requests.is_empty() {
            let mut resolver = WaypointResolver::new(&mut self.nav, &self.features, &mut self.rng);
            for request in &mut requests {
                match resolver.resolve(request) {
                    Resolution::Deferred | Resolution::Skipped => report.waypoints_deferred += 1,
                    _ => report.waypoints_resolved += 1,
                }
            }
        }
        self.worker.exchange().exchange_waypoints_and_unlock(requests);

        let mut retry = Vec::new();
        for record in exchange.promotions {
            match self.bridge.promote(&mut self.actors, &mut self.rng, &record) {
                Ok(_) => report.promoted += 1,
                Err(error) => {
                    warn!(%error, "promotion_returned_to_background");
                    retry.push(record);
                }
            }
        }
        if !retry.is_empty() {
            self.worker.exchange().enqueue_demotions(retry);
        }

        self.background = exchange.background;
        if self.config.use_instance_simulate {
            let instances = visible_instances(
                self.background.iter(),
                first_observer,
                self.config.max_distance_show_simulation,
                self.config.instance_cast_shadows,
            );
            report.instances = instances.len();
            self.actors.update_instances(&instances);
        }

        if self.config.debug {
            info!(
                demoted = report.demoted,
                promoted = report.promoted,
                resolved = report.waypoints_resolved,
                deferred = report.waypoints_deferred,
                background = self.background.len(),
                "director_tick"
            );
        }
        report
    }

    pub fn save(&mut self, slot: &str, index: u32) -> bool {
        match self.try_save(slot, index) {
            Ok(path) => {
                info!(path = %path.display(), "save_written");
                true
            }
            Err(error) => {
                warn!(%error, slot, index, "save_failed");
                false
            }
        }
    }

    pub fn load(&mut self, slot: &str, index: u32) -> bool {
        match self.try_load(slot, index) {
            Ok(count) => {
                info!(slot, index, background = count, "save_loaded");
                true
            }
            Err(error) => {
                warn!(%error, slot, index, "load_failed");
                false
            }
        }
    }

    /// Demotes every foreground entity and writes the whole pool to disk.
    pub fn try_save(&mut self, slot: &str, index: u32) -> Result<PathBuf, PersistenceError> {
        let path = save_path(&self.save_dir, slot, index)?;
        if !self.worker.pause() {
            self.worker.resume();
            return Err(PersistenceError::WorkerUnavailable);
        }
        let result = self.write_paused(&path);
        self.worker.resume();
        result.map(|()| path)
    }

    /// Replaces the pool with a saved one. The save is validated before anything
    /// live is touched.
    pub fn try_load(&mut self, slot: &str, index: u32) -> Result<usize, PersistenceError> {
        let path = save_path(&self.save_dir, slot, index)?;
        let state = read_save(&path)?;
        if !self.worker.pause() {
            self.worker.resume();
            return Err(PersistenceError::WorkerUnavailable);
        }

        let destroyed = self.bridge.destroy_registered(&mut self.actors);
        let (pool, demoted_names) = state.into_parts();
        let count = pool.background.len();
        self.background = Arc::new(pool.background.clone());
        self.worker.exchange().replace(pool);
        self.bridge.replace_demoted_names(demoted_names);
        self.worker.resume();

        debug!(destroyed, "foreground_cleared_for_load");
        Ok(count)
    }

    fn write_paused(&mut self, path: &Path) -> Result<(), PersistenceError> {
        let mut demotions = Vec::new();
        for handle in self.bridge.registered().to_vec() {
            if let Some(record) = self.bridge.demote(&mut self.actors, handle) {
                demotions.push(record);
            }
        }
        self.worker.exchange().enqueue_demotions(demotions);

        let state = SaveState::new(
            self.worker.exchange().snapshot(),
            self.bridge.demoted_names().to_vec(),
        );
        write_save(path, &state)
    }

    pub fn shutdown(&mut self) {
        self.worker.shutdown();
    }
}

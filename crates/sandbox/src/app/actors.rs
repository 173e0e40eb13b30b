use std::collections::BTreeMap;

use director::{
    ActorLayer, ArchetypeId, CapturedEntity, EntityHandle, EntityKind, EntityRecord,
    InstanceTransform, NavigationService, PerEntityConfig, Promoted, Transform, Vec3,
};
use tracing::{debug, trace};

use super::scenario::{ObserverSpec, PopulationSpec};

const ROUTE_ARRIVAL_TOLERANCE: f32 = 1.0;

#[derive(Debug, Clone)]
struct SandboxEntity {
    display_name: String,
    unique_name: Option<String>,
    archetype: ArchetypeId,
    kind: EntityKind,
    transform: Transform,
    spawn_location: Vec3,
    config: PerEntityConfig,
}

#[derive(Debug, Clone)]
pub(crate) struct ScriptedObserver {
    archetype: ArchetypeId,
    speed: f32,
    route: Vec<Vec3>,
    next_point: usize,
    location: Vec3,
}

impl ScriptedObserver {
    pub(crate) fn from_spec(spec: &ObserverSpec) -> Self {
        Self {
            archetype: spec.archetype,
            speed: spec.speed,
            location: spec.route.first().copied().unwrap_or(Vec3::ZERO),
            next_point: 1 % spec.route.len().max(1),
            route: spec.route.clone(),
        }
    }

    pub(crate) fn location(&self) -> Vec3 {
        self.location
    }

    fn advance(&mut self, dt: f32) {
        let Some(target) = self.route.get(self.next_point).copied() else {
            return;
        };
        self.location = self.location.move_towards_constant(target, dt, self.speed);
        if self.location.nearly_equals(target, ROUTE_ARRIVAL_TOLERANCE) {
            self.next_point = (self.next_point + 1) % self.route.len();
        }
    }
}

/// Tallies of what the director asked the world to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ActorStats {
    pub(crate) spawned: u64,
    pub(crate) destroyed: u64,
    pub(crate) demoted: u64,
    pub(crate) restored: u64,
    pub(crate) visible_instances: usize,
}

/// Headless host world: live entities in a map, observers on scripted routes.
#[derive(Debug, Default)]
pub(crate) struct SandboxActors {
    next_handle: u64,
    entities: BTreeMap<EntityHandle, SandboxEntity>,
    observers: Vec<ScriptedObserver>,
    stats: ActorStats,
}

impl SandboxActors {
    pub(crate) fn new(observers: &[ObserverSpec]) -> Self {
        Self {
            observers: observers.iter().map(ScriptedObserver::from_spec).collect(),
            ..Self::default()
        }
    }

    pub(crate) fn live_count(&self) -> usize {
        self.entities.len()
    }

    pub(crate) fn stats(&self) -> ActorStats {
        self.stats
    }

    pub(crate) fn observers(&self) -> &[ScriptedObserver] {
        &self.observers
    }

    pub(crate) fn advance_observers(&mut self, dt: f32) {
        for observer in &mut self.observers {
            observer.advance(dt);
        }
    }

    /// Spawns every population onto navigable ground. Members that find no
    /// walkable spot are skipped.
    pub(crate) fn populate<N: NavigationService + ?Sized>(
        &mut self,
        populations: &[PopulationSpec],
        nav: &mut N,
    ) -> Vec<EntityHandle> {
        let mut handles = Vec::new();
        for population in populations {
            for index in 0..population.count {
                let Some(location) =
                    nav.find_random_point_in_radius(population.center, population.radius)
                else {
                    debug!(population = %population.name, index, "population_member_unplaced");
                    continue;
                };
                let handle = self.insert(SandboxEntity {
                    display_name: format!("{}_{index:03}", population.name),
                    unique_name: None,
                    archetype: population.archetype,
                    kind: population.kind,
                    transform: Transform {
                        location,
                        ..Transform::default()
                    },
                    spawn_location: location,
                    config: population.config.clone(),
                });
                handles.push(handle);
            }
        }
        handles
    }

    fn insert(&mut self, entity: SandboxEntity) -> EntityHandle {
        self.next_handle += 1;
        let handle = EntityHandle(self.next_handle);
        self.entities.insert(handle, entity);
        self.stats.spawned += 1;
        handle
    }
}

impl ActorLayer for SandboxActors {
    fn spawn_entity(
        &mut self,
        archetype: ArchetypeId,
        transform: &Transform,
    ) -> Option<EntityHandle> {
        let handle = self.insert(SandboxEntity {
            display_name: format!("spawned_{}", self.next_handle + 1),
            unique_name: None,
            archetype,
            kind: EntityKind::Pawn,
            transform: *transform,
            spawn_location: transform.location,
            config: PerEntityConfig::default(),
        });
        trace!(handle = handle.0, archetype = archetype.0, "entity_spawned");
        Some(handle)
    }

    fn destroy_entity(&mut self, handle: EntityHandle) {
        if self.entities.remove(&handle).is_some() {
            self.stats.destroyed += 1;
        }
    }

    fn is_alive(&self, handle: EntityHandle) -> bool {
        self.entities.contains_key(&handle)
    }

    fn observer_locations(&self, observer_archetypes: &[ArchetypeId]) -> Vec<Vec3> {
        self.observers
            .iter()
            .filter(|observer| observer_archetypes.contains(&observer.archetype))
            .map(ScriptedObserver::location)
            .collect()
    }

    fn capture_entity(&self, handle: EntityHandle) -> Option<CapturedEntity> {
        self.entities.get(&handle).map(|entity| CapturedEntity {
            display_name: entity.display_name.clone(),
            unique_name: entity.unique_name.clone(),
            archetype: Some(entity.archetype),
            kind: entity.kind,
            transform: entity.transform,
            spawn_location: entity.spawn_location,
            config: entity.config.clone(),
        })
    }

    fn restore_entity(&mut self, handle: EntityHandle, record: &EntityRecord) {
        if let Some(entity) = self.entities.get_mut(&handle) {
            entity.unique_name = Some(record.unique_name.clone());
            entity.kind = record.kind;
            entity.spawn_location = record.spawn_location;
            entity.config = record.config.clone();
        }
    }

    fn on_demoted(&mut self, _handle: EntityHandle) {
        self.stats.demoted += 1;
    }

    fn on_restored(&mut self, _promoted: &Promoted) {
        self.stats.restored += 1;
    }

    fn update_instances(&mut self, instances: &[InstanceTransform]) {
        self.stats.visible_instances = instances.len();
    }
}

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::PerEntityConfig;
use crate::instancing::InstanceTransform;
use crate::math::{Rotator, Transform, Vec3};
use crate::record::{ArchetypeId, EntityKind, EntityRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityHandle(pub u64);

/// Live state read off a foreground entity when it leaves the foreground.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedEntity {
    pub display_name: String,
    /// Name assigned by a previous promotion; `None` for entities never demoted before.
    pub unique_name: Option<String>,
    pub archetype: Option<ArchetypeId>,
    pub kind: EntityKind,
    pub transform: Transform,
    pub spawn_location: Vec3,
    pub config: PerEntityConfig,
}

impl CapturedEntity {
    pub fn resolved_name(&self) -> &str {
        match self.unique_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.display_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Promoted {
    pub name: String,
    pub handle: EntityHandle,
    /// Position of the name in the demoted-name list, when it was there.
    pub demoted_index: Option<usize>,
}

/// The host world as seen by the director. All calls happen on the owning thread.
pub trait ActorLayer {
    fn spawn_entity(&mut self, archetype: ArchetypeId, transform: &Transform)
        -> Option<EntityHandle>;

    fn destroy_entity(&mut self, handle: EntityHandle);

    fn is_alive(&self, handle: EntityHandle) -> bool;

    fn observer_locations(&self, observer_archetypes: &[ArchetypeId]) -> Vec<Vec3>;

    fn capture_entity(&self, handle: EntityHandle) -> Option<CapturedEntity>;

    /// Copies config, spawn origin and unique name onto a freshly spawned entity.
    fn restore_entity(&mut self, handle: EntityHandle, record: &EntityRecord);

    fn on_demoted(&mut self, _handle: EntityHandle) {}

    fn on_restored(&mut self, _promoted: &Promoted) {}

    fn update_instances(&mut self, _instances: &[InstanceTransform]) {}
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromoteError {
    #[error("entity {name} has no archetype")]
    MissingArchetype { name: String },
    #[error("actor layer refused to spawn {name}")]
    SpawnRefused { name: String },
}

#[derive(Debug, Default)]
pub struct ForegroundBridge {
    registered: Vec<EntityHandle>,
    demoted_names: Vec<String>,
}

impl ForegroundBridge {
    pub fn register(&mut self, handle: EntityHandle) -> bool {
        if self.registered.contains(&handle) {
            return false;
        }
        self.registered.push(handle);
        true
    }

    pub fn unregister(&mut self, handle: EntityHandle) -> bool {
        let before = self.registered.len();
        self.registered.retain(|candidate| *candidate != handle);
        before != self.registered.len()
    }

    pub fn registered(&self) -> &[EntityHandle] {
        &self.registered
    }

    pub fn demoted_names(&self) -> &[String] {
        &self.demoted_names
    }

    pub fn replace_demoted_names(&mut self, names: Vec<String>) {
        self.demoted_names = names;
    }

    pub fn prune_stale<A: ActorLayer + ?Sized>(&mut self, actors: &A) -> usize {
        let before = self.registered.len();
        self.registered.retain(|handle| {
            let alive = actors.is_alive(*handle);
            if !alive {
                warn!(handle = handle.0, "stale_foreground_handle_pruned");
            }
            alive
        });
        before - self.registered.len()
    }

    /// Captures a registered entity into a background record and unregisters it.
    pub fn demote<A: ActorLayer + ?Sized>(
        &mut self,
        actors: &mut A,
        handle: EntityHandle,
    ) -> Option<EntityRecord> {
        if !self.unregister(handle) {
            return None;
        }
        let Some(captured) = actors.capture_entity(handle) else {
            warn!(handle = handle.0, "demotion_capture_failed");
            return None;
        };

        let name = captured.resolved_name().to_string();
        let keep_live = captured.config.population_control_support;
        let record = EntityRecord::new(
            name.clone(),
            captured.archetype,
            captured.kind,
            captured.transform,
            captured.spawn_location,
            captured.config,
        );
        self.demoted_names.push(name);
        actors.on_demoted(handle);
        if !keep_live {
            actors.destroy_entity(handle);
        }
        debug!(entity = %record.unique_name, handle = handle.0, "entity_demoted");
        Some(record)
    }

    /// Spawns a live entity for `record` and registers it as foreground.
    pub fn promote<A: ActorLayer + ?Sized, R: Rng>(
        &mut self,
        actors: &mut A,
        rng: &mut R,
        record: &EntityRecord,
    ) -> Result<Promoted, PromoteError> {
        let Some(archetype) = record.archetype else {
            return Err(PromoteError::MissingArchetype {
                name: record.unique_name.clone(),
            });
        };

        let mut transform = record.transform();
        transform.rotation = spawn_rotation(&record.config, record.rotation, rng);
        if record.kind == EntityKind::Pawn {
            transform.location.z += record.config.ground_offset_z;
        }

        let Some(handle) = actors.spawn_entity(archetype, &transform) else {
            return Err(PromoteError::SpawnRefused {
                name: record.unique_name.clone(),
            });
        };
        actors.restore_entity(handle, record);
        self.register(handle);

        let demoted_index = self
            .demoted_names
            .iter()
            .position(|name| *name == record.unique_name);
        self.demoted_names.retain(|name| *name != record.unique_name);

        let promoted = Promoted {
            name: record.unique_name.clone(),
            handle,
            demoted_index,
        };
        actors.on_restored(&promoted);
        debug!(entity = %promoted.name, handle = handle.0, "entity_promoted");
        Ok(promoted)
    }

    /// Destroys every registered entity. Returns how many were destroyed.
    pub fn destroy_registered<A: ActorLayer + ?Sized>(&mut self, actors: &mut A) -> usize {
        let handles = std::mem::take(&mut self.registered);
        for handle in &handles {
            actors.destroy_entity(*handle);
        }
        handles.len()
    }
}

/// Flagged axes are drawn from 0..360 and the rest zeroed; no flags keeps `stored`.
pub fn spawn_rotation<R: Rng>(config: &PerEntityConfig, stored: Rotator, rng: &mut R) -> Rotator {
    if !config.randomizes_spawn_rotation() {
        return stored;
    }
    let mut axis = |enabled: bool| {
        if enabled {
            rng.gen_range(0.0f32..360.0)
        } else {
            0.0
        }
    };
    Rotator {
        pitch: axis(config.random_pitch_on_spawn),
        yaw: axis(config.random_yaw_on_spawn),
        roll: axis(config.random_roll_on_spawn),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[derive(Debug, Clone)]
    pub(crate) struct LiveEntity {
        pub(crate) captured: CapturedEntity,
    }

    /// In-memory actor layer that records every call.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingActors {
        pub(crate) next_handle: u64,
        pub(crate) live: BTreeMap<EntityHandle, LiveEntity>,
        pub(crate) observers: Vec<Vec3>,
        pub(crate) refuse_spawns: bool,
        pub(crate) demoted: Vec<EntityHandle>,
        pub(crate) restored: Vec<Promoted>,
        pub(crate) destroyed: Vec<EntityHandle>,
        pub(crate) instances: Vec<InstanceTransform>,
    }

    impl RecordingActors {
        pub(crate) fn insert(&mut self, name: &str, location: Vec3) -> EntityHandle {
            self.next_handle += 1;
            let handle = EntityHandle(self.next_handle);
            self.live.insert(
                handle,
                LiveEntity {
                    captured: CapturedEntity {
                        display_name: format!("{name}_display"),
                        unique_name: Some(name.to_string()),
                        archetype: Some(ArchetypeId(7)),
                        kind: EntityKind::Pawn,
                        transform: Transform {
                            location,
                            ..Transform::default()
                        },
                        spawn_location: location,
                        config: PerEntityConfig {
                            ground_offset_z: 0.0,
                            ..PerEntityConfig::default()
                        },
                    },
                },
            );
            handle
        }

        pub(crate) fn move_to(&mut self, handle: EntityHandle, location: Vec3) {
            if let Some(entity) = self.live.get_mut(&handle) {
                entity.captured.transform.location = location;
            }
        }

        pub(crate) fn names(&self) -> Vec<String> {
            self.live
                .values()
                .map(|entity| entity.captured.resolved_name().to_string())
                .collect()
        }
    }

    impl ActorLayer for RecordingActors {
        fn spawn_entity(
            &mut self,
            archetype: ArchetypeId,
            transform: &Transform,
        ) -> Option<EntityHandle> {
            if self.refuse_spawns {
                return None;
            }
            self.next_handle += 1;
            let handle = EntityHandle(self.next_handle);
            self.live.insert(
                handle,
                LiveEntity {
                    captured: CapturedEntity {
                        display_name: format!("spawned_{}", handle.0),
                        unique_name: None,
                        archetype: Some(archetype),
                        kind: EntityKind::Pawn,
                        transform: *transform,
                        spawn_location: transform.location,
                        config: PerEntityConfig::default(),
                    },
                },
            );
            Some(handle)
        }

        fn destroy_entity(&mut self, handle: EntityHandle) {
            self.live.remove(&handle);
            self.destroyed.push(handle);
        }

        fn is_alive(&self, handle: EntityHandle) -> bool {
            self.live.contains_key(&handle)
        }

        fn observer_locations(&self, _observer_archetypes: &[ArchetypeId]) -> Vec<Vec3> {
            self.observers.clone()
        }

        fn capture_entity(&self, handle: EntityHandle) -> Option<CapturedEntity> {
            self.live.get(&handle).map(|entity| entity.captured.clone())
        }

        fn restore_entity(&mut self, handle: EntityHandle, record: &EntityRecord) {
            if let Some(entity) = self.live.get_mut(&handle) {
                entity.captured.unique_name = Some(record.unique_name.clone());
                entity.captured.kind = record.kind;
                entity.captured.spawn_location = record.spawn_location;
                entity.captured.config = record.config.clone();
            }
        }

        fn on_demoted(&mut self, handle: EntityHandle) {
            self.demoted.push(handle);
        }

        fn on_restored(&mut self, promoted: &Promoted) {
            self.restored.push(promoted.clone());
        }

        fn update_instances(&mut self, instances: &[InstanceTransform]) {
            self.instances = instances.to_vec();
        }
    }

    #[test]
    fn demote_captures_and_destroys() {
        let mut actors = RecordingActors::default();
        let handle = actors.insert("villager_1", Vec3::new(10.0, 20.0, 0.0));
        let mut bridge = ForegroundBridge::default();
        assert!(bridge.register(handle));
        assert!(!bridge.register(handle));

        let record = bridge.demote(&mut actors, handle).expect("record");

        assert_eq!(record.unique_name, "villager_1");
        assert_eq!(record.location, Vec3::new(10.0, 20.0, 0.0));
        assert_eq!(record.target_location, record.location);
        assert!(record.needs_waypoint);
        assert!(!actors.is_alive(handle));
        assert_eq!(actors.demoted, vec![handle]);
        assert_eq!(bridge.demoted_names(), ["villager_1".to_string()]);
        assert!(bridge.registered().is_empty());
    }

    #[test]
    fn population_control_keeps_live_entity() {
        let mut actors = RecordingActors::default();
        let kept = actors.insert("villager_1", Vec3::ZERO);
        let removed = actors.insert("villager_2", Vec3::ZERO);
        if let Some(entity) = actors.live.get_mut(&kept) {
            entity.captured.config.population_control_support = true;
        }
        let mut bridge = ForegroundBridge::default();
        bridge.register(kept);
        bridge.register(removed);

        let record = bridge.demote(&mut actors, kept).expect("record");
        bridge.demote(&mut actors, removed).expect("record");

        assert!(record.config.population_control_support);
        assert!(actors.is_alive(kept));
        assert!(!actors.is_alive(removed));
        assert_eq!(actors.destroyed, vec![removed]);
        assert_eq!(actors.demoted, vec![kept, removed]);
    }

    #[test]
    fn unnamed_entity_falls_back_to_display_name() {
        let mut actors = RecordingActors::default();
        let handle = actors.insert("ignored", Vec3::ZERO);
        if let Some(entity) = actors.live.get_mut(&handle) {
            entity.captured.unique_name = None;
        }
        let mut bridge = ForegroundBridge::default();
        bridge.register(handle);

        let record = bridge.demote(&mut actors, handle).expect("record");

        assert_eq!(record.unique_name, "ignored_display");
    }

    #[test]
    fn demote_of_unregistered_handle_is_noop() {
        let mut actors = RecordingActors::default();
        let handle = actors.insert("villager_1", Vec3::ZERO);
        let mut bridge = ForegroundBridge::default();

        assert!(bridge.demote(&mut actors, handle).is_none());
        assert!(actors.is_alive(handle));
    }

    #[test]
    fn promote_spawns_restores_and_consumes_demoted_name() {
        let mut actors = RecordingActors::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut bridge = ForegroundBridge::default();
        bridge.replace_demoted_names(vec!["a".to_string(), "villager_1".to_string()]);
        let mut record = EntityRecord::new(
            "villager_1",
            Some(ArchetypeId(7)),
            EntityKind::Pawn,
            Transform {
                location: Vec3::new(1.0, 2.0, 3.0),
                rotation: Rotator {
                    pitch: 0.0,
                    yaw: 45.0,
                    roll: 0.0,
                },
                ..Transform::default()
            },
            Vec3::ZERO,
            PerEntityConfig::default(),
        );
        record.config.ground_offset_z = 80.0;

        let promoted = bridge
            .promote(&mut actors, &mut rng, &record)
            .expect("promoted");

        assert_eq!(promoted.name, "villager_1");
        assert_eq!(promoted.demoted_index, Some(1));
        assert_eq!(bridge.demoted_names(), ["a".to_string()]);
        assert_eq!(bridge.registered(), [promoted.handle]);
        let live = actors.capture_entity(promoted.handle).expect("live entity");
        assert_eq!(live.unique_name.as_deref(), Some("villager_1"));
        assert_eq!(live.transform.location, Vec3::new(1.0, 2.0, 83.0));
        assert_eq!(live.transform.rotation.yaw, 45.0);
        assert_eq!(actors.restored, vec![promoted]);
    }

    #[test]
    fn promote_without_archetype_fails() {
        let mut actors = RecordingActors::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut bridge = ForegroundBridge::default();
        let record = EntityRecord::new(
            "ghost",
            None,
            EntityKind::Prop,
            Transform::default(),
            Vec3::ZERO,
            PerEntityConfig::default(),
        );

        let error = bridge
            .promote(&mut actors, &mut rng, &record)
            .expect_err("no archetype");

        assert_eq!(
            error,
            PromoteError::MissingArchetype {
                name: "ghost".to_string()
            }
        );
        assert!(actors.live.is_empty());
    }

    #[test]
    fn spawn_rotation_randomizes_only_flagged_axes() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let config = PerEntityConfig {
            random_yaw_on_spawn: true,
            ..PerEntityConfig::default()
        };
        let stored = Rotator {
            pitch: 10.0,
            yaw: 20.0,
            roll: 30.0,
        };

        for _ in 0..100 {
            let rotation = spawn_rotation(&config, stored, &mut rng);
            assert_eq!(rotation.pitch, 0.0);
            assert_eq!(rotation.roll, 0.0);
            assert!((0.0..360.0).contains(&rotation.yaw));
        }
        assert_eq!(
            spawn_rotation(&PerEntityConfig::default(), stored, &mut rng),
            stored
        );
    }

    #[test]
    fn prune_drops_dead_handles() {
        let mut actors = RecordingActors::default();
        let alive = actors.insert("a", Vec3::ZERO);
        let dead = actors.insert("b", Vec3::ZERO);
        let mut bridge = ForegroundBridge::default();
        bridge.register(alive);
        bridge.register(dead);
        actors.live.remove(&dead);

        assert_eq!(bridge.prune_stale(&actors), 1);
        assert_eq!(bridge.registered(), [alive]);
    }
}

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::PerEntityConfig;
use crate::math::{Rotator, Transform, Vec3};

/// Opaque archetype identifier; the actor layer owns the registry behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArchetypeId(pub u32);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Walks around; requests waypoints and gets its spawn height corrected.
    #[default]
    Pawn,
    /// Static actor; carried through the background without wandering.
    Prop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    pub unique_name: String,
    pub archetype: Option<ArchetypeId>,
    #[serde(default)]
    pub kind: EntityKind,
    pub location: Vec3,
    pub rotation: Rotator,
    pub scale: Vec3,
    pub spawn_location: Vec3,
    pub target_location: Vec3,
    #[serde(default)]
    pub random_location: Option<Vec3>,
    #[serde(default)]
    pub path: VecDeque<Vec3>,
    pub needs_waypoint: bool,
    #[serde(default)]
    pub can_move: bool,
    /// Near group membership from the last classification. Saved with the
    /// record for inspection only; scheduling uses the per-tick group lists.
    #[serde(default)]
    pub near_tier: bool,
    #[serde(default)]
    pub config: PerEntityConfig,
}

impl EntityRecord {
    pub fn new(
        unique_name: impl Into<String>,
        archetype: Option<ArchetypeId>,
        kind: EntityKind,
        transform: Transform,
        spawn_location: Vec3,
        config: PerEntityConfig,
    ) -> Self {
        Self {
            unique_name: unique_name.into(),
            archetype,
            kind,
            location: transform.location,
            rotation: transform.rotation,
            scale: transform.scale,
            spawn_location,
            target_location: transform.location,
            random_location: None,
            path: VecDeque::new(),
            needs_waypoint: true,
            can_move: false,
            near_tier: false,
            config,
        }
    }

    pub fn transform(&self) -> Transform {
        Transform {
            location: self.location,
            rotation: self.rotation,
            scale: self.scale,
        }
    }

    pub fn has_path(&self) -> bool {
        !self.path.is_empty()
    }

    /// Installs a resolved route. An empty route leaves the waypoint request open.
    pub fn assign_path(&mut self, points: impl IntoIterator<Item = Vec3>) {
        self.path = points.into_iter().collect();
        if !self.path.is_empty() {
            self.needs_waypoint = false;
        }
    }

    pub fn wanders(&self) -> bool {
        self.config.wander && self.kind == EntityKind::Pawn
    }
}

/// Bookkeeping identity: same location, rotation and unique name.
impl PartialEq for EntityRecord {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location
            && self.rotation == other.rotation
            && self.unique_name == other.unique_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, location: Vec3) -> EntityRecord {
        EntityRecord::new(
            name,
            Some(ArchetypeId(1)),
            EntityKind::Pawn,
            Transform {
                location,
                ..Transform::default()
            },
            location,
            PerEntityConfig::default(),
        )
    }

    #[test]
    fn new_record_targets_its_own_location_and_needs_waypoint() {
        let entity = record("npc_1", Vec3::new(10.0, 20.0, 0.0));
        assert_eq!(entity.target_location, entity.location);
        assert!(entity.needs_waypoint);
        assert!(!entity.has_path());
    }

    #[test]
    fn assign_path_clears_request_only_for_non_empty_routes() {
        let mut entity = record("npc_1", Vec3::ZERO);
        entity.assign_path(Vec::new());
        assert!(entity.needs_waypoint);

        entity.assign_path(vec![Vec3::new(100.0, 0.0, 0.0)]);
        assert!(!entity.needs_waypoint);
        assert!(entity.has_path());
    }

    #[test]
    fn bookkeeping_equality_ignores_path_and_flags() {
        let a = record("npc_1", Vec3::new(1.0, 2.0, 3.0));
        let mut b = a.clone();
        b.assign_path(vec![Vec3::new(5.0, 5.0, 0.0)]);
        b.can_move = true;
        assert_eq!(a, b);

        let mut moved = a.clone();
        moved.location.x += 1.0;
        assert_ne!(a, moved);

        let mut renamed = a.clone();
        renamed.unique_name = "npc_2".to_string();
        assert_ne!(a, renamed);
    }

    #[test]
    fn props_never_wander() {
        let mut prop = record("crate_1", Vec3::ZERO);
        prop.kind = EntityKind::Prop;
        assert!(!prop.wanders());
    }
}

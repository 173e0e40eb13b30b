use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::exchange::WorkerIntake;
use super::metrics::TierCounts;
use crate::classifier::{classify_record, Tier};
use crate::config::{LayerRadii, WorkerConfig};
use crate::math::Vec3;
use crate::movement::advance_along_path;
use crate::record::EntityRecord;
use crate::scheduler::{BudgetedCursor, SkipGate};

#[derive(Debug, Default)]
pub struct TickOutput {
    pub background: Vec<EntityRecord>,
    pub promotions: Vec<EntityRecord>,
    pub waypoint_requests: Vec<EntityRecord>,
    pub tiers: TierCounts,
}

/// Everything the worker owns. Moved into the worker thread at startup.
#[derive(Debug)]
pub struct WorkingSet {
    layers: LayerRadii,
    arrival_tolerance: f32,
    records: Vec<EntityRecord>,
    near_cursor: BudgetedCursor,
    far_cursor: BudgetedCursor,
    skip_gate: SkipGate,
    in_flight: HashSet<String>,
}

impl WorkingSet {
    pub fn new(layers: LayerRadii, config: &WorkerConfig) -> Self {
        Self {
            layers,
            arrival_tolerance: config.arrival_tolerance,
            records: Vec::new(),
            near_cursor: BudgetedCursor::new(config.near_batch),
            far_cursor: BudgetedCursor::new(config.far_batch),
            skip_gate: SkipGate::new(config.skip_ticks),
            in_flight: HashSet::new(),
        }
    }

    pub fn records(&self) -> &[EntityRecord] {
        &self.records
    }

    pub fn is_in_flight(&self, unique_name: &str) -> bool {
        self.in_flight.contains(unique_name)
    }

    /// One worker step: intake, merge, classify, budgeted waypoint pass, movement.
    pub fn tick(&mut self, dt: Duration, intake: WorkerIntake) -> TickOutput {
        let WorkerIntake {
            replacement,
            new_records,
            observers,
            resolved,
        } = intake;

        if let Some(records) = replacement {
            debug!(records = records.len(), "working_set_replaced");
            self.records = records;
            self.in_flight.clear();
            self.near_cursor.reset();
            self.far_cursor.reset();
        }
        self.admit(new_records);
        self.merge_resolved(resolved);

        let (promotions, near, far, tiers) = self.classify(&observers);

        let mut waypoint_requests = Vec::new();
        if (!near.is_empty() || !far.is_empty()) && self.skip_gate.ready() {
            let near_range = self.near_cursor.next_batch(near.len());
            let far_range = self.far_cursor.next_batch(far.len());
            for &index in near[near_range].iter().chain(far[far_range].iter()) {
                if let Some(request) = self.take_waypoint_request(index) {
                    waypoint_requests.push(request);
                }
            }
        }

        let dt_seconds = dt.as_secs_f32();
        for record in self.records.iter_mut().filter(|record| record.can_move) {
            advance_along_path(record, dt_seconds, self.arrival_tolerance);
        }

        if !promotions.is_empty() || !waypoint_requests.is_empty() {
            trace!(
                promotions = promotions.len(),
                waypoint_requests = waypoint_requests.len(),
                background = self.records.len(),
                "worker_tick"
            );
        }

        TickOutput {
            background: self.records.clone(),
            promotions,
            waypoint_requests,
            tiers,
        }
    }

    fn admit(&mut self, new_records: Vec<EntityRecord>) {
        for record in new_records {
            if record.archetype.is_none() {
                warn!(entity = %record.unique_name, "record_missing_archetype");
            }
            match self
                .records
                .iter_mut()
                .find(|existing| existing.unique_name == record.unique_name)
            {
                Some(existing) => {
                    warn!(entity = %record.unique_name, "duplicate_record_replaced");
                    self.in_flight.remove(&record.unique_name);
                    *existing = record;
                }
                None => self.records.push(record),
            }
        }
    }

    fn merge_resolved(&mut self, resolved: Vec<EntityRecord>) {
        for result in resolved {
            self.in_flight.remove(&result.unique_name);
            let Some(record) = self
                .records
                .iter_mut()
                .find(|record| record.unique_name == result.unique_name)
            else {
                continue;
            };
            record.random_location = result.random_location;
            if result.has_path() {
                record.path = result.path;
                record.needs_waypoint = false;
            }
        }
    }

    /// Pulls Active entities out for promotion and tags the rest for movement.
    /// Returns the indices of the Near and Far groups in record order.
    fn classify(
        &mut self,
        observers: &[Vec3],
    ) -> (Vec<EntityRecord>, Vec<usize>, Vec<usize>, TierCounts) {
        let mut promotions = Vec::new();
        let mut kept = Vec::with_capacity(self.records.len());
        let mut near = Vec::new();
        let mut far = Vec::new();
        let mut tiers = TierCounts::default();

        for mut record in self.records.drain(..) {
            // Nothing to spawn without an archetype; held in place.
            if record.archetype.is_none() {
                tiers.record(Tier::Frozen);
                record.can_move = false;
                record.near_tier = false;
                kept.push(record);
                continue;
            }
            let tier = classify_record(&record, observers, &self.layers);
            tiers.record(tier);
            if tier == Tier::Active {
                self.in_flight.remove(&record.unique_name);
                promotions.push(record);
                continue;
            }
            record.can_move = tier.is_movable();
            record.near_tier = tier == Tier::NearMovable;
            match tier {
                Tier::NearMovable => near.push(kept.len()),
                Tier::FarMovable => far.push(kept.len()),
                _ => {}
            }
            kept.push(record);
        }

        self.records = kept;
        (promotions, near, far, tiers)
    }

    fn take_waypoint_request(&mut self, index: usize) -> Option<EntityRecord> {
        let record = self.records.get(index)?;
        let eligible = record.needs_waypoint
            && !record.has_path()
            && record.archetype.is_some()
            && record.wanders()
            && record
                .location
                .horizontally_near(record.target_location, self.arrival_tolerance)
            && !self.in_flight.contains(&record.unique_name);
        if !eligible {
            return None;
        }
        self.in_flight.insert(record.unique_name.clone());
        Some(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PerEntityConfig;
    use crate::math::Transform;
    use crate::record::{ArchetypeId, EntityKind};

    const DT: Duration = Duration::from_millis(10);

    fn record_at(name: &str, location: Vec3) -> EntityRecord {
        EntityRecord::new(
            name,
            Some(ArchetypeId(1)),
            EntityKind::Pawn,
            Transform {
                location,
                ..Transform::default()
            },
            location,
            PerEntityConfig {
                ground_offset_z: 0.0,
                ..PerEntityConfig::default()
            },
        )
    }

    fn every_tick() -> WorkerConfig {
        WorkerConfig {
            skip_ticks: 0,
            ..WorkerConfig::default()
        }
    }

    fn intake(new_records: Vec<EntityRecord>, observers: Vec<Vec3>) -> WorkerIntake {
        WorkerIntake {
            new_records,
            observers,
            ..WorkerIntake::default()
        }
    }

    fn observed(observers: &[Vec3]) -> WorkerIntake {
        intake(Vec::new(), observers.to_vec())
    }

    #[test]
    fn active_entity_is_handed_out_for_promotion() {
        let mut set = WorkingSet::new(LayerRadii::default(), &every_tick());
        let output = set.tick(
            DT,
            intake(
                vec![record_at("close", Vec3::new(2500.0, 0.0, 0.0))],
                vec![Vec3::ZERO],
            ),
        );

        assert_eq!(output.promotions.len(), 1);
        assert_eq!(output.promotions[0].unique_name, "close");
        assert!(output.background.is_empty());
        assert_eq!(output.tiers.active, 1);
    }

    #[test]
    fn far_entity_eventually_enters_a_budgeted_window() {
        let config = WorkerConfig {
            far_batch: 2,
            skip_ticks: 0,
            ..WorkerConfig::default()
        };
        let mut set = WorkingSet::new(LayerRadii::default(), &config);
        let records: Vec<EntityRecord> = (0..7)
            .map(|index| {
                let mut record =
                    record_at(&format!("far_{index}"), Vec3::new(20000.0, index as f32, 0.0));
                record.config.wander = index == 6;
                record
            })
            .collect();
        let observers = [Vec3::ZERO];

        let first = set.tick(DT, intake(records, observers.to_vec()));
        assert_eq!(first.tiers.far, 7);
        assert!(first.waypoint_requests.is_empty());

        let mut requested_at = None;
        for pass in 1..=4 {
            let output = set.tick(DT, observed(&observers));
            if output
                .waypoint_requests
                .iter()
                .any(|request| request.unique_name == "far_6")
            {
                requested_at = Some(pass);
                break;
            }
        }
        assert_eq!(requested_at, Some(3));
    }

    #[test]
    fn skip_gate_throttles_waypoint_passes() {
        let mut set = WorkingSet::new(LayerRadii::default(), &WorkerConfig::default());
        let observers = [Vec3::ZERO];
        let walkers = (0..4)
            .map(|index| record_at(&format!("near_{index}"), Vec3::new(5000.0, index as f32, 0.0)))
            .collect();

        let mut requests_per_tick = vec![set.tick(DT, intake(walkers, observers.to_vec()))
            .waypoint_requests
            .len()];
        for _ in 0..3 {
            requests_per_tick.push(set.tick(DT, observed(&observers)).waypoint_requests.len());
        }

        assert_eq!(requests_per_tick, vec![0, 4, 0, 0]);
        assert!(set
            .records()
            .iter()
            .all(|record| set.is_in_flight(&record.unique_name)));
    }

    #[test]
    fn in_flight_entity_is_not_requested_twice() {
        let mut set = WorkingSet::new(LayerRadii::default(), &every_tick());
        let observers = [Vec3::ZERO];
        let first = set.tick(
            DT,
            intake(
                vec![record_at("walker", Vec3::new(5000.0, 0.0, 0.0))],
                observers.to_vec(),
            ),
        );
        assert_eq!(first.waypoint_requests.len(), 1);
        assert!(set.is_in_flight("walker"));

        for _ in 0..5 {
            assert!(set.tick(DT, observed(&observers)).waypoint_requests.is_empty());
        }

        let mut resolved = first.waypoint_requests[0].clone();
        resolved.assign_path([Vec3::new(5100.0, 0.0, 0.0)]);
        let output = set.tick(
            DT,
            WorkerIntake {
                observers: observers.to_vec(),
                resolved: vec![resolved],
                ..WorkerIntake::default()
            },
        );
        assert!(!set.is_in_flight("walker"));
        assert!(output.waypoint_requests.is_empty());
        let walker = &output.background[0];
        assert!(walker.location.x > 5000.0);
        assert!(!(walker.needs_waypoint && walker.has_path()));
    }

    #[test]
    fn deferred_request_is_retried_on_a_later_pass() {
        let mut set = WorkingSet::new(LayerRadii::default(), &every_tick());
        let observers = [Vec3::ZERO];
        let first = set.tick(
            DT,
            intake(
                vec![record_at("walker", Vec3::new(5000.0, 0.0, 0.0))],
                observers.to_vec(),
            ),
        );
        let unresolved = first.waypoint_requests;

        let output = set.tick(
            DT,
            WorkerIntake {
                observers: observers.to_vec(),
                resolved: unresolved,
                ..WorkerIntake::default()
            },
        );

        assert_eq!(output.waypoint_requests.len(), 1);
    }

    #[test]
    fn frozen_and_unobserved_entities_do_not_move() {
        let mut set = WorkingSet::new(LayerRadii::default(), &every_tick());
        let mut record = record_at("sleeper", Vec3::new(40000.0, 0.0, 0.0));
        record.assign_path([Vec3::new(41000.0, 0.0, 0.0)]);

        let output = set.tick(DT, intake(vec![record], vec![Vec3::ZERO]));
        assert_eq!(output.tiers.frozen, 1);
        assert_eq!(output.background[0].location.x, 40000.0);

        let unobserved = set.tick(DT, observed(&[]));
        assert_eq!(unobserved.tiers.frozen, 1);
        assert!(unobserved.promotions.is_empty());
    }

    #[test]
    fn props_never_request_waypoints() {
        let mut set = WorkingSet::new(LayerRadii::default(), &every_tick());
        let mut prop = record_at("crate", Vec3::new(5000.0, 0.0, 0.0));
        prop.kind = EntityKind::Prop;

        let output = set.tick(DT, intake(vec![prop], vec![Vec3::ZERO]));

        assert!(output.waypoint_requests.is_empty());
        assert_eq!(output.tiers.near, 1);
    }

    #[test]
    fn replacement_resets_the_pool() {
        let mut set = WorkingSet::new(LayerRadii::default(), &every_tick());
        set.tick(
            DT,
            intake(
                vec![record_at("old", Vec3::new(5000.0, 0.0, 0.0))],
                vec![Vec3::ZERO],
            ),
        );
        assert!(set.is_in_flight("old"));

        let output = set.tick(
            DT,
            WorkerIntake {
                replacement: Some(vec![record_at("loaded", Vec3::new(40000.0, 0.0, 0.0))]),
                observers: vec![Vec3::ZERO],
                ..WorkerIntake::default()
            },
        );

        assert!(!set.is_in_flight("old"));
        assert_eq!(output.background.len(), 1);
        assert_eq!(output.background[0].unique_name, "loaded");
    }

    #[test]
    fn record_without_archetype_is_held_in_the_background() {
        let mut set = WorkingSet::new(LayerRadii::default(), &every_tick());
        let mut ghost = record_at("ghost", Vec3::new(100.0, 0.0, 0.0));
        ghost.archetype = None;
        ghost.assign_path([Vec3::new(900.0, 0.0, 0.0)]);

        let output = set.tick(DT, intake(vec![ghost], vec![Vec3::ZERO]));
        assert!(output.promotions.is_empty());
        assert!(output.waypoint_requests.is_empty());
        assert_eq!(output.tiers.frozen, 1);
        assert_eq!(output.tiers.active, 0);

        let output = set.tick(DT, observed(&[Vec3::ZERO]));
        assert!(output.promotions.is_empty());
        assert_eq!(output.background.len(), 1);
        let ghost = &output.background[0];
        assert_eq!(ghost.location, Vec3::new(100.0, 0.0, 0.0));
        assert!(!ghost.can_move);
        assert!(!ghost.near_tier);
    }

    #[test]
    fn skip_gate_holds_while_no_group_is_movable() {
        let mut set = WorkingSet::new(LayerRadii::default(), &WorkerConfig::default());
        let observers = [Vec3::ZERO];
        let sleeper = record_at("sleeper", Vec3::new(40000.0, 0.0, 0.0));
        for _ in 0..3 {
            set.tick(DT, intake(Vec::new(), observers.to_vec()));
        }
        set.tick(DT, intake(vec![sleeper], observers.to_vec()));
        set.tick(DT, observed(&observers));

        let walker = record_at("walker", Vec3::new(5000.0, 0.0, 0.0));
        let first = set.tick(DT, intake(vec![walker], observers.to_vec()));
        let second = set.tick(DT, observed(&observers));

        assert!(first.waypoint_requests.is_empty());
        assert_eq!(second.waypoint_requests.len(), 1);
        assert_eq!(second.waypoint_requests[0].unique_name, "walker");
    }

    #[test]
    fn near_tier_follows_the_latest_classification() {
        let mut set = WorkingSet::new(LayerRadii::default(), &every_tick());
        let output = set.tick(
            DT,
            intake(
                vec![record_at("walker", Vec3::new(5000.0, 0.0, 0.0))],
                vec![Vec3::ZERO],
            ),
        );
        assert!(output.background[0].near_tier);
        assert!(output.background[0].can_move);

        let output = set.tick(DT, observed(&[Vec3::new(-15000.0, 0.0, 0.0)]));
        assert_eq!(output.tiers.far, 1);
        assert!(!output.background[0].near_tier);
        assert!(output.background[0].can_move);
    }
}

use crate::math::{Rotator, Vec3};
use crate::record::EntityRecord;

const FACING_EPSILON: f32 = 0.0001;

/// Advances a background entity one step along its path at constant speed.
///
/// The consumed point is popped once the entity is within `tolerance` of it
/// on the XY plane. With an empty path the entity settles on its last target
/// and raises `needs_waypoint`.
pub fn advance_along_path(record: &mut EntityRecord, dt: f32, tolerance: f32) {
    let previous = record.location;
    let mut target = record.target_location;

    if let Some(next) = record.path.front().copied() {
        target = next.with_z(next.z + record.config.ground_offset_z);
        record.target_location = target;
        if previous.horizontally_near(target, tolerance) {
            record.path.pop_front();
        }
    }

    record.location = record
        .location
        .move_towards_constant(target, dt, record.config.speed);

    if !record.location.nearly_equals(target, FACING_EPSILON) {
        record.rotation = Rotator::look_at(record.location, target);
    }

    if record.path.is_empty() && previous.horizontally_near(target, tolerance) {
        record.needs_waypoint = true;
    }
}

pub fn path_length(from: Vec3, points: impl IntoIterator<Item = Vec3>) -> f32 {
    let mut total = 0.0;
    let mut cursor = from;
    for point in points {
        total += (point - cursor).length();
        cursor = point;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PerEntityConfig;
    use crate::math::Transform;
    use crate::record::{ArchetypeId, EntityKind};

    const TOLERANCE: f32 = 10.0;

    fn walker(path: Vec<Vec3>) -> EntityRecord {
        let config = PerEntityConfig {
            speed: 100.0,
            ground_offset_z: 0.0,
            ..PerEntityConfig::default()
        };
        let mut record = EntityRecord::new(
            "walker",
            Some(ArchetypeId(7)),
            EntityKind::Pawn,
            Transform::default(),
            Vec3::ZERO,
            config,
        );
        record.assign_path(path);
        record
    }

    #[test]
    fn moves_toward_first_point_at_constant_rate() {
        let mut record = walker(vec![Vec3::new(100.0, 0.0, 0.0)]);
        advance_along_path(&mut record, 0.25, TOLERANCE);
        assert!((record.location.x - 25.0).abs() < 1e-3);
        assert_eq!(record.target_location, Vec3::new(100.0, 0.0, 0.0));
        assert!((record.rotation.yaw).abs() < 1e-3);
        assert!(!record.needs_waypoint);
    }

    #[test]
    fn target_height_includes_ground_offset() {
        let mut record = walker(vec![Vec3::new(100.0, 0.0, 0.0)]);
        record.config.ground_offset_z = 80.0;
        advance_along_path(&mut record, 0.1, TOLERANCE);
        assert_eq!(record.target_location.z, 80.0);
    }

    #[test]
    fn walks_whole_path_then_requests_a_waypoint() {
        let mut record = walker(vec![Vec3::new(50.0, 0.0, 0.0), Vec3::new(50.0, 50.0, 0.0)]);
        for _ in 0..200 {
            assert!(
                !(record.needs_waypoint && record.has_path()),
                "waypoint request raised while a path is still queued"
            );
            advance_along_path(&mut record, 0.05, TOLERANCE);
            if record.needs_waypoint {
                break;
            }
        }
        assert!(record.needs_waypoint);
        assert!(!record.has_path());
        assert!(record
            .location
            .horizontally_near(Vec3::new(50.0, 50.0, 0.0), TOLERANCE));
    }

    #[test]
    fn idle_entity_at_target_keeps_requesting() {
        let mut record = walker(Vec::new());
        record.needs_waypoint = false;
        advance_along_path(&mut record, 0.1, TOLERANCE);
        assert!(record.needs_waypoint);
        assert_eq!(record.location, Vec3::ZERO);
    }

    #[test]
    fn path_length_sums_segments() {
        let length = path_length(
            Vec3::ZERO,
            [Vec3::new(3.0, 4.0, 0.0), Vec3::new(3.0, 10.0, 0.0)],
        );
        assert!((length - 11.0).abs() < 1e-4);
    }
}

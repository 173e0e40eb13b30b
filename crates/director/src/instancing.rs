use crate::math::{Rotator, Transform, Vec3};
use crate::record::EntityRecord;

const FACING_EPSILON: f32 = 0.0001;

/// Display transform for a background entity drawn as a lightweight instance.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceTransform {
    pub unique_name: String,
    pub visual: Option<String>,
    pub transform: Transform,
    pub cast_shadows: bool,
}

/// Background entities within `max_distance` of `observer`, in record order.
pub fn visible_instances<'a>(
    records: impl IntoIterator<Item = &'a EntityRecord>,
    observer: Vec3,
    max_distance: f32,
    cast_shadows: bool,
) -> Vec<InstanceTransform> {
    let max_distance_sq = max_distance * max_distance;
    records
        .into_iter()
        .filter(|record| record.location.distance_squared(observer) <= max_distance_sq)
        .map(|record| InstanceTransform {
            unique_name: record.unique_name.clone(),
            visual: record.config.instance_visual.clone(),
            transform: display_transform(record),
            cast_shadows,
        })
        .collect()
}

fn display_transform(record: &EntityRecord) -> Transform {
    let facing = if record
        .location
        .nearly_equals(record.target_location, FACING_EPSILON)
    {
        record.rotation
    } else {
        Rotator::look_at(record.location, record.target_location)
    };
    Transform {
        location: record.location + record.config.pivot_offset_location,
        rotation: facing + record.config.pivot_offset_rotation,
        scale: record.scale,
    }
}

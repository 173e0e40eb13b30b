use serde::{Deserialize, Serialize};

use crate::config::LayerRadii;
use crate::math::Vec3;
use crate::record::EntityRecord;

/// Simulation budget tier, ordered from most to least active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    Active,
    NearMovable,
    FarMovable,
    Frozen,
}

impl Tier {
    pub fn is_movable(self) -> bool {
        matches!(self, Tier::NearMovable | Tier::FarMovable)
    }
}

pub fn nearest_distance_squared(location: Vec3, observers: &[Vec3]) -> Option<f32> {
    observers
        .iter()
        .map(|observer| location.distance_squared(*observer))
        .min_by(|a, b| a.total_cmp(b))
}

/// Worker-side tier check against the raw first radius.
pub fn classify(location: Vec3, observers: &[Vec3], layers: &LayerRadii) -> Tier {
    let Some(distance_sq) = nearest_distance_squared(location, observers) else {
        return Tier::Frozen;
    };
    if distance_sq < layers.first * layers.first {
        Tier::Active
    } else if distance_sq < layers.second * layers.second {
        Tier::NearMovable
    } else if distance_sq < layers.third * layers.third {
        Tier::FarMovable
    } else {
        Tier::Frozen
    }
}

pub fn classify_record(record: &EntityRecord, observers: &[Vec3], defaults: &LayerRadii) -> Tier {
    classify(
        record.location,
        observers,
        record.config.effective_layers(defaults),
    )
}

/// Owning-thread check: a foreground entity stays live while any observer is
/// inside `first + offset`. The band between the two radii is the hysteresis.
pub fn keeps_foreground(location: Vec3, observers: &[Vec3], layers: &LayerRadii) -> bool {
    let boundary = layers.first + layers.offset;
    let boundary_sq = boundary * boundary;
    observers
        .iter()
        .any(|observer| location.distance_squared(*observer) < boundary_sq)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layers() -> LayerRadii {
        LayerRadii {
            first: 3000.0,
            second: 15000.0,
            third: 30000.0,
            offset: 500.0,
        }
    }

    #[test]
    fn observer_inside_first_layer_makes_entity_active() {
        let observers = [Vec3::new(2500.0, 0.0, 0.0)];
        assert_eq!(classify(Vec3::ZERO, &observers, &layers()), Tier::Active);
    }

    #[test]
    fn distance_between_second_and_third_is_far_movable() {
        let observers = [Vec3::new(20000.0, 0.0, 0.0)];
        assert_eq!(classify(Vec3::ZERO, &observers, &layers()), Tier::FarMovable);
    }

    #[test]
    fn no_observers_freezes_everything() {
        assert_eq!(classify(Vec3::ZERO, &[], &layers()), Tier::Frozen);
    }

    #[test]
    fn any_close_observer_wins() {
        let observers = [
            Vec3::new(50000.0, 0.0, 0.0),
            Vec3::new(0.0, 1000.0, 0.0),
            Vec3::new(0.0, 20000.0, 0.0),
        ];
        assert_eq!(classify(Vec3::ZERO, &observers, &layers()), Tier::Active);
    }

    #[test]
    fn approaching_observer_never_lowers_activity() {
        let mut previous = Tier::Frozen;
        let mut distance = 40000.0;
        while distance >= 0.0 {
            let observers = [Vec3::new(distance, 0.0, 0.0)];
            let tier = classify(Vec3::ZERO, &observers, &layers());
            assert!(
                tier <= previous,
                "tier {tier:?} at {distance} is less active than {previous:?}"
            );
            previous = tier;
            distance -= 250.0;
        }
        assert_eq!(previous, Tier::Active);
    }

    #[test]
    fn hysteresis_band_keeps_foreground_but_is_not_active() {
        let observers = [Vec3::new(3200.0, 0.0, 0.0)];
        assert_eq!(classify(Vec3::ZERO, &observers, &layers()), Tier::NearMovable);
        assert!(keeps_foreground(Vec3::ZERO, &observers, &layers()));

        let outside = [Vec3::new(3600.0, 0.0, 0.0)];
        assert!(!keeps_foreground(Vec3::ZERO, &outside, &layers()));
    }
}

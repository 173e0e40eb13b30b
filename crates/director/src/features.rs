use serde::{Deserialize, Serialize};

use crate::bridge::EntityHandle;
use crate::math::Vec3;
use crate::waypoint::NavigationService;

pub const MIN_WALKING_POINTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterestingPlace {
    /// Live object backing the place; `None` for places that cannot be destroyed.
    #[serde(skip)]
    pub handle: Option<EntityHandle>,
    pub location: Vec3,
    pub find_radius: f32,
    pub walk_radius: f32,
    /// Percent, 0..=100.
    pub attraction_chance: f32,
}

impl Default for InterestingPlace {
    fn default() -> Self {
        Self {
            handle: None,
            location: Vec3::ZERO,
            find_radius: 5000.0,
            walk_radius: 1500.0,
            attraction_chance: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoadPath {
    pub name: String,
    pub tags: Vec<String>,
    pub points: Vec<Vec3>,
    /// Percent, 0..=100.
    pub attraction_chance: f32,
    pub max_walking_points: usize,
    pub radius_random_point_near_point: f32,
}

impl Default for RoadPath {
    fn default() -> Self {
        Self {
            name: String::new(),
            tags: Vec::new(),
            points: Vec::new(),
            attraction_chance: 100.0,
            max_walking_points: 10,
            radius_random_point_near_point: 50.0,
        }
    }
}

impl RoadPath {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|candidate| candidate == tag)
    }

    /// An empty allow-list accepts every road.
    pub fn accepts(&self, allowed_tags: &[String]) -> bool {
        allowed_tags.is_empty() || allowed_tags.iter().any(|tag| self.has_tag(tag))
    }

    pub fn has_point_within(&self, location: Vec3, radius: f32) -> bool {
        let radius_sq = radius * radius;
        self.points
            .iter()
            .any(|point| location.distance_squared(*point) < radius_sq)
    }

    pub fn closest_point_index(&self, location: Vec3) -> Option<usize> {
        self.points
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                location
                    .distance_squared(**a)
                    .total_cmp(&location.distance_squared(**b))
            })
            .map(|(index, _)| index)
    }

    pub fn walking_points_cap(&self) -> usize {
        self.max_walking_points.max(MIN_WALKING_POINTS)
    }

    /// Builds road points every `spacing` units along a polyline, snapping each
    /// sample onto navigable ground. Samples that cannot be snapped are dropped.
    pub fn from_polyline<N: NavigationService + ?Sized>(
        polyline: &[Vec3],
        spacing: f32,
        snap_radius: f32,
        nav: &mut N,
    ) -> Vec<Vec3> {
        sample_polyline(polyline, spacing)
            .into_iter()
            .filter_map(|sample| nav.find_random_point_in_radius(sample, snap_radius))
            .collect()
    }
}

pub fn sample_polyline(polyline: &[Vec3], spacing: f32) -> Vec<Vec3> {
    let Some(first) = polyline.first().copied() else {
        return Vec::new();
    };
    if spacing <= 0.0 || !spacing.is_finite() {
        return polyline.to_vec();
    }

    let mut samples = vec![first];
    let mut carried = 0.0;
    for segment in polyline.windows(2) {
        let (start, end) = (segment[0], segment[1]);
        let length = (end - start).length();
        if length <= f32::EPSILON {
            continue;
        }
        let mut along = spacing - carried;
        while along < length {
            samples.push(start + (end - start).scale(along / length));
            along += spacing;
        }
        carried = length - (along - spacing);
    }
    samples
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldFeatures {
    pub places: Vec<InterestingPlace>,
    pub roads: Vec<RoadPath>,
}

impl WorldFeatures {
    /// Drops places whose backing object no longer exists. Returns how many went.
    pub fn prune_dead_places(&mut self, is_alive: impl Fn(EntityHandle) -> bool) -> usize {
        let before = self.places.len();
        self.places
            .retain(|place| place.handle.map_or(true, |handle| is_alive(handle)));
        before - self.places.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_road(count: usize) -> RoadPath {
        RoadPath {
            name: "main".to_string(),
            tags: vec!["paved".to_string()],
            points: (0..count)
                .map(|index| Vec3::new(index as f32 * 1000.0, 0.0, 0.0))
                .collect(),
            ..RoadPath::default()
        }
    }

    #[test]
    fn closest_point_index_picks_nearest() {
        let road = straight_road(10);
        assert_eq!(
            road.closest_point_index(Vec3::new(5100.0, 100.0, 0.0)),
            Some(5)
        );
        assert_eq!(RoadPath::default().closest_point_index(Vec3::ZERO), None);
    }

    #[test]
    fn tag_allow_list_filters_roads() {
        let road = straight_road(3);
        assert!(road.accepts(&[]));
        assert!(road.accepts(&["dirt".to_string(), "paved".to_string()]));
        assert!(!road.accepts(&["dirt".to_string()]));
    }

    #[test]
    fn search_radius_is_exclusive() {
        let road = straight_road(3);
        assert!(road.has_point_within(Vec3::new(0.0, 1999.0, 0.0), 2000.0));
        assert!(!road.has_point_within(Vec3::new(0.0, 2000.0, 0.0), 2000.0));
    }

    #[test]
    fn sample_polyline_spaces_points_across_segments() {
        let polyline = [
            Vec3::ZERO,
            Vec3::new(250.0, 0.0, 0.0),
            Vec3::new(250.0, 250.0, 0.0),
        ];
        let samples = sample_polyline(&polyline, 100.0);
        let expected = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(100.0, 0.0, 0.0),
            Vec3::new(200.0, 0.0, 0.0),
            Vec3::new(250.0, 50.0, 0.0),
            Vec3::new(250.0, 150.0, 0.0),
        ];
        assert_eq!(samples.len(), expected.len());
        for (sample, expected) in samples.iter().zip(expected) {
            assert!(sample.nearly_equals(expected, 1e-3), "{sample:?} != {expected:?}");
        }
    }

    #[test]
    fn prune_drops_only_dead_handles() {
        let mut features = WorldFeatures {
            places: vec![
                InterestingPlace {
                    handle: Some(EntityHandle(1)),
                    ..InterestingPlace::default()
                },
                InterestingPlace {
                    handle: Some(EntityHandle(2)),
                    ..InterestingPlace::default()
                },
                InterestingPlace::default(),
            ],
            roads: Vec::new(),
        };
        let removed = features.prune_dead_places(|handle| handle != EntityHandle(2));
        assert_eq!(removed, 1);
        assert_eq!(features.places.len(), 2);
    }
}

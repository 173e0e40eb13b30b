use rand::Rng;
use tracing::debug;

use crate::features::{InterestingPlace, RoadPath, WorldFeatures, MIN_WALKING_POINTS};
use crate::math::Vec3;
use crate::movement::path_length;
use crate::record::EntityRecord;

/// Points a road walk must have available past the start index in the chosen direction.
const ROAD_DIRECTION_REACH: usize = 3;

/// Navigation queries the director needs from the host world.
///
/// Only ever called on the main thread.
pub trait NavigationService {
    fn find_random_point_in_radius(&mut self, center: Vec3, radius: f32) -> Option<Vec3>;

    /// Route from `from` to `to`, excluding the start point. `None` when unreachable.
    fn find_path(&mut self, from: Vec3, to: Vec3) -> Option<Vec<Vec3>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    InterestingPlace,
    Road,
    RandomFallback,
    /// Nothing routable this round; the request stays open.
    Deferred,
    /// The record did not need a waypoint.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoadDirection {
    Forward,
    Backward,
}

pub struct WaypointResolver<'a, N: NavigationService + ?Sized, R: Rng> {
    nav: &'a mut N,
    features: &'a WorldFeatures,
    rng: &'a mut R,
}

impl<'a, N: NavigationService + ?Sized, R: Rng> WaypointResolver<'a, N, R> {
    pub fn new(nav: &'a mut N, features: &'a WorldFeatures, rng: &'a mut R) -> Self {
        Self { nav, features, rng }
    }

    /// Tries interesting places, then roads, then a random point near spawn.
    pub fn resolve(&mut self, record: &mut EntityRecord) -> Resolution {
        if !record.needs_waypoint || record.has_path() {
            return Resolution::Skipped;
        }

        if let Some(point) = self
            .nav
            .find_random_point_in_radius(record.spawn_location, record.config.wander_radius)
        {
            record.random_location = Some(point);
        }

        let resolution = if record.config.use_interesting_places && self.try_places(record) {
            Resolution::InterestingPlace
        } else if record.config.use_roads && self.try_roads(record) {
            Resolution::Road
        } else if self.try_random_location(record) {
            Resolution::RandomFallback
        } else {
            Resolution::Deferred
        };

        if record.has_path() {
            debug!(
                entity = %record.unique_name,
                ?resolution,
                points = record.path.len(),
                length = path_length(record.location, record.path.iter().copied()),
                "waypoint_resolved"
            );
        } else {
            debug!(entity = %record.unique_name, "waypoint_deferred");
        }
        resolution
    }

    fn try_places(&mut self, record: &mut EntityRecord) -> bool {
        let features = self.features;
        for place in &features.places {
            if !self.roll(place.attraction_chance) || !place_in_reach(place, record.location) {
                continue;
            }
            let Some(point) = self
                .nav
                .find_random_point_in_radius(place.location, place.walk_radius)
            else {
                continue;
            };
            if let Some(path) = non_empty(self.nav.find_path(record.location, point)) {
                record.assign_path(path);
                return true;
            }
        }
        false
    }

    fn try_roads(&mut self, record: &mut EntityRecord) -> bool {
        let allowed = &record.config.accessible_road_tags;
        let search_radius = record.config.max_distance_search_road;
        let features = self.features;
        let mut candidates: Vec<&RoadPath> = Vec::new();
        for road in &features.roads {
            if self.roll(road.attraction_chance)
                && road.accepts(allowed)
                && road.has_point_within(record.location, search_radius)
            {
                candidates.push(road);
            }
        }
        if candidates.is_empty() {
            return false;
        }

        let road = candidates[self.rng.gen_range(0..candidates.len())];
        let Some(start) = road.closest_point_index(record.location) else {
            return false;
        };
        let Some(direction) = self.pick_direction(road, start) else {
            return false;
        };
        let count = self
            .rng
            .gen_range(MIN_WALKING_POINTS..=road.walking_points_cap());

        let samples: Vec<Vec3> = walk_indices(road.points.len(), start, count, direction)
            .filter_map(|index| {
                self.nav.find_random_point_in_radius(
                    road.points[index],
                    road.radius_random_point_near_point,
                )
            })
            .collect();
        let Some(first) = samples.first().copied() else {
            return false;
        };
        let Some(mut path) = non_empty(self.nav.find_path(record.location, first)) else {
            return false;
        };
        path.extend_from_slice(&samples[1..]);
        debug!(
            entity = %record.unique_name,
            road = %road.name,
            ?direction,
            start,
            count,
            "road_walk_selected"
        );
        record.assign_path(path);
        true
    }

    fn try_random_location(&mut self, record: &mut EntityRecord) -> bool {
        let Some(destination) = record.random_location else {
            return false;
        };
        match non_empty(self.nav.find_path(record.location, destination)) {
            Some(path) => {
                record.assign_path(path);
                true
            }
            None => false,
        }
    }

    fn pick_direction(&mut self, road: &RoadPath, start: usize) -> Option<RoadDirection> {
        let forward = start + ROAD_DIRECTION_REACH < road.points.len();
        let backward = start >= ROAD_DIRECTION_REACH;
        match (forward, backward) {
            (true, true) if self.rng.gen_bool(0.5) => Some(RoadDirection::Forward),
            (true, true) => Some(RoadDirection::Backward),
            (true, false) => Some(RoadDirection::Forward),
            (false, true) => Some(RoadDirection::Backward),
            (false, false) => None,
        }
    }

    fn roll(&mut self, chance_percent: f32) -> bool {
        self.rng.gen_range(0.0f32..=100.0) <= chance_percent
    }
}

fn place_in_reach(place: &InterestingPlace, location: Vec3) -> bool {
    location.distance_squared(place.location) <= place.find_radius * place.find_radius
}

fn non_empty(path: Option<Vec<Vec3>>) -> Option<Vec<Vec3>> {
    path.filter(|points| !points.is_empty())
}

/// Road point indices visited by a walk of `count` points from `start`, clamped to the road.
pub fn walk_indices(
    len: usize,
    start: usize,
    count: usize,
    direction: RoadDirection,
) -> Box<dyn Iterator<Item = usize>> {
    if start >= len || count == 0 {
        return Box::new(std::iter::empty());
    }
    match direction {
        RoadDirection::Forward => Box::new(start..len.min(start + count)),
        RoadDirection::Backward => {
            let low = (start + 1).saturating_sub(count);
            Box::new((low..=start).rev())
        }
    }
}

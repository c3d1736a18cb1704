//! Coordinate simulator
//!
//! Produces a plausible geolocation reading for a zone: picks a weighted
//! hotspot (or the rectangle center), then nudges it by a random offset on
//! a spherical earth. Offsets that would leave the zone's bounding
//! rectangle are discarded so a generated point never lies outside the
//! declared zone.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::error::SimulationError;
use crate::geo::zone::Zone;

/// Mean earth radius in meters, used for the forward-azimuth formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Accuracy reported when no hotspot supplies one.
pub const DEFAULT_ACCURACY_M: f64 = 20.0;

/// Source label used when the rectangle center is the base point.
const ZONE_CENTER_LABEL: &str = "zone center";

/// A simulated geolocation reading. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedCoordinate {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Reported accuracy in meters.
    pub accuracy: f64,
    /// Where the base point came from (hotspot name or "zone center").
    pub source: String,
}

/// Stateless coordinate generator. Pure function of inputs plus the RNG.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateSimulator {
    max_offset_m: f64,
}

impl CoordinateSimulator {
    /// Create a simulator with the given global maximum random offset.
    #[must_use]
    pub const fn new(max_offset_m: f64) -> Self {
        Self { max_offset_m }
    }

    /// Default global maximum offset (50 m).
    #[must_use]
    pub const fn with_default_offset() -> Self {
        Self::new(50.0)
    }

    /// Generate a coordinate inside `zone`.
    pub fn generate<R: Rng>(
        &self,
        zone: &Zone,
        rng: &mut R,
    ) -> Result<GeneratedCoordinate, SimulationError> {
        let bounds = zone.bounds;
        if bounds.min_lat > bounds.max_lat
            || bounds.min_lng > bounds.max_lng
            || bounds.min_lat.is_nan()
            || bounds.min_lng.is_nan()
        {
            return Err(SimulationError::UnusableBounds(zone.id.clone()));
        }

        let (base_lat, base_lng, accuracy, source) = pick_base(zone, rng);

        let (lat, lng) = if self.max_offset_m > 0.0 {
            let (offset_lat, offset_lng) = self.offset(base_lat, base_lng, self.max_offset_m, rng);
            if bounds.contains(offset_lat, offset_lng) {
                (offset_lat, offset_lng)
            } else {
                // Never fabricate a point outside the declared zone.
                (base_lat, base_lng)
            }
        } else {
            (base_lat, base_lng)
        };

        Ok(GeneratedCoordinate {
            lat,
            lng,
            accuracy,
            source,
        })
    }

    /// Move a point a random distance (≤ `max_meters`) in a random
    /// direction using the spherical forward-azimuth formula.
    ///
    /// Longitude is normalized to [-180, 180], latitude clamped to
    /// [-90, 90]. `max_meters ≤ 0` returns the input unchanged.
    pub fn offset<R: Rng>(&self, lat: f64, lng: f64, max_meters: f64, rng: &mut R) -> (f64, f64) {
        if max_meters <= 0.0 {
            return (lat, lng);
        }

        let distance_m = rng.gen_range(0.0..=max_meters);
        let bearing = rng.gen_range(0.0..std::f64::consts::TAU);

        let lat_rad = lat.to_radians();
        let lng_rad = lng.to_radians();
        let angular = distance_m / EARTH_RADIUS_M;

        let new_lat_rad = (lat_rad.sin() * angular.cos()
            + lat_rad.cos() * angular.sin() * bearing.cos())
        .asin();
        let new_lng_rad = lng_rad
            + (bearing.sin() * angular.sin() * lat_rad.cos())
                .atan2(angular.cos() - lat_rad.sin() * new_lat_rad.sin());

        let new_lat = new_lat_rad.to_degrees().clamp(-90.0, 90.0);
        let new_lng = (new_lng_rad.to_degrees() + 540.0) % 360.0 - 180.0;

        (new_lat, new_lng)
    }

    /// Effective maximum offset when a task supplies its own geofence
    /// radius: 30% of the radius, capped by the global maximum and an
    /// absolute 30 m ceiling, floored at 1 m.
    #[must_use]
    pub fn task_offset_limit(&self, radius_m: f64) -> f64 {
        (radius_m * 0.3).min(self.max_offset_m).min(30.0).max(1.0)
    }
}

fn pick_base<R: Rng>(zone: &Zone, rng: &mut R) -> (f64, f64, f64, String) {
    if !zone.hotspots.is_empty() {
        let weights: Vec<u32> = zone.hotspots.iter().map(|h| h.weight).collect();
        if let Ok(index) = WeightedIndex::new(&weights) {
            let hotspot = &zone.hotspots[index.sample(rng)];
            return (
                hotspot.lat,
                hotspot.lng,
                hotspot.accuracy,
                hotspot.name.clone(),
            );
        }
    }
    let (lat, lng) = zone.bounds.center();
    (lat, lng, DEFAULT_ACCURACY_M, ZONE_CENTER_LABEL.to_string())
}

/// Great-circle distance between two points in meters (haversine).
#[must_use]
pub fn great_circle_distance_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::zone::{Bounds, Hotspot};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn bounds_only_zone() -> Zone {
        Zone {
            id: "z00001".to_string(),
            address: "Test campus".to_string(),
            bounds: Bounds {
                min_lat: 39.90,
                max_lat: 39.92,
                min_lng: 116.39,
                max_lng: 116.41,
            },
            hotspots: Vec::new(),
        }
    }

    fn zone_with_hotspots() -> Zone {
        let mut zone = bounds_only_zone();
        zone.hotspots = vec![
            Hotspot {
                name: "Library".to_string(),
                lat: 39.91,
                lng: 116.40,
                accuracy: 15.0,
                weight: 3,
            },
            Hotspot {
                name: "Gym".to_string(),
                lat: 39.905,
                lng: 116.395,
                accuracy: 25.0,
                weight: 1,
            },
        ];
        zone
    }

    #[test]
    fn test_bounds_only_generation_stays_in_bounds() {
        let simulator = CoordinateSimulator::with_default_offset();
        let zone = bounds_only_zone();
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..500 {
            let coord = simulator.generate(&zone, &mut rng).unwrap();
            assert!(
                zone.bounds.contains(coord.lat, coord.lng),
                "({}, {}) escaped the zone bounds",
                coord.lat,
                coord.lng
            );
        }
    }

    #[test]
    fn test_bounds_only_generation_uses_center_label() {
        let simulator = CoordinateSimulator::new(0.0);
        let zone = bounds_only_zone();
        let mut rng = StdRng::seed_from_u64(2);

        let coord = simulator.generate(&zone, &mut rng).unwrap();
        assert_eq!(coord.source, "zone center");
        assert!((coord.lat - 39.91).abs() < 1e-9);
        assert!((coord.lng - 116.40).abs() < 1e-9);
        assert!((coord.accuracy - DEFAULT_ACCURACY_M).abs() < f64::EPSILON);
    }

    #[test]
    fn test_hotspot_pick_frequency_tracks_weight() {
        let simulator = CoordinateSimulator::new(0.0);
        let zone = zone_with_hotspots();
        let mut rng = StdRng::seed_from_u64(3);

        let draws = 4000;
        let mut library_picks = 0;
        for _ in 0..draws {
            let coord = simulator.generate(&zone, &mut rng).unwrap();
            if coord.source == "Library" {
                library_picks += 1;
            }
        }

        // Weight share is 3/4; allow generous statistical slack.
        let share = f64::from(library_picks) / f64::from(draws);
        assert!(
            (share - 0.75).abs() < 0.05,
            "library pick share {share} too far from 0.75"
        );
    }

    #[test]
    fn test_hotspot_supplies_accuracy() {
        let simulator = CoordinateSimulator::new(0.0);
        let mut zone = zone_with_hotspots();
        zone.hotspots.truncate(1);
        let mut rng = StdRng::seed_from_u64(4);

        let coord = simulator.generate(&zone, &mut rng).unwrap();
        assert_eq!(coord.source, "Library");
        assert!((coord.accuracy - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_offset_zero_is_identity() {
        let simulator = CoordinateSimulator::with_default_offset();
        let mut rng = StdRng::seed_from_u64(5);
        let (lat, lng) = simulator.offset(39.91, 116.40, 0.0, &mut rng);
        assert!((lat - 39.91).abs() < f64::EPSILON);
        assert!((lng - 116.40).abs() < f64::EPSILON);
    }

    #[test]
    fn test_offset_respects_distance_bound() {
        let simulator = CoordinateSimulator::with_default_offset();
        let mut rng = StdRng::seed_from_u64(6);

        for max_m in [1.0, 10.0, 50.0, 500.0] {
            for _ in 0..200 {
                let (lat, lng) = simulator.offset(39.91, 116.40, max_m, &mut rng);
                let distance = great_circle_distance_m(39.91, 116.40, lat, lng);
                assert!(
                    distance <= max_m + 0.01,
                    "offset moved {distance}m, bound {max_m}m"
                );
            }
        }
    }

    #[test]
    fn test_offset_normalizes_longitude_near_antimeridian() {
        let simulator = CoordinateSimulator::with_default_offset();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let (lat, lng) = simulator.offset(0.0, 179.9999, 1000.0, &mut rng);
            assert!((-90.0..=90.0).contains(&lat));
            assert!((-180.0..=180.0).contains(&lng));
        }
    }

    #[test]
    fn test_generate_rejects_degenerate_bounds() {
        let simulator = CoordinateSimulator::with_default_offset();
        let mut zone = bounds_only_zone();
        zone.bounds.min_lat = f64::NAN;
        let mut rng = StdRng::seed_from_u64(8);

        let err = simulator.generate(&zone, &mut rng).unwrap_err();
        assert!(err.to_string().contains("z00001"));
    }

    #[test]
    fn test_task_offset_limit() {
        let simulator = CoordinateSimulator::new(50.0);
        // 30% of radius when small.
        assert!((simulator.task_offset_limit(50.0) - 15.0).abs() < f64::EPSILON);
        // 30m absolute ceiling.
        assert!((simulator.task_offset_limit(1000.0) - 30.0).abs() < f64::EPSILON);
        // Never below 1m.
        assert!((simulator.task_offset_limit(0.5) - 1.0).abs() < f64::EPSILON);
        // Global maximum caps before the 30m ceiling when smaller.
        let tight = CoordinateSimulator::new(10.0);
        assert!((tight.task_offset_limit(1000.0) - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_seeded_generation_is_deterministic() {
        let simulator = CoordinateSimulator::with_default_offset();
        let zone = zone_with_hotspots();

        let a = simulator
            .generate(&zone, &mut StdRng::seed_from_u64(9))
            .unwrap();
        let b = simulator
            .generate(&zone, &mut StdRng::seed_from_u64(9))
            .unwrap();
        assert_eq!(a, b);
    }
}

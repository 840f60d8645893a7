//! Geographic primitives: coordinates, great-circle distance, and the
//! ring of query points sources use to widen a search.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Mean earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Maximum radius of a single source query, in meters.
pub const QUERY_RANGE_METERS: f64 = 5000.0;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Returns `true` if both components are finite and within range.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Great-circle (haversine) distance to `other`, in meters.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();
        EARTH_RADIUS_METERS * c
    }

    /// The point `distance_m` meters away along the initial `bearing_deg`
    /// (clockwise from north).
    pub fn destination(&self, distance_m: f64, bearing_deg: f64) -> Coordinate {
        let delta = distance_m / EARTH_RADIUS_METERS;
        let theta = bearing_deg.to_radians();
        let phi1 = self.lat.to_radians();
        let lambda1 = self.lng.to_radians();

        let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).asin();
        let lambda2 = lambda1
            + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * phi2.sin());

        // Normalise longitude to [-180, 180).
        let lng = (lambda2.to_degrees() + 540.0) % 360.0 - 180.0;
        Coordinate::new(phi2.to_degrees(), lng)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

/// Points `range_m` meters from `center` at bearings 0, 90, 180 and 270.
pub fn surrounding_points(center: Coordinate, range_m: f64) -> Vec<Coordinate> {
    (0..4)
        .map(|i| center.destination(range_m, f64::from(i) * 90.0))
        .collect()
}

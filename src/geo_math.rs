//! Great-circle helpers on top of `geo`'s haversine implementations.
//!
//! `geo::Point` is (x = lon, y = lat); everything in this crate passes
//! `Coordinate { lat, lon }` so the swap happens only here.
use crate::types::{Coordinate, METERS_PER_KM};
use geo::{HaversineBearing, HaversineDestination, HaversineDistance, Point};

fn to_point(coord: &Coordinate) -> Point<f64> {
    Point::new(coord.lon, coord.lat)
}

/// Great-circle distance in meters
pub fn distance_m(from: &Coordinate, to: &Coordinate) -> f64 {
    to_point(from).haversine_distance(&to_point(to))
}

/// Great-circle distance in kilometers
pub fn distance_km(from: &Coordinate, to: &Coordinate) -> f64 {
    distance_m(from, to) / METERS_PER_KM
}

/// Initial bearing from `from` towards `to`, normalized to [0, 360) degrees
pub fn bearing_deg(from: &Coordinate, to: &Coordinate) -> f64 {
    let bearing = to_point(from).haversine_bearing(to_point(to));
    bearing.rem_euclid(360.0)
}

/// Point reached by travelling `distance_m` along `bearing_deg` from `origin`.
///
/// Used by the demo route simulator and by tests building synthetic tracks.
pub fn destination(origin: &Coordinate, bearing_deg: f64, distance_m: f64) -> Coordinate {
    let target = to_point(origin).haversine_destination(bearing_deg, distance_m);
    // Normalize longitude to [-180, 180)
    let lon = (target.x() + 540.0).rem_euclid(360.0) - 180.0;
    Coordinate::new(target.y(), lon)
}

pub mod units;

pub use units::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// A WGS84 position in decimal degrees
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Coordinate { lat, lon }
    }

    pub fn is_origin(&self) -> bool {
        self.lat == 0.0 && self.lon == 0.0
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

/// One GPS fix as it enters the pipeline
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub coordinate: Coordinate,
    pub reported_speed_mps: Option<f64>,
    pub accuracy_m: Option<f64>,
    pub timestamp_ms: i64,
}

impl LocationSample {
    pub fn new(lat: f64, lon: f64, timestamp_ms: i64) -> Self {
        LocationSample {
            coordinate: Coordinate::new(lat, lon),
            reported_speed_mps: None,
            accuracy_m: None,
            timestamp_ms,
        }
    }

    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.reported_speed_mps = Some(speed_mps);
        self
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }
}

/// Movement mode, ordered from slowest to fastest
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementMode {
    #[default]
    Stationary,
    Walking,
    Cycling,
}

impl MovementMode {
    pub const ALL: [MovementMode; 3] = [
        MovementMode::Stationary,
        MovementMode::Walking,
        MovementMode::Cycling,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementMode::Stationary => "STATIONARY",
            MovementMode::Walking => "WALKING",
            MovementMode::Cycling => "CYCLING",
        }
    }

    pub fn is_moving(&self) -> bool {
        *self != MovementMode::Stationary
    }
}

impl fmt::Display for MovementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_ordering() {
        assert!(MovementMode::Stationary < MovementMode::Walking);
        assert!(MovementMode::Walking < MovementMode::Cycling);
    }

    #[test]
    fn test_mode_serialization() {
        let json = serde_json::to_string(&MovementMode::Cycling).unwrap();
        assert_eq!(json, "\"CYCLING\"");
        let mode: MovementMode = serde_json::from_str("\"WALKING\"").unwrap();
        assert_eq!(mode, MovementMode::Walking);
    }

    #[test]
    fn test_origin_detection() {
        assert!(Coordinate::new(0.0, 0.0).is_origin());
        assert!(!Coordinate::new(0.0, 0.0001).is_origin());
    }
}

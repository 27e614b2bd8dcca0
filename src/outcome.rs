use crate::validator::CoordinateIssue;
use std::fmt;

/// Why a fix earned no distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    InvalidCoordinate(CoordinateIssue),
    PoorAccuracy { accuracy_m: f64 },
    /// Negative, or further ahead of the clock than the allowed skew
    InvalidTimestamp { timestamp_ms: i64 },
    Throttled,
    /// Inside the stationary-center radius at low speed
    Drift,
    /// Mode is STATIONARY or speed is at or below the stationary threshold
    NotMoving,
    /// Shorter than the mode's minimum movement
    BelowNoiseFloor { distance_m: f64 },
    /// Further than the mode could plausibly travel in the elapsed time
    GpsJump { distance_km: f64, max_reasonable_km: f64 },
}

impl Rejection {
    /// Rejections that change nothing at all, not even the last position
    pub fn is_dropped(&self) -> bool {
        matches!(
            self,
            Rejection::InvalidCoordinate(_)
                | Rejection::PoorAccuracy { .. }
                | Rejection::InvalidTimestamp { .. }
                | Rejection::Throttled
        )
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::InvalidCoordinate(issue) => write!(f, "invalid coordinate: {}", issue),
            Rejection::PoorAccuracy { accuracy_m } => write!(f, "poor accuracy ({:.0} m)", accuracy_m),
            Rejection::InvalidTimestamp { timestamp_ms } => {
                write!(f, "implausible timestamp ({})", timestamp_ms)
            }
            Rejection::Throttled => f.write_str("throttled"),
            Rejection::Drift => f.write_str("drift"),
            Rejection::NotMoving => f.write_str("not moving"),
            Rejection::BelowNoiseFloor { distance_m } => {
                write!(f, "below noise floor ({:.1} m)", distance_m)
            }
            Rejection::GpsJump {
                distance_km,
                max_reasonable_km,
            } => write!(
                f,
                "GPS jump ({:.3} km, ceiling {:.3} km)",
                distance_km, max_reasonable_km
            ),
        }
    }
}

/// What the pipeline did with one fix
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    /// First fix of the session: position recorded, nothing credited
    Initialized,
    /// First fix after a long silence: position recorded, nothing credited
    Reanchored { gap_ms: i64 },
    Credited { distance_km: f64 },
    Rejected(Rejection),
}

impl SampleOutcome {
    pub fn credited_km(&self) -> f64 {
        match self {
            SampleOutcome::Credited { distance_km } => *distance_km,
            _ => 0.0,
        }
    }

    pub fn is_accepted(&self) -> bool {
        !matches!(self, SampleOutcome::Rejected(r) if r.is_dropped())
    }
}

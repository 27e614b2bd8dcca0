use crate::geo_math;
use crate::types::{Coordinate, MPS_TO_KMH, MS_PER_HOUR};

/// Speed figures for one fix relative to the previous accepted fix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedEstimate {
    pub distance_km: f64,
    pub elapsed_ms: i64,
    pub reported_kmh: f64,
    pub calculated_kmh: f64,
    /// max(reported, calculated): undercounting real movement is worse than
    /// a single high reading, and the mode hysteresis absorbs spikes
    pub speed_kmh: f64,
}

impl SpeedEstimate {
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_ms as f64 / 1000.0
    }
}

/// Reported speed converted to km/h; missing or nonsensical values count as 0
pub fn reported_kmh(reported_mps: Option<f64>) -> f64 {
    match reported_mps {
        Some(mps) if mps.is_finite() && mps > 0.0 => mps * MPS_TO_KMH,
        _ => 0.0,
    }
}

/// Speed implied by covering `distance_km` in `elapsed_ms`.
/// Zero or negative elapsed time (duplicate or out-of-order fixes) yields 0.
pub fn calculated_kmh(distance_km: f64, elapsed_ms: i64) -> f64 {
    if elapsed_ms <= 0 {
        return 0.0;
    }
    distance_km / (elapsed_ms as f64 / MS_PER_HOUR)
}

pub fn estimate(
    prev: &Coordinate,
    curr: &Coordinate,
    elapsed_ms: i64,
    reported_mps: Option<f64>,
) -> SpeedEstimate {
    let distance_km = geo_math::distance_km(prev, curr);
    let reported = reported_kmh(reported_mps);
    let calculated = calculated_kmh(distance_km, elapsed_ms);
    let speed_kmh = if elapsed_ms <= 0 {
        0.0
    } else {
        reported.max(calculated)
    };

    SpeedEstimate {
        distance_km,
        elapsed_ms,
        reported_kmh: reported,
        calculated_kmh: calculated,
        speed_kmh,
    }
}

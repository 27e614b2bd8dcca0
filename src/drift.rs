use crate::config::DriftConfig;
use crate::geo_math;
use crate::types::{Coordinate, MovementMode};

/// Result of checking one fix against the stationary center
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftCheck {
    pub is_drift: bool,
    /// Distance from the center in meters, when a center exists
    pub offset_m: Option<f64>,
}

/// Stationary-center drift filter.
///
/// While at rest the filter holds an anchor point; fixes that wander less than
/// `drift_threshold_m` from it at low speed are GPS noise and earn no distance.
#[derive(Debug, Clone)]
pub struct DriftFilter {
    config: DriftConfig,
    center: Option<Coordinate>,
}

impl DriftFilter {
    pub fn new(config: DriftConfig) -> Self {
        Self {
            config,
            center: None,
        }
    }

    pub fn update(&mut self, mode: MovementMode, position: &Coordinate, speed_kmh: f64) -> DriftCheck {
        if mode.is_moving() || speed_kmh > self.config.release_speed_kmh {
            self.release(speed_kmh);
        } else if self.center.is_none() && speed_kmh < self.config.anchor_max_speed_kmh {
            log::debug!("Anchored stationary center at {}", position);
            self.center = Some(*position);
        }

        let offset_m = self
            .center
            .as_ref()
            .map(|center| geo_math::distance_m(center, position));

        let is_drift = match offset_m {
            Some(offset) => {
                offset < self.config.drift_threshold_m && speed_kmh < self.config.drift_max_speed_kmh
            }
            None => false,
        };

        if is_drift {
            log::trace!("Drift sample {:.1} m from center at {:.1} km/h", offset_m.unwrap_or(0.0), speed_kmh);
        }

        DriftCheck { is_drift, offset_m }
    }

    /// Mode feedback from the classifier: leaving STATIONARY starts a real segment
    pub fn on_mode_change(&mut self, mode: MovementMode) {
        if mode.is_moving() {
            self.release(0.0);
        }
    }

    /// Anchor directly, used when the pipeline (re)starts while at rest
    pub fn anchor(&mut self, position: &Coordinate) {
        self.center = Some(*position);
    }

    pub fn reset(&mut self) {
        self.center = None;
    }

    pub fn center(&self) -> Option<&Coordinate> {
        self.center.as_ref()
    }

    fn release(&mut self, speed_kmh: f64) {
        if self.center.take().is_some() {
            log::debug!("Released stationary center at {:.1} km/h", speed_kmh);
        }
    }
}

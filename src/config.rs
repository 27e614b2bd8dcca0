//! Engine configuration.
//!
//! Every struct carries serde defaults so a partial JSON file only needs to
//! name the fields it overrides.
use crate::error::{Result, TrackerError};
use crate::types::{Coordinate, MovementMode};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Speed bands for mode classification (km/h)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeThresholds {
    /// At or below this the rider is STATIONARY
    pub stationary_max_speed_kmh: f64,
    /// Above this the rider is CYCLING
    pub walking_max_speed_kmh: f64,
    /// Hold time before a slowing-down transition commits
    pub mode_switch_delay_ms: i64,
}

impl Default for ModeThresholds {
    fn default() -> Self {
        Self {
            stationary_max_speed_kmh: 2.0,
            walking_max_speed_kmh: 7.0,
            mode_switch_delay_ms: 10_000,
        }
    }
}

/// Per-mode acceptance limits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeProfile {
    /// Movement below this is treated as jitter (meters)
    pub min_movement_m: f64,
    /// Physical speed ceiling used for jump rejection (km/h)
    pub max_speed_kmh: f64,
    /// Samples closer together than this are dropped (ms)
    pub throttle_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeProfiles {
    pub stationary: ModeProfile,
    pub walking: ModeProfile,
    pub cycling: ModeProfile,
}

impl Default for ModeProfiles {
    fn default() -> Self {
        Self {
            stationary: ModeProfile {
                min_movement_m: 5.0,
                max_speed_kmh: 10.0,
                throttle_ms: 5_000,
            },
            walking: ModeProfile {
                min_movement_m: 3.0,
                max_speed_kmh: 15.0,
                throttle_ms: 3_000,
            },
            cycling: ModeProfile {
                min_movement_m: 5.0,
                max_speed_kmh: 60.0,
                throttle_ms: 1_500,
            },
        }
    }
}

impl ModeProfiles {
    pub fn for_mode(&self, mode: MovementMode) -> &ModeProfile {
        match mode {
            MovementMode::Stationary => &self.stationary,
            MovementMode::Walking => &self.walking,
            MovementMode::Cycling => &self.cycling,
        }
    }
}

/// Stationary-center drift suppression
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Radius around the center treated as noise (meters)
    pub drift_threshold_m: f64,
    /// Samples inside the radius are drift only below this speed (km/h)
    pub drift_max_speed_kmh: f64,
    /// Center is anchored only below this speed (km/h)
    pub anchor_max_speed_kmh: f64,
    /// Center is cleared above this speed (km/h)
    pub release_speed_kmh: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            drift_threshold_m: 8.0,
            drift_max_speed_kmh: 2.0,
            anchor_max_speed_kmh: 1.0,
            release_speed_kmh: 3.0,
        }
    }
}

/// Snapshot persistence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub storage_key: String,
    pub save_debounce_ms: i64,
    /// Today's distance survives a date change if the last activity is this recent
    pub daily_reset_grace_hours: f64,
    /// Offset used to decide the calendar date. `None` means the host's local offset.
    pub utc_offset_minutes: Option<i32>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            storage_key: "trip_odometer.state".to_string(),
            save_debounce_ms: 500,
            daily_reset_grace_hours: 6.0,
            utc_offset_minutes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub thresholds: ModeThresholds,
    pub profiles: ModeProfiles,
    pub drift: DriftConfig,
    pub persistence: PersistenceConfig,
    /// Fixes with a reported accuracy worse than this are dropped (meters)
    pub max_accuracy_m: f64,
    /// A silence longer than this restarts the pipeline from the next fix
    pub max_gap_ms: i64,
    /// Fixes stamped further than this ahead of the clock are dropped
    pub max_clock_skew_ms: i64,
    /// Allowed overshoot over a mode's speed ceiling before a fix is a GPS jump
    pub jump_slack_factor: f64,
    /// Length of the whole trip, used for progress and remaining distance
    pub configured_total_distance_km: f64,
    /// Manually configured trip start
    pub start_location: Option<Coordinate>,
    /// Take the first valid fix as the trip start when none is configured
    pub auto_detect_start: bool,
    /// Feed silence after which status reports the feed as unhealthy
    pub feed_silence_threshold_ms: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thresholds: ModeThresholds::default(),
            profiles: ModeProfiles::default(),
            drift: DriftConfig::default(),
            persistence: PersistenceConfig::default(),
            max_accuracy_m: 50.0,
            max_gap_ms: 30_000,
            max_clock_skew_ms: 3_600_000,
            jump_slack_factor: 1.5,
            configured_total_distance_km: 371.0,
            start_location: None,
            auto_detect_start: true,
            feed_silence_threshold_ms: 30_000,
        }
    }
}

impl EngineConfig {
    /// Load a (possibly partial) configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would break the classifier or accumulator
    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        if !(t.stationary_max_speed_kmh >= 0.0 && t.stationary_max_speed_kmh < t.walking_max_speed_kmh) {
            return Err(TrackerError::InvalidConfig(format!(
                "stationary_max_speed_kmh ({}) must be non-negative and below walking_max_speed_kmh ({})",
                t.stationary_max_speed_kmh, t.walking_max_speed_kmh
            )));
        }
        if t.mode_switch_delay_ms < 0 {
            return Err(TrackerError::InvalidConfig(
                "mode_switch_delay_ms must not be negative".to_string(),
            ));
        }

        for mode in MovementMode::ALL {
            let p = self.profiles.for_mode(mode);
            if !(p.min_movement_m >= 0.0 && p.max_speed_kmh > 0.0 && p.throttle_ms >= 0) {
                return Err(TrackerError::InvalidConfig(format!(
                    "profile for {} has invalid limits: {:?}",
                    mode, p
                )));
            }
        }

        if !(self.jump_slack_factor >= 1.0) {
            return Err(TrackerError::InvalidConfig(
                "jump_slack_factor must be at least 1.0".to_string(),
            ));
        }
        if !(self.configured_total_distance_km > 0.0 && self.configured_total_distance_km.is_finite()) {
            return Err(TrackerError::InvalidConfig(
                "configured_total_distance_km must be positive".to_string(),
            ));
        }
        if self.max_gap_ms <= 0 || self.persistence.save_debounce_ms < 0 {
            return Err(TrackerError::InvalidConfig(
                "max_gap_ms must be positive and save_debounce_ms non-negative".to_string(),
            ));
        }
        if self.max_clock_skew_ms <= 0 {
            return Err(TrackerError::InvalidConfig(
                "max_clock_skew_ms must be positive".to_string(),
            ));
        }
        if let Some(start) = &self.start_location {
            crate::validator::check_start(start).map_err(|issue| {
                TrackerError::InvalidConfig(format!("start_location rejected: {}", issue))
            })?;
        }
        if self.persistence.storage_key.is_empty() {
            return Err(TrackerError::InvalidConfig("storage_key must not be empty".to_string()));
        }
        Ok(())
    }
}

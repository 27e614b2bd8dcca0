//! Persisted trip snapshot schema.
//!
//! Version 1 is strict (`deny_unknown_fields`). Objects without a `version`
//! field are treated as the legacy browser-storage shape and migrated.
use crate::error::{Result, TrackerError};
use crate::types::{Coordinate, MovementMode};
use crate::validator;
use chrono::{FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SNAPSHOT_VERSION: u32 = 1;

const MS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PersistedSnapshot {
    pub version: u32,
    /// Kilometers traveled over the whole trip
    pub total_distance_traveled: f64,
    /// Kilometers traveled on `date`
    pub today_distance_traveled: f64,
    /// Calendar date the today-counter belongs to
    pub date: NaiveDate,
    /// Epoch milliseconds of the last state change
    pub last_active_time: i64,
    pub use_imperial_units: bool,
    /// Configured trip length in kilometers
    pub total_distance: f64,
    pub current_mode: MovementMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_start_location: Option<Coordinate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacySnapshot {
    total_distance_traveled: f64,
    #[serde(default)]
    today_distance_traveled: f64,
    date: Option<String>,
    last_active_time: Option<f64>,
    #[serde(default)]
    use_imperial_units: bool,
    total_distance: Option<f64>,
    current_mode: Option<String>,
    auto_start_location: Option<Coordinate>,
}

/// Calendar date of an epoch-millisecond instant at a fixed UTC offset
pub fn date_at(epoch_ms: i64, offset: &FixedOffset) -> NaiveDate {
    Utc.timestamp_millis_opt(epoch_ms)
        .single()
        .map(|instant| instant.with_timezone(offset).date_naive())
        .unwrap_or(NaiveDate::MIN)
}

impl PersistedSnapshot {
    /// Parse and validate snapshot JSON, migrating the legacy shape.
    ///
    /// `default_total_km` fills the trip length for legacy data that never stored one.
    pub fn from_json(text: &str, default_total_km: f64) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| TrackerError::ImportValidation(format!("not valid JSON: {}", e)))?;

        let object = value
            .as_object()
            .ok_or_else(|| TrackerError::ImportValidation("snapshot must be a JSON object".to_string()))?;

        let snapshot = match object.get("version") {
            None => Self::migrate_legacy(value, default_total_km)?,
            Some(Value::Number(n)) if n.as_u64() == Some(SNAPSHOT_VERSION as u64) => {
                serde_json::from_value(value)
                    .map_err(|e| TrackerError::ImportValidation(e.to_string()))?
            }
            Some(other) => {
                return Err(TrackerError::ImportValidation(format!(
                    "unsupported snapshot version {}",
                    other
                )))
            }
        };

        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn migrate_legacy(value: Value, default_total_km: f64) -> Result<Self> {
        let legacy: LegacySnapshot = serde_json::from_value(value)
            .map_err(|e| TrackerError::ImportValidation(format!("unrecognized snapshot shape: {}", e)))?;

        let last_active_time = legacy
            .last_active_time
            .filter(|t| t.is_finite() && *t >= 0.0)
            .map(|t| t as i64)
            .unwrap_or(0);

        // Unreadable dates fall back to the last activity, which the daily
        // reset check then judges on its own
        let date = legacy
            .date
            .as_deref()
            .and_then(parse_legacy_date)
            .unwrap_or_else(|| date_at(last_active_time, &Utc.fix()));

        let current_mode = match legacy.current_mode.as_deref().map(str::to_ascii_uppercase).as_deref() {
            Some("WALKING") => MovementMode::Walking,
            Some("CYCLING") => MovementMode::Cycling,
            _ => MovementMode::Stationary,
        };

        log::info!("Migrating legacy snapshot (date {}, {:.3} km)", date, legacy.total_distance_traveled);

        Ok(PersistedSnapshot {
            version: SNAPSHOT_VERSION,
            total_distance_traveled: legacy.total_distance_traveled,
            today_distance_traveled: legacy.today_distance_traveled,
            date,
            last_active_time,
            use_imperial_units: legacy.use_imperial_units,
            total_distance: legacy.total_distance.unwrap_or(default_total_km),
            current_mode,
            auto_start_location: legacy.auto_start_location,
        })
    }

    pub fn validate(&self) -> Result<()> {
        let distances = [
            ("totalDistanceTraveled", self.total_distance_traveled),
            ("todayDistanceTraveled", self.today_distance_traveled),
        ];
        for (name, value) in distances {
            if !value.is_finite() || value < 0.0 {
                return Err(TrackerError::ImportValidation(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if !self.total_distance.is_finite() || self.total_distance <= 0.0 {
            return Err(TrackerError::ImportValidation(format!(
                "totalDistance must be positive, got {}",
                self.total_distance
            )));
        }
        if self.last_active_time < 0 {
            return Err(TrackerError::ImportValidation(
                "lastActiveTime must not be negative".to_string(),
            ));
        }
        if let Some(start) = &self.auto_start_location {
            validator::check_start(start).map_err(|issue| {
                TrackerError::ImportValidation(format!("autoStartLocation rejected: {}", issue))
            })?;
        }
        Ok(())
    }

    /// Daily-reset policy: a new calendar day only clears today's distance
    /// once the trip has also been idle longer than the grace period.
    /// Returns true when today's distance was cleared.
    pub fn apply_daily_reset(&mut self, now_ms: i64, offset: &FixedOffset, grace_hours: f64) -> bool {
        let today = date_at(now_ms, offset);
        if self.date == today {
            return false;
        }

        let idle_hours = now_ms.saturating_sub(self.last_active_time) as f64 / MS_PER_HOUR;
        if idle_hours > grace_hours {
            log::info!(
                "New day ({} -> {}) after {:.1} h idle, clearing {:.3} km of today's distance",
                self.date,
                today,
                idle_hours,
                self.today_distance_traveled
            );
            self.today_distance_traveled = 0.0;
            self.date = today;
            true
        } else {
            log::debug!(
                "New day ({} -> {}) but only {:.1} h idle, keeping today's distance",
                self.date,
                today,
                idle_hours
            );
            false
        }
    }
}

/// Accepts ISO dates and the JavaScript `Date.toDateString()` form ("Fri Oct 16 2026")
fn parse_legacy_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(text, "%a %b %d %Y"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn ms(date: &str, hour: u32) -> i64 {
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis()
    }

    fn sample() -> PersistedSnapshot {
        PersistedSnapshot {
            version: SNAPSHOT_VERSION,
            total_distance_traveled: 120.5,
            today_distance_traveled: 12.25,
            date: NaiveDate::from_ymd_opt(2026, 10, 15).unwrap(),
            last_active_time: ms("2026-10-15", 22),
            use_imperial_units: false,
            total_distance: 371.0,
            current_mode: MovementMode::Walking,
            auto_start_location: Some(Coordinate::new(51.5, -0.12)),
        }
    }

    #[test]
    fn test_json_round_trip() {
        let snapshot = sample();
        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"totalDistanceTraveled\""));
        assert!(json.contains("\"date\": \"2026-10-15\""));
        let parsed = PersistedSnapshot::from_json(&json, 1.0).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let json = r#"{"version":1,"totalDistanceTraveled":1,"todayDistanceTraveled":0,
            "date":"2026-10-15","lastActiveTime":0,"useImperialUnits":false,
            "totalDistance":10,"currentMode":"WALKING","bogus":true}"#;
        assert!(matches!(
            PersistedSnapshot::from_json(json, 1.0),
            Err(TrackerError::ImportValidation(_))
        ));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let json = r#"{"version":7,"totalDistanceTraveled":1}"#;
        let err = PersistedSnapshot::from_json(json, 1.0).unwrap_err();
        assert!(err.to_string().contains("unsupported snapshot version"));
    }

    #[test]
    fn test_negative_distance_rejected() {
        let mut snapshot = sample();
        snapshot.today_distance_traveled = -1.0;
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_origin_start_rejected() {
        let mut snapshot = sample();
        snapshot.auto_start_location = Some(Coordinate::new(0.0, 0.0));
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_legacy_migration() {
        let json = r#"{"totalDistanceTraveled":42.5,"todayDistanceTraveled":3.5,
            "date":"Thu Oct 15 2026","lastActiveTime":1792101600000.0,
            "useImperialUnits":true,"currentMode":"cycling"}"#;
        let snapshot = PersistedSnapshot::from_json(json, 371.0).unwrap();
        assert_eq!(snapshot.version, SNAPSHOT_VERSION);
        assert_eq!(snapshot.date, NaiveDate::from_ymd_opt(2026, 10, 15).unwrap());
        assert_eq!(snapshot.total_distance, 371.0);
        assert_eq!(snapshot.current_mode, MovementMode::Cycling);
        assert!(snapshot.use_imperial_units);
        assert_eq!(snapshot.last_active_time, 1_792_101_600_000);
    }

    #[test]
    fn test_not_an_object() {
        assert!(PersistedSnapshot::from_json("[1,2,3]", 1.0).is_err());
        assert!(PersistedSnapshot::from_json("{{{", 1.0).is_err());
    }

    #[test]
    fn test_daily_reset_after_grace() {
        let mut snapshot = sample(); // last active 2026-10-15 22:00
        let cleared = snapshot.apply_daily_reset(ms("2026-10-16", 9), &utc(), 6.0);
        assert!(cleared);
        assert_eq!(snapshot.today_distance_traveled, 0.0);
        assert_eq!(snapshot.date, NaiveDate::from_ymd_opt(2026, 10, 16).unwrap());
        assert_eq!(snapshot.total_distance_traveled, 120.5);
    }

    #[test]
    fn test_daily_reset_within_grace() {
        let mut snapshot = sample();
        let cleared = snapshot.apply_daily_reset(ms("2026-10-16", 1), &utc(), 6.0);
        assert!(!cleared);
        assert_eq!(snapshot.today_distance_traveled, 12.25);
    }

    #[test]
    fn test_same_day_never_resets() {
        let mut snapshot = sample();
        snapshot.last_active_time = ms("2026-10-15", 0);
        assert!(!snapshot.apply_daily_reset(ms("2026-10-15", 23), &utc(), 6.0));
    }

    #[test]
    fn test_daily_reset_survives_extreme_timestamps() {
        let mut snapshot = sample();
        assert!(!snapshot.apply_daily_reset(i64::MIN, &utc(), 6.0));
        assert_eq!(snapshot.today_distance_traveled, 12.25);

        snapshot.last_active_time = i64::MIN;
        assert!(snapshot.apply_daily_reset(ms("2026-10-16", 9), &utc(), 6.0));
        assert_eq!(snapshot.today_distance_traveled, 0.0);
    }

    #[test]
    fn test_date_respects_offset() {
        let instant = ms("2026-10-15", 23);
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(date_at(instant, &utc()), NaiveDate::from_ymd_opt(2026, 10, 15).unwrap());
        assert_eq!(date_at(instant, &plus_two), NaiveDate::from_ymd_opt(2026, 10, 16).unwrap());
    }
}

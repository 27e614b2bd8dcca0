use crate::health_monitor::ConnectionMeta;
use crate::types::{Coordinate, MovementMode, Units};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Queryable trip status for rendering and debug collaborators.
/// All distances are kilometers; `use_imperial_units` is only a display hint.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub traveled_distance: f64,
    pub today_distance: f64,
    pub remaining_distance: f64,
    /// 0-100, clamped
    pub progress_percent: f64,
    pub current_mode: MovementMode,
    pub use_imperial_units: bool,
    pub last_position: Option<Coordinate>,
    pub start_location: Option<Coordinate>,
    pub total_distance: f64,
    pub recent_speed_kmh: Option<f64>,
    pub connection_meta: ConnectionMeta,
}

impl StatusSnapshot {
    pub fn units(&self) -> Units {
        Units::from_imperial_flag(self.use_imperial_units)
    }

    /// One-line summary in the preferred units
    pub fn summary(&self) -> String {
        let units = self.units();
        format!(
            "{} | {} of {} ({:.1}%), today {}, {} left",
            self.current_mode,
            units.format_distance(self.traveled_distance),
            units.format_distance(self.total_distance),
            self.progress_percent,
            units.format_distance(self.today_distance),
            units.format_distance(self.remaining_distance),
        )
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// `save`, logging a failure instead of returning it. Returns true on success.
    pub fn save_or_warn(&self, path: &Path) -> bool {
        match self.save(path) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to write status file {}: {}", path.display(), e);
                false
            }
        }
    }
}

/// Progress through the trip as a clamped percentage
pub fn progress_percent(traveled_km: f64, total_km: f64) -> f64 {
    if total_km <= 0.0 || !traveled_km.is_finite() {
        return 0.0;
    }
    (traveled_km / total_km * 100.0).clamp(0.0, 100.0)
}

pub fn remaining_km(traveled_km: f64, total_km: f64) -> f64 {
    (total_km - traveled_km).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_clamped() {
        assert_eq!(progress_percent(185.5, 371.0), 50.0);
        assert_eq!(progress_percent(500.0, 371.0), 100.0);
        assert_eq!(progress_percent(0.0, 0.0), 0.0);
        assert_eq!(remaining_km(500.0, 371.0), 0.0);
        assert_eq!(remaining_km(71.0, 371.0), 300.0);
    }

    fn status() -> StatusSnapshot {
        StatusSnapshot {
            traveled_distance: 1.0,
            today_distance: 1.0,
            remaining_distance: 9.0,
            progress_percent: 10.0,
            current_mode: MovementMode::Walking,
            use_imperial_units: true,
            last_position: None,
            start_location: None,
            total_distance: 10.0,
            recent_speed_kmh: None,
            connection_meta: ConnectionMeta {
                source: None,
                last_sample_ms: None,
                samples_received: 0,
                samples_accepted: 0,
                feed_healthy: true,
                silence_ms: None,
            },
        }
    }

    #[test]
    fn test_save_writes_camel_case() {
        let status = status();
        let path = std::env::temp_dir().join(format!("trip_odometer_status_{}.json", std::process::id()));
        status.save(&path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"progressPercent\": 10.0"));
        assert!(text.contains("\"currentMode\": \"WALKING\""));
        assert!(status.summary().contains("mi"));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_save_or_warn_reports_unwritable_path() {
        let dir = std::env::temp_dir().join(format!("trip_odometer_missing_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        assert!(!status().save_or_warn(&dir.join("status.json")));
        assert!(!dir.exists());
    }
}

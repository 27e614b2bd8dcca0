use super::{Engine, EngineEvent};
use crate::clock::Clock;
use crate::error::{Result, TrackerError};
use crate::persistence::{PersistedSnapshot, SnapshotStore};
use crate::types::{Coordinate, MovementMode, Units};
use crate::validator;

/// Explicit control commands.
///
/// Each command validates its argument first and leaves state untouched on
/// error. Successful commands stamp the last-active time, notify listeners
/// and write the snapshot immediately.
impl<S: SnapshotStore, C: Clock> Engine<S, C> {
    /// Signed adjustment of both totals; neither drops below zero
    pub fn add_distance(&mut self, km: f64) -> Result<()> {
        if !km.is_finite() {
            return Err(TrackerError::InvalidCommand(format!(
                "add_distance expects a finite distance, got {}",
                km
            )));
        }
        let before = self.accumulator.total_km();
        self.accumulator.add(km);
        log::info!("add_distance({:+.3} km): total {:.3} km", km, self.accumulator.total_km());
        self.finish_distance_command(before);
        Ok(())
    }

    /// Overwrite the trip total; today is clamped to it
    pub fn set_distance(&mut self, km: f64) -> Result<()> {
        if !(km.is_finite() && km >= 0.0) {
            return Err(TrackerError::InvalidCommand(format!(
                "set_distance expects a non-negative distance, got {}",
                km
            )));
        }
        let before = self.accumulator.total_km();
        self.accumulator.set_total(km);
        log::info!("set_distance({:.3} km)", km);
        self.finish_distance_command(before);
        Ok(())
    }

    /// Move the trip total up to `percent` of the configured trip length.
    /// A target below the current total leaves the total alone.
    pub fn jump_to_progress(&mut self, percent: f64) -> Result<()> {
        if !(0.0..=100.0).contains(&percent) {
            return Err(TrackerError::InvalidCommand(format!(
                "jump_to_progress expects a percentage in [0, 100], got {}",
                percent
            )));
        }
        let target_km = percent / 100.0 * self.configured_total_km;
        let before = self.accumulator.total_km();
        let increase = self.accumulator.raise_total_to(target_km);
        if increase > 0.0 {
            log::info!("jump_to_progress({:.1}%): total {:.3} km", percent, target_km);
        } else {
            log::info!(
                "jump_to_progress({:.1}%): already at {:.3} km, total unchanged",
                percent,
                before
            );
        }
        self.finish_distance_command(before);
        Ok(())
    }

    pub fn set_total_distance(&mut self, km: f64) -> Result<()> {
        if !(km.is_finite() && km > 0.0) {
            return Err(TrackerError::InvalidCommand(format!(
                "set_total_distance expects a positive distance, got {}",
                km
            )));
        }
        self.configured_total_km = km;
        log::info!("Trip length set to {:.3} km", km);
        self.finish_settings_command();
        Ok(())
    }

    pub fn set_units(&mut self, units: Units) {
        self.units = units;
        log::info!("Display units set to {}", units.label());
        self.finish_settings_command();
    }

    pub fn set_start_location(&mut self, start: Coordinate) -> Result<()> {
        validator::check_start(&start).map_err(|issue| {
            TrackerError::InvalidCommand(format!("start location {} rejected: {}", start, issue))
        })?;
        let now = self.clock.now_ms();
        self.start_location = Some(start);
        self.last_active_ms = now;
        log::info!("Trip start set to {}", start);
        self.emit(EngineEvent::StartLocationSet(start));
        self.save_now(now);
        Ok(())
    }

    /// Full reset: totals, mode, pipeline and the detected start location
    pub fn reset_trip(&mut self) {
        let now = self.clock.now_ms();
        self.accumulator.reset_trip();
        self.classifier.restore(MovementMode::Stationary, now);
        self.reset_pipeline();
        self.start_location = self.config.start_location;
        self.today_date = self.persistence.date_for(now);
        self.last_active_ms = now;
        log::info!("Trip reset");
        self.emit(EngineEvent::StateReset { today_only: false });
        self.save_now(now);
    }

    pub fn reset_today(&mut self) {
        let now = self.clock.now_ms();
        self.accumulator.reset_today();
        self.today_date = self.persistence.date_for(now);
        self.last_active_ms = now;
        log::info!("Today's distance reset");
        self.emit(EngineEvent::StateReset { today_only: true });
        self.save_now(now);
    }

    /// Validate `json` as a snapshot and replace the trip state with it.
    /// Invalid input is rejected before anything changes.
    pub fn import_snapshot(&mut self, json: &str) -> Result<()> {
        let snapshot = PersistedSnapshot::from_json(json, self.configured_total_km)?;
        let now = self.clock.now_ms();
        self.apply_snapshot(&snapshot, now);
        log::info!(
            "Imported snapshot: {:.3} km total, {:.3} km today ({})",
            snapshot.total_distance_traveled,
            snapshot.today_distance_traveled,
            snapshot.date
        );
        self.emit(EngineEvent::SnapshotImported);
        self.save_now(now);
        Ok(())
    }

    /// Current state in the persisted snapshot format
    pub fn export_snapshot(&self) -> Result<String> {
        self.snapshot().to_json()
    }

    /// Shutdown write: persists the current trip if a debounced save is
    /// pending or storage had fallen back to memory. Returns true if anything was written.
    pub fn flush(&mut self) -> bool {
        let now = self.clock.now_ms();
        let snapshot = self.snapshot();
        self.persistence.flush(&snapshot, now)
    }

    fn finish_distance_command(&mut self, before_km: f64) {
        let now = self.clock.now_ms();
        self.last_active_ms = now;
        let total_km = self.accumulator.total_km();
        self.emit(EngineEvent::DistanceChanged {
            total_km,
            today_km: self.accumulator.today_km(),
            delta_km: total_km - before_km,
        });
        self.save_now(now);
    }

    fn finish_settings_command(&mut self) {
        let now = self.clock.now_ms();
        self.last_active_ms = now;
        self.emit(EngineEvent::TripSettingsChanged {
            total_distance_km: self.configured_total_km,
            units: self.units,
        });
        self.save_now(now);
    }
}

#[cfg(test)]
mod tests {
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::engine::{Engine, EngineEvent};
    use crate::error::TrackerError;
    use crate::persistence::MemoryStore;
    use crate::types::{Coordinate, Units};
    use approx::assert_abs_diff_eq;
    use std::sync::{Arc, Mutex};

    fn engine() -> Engine<MemoryStore, ManualClock> {
        let mut config = EngineConfig::default();
        config.persistence.utc_offset_minutes = Some(0);
        Engine::new(config, MemoryStore::new(), ManualClock::new(1_000_000)).unwrap()
    }

    #[test]
    fn test_add_distance_floors_at_zero() {
        let mut engine = engine();
        engine.set_distance(10.0).unwrap();
        engine.add_distance(-500.0).unwrap();
        assert_eq!(engine.total_km(), 0.0);
        assert_eq!(engine.today_km(), 0.0);
    }

    #[test]
    fn test_jump_to_progress_never_lowers() {
        let mut engine = engine();
        engine.jump_to_progress(50.0).unwrap();
        assert_abs_diff_eq!(engine.total_km(), 185.5, epsilon = 1e-9);
        assert_abs_diff_eq!(engine.status().progress_percent, 50.0, epsilon = 1e-9);

        engine.jump_to_progress(10.0).unwrap();
        assert_abs_diff_eq!(engine.total_km(), 185.5, epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_arguments_leave_state_alone() {
        let mut engine = engine();
        engine.set_distance(3.0).unwrap();
        let writes = engine.persistence().write_count();

        assert!(matches!(engine.set_distance(-1.0), Err(TrackerError::InvalidCommand(_))));
        assert!(matches!(engine.jump_to_progress(101.0), Err(TrackerError::InvalidCommand(_))));
        assert!(matches!(engine.set_total_distance(0.0), Err(TrackerError::InvalidCommand(_))));
        assert!(matches!(engine.add_distance(f64::NAN), Err(TrackerError::InvalidCommand(_))));
        assert!(matches!(
            engine.set_start_location(Coordinate::new(0.0, 0.0)),
            Err(TrackerError::InvalidCommand(_))
        ));

        assert_eq!(engine.total_km(), 3.0);
        assert_eq!(engine.persistence().write_count(), writes);
    }

    #[test]
    fn test_commands_bypass_debounce() {
        let mut engine = engine();
        engine.add_distance(1.0).unwrap();
        engine.add_distance(1.0).unwrap();
        engine.set_units(Units::Imperial);
        assert_eq!(engine.persistence().write_count(), 3);
        assert!(!engine.persistence().has_pending());
    }

    #[test]
    fn test_import_rejects_bad_snapshot() {
        let mut engine = engine();
        engine.set_distance(7.0).unwrap();
        let result = engine.import_snapshot(r#"{"version": 1, "totalDistanceTraveled": -3}"#);
        assert!(matches!(result, Err(TrackerError::ImportValidation(_))));
        assert_eq!(engine.total_km(), 7.0);
    }

    #[test]
    fn test_export_import_round_trip() {
        let mut source = engine();
        source.set_distance(42.0).unwrap();
        source.set_units(Units::Imperial);
        source.set_start_location(Coordinate::new(52.52, 13.405)).unwrap();
        let json = source.export_snapshot().unwrap();

        let mut target = engine();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        target.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
        target.import_snapshot(&json).unwrap();

        assert_eq!(target.snapshot(), source.snapshot());
        assert_eq!(events.lock().unwrap().as_slice(), &[EngineEvent::SnapshotImported]);
    }

    #[test]
    fn test_reset_trip_clears_everything() {
        let mut engine = engine();
        engine.set_distance(12.0).unwrap();
        engine.set_start_location(Coordinate::new(48.1, 11.6)).unwrap();
        engine.reset_trip();

        let state = engine.state();
        assert_eq!(state.total_distance_km, 0.0);
        assert_eq!(state.today_distance_km, 0.0);
        assert_eq!(state.start_location, None);
        assert_eq!(state.last_position, None);
    }
}

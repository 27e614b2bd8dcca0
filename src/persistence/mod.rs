//! Debounced snapshot persistence.
//!
//! Nothing in here returns an error to the pipeline: storage problems are
//! logged and the engine carries on in memory.
pub mod snapshot;
pub mod store;

pub use snapshot::{date_at, PersistedSnapshot, SNAPSHOT_VERSION};
pub use store::{FileStore, MemoryStore, SnapshotStore};

use crate::config::PersistenceConfig;
use chrono::{FixedOffset, Local, NaiveDate, Offset};

/// Save state machine: Idle -> DebouncedPending -> Saved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    DebouncedPending,
    Saved,
}

#[derive(Debug, Clone)]
struct PendingSave {
    snapshot: PersistedSnapshot,
    deadline_ms: i64,
}

/// Result of loading stored state
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedState {
    pub snapshot: PersistedSnapshot,
    /// Today's distance was cleared by the daily-reset policy
    pub today_reset: bool,
}

pub struct PersistenceManager<S: SnapshotStore> {
    store: S,
    config: PersistenceConfig,
    offset: FixedOffset,
    state: SaveState,
    last_write_ms: Option<i64>,
    pending: Option<PendingSave>,
    memory_only: bool,
    writes: u64,
    failures: u64,
}

impl<S: SnapshotStore> PersistenceManager<S> {
    pub fn new(store: S, config: PersistenceConfig) -> Self {
        let offset = config
            .utc_offset_minutes
            .and_then(|minutes| FixedOffset::east_opt(minutes * 60))
            .unwrap_or_else(|| Local::now().offset().fix());

        Self {
            store,
            config,
            offset,
            state: SaveState::Idle,
            last_write_ms: None,
            pending: None,
            memory_only: false,
            writes: 0,
            failures: 0,
        }
    }

    /// Calendar date of `now_ms` in the configured timezone
    pub fn date_for(&self, now_ms: i64) -> NaiveDate {
        date_at(now_ms, &self.offset)
    }

    pub fn offset(&self) -> &FixedOffset {
        &self.offset
    }

    /// Load the stored snapshot and apply the daily-reset policy.
    /// Missing or corrupt data yields `None`.
    pub fn load(&self, now_ms: i64, default_total_km: f64) -> Option<LoadedState> {
        let key = &self.config.storage_key;
        let text = match self.store.read(key) {
            Ok(Some(text)) => text,
            Ok(None) => {
                log::info!("No saved trip state under '{}', starting fresh", key);
                return None;
            }
            Err(e) => {
                log::warn!("Failed to read saved trip state: {}", e);
                return None;
            }
        };

        let mut snapshot = match PersistedSnapshot::from_json(&text, default_total_km) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!("Ignoring corrupt trip state under '{}': {}", key, e);
                return None;
            }
        };

        let today_reset =
            snapshot.apply_daily_reset(now_ms, &self.offset, self.config.daily_reset_grace_hours);
        log::info!(
            "Restored trip state: {:.3} km total, {:.3} km today",
            snapshot.total_distance_traveled,
            snapshot.today_distance_traveled
        );
        Some(LoadedState {
            snapshot,
            today_reset,
        })
    }

    /// Debounced save. Requests within `save_debounce_ms` of the last write
    /// collapse into one write at the end of the window; the newest snapshot wins.
    pub fn request_save(&mut self, snapshot: PersistedSnapshot, now_ms: i64) -> SaveState {
        if self.memory_only {
            log::trace!("Memory-only mode, skipping debounced save");
            return self.state;
        }

        match self.last_write_ms {
            Some(last) if now_ms.saturating_sub(last) < self.config.save_debounce_ms => {
                let deadline_ms = last.saturating_add(self.config.save_debounce_ms);
                self.pending = Some(PendingSave {
                    snapshot,
                    deadline_ms,
                });
                self.state = SaveState::DebouncedPending;
            }
            _ => {
                self.pending = None;
                self.write(&snapshot, now_ms);
            }
        }
        self.state
    }

    /// Write immediately, bypassing the debounce (commands, shutdown)
    pub fn save_now(&mut self, snapshot: &PersistedSnapshot, now_ms: i64) -> bool {
        self.pending = None;
        self.write(snapshot, now_ms)
    }

    /// Run a debounced write whose window has closed
    pub fn poll(&mut self, now_ms: i64) -> bool {
        match &self.pending {
            Some(pending) if now_ms >= pending.deadline_ms => {}
            _ => return false,
        }
        match self.pending.take() {
            Some(pending) => self.write(&pending.snapshot, now_ms),
            None => false,
        }
    }

    /// Shutdown write. Forces `snapshot` out when a debounced save is still
    /// waiting or when earlier failures left the trip in memory only.
    pub fn flush(&mut self, snapshot: &PersistedSnapshot, now_ms: i64) -> bool {
        if self.pending.is_none() && !self.memory_only {
            return false;
        }
        self.save_now(snapshot, now_ms)
    }

    fn write(&mut self, snapshot: &PersistedSnapshot, now_ms: i64) -> bool {
        let json = match snapshot.to_json() {
            Ok(json) => json,
            Err(e) => {
                log::warn!("Failed to serialize trip state: {}", e);
                return false;
            }
        };

        let key = self.config.storage_key.clone();
        if let Err(first) = self.store.write(&key, &json) {
            log::warn!("Saving trip state failed ({}), clearing stale entry and retrying", first);
            self.failures += 1;
            let _ = self.store.remove(&key);

            if let Err(second) = self.store.write(&key, &json) {
                self.failures += 1;
                if !self.memory_only {
                    log::warn!("Saving trip state failed again ({}), continuing in memory only", second);
                }
                self.memory_only = true;
                return false;
            }
        }

        if self.memory_only {
            log::info!("Storage recovered, leaving memory-only mode");
        }
        self.memory_only = false;
        self.last_write_ms = Some(now_ms);
        self.state = SaveState::Saved;
        self.writes += 1;
        true
    }

    pub fn state(&self) -> SaveState {
        self.state
    }

    pub fn is_memory_only(&self) -> bool {
        self.memory_only
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_deadline_ms(&self) -> Option<i64> {
        self.pending.as_ref().map(|p| p.deadline_ms)
    }

    pub fn write_count(&self) -> u64 {
        self.writes
    }

    pub fn failure_count(&self) -> u64 {
        self.failures
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MovementMode;

    fn config() -> PersistenceConfig {
        PersistenceConfig {
            utc_offset_minutes: Some(0),
            ..PersistenceConfig::default()
        }
    }

    fn snapshot(total: f64) -> PersistedSnapshot {
        PersistedSnapshot {
            version: SNAPSHOT_VERSION,
            total_distance_traveled: total,
            today_distance_traveled: total,
            date: NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
            last_active_time: 0,
            use_imperial_units: false,
            total_distance: 371.0,
            current_mode: MovementMode::Stationary,
            auto_start_location: None,
        }
    }

    fn stored_total(manager: &PersistenceManager<MemoryStore>) -> f64 {
        let text = manager.store().get("trip_odometer.state").unwrap();
        PersistedSnapshot::from_json(text, 1.0).unwrap().total_distance_traveled
    }

    #[test]
    fn test_first_request_writes_immediately() {
        let mut manager = PersistenceManager::new(MemoryStore::new(), config());
        assert_eq!(manager.state(), SaveState::Idle);
        assert_eq!(manager.request_save(snapshot(1.0), 1_000), SaveState::Saved);
        assert_eq!(manager.write_count(), 1);
    }

    #[test]
    fn test_requests_inside_window_coalesce() {
        let mut manager = PersistenceManager::new(MemoryStore::new(), config());
        manager.request_save(snapshot(1.0), 1_000);
        assert_eq!(manager.request_save(snapshot(2.0), 1_100), SaveState::DebouncedPending);
        assert_eq!(manager.request_save(snapshot(3.0), 1_300), SaveState::DebouncedPending);
        assert_eq!(manager.pending_deadline_ms(), Some(1_500));
        assert_eq!(manager.write_count(), 1);

        assert!(!manager.poll(1_499));
        assert!(manager.poll(1_500));
        assert_eq!(manager.write_count(), 2);
        assert_eq!(stored_total(&manager), 3.0);
        assert_eq!(manager.state(), SaveState::Saved);
    }

    #[test]
    fn test_save_now_bypasses_debounce() {
        let mut manager = PersistenceManager::new(MemoryStore::new(), config());
        manager.request_save(snapshot(1.0), 1_000);
        manager.request_save(snapshot(2.0), 1_100);
        assert!(manager.save_now(&snapshot(5.0), 1_150));
        assert!(!manager.has_pending());
        assert_eq!(stored_total(&manager), 5.0);
    }

    #[test]
    fn test_retry_after_single_failure() {
        let mut manager = PersistenceManager::new(MemoryStore::new(), config());
        manager.store_mut().fail_next_writes(1);
        assert!(manager.save_now(&snapshot(4.0), 0));
        assert!(!manager.is_memory_only());
        assert_eq!(manager.failure_count(), 1);
    }

    #[test]
    fn test_memory_only_after_repeated_failure() {
        let mut manager = PersistenceManager::new(MemoryStore::new(), config());
        manager.store_mut().fail_next_writes(2);
        assert!(!manager.save_now(&snapshot(4.0), 0));
        assert!(manager.is_memory_only());

        // Debounced saves are skipped while degraded
        manager.request_save(snapshot(5.0), 10_000);
        assert_eq!(manager.write_count(), 0);

        // A forced save that succeeds clears the degraded mode
        assert!(manager.save_now(&snapshot(6.0), 20_000));
        assert!(!manager.is_memory_only());
    }

    #[test]
    fn test_flush_writes_pending_or_degraded_state() {
        let mut manager = PersistenceManager::new(MemoryStore::new(), config());
        manager.request_save(snapshot(1.0), 1_000);
        assert!(!manager.flush(&snapshot(1.0), 1_050));

        manager.request_save(snapshot(2.0), 1_100);
        assert!(manager.flush(&snapshot(2.5), 1_150));
        assert!(!manager.has_pending());
        assert_eq!(stored_total(&manager), 2.5);

        manager.store_mut().fail_next_writes(2);
        assert!(!manager.save_now(&snapshot(3.0), 2_000));
        assert!(manager.is_memory_only());
        manager.request_save(snapshot(4.0), 3_000);
        assert!(!manager.has_pending());

        assert!(manager.flush(&snapshot(4.0), 3_100));
        assert!(!manager.is_memory_only());
        assert_eq!(stored_total(&manager), 4.0);
    }

    #[test]
    fn test_debounce_window_saturates_on_extreme_timestamps() {
        let mut manager = PersistenceManager::new(MemoryStore::new(), config());
        manager.request_save(snapshot(1.0), i64::MAX - 10);
        assert_eq!(manager.request_save(snapshot(2.0), i64::MAX), SaveState::DebouncedPending);
        assert_eq!(manager.pending_deadline_ms(), Some(i64::MAX));
        assert_eq!(manager.request_save(snapshot(3.0), i64::MIN), SaveState::DebouncedPending);
        assert_eq!(manager.write_count(), 1);
    }

    #[test]
    fn test_load_missing_and_corrupt() {
        let mut manager = PersistenceManager::new(MemoryStore::new(), config());
        assert!(manager.load(0, 371.0).is_none());
        manager.store_mut().insert("trip_odometer.state", "{not json");
        assert!(manager.load(0, 371.0).is_none());
    }

    #[test]
    fn test_save_then_load() {
        let mut manager = PersistenceManager::new(MemoryStore::new(), config());
        manager.save_now(&snapshot(7.5), 0);
        let loaded = manager.load(60_000, 371.0).unwrap();
        assert!(!loaded.today_reset);
        assert_eq!(loaded.snapshot, snapshot(7.5));
    }
}

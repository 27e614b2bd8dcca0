//! Trip engine: owns all mutable trip state and runs every fix through the
//! pipeline.
//!
//! Validator -> accuracy -> throttle -> speed -> drift -> mode -> accumulator,
//! then a debounced save. The engine is single-threaded and never blocks;
//! hosts with several producers marshal everything onto one task.
mod commands;
pub mod state;

pub use state::{EngineEvent, EngineState, Listener};

use crate::accumulator::{Candidate, DistanceAccumulator};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::drift::DriftFilter;
use crate::error::Result;
use crate::feed::LocationEvent;
use crate::health_monitor::FeedHealth;
use crate::live_status::{self, StatusSnapshot};
use crate::mode::{ModeChange, ModeClassifier};
use crate::outcome::{Rejection, SampleOutcome};
use crate::persistence::{PersistedSnapshot, PersistenceManager, SnapshotStore, SNAPSHOT_VERSION};
use crate::smoothing::SpeedHistory;
use crate::speed;
use crate::types::{Coordinate, LocationSample, MovementMode, Units, METERS_PER_KM};
use crate::validator;
use chrono::NaiveDate;

pub struct Engine<S: SnapshotStore, C: Clock> {
    config: EngineConfig,
    clock: C,
    classifier: ModeClassifier,
    drift: DriftFilter,
    accumulator: DistanceAccumulator,
    persistence: PersistenceManager<S>,
    health: FeedHealth,
    speed_history: SpeedHistory,
    /// Last fix that advanced the pipeline
    last_position: Option<Coordinate>,
    last_update_time_ms: Option<i64>,
    /// Last fix that got past the throttle
    last_considered_ms: Option<i64>,
    start_location: Option<Coordinate>,
    units: Units,
    configured_total_km: f64,
    /// Calendar date the today-counter belongs to
    today_date: NaiveDate,
    last_active_ms: i64,
    listeners: Vec<Listener>,
}

impl<S: SnapshotStore, C: Clock> Engine<S, C> {
    /// Fresh engine with zeroed totals. Nothing is read from the store.
    pub fn new(config: EngineConfig, store: S, clock: C) -> Result<Self> {
        config.validate()?;

        let now = clock.now_ms();
        let persistence = PersistenceManager::new(store, config.persistence.clone());
        let today_date = persistence.date_for(now);

        Ok(Self {
            classifier: ModeClassifier::new(config.thresholds),
            drift: DriftFilter::new(config.drift),
            accumulator: DistanceAccumulator::new(
                config.profiles,
                config.thresholds.stationary_max_speed_kmh,
                config.jump_slack_factor,
            ),
            health: FeedHealth::new(config.feed_silence_threshold_ms),
            speed_history: SpeedHistory::default(),
            last_position: None,
            last_update_time_ms: None,
            last_considered_ms: None,
            start_location: config.start_location,
            units: Units::Metric,
            configured_total_km: config.configured_total_distance_km,
            today_date,
            last_active_ms: now,
            listeners: Vec::new(),
            persistence,
            clock,
            config,
        })
    }

    /// Engine restored from the store, with the daily-reset policy applied.
    /// Missing or corrupt stored state falls back to a fresh engine.
    pub fn open(config: EngineConfig, store: S, clock: C) -> Result<Self> {
        let mut engine = Self::new(config, store, clock)?;
        let now = engine.clock.now_ms();

        if let Some(loaded) = engine.persistence.load(now, engine.configured_total_km) {
            engine.apply_snapshot(&loaded.snapshot, now);
            if loaded.today_reset {
                engine.save_now(now);
            }
        }
        Ok(engine)
    }

    /// Register a change listener. Listeners run synchronously, in
    /// registration order, after the state change they describe.
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&EngineEvent) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Entry point for feed adapters
    pub fn on_location_sample(&mut self, event: &LocationEvent) -> SampleOutcome {
        self.health.record_received(event.source, event.timestamp_ms);
        let outcome = self.process_sample(&LocationSample::from(event));
        if outcome.is_accepted() {
            self.health.record_accepted();
        }
        outcome
    }

    /// Run one fix through the pipeline. The fix's timestamp is "now" for
    /// every timer and throttle decision made while it is processed.
    pub fn process_sample(&mut self, sample: &LocationSample) -> SampleOutcome {
        let now = sample.timestamp_ms;
        let clock_ms = self.clock.now_ms();
        if now < 0 || now.saturating_sub(clock_ms) > self.config.max_clock_skew_ms {
            log::warn!(
                "Dropping fix {}: timestamp {} is implausible at clock {}",
                sample.coordinate,
                now,
                clock_ms
            );
            return SampleOutcome::Rejected(Rejection::InvalidTimestamp { timestamp_ms: now });
        }
        self.run_timers(now);
        self.run_pipeline(sample, now)
    }

    /// Fire expired timers (mode delay, day rollover, save debounce) at clock time
    pub fn tick(&mut self) {
        let now = self.clock.now_ms();
        self.run_timers(now);
    }

    fn run_timers(&mut self, now_ms: i64) {
        if let Some(change) = self.classifier.poll(now_ms) {
            self.on_mode_change(change);
        }
        self.roll_day(now_ms);
        self.persistence.poll(now_ms);
    }

    fn run_pipeline(&mut self, sample: &LocationSample, now_ms: i64) -> SampleOutcome {
        let position = sample.coordinate;

        if let Err(issue) = validator::check(&position) {
            log::warn!("Dropping fix {}: {}", position, issue);
            return SampleOutcome::Rejected(Rejection::InvalidCoordinate(issue));
        }

        if let Some(accuracy_m) = sample.accuracy_m {
            if !accuracy_m.is_finite() || accuracy_m > self.config.max_accuracy_m {
                log::warn!(
                    "Dropping fix {}: accuracy {:.0} m worse than {:.0} m",
                    position,
                    accuracy_m,
                    self.config.max_accuracy_m
                );
                return SampleOutcome::Rejected(Rejection::PoorAccuracy { accuracy_m });
            }
        }

        let throttle_ms = self.config.profiles.for_mode(self.classifier.mode()).throttle_ms;
        if let Some(last) = self.last_considered_ms {
            let since_ms = now_ms.saturating_sub(last);
            if since_ms < throttle_ms {
                log::trace!("Throttled fix {} ms after the previous one", since_ms);
                return SampleOutcome::Rejected(Rejection::Throttled);
            }
        }
        self.last_considered_ms = Some(now_ms);

        self.detect_start(&position, now_ms);

        let (prev, prev_ms) = match (self.last_position, self.last_update_time_ms) {
            (Some(prev), Some(prev_ms)) => (prev, prev_ms),
            _ => {
                log::debug!("First fix at {}", position);
                return self.anchor_pipeline(position, now_ms, SampleOutcome::Initialized);
            }
        };

        let elapsed_ms = now_ms.saturating_sub(prev_ms);
        if elapsed_ms > self.config.max_gap_ms {
            log::info!(
                "No usable fix for {:.1} s, re-anchoring at {}",
                elapsed_ms as f64 / 1000.0,
                position
            );
            return self.anchor_pipeline(position, now_ms, SampleOutcome::Reanchored { gap_ms: elapsed_ms });
        }

        let estimate = speed::estimate(&prev, &position, elapsed_ms, sample.reported_speed_mps);
        self.speed_history.push(estimate.speed_kmh);

        // Jitter inside the drift radius inflates the calculated speed, so the
        // drift check trusts the receiver's own speed whenever it sends one
        let drift_speed = match sample.reported_speed_mps {
            Some(mps) if mps.is_finite() => estimate.reported_kmh,
            _ => estimate.speed_kmh,
        };
        let drift = self.drift.update(self.classifier.mode(), &position, drift_speed);

        let classifier_speed = if drift.is_drift {
            estimate.reported_kmh
        } else {
            estimate.speed_kmh
        };
        if let Some(change) = self.classifier.update(classifier_speed, now_ms) {
            self.on_mode_change(change);
        }

        let candidate = Candidate {
            distance_km: estimate.distance_km,
            elapsed_ms,
            speed_kmh: estimate.speed_kmh,
            mode: self.classifier.mode(),
            is_drift: drift.is_drift,
        };

        match self.accumulator.apply(&candidate) {
            Ok(distance_km) => {
                self.advance(position, now_ms);
                self.last_active_ms = now_ms;
                self.emit(EngineEvent::DistanceChanged {
                    total_km: self.accumulator.total_km(),
                    today_km: self.accumulator.today_km(),
                    delta_km: distance_km,
                });
                self.request_save(now_ms);
                SampleOutcome::Credited { distance_km }
            }
            Err(rejection) => {
                match rejection {
                    Rejection::GpsJump {
                        distance_km,
                        max_reasonable_km,
                    } => log::warn!(
                        "GPS jump of {:.1} m in {:.1} s while {} (ceiling {:.1} m), not credited",
                        distance_km * METERS_PER_KM,
                        estimate.elapsed_secs(),
                        candidate.mode,
                        max_reasonable_km * METERS_PER_KM
                    ),
                    _ => log::trace!("Fix at {} not credited: {}", position, rejection),
                }

                // Sub-floor steps keep the old anchor so slow movement adds up
                if !matches!(rejection, Rejection::BelowNoiseFloor { .. }) {
                    self.advance(position, now_ms);
                }
                SampleOutcome::Rejected(rejection)
            }
        }
    }

    fn detect_start(&mut self, position: &Coordinate, now_ms: i64) {
        if !self.config.auto_detect_start || self.start_location.is_some() {
            return;
        }
        match validator::check_start(position) {
            Ok(()) => {
                log::info!("Trip start detected at {}", position);
                self.start_location = Some(*position);
                self.emit(EngineEvent::StartLocationSet(*position));
                self.request_save(now_ms);
            }
            Err(issue) => log::warn!("Not using {} as trip start: {}", position, issue),
        }
    }

    /// (Re)start the pipeline at `position` without crediting anything
    fn anchor_pipeline(&mut self, position: Coordinate, now_ms: i64, outcome: SampleOutcome) -> SampleOutcome {
        self.advance(position, now_ms);
        self.speed_history.clear();
        self.drift.reset();
        if self.classifier.mode() == MovementMode::Stationary {
            self.drift.anchor(&position);
        }
        outcome
    }

    fn advance(&mut self, position: Coordinate, now_ms: i64) {
        self.last_position = Some(position);
        self.last_update_time_ms = Some(now_ms);
    }

    fn on_mode_change(&mut self, change: ModeChange) {
        self.drift.on_mode_change(change.to);
        self.last_active_ms = change.at_ms;
        self.emit(EngineEvent::ModeChanged {
            from: change.from,
            to: change.to,
            speed_kmh: change.speed_kmh,
            at_ms: change.at_ms,
        });
        self.request_save(change.at_ms);
    }

    /// Clear today's distance once the calendar day has changed and the trip
    /// has been idle past the grace period. Same policy as on load.
    fn roll_day(&mut self, now_ms: i64) {
        if self.persistence.date_for(now_ms) == self.today_date {
            return;
        }
        let mut snapshot = self.snapshot();
        let grace_hours = self.persistence.config().daily_reset_grace_hours;
        if snapshot.apply_daily_reset(now_ms, self.persistence.offset(), grace_hours) {
            self.accumulator.reset_today();
            self.today_date = snapshot.date;
            self.emit(EngineEvent::StateReset { today_only: true });
            self.request_save(now_ms);
        }
    }

    /// Replace trip state with a snapshot and restart the pipeline
    fn apply_snapshot(&mut self, snapshot: &PersistedSnapshot, now_ms: i64) {
        self.accumulator
            .restore(snapshot.total_distance_traveled, snapshot.today_distance_traveled);
        self.today_date = snapshot.date;
        self.last_active_ms = snapshot.last_active_time;
        self.units = Units::from_imperial_flag(snapshot.use_imperial_units);
        self.configured_total_km = snapshot.total_distance;
        self.classifier.restore(snapshot.current_mode, now_ms);
        self.start_location = self.config.start_location.or(snapshot.auto_start_location);
        self.reset_pipeline();
    }

    fn reset_pipeline(&mut self) {
        self.last_position = None;
        self.last_update_time_ms = None;
        self.last_considered_ms = None;
        self.drift.reset();
        self.speed_history.clear();
    }

    fn emit(&mut self, event: EngineEvent) {
        for listener in self.listeners.iter_mut() {
            listener(&event);
        }
    }

    fn request_save(&mut self, now_ms: i64) {
        let snapshot = self.snapshot();
        self.persistence.request_save(snapshot, now_ms);
    }

    fn save_now(&mut self, now_ms: i64) -> bool {
        let snapshot = self.snapshot();
        self.persistence.save_now(&snapshot, now_ms)
    }

    /// Persisted form of the current state
    pub fn snapshot(&self) -> PersistedSnapshot {
        PersistedSnapshot {
            version: SNAPSHOT_VERSION,
            total_distance_traveled: self.accumulator.total_km(),
            today_distance_traveled: self.accumulator.today_km(),
            date: self.today_date,
            last_active_time: self.last_active_ms,
            use_imperial_units: self.units.is_imperial(),
            total_distance: self.configured_total_km,
            current_mode: self.classifier.mode(),
            auto_start_location: self.start_location,
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        let now = self.clock.now_ms();
        let traveled = self.accumulator.total_km();
        StatusSnapshot {
            traveled_distance: traveled,
            today_distance: self.accumulator.today_km(),
            remaining_distance: live_status::remaining_km(traveled, self.configured_total_km),
            progress_percent: live_status::progress_percent(traveled, self.configured_total_km),
            current_mode: self.classifier.mode(),
            use_imperial_units: self.units.is_imperial(),
            last_position: self.last_position,
            start_location: self.start_location,
            total_distance: self.configured_total_km,
            recent_speed_kmh: self.speed_history.mean(),
            connection_meta: self.health.report(now),
        }
    }

    pub fn state(&self) -> EngineState {
        EngineState {
            last_position: self.last_position,
            last_update_time_ms: self.last_update_time_ms,
            stationary_center: self.drift.center().copied(),
            speed_history: self.speed_history.iter().copied().collect(),
            current_mode: self.classifier.mode(),
            last_mode_change_ms: self.classifier.last_change_ms(),
            pending_transition: self.classifier.pending().copied(),
            total_distance_km: self.accumulator.total_km(),
            today_distance_km: self.accumulator.today_km(),
            start_location: self.start_location,
            units: self.units,
            configured_total_distance_km: self.configured_total_km,
            last_active_ms: self.last_active_ms,
        }
    }

    pub fn mode(&self) -> MovementMode {
        self.classifier.mode()
    }

    pub fn total_km(&self) -> f64 {
        self.accumulator.total_km()
    }

    pub fn today_km(&self) -> f64 {
        self.accumulator.today_km()
    }

    pub fn health(&self) -> &FeedHealth {
        &self.health
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn persistence(&self) -> &PersistenceManager<S> {
        &self.persistence
    }

    pub fn persistence_mut(&mut self) -> &mut PersistenceManager<S> {
        &mut self.persistence
    }
}

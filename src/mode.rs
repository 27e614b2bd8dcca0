//! Movement mode classifier.
//!
//! Hysteresis is asymmetric: speeding up commits on the sample that shows it,
//! slowing down has to be proposed continuously for `mode_switch_delay_ms`
//! before it commits. A rider who really stopped is reclassified once the
//! delay runs out; a false claim of motion never persists.
use crate::config::ModeThresholds;
use crate::types::MovementMode;

/// A slowing-down transition waiting for its deadline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingTransition {
    pub target: MovementMode,
    pub started_ms: i64,
    pub deadline_ms: i64,
}

/// A committed mode change
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeChange {
    pub from: MovementMode,
    pub to: MovementMode,
    pub speed_kmh: f64,
    pub at_ms: i64,
}

#[derive(Debug, Clone)]
pub struct ModeClassifier {
    thresholds: ModeThresholds,
    mode: MovementMode,
    last_change_ms: i64,
    last_speed_kmh: f64,
    pending: Option<PendingTransition>,
}

impl ModeClassifier {
    pub fn new(thresholds: ModeThresholds) -> Self {
        Self {
            thresholds,
            mode: MovementMode::Stationary,
            last_change_ms: 0,
            last_speed_kmh: 0.0,
            pending: None,
        }
    }

    /// Mode implied by a speed, without hysteresis
    pub fn classify(&self, speed_kmh: f64) -> MovementMode {
        if speed_kmh > self.thresholds.walking_max_speed_kmh {
            MovementMode::Cycling
        } else if speed_kmh > self.thresholds.stationary_max_speed_kmh {
            MovementMode::Walking
        } else {
            MovementMode::Stationary
        }
    }

    /// Feed one speed observation taken at `now_ms`
    pub fn update(&mut self, speed_kmh: f64, now_ms: i64) -> Option<ModeChange> {
        self.last_speed_kmh = speed_kmh;
        let proposed = self.classify(speed_kmh);

        if proposed == self.mode {
            if let Some(pending) = self.pending.take() {
                log::debug!(
                    "Cancelled pending {} -> {} transition at {:.1} km/h",
                    self.mode,
                    pending.target,
                    speed_kmh
                );
            }
            return None;
        }

        if proposed > self.mode {
            self.pending = None;
            return Some(self.commit(proposed, speed_kmh, now_ms));
        }

        // Slowing down: keep the original deadline, follow the latest target
        let delay = self.thresholds.mode_switch_delay_ms;
        let pending = self.pending.get_or_insert(PendingTransition {
            target: proposed,
            started_ms: now_ms,
            deadline_ms: now_ms.saturating_add(delay),
        });
        pending.target = proposed;

        if now_ms >= pending.deadline_ms {
            self.pending = None;
            return Some(self.commit(proposed, speed_kmh, now_ms));
        }
        None
    }

    /// Commit a pending transition whose deadline has passed
    pub fn poll(&mut self, now_ms: i64) -> Option<ModeChange> {
        let pending = self.pending?;
        if now_ms < pending.deadline_ms {
            return None;
        }
        self.pending = None;
        Some(self.commit(pending.target, self.last_speed_kmh, now_ms))
    }

    /// Restore a mode without emitting a change (snapshot load, reset)
    pub fn restore(&mut self, mode: MovementMode, now_ms: i64) {
        self.mode = mode;
        self.last_change_ms = now_ms;
        self.pending = None;
    }

    fn commit(&mut self, to: MovementMode, speed_kmh: f64, now_ms: i64) -> ModeChange {
        let change = ModeChange {
            from: self.mode,
            to,
            speed_kmh,
            at_ms: now_ms,
        };
        log::info!(
            "Mode {} -> {} at {:.1} km/h",
            change.from,
            change.to,
            change.speed_kmh
        );
        self.mode = to;
        self.last_change_ms = now_ms;
        change
    }

    pub fn mode(&self) -> MovementMode {
        self.mode
    }

    pub fn last_change_ms(&self) -> i64 {
        self.last_change_ms
    }

    pub fn pending(&self) -> Option<&PendingTransition> {
        self.pending.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ModeClassifier {
        ModeClassifier::new(ModeThresholds::default())
    }

    #[test]
    fn test_classify_bands() {
        let c = classifier();
        assert_eq!(c.classify(0.0), MovementMode::Stationary);
        assert_eq!(c.classify(2.0), MovementMode::Stationary);
        assert_eq!(c.classify(2.1), MovementMode::Walking);
        assert_eq!(c.classify(7.0), MovementMode::Walking);
        assert_eq!(c.classify(7.1), MovementMode::Cycling);
    }

    #[test]
    fn test_upward_is_immediate() {
        let mut c = classifier();
        let change = c.update(20.0, 1_000).expect("should switch at once");
        assert_eq!(change.from, MovementMode::Stationary);
        assert_eq!(change.to, MovementMode::Cycling);
        assert_eq!(c.mode(), MovementMode::Cycling);
        assert_eq!(c.last_change_ms(), 1_000);
    }

    #[test]
    fn test_downward_waits_for_delay() {
        let mut c = classifier();
        c.update(20.0, 0);

        assert!(c.update(0.0, 1_000).is_none());
        assert_eq!(c.mode(), MovementMode::Cycling);
        assert_eq!(c.pending().unwrap().deadline_ms, 11_000);

        assert!(c.update(0.0, 6_000).is_none());
        assert!(c.poll(10_999).is_none());

        let change = c.poll(11_000).expect("deadline reached");
        assert_eq!(change.to, MovementMode::Stationary);
        assert!(c.pending().is_none());
    }

    #[test]
    fn test_speed_recovery_cancels_pending() {
        let mut c = classifier();
        c.update(20.0, 0);
        c.update(0.0, 1_000);
        assert!(c.pending().is_some());

        // Back to cycling speed: pending dropped, no change
        assert!(c.update(25.0, 2_000).is_none());
        assert!(c.pending().is_none());
        assert!(c.poll(20_000).is_none());
        assert_eq!(c.mode(), MovementMode::Cycling);
    }

    #[test]
    fn test_retarget_keeps_deadline() {
        let mut c = classifier();
        c.update(20.0, 0);
        c.update(4.0, 1_000); // propose WALKING
        c.update(0.5, 5_000); // now STATIONARY
        let pending = c.pending().unwrap();
        assert_eq!(pending.target, MovementMode::Stationary);
        assert_eq!(pending.deadline_ms, 11_000);

        let change = c.update(0.5, 11_500).unwrap();
        assert_eq!(change.from, MovementMode::Cycling);
        assert_eq!(change.to, MovementMode::Stationary);
    }

    #[test]
    fn test_speed_up_during_pending_commits_higher_mode() {
        let mut c = classifier();
        c.update(5.0, 0); // WALKING
        c.update(0.0, 1_000);
        assert!(c.pending().is_some());
        let change = c.update(30.0, 2_000).unwrap();
        assert_eq!(change.to, MovementMode::Cycling);
        assert!(c.pending().is_none());
    }

    #[test]
    fn test_restore_clears_pending() {
        let mut c = classifier();
        c.update(20.0, 0);
        c.update(0.0, 1_000);
        c.restore(MovementMode::Walking, 2_000);
        assert!(c.pending().is_none());
        assert_eq!(c.mode(), MovementMode::Walking);
    }
}

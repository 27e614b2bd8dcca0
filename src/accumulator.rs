use crate::config::ModeProfiles;
use crate::outcome::Rejection;
use crate::types::{MovementMode, METERS_PER_KM, MPS_TO_KMH};

/// One candidate movement between consecutive accepted fixes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub distance_km: f64,
    pub elapsed_ms: i64,
    pub speed_kmh: f64,
    pub mode: MovementMode,
    pub is_drift: bool,
}

/// Running trip totals plus the acceptance rules that guard them.
///
/// Pipeline credits only ever increase the totals. Decreases happen only
/// through the explicit command setters below.
#[derive(Debug, Clone)]
pub struct DistanceAccumulator {
    profiles: ModeProfiles,
    stationary_max_speed_kmh: f64,
    jump_slack_factor: f64,
    total_km: f64,
    today_km: f64,
}

impl DistanceAccumulator {
    pub fn new(profiles: ModeProfiles, stationary_max_speed_kmh: f64, jump_slack_factor: f64) -> Self {
        Self {
            profiles,
            stationary_max_speed_kmh,
            jump_slack_factor,
            total_km: 0.0,
            today_km: 0.0,
        }
    }

    /// Largest distance the mode can plausibly cover in `elapsed_ms`, before slack
    pub fn max_reasonable_km(&self, mode: MovementMode, elapsed_ms: i64) -> f64 {
        let elapsed_secs = elapsed_ms.max(0) as f64 / 1000.0;
        let max_speed_mps = self.profiles.for_mode(mode).max_speed_kmh / MPS_TO_KMH;
        elapsed_secs * max_speed_mps / METERS_PER_KM
    }

    /// Decide whether a candidate would be credited, without touching the totals
    pub fn evaluate(&self, candidate: &Candidate) -> Result<f64, Rejection> {
        if candidate.is_drift {
            return Err(Rejection::Drift);
        }
        if candidate.mode == MovementMode::Stationary || candidate.speed_kmh <= self.stationary_max_speed_kmh {
            return Err(Rejection::NotMoving);
        }

        let profile = self.profiles.for_mode(candidate.mode);
        if candidate.distance_km < profile.min_movement_m / METERS_PER_KM {
            return Err(Rejection::BelowNoiseFloor {
                distance_m: candidate.distance_km * METERS_PER_KM,
            });
        }

        let max_reasonable_km = self.max_reasonable_km(candidate.mode, candidate.elapsed_ms);
        if candidate.distance_km > max_reasonable_km * self.jump_slack_factor {
            return Err(Rejection::GpsJump {
                distance_km: candidate.distance_km,
                max_reasonable_km,
            });
        }

        Ok(candidate.distance_km)
    }

    /// Evaluate and, when accepted, commit the candidate
    pub fn apply(&mut self, candidate: &Candidate) -> Result<f64, Rejection> {
        let km = self.evaluate(candidate)?;
        self.total_km += km;
        self.today_km += km;
        log::debug!(
            "+{:.1} m in {} (total {:.3} km, today {:.3} km)",
            km * METERS_PER_KM,
            candidate.mode,
            self.total_km,
            self.today_km
        );
        Ok(km)
    }

    /// Signed adjustment applied to both totals, each floored at zero
    pub fn add(&mut self, km: f64) {
        self.total_km = (self.total_km + km).max(0.0);
        self.today_km = (self.today_km + km).max(0.0);
    }

    /// Set the trip total; today never exceeds it afterwards
    pub fn set_total(&mut self, km: f64) {
        self.total_km = km.max(0.0);
        self.today_km = self.today_km.min(self.total_km);
    }

    /// Raise the trip total to `km`, crediting the increase to today as well.
    /// Returns the increase; a lower target changes nothing.
    pub fn raise_total_to(&mut self, km: f64) -> f64 {
        let increase = km - self.total_km;
        if increase <= 0.0 {
            return 0.0;
        }
        self.total_km = km;
        self.today_km += increase;
        increase
    }

    pub fn restore(&mut self, total_km: f64, today_km: f64) {
        self.total_km = total_km.max(0.0);
        self.today_km = today_km.max(0.0);
    }

    pub fn reset_trip(&mut self) {
        self.total_km = 0.0;
        self.today_km = 0.0;
    }

    pub fn reset_today(&mut self) {
        self.today_km = 0.0;
    }

    pub fn total_km(&self) -> f64 {
        self.total_km
    }

    pub fn today_km(&self) -> f64 {
        self.today_km
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn accumulator() -> DistanceAccumulator {
        DistanceAccumulator::new(ModeProfiles::default(), 2.0, 1.5)
    }

    fn cycling(distance_km: f64, elapsed_ms: i64) -> Candidate {
        Candidate {
            distance_km,
            elapsed_ms,
            speed_kmh: 18.0,
            mode: MovementMode::Cycling,
            is_drift: false,
        }
    }

    #[test]
    fn test_credits_plausible_movement() {
        let mut acc = accumulator();
        let km = acc.apply(&cycling(0.05, 10_000)).unwrap();
        assert_abs_diff_eq!(km, 0.05);
        assert_abs_diff_eq!(acc.total_km(), 0.05);
        assert_abs_diff_eq!(acc.today_km(), 0.05);
    }

    #[test]
    fn test_drift_and_stationary_not_credited() {
        let mut acc = accumulator();
        let mut c = cycling(0.05, 10_000);
        c.is_drift = true;
        assert_eq!(acc.apply(&c), Err(Rejection::Drift));

        let mut c = cycling(0.05, 10_000);
        c.mode = MovementMode::Stationary;
        assert_eq!(acc.apply(&c), Err(Rejection::NotMoving));

        let mut c = cycling(0.05, 10_000);
        c.speed_kmh = 2.0;
        assert_eq!(acc.apply(&c), Err(Rejection::NotMoving));
        assert_eq!(acc.total_km(), 0.0);
    }

    #[test]
    fn test_noise_floor() {
        let acc = accumulator();
        // Cycling floor is 5 m
        assert!(matches!(
            acc.evaluate(&cycling(0.004, 2_000)),
            Err(Rejection::BelowNoiseFloor { .. })
        ));
    }

    #[test]
    fn test_jump_ceiling_with_slack() {
        let acc = accumulator();
        // 10 s at 60 km/h = 166.7 m, slack allows up to 250 m
        let ceiling = acc.max_reasonable_km(MovementMode::Cycling, 10_000);
        assert_abs_diff_eq!(ceiling, 0.16667, epsilon = 1e-4);
        assert!(acc.evaluate(&cycling(0.24, 10_000)).is_ok());
        assert!(matches!(
            acc.evaluate(&cycling(0.26, 10_000)),
            Err(Rejection::GpsJump { .. })
        ));
    }

    #[test]
    fn test_add_floors_at_zero() {
        let mut acc = accumulator();
        acc.restore(10.0, 4.0);
        acc.add(-500.0);
        assert_eq!(acc.total_km(), 0.0);
        assert_eq!(acc.today_km(), 0.0);
        acc.add(2.5);
        assert_abs_diff_eq!(acc.total_km(), 2.5);
    }

    #[test]
    fn test_raise_total_never_lowers() {
        let mut acc = accumulator();
        acc.restore(100.0, 10.0);
        assert_eq!(acc.raise_total_to(50.0), 0.0);
        assert_eq!(acc.total_km(), 100.0);
        assert_abs_diff_eq!(acc.raise_total_to(185.5), 85.5);
        assert_abs_diff_eq!(acc.today_km(), 95.5);
    }

    #[test]
    fn test_set_total_clamps_today() {
        let mut acc = accumulator();
        acc.restore(100.0, 30.0);
        acc.set_total(20.0);
        assert_eq!(acc.total_km(), 20.0);
        assert_eq!(acc.today_km(), 20.0);
    }
}

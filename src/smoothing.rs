use std::collections::VecDeque;

pub const SPEED_HISTORY_CAPACITY: usize = 10;

/// Bounded window of recent speed samples (km/h).
///
/// Kept for reporting only. Classification uses the current
/// max(reported, calculated) speed; averaging or percentile smoothing here
/// would hide genuine slow movement.
#[derive(Debug, Clone)]
pub struct SpeedHistory {
    window: VecDeque<f64>,
    capacity: usize,
}

impl SpeedHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        SpeedHistory {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a sample, evicting the oldest once full
    pub fn push(&mut self, speed_kmh: f64) {
        if !speed_kmh.is_finite() {
            return;
        }
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(speed_kmh);
    }

    pub fn latest(&self) -> Option<f64> {
        self.window.back().copied()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.window.is_empty() {
            return None;
        }
        Some(self.window.iter().sum::<f64>() / self.window.len() as f64)
    }

    pub fn peak(&self) -> Option<f64> {
        self.window.iter().copied().reduce(f64::max)
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.window.iter()
    }
}

impl Default for SpeedHistory {
    fn default() -> Self {
        Self::new(SPEED_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let history = SpeedHistory::default();
        assert!(history.is_empty());
        assert_eq!(history.mean(), None);
        assert_eq!(history.peak(), None);
    }

    #[test]
    fn test_window_wrapping() {
        let mut history = SpeedHistory::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            history.push(v);
        }
        // 1.0 dropped, window is [2, 3, 4]
        assert_eq!(history.len(), 3);
        assert!((history.mean().unwrap() - 3.0).abs() < 1e-9);
        assert_eq!(history.peak(), Some(4.0));
        assert_eq!(history.latest(), Some(4.0));
    }

    #[test]
    fn test_capacity_bounded_at_ten() {
        let mut history = SpeedHistory::default();
        for i in 0..25 {
            history.push(i as f64);
        }
        assert_eq!(history.len(), SPEED_HISTORY_CAPACITY);
        assert_eq!(history.iter().next().copied(), Some(15.0));
    }

    #[test]
    fn test_non_finite_ignored() {
        let mut history = SpeedHistory::new(4);
        history.push(f64::NAN);
        history.push(f64::INFINITY);
        assert!(history.is_empty());
    }
}

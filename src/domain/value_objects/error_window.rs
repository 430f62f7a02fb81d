//! Decaying error counter.
//!
//! Counts consecutive error reports on a live channel. The count falls back
//! to zero once `reset_after` elapses without a new report, so no timer is
//! needed to decay it.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct ErrorWindow {
    limit: u32,
    reset_after: Duration,
    count: u32,
    last_at: Option<Instant>,
}

impl ErrorWindow {
    pub fn new(limit: u32, reset_after: Duration) -> Self {
        Self {
            limit: limit.max(1),
            reset_after,
            count: 0,
            last_at: None,
        }
    }

    /// Record one error at `now` and return the resulting count.
    pub fn record(&mut self, now: Instant) -> u32 {
        self.decay(now);
        self.count = self.count.saturating_add(1);
        self.last_at = Some(now);
        self.count
    }

    /// Whether the count at `now` has reached the limit.
    pub fn exceeded(&self, now: Instant) -> bool {
        self.count(now) >= self.limit
    }

    /// Current count, taking decay into account.
    pub fn count(&self, now: Instant) -> u32 {
        match self.last_at {
            Some(at) if now.saturating_duration_since(at) < self.reset_after => self.count,
            _ => 0,
        }
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.last_at = None;
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    fn decay(&mut self, now: Instant) {
        if self.count(now) == 0 {
            self.count = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_until_limit() {
        let now = Instant::now();
        let mut window = ErrorWindow::new(3, Duration::from_secs(60));

        assert_eq!(window.record(now), 1);
        assert_eq!(window.record(now + Duration::from_secs(1)), 2);
        assert!(!window.exceeded(now + Duration::from_secs(1)));
        assert_eq!(window.record(now + Duration::from_secs(2)), 3);
        assert!(window.exceeded(now + Duration::from_secs(2)));
    }

    #[test]
    fn test_decays_after_idle_period() {
        let now = Instant::now();
        let mut window = ErrorWindow::new(3, Duration::from_secs(60));

        window.record(now);
        window.record(now);
        assert_eq!(window.count(now + Duration::from_secs(59)), 2);
        assert_eq!(window.count(now + Duration::from_secs(60)), 0);

        // A report after the idle period starts a fresh run.
        assert_eq!(window.record(now + Duration::from_secs(61)), 1);
    }

    #[test]
    fn test_reset() {
        let now = Instant::now();
        let mut window = ErrorWindow::new(2, Duration::from_secs(60));
        window.record(now);
        window.reset();
        assert_eq!(window.count(now), 0);
    }
}

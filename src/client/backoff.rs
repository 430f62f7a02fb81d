//! Reconnect delay: exponential with a ceiling, plus uniform jitter.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
    jitter_ms: u64,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: Duration) -> Self {
        Self {
            base_ms: base.as_millis() as u64,
            max_ms: max.as_millis() as u64,
            jitter_ms: jitter.as_millis() as u64,
        }
    }

    /// `min(base * 2^attempts, max)`, without jitter.
    pub fn ceiling(&self, attempts: u32) -> Duration {
        let exp = self.base_ms.saturating_mul(2u64.saturating_pow(attempts));
        Duration::from_millis(exp.min(self.max_ms))
    }

    /// Ceiling plus a uniform random term in `[0, jitter)`.
    pub fn delay(&self, attempts: u32) -> Duration {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..self.jitter_ms)
        };
        self.ceiling(attempts) + Duration::from_millis(jitter)
    }
}

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with additive jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
    /// Jitter is drawn from `[0, max_jitter)`.
    pub max_jitter: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            max_attempts: 10,
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl Backoff {
    /// `min(base * 2^attempt, cap) + jitter`, with `attempt` counted from 0.
    pub fn delay(&self, attempt: u32, jitter: Duration) -> Duration {
        let exp = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(exp).min(self.cap) + jitter
    }

    pub fn jitter<R: Rng>(&self, rng: &mut R) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        rng.random_range(Duration::ZERO..self.max_jitter)
    }
}

//! Exponential backoff with bounded jitter.

use std::time::Duration;

use rand::Rng;

/// From this attempt on the delay is simply the cap
const MAX_EXPONENT: u32 = 20;

/// Maps a retry attempt to a wait duration: `min(base * 2^attempt + jitter, cap)`.
///
/// `max_jitter` is clamped to `base`, which keeps `delay(n + 1) >= delay(n)`
/// for every random draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    max_jitter: Duration,
    cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(1), Duration::from_secs(10))
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, max_jitter: Duration, cap: Duration) -> Self {
        Self {
            base,
            max_jitter: max_jitter.min(base),
            cap,
        }
    }

    /// Deterministic policy, mostly useful in tests
    pub fn without_jitter(base: Duration, cap: Duration) -> Self {
        Self::new(base, Duration::ZERO, cap)
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max_jitter(&self) -> Duration {
        self.max_jitter
    }

    pub fn cap(&self) -> Duration {
        self.cap
    }

    /// Wait before retry number `attempt` (0-based), with random jitter
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        self.delay_with_jitter(attempt, jitter)
    }

    /// Deterministic core of [`delay`](Self::delay)
    pub fn delay_with_jitter(&self, attempt: u32, jitter: Duration) -> Duration {
        if attempt >= MAX_EXPONENT {
            return self.cap;
        }
        let exponential = self.base.saturating_mul(1u32 << attempt);
        exponential
            .saturating_add(jitter.min(self.max_jitter))
            .min(self.cap)
    }
}

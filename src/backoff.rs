use rand::Rng;
use std::time::Duration;

/// Doubling delay between probe attempts, capped and jittered.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    jitter_percent: u32,
}

impl ExponentialBackoff {
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            jitter_percent: 10,
        }
    }

    pub fn with_jitter(mut self, jitter_percent: u32) -> Self {
        self.jitter_percent = jitter_percent.min(100);
        self
    }

    pub fn max_delay(&self) -> Duration {
        self.max
    }

    /// Delay after the `attempt`-th failure (0-based). Jitter only ever adds time.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        let capped = base_ms
            .saturating_mul(2u64.saturating_pow(attempt.min(20)))
            .min(max_ms);

        let jitter_span = capped * u64::from(self.jitter_percent) / 100;
        let jitter = if jitter_span > 0 {
            rand::thread_rng().gen_range(0..=jitter_span)
        } else {
            0
        };
        Duration::from_millis(capped + jitter)
    }
}

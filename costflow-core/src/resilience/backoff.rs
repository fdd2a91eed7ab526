//! Exponential redelivery delay
//!
//! The delay for attempt `n` (1-based) is `initial × multiplier^(n-1)`,
//! capped at `max_delay`, with optional symmetric jitter so units failing
//! together do not retry in lockstep.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first redelivery
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Growth factor per failed attempt (typically 2.0)
    pub multiplier: f64,
    /// Randomisation applied to each delay (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Millisecond delays without jitter, for tests
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    /// Delay before redelivering a unit that has failed `attempt` times
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter_factor == 0.0 {
            return base;
        }

        let jitter = rand::thread_rng().gen::<f64>() * self.jitter_factor;
        let jitter_multiplier = 1.0 + (jitter - self.jitter_factor / 2.0);
        std::cmp::min(
            Duration::from_secs_f64(base.as_secs_f64() * jitter_multiplier),
            self.max_delay,
        )
    }

    fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }
}

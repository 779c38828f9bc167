#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

//! Linear ramp from zero to the configured level.
//!
//! Every actuator holds a copy of the same schedule and evaluates it on its
//! own cadence. Sharing the start instant is what keeps the three resources
//! in step; there is no other coordination between them.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Copy, Debug)]
pub struct RampSchedule {
    start: Instant,
    rampup: Duration,
}

impl RampSchedule {
    pub fn new(start: Instant, rampup: Duration) -> Self {
        Self { start, rampup }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Fraction of the ramp covered after `elapsed`, in `[0, 1]`.
    pub fn progress_at(&self, elapsed: Duration) -> f64 {
        if self.rampup.is_zero() || elapsed >= self.rampup {
            return 1.0;
        }
        (elapsed.as_secs_f64() / self.rampup.as_secs_f64()).clamp(0.0, 1.0)
    }

    /// Integer target (MB) after `elapsed`, truncated toward zero.
    ///
    /// Once the ramp is over the configured value is returned as is, so the
    /// final level is exact rather than subject to float rounding.
    pub fn target_mb_at(&self, configured: u64, elapsed: Duration) -> u64 {
        if self.rampup.is_zero() || elapsed >= self.rampup {
            return configured;
        }
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let value = (self.progress_at(elapsed) * configured as f64) as u64;
        value.min(configured)
    }

    pub fn target_percent_at(&self, configured: f64, elapsed: Duration) -> f64 {
        if self.rampup.is_zero() || elapsed >= self.rampup {
            return configured;
        }
        (self.progress_at(elapsed) * configured).min(configured)
    }

    pub fn target_mb(&self, configured: u64) -> u64 {
        self.target_mb_at(configured, self.elapsed())
    }

    pub fn target_percent(&self, configured: f64) -> f64 {
        self.target_percent_at(configured, self.elapsed())
    }

    pub fn progress(&self) -> f64 {
        self.progress_at(self.elapsed())
    }
}

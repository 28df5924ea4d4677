//! The paced action scheduler.
//!
//! [`machine`] holds the pure pause/resume/count transitions. [`runtime`]
//! owns the timers, the executor calls and the persistence policy, and is
//! driven through a cloneable [`SchedulerHandle`].

pub mod machine;
pub mod runtime;
pub mod status;
mod timer;

use std::time::Duration;

use rand::Rng;

use crate::error::{PacerError, Result};

pub use machine::{Machine, Pace, Phase, Selection, Step, TimerCmd};
pub use runtime::{Scheduler, SchedulerHandle};
pub use status::{format_remaining, StatusSnapshot};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// An inclusive range a random delay is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayWindow {
    pub min: Duration,
    pub max: Duration,
}

impl DelayWindow {
    pub fn from_millis(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_millis(min),
            max: Duration::from_millis(max),
        }
    }

    pub fn fixed(delay: Duration) -> Self {
        Self {
            min: delay,
            max: delay,
        }
    }

    /// Uniform draw from the window. An inverted window yields `min`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rng.gen_range(min..=max))
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Gap between a completed action and the next attempt.
    pub action_delay: DelayWindow,
    /// First attempt after start or a catch-up auto-resume.
    pub startup_delay: DelayWindow,
    pub not_ready_backoff: Duration,
    pub failure_backoff: Duration,
    /// Write attempts per transition before the scheduler stalls.
    pub write_attempts: u32,
    pub write_retry_delay: Duration,
    /// Interval between write attempts while stalled.
    pub recovery_interval: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            action_delay: DelayWindow::from_millis(5_000, 10_000),
            startup_delay: DelayWindow::from_millis(8_000, 10_000),
            not_ready_backoff: Duration::from_secs(1),
            failure_backoff: Duration::from_secs(2),
            write_attempts: 3,
            write_retry_delay: Duration::from_millis(200),
            recovery_interval: Duration::from_secs(5),
        }
    }
}

// ---------------------------------------------------------------------------
// Settings input
// ---------------------------------------------------------------------------

/// Parse an operator-entered setting. Blank input means 0 (disabled); any
/// other non-integer or negative value is rejected.
pub fn parse_setting(name: &str, raw: &str) -> Result<u32> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(0);
    }
    raw.parse::<u32>().map_err(|_| PacerError::InvalidSetting {
        name: name.to_string(),
        reason: format!("'{raw}' is not a non-negative whole number"),
    })
}

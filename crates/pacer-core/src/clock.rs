//! Wall-clock time for the scheduler.
//!
//! Delayed callbacks are tokio timers owned by the scheduler runtime; this
//! module only answers "what time is it", so deadlines such as `pause_until`
//! can be computed and compared as epoch milliseconds.

use chrono::Utc;

/// Source of the current time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A wall clock that advances with tokio's clock.
///
/// Anchored at construction to `epoch_millis`; under a paused tokio runtime
/// (`tokio::time::pause`) it moves only when tokio time is advanced, which
/// keeps timer deadlines and `now` consistent in tests.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    epoch_millis: i64,
    anchor: tokio::time::Instant,
}

impl TokioClock {
    pub fn starting_at(epoch_millis: i64) -> Self {
        Self {
            epoch_millis,
            anchor: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now_millis(&self) -> i64 {
        let elapsed = tokio::time::Instant::now().saturating_duration_since(self.anchor);
        self.epoch_millis + elapsed.as_millis() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_follows_paused_time() {
        let clock = TokioClock::starting_at(1_000_000);
        assert_eq!(clock.now_millis(), 1_000_000);
        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(clock.now_millis(), 1_090_000);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now_millis() > 1_577_836_800_000);
    }
}

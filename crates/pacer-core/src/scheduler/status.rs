use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::machine::{Machine, Phase};

/// Read-only view of the scheduler, published after every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub phase: Phase,
    pub repetition_count: u32,
    pub pause_threshold: u32,
    pub resume_delay_minutes: u32,
    pub is_paused: bool,
    pub remaining_pause_millis: u64,
    pub pause_until: Option<DateTime<Utc>>,
    pub last_payload: Option<String>,
    pub last_action_at: Option<DateTime<Utc>>,
    pub payload_count: usize,
    /// Set while state writes are failing; no progress is made until cleared.
    pub stalled: Option<String>,
    /// Most recent human-readable event ("Auto-paused at 3", ...).
    pub note: Option<String>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            phase: Phase::Running,
            repetition_count: 0,
            pause_threshold: 0,
            resume_delay_minutes: 0,
            is_paused: false,
            remaining_pause_millis: 0,
            pause_until: None,
            last_payload: None,
            last_action_at: None,
            payload_count: 0,
            stalled: None,
            note: None,
        }
    }
}

fn to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

impl StatusSnapshot {
    pub fn capture(
        machine: &Machine,
        now: i64,
        stalled: Option<String>,
        note: Option<String>,
    ) -> Self {
        let state = machine.state();
        Self {
            phase: machine.phase(),
            repetition_count: state.repetition_count,
            pause_threshold: state.pause_threshold,
            resume_delay_minutes: state.resume_delay_minutes,
            is_paused: state.is_paused,
            remaining_pause_millis: state.remaining_pause_millis(now),
            pause_until: state.pause_until.and_then(to_datetime),
            last_payload: state.last_payload.clone(),
            last_action_at: state.last_action_time.and_then(to_datetime),
            payload_count: state.payload_set.len(),
            stalled,
            note,
        }
    }

    /// One-line summary for logs and the CLI.
    pub fn headline(&self) -> String {
        if let Some(reason) = &self.stalled {
            return format!("Stalled: {reason}");
        }
        match self.phase {
            Phase::Running => "Running".to_string(),
            Phase::PausedManual => "Paused".to_string(),
            Phase::PausedIndefinite => "Paused (no auto-resume)".to_string(),
            Phase::PausedScheduled { .. } => format!(
                "Paused (resumes in {})",
                format_remaining(self.remaining_pause_millis)
            ),
        }
    }

    /// Threshold progress, e.g. `2/5` or `2` when auto-pause is off.
    pub fn progress(&self) -> String {
        if self.pause_threshold > 0 {
            format!("{}/{}", self.repetition_count, self.pause_threshold)
        } else {
            self.repetition_count.to_string()
        }
    }
}

/// Render a countdown as `1h 2m 3s`, `4m 5s` or `6s`.
pub fn format_remaining(millis: u64) -> String {
    let total = millis.div_ceil(1_000);
    let (h, m, s) = (total / 3_600, (total % 3_600) / 60, total % 60);
    if h > 0 {
        format!("{h}h {m}m {s}s")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

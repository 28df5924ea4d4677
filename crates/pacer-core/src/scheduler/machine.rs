//! The pause/resume/count state machine.
//!
//! `Machine` is pure: every transition takes the current time as an argument
//! and returns a [`Step`] describing what the runtime must do next (persist,
//! arm or cancel a timer). Nothing here sleeps, spawns or touches the store,
//! so restart reconciliation and every transition are testable in isolation.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::state::SchedulerState;
use crate::words::PayloadSet;

const MINUTE_MILLIS: i64 = 60_000;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Logical scheduler state. Never persisted: it is re-derived from
/// `is_paused` / `pause_until` on every start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Phase {
    Running,
    /// Paused by the operator.
    PausedManual,
    /// Auto-paused with a resume deadline (epoch ms).
    PausedScheduled { until: i64 },
    /// Auto-paused with auto-resume disabled.
    PausedIndefinite,
}

impl Phase {
    pub fn is_running(&self) -> bool {
        matches!(self, Phase::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Running => "running",
            Phase::PausedManual => "paused_manual",
            Phase::PausedScheduled { .. } => "paused_scheduled",
            Phase::PausedIndefinite => "paused_indefinite",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// How long to wait before the next action attempt. The runtime turns this
/// into a concrete duration using its configured windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    Immediate,
    /// Stagger after a start or a catch-up resume.
    Startup,
    /// Regular gap between completed actions.
    Cycle,
    /// Executor prerequisites were missing.
    NotReady,
    /// Executor reported a failure.
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCmd<T> {
    Keep,
    Cancel,
    Arm(T),
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub persist: bool,
    pub action: TimerCmd<Pace>,
    pub resume: TimerCmd<Duration>,
    pub note: Option<String>,
}

impl Step {
    pub fn none() -> Self {
        Self {
            persist: false,
            action: TimerCmd::Keep,
            resume: TimerCmd::Keep,
            note: None,
        }
    }

    fn persist() -> Self {
        Self {
            persist: true,
            ..Self::none()
        }
    }

    fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// The payload chosen for an action attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub index: usize,
    pub payload: String,
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Machine {
    state: SchedulerState,
    phase: Phase,
    /// Selection being retried after `NotReady` / failure.
    pending: Option<Selection>,
}

impl Machine {
    /// Reconcile a loaded record with the current time.
    ///
    /// Only `is_paused` and `pause_until` decide the starting phase:
    /// - a future deadline re-arms the resume timer for the remainder;
    /// - an elapsed deadline is a missed auto-resume and is caught up now;
    /// - paused without a deadline stays paused until a manual resume;
    /// - otherwise the scheduler runs, re-checking a count that already
    ///   reached the threshold before the process stopped.
    pub fn restore(mut state: SchedulerState, now: i64) -> (Self, Step) {
        match state.pause_until {
            Some(until) if until > now => {
                let step = Step {
                    persist: !state.is_paused,
                    resume: TimerCmd::Arm(Duration::from_millis((until - now) as u64)),
                    action: TimerCmd::Cancel,
                    note: Some("Paused (resume scheduled)".into()),
                };
                state.is_paused = true;
                let machine = Self::with_phase(state, Phase::PausedScheduled { until });
                (machine, step)
            }
            Some(_) => {
                state.pause_until = None;
                state.is_paused = false;
                state.repetition_count = 0;
                let step = Step {
                    action: TimerCmd::Arm(Pace::Startup),
                    ..Step::persist()
                }
                .with_note("Auto-resumed (expired while away)");
                (Self::with_phase(state, Phase::Running), step)
            }
            None if state.is_paused => (
                Self::with_phase(state, Phase::PausedManual),
                Step::none().with_note("Paused on load"),
            ),
            None => {
                let mut machine = Self::with_phase(state, Phase::Running);
                let step = if machine.threshold_reached() {
                    machine.auto_pause(now)
                } else {
                    Step {
                        action: TimerCmd::Arm(Pace::Startup),
                        ..Step::none()
                    }
                };
                (machine, step)
            }
        }
    }

    fn with_phase(state: SchedulerState, phase: Phase) -> Self {
        Self {
            state,
            phase,
            pending: None,
        }
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn threshold_reached(&self) -> bool {
        self.state.pause_threshold > 0 && self.state.repetition_count >= self.state.pause_threshold
    }

    fn auto_pause(&mut self, now: i64) -> Step {
        let count = self.state.repetition_count;
        self.state.is_paused = true;
        if self.state.resume_delay_minutes > 0 {
            let delay_ms = i64::from(self.state.resume_delay_minutes) * MINUTE_MILLIS;
            let until = now + delay_ms;
            self.state.pause_until = Some(until);
            self.phase = Phase::PausedScheduled { until };
            Step {
                persist: true,
                action: TimerCmd::Cancel,
                resume: TimerCmd::Arm(Duration::from_millis(delay_ms as u64)),
                note: Some(format!("Auto-paused at {count}")),
            }
        } else {
            self.state.pause_until = None;
            self.phase = Phase::PausedIndefinite;
            Step {
                persist: true,
                action: TimerCmd::Cancel,
                resume: TimerCmd::Cancel,
                note: Some(format!("Auto-paused at {count} (no auto-resume)")),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Manual commands
    // -----------------------------------------------------------------------

    /// Pause until a manual resume. A pending auto-resume is dropped.
    pub fn pause(&mut self) -> Step {
        match self.phase {
            Phase::PausedManual | Phase::PausedIndefinite => Step::none(),
            Phase::Running | Phase::PausedScheduled { .. } => {
                self.phase = Phase::PausedManual;
                self.state.is_paused = true;
                self.state.pause_until = None;
                Step {
                    persist: true,
                    action: TimerCmd::Cancel,
                    resume: TimerCmd::Cancel,
                    note: Some("Paused manually".into()),
                }
            }
        }
    }

    /// Resume from any paused phase and request an action right away.
    ///
    /// Unlike an auto-resume this keeps `repetition_count`.
    pub fn resume(&mut self) -> Step {
        if self.phase.is_running() {
            return Step::none();
        }
        self.phase = Phase::Running;
        self.state.is_paused = false;
        self.state.pause_until = None;
        Step {
            persist: true,
            action: TimerCmd::Arm(Pace::Immediate),
            resume: TimerCmd::Cancel,
            note: Some("Resumed manually".into()),
        }
    }

    pub fn toggle(&mut self) -> Step {
        if self.phase.is_running() {
            self.pause()
        } else {
            self.resume()
        }
    }

    /// Apply either or both settings as one persisted change.
    pub fn update_settings(&mut self, threshold: Option<u32>, resume_minutes: Option<u32>) -> Step {
        let note = match (threshold, resume_minutes) {
            (None, None) => return Step::none(),
            (Some(_), None) => "Saved pause-after",
            (None, Some(_)) => "Saved resume-after",
            (Some(_), Some(_)) => "Saved pause-after and resume-after",
        };
        if let Some(n) = threshold {
            self.state.pause_threshold = n;
        }
        if let Some(m) = resume_minutes {
            self.state.resume_delay_minutes = m;
        }
        Step::persist().with_note(note)
    }

    // -----------------------------------------------------------------------
    // Timer events
    // -----------------------------------------------------------------------

    /// The scheduled auto-resume fired. A no-op unless still auto-paused, so
    /// a fire that raced a manual resume or pause changes nothing.
    pub fn resume_due(&mut self) -> Step {
        if !matches!(self.phase, Phase::PausedScheduled { .. }) {
            debug!(phase = %self.phase, "ignoring resume timer outside scheduled pause");
            return Step::none();
        }
        let minutes = self.state.resume_delay_minutes;
        self.phase = Phase::Running;
        self.state.is_paused = false;
        self.state.pause_until = None;
        self.state.repetition_count = 0;
        Step {
            persist: true,
            action: TimerCmd::Arm(Pace::Immediate),
            resume: TimerCmd::Keep,
            note: Some(format!("Auto-resumed after {minutes}m")),
        }
    }

    // -----------------------------------------------------------------------
    // Action cycle
    // -----------------------------------------------------------------------

    /// Choose the payload for the next attempt. Returns the pending selection
    /// when retrying; `None` unless running.
    pub fn next_selection<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Selection> {
        if !self.phase.is_running() {
            return None;
        }
        if let Some(pending) = &self.pending {
            return Some(pending.clone());
        }
        let (index, payload) = self
            .state
            .payload_set
            .pick_next(self.state.valid_last_index(), rng);
        let selection = Selection { index, payload };
        self.pending = Some(selection.clone());
        Some(selection)
    }

    /// Count a completed action. Always persisted before the threshold is
    /// looked at; see [`Machine::evaluate_threshold`].
    pub fn record_completion(&mut self, selection: &Selection, now: i64) -> Step {
        self.state.repetition_count = self.state.repetition_count.saturating_add(1);
        self.state.last_selected_index = Some(selection.index);
        self.state.last_payload = Some(selection.payload.clone());
        self.state.last_action_time = Some(now);
        self.pending = None;
        Step::persist()
    }

    /// After a persisted completion: auto-pause, or schedule the next cycle.
    /// Completions that land while paused schedule nothing.
    pub fn evaluate_threshold(&mut self, now: i64) -> Step {
        if !self.phase.is_running() {
            return Step::none();
        }
        if self.threshold_reached() {
            return self.auto_pause(now);
        }
        Step {
            action: TimerCmd::Arm(Pace::Cycle),
            ..Step::none()
        }
    }

    /// Pick the cycle back up after an interruption such as a stalled write.
    ///
    /// A completion whose threshold check never ran is evaluated now, so the
    /// recorded count can still trigger its auto-pause before another action.
    pub fn continue_running(&mut self, now: i64) -> Step {
        if !self.phase.is_running() {
            return Step::none();
        }
        if self.threshold_reached() {
            return self.auto_pause(now);
        }
        Step {
            action: TimerCmd::Arm(Pace::Immediate),
            ..Step::none()
        }
    }

    pub fn attempt_not_ready(&self) -> Step {
        self.retry(Pace::NotReady)
    }

    pub fn attempt_failed(&self) -> Step {
        self.retry(Pace::Failure)
    }

    fn retry(&self, pace: Pace) -> Step {
        if !self.phase.is_running() {
            return Step::none();
        }
        Step {
            action: TimerCmd::Arm(pace),
            ..Step::none()
        }
    }

    /// Swap in a refreshed payload set. `last_selected_index` is left as is
    /// and range-checked when next used.
    pub fn replace_payloads(&mut self, payloads: PayloadSet) -> Step {
        if payloads == self.state.payload_set {
            return Step::none();
        }
        let count = payloads.len();
        self.state.payload_set = payloads;
        Step::persist().with_note(format!("Loaded {count} words"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

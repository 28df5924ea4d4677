//! The scheduler engine.
//!
//! A single task owns the [`Machine`], its timers and the store. Everything
//! else talks to it through an mpsc queue: commands from [`SchedulerHandle`],
//! timer fires, executor outcomes. Events are handled one at a time, so no
//! two transitions ever interleave.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::machine::{Machine, Pace, Phase, Selection, Step, TimerCmd};
use super::status::StatusSnapshot;
use super::timer::TimerSlot;
use super::SchedulerOptions;
use crate::clock::{Clock, SystemClock};
use crate::error::{PacerError, Result};
use crate::executor::{ActionExecutor, AttemptOutcome};
use crate::state::SchedulerState;
use crate::store::KeyValueStore;
use crate::words::{default_words, PayloadSet};

const QUEUE_DEPTH: usize = 64;

// ─── Events ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Command {
    Pause,
    Resume,
    Toggle,
    UpdateSettings {
        threshold: Option<u32>,
        resume_minutes: Option<u32>,
    },
    ReplacePayloads(PayloadSet),
    Status,
}

enum Event {
    Command(Command, oneshot::Sender<Result<StatusSnapshot>>),
    ActionDue { generation: u64 },
    ResumeDue { generation: u64 },
    RecoveryDue { generation: u64 },
    Payloads(oneshot::Sender<PayloadSet>),
    Attempted {
        attempt: u64,
        selection: Selection,
        outcome: AttemptOutcome,
    },
    Shutdown(oneshot::Sender<()>),
}

// ─── Builder ────────────────────────────────────────────────────────────────

/// Configures and starts the engine.
pub struct Scheduler {
    store: Arc<dyn KeyValueStore>,
    executor: Arc<dyn ActionExecutor>,
    clock: Arc<dyn Clock>,
    options: SchedulerOptions,
    defaults: PayloadSet,
    seed: Option<u64>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn KeyValueStore>, executor: Arc<dyn ActionExecutor>) -> Self {
        Self {
            store,
            executor,
            clock: Arc::new(SystemClock),
            options: SchedulerOptions::default(),
            defaults: default_words(),
            seed: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_options(mut self, options: SchedulerOptions) -> Self {
        self.options = options;
        self
    }

    /// Payloads used when the store holds none.
    pub fn with_default_payloads(mut self, defaults: PayloadSet) -> Self {
        self.defaults = defaults;
        self
    }

    /// Deterministic selection and delays.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Load persisted state, reconcile it with the current time and spawn the
    /// engine. Must be called inside a tokio runtime.
    ///
    /// Fails on store read errors or an unsupported schema; nothing is
    /// scheduled in that case.
    pub fn start(self) -> Result<SchedulerHandle> {
        let (state, fresh) = SchedulerState::load(self.store.as_ref(), self.defaults.clone())?;
        let now = self.clock.now_millis();
        let (machine, mut step) = Machine::restore(state, now);
        if fresh {
            step.persist = true;
        }
        info!(
            phase = %machine.phase(),
            count = machine.state().repetition_count,
            threshold = machine.state().pause_threshold,
            resume_minutes = machine.state().resume_delay_minutes,
            fresh,
            "scheduler state restored"
        );

        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let initial = StatusSnapshot::capture(&machine, now, None, None);
        let (status_tx, status_rx) = watch::channel(initial);
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let engine = Engine {
            machine,
            store: self.store,
            executor: self.executor,
            clock: self.clock,
            options: self.options,
            rng,
            events: tx.downgrade(),
            action_timer: TimerSlot::default(),
            resume_timer: TimerSlot::default(),
            recovery_timer: TimerSlot::default(),
            in_flight: None,
            attempts: 0,
            stalled: None,
            note: None,
            status: status_tx,
        };
        tokio::spawn(engine.run(rx, step));

        Ok(SchedulerHandle {
            tx,
            status: status_rx,
        })
    }
}

// ─── Handle ─────────────────────────────────────────────────────────────────

/// Cloneable control surface for a running scheduler.
///
/// The engine stops when [`SchedulerHandle::shutdown`] is called or when the
/// last handle is dropped.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Event>,
    status: watch::Receiver<StatusSnapshot>,
}

impl SchedulerHandle {
    async fn command(&self, command: Command) -> Result<StatusSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Event::Command(command, reply))
            .await
            .map_err(|_| PacerError::SchedulerStopped)?;
        rx.await.map_err(|_| PacerError::SchedulerStopped)?
    }

    pub async fn pause(&self) -> Result<StatusSnapshot> {
        self.command(Command::Pause).await
    }

    pub async fn resume(&self) -> Result<StatusSnapshot> {
        self.command(Command::Resume).await
    }

    pub async fn toggle(&self) -> Result<StatusSnapshot> {
        self.command(Command::Toggle).await
    }

    /// Change the pause threshold and/or resume delay in one persisted write.
    pub async fn update_settings(
        &self,
        threshold: Option<u32>,
        resume_minutes: Option<u32>,
    ) -> Result<StatusSnapshot> {
        self.command(Command::UpdateSettings {
            threshold,
            resume_minutes,
        })
        .await
    }

    pub async fn replace_payloads(&self, payloads: PayloadSet) -> Result<StatusSnapshot> {
        self.command(Command::ReplacePayloads(payloads)).await
    }

    /// A snapshot taken by the engine itself, with a fresh countdown.
    pub async fn refresh_status(&self) -> Result<StatusSnapshot> {
        self.command(Command::Status).await
    }

    /// The last published snapshot.
    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }

    /// The payload set actions are currently drawn from.
    pub async fn payloads(&self) -> Result<PayloadSet> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Event::Payloads(reply))
            .await
            .map_err(|_| PacerError::SchedulerStopped)?;
        rx.await.map_err(|_| PacerError::SchedulerStopped)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Cancel every timer and the in-flight attempt, then stop the engine.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Event::Shutdown(reply)).await.is_ok() {
            let _ = rx.await;
        }
    }
}

// ─── Engine ─────────────────────────────────────────────────────────────────

struct Engine {
    machine: Machine,
    store: Arc<dyn KeyValueStore>,
    executor: Arc<dyn ActionExecutor>,
    clock: Arc<dyn Clock>,
    options: SchedulerOptions,
    rng: StdRng,
    events: mpsc::WeakSender<Event>,
    action_timer: TimerSlot,
    resume_timer: TimerSlot,
    recovery_timer: TimerSlot,
    in_flight: Option<(u64, JoinHandle<()>)>,
    attempts: u64,
    /// Reason the last state write failed; cleared by the next good write.
    stalled: Option<String>,
    note: Option<String>,
    status: watch::Sender<StatusSnapshot>,
}

impl Engine {
    async fn run(mut self, mut rx: mpsc::Receiver<Event>, initial: Step) {
        let _ = self.apply(initial).await;
        self.publish();

        while let Some(event) = rx.recv().await {
            if let Event::Shutdown(reply) = event {
                self.stop();
                self.publish();
                let _ = reply.send(());
                return;
            }
            self.handle(event).await;
            self.publish();
        }
        self.stop();
    }

    async fn handle(&mut self, event: Event) {
        match event {
            Event::Command(command, reply) => {
                debug!(?command, "scheduler command");
                let step = match command {
                    Command::Pause => self.machine.pause(),
                    Command::Resume => self.machine.resume(),
                    Command::Toggle => self.machine.toggle(),
                    Command::UpdateSettings {
                        threshold,
                        resume_minutes,
                    } => self.machine.update_settings(threshold, resume_minutes),
                    Command::ReplacePayloads(set) => self.machine.replace_payloads(set),
                    Command::Status => Step::none(),
                };
                let result = self.apply(step).await.map(|()| self.snapshot());
                let _ = reply.send(result);
            }
            Event::ActionDue { generation } => {
                if self.action_timer.accept(generation) {
                    self.begin_attempt();
                } else {
                    debug!(generation, "stale action timer ignored");
                }
            }
            Event::ResumeDue { generation } => {
                if self.resume_timer.accept(generation) {
                    let step = self.machine.resume_due();
                    let _ = self.apply(step).await;
                } else {
                    debug!(generation, "stale resume timer ignored");
                }
            }
            Event::RecoveryDue { generation } => {
                if self.recovery_timer.accept(generation) {
                    self.recover().await;
                }
            }
            Event::Payloads(reply) => {
                let _ = reply.send(self.machine.state().payload_set.clone());
            }
            Event::Attempted {
                attempt,
                selection,
                outcome,
            } => self.finish_attempt(attempt, selection, outcome).await,
            Event::Shutdown(_) => {}
        }
    }

    // -----------------------------------------------------------------------
    // Action attempts
    // -----------------------------------------------------------------------

    fn begin_attempt(&mut self) {
        if self.stalled.is_some() || self.in_flight.is_some() {
            return;
        }
        let Some(selection) = self.machine.next_selection(&mut self.rng) else {
            return;
        };
        self.attempts += 1;
        let attempt = self.attempts;
        debug!(attempt, index = selection.index, payload = %selection.payload, "attempting action");

        let future = self.executor.attempt(selection.payload.clone());
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            let outcome = future.await;
            if let Some(tx) = events.upgrade() {
                let _ = tx
                    .send(Event::Attempted {
                        attempt,
                        selection,
                        outcome,
                    })
                    .await;
            }
        });
        self.in_flight = Some((attempt, handle));
    }

    async fn finish_attempt(&mut self, attempt: u64, selection: Selection, outcome: AttemptOutcome) {
        match &self.in_flight {
            Some((current, _)) if *current == attempt => self.in_flight = None,
            _ => {
                debug!(attempt, "outcome for abandoned attempt ignored");
                return;
            }
        }

        match outcome {
            AttemptOutcome::Completed => {
                let now = self.clock.now_millis();
                let recorded = self.machine.record_completion(&selection, now);
                if self.apply(recorded).await.is_err() {
                    return;
                }
                info!(
                    payload = %selection.payload,
                    count = self.machine.state().repetition_count,
                    "action completed"
                );
                let next = self.machine.evaluate_threshold(now);
                if let Some(note) = &next.note {
                    info!(%note, "threshold reached");
                }
                let _ = self.apply(next).await;
            }
            AttemptOutcome::NotReady(reason) => {
                debug!(%reason, "executor not ready; retrying");
                let step = self.machine.attempt_not_ready();
                let _ = self.apply(step).await;
            }
            AttemptOutcome::Failed(reason) => {
                warn!(%reason, payload = %selection.payload, "action failed; retrying");
                let step = self.machine.attempt_failed();
                let _ = self.apply(step).await;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Steps and timers
    // -----------------------------------------------------------------------

    /// Carry out a transition's side effects, plus any follow-up a recovered
    /// write calls for.
    async fn apply(&mut self, step: Step) -> Result<()> {
        let mut next = Some(step);
        while let Some(step) = next.take() {
            next = self.apply_one(step).await?;
        }
        Ok(())
    }

    /// Cancellations always apply; new timers are armed only once the state
    /// behind them is durable.
    async fn apply_one(&mut self, step: Step) -> Result<Option<Step>> {
        let mut follow_up = None;
        if let Some(note) = step.note {
            info!(%note, "scheduler");
            self.note = Some(note);
        }
        if step.action == TimerCmd::Cancel {
            self.action_timer.cancel();
        }
        if step.resume == TimerCmd::Cancel {
            self.resume_timer.cancel();
        }

        if step.persist {
            if let Err(e) = self.persist().await {
                self.stall(&e);
                return Err(e);
            }
            if self.stalled.take().is_some() {
                info!("state writes recovered");
                self.recovery_timer.cancel();
                follow_up = self.resume_progress();
            }
        }
        if self.stalled.is_some() {
            return Ok(None);
        }

        if let TimerCmd::Arm(pace) = step.action {
            self.arm_action(pace);
        }
        if let TimerCmd::Arm(delay) = step.resume {
            self.arm_resume(delay);
        }
        Ok(follow_up)
    }

    fn delay_for(&mut self, pace: Pace) -> Duration {
        match pace {
            Pace::Immediate => Duration::ZERO,
            Pace::Startup => self.options.startup_delay.sample(&mut self.rng),
            Pace::Cycle => self.options.action_delay.sample(&mut self.rng),
            Pace::NotReady => self.options.not_ready_backoff,
            Pace::Failure => self.options.failure_backoff,
        }
    }

    fn arm_action(&mut self, pace: Pace) {
        let delay = self.delay_for(pace);
        debug!(?pace, ?delay, "next action scheduled");
        self.action_timer
            .arm(delay, &self.events, |generation| Event::ActionDue { generation });
    }

    fn arm_resume(&mut self, delay: Duration) {
        debug!(?delay, "auto-resume scheduled");
        self.resume_timer
            .arm(delay, &self.events, |generation| Event::ResumeDue { generation });
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    async fn persist(&self) -> Result<()> {
        let attempts = self.options.write_attempts.max(1);
        let mut reason = String::new();
        for attempt in 1..=attempts {
            match self.machine.state().save(self.store.as_ref()) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "state write failed");
                    reason = match e {
                        PacerError::PersistenceWriteFailed(msg) => msg,
                        other => other.to_string(),
                    };
                    if attempt < attempts {
                        tokio::time::sleep(self.options.write_retry_delay).await;
                    }
                }
            }
        }
        Err(PacerError::PersistenceWriteFailed(reason))
    }

    /// Stop making progress until a state write succeeds.
    fn stall(&mut self, err: &PacerError) {
        error!(error = %err, "scheduler stalled; state could not be saved");
        self.stalled = Some(err.to_string());
        self.action_timer.cancel();
        self.resume_timer.cancel();
        self.recovery_timer.arm(self.options.recovery_interval, &self.events, |generation| {
            Event::RecoveryDue { generation }
        });
    }

    async fn recover(&mut self) {
        match self.persist().await {
            Ok(()) => {
                info!("state writes recovered");
                self.stalled = None;
                if let Some(step) = self.resume_progress() {
                    let _ = self.apply(step).await;
                }
            }
            Err(e) => {
                debug!(error = %e, "still stalled");
                self.stalled = Some(e.to_string());
                self.recovery_timer.arm(self.options.recovery_interval, &self.events, |generation| {
                    Event::RecoveryDue { generation }
                });
            }
        }
    }

    /// Re-arm whatever the current phase is waiting on. While running, the
    /// threshold is checked first: the write that stalled may have been the
    /// completion that reached it.
    fn resume_progress(&mut self) -> Option<Step> {
        match self.machine.phase() {
            Phase::Running if self.in_flight.is_none() && !self.action_timer.is_armed() => {
                Some(self.machine.continue_running(self.clock.now_millis()))
            }
            Phase::PausedScheduled { until } if !self.resume_timer.is_armed() => {
                let remaining = (until - self.clock.now_millis()).max(0) as u64;
                self.arm_resume(Duration::from_millis(remaining));
                None
            }
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // Status and shutdown
    // -----------------------------------------------------------------------

    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot::capture(
            &self.machine,
            self.clock.now_millis(),
            self.stalled.clone(),
            self.note.clone(),
        )
    }

    fn publish(&self) {
        self.status.send_replace(self.snapshot());
    }

    fn stop(&mut self) {
        self.action_timer.cancel();
        self.resume_timer.cancel();
        self.recovery_timer.cancel();
        if let Some((_, handle)) = self.in_flight.take() {
            handle.abort();
        }
        info!("scheduler stopped");
    }
}

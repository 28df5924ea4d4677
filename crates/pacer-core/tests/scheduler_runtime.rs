//! End-to-end scheduler behaviour under tokio's paused clock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use pacer_core::clock::TokioClock;
use pacer_core::executor::{ActionExecutor, AttemptOutcome};
use pacer_core::scheduler::{
    DelayWindow, Phase, Scheduler, SchedulerHandle, SchedulerOptions, StatusSnapshot,
};
use pacer_core::state::{keys, SchedulerState};
use pacer_core::store::{KeyValueStore, MemoryStore, StoreExt};
use pacer_core::words::PayloadSet;
use pacer_core::PacerError;
use serde_json::Value;

const NOW: i64 = 1_700_000_000_000;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Scripted {
    script: Mutex<VecDeque<AttemptOutcome>>,
    seen: Mutex<Vec<String>>,
}

impl Scripted {
    fn with_script(outcomes: Vec<AttemptOutcome>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(outcomes.into()),
            seen: Mutex::default(),
        })
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl ActionExecutor for Scripted {
    fn attempt(&self, payload: String) -> BoxFuture<'static, AttemptOutcome> {
        self.seen.lock().unwrap().push(payload);
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(AttemptOutcome::Completed);
        Box::pin(async move { outcome })
    }
}

/// A store whose writes can be switched off. Counts successful writes.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
    writes: AtomicUsize,
}

impl FlakyStore {
    fn check(&self) -> pacer_core::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(PacerError::PersistenceWriteFailed("disk full".into()))
        } else {
            Ok(())
        }
    }
}

impl KeyValueStore for FlakyStore {
    fn get_value(&self, key: &str) -> pacer_core::Result<Option<Value>> {
        self.inner.get_value(key)
    }

    fn set_value(&self, key: &str, value: Value) -> pacer_core::Result<()> {
        self.check()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set_value(key, value)
    }

    fn set_many(&self, entries: Vec<(&'static str, Value)>) -> pacer_core::Result<()> {
        self.check()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set_many(entries)
    }

    fn entries(&self) -> pacer_core::Result<Vec<(String, Value)>> {
        self.inner.entries()
    }
}

fn options() -> SchedulerOptions {
    SchedulerOptions {
        action_delay: DelayWindow::fixed(Duration::from_secs(5)),
        startup_delay: DelayWindow::fixed(Duration::from_secs(8)),
        not_ready_backoff: Duration::from_secs(1),
        failure_backoff: Duration::from_secs(2),
        write_attempts: 2,
        write_retry_delay: Duration::from_millis(100),
        recovery_interval: Duration::from_secs(5),
    }
}

fn words() -> PayloadSet {
    PayloadSet::from_words(["red", "green", "blue"].map(String::from)).unwrap()
}

fn seed(store: &dyn KeyValueStore, edit: impl FnOnce(&mut SchedulerState)) {
    let mut state = SchedulerState::with_payloads(words());
    edit(&mut state);
    state.save(store).unwrap();
}

fn start(store: Arc<dyn KeyValueStore>, executor: Arc<Scripted>) -> SchedulerHandle {
    Scheduler::new(store, executor)
        .with_clock(Arc::new(TokioClock::starting_at(NOW)))
        .with_options(options())
        .with_default_payloads(words())
        .with_seed(7)
        .start()
        .unwrap()
}

async fn wait_for(
    handle: &SchedulerHandle,
    pred: impl Fn(&StatusSnapshot) -> bool,
) -> StatusSnapshot {
    let mut rx = handle.subscribe();
    tokio::time::timeout(Duration::from_secs(3_600), async {
        loop {
            let snap = rx.borrow_and_update().clone();
            if pred(&snap) {
                return snap;
            }
            rx.changed().await.expect("scheduler running");
        }
    })
    .await
    .expect("condition reached")
}

// ---------------------------------------------------------------------------
// Threshold and auto-resume
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn pauses_after_threshold_without_auto_resume() {
    let store = Arc::new(MemoryStore::new());
    seed(store.as_ref(), |s| s.pause_threshold = 3);
    let exec = Scripted::with_script(Vec::new());
    let handle = start(store.clone(), exec.clone());

    let snap = wait_for(&handle, |s| s.phase == Phase::PausedIndefinite).await;
    assert_eq!(snap.repetition_count, 3);
    assert!(snap.is_paused);
    assert_eq!(snap.pause_until, None);
    assert_eq!(snap.note.as_deref(), Some("Auto-paused at 3 (no auto-resume)"));

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(exec.calls(), 3);
    assert!(store.get_or(keys::IS_PAUSED, false).unwrap());
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn auto_resume_resets_count_and_continues() {
    let store = Arc::new(MemoryStore::new());
    seed(store.as_ref(), |s| {
        s.pause_threshold = 2;
        s.resume_delay_minutes = 1;
    });
    let exec = Scripted::with_script(Vec::new());
    let handle = start(store.clone(), exec.clone());

    let paused = wait_for(&handle, |s| matches!(s.phase, Phase::PausedScheduled { .. })).await;
    assert_eq!(paused.repetition_count, 2);
    assert!(store.get_or(keys::PAUSE_UNTIL, 0i64).unwrap() > NOW);

    let resumed = wait_for(&handle, |s| s.phase == Phase::Running).await;
    assert_eq!(resumed.repetition_count, 0);
    let next = wait_for(&handle, |s| s.repetition_count == 1).await;
    assert!(!next.is_paused);
    handle.shutdown().await;
}

// ---------------------------------------------------------------------------
// Restart reconciliation
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn elapsed_pause_is_caught_up_on_start() {
    let store = Arc::new(MemoryStore::new());
    seed(store.as_ref(), |s| {
        s.repetition_count = 3;
        s.pause_threshold = 3;
        s.resume_delay_minutes = 1;
        s.is_paused = true;
        s.pause_until = Some(NOW - 90_000);
    });
    let exec = Scripted::with_script(Vec::new());
    let handle = start(store.clone(), exec.clone());

    let snap = handle.status();
    assert_eq!(snap.phase, Phase::Running);
    assert_eq!(snap.repetition_count, 0);
    assert!(!snap.is_paused);

    wait_for(&handle, |s| s.repetition_count == 1).await;
    assert!(!store.get_or(keys::IS_PAUSED, true).unwrap());
    assert_eq!(store.get_or(keys::PAUSE_UNTIL, -5i64).unwrap(), 0);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn pending_pause_resumes_at_original_deadline() {
    let store = Arc::new(MemoryStore::new());
    seed(store.as_ref(), |s| {
        s.repetition_count = 3;
        s.pause_threshold = 3;
        s.resume_delay_minutes = 5;
        s.is_paused = true;
        s.pause_until = Some(NOW + 120_000);
    });
    let exec = Scripted::with_script(Vec::new());
    let handle = start(store.clone(), exec.clone());

    let snap = handle.status();
    assert_eq!(snap.phase, Phase::PausedScheduled { until: NOW + 120_000 });
    assert_eq!(snap.remaining_pause_millis, 120_000);

    tokio::time::sleep(Duration::from_secs(119)).await;
    assert!(handle.status().is_paused);
    assert_eq!(exec.calls(), 0);

    let resumed = wait_for(&handle, |s| s.phase == Phase::Running).await;
    assert_eq!(resumed.repetition_count, 0);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn count_survives_restart() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let exec = Scripted::with_script(Vec::new());

    let handle = start(store.clone(), exec.clone());
    wait_for(&handle, |s| s.repetition_count == 2).await;
    handle.shutdown().await;

    let handle = start(store.clone(), exec.clone());
    let snap = handle.status();
    assert_eq!(snap.repetition_count, 2);
    assert!(snap.last_payload.is_some());
    handle.shutdown().await;
}

// ---------------------------------------------------------------------------
// Manual control
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn manual_resume_keeps_count_and_repauses() {
    let store = Arc::new(MemoryStore::new());
    seed(store.as_ref(), |s| {
        s.pause_threshold = 2;
        s.resume_delay_minutes = 5;
    });
    let exec = Scripted::with_script(Vec::new());
    let handle = start(store.clone(), exec.clone());

    wait_for(&handle, |s| matches!(s.phase, Phase::PausedScheduled { .. })).await;
    let resumed = handle.resume().await.unwrap();
    assert_eq!(resumed.phase, Phase::Running);
    assert_eq!(resumed.repetition_count, 2);
    assert_eq!(store.get_or(keys::PAUSE_UNTIL, -1i64).unwrap(), 0);

    let repaused = wait_for(&handle, |s| s.is_paused).await;
    assert_eq!(repaused.repetition_count, 3);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn manual_pause_stops_actions_until_resumed() {
    let store = Arc::new(MemoryStore::new());
    let exec = Scripted::with_script(Vec::new());
    let handle = start(store.clone(), exec.clone());

    wait_for(&handle, |s| s.repetition_count == 1).await;
    let paused = handle.pause().await.unwrap();
    assert_eq!(paused.phase, Phase::PausedManual);
    let calls = exec.calls();

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(exec.calls(), calls);

    let toggled = handle.toggle().await.unwrap();
    assert_eq!(toggled.phase, Phase::Running);
    wait_for(&handle, |s| s.repetition_count == 2).await;
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn settings_are_persisted() {
    let store = Arc::new(MemoryStore::new());
    let exec = Scripted::with_script(Vec::new());
    let handle = start(store.clone(), exec);

    handle.update_settings(Some(4), None).await.unwrap();
    let snap = handle.update_settings(None, Some(15)).await.unwrap();
    assert_eq!(snap.pause_threshold, 4);
    assert_eq!(snap.resume_delay_minutes, 15);
    assert_eq!(store.get_or(keys::PAUSE_THRESHOLD, 0u32).unwrap(), 4);
    assert_eq!(store.get_or(keys::RESUME_DELAY_MINUTES, 0u32).unwrap(), 15);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn both_settings_land_in_one_write() {
    let store = Arc::new(FlakyStore::default());
    let handle = start(store.clone(), Scripted::with_script(Vec::new()));
    handle.pause().await.unwrap();
    let before = store.writes.load(Ordering::SeqCst);

    let snap = handle.update_settings(Some(3), Some(10)).await.unwrap();
    assert_eq!(store.writes.load(Ordering::SeqCst), before + 1);
    assert_eq!((snap.pause_threshold, snap.resume_delay_minutes), (3, 10));

    store.failing.store(true, Ordering::SeqCst);
    let err = handle.update_settings(Some(7), Some(20)).await.unwrap_err();
    assert!(matches!(err, PacerError::PersistenceWriteFailed(_)));
    assert_eq!(store.get_or(keys::PAUSE_THRESHOLD, 0u32).unwrap(), 3);
    assert_eq!(store.get_or(keys::RESUME_DELAY_MINUTES, 0u32).unwrap(), 10);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn commands_after_shutdown_fail() {
    let store = Arc::new(MemoryStore::new());
    let handle = start(store, Scripted::with_script(Vec::new()));
    handle.shutdown().await;
    assert!(matches!(handle.pause().await, Err(PacerError::SchedulerStopped)));
}

// ---------------------------------------------------------------------------
// Executor outcomes
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn not_ready_retries_the_same_payload() {
    let store = Arc::new(MemoryStore::new());
    let exec = Scripted::with_script(vec![
        AttemptOutcome::NotReady("field not focused".into()),
        AttemptOutcome::Failed("typing interrupted".into()),
        AttemptOutcome::Completed,
    ]);
    let handle = start(store.clone(), exec.clone());

    let snap = wait_for(&handle, |s| s.repetition_count == 1).await;
    let seen = exec.seen();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|p| p == &seen[0]));
    assert_eq!(snap.last_payload.as_deref(), Some(seen[0].as_str()));
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn consecutive_payloads_differ() {
    let store = Arc::new(MemoryStore::new());
    let exec = Scripted::with_script(Vec::new());
    let handle = start(store, exec.clone());

    wait_for(&handle, |s| s.repetition_count == 20).await;
    let seen = exec.seen();
    for pair in seen.windows(2) {
        assert_ne!(pair[0], pair[1]);
    }
    handle.shutdown().await;
}

// ---------------------------------------------------------------------------
// Persistence failures
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn stalls_on_write_failure_and_recovers() {
    let store = Arc::new(FlakyStore::default());
    let exec = Scripted::with_script(Vec::new());
    let handle = start(store.clone(), exec.clone());

    wait_for(&handle, |s| s.repetition_count == 1).await;
    store.failing.store(true, Ordering::SeqCst);

    let stalled = wait_for(&handle, |s| s.stalled.is_some()).await;
    assert!(stalled.stalled.unwrap().contains("disk full"));
    let calls = exec.calls();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(exec.calls(), calls);

    store.failing.store(false, Ordering::SeqCst);
    let recovered = wait_for(&handle, |s| s.stalled.is_none() && s.repetition_count > 2).await;
    assert!(exec.calls() > calls);
    assert_eq!(
        store.get_or(keys::REPETITION_COUNT, 0u32).unwrap(),
        recovered.repetition_count
    );
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn threshold_is_honoured_after_a_stalled_completion() {
    let store = Arc::new(FlakyStore::default());
    seed(store.as_ref(), |s| s.pause_threshold = 2);
    let exec = Scripted::with_script(Vec::new());
    let handle = start(store.clone(), exec.clone());

    wait_for(&handle, |s| s.repetition_count == 1).await;
    store.failing.store(true, Ordering::SeqCst);

    // The write for the threshold-reaching completion fails.
    let stalled = wait_for(&handle, |s| s.stalled.is_some()).await;
    assert_eq!(stalled.repetition_count, 2);
    assert_eq!(stalled.phase, Phase::Running);
    assert_eq!(exec.calls(), 2);

    store.failing.store(false, Ordering::SeqCst);
    let paused = wait_for(&handle, |s| s.stalled.is_none() && s.is_paused).await;
    assert_eq!(paused.phase, Phase::PausedIndefinite);
    assert_eq!(paused.repetition_count, 2);
    assert_eq!(store.get_or(keys::REPETITION_COUNT, 0u32).unwrap(), 2);
    assert!(store.get_or(keys::IS_PAUSED, false).unwrap());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(exec.calls(), 2);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn newer_schema_refuses_to_start() {
    let store = Arc::new(MemoryStore::new());
    store.set(keys::SCHEMA_VERSION, &99u32).unwrap();
    let result = Scheduler::new(store, Scripted::with_script(Vec::new())).start();
    assert!(matches!(result, Err(PacerError::UnsupportedSchema { found: 99, .. })));
}

#[tokio::test(start_paused = true)]
async fn replacing_payloads_is_persisted() {
    let store = Arc::new(MemoryStore::new());
    let handle = start(store.clone(), Scripted::with_script(Vec::new()));
    let fresh = PayloadSet::from_words(["one", "two"].map(String::from)).unwrap();
    let snap = handle.replace_payloads(fresh).await.unwrap();
    assert_eq!(snap.payload_count, 2);
    let stored: Vec<String> = store.get_or(keys::PAYLOAD_SET, Vec::new()).unwrap();
    assert_eq!(stored, vec!["one".to_string(), "two".to_string()]);
    handle.shutdown().await;
}

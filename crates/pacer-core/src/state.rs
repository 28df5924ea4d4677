use crate::error::{PacerError, Result};
use crate::migrations;
use crate::store::{KeyValueStore, StoreExt};
use crate::words::{default_words, PayloadSet};
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Persisted layout
// ---------------------------------------------------------------------------

pub const SCHEMA_VERSION: u32 = 1;

pub mod keys {
    pub const SCHEMA_VERSION: &str = "schema_version";
    pub const REPETITION_COUNT: &str = "repetition_count";
    pub const PAUSE_THRESHOLD: &str = "pause_threshold";
    pub const RESUME_DELAY_MINUTES: &str = "resume_delay_minutes";
    pub const IS_PAUSED: &str = "is_paused";
    pub const PAUSE_UNTIL: &str = "pause_until";
    pub const LAST_SELECTED_INDEX: &str = "last_selected_index";
    pub const LAST_PAYLOAD: &str = "last_payload";
    pub const LAST_ACTION_TIME: &str = "last_action_time";
    pub const PAYLOAD_SET: &str = "payload_set";
}

// ---------------------------------------------------------------------------
// SchedulerState
// ---------------------------------------------------------------------------

/// The scheduler's durable record.
///
/// Timestamps are epoch milliseconds. In the store, `None` timestamps are
/// written as `0` and an unset selection index as `-1`.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerState {
    pub repetition_count: u32,
    /// Auto-pause after this many repetitions; 0 disables.
    pub pause_threshold: u32,
    /// Minutes before an auto-pause resumes; 0 disables.
    pub resume_delay_minutes: u32,
    pub is_paused: bool,
    pub pause_until: Option<i64>,
    pub last_selected_index: Option<usize>,
    pub last_payload: Option<String>,
    pub last_action_time: Option<i64>,
    pub payload_set: PayloadSet,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self::with_payloads(default_words())
    }
}

impl SchedulerState {
    pub fn with_payloads(payload_set: PayloadSet) -> Self {
        Self {
            repetition_count: 0,
            pause_threshold: 0,
            resume_delay_minutes: 0,
            is_paused: false,
            pause_until: None,
            last_selected_index: None,
            last_payload: None,
            last_action_time: None,
            payload_set,
        }
    }

    /// The last selected index, or `None` when it no longer points into the
    /// current payload set.
    pub fn valid_last_index(&self) -> Option<usize> {
        self.last_selected_index
            .filter(|&i| i < self.payload_set.len())
    }

    /// Milliseconds until the scheduled auto-resume, 0 when none is pending.
    pub fn remaining_pause_millis(&self, now: i64) -> u64 {
        self.pause_until
            .map(|until| (until - now).max(0) as u64)
            .unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Load the record, falling back to `defaults` for a first-ever start.
    ///
    /// Returns `(state, fresh)` where `fresh` is true when the store held no
    /// record at all.
    pub fn load(store: &dyn KeyValueStore, defaults: PayloadSet) -> Result<(Self, bool)> {
        let version: Option<u64> = store
            .get_value(keys::SCHEMA_VERSION)?
            .and_then(|v| v.as_u64());
        let fresh = version.is_none() && store.get_value(keys::REPETITION_COUNT)?.is_none();
        if fresh {
            return Ok((Self::with_payloads(defaults), true));
        }

        let version = match version {
            None => SCHEMA_VERSION,
            Some(found) => u32::try_from(found)
                .ok()
                .filter(|v| *v <= SCHEMA_VERSION)
                .ok_or(PacerError::UnsupportedSchema {
                    found,
                    supported: SCHEMA_VERSION,
                })?,
        };
        migrations::migrate_state(store, version)?;

        let stored_words: Vec<String> = store.get_or(keys::PAYLOAD_SET, Vec::new())?;
        let payload_set = PayloadSet::from_words(stored_words).unwrap_or(defaults);

        let index: i64 = store.get_or(keys::LAST_SELECTED_INDEX, -1)?;
        let pause_until: i64 = store.get_or(keys::PAUSE_UNTIL, 0)?;
        let last_action_time: i64 = store.get_or(keys::LAST_ACTION_TIME, 0)?;

        let state = Self {
            repetition_count: store.get_or(keys::REPETITION_COUNT, 0)?,
            pause_threshold: store.get_or(keys::PAUSE_THRESHOLD, 0)?,
            resume_delay_minutes: store.get_or(keys::RESUME_DELAY_MINUTES, 0)?,
            is_paused: store.get_or(keys::IS_PAUSED, false)?,
            pause_until: (pause_until > 0).then_some(pause_until),
            last_selected_index: usize::try_from(index).ok(),
            last_payload: store.get_or(keys::LAST_PAYLOAD, None)?,
            last_action_time: (last_action_time > 0).then_some(last_action_time),
            payload_set,
        };
        Ok((state, false))
    }

    /// Write every field in one batch.
    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        store.set_many(self.entries())
    }

    /// The flat key/value layout of this record.
    pub fn entries(&self) -> Vec<(&'static str, Value)> {
        vec![
            (keys::SCHEMA_VERSION, json!(SCHEMA_VERSION)),
            (keys::REPETITION_COUNT, json!(self.repetition_count)),
            (keys::PAUSE_THRESHOLD, json!(self.pause_threshold)),
            (keys::RESUME_DELAY_MINUTES, json!(self.resume_delay_minutes)),
            (keys::IS_PAUSED, json!(self.is_paused)),
            (keys::PAUSE_UNTIL, json!(self.pause_until.unwrap_or(0))),
            (
                keys::LAST_SELECTED_INDEX,
                json!(self.last_selected_index.map(|i| i as i64).unwrap_or(-1)),
            ),
            (keys::LAST_PAYLOAD, json!(self.last_payload)),
            (keys::LAST_ACTION_TIME, json!(self.last_action_time.unwrap_or(0))),
            (keys::PAYLOAD_SET, json!(self.payload_set.as_slice())),
        ]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn words(list: &[&str]) -> PayloadSet {
        PayloadSet::from_words(list.iter().map(|s| s.to_string())).unwrap()
    }

    #[test]
    fn empty_store_is_fresh() {
        let store = MemoryStore::new();
        let (state, fresh) = SchedulerState::load(&store, words(&["a", "b"])).unwrap();
        assert!(fresh);
        assert_eq!(state.repetition_count, 0);
        assert_eq!(state.payload_set.len(), 2);
        assert_eq!(state.last_selected_index, None);
    }

    #[test]
    fn save_then_load_restores_every_field() {
        let store = MemoryStore::new();
        let state = SchedulerState {
            repetition_count: 4,
            pause_threshold: 5,
            resume_delay_minutes: 10,
            is_paused: true,
            pause_until: Some(1_700_000_123_000),
            last_selected_index: Some(1),
            last_payload: Some("beta".into()),
            last_action_time: Some(1_700_000_000_000),
            payload_set: words(&["alpha", "beta", "gamma"]),
        };
        state.save(&store).unwrap();

        let (loaded, fresh) = SchedulerState::load(&store, words(&["x"])).unwrap();
        assert!(!fresh);
        assert_eq!(loaded, state);
    }

    #[test]
    fn zero_and_minus_one_map_to_none() {
        let store = MemoryStore::new();
        SchedulerState::with_payloads(words(&["a"])).save(&store).unwrap();
        assert_eq!(store.get_or(keys::PAUSE_UNTIL, 42i64).unwrap(), 0);
        assert_eq!(store.get_or(keys::LAST_SELECTED_INDEX, 42i64).unwrap(), -1);

        let (loaded, _) = SchedulerState::load(&store, words(&["z"])).unwrap();
        assert_eq!(loaded.pause_until, None);
        assert_eq!(loaded.last_selected_index, None);
        assert_eq!(loaded.last_action_time, None);
    }

    #[test]
    fn newer_schema_is_rejected() {
        let store = MemoryStore::new();
        store.set(keys::SCHEMA_VERSION, &(SCHEMA_VERSION + 1)).unwrap();
        let err = SchedulerState::load(&store, words(&["a"])).unwrap_err();
        assert!(matches!(err, PacerError::UnsupportedSchema { .. }));
    }

    #[test]
    fn oversized_schema_version_is_not_truncated() {
        let store = MemoryStore::new();
        // Truncates to 1 when narrowed to u32.
        let huge = (1u64 << 32) + 1;
        store.set(keys::SCHEMA_VERSION, &huge).unwrap();
        let err = SchedulerState::load(&store, words(&["a"])).unwrap_err();
        assert!(
            matches!(err, PacerError::UnsupportedSchema { found, .. } if found == huge),
            "{err}"
        );
    }

    #[test]
    fn empty_persisted_payloads_fall_back_to_defaults() {
        let store = MemoryStore::new();
        store.set(keys::REPETITION_COUNT, &2u32).unwrap();
        store.set(keys::PAYLOAD_SET, &Vec::<String>::new()).unwrap();
        let (loaded, fresh) = SchedulerState::load(&store, words(&["d1", "d2"])).unwrap();
        assert!(!fresh);
        assert_eq!(loaded.repetition_count, 2);
        assert_eq!(loaded.payload_set.as_slice(), &["d1".to_string(), "d2".to_string()]);
    }

    #[test]
    fn stale_index_is_range_checked() {
        let mut state = SchedulerState::with_payloads(words(&["a", "b", "c"]));
        state.last_selected_index = Some(2);
        assert_eq!(state.valid_last_index(), Some(2));
        state.payload_set = words(&["only"]);
        assert_eq!(state.valid_last_index(), None);
    }

    #[test]
    fn remaining_pause_never_negative() {
        let mut state = SchedulerState::default();
        assert_eq!(state.remaining_pause_millis(1_000), 0);
        state.pause_until = Some(5_000);
        assert_eq!(state.remaining_pause_millis(1_000), 4_000);
        assert_eq!(state.remaining_pause_millis(9_000), 0);
    }
}

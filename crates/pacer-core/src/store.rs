//! Key/value persistence for scheduler state.
//!
//! # Table design
//!
//! A single `KV` table maps stable string keys to JSON-encoded values:
//! ```text
//! "repetition_count" -> 3
//! "pause_until"      -> 1718000000000
//! "payload_set"      -> ["apple","banana",...]
//! ```
//!
//! Values are primitives or string arrays, so the layout stays readable
//! with any redb browser and needs no per-field schema. Batched writes go
//! through one write transaction, so a crash never leaves a half-written
//! snapshot behind.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use redb::{Database, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{PacerError, Result};

// ---------------------------------------------------------------------------
// Table definition
// ---------------------------------------------------------------------------

/// Key: stable field name. Value: JSON bytes.
const KV: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");

// ---------------------------------------------------------------------------
// KeyValueStore
// ---------------------------------------------------------------------------

/// Durable key/value storage with read-your-writes semantics inside one process.
pub trait KeyValueStore: Send + Sync {
    fn get_value(&self, key: &str) -> Result<Option<Value>>;

    fn set_value(&self, key: &str, value: Value) -> Result<()>;

    /// Write several keys at once. Implementations should make this atomic.
    fn set_many(&self, entries: Vec<(&'static str, Value)>) -> Result<()> {
        for (key, value) in entries {
            self.set_value(key, value)?;
        }
        Ok(())
    }

    /// All stored entries, ordered by key.
    fn entries(&self) -> Result<Vec<(String, Value)>>;
}

/// Typed accessors over any [`KeyValueStore`].
pub trait StoreExt {
    /// Read `key`, returning `default` when it is absent or holds a value of
    /// the wrong shape.
    fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T>;

    fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()>;
}

impl<S: KeyValueStore + ?Sized> StoreExt for S {
    fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        match self.get_value(key)? {
            None => Ok(default),
            Some(v) => match serde_json::from_value(v) {
                Ok(t) => Ok(t),
                Err(e) => {
                    warn!(key, error = %e, "stored value has an unexpected shape; using default");
                    Ok(default)
                }
            },
        }
    }

    fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set_value(key, serde_json::to_value(value)?)
    }
}

// ---------------------------------------------------------------------------
// RedbStore
// ---------------------------------------------------------------------------

fn read_err(e: impl std::fmt::Display) -> PacerError {
    PacerError::Store(e.to_string())
}

fn write_err(e: impl std::fmt::Display) -> PacerError {
    PacerError::PersistenceWriteFailed(e.to_string())
}

/// File-backed store using redb.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create the redb database at `path`.
    ///
    /// Creates the parent directory and the `KV` table if they don't exist.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(read_err)?;
        // Ensure the table exists before any reads
        let wt = db.begin_write().map_err(write_err)?;
        wt.open_table(KV).map_err(write_err)?;
        wt.commit().map_err(write_err)?;
        Ok(Self { db })
    }
}

impl KeyValueStore for RedbStore {
    fn get_value(&self, key: &str) -> Result<Option<Value>> {
        let rt = self.db.begin_read().map_err(read_err)?;
        let table = rt.open_table(KV).map_err(read_err)?;
        match table.get(key).map_err(read_err)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    fn set_value(&self, key: &str, value: Value) -> Result<()> {
        let bytes = serde_json::to_vec(&value)?;
        let wt = self.db.begin_write().map_err(write_err)?;
        {
            let mut table = wt.open_table(KV).map_err(write_err)?;
            table.insert(key, bytes.as_slice()).map_err(write_err)?;
        }
        wt.commit().map_err(write_err)?;
        Ok(())
    }

    fn set_many(&self, entries: Vec<(&'static str, Value)>) -> Result<()> {
        let encoded = entries
            .into_iter()
            .map(|(k, v)| serde_json::to_vec(&v).map(|b| (k, b)))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let wt = self.db.begin_write().map_err(write_err)?;
        {
            let mut table = wt.open_table(KV).map_err(write_err)?;
            for (key, bytes) in &encoded {
                table.insert(*key, bytes.as_slice()).map_err(write_err)?;
            }
        }
        wt.commit().map_err(write_err)?;
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(String, Value)>> {
        let rt = self.db.begin_read().map_err(read_err)?;
        let table = rt.open_table(KV).map_err(read_err)?;

        let mut result = Vec::new();
        for entry in table.iter().map_err(read_err)? {
            let (k, v) = entry.map_err(read_err)?;
            result.push((k.value().to_string(), serde_json::from_slice(v.value())?));
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Value>>> {
        self.map
            .lock()
            .map_err(|_| PacerError::Store("memory store mutex poisoned".into()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get_value(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set_value(&self, key: &str, value: Value) -> Result<()> {
        self.lock()?.insert(key.to_string(), value);
        Ok(())
    }

    fn set_many(&self, entries: Vec<(&'static str, Value)>) -> Result<()> {
        let mut map = self.lock()?;
        for (key, value) in entries {
            map.insert(key.to_string(), value);
        }
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(String, Value)>> {
        Ok(self
            .lock()?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

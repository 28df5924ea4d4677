use crate::output::{print_json, print_table};
use anyhow::Context;
use pacer_core::paths;
use pacer_core::store::{KeyValueStore, RedbStore};
use std::path::Path;

/// Dump the persisted record straight from the store file.
///
/// redb takes an exclusive lock, so this fails while `pacer run` holds the
/// file open; use `pacer status` against the daemon instead.
pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let path = paths::state_db_path(root);
    if !path.exists() {
        if json {
            print_json(&serde_json::json!({}))?;
        } else {
            println!("No state recorded yet ({} does not exist).", paths::STATE_DB_FILE);
        }
        return Ok(());
    }

    let store = RedbStore::open(&path)
        .with_context(|| format!("failed to open {} (is `pacer run` using it?)", path.display()))?;
    let entries = store.entries()?;

    if json {
        let map: serde_json::Map<String, serde_json::Value> = entries.into_iter().collect();
        print_json(&map)?;
        return Ok(());
    }

    let rows = entries
        .into_iter()
        .map(|(key, value)| vec![key, display_value(&value)])
        .collect();
    print_table(&["KEY", "VALUE"], rows);
    Ok(())
}

fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "-".to_string(),
        serde_json::Value::Array(items) => format!("[{} entries]", items.len()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display_value_summarizes_lists() {
        assert_eq!(display_value(&json!(["a", "b", "c"])), "[3 entries]");
        assert_eq!(display_value(&json!("apple")), "apple");
        assert_eq!(display_value(&json!(null)), "-");
        assert_eq!(display_value(&json!(42)), "42");
        assert_eq!(display_value(&json!(false)), "false");
    }
}

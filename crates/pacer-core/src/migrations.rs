use crate::error::Result;
use crate::store::KeyValueStore;

/// Run any pending schema migrations on the persisted scheduler record.
///
/// Currently a no-op: schema v1 has no migrations. When the key layout
/// changes in a way that needs a data transform, add a match arm here:
///
/// ```rust,ignore
/// match version {
///     1 => migrate_v1_to_v2(store),
///     _ => Ok(()),
/// }
/// ```
pub fn migrate_state(_store: &dyn KeyValueStore, _version: u32) -> Result<()> {
    Ok(())
}

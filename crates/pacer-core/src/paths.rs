use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const PACER_DIR: &str = ".pacer";
pub const CONFIG_FILE: &str = ".pacer/config.yaml";
pub const STATE_DB_FILE: &str = ".pacer/state.redb";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn pacer_dir(root: &Path) -> PathBuf {
    root.join(PACER_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn state_db_path(root: &Path) -> PathBuf {
    root.join(STATE_DB_FILE)
}

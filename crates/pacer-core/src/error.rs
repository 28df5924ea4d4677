use thiserror::Error;

#[derive(Debug, Error)]
pub enum PacerError {
    #[error("not initialized: run 'pacer init'")]
    NotInitialized,

    #[error("persistence write failed: {0}")]
    PersistenceWriteFailed(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("unsupported state schema version {found} (this build understands up to {supported})")]
    UnsupportedSchema { found: u64, supported: u32 },

    #[error("remote fetch failed: {0}")]
    RemoteFetchFailed(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("invalid setting '{name}': {reason}")]
    InvalidSetting { name: String, reason: String },

    #[error("scheduler stopped")]
    SchedulerStopped,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PacerError>;

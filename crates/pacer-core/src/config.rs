use crate::error::{PacerError, Result};
use crate::paths;
use crate::scheduler::{DelayWindow, SchedulerOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// PacingConfig
// ---------------------------------------------------------------------------

/// Delays between actions and between retries, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    #[serde(default = "default_min_delay")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Stagger before the first action after a start or a catch-up resume.
    #[serde(default = "default_startup_min")]
    pub startup_min_delay_ms: u64,
    #[serde(default = "default_startup_max")]
    pub startup_max_delay_ms: u64,
    #[serde(default = "default_not_ready_backoff")]
    pub not_ready_backoff_ms: u64,
    #[serde(default = "default_failure_backoff")]
    pub failure_backoff_ms: u64,
}

fn default_min_delay() -> u64 {
    5_000
}

fn default_max_delay() -> u64 {
    10_000
}

fn default_startup_min() -> u64 {
    8_000
}

fn default_startup_max() -> u64 {
    10_000
}

fn default_not_ready_backoff() -> u64 {
    1_000
}

fn default_failure_backoff() -> u64 {
    2_000
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay(),
            max_delay_ms: default_max_delay(),
            startup_min_delay_ms: default_startup_min(),
            startup_max_delay_ms: default_startup_max(),
            not_ready_backoff_ms: default_not_ready_backoff(),
            failure_backoff_ms: default_failure_backoff(),
        }
    }
}

// ---------------------------------------------------------------------------
// PersistenceConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Attempts per state transition before the scheduler stalls.
    #[serde(default = "default_write_attempts")]
    pub write_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// How often a stalled scheduler re-attempts the write.
    #[serde(default = "default_recovery_interval")]
    pub recovery_interval_ms: u64,
}

fn default_write_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    200
}

fn default_recovery_interval() -> u64 {
    5_000
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            write_attempts: default_write_attempts(),
            retry_delay_ms: default_retry_delay(),
            recovery_interval_ms: default_recovery_interval(),
        }
    }
}

// ---------------------------------------------------------------------------
// WordsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordsConfig {
    /// Remote word list. `None` disables the refresher.
    #[serde(default = "default_words_url")]
    pub url: Option<String>,
    #[serde(default = "default_refresh_hours")]
    pub refresh_hours: u64,
    #[serde(default = "default_fetch_timeout")]
    pub timeout_ms: u64,
    /// Overrides the built-in default word list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<Vec<String>>,
}

fn default_words_url() -> Option<String> {
    Some("https://random-word-api.vercel.app/api?words=70".to_string())
}

fn default_refresh_hours() -> u64 {
    24
}

fn default_fetch_timeout() -> u64 {
    5_000
}

impl Default for WordsConfig {
    fn default() -> Self {
        Self {
            url: default_words_url(),
            refresh_hours: default_refresh_hours(),
            timeout_ms: default_fetch_timeout(),
            defaults: None,
        }
    }
}

impl WordsConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_hours.max(1) * 3600)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// ExecutorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Program and arguments. `{payload}` is substituted; when absent the
    /// payload is appended. Empty means dry-run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default = "default_not_ready_exit_code")]
    pub not_ready_exit_code: i32,
    /// The executor reports "not ready" while this path is missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_typing_min")]
    pub typing_min_ms: u64,
    #[serde(default = "default_typing_max")]
    pub typing_max_ms: u64,
}

fn default_not_ready_exit_code() -> i32 {
    75
}

fn default_typing_min() -> u64 {
    20
}

fn default_typing_max() -> u64 {
    50
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            not_ready_exit_code: default_not_ready_exit_code(),
            ready_path: None,
            timeout_secs: None,
            typing_min_ms: default_typing_min(),
            typing_max_ms: default_typing_max(),
        }
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    7878
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub words: WordsConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            pacing: PacingConfig::default(),
            persistence: PersistenceConfig::default(),
            words: WordsConfig::default(),
            executor: ExecutorConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(PacerError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(root: &Path) -> Result<Self> {
        match Self::load(root) {
            Err(PacerError::NotInitialized) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Scheduler timing knobs derived from the `pacing` and `persistence` sections.
    pub fn scheduler_options(&self) -> SchedulerOptions {
        let p = &self.pacing;
        SchedulerOptions {
            action_delay: DelayWindow::from_millis(p.min_delay_ms, p.max_delay_ms),
            startup_delay: DelayWindow::from_millis(p.startup_min_delay_ms, p.startup_max_delay_ms),
            not_ready_backoff: Duration::from_millis(p.not_ready_backoff_ms),
            failure_backoff: Duration::from_millis(p.failure_backoff_ms),
            write_attempts: self.persistence.write_attempts.max(1),
            write_retry_delay: Duration::from_millis(self.persistence.retry_delay_ms),
            recovery_interval: Duration::from_millis(self.persistence.recovery_interval_ms.max(1)),
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let p = &self.pacing;

        let windows = [
            ("pacing.min_delay_ms", p.min_delay_ms, p.max_delay_ms),
            (
                "pacing.startup_min_delay_ms",
                p.startup_min_delay_ms,
                p.startup_max_delay_ms,
            ),
            (
                "executor.typing_min_ms",
                self.executor.typing_min_ms,
                self.executor.typing_max_ms,
            ),
        ];
        for (name, min, max) in windows {
            if min > max {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("{name} ({min}) is greater than its maximum ({max})"),
                });
            }
        }

        if p.not_ready_backoff_ms == 0 || p.failure_backoff_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "a zero retry backoff makes the scheduler spin on a failing executor"
                    .to_string(),
            });
        }

        if self.persistence.write_attempts == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "persistence.write_attempts=0 is treated as 1".to_string(),
            });
        }

        if let Some(url) = &self.words.url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("words.url '{url}' is not an http(s) URL"),
                });
            }
        }

        if matches!(&self.words.defaults, Some(d) if d.iter().all(|w| w.trim().is_empty())) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "words.defaults is empty; the built-in list is used instead".to_string(),
            });
        }

        if self.executor.command.first().is_some_and(|p| p.trim().is_empty()) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "executor.command has an empty program name".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! `pacer-exec` performs scheduled actions by running an external command.
//!
//! # Architecture
//!
//! ```text
//! ExecutorConfig
//!     │
//!     ▼
//! CommandExecutor   ← argv with `{payload}` substituted (or appended)
//!     │                ready-path check, timeout, typing-pace env
//!     ▼
//! ActionProcess     ← tokio::process child, stderr collected in background
//!     │
//!     ▼
//! AttemptOutcome    ← Completed | NotReady | Failed
//! ```
//!
//! With no command configured, [`build_executor`] falls back to the core
//! dry-run executor.

pub mod command;
pub mod error;

pub(crate) mod process;

use std::sync::Arc;

use pacer_core::config::ExecutorConfig;
use pacer_core::executor::{ActionExecutor, DryRunExecutor};
use tracing::info;

pub use command::CommandExecutor;
pub use error::ExecError;

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ExecError>;

/// The executor described by `cfg`, run from `workdir`.
pub fn build_executor(
    cfg: &ExecutorConfig,
    workdir: &std::path::Path,
) -> Result<Arc<dyn ActionExecutor>> {
    if cfg.command.is_empty() {
        info!("no executor command configured; running dry");
        return Ok(Arc::new(DryRunExecutor));
    }
    let exec = CommandExecutor::from_config(cfg)?.with_workdir(workdir);
    info!(command = ?cfg.command, "using command executor");
    Ok(Arc::new(exec))
}

use std::path::PathBuf;
use std::time::Duration;

use futures::future::BoxFuture;
use pacer_core::config::ExecutorConfig;
use pacer_core::executor::{ActionExecutor, AttemptOutcome};
use tokio::process::Command;
use tracing::debug;

use crate::process::{ActionProcess, ExitReport};
use crate::{ExecError, Result};

/// Placeholder replaced by the payload in command arguments.
pub const PAYLOAD_PLACEHOLDER: &str = "{payload}";

/// Runs a configured program once per action.
///
/// Exit status 0 is a completed action; the configured not-ready code means
/// the target was not ready and nothing happened; anything else is a failure
/// carrying the child's stderr.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
    not_ready_exit_code: i32,
    ready_path: Option<PathBuf>,
    timeout: Option<Duration>,
    typing_min_ms: u64,
    typing_max_ms: u64,
    workdir: Option<PathBuf>,
}

impl CommandExecutor {
    pub fn from_config(cfg: &ExecutorConfig) -> Result<Self> {
        let (program, args) = cfg.command.split_first().ok_or(ExecError::EmptyCommand)?;
        if program.trim().is_empty() {
            return Err(ExecError::EmptyCommand);
        }
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            not_ready_exit_code: cfg.not_ready_exit_code,
            ready_path: cfg.ready_path.clone(),
            timeout: cfg.timeout_secs.map(Duration::from_secs),
            typing_min_ms: cfg.typing_min_ms,
            typing_max_ms: cfg.typing_max_ms,
            workdir: None,
        })
    }

    /// Run the command from `dir`; relative `ready_path`s resolve against it.
    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Arguments for one attempt: `{payload}` is substituted wherever it
    /// appears, otherwise the payload is appended.
    pub fn args_for(&self, payload: &str) -> Vec<String> {
        if self.args.iter().any(|a| a.contains(PAYLOAD_PLACEHOLDER)) {
            self.args
                .iter()
                .map(|a| a.replace(PAYLOAD_PLACEHOLDER, payload))
                .collect()
        } else {
            let mut args = self.args.clone();
            args.push(payload.to_string());
            args
        }
    }

    fn ready_path(&self) -> Option<PathBuf> {
        let path = self.ready_path.as_ref()?;
        Some(match &self.workdir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.clone(),
        })
    }

    fn command(&self, payload: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args_for(payload))
            .env("PACER_PAYLOAD", payload)
            .env("PACER_TYPING_MIN_MS", self.typing_min_ms.to_string())
            .env("PACER_TYPING_MAX_MS", self.typing_max_ms.to_string());
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }
        cmd
    }

    async fn run(&self, payload: String) -> AttemptOutcome {
        if let Some(path) = self.ready_path() {
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return AttemptOutcome::NotReady(format!("{} does not exist", path.display()));
            }
        }

        let process = match ActionProcess::spawn(self.command(&payload), &self.program) {
            Ok(p) => p,
            Err(e) => return AttemptOutcome::Failed(e.to_string()),
        };
        match process.wait(self.timeout).await {
            Ok(report) => self.classify(report),
            Err(e) => AttemptOutcome::Failed(e.to_string()),
        }
    }

    fn classify(&self, report: ExitReport) -> AttemptOutcome {
        debug!(program = %self.program, code = ?report.code, "action command exited");
        match report.code {
            Some(0) => AttemptOutcome::Completed,
            Some(code) if code == self.not_ready_exit_code => AttemptOutcome::NotReady(
                non_empty(report.stderr).unwrap_or_else(|| format!("exit code {code}")),
            ),
            Some(code) => AttemptOutcome::Failed(match non_empty(report.stderr) {
                Some(stderr) => format!("exited with code {code}\nstderr: {stderr}"),
                None => format!("exited with code {code}"),
            }),
            None => AttemptOutcome::Failed("terminated by signal".to_string()),
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl ActionExecutor for CommandExecutor {
    fn attempt(&self, payload: String) -> BoxFuture<'static, AttemptOutcome> {
        let this = self.clone();
        Box::pin(async move { this.run(payload).await })
    }
}

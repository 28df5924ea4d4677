use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::{ExecError, Result};

/// How long to wait for the output readers after the child has exited.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

// ─── ActionProcess ──────────────────────────────────────────────────────────

/// A spawned action command.
///
/// stdout is forwarded to `debug!` line by line; stderr is collected in a
/// background task and returned with the exit status. The child is killed if
/// this value is dropped before it exits.
pub(crate) struct ActionProcess {
    child: Child,
    program: String,
    stderr: Option<JoinHandle<String>>,
    stdout: Option<JoinHandle<String>>,
}

/// Exit status plus whatever the child wrote to stderr.
#[derive(Debug)]
pub(crate) struct ExitReport {
    /// `None` when terminated by a signal.
    pub code: Option<i32>,
    pub stderr: String,
}

impl ActionProcess {
    pub(crate) fn spawn(mut cmd: Command, program: &str) -> Result<Self> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: program.to_string(),
            source,
        })?;

        let stderr = child.stderr.take().map(|s| tokio::spawn(collect_lines(s, None)));
        let stdout = child
            .stdout
            .take()
            .map(|s| tokio::spawn(collect_lines(s, Some(program.to_string()))));

        Ok(Self {
            child,
            program: program.to_string(),
            stderr,
            stdout,
        })
    }

    /// Wait for the child, killing it once `timeout` elapses.
    pub(crate) async fn wait(mut self, timeout: Option<Duration>) -> Result<ExitReport> {
        let status = match timeout {
            None => self.child.wait().await?,
            Some(limit) => match tokio::time::timeout(limit, self.child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    debug!(program = %self.program, ?limit, "killing timed-out action");
                    self.child.kill().await?;
                    return Err(ExecError::Timeout(limit));
                }
            },
        };

        if let Some(stdout) = self.stdout.take() {
            let _ = tokio::time::timeout(DRAIN_GRACE, stdout).await;
        }
        let stderr = match self.stderr.take() {
            Some(handle) => match tokio::time::timeout(DRAIN_GRACE, handle).await {
                Ok(Ok(text)) => text,
                _ => String::new(),
            },
            None => String::new(),
        };

        Ok(ExitReport {
            code: status.code(),
            stderr,
        })
    }
}

/// Read `reader` to EOF. With a `label`, lines are logged instead of kept.
async fn collect_lines<R>(reader: R, label: Option<String>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut buf = String::new();
    while let Ok(Some(line)) = lines.next_line().await {
        match &label {
            Some(program) => debug!(%program, "{line}"),
            None => {
                if !buf.is_empty() {
                    buf.push('\n');
                }
                buf.push_str(&line);
            }
        }
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn captures_exit_code_and_stderr() {
        let process = ActionProcess::spawn(sh("echo out; echo oops >&2; exit 3"), "sh").unwrap();
        let report = process.wait(None).await.unwrap();
        assert_eq!(report.code, Some(3));
        assert_eq!(report.stderr, "oops");
    }

    #[tokio::test]
    async fn timeout_kills_child() {
        let process = ActionProcess::spawn(sh("sleep 30"), "sh").unwrap();
        let err = process
            .wait(Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Timeout(_)));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let cmd = Command::new("pacer-definitely-not-a-program");
        let err = ActionProcess::spawn(cmd, "pacer-definitely-not-a-program")
            .err()
            .unwrap();
        assert!(matches!(err, ExecError::Spawn { .. }));
    }
}

//! Command execution.
//!
//! The engine never runs commands itself; it hands them to a
//! [`CommandExecutor`]. The default [`LocalExecutor`] spawns `sh -c` as a
//! tokio subprocess, enforces the configured timeout, and supports
//! cancellation by opaque request id. Timeouts are the executor's
//! responsibility; the engine enforces none.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::{Mutex, oneshot};

/// One execution request.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Opaque id; also the cancellation handle.
    pub id: String,
    pub command: String,
    pub cwd: PathBuf,
    pub timeout: Duration,
    pub env: HashMap<String, String>,
}

/// What happened when a command ran.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub killed: bool,
}

/// Executes commands on behalf of the approval gateway.
#[async_trait]
pub trait CommandExecutor: Send + Sync + 'static {
    /// Runs one command to completion (or timeout/kill).
    async fn execute(&self, request: ExecRequest) -> Result<ExecOutcome>;

    /// Requests cancellation of a running command by its id. Unknown ids are
    /// ignored.
    async fn cancel(&self, id: &str);
}

// ============================================================================
// Local subprocess executor
// ============================================================================

/// Runs commands as local `sh -c` subprocesses.
#[derive(Debug, Default)]
pub struct LocalExecutor {
    /// Request id -> cancel trigger for commands currently running.
    running: Arc<Mutex<HashMap<String, oneshot::Sender<()>>>>,
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommandExecutor for LocalExecutor {
    async fn execute(&self, request: ExecRequest) -> Result<ExecOutcome> {
        debug!(
            "executing command (id {}) in {}",
            request.id,
            request.cwd.display()
        );

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&request.command)
            .current_dir(&request.cwd)
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn command for request {}", request.id))?;

        let mut stdout_pipe = child.stdout.take().context("child has no stdout")?;
        let mut stderr_pipe = child.stderr.take().context("child has no stderr")?;
        let readers = tokio::spawn(async move {
            let mut stdout = String::new();
            let mut stderr = String::new();
            let _ = stdout_pipe.read_to_string(&mut stdout).await;
            let _ = stderr_pipe.read_to_string(&mut stderr).await;
            (stdout, stderr)
        });

        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        self.running
            .lock()
            .await
            .insert(request.id.clone(), cancel_tx);

        let mut timed_out = false;
        let mut killed = false;
        let status = tokio::select! {
            status = child.wait() => status,
            _ = &mut cancel_rx => {
                killed = true;
                if let Err(e) = child.start_kill() {
                    warn!("failed to kill command {}: {e}", request.id);
                }
                child.wait().await
            }
            _ = tokio::time::sleep(request.timeout) => {
                timed_out = true;
                if let Err(e) = child.start_kill() {
                    warn!("failed to kill timed-out command {}: {e}", request.id);
                }
                child.wait().await
            }
        };

        self.running.lock().await.remove(&request.id);

        let status = status.with_context(|| format!("failed to reap command {}", request.id))?;
        let (stdout, stderr) = readers.await.unwrap_or_default();

        Ok(ExecOutcome {
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr,
            timed_out,
            killed,
        })
    }

    async fn cancel(&self, id: &str) {
        if let Some(trigger) = self.running.lock().await.remove(id) {
            let _ = trigger.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(command: &str, timeout: Duration) -> ExecRequest {
        ExecRequest {
            id: "r1".to_string(),
            command: command.to_string(),
            cwd: PathBuf::from("."),
            timeout,
            env: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_captures_stdout_stderr_and_exit_code() {
        let executor = LocalExecutor::new();
        let outcome = executor
            .execute(request(
                "echo out; echo err >&2; exit 3",
                Duration::from_secs(5),
            ))
            .await
            .unwrap();

        assert_eq!(outcome.exit_code, 3);
        assert_eq!(outcome.stdout, "out\n");
        assert_eq!(outcome.stderr, "err\n");
        assert!(!outcome.timed_out);
        assert!(!outcome.killed);
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let executor = LocalExecutor::new();
        let outcome = executor
            .execute(ExecRequest {
                cwd: dir.path().to_path_buf(),
                ..request("pwd", Duration::from_secs(5))
            })
            .await
            .unwrap();

        let printed = outcome.stdout.trim();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(
            PathBuf::from(printed).canonicalize().unwrap(),
            expected
        );
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let executor = LocalExecutor::new();
        let outcome = executor
            .execute(request("sleep 10", Duration::from_millis(100)))
            .await
            .unwrap();

        assert!(outcome.timed_out);
        assert_ne!(outcome.exit_code, 0);
    }

    #[tokio::test]
    async fn test_cancel_kills_running_command() {
        let executor = Arc::new(LocalExecutor::new());
        let task = {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move {
                executor
                    .execute(request("sleep 10", Duration::from_secs(30)))
                    .await
            })
        };

        // Give the subprocess a moment to start.
        tokio::time::sleep(Duration::from_millis(200)).await;
        executor.cancel("r1").await;

        let outcome = task.await.unwrap().unwrap();
        assert!(outcome.killed);
        assert!(!outcome.timed_out);
    }
}

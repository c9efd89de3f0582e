//! Remote command execution -- the single I/O primitive every other subsystem
//! is built on.
//!
//! A command is an argv (never a shell string) that runs on a named host. The
//! transport (docker exec, local process, scripted replay) is chosen by the
//! [`RemoteExecutor`] implementation. Two modes are offered: a bounded blocking
//! [`RemoteExecutor::run`] that returns the full output, and a non-blocking
//! [`RemoteExecutor::spawn`] that returns a [`RemoteProcess`] handle whose
//! merged output can be streamed and which can be terminated.

pub mod docker;
pub mod local;
#[cfg(any(test, feature = "test-utils"))]
pub mod scripted;

use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Executor shared between the capture manager, probe runner and inventory.
pub type SharedExecutor = Arc<dyn RemoteExecutor>;

// ---------------------------------------------------------------------------
// RemoteCommand
// ---------------------------------------------------------------------------

/// A program plus its arguments, to be run on some host.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RemoteCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl RemoteCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str))
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let argv: Vec<&str> = self.argv().collect();
        write!(f, "{}", argv.join(" "))
    }
}

// ---------------------------------------------------------------------------
// Output and errors
// ---------------------------------------------------------------------------

/// Captured output of a completed command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr. Most probe tools split their report across
    /// both streams.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("host {host} unreachable: {detail}")]
    HostUnreachable { host: String, detail: String },

    #[error("`{command}` on {host} exited with code {code:?}")]
    NonZeroExit {
        host: String,
        command: String,
        code: Option<i32>,
        output: ExecOutput,
    },

    #[error("`{command}` on {host} timed out after {after:?}")]
    TimedOut {
        host: String,
        command: String,
        after: Duration,
    },

    #[error("failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl ExecError {
    /// Output of a command that ran to completion but failed, if any.
    pub fn output(&self) -> Option<&ExecOutput> {
        match self {
            ExecError::NonZeroExit { output, .. } => Some(output),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// RemoteExecutor
// ---------------------------------------------------------------------------

/// Runs commands on named hosts of the emulated network.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `command` on `host` to completion.
    ///
    /// Implementations must guarantee that the remote process is gone when
    /// `timeout` elapses; the call then fails with [`ExecError::TimedOut`].
    async fn run(
        &self,
        host: &str,
        command: &RemoteCommand,
        timeout: Duration,
    ) -> Result<ExecOutput, ExecError>;

    /// Launch `command` on `host` in the background.
    async fn spawn(&self, host: &str, command: &RemoteCommand) -> Result<RemoteProcess, ExecError>;
}

// ---------------------------------------------------------------------------
// RemoteProcess
// ---------------------------------------------------------------------------

/// Handle to a background command.
///
/// stdout and stderr are merged into one line channel. The child is killed if
/// the handle is dropped.
#[derive(Debug)]
pub struct RemoteProcess {
    host: String,
    command: String,
    child: Child,
    lines: Option<mpsc::UnboundedReceiver<String>>,
}

impl RemoteProcess {
    /// Wrap a spawned child whose stdout/stderr are piped.
    pub fn from_child(host: &str, command: String, mut child: Child) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx));
        }
        Self {
            host: host.to_string(),
            command,
            child,
            lines: Some(rx),
        }
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Take the merged output channel. It closes once the process has closed
    /// both of its output pipes. Only the first call returns `Some`.
    pub fn take_lines(&mut self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.lines.take()
    }

    /// True while the process has not exited.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Terminate the process: SIGTERM, wait up to `grace`, then SIGKILL.
    ///
    /// Returns the exit status when one could be collected.
    pub async fn terminate(&mut self, grace: Duration) -> Option<ExitStatus> {
        if let Ok(Some(status)) = self.child.try_wait() {
            return Some(status);
        }

        #[cfg(unix)]
        {
            if let Some(pid) = self.child.id() {
                // SAFETY: plain signal delivery to a pid we own.
                unsafe {
                    libc::kill(pid as i32, libc::SIGTERM);
                }
            }
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(host = %self.host, command = %self.command, exit_code = status.code(), "process exited after SIGTERM");
                Some(status)
            }
            Ok(Err(e)) => {
                warn!(host = %self.host, error = %e, "error waiting for process after SIGTERM");
                None
            }
            Err(_) => {
                warn!(host = %self.host, command = %self.command, "process ignored SIGTERM, sending SIGKILL");
                if let Err(e) = self.child.kill().await {
                    warn!(host = %self.host, error = %e, "failed to SIGKILL process");
                    return None;
                }
                self.child.try_wait().ok().flatten()
            }
        }
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).is_err() {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers shared by the process-backed executors
// ---------------------------------------------------------------------------

/// Run a prepared local command to completion within `timeout`.
pub(crate) async fn run_to_completion(
    host: &str,
    shown: String,
    mut cmd: Command,
    timeout: Duration,
) -> Result<ExecOutput, ExecError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(%host, command = %shown, ?timeout, "running command");

    let child = cmd.spawn().map_err(|source| ExecError::Spawn {
        command: shown.clone(),
        source,
    })?;

    // On timeout the future (and the child inside it) is dropped, which kills it.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(ExecError::Spawn {
                command: shown,
                source,
            })
        }
        Err(_) => {
            warn!(%host, command = %shown, ?timeout, "command timed out");
            return Err(ExecError::TimedOut {
                host: host.to_string(),
                command: shown,
                after: timeout,
            });
        }
    };

    let output = ExecOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    if output.success() {
        Ok(output)
    } else {
        Err(ExecError::NonZeroExit {
            host: host.to_string(),
            command: shown,
            code: output.code,
            output,
        })
    }
}

/// Spawn a prepared local command in the background with piped output.
pub(crate) fn spawn_background(
    host: &str,
    shown: String,
    mut cmd: Command,
) -> Result<RemoteProcess, ExecError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(%host, command = %shown, "spawning background command");

    let child = cmd.spawn().map_err(|source| ExecError::Spawn {
        command: shown.clone(),
        source,
    })?;
    Ok(RemoteProcess::from_child(host, shown, child))
}

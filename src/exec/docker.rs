//! `docker exec` transport: every emulated host is a container named after it.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{
    run_to_completion, spawn_background, ExecError, ExecOutput, RemoteCommand, RemoteExecutor,
    RemoteProcess,
};

/// Markers the docker CLI prints when the target container is absent or down.
const UNREACHABLE_MARKERS: [&str; 3] = [
    "No such container",
    "is not running",
    "Cannot connect to the Docker daemon",
];

/// Executes commands inside containers with `docker exec`.
pub struct DockerExecutor {
    docker: String,
    /// Extra time granted to the remote `timeout` before it sends SIGKILL.
    kill_after: Duration,
}

impl DockerExecutor {
    pub fn new(docker: impl Into<String>, kill_after: Duration) -> Self {
        Self {
            docker: docker.into(),
            kill_after,
        }
    }

    /// `docker exec <host> timeout -k <grace> <secs> <argv..>`
    ///
    /// The remote `timeout` bounds the process inside the container, so it
    /// dies even when the local docker client is killed first.
    fn bounded_command(&self, host: &str, command: &RemoteCommand, timeout: Duration) -> Command {
        let mut cmd = Command::new(&self.docker);
        cmd.arg("exec")
            .arg(host)
            .arg("timeout")
            .arg("-k")
            .arg(secs_arg(self.kill_after))
            .arg(secs_arg(timeout))
            .args(command.argv());
        cmd
    }

    fn background_command(&self, host: &str, command: &RemoteCommand) -> Command {
        let mut cmd = Command::new(&self.docker);
        cmd.arg("exec").arg(host).args(command.argv());
        cmd
    }
}

impl Default for DockerExecutor {
    fn default() -> Self {
        Self::new("docker", Duration::from_secs(2))
    }
}

#[async_trait]
impl RemoteExecutor for DockerExecutor {
    async fn run(
        &self,
        host: &str,
        command: &RemoteCommand,
        timeout: Duration,
    ) -> Result<ExecOutput, ExecError> {
        let cmd = self.bounded_command(host, command, timeout);
        // Local bound slightly above the remote one so the remote side fires first.
        let local_timeout = timeout + self.kill_after + Duration::from_secs(1);
        run_to_completion(host, command.to_string(), cmd, local_timeout)
            .await
            .map_err(|e| classify(host, timeout, e))
    }

    async fn spawn(&self, host: &str, command: &RemoteCommand) -> Result<RemoteProcess, ExecError> {
        let cmd = self.background_command(host, command);
        spawn_background(host, command.to_string(), cmd)
    }
}

fn secs_arg(d: Duration) -> String {
    format!("{}", d.as_secs().max(1))
}

/// Turn docker's own failures into `HostUnreachable`; leave the command's
/// failures alone. Remote `timeout` exits with 124 (or 137 after -k).
fn classify(host: &str, timeout: Duration, err: ExecError) -> ExecError {
    match err {
        ExecError::NonZeroExit {
            host: h,
            command,
            code,
            output,
        } => {
            if let Some(marker) = UNREACHABLE_MARKERS
                .iter()
                .find(|m| output.stderr.contains(*m))
            {
                return ExecError::HostUnreachable {
                    host: host.to_string(),
                    detail: format!("{} ({})", marker, output.stderr.trim()),
                };
            }
            if matches!(code, Some(124) | Some(137)) {
                return ExecError::TimedOut {
                    host: h,
                    command,
                    after: timeout,
                };
            }
            ExecError::NonZeroExit {
                host: h,
                command,
                code,
                output,
            }
        }
        other => other,
    }
}

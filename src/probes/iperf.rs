//! iperf3 server lifecycle and client probe.

use std::net::Ipv4Addr;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::{Probe, ProbeKind, ProbeTarget};
use crate::capture::self_excluding_pattern;
use crate::config::ProbeConfig;
use crate::exec::{ExecError, RemoteCommand, RemoteProcess, SharedExecutor};

#[derive(Debug, Error)]
pub enum IperfError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("iperf3 server on {host} exited during startup: {}", .output.join(" | "))]
    ServerExited { host: String, output: Vec<String> },
}

/// Throughput server on one host.
///
/// Every run begins with [`restart`](Self::restart) so a stale listener from
/// an earlier run can never answer the client.
pub struct IperfServer {
    executor: SharedExecutor,
    host: String,
    iperf_path: String,
    settle: Duration,
    command_timeout: Duration,
    process: Option<RemoteProcess>,
}

impl IperfServer {
    pub(crate) fn new(
        executor: SharedExecutor,
        host: &str,
        iperf_path: &str,
        settle: Duration,
        command_timeout: Duration,
    ) -> Self {
        Self {
            executor,
            host: host.to_string(),
            iperf_path: iperf_path.to_string(),
            settle,
            command_timeout,
            process: None,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    #[cfg(test)]
    fn is_running(&mut self) -> bool {
        self.process.as_mut().is_some_and(|p| p.is_alive())
    }

    fn serve_command(&self) -> RemoteCommand {
        RemoteCommand::new(&self.iperf_path).arg("-s")
    }

    fn kill_command(&self) -> RemoteCommand {
        RemoteCommand::new("pkill").args([
            "-INT".to_string(),
            "-f".to_string(),
            self_excluding_pattern(&self.iperf_path, "-s"),
        ])
    }

    /// Kill any server on the host. pkill exits 1 when nothing matched,
    /// which is not an error; any other failure is.
    async fn kill_remote(&self) -> Result<(), ExecError> {
        match self
            .executor
            .run(&self.host, &self.kill_command(), self.command_timeout)
            .await
        {
            Ok(_) => Ok(()),
            Err(ExecError::NonZeroExit { code: Some(1), .. }) => {
                debug!(host = %self.host, "no iperf3 server to kill");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Kill whatever is listening, start a fresh server and wait for it to
    /// settle.
    pub async fn restart(&mut self) -> Result<(), IperfError> {
        if let Some(mut old) = self.process.take() {
            old.terminate(self.settle).await;
        }
        self.kill_remote().await?;

        let mut process = self.executor.spawn(&self.host, &self.serve_command()).await?;
        tokio::time::sleep(self.settle).await;

        if !process.is_alive() {
            let output = drain_output(&mut process).await;
            return Err(IperfError::ServerExited {
                host: self.host.clone(),
                output,
            });
        }

        info!(host = %self.host, pid = ?process.id(), "iperf3 server started");
        self.process = Some(process);
        Ok(())
    }

    /// Stop the server. Safe to call when nothing is running.
    pub async fn stop(&mut self) {
        if let Err(e) = self.kill_remote().await {
            warn!(host = %self.host, error = %e, "failed to stop iperf3 server");
        }
        if let Some(mut process) = self.process.take() {
            process.terminate(self.settle).await;
            info!(host = %self.host, "iperf3 server stopped");
        }
    }
}

async fn drain_output(process: &mut RemoteProcess) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(mut rx) = process.take_lines() {
        while let Ok(Some(line)) = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
            out.push(line);
        }
    }
    out
}

/// `iperf3 -c <server> -B <bind> -t <secs>`
#[derive(Debug, Clone)]
pub struct IperfClient {
    iperf_path: String,
    bind: Ipv4Addr,
    duration_secs: u64,
    timeout: Duration,
}

impl IperfClient {
    pub fn new(config: &ProbeConfig, bind: Ipv4Addr) -> Self {
        Self {
            iperf_path: config.iperf_path.clone(),
            bind,
            duration_secs: config.iperf_duration_secs,
            timeout: config.iperf_timeout(),
        }
    }
}

impl Probe for IperfClient {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Bandwidth
    }

    fn command(&self, target: &ProbeTarget) -> RemoteCommand {
        RemoteCommand::new(&self.iperf_path)
            .args(["-c", target.destination.as_str()])
            .args(["-B".to_string(), self.bind.to_string()])
            .args(["-t".to_string(), self.duration_secs.to_string()])
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

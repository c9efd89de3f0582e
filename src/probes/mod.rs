//! Active probes run from a component toward a destination.
//!
//! Probes only produce raw tool output. Interpretation belongs to
//! [`crate::correlate`].

pub mod icmp;
pub mod iperf;
pub mod trace;

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ProbeConfig;
use crate::exec::{ExecError, RemoteCommand, SharedExecutor};

pub use icmp::PingProbe;
pub use iperf::{IperfClient, IperfError, IperfServer};
pub use trace::TracerouteProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    Reachability,
    Bandwidth,
    Routing,
    Path,
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeKind::Reachability => write!(f, "reachability"),
            ProbeKind::Bandwidth => write!(f, "bandwidth"),
            ProbeKind::Routing => write!(f, "routing"),
            ProbeKind::Path => write!(f, "path"),
        }
    }
}

/// Where a probe is sent from and where to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeTarget {
    pub host: String,
    pub interface: String,
    pub destination: String,
}

impl ProbeTarget {
    pub fn new(host: &str, interface: &str, destination: impl ToString) -> Self {
        Self {
            host: host.to_string(),
            interface: interface.to_string(),
            destination: destination.to_string(),
        }
    }
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}] -> {}", self.host, self.interface, self.destination)
    }
}

/// Text a probe tool printed, plus its exit code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawOutput {
    pub exit_code: Option<i32>,
    pub text: String,
}

/// One probe execution.
#[derive(Debug)]
pub struct ProbeResult {
    pub kind: ProbeKind,
    pub target: ProbeTarget,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// `Err` only when the tool could not be run to completion; a tool that
    /// ran and reported failure through its exit code is still `Ok`.
    pub raw: Result<RawOutput, ExecError>,
}

impl ProbeResult {
    pub fn text(&self) -> Option<&str> {
        self.raw.as_ref().ok().map(|r| r.text.as_str())
    }
}

/// A command-line probe tool.
pub trait Probe: Send + Sync {
    fn kind(&self) -> ProbeKind;

    fn command(&self, target: &ProbeTarget) -> RemoteCommand;

    /// Upper bound for one run.
    fn timeout(&self) -> Duration;
}

/// Runs probes through a remote executor.
#[derive(Clone)]
pub struct ProbeRunner {
    executor: SharedExecutor,
    config: ProbeConfig,
    settle: Duration,
}

impl ProbeRunner {
    pub fn new(executor: SharedExecutor, config: ProbeConfig, settle: Duration) -> Self {
        Self {
            executor,
            config,
            settle,
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Run `probe` from `target.host`.
    pub async fn run(&self, probe: &dyn Probe, target: &ProbeTarget) -> ProbeResult {
        let command = probe.command(target);
        let started_at = Utc::now();
        let clock = Instant::now();

        debug!(kind = %probe.kind(), %target, %command, "probe start");
        let raw = match self.executor.run(&target.host, &command, probe.timeout()).await {
            Ok(out) => Ok(RawOutput {
                exit_code: out.code,
                text: out.combined(),
            }),
            // ping exits 1 on loss and 2 on errors; the text still says why.
            Err(ExecError::NonZeroExit { output, .. }) => Ok(RawOutput {
                exit_code: output.code,
                text: output.combined(),
            }),
            Err(e) => {
                warn!(kind = %probe.kind(), %target, error = %e, "probe could not run");
                Err(e)
            }
        };

        ProbeResult {
            kind: probe.kind(),
            target: target.clone(),
            started_at,
            elapsed: clock.elapsed(),
            raw,
        }
    }

    /// `ping -c <count> -n -I <iface> <dest>` from `host`.
    pub async fn ping(&self, host: &str, interface: &str, destination: &str, count: u32) -> ProbeResult {
        let probe = PingProbe::new(count, self.config.ping_timeout());
        self.run(&probe, &ProbeTarget::new(host, interface, destination))
            .await
    }

    /// Same as [`ping`](Self::ping), recorded as a routing probe.
    pub async fn routing_ping(&self, host: &str, interface: &str, destination: &str) -> ProbeResult {
        let probe = PingProbe::new(self.config.ping_count, self.config.ping_timeout())
            .as_kind(ProbeKind::Routing);
        self.run(&probe, &ProbeTarget::new(host, interface, destination))
            .await
    }

    /// Run one throughput client from `client_host` against a server that
    /// the caller has just restarted.
    pub async fn bandwidth_test(
        &self,
        client_host: &str,
        client_interface: &str,
        client_address: std::net::Ipv4Addr,
        server: &IperfServer,
        server_address: std::net::Ipv4Addr,
    ) -> ProbeResult {
        let client = IperfClient::new(&self.config, client_address);
        debug!(server = %server.host(), "bandwidth client start");
        self.run(
            &client,
            &ProbeTarget::new(client_host, client_interface, server_address),
        )
        .await
    }

    /// `traceroute -n -i <iface> <dest>` from `host`.
    pub async fn traceroute(&self, host: &str, interface: &str, destination: &str) -> ProbeResult {
        let probe = TracerouteProbe::new(self.config.command_timeout());
        self.run(&probe, &ProbeTarget::new(host, interface, destination))
            .await
    }

    /// A throughput server handle for `host`, not yet started.
    pub fn iperf_server(&self, host: &str) -> IperfServer {
        IperfServer::new(
            self.executor.clone(),
            host,
            &self.config.iperf_path,
            self.settle,
            self.config.command_timeout(),
        )
    }
}

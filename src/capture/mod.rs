//! Capture session manager: time-bounded background packet captures on remote
//! hosts.
//!
//! A session moves `Idle -> Running -> {Stopped, Expired}`. [`CaptureManager::start`]
//! only returns once the capture process has survived the settle delay, so a
//! probe issued afterwards is observed. The settle delay is a fixed sleep, not
//! a handshake with the capture tool.

pub mod session;
pub mod stream;

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::CaptureConfig;
use crate::exec::{ExecError, RemoteCommand, SharedExecutor};

pub use session::{CaptureOutput, CaptureSession};
pub use stream::{CaptureStream, LineFilter, StreamTally};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("capture on {host}/{interface} exited during settle: {}", .output.join(" | "))]
    NotAlive {
        host: String,
        interface: String,
        output: Vec<String>,
    },
}

/// Lifecycle state of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
    /// Ended by request, or the process went away before its deadline.
    Stopped,
    /// Ended by reaching its deadline.
    Expired,
}

impl SessionState {
    pub fn is_ended(self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Expired)
    }

    /// Legal transitions of the state machine.
    pub fn can_become(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Idle, SessionState::Running)
                | (SessionState::Idle, SessionState::Stopped)
                | (SessionState::Running, SessionState::Stopped)
                | (SessionState::Running, SessionState::Expired)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Stopped => "stopped",
            SessionState::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

/// Capture window class. Access-hop bursts are brief; core-hop windows must
/// outlast probe setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutClass {
    Access,
    Core,
}

impl TimeoutClass {
    pub fn window(self, config: &CaptureConfig) -> Duration {
        match self {
            TimeoutClass::Access => Duration::from_secs(config.access_timeout_secs),
            TimeoutClass::Core => Duration::from_secs(config.core_timeout_secs),
        }
    }
}

/// Starts capture sessions.
#[derive(Clone)]
pub struct CaptureManager {
    executor: SharedExecutor,
    config: CaptureConfig,
    command_timeout: Duration,
}

impl CaptureManager {
    pub fn new(executor: SharedExecutor, config: CaptureConfig, command_timeout: Duration) -> Self {
        Self {
            executor,
            config,
            command_timeout,
        }
    }

    /// `timeout <window> tcpdump -i <iface> -n -l`
    pub fn capture_command(&self, interface: &str, window: Duration) -> RemoteCommand {
        RemoteCommand::new("timeout")
            .arg(window.as_secs().max(1).to_string())
            .arg(&self.config.tcpdump_path)
            .args(["-i", interface, "-n", "-l"])
    }

    /// Launch a capture on `host`/`interface`, wait the settle delay and
    /// confirm it is still running.
    ///
    /// Two captures on the same interface of the same host must not overlap;
    /// that is the caller's job.
    pub async fn start(
        &self,
        host: &str,
        interface: &str,
        class: TimeoutClass,
    ) -> Result<CaptureSession, CaptureError> {
        let window = class.window(&self.config);
        let command = self.capture_command(interface, window);
        let process = self.executor.spawn(host, &command).await?;

        let session = CaptureSession::launch(
            session::LaunchParams {
                host: host.to_string(),
                interface: interface.to_string(),
                window,
                stop_grace: self.config.stop_grace(),
                drain_timeout: self.config.drain_timeout(),
                interrupt: self.interrupt_command(interface),
                command_timeout: self.command_timeout,
            },
            self.executor.clone(),
            process,
        );

        tokio::time::sleep(self.config.settle_delay()).await;

        if session.state() != SessionState::Running {
            let output = session.finish().await.lines;
            return Err(CaptureError::NotAlive {
                host: host.to_string(),
                interface: interface.to_string(),
                output,
            });
        }

        info!(
            session = %session.id(),
            %host,
            %interface,
            ?class,
            window_secs = window.as_secs(),
            "capture running"
        );
        Ok(session)
    }

    /// Remote graceful stop for the capture on `interface`.
    fn interrupt_command(&self, interface: &str) -> RemoteCommand {
        RemoteCommand::new("pkill").args([
            "-INT".to_string(),
            "-f".to_string(),
            self_excluding_pattern(&self.config.tcpdump_path, &format!("-i {}", interface)),
        ])
    }
}

/// `pkill -f` pattern for `<tool> <args>` that does not match its own command
/// line (or a `timeout` wrapper around it): `[t]cpdump -i ogstun( |$)`.
/// The result is an extended regex; `args` is inserted as is.
pub fn self_excluding_pattern(tool: &str, args: &str) -> String {
    let name = std::path::Path::new(tool)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(tool);
    let mut chars = name.chars();
    let head = chars.next().map(|c| format!("[{}]", c)).unwrap_or_default();
    let tail: String = chars.collect();
    format!("{}{} {}( |$)", head, tail, args)
}

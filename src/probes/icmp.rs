use std::time::Duration;

use super::{Probe, ProbeKind, ProbeTarget};
use crate::exec::RemoteCommand;

/// System `ping` bound to a source interface, fixed packet count.
#[derive(Debug, Clone)]
pub struct PingProbe {
    count: u32,
    timeout: Duration,
    kind: ProbeKind,
}

impl PingProbe {
    pub fn new(count: u32, timeout: Duration) -> Self {
        Self {
            count: count.max(1),
            timeout,
            kind: ProbeKind::Reachability,
        }
    }

    /// Record the run under another probe kind.
    pub fn as_kind(mut self, kind: ProbeKind) -> Self {
        self.kind = kind;
        self
    }
}

impl Probe for PingProbe {
    fn kind(&self) -> ProbeKind {
        self.kind
    }

    fn command(&self, target: &ProbeTarget) -> RemoteCommand {
        // -n: no reverse lookups, -I: bind to the tunnel interface
        RemoteCommand::new("ping")
            .arg("-c")
            .arg(self.count.to_string())
            .args(["-n", "-I", target.interface.as_str(), target.destination.as_str()])
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

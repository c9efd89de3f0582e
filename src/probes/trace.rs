use std::time::Duration;

use super::{Probe, ProbeKind, ProbeTarget};
use crate::exec::RemoteCommand;

/// `traceroute -n -i <iface> <dest>`. Evidence only; never decides a verdict.
#[derive(Debug, Clone)]
pub struct TracerouteProbe {
    timeout: Duration,
}

impl TracerouteProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Probe for TracerouteProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Path
    }

    fn command(&self, target: &ProbeTarget) -> RemoteCommand {
        RemoteCommand::new("traceroute").args([
            "-n",
            "-i",
            target.interface.as_str(),
            target.destination.as_str(),
        ])
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

//! Verification routines over a discovered topology.
//!
//! Each routine yields one row per attempted item. A failing item gets a
//! failure marker in its row and the routine moves on.

pub mod bandwidth;
pub mod details;
pub mod latency;
pub mod routing;

use std::fmt;

use serde::Serialize;

use crate::capture::CaptureManager;
use crate::config::Config;
use crate::exec::SharedExecutor;
use crate::probes::ProbeRunner;
use crate::report::{render_json, render_table};
use crate::topology::Topology;

pub use bandwidth::BandwidthRow;
pub use details::DetailRow;
pub use latency::LatencyRow;
pub use routing::RoutingRow;

/// The selectable checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    Details,
    Latency,
    Bandwidth,
    Routing,
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Check::Details => "details",
            Check::Latency => "latency",
            Check::Bandwidth => "bandwidth",
            Check::Routing => "routing",
        };
        write!(f, "{}", s)
    }
}

/// Rows produced by one check.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "check", content = "rows", rename_all = "snake_case")]
pub enum Rows {
    Details(Vec<DetailRow>),
    Latency(Vec<LatencyRow>),
    Bandwidth(Vec<BandwidthRow>),
    Routing(Vec<RoutingRow>),
}

impl Rows {
    pub fn len(&self) -> usize {
        match self {
            Rows::Details(r) => r.len(),
            Rows::Latency(r) => r.len(),
            Rows::Bandwidth(r) => r.len(),
            Rows::Routing(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn table(&self) -> String {
        match self {
            Rows::Details(r) => render_table(r),
            Rows::Latency(r) => render_table(r),
            Rows::Bandwidth(r) => render_table(r),
            Rows::Routing(r) => render_table(r),
        }
    }

    /// `{"check": ..., "rows": [...]}`.
    pub fn json(&self) -> anyhow::Result<String> {
        render_json(self)
    }
}

/// Drives probes and captures against one topology with one configuration.
#[derive(Clone)]
pub struct Verifier {
    config: Config,
    probes: ProbeRunner,
    captures: CaptureManager,
}

impl Verifier {
    pub fn new(executor: SharedExecutor, config: Config) -> Self {
        let probes = ProbeRunner::new(
            executor.clone(),
            config.probes.clone(),
            config.capture.settle_delay(),
        );
        let captures = CaptureManager::new(
            executor,
            config.capture.clone(),
            config.probes.command_timeout(),
        );
        Self {
            config,
            probes,
            captures,
        }
    }

    pub async fn run(&self, check: Check, topology: &Topology) -> Rows {
        match check {
            Check::Details => Rows::Details(self.details(topology)),
            Check::Latency => Rows::Latency(self.latency(topology).await),
            Check::Bandwidth => Rows::Bandwidth(self.bandwidth(topology).await),
            Check::Routing => Rows::Routing(self.routing(topology).await),
        }
    }
}

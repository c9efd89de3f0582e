use serde::Serialize;
use tracing::{info, warn};

use super::Verifier;
use crate::correlate::BandwidthOutcome;
use crate::report::TableRow;
use crate::topology::{Slice, Topology};

#[derive(Debug, Clone, Serialize)]
pub struct BandwidthRow {
    pub server: String,
    pub host: String,
    pub interface: String,
    pub outcome: BandwidthOutcome,
}

impl TableRow for BandwidthRow {
    fn headers() -> &'static [&'static str] {
        &["Server", "Host", "H->S (Mbits/sec)", "S->H (Mbits/sec)"]
    }

    fn cells(&self) -> Vec<String> {
        let (up, down) = match &self.outcome {
            BandwidthOutcome::Figures { bitrates } => (
                bitrates.first().map(|b| b.mbits_label()).unwrap_or_default(),
                bitrates.get(1).map(|b| b.mbits_label()).unwrap_or_default(),
            ),
            BandwidthOutcome::NoFigures { detail } => (
                "no figures".to_string(),
                detail.clone().unwrap_or_default(),
            ),
            BandwidthOutcome::ExecFailed { reason } => ("Exec failed".to_string(), reason.clone()),
        };
        vec![self.server.clone(), self.host.clone(), up, down]
    }
}

impl Verifier {
    /// For each user-plane function (edge, then cloud), measure throughput
    /// from every UE. The server is restarted before every client run and
    /// stopped after it; a UE without the slice's tunnel gets a failure row.
    pub async fn bandwidth(&self, topology: &Topology) -> Vec<BandwidthRow> {
        let naming = &self.config.naming;
        let mut rows = Vec::new();

        for slice in [Slice::Edge, Slice::Cloud] {
            let upf = topology.user_plane(slice);
            let interface = naming.tunnel_for(slice);
            let mut server = self.probes.iperf_server(&upf.name);

            for ue in &topology.ues {
                if let Some(problem) = &ue.host.problem {
                    rows.push(BandwidthRow {
                        server: upf.name.clone(),
                        host: ue.name().to_string(),
                        interface: interface.to_string(),
                        outcome: BandwidthOutcome::ExecFailed {
                            reason: problem.clone(),
                        },
                    });
                    continue;
                }
                let Some(tunnel) = ue.tunnel(naming, slice) else {
                    warn!(ue = %ue.name(), %slice, "UE has no tunnel for slice");
                    rows.push(BandwidthRow {
                        server: upf.name.clone(),
                        host: ue.name().to_string(),
                        interface: interface.to_string(),
                        outcome: BandwidthOutcome::ExecFailed {
                            reason: format!("no {}", interface),
                        },
                    });
                    continue;
                };

                let outcome = match server.restart().await {
                    Ok(()) => {
                        let result = self
                            .probes
                            .bandwidth_test(ue.name(), interface, tunnel.address, &server, upf.address)
                            .await;
                        BandwidthOutcome::evaluate(&result)
                    }
                    Err(e) => {
                        warn!(server = %upf.name, error = %e, "iperf3 server did not start");
                        BandwidthOutcome::ExecFailed {
                            reason: format!("server: {}", e),
                        }
                    }
                };
                server.stop().await;

                info!(server = %upf.name, ue = %ue.name(), passed = outcome.passed(), "bandwidth");
                rows.push(BandwidthRow {
                    server: upf.name.clone(),
                    host: ue.name().to_string(),
                    interface: interface.to_string(),
                    outcome,
                });
            }
        }
        rows
    }
}

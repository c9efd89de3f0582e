use serde::Serialize;
use tracing::{info, warn};

use super::Verifier;
use crate::correlate::Reachability;
use crate::report::TableRow;
use crate::topology::{Slice, Topology};

#[derive(Debug, Clone, Serialize)]
pub struct LatencyRow {
    pub ue: String,
    pub interface: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slice: Option<Slice>,
    pub to: String,
    pub result: Reachability,
}

impl TableRow for LatencyRow {
    fn headers() -> &'static [&'static str] {
        &["From", "To", "Result"]
    }

    fn cells(&self) -> Vec<String> {
        let result = match &self.result {
            Reachability::ExecFailed { reason } => format!("{}: {}", self.result, reason),
            other => other.to_string(),
        };
        vec![
            format!("{}[{}]", self.ue, self.interface),
            self.to.clone(),
            result,
        ]
    }
}

impl Verifier {
    /// Ping each slice's user-plane function from each UE tunnel. A UE
    /// without the slice's tunnel gets a `Not Found` row.
    pub async fn latency(&self, topology: &Topology) -> Vec<LatencyRow> {
        let naming = &self.config.naming;
        let count = self.config.probes.ping_count;
        let mut rows = Vec::new();

        for ue in &topology.ues {
            if let Some(problem) = &ue.host.problem {
                warn!(ue = %ue.name(), %problem, "skipping latency for undiscovered UE");
                rows.push(LatencyRow {
                    ue: ue.name().to_string(),
                    interface: "-".to_string(),
                    slice: None,
                    to: "-".to_string(),
                    result: Reachability::ExecFailed {
                        reason: problem.clone(),
                    },
                });
                continue;
            }

            for slice in Slice::ALL {
                let upf = topology.user_plane(slice);
                let Some(tunnel) = ue.tunnel(naming, slice) else {
                    warn!(ue = %ue.name(), %slice, "UE has no tunnel for slice");
                    rows.push(LatencyRow {
                        ue: ue.name().to_string(),
                        interface: naming.tunnel_for(slice).to_string(),
                        slice: Some(slice),
                        to: upf.name.clone(),
                        result: Reachability::NotFound,
                    });
                    continue;
                };

                let result = self
                    .probes
                    .ping(ue.name(), tunnel.interface, &upf.address.to_string(), count)
                    .await;
                let verdict = Reachability::evaluate(&result);
                info!(
                    ue = %ue.name(),
                    interface = %tunnel.interface,
                    upf = %upf.name,
                    result = %verdict,
                    "latency"
                );
                rows.push(LatencyRow {
                    ue: ue.name().to_string(),
                    interface: tunnel.interface.to_string(),
                    slice: Some(slice),
                    to: upf.name.clone(),
                    result: verdict,
                });
            }
        }
        rows
    }
}

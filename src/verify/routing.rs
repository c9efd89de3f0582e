use serde::Serialize;
use tracing::{info, warn};

use super::Verifier;
use crate::capture::{CaptureError, CaptureSession, LineFilter, TimeoutClass};
use crate::correlate::trace::parse_hops;
use crate::correlate::{HopReport, PacketCounts, Reachability, RoutingVerdict};
use crate::report::TableRow;
use crate::topology::{Slice, Topology, Tunnel, Ue};

/// A routing verdict, or why none could be produced for a UE.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RoutingRow {
    Verdict(RoutingVerdict),
    Skipped { ue: String, reason: String },
}

impl TableRow for RoutingRow {
    fn headers() -> &'static [&'static str] {
        &["Routing", "Result"]
    }

    fn cells(&self) -> Vec<String> {
        match self {
            RoutingRow::Verdict(v) => vec![v.route(), v.summary()],
            RoutingRow::Skipped { ue, reason } => vec![ue.clone(), format!("SKIPPED ({})", reason)],
        }
    }
}

impl Verifier {
    /// Check the path of every UE slice: capture on the UE's radio node and on
    /// the slice's user-plane function while the UE pings the slice's
    /// destination.
    ///
    /// A UE's slices are checked one after the other since they share the
    /// radio node's access interface. A slice the UE does not hold gets a
    /// skipped row.
    pub async fn routing(&self, topology: &Topology) -> Vec<RoutingRow> {
        let naming = &self.config.naming;
        let mut rows = Vec::new();

        for ue in &topology.ues {
            if let Some(problem) = &ue.host.problem {
                rows.push(RoutingRow::Skipped {
                    ue: ue.name().to_string(),
                    reason: problem.clone(),
                });
                continue;
            }

            let Some(radio_node) = topology.radio_node_of(ue) else {
                rows.push(RoutingRow::Skipped {
                    ue: ue.name().to_string(),
                    reason: "no radio nodes".to_string(),
                });
                continue;
            };
            info!(ue = %ue.name(), radio_node = %radio_node.name(), "checking routing");

            for slice in Slice::ALL {
                let Some(tunnel) = ue.tunnel(naming, slice) else {
                    warn!(ue = %ue.name(), %slice, "UE has no tunnel for slice");
                    rows.push(RoutingRow::Skipped {
                        ue: ue.name().to_string(),
                        reason: format!("no {}", naming.tunnel_for(slice)),
                    });
                    continue;
                };

                let verdict = self
                    .route_one(topology, ue, &tunnel, radio_node.name())
                    .await;
                info!(
                    route = %verdict.route(),
                    passed = verdict.passed(),
                    access = %verdict.access,
                    core = %verdict.core,
                    "routing verdict"
                );
                rows.push(RoutingRow::Verdict(verdict));
            }
        }
        rows
    }

    async fn route_one(
        &self,
        topology: &Topology,
        ue: &Ue,
        tunnel: &Tunnel<'_>,
        radio_node: &str,
    ) -> RoutingVerdict {
        let naming = &self.config.naming;
        let upf = topology.user_plane(tunnel.slice);
        let (destination, label) = match tunnel.slice {
            Slice::Cloud => (
                self.config.probes.cloud_destination.clone(),
                self.config.probes.cloud_destination.clone(),
            ),
            Slice::Edge => (
                topology.edge_server.address.to_string(),
                topology.edge_server.name.clone(),
            ),
        };

        let access_interface = naming.access_interface(radio_node);
        let core_interface = naming.core_capture_interface.as_str();

        // Both captures settle concurrently; the probe only goes out after.
        let (access, core) = tokio::join!(
            self.captures
                .start(radio_node, &access_interface, TimeoutClass::Access),
            self.captures
                .start(&upf.name, core_interface, TimeoutClass::Core),
        );

        let probe = self
            .probes
            .routing_ping(ue.name(), tunnel.interface, &destination)
            .await;

        // The access link carries the tunnel encapsulated, so its packets
        // show the UE's radio-side address, not the tunnel address.
        let filter = ue
            .host
            .primary
            .map(|address| LineFilter::address_and_protocol(address, &self.config.capture.protocol_token));
        let (access, core) = tokio::join!(
            hop_report(access, radio_node, &access_interface, filter),
            hop_report(core, &upf.name, core_interface, None),
        );

        let path = if self.config.probes.traceroute {
            let trace = self
                .probes
                .traceroute(ue.name(), tunnel.interface, &destination)
                .await;
            trace.text().map(parse_hops)
        } else {
            None
        };

        let probe = Reachability::evaluate(&probe);
        RoutingVerdict {
            ue: ue.name().to_string(),
            slice: tunnel.slice,
            interface: tunnel.interface.to_string(),
            radio_node: radio_node.to_string(),
            user_plane: upf.name.clone(),
            destination: label,
            packets: PacketCounts::of(&core, &probe),
            access,
            core,
            probe,
            path,
        }
    }
}

/// Wait for a capture's window to close and read its counts.
async fn hop_report(
    started: Result<CaptureSession, CaptureError>,
    host: &str,
    interface: &str,
    filter: Option<LineFilter>,
) -> HopReport {
    let mut session = match started {
        Ok(session) => session,
        Err(e) => {
            warn!(%host, %interface, error = %e, "capture did not start");
            return HopReport::failed(host, interface, e);
        }
    };

    let filtered = filter.is_some();
    let stream = session.read_stream(filter);
    let (output, (_, tally)) = tokio::join!(session.finish(), stream.collect_matching());
    HopReport::from_capture(&output, filtered.then_some(tally.matched))
}

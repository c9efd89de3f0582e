//! In-memory model of the emulated network, built once per run from live
//! introspection and immutable afterwards.

use std::fmt;
use std::net::Ipv4Addr;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::NamingConfig;
use crate::exec::ExecError;
use crate::inventory::{Discovery, InterfaceMap, Inventory};

/// UEs served by one radio node in the reference testbed.
pub const UES_PER_RADIO_NODE: usize = 3;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("mandatory component {name} has no primary address")]
    MissingComponent { name: String },

    #[error("failed to discover mandatory component {host}: {source}")]
    Discovery {
        host: String,
        #[source]
        source: ExecError,
    },

    #[error("topology needs at least one radio node for {ue_count} UEs")]
    NoRadioNodes { ue_count: usize },
}

// ---------------------------------------------------------------------------
// Radio node assignment
// ---------------------------------------------------------------------------

/// Radio node (1-based) serving UE `ue_index` (1-based) when there are
/// `radio_count` radio nodes: `((n - 1) mod R) + 1`.
///
/// # Panics
/// If `ue_index` or `radio_count` is zero.
pub fn radio_node_for(ue_index: usize, radio_count: usize) -> usize {
    assert!(ue_index >= 1, "UE indices are 1-based");
    assert!(radio_count >= 1, "at least one radio node is required");
    (ue_index - 1) % radio_count + 1
}

/// Radio nodes provisioned for `ue_count` UEs: `ceil(ue_count / 3)`.
pub fn radio_node_count(ue_count: usize) -> usize {
    ue_count.div_ceil(UES_PER_RADIO_NODE)
}

// ---------------------------------------------------------------------------
// Slices
// ---------------------------------------------------------------------------

/// Session slice a UE tunnel belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Slice {
    /// Internet traffic via the cloud user-plane function.
    Cloud,
    /// Edge traffic via the edge user-plane function to the edge server.
    Edge,
}

impl Slice {
    /// Slices in the order they are checked.
    pub const ALL: [Slice; 2] = [Slice::Cloud, Slice::Edge];
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slice::Cloud => write!(f, "cloud"),
            Slice::Edge => write!(f, "edge"),
        }
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// An optional host: discovery may have failed, which is recorded in `problem`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Host {
    pub name: String,
    pub primary: Option<Ipv4Addr>,
    pub interfaces: InterfaceMap,
    pub problem: Option<String>,
}

impl Host {
    fn discovered(name: String, discovery: Discovery) -> Self {
        Self {
            name,
            primary: discovery.primary,
            interfaces: discovery.interfaces,
            problem: None,
        }
    }

    fn failed(name: String, problem: String) -> Self {
        Self {
            name,
            primary: None,
            interfaces: InterfaceMap::new(),
            problem: Some(problem),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ue {
    /// 1-based index taken from the name (`ue3` -> 3).
    pub index: usize,
    #[serde(flatten)]
    pub host: Host,
}

/// A UE tunnel interface bound to a slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tunnel<'a> {
    pub slice: Slice,
    pub interface: &'a str,
    pub address: Ipv4Addr,
}

impl Ue {
    pub fn name(&self) -> &str {
        &self.host.name
    }

    /// The UE's tunnel for `slice`, if the UE holds that slice.
    pub fn tunnel<'a>(&'a self, naming: &'a NamingConfig, slice: Slice) -> Option<Tunnel<'a>> {
        let interface = naming.tunnel_for(slice);
        self.host.interfaces.get(interface).map(|address| Tunnel {
            slice,
            interface,
            address,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RadioNode {
    pub index: usize,
    #[serde(flatten)]
    pub host: Host,
}

impl RadioNode {
    pub fn name(&self) -> &str {
        &self.host.name
    }
}

/// A mandatory singleton: its primary address always resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoreFunction {
    pub name: String,
    pub address: Ipv4Addr,
    pub interfaces: InterfaceMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Ue,
    RadioNode,
    UserPlaneCloud,
    UserPlaneEdge,
    ControlPlane,
    EdgeServer,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComponentKind::Ue => "UE",
            ComponentKind::RadioNode => "radio node",
            ComponentKind::UserPlaneCloud => "UPF (cloud)",
            ComponentKind::UserPlaneEdge => "UPF (edge)",
            ComponentKind::ControlPlane => "control plane",
            ComponentKind::EdgeServer => "edge server",
        };
        write!(f, "{}", s)
    }
}

/// Borrowed view over any component of the topology.
#[derive(Debug, Clone, Copy)]
pub enum Component<'a> {
    Ue(&'a Ue),
    RadioNode(&'a RadioNode),
    UserPlaneCloud(&'a CoreFunction),
    UserPlaneEdge(&'a CoreFunction),
    ControlPlane(&'a CoreFunction),
    EdgeServer(&'a CoreFunction),
}

impl<'a> Component<'a> {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Component::Ue(_) => ComponentKind::Ue,
            Component::RadioNode(_) => ComponentKind::RadioNode,
            Component::UserPlaneCloud(_) => ComponentKind::UserPlaneCloud,
            Component::UserPlaneEdge(_) => ComponentKind::UserPlaneEdge,
            Component::ControlPlane(_) => ComponentKind::ControlPlane,
            Component::EdgeServer(_) => ComponentKind::EdgeServer,
        }
    }

    pub fn name(&self) -> &'a str {
        match self {
            Component::Ue(ue) => &ue.host.name,
            Component::RadioNode(rn) => &rn.host.name,
            Component::UserPlaneCloud(c)
            | Component::UserPlaneEdge(c)
            | Component::ControlPlane(c)
            | Component::EdgeServer(c) => &c.name,
        }
    }

    pub fn primary(&self) -> Option<Ipv4Addr> {
        match self {
            Component::Ue(ue) => ue.host.primary,
            Component::RadioNode(rn) => rn.host.primary,
            Component::UserPlaneCloud(c)
            | Component::UserPlaneEdge(c)
            | Component::ControlPlane(c)
            | Component::EdgeServer(c) => Some(c.address),
        }
    }

    pub fn interfaces(&self) -> &'a InterfaceMap {
        match self {
            Component::Ue(ue) => &ue.host.interfaces,
            Component::RadioNode(rn) => &rn.host.interfaces,
            Component::UserPlaneCloud(c)
            | Component::UserPlaneEdge(c)
            | Component::ControlPlane(c)
            | Component::EdgeServer(c) => &c.interfaces,
        }
    }

    pub fn problem(&self) -> Option<&'a str> {
        match self {
            Component::Ue(ue) => ue.host.problem.as_deref(),
            Component::RadioNode(rn) => rn.host.problem.as_deref(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Topology
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Topology {
    pub ues: Vec<Ue>,
    pub radio_nodes: Vec<RadioNode>,
    pub upf_cloud: CoreFunction,
    pub upf_edge: CoreFunction,
    pub control_plane: CoreFunction,
    pub edge_server: CoreFunction,
}

impl Topology {
    /// Every component: UEs, radio nodes, UPF edge, UPF cloud, control plane,
    /// edge server.
    pub fn components(&self) -> Vec<Component<'_>> {
        let mut all: Vec<Component<'_>> = Vec::with_capacity(self.ues.len() + self.radio_nodes.len() + 4);
        all.extend(self.ues.iter().map(Component::Ue));
        all.extend(self.radio_nodes.iter().map(Component::RadioNode));
        all.push(Component::UserPlaneEdge(&self.upf_edge));
        all.push(Component::UserPlaneCloud(&self.upf_cloud));
        all.push(Component::ControlPlane(&self.control_plane));
        all.push(Component::EdgeServer(&self.edge_server));
        all
    }

    /// Radio node serving `ue`, via [`radio_node_for`].
    pub fn radio_node_of(&self, ue: &Ue) -> Option<&RadioNode> {
        if self.radio_nodes.is_empty() {
            return None;
        }
        let index = radio_node_for(ue.index, self.radio_nodes.len());
        self.radio_nodes.iter().find(|rn| rn.index == index)
    }

    pub fn user_plane(&self, slice: Slice) -> &CoreFunction {
        match slice {
            Slice::Cloud => &self.upf_cloud,
            Slice::Edge => &self.upf_edge,
        }
    }

    /// Build the topology by introspecting every component once.
    ///
    /// UEs and radio nodes that cannot be discovered are kept with their
    /// problem recorded; a missing singleton aborts the build.
    pub async fn build(
        inventory: &Inventory,
        naming: &NamingConfig,
        ue_count: usize,
        radio_count: usize,
    ) -> Result<Topology, TopologyError> {
        if ue_count > 0 && radio_count == 0 {
            return Err(TopologyError::NoRadioNodes { ue_count });
        }

        info!(ue_count, radio_count, "discovering topology");

        let mut ues = Vec::with_capacity(ue_count);
        for index in 1..=ue_count {
            let host = discover_optional(inventory, naming.ue(index)).await;
            ues.push(Ue { index, host });
        }

        let mut radio_nodes = Vec::with_capacity(radio_count);
        for index in 1..=radio_count {
            let host = discover_optional(inventory, naming.radio_node(index)).await;
            radio_nodes.push(RadioNode { index, host });
        }

        let upf_edge = discover_mandatory(inventory, &naming.upf_edge).await?;
        let upf_cloud = discover_mandatory(inventory, &naming.upf_cloud).await?;
        let control_plane = discover_mandatory(inventory, &naming.control_plane).await?;
        let edge_server = discover_mandatory(inventory, &naming.edge_server).await?;

        info!(
            ues = ues.len(),
            radio_nodes = radio_nodes.len(),
            "topology discovered"
        );

        Ok(Topology {
            ues,
            radio_nodes,
            upf_cloud,
            upf_edge,
            control_plane,
            edge_server,
        })
    }
}

async fn discover_optional(inventory: &Inventory, name: String) -> Host {
    match inventory.discover(&name).await {
        Ok(discovery) => {
            if discovery.primary.is_none() {
                warn!(host = %name, "no interface named after host, primary address unknown");
            }
            Host::discovered(name, discovery)
        }
        Err(e) => {
            warn!(host = %name, error = %e, "discovery failed, continuing without it");
            Host::failed(name, e.to_string())
        }
    }
}

async fn discover_mandatory(inventory: &Inventory, name: &str) -> Result<CoreFunction, TopologyError> {
    let discovery = inventory
        .discover(name)
        .await
        .map_err(|source| TopologyError::Discovery {
            host: name.to_string(),
            source,
        })?;
    let address = discovery.primary.ok_or_else(|| TopologyError::MissingComponent {
        name: name.to_string(),
    })?;
    Ok(CoreFunction {
        name: name.to_string(),
        address,
        interfaces: discovery.interfaces,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radio_node_assignment_is_total_and_deterministic() {
        for ue_count in 1..=10 {
            let radio_count = radio_node_count(ue_count);
            assert!(radio_count >= 1);
            for n in 1..=ue_count {
                let rn = radio_node_for(n, radio_count);
                assert_eq!(rn, ((n - 1) % radio_count) + 1);
                assert!((1..=radio_count).contains(&rn));
                assert_eq!(rn, radio_node_for(n, radio_count));
            }
        }
    }

    #[test]
    fn test_radio_node_count_is_ceiling() {
        assert_eq!(radio_node_count(0), 0);
        assert_eq!(radio_node_count(1), 1);
        assert_eq!(radio_node_count(3), 1);
        assert_eq!(radio_node_count(4), 2);
        assert_eq!(radio_node_count(10), 4);
    }

    #[test]
    fn test_four_ues_two_radio_nodes() {
        assert_eq!(radio_node_for(1, 2), 1);
        assert_eq!(radio_node_for(2, 2), 2);
        assert_eq!(radio_node_for(3, 2), 1);
        assert_eq!(radio_node_for(4, 2), 2);
    }

    #[test]
    #[should_panic(expected = "1-based")]
    fn test_zero_ue_index_panics() {
        radio_node_for(0, 2);
    }
}

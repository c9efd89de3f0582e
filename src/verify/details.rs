use std::net::Ipv4Addr;

use serde::Serialize;

use super::Verifier;
use crate::inventory::InterfaceMap;
use crate::report::TableRow;
use crate::topology::{ComponentKind, Topology};

#[derive(Debug, Clone, Serialize)]
pub struct DetailRow {
    pub name: String,
    pub kind: ComponentKind,
    pub address: Option<Ipv4Addr>,
    pub interfaces: InterfaceMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
}

impl TableRow for DetailRow {
    fn headers() -> &'static [&'static str] {
        &["Component name", "ip", "interfaces"]
    }

    fn cells(&self) -> Vec<String> {
        let address = match (&self.address, &self.problem) {
            (Some(ip), _) => ip.to_string(),
            (None, Some(problem)) => format!("unavailable: {}", problem),
            (None, None) => "-".to_string(),
        };
        vec![self.name.clone(), address, self.interfaces.to_string()]
    }
}

impl Verifier {
    /// One row per component, UEs first.
    pub fn details(&self, topology: &Topology) -> Vec<DetailRow> {
        topology
            .components()
            .into_iter()
            .map(|c| DetailRow {
                name: c.name().to_string(),
                kind: c.kind(),
                address: c.primary(),
                interfaces: c.interfaces().clone(),
                problem: c.problem().map(str::to_string),
            })
            .collect()
    }
}

//! Interface inventory: which interfaces a host has and what they are bound to.
//!
//! Introspection order is preserved everywhere. Callers must not assume the
//! listing is sorted.

use std::net::Ipv4Addr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::exec::{ExecError, RemoteCommand, SharedExecutor};

static INET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"inet\s+(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})").expect("static regex"));

// ---------------------------------------------------------------------------
// InterfaceMap
// ---------------------------------------------------------------------------

/// One discovered interface and its IPv4 address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interface {
    pub name: String,
    pub address: Ipv4Addr,
}

/// Interface name -> address, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct InterfaceMap(Vec<Interface>);

impl InterfaceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `name`. A replaced entry keeps its original position.
    pub fn insert(&mut self, name: impl Into<String>, address: Ipv4Addr) {
        let name = name.into();
        match self.0.iter_mut().find(|i| i.name == name) {
            Some(existing) => existing.address = address,
            None => self.0.push(Interface { name, address }),
        }
    }

    pub fn get(&self, name: &str) -> Option<Ipv4Addr> {
        self.0.iter().find(|i| i.name == name).map(|i| i.address)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interface> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|i| i.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for InterfaceMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|i| format!("{}:{}", i.name, i.address))
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Result of introspecting one host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// Address of the interface named after the host.
    pub primary: Option<Ipv4Addr>,
    /// Capability interfaces: everything except excluded and host-link ones.
    pub interfaces: InterfaceMap,
}

/// True if `interface` is named after `host` (`ue1`, `ue1-eth1`, ...).
pub fn is_host_link(host: &str, interface: &str) -> bool {
    interface == host
        || interface
            .strip_prefix(host)
            .is_some_and(|rest| rest.starts_with('-'))
}

/// Parse the first IPv4 address out of `ip addr show` output.
pub fn parse_inet(output: &str) -> Option<Ipv4Addr> {
    INET_RE
        .captures(output)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Split a `/sys/class/net` listing into interface names.
pub fn parse_listing(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Per-host interface introspection over a [`RemoteExecutor`](crate::exec::RemoteExecutor).
#[derive(Clone)]
pub struct Inventory {
    executor: SharedExecutor,
    excluded: Vec<String>,
    timeout: std::time::Duration,
}

impl Inventory {
    pub fn new(executor: SharedExecutor, excluded: Vec<String>, timeout: std::time::Duration) -> Self {
        Self {
            executor,
            excluded,
            timeout,
        }
    }

    /// Interface names on `host`, in introspection order. Each call queries
    /// the host again.
    pub async fn list_interfaces(&self, host: &str) -> Result<Vec<String>, ExecError> {
        let cmd = RemoteCommand::new("ls").arg("/sys/class/net");
        let output = self.executor.run(host, &cmd, self.timeout).await?;
        Ok(parse_listing(&output.stdout))
    }

    /// IPv4 address of `interface` on `host`, if it has one.
    pub async fn resolve_address(
        &self,
        host: &str,
        interface: &str,
    ) -> Result<Option<Ipv4Addr>, ExecError> {
        let cmd = RemoteCommand::new("ip").args(["-4", "addr", "show", interface]);
        let output = self.executor.run(host, &cmd, self.timeout).await?;
        let address = parse_inet(&output.stdout);
        if address.is_none() {
            debug!(%host, %interface, "no IPv4 address on interface");
        }
        Ok(address)
    }

    /// Introspect `host` into a primary address and an interface map.
    ///
    /// Excluded interfaces are skipped before any address query. Among
    /// host-link interfaces an exact name match wins, otherwise the first one
    /// discovered supplies the primary address. An interface whose address
    /// query fails is logged and left out.
    pub async fn discover(&self, host: &str) -> Result<Discovery, ExecError> {
        let names = self.list_interfaces(host).await?;
        let mut discovery = Discovery::default();
        let mut primary_is_exact = false;

        for name in names {
            if self.excluded.iter().any(|e| *e == name) {
                continue;
            }

            let address = match self.resolve_address(host, &name).await {
                Ok(Some(address)) => address,
                Ok(None) => continue,
                Err(e @ ExecError::HostUnreachable { .. }) => return Err(e),
                Err(e) => {
                    warn!(%host, interface = %name, error = %e, "address query failed, skipping interface");
                    continue;
                }
            };

            if is_host_link(host, &name) {
                let exact = name == host;
                if discovery.primary.is_none() || (exact && !primary_is_exact) {
                    discovery.primary = Some(address);
                    primary_is_exact = exact;
                }
            } else {
                discovery.interfaces.insert(name, address);
            }
        }

        debug!(
            %host,
            primary = ?discovery.primary,
            interfaces = %discovery.interfaces,
            "host discovered"
        );
        Ok(discovery)
    }
}

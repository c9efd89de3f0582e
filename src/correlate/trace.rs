//! traceroute -n output.

use std::net::IpAddr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static HOP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)\s+(\S+)").expect("static regex"));

/// One hop; `address` is `None` when the hop did not answer (`*`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceHop {
    pub ttl: u32,
    pub address: Option<IpAddr>,
}

pub fn parse_hops(text: &str) -> Vec<TraceHop> {
    text.lines()
        .filter_map(|line| {
            let caps = HOP_RE.captures(line)?;
            let ttl = caps.get(1)?.as_str().parse().ok()?;
            let address = caps.get(2)?.as_str().parse().ok();
            Some(TraceHop { ttl, address })
        })
        .collect()
}

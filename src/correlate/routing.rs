//! Hop-by-hop routing verdicts.

use std::fmt;

use serde::Serialize;

use super::capture::HopOutcome;
use super::reachability::Reachability;
use super::trace::TraceHop;
use crate::capture::{CaptureOutput, SessionState};
use crate::topology::Slice;

/// What the capture on one hop of a route reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HopReport {
    pub host: String,
    pub interface: String,
    pub outcome: HopOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<SessionState>,
    /// Lines that matched the hop's line filter, when it had one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_lines: Option<usize>,
    /// Why the capture could not be run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HopReport {
    pub fn from_capture(output: &CaptureOutput, matched_lines: Option<usize>) -> Self {
        Self {
            host: output.host.clone(),
            interface: output.interface.clone(),
            outcome: HopOutcome::from_lines(&output.lines),
            state: Some(output.state),
            matched_lines,
            error: None,
        }
    }

    pub fn failed(host: &str, interface: &str, error: impl ToString) -> Self {
        Self {
            host: host.to_string(),
            interface: interface.to_string(),
            outcome: HopOutcome::NoData,
            state: None,
            matched_lines: None,
            error: Some(error.to_string()),
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome.passed()
    }
}

impl fmt::Display for HopReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Some(_) => write!(f, "capture failed"),
            None => write!(f, "{}", self.outcome),
        }
    }
}

/// Packets seen on the core hop against packets the probe sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PacketCounts {
    pub observed: Option<u64>,
    pub expected: Option<u32>,
}

impl PacketCounts {
    pub fn of(core: &HopReport, probe: &Reachability) -> Self {
        let observed = match core.outcome {
            HopOutcome::Observed { captured, .. } => Some(captured),
            HopOutcome::NoTraffic => Some(0),
            HopOutcome::NoData => None,
        };
        Self {
            observed,
            expected: probe.transmitted(),
        }
    }
}

impl fmt::Display for PacketCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.observed {
            Some(n) => write!(f, "{}", n)?,
            None => write!(f, "-")?,
        }
        match self.expected {
            Some(n) => write!(f, "/{}", n),
            None => write!(f, "/-"),
        }
    }
}

/// Routing verdict for one (UE, slice) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingVerdict {
    pub ue: String,
    pub slice: Slice,
    pub interface: String,
    pub radio_node: String,
    pub user_plane: String,
    /// Label of the destination (host name or address).
    pub destination: String,
    pub access: HopReport,
    pub core: HopReport,
    pub probe: Reachability,
    pub packets: PacketCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<TraceHop>>,
}

impl RoutingVerdict {
    /// `ue3[uesimtun0] -> gnb1 -> upf_cld -> www.google.com`
    pub fn route(&self) -> String {
        format!(
            "{}[{}] -> {} -> {} -> {}",
            self.ue, self.interface, self.radio_node, self.user_plane, self.destination
        )
    }

    /// Traffic was seen on both hops.
    pub fn passed(&self) -> bool {
        self.access.passed() && self.core.passed()
    }

    /// Short cell for the result table.
    pub fn summary(&self) -> String {
        let verdict = if self.passed() { "PASS" } else { "FAIL" };
        format!(
            "{} (access {}, core {}, observed/expected {}, ping {})",
            verdict, self.access, self.core, self.packets, self.probe
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(host: &str, interface: &str, lines: &[&str], state: SessionState) -> CaptureOutput {
        CaptureOutput {
            host: host.to_string(),
            interface: interface.to_string(),
            state,
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }

    fn verdict(access: HopReport, core: HopReport) -> RoutingVerdict {
        let probe = Reachability::Ratio {
            received: 8,
            transmitted: 8,
        };
        RoutingVerdict {
            ue: "ue3".to_string(),
            slice: Slice::Cloud,
            interface: "uesimtun0".to_string(),
            radio_node: "gnb1".to_string(),
            user_plane: "upf_cld".to_string(),
            destination: "www.google.com".to_string(),
            packets: PacketCounts::of(&core, &probe),
            access,
            core,
            probe,
            path: None,
        }
    }

    #[test]
    fn test_verdict_passes_when_both_hops_saw_traffic() {
        let access = HopReport::from_capture(
            &output(
                "gnb1",
                "gnb1-s1",
                &["16 packets captured", "16 packets received by filter"],
                SessionState::Stopped,
            ),
            Some(0),
        );
        let core = HopReport::from_capture(
            &output(
                "upf_cld",
                "ogstun",
                &["12 packets captured", "11 packets received by filter"],
                SessionState::Stopped,
            ),
            None,
        );
        let v = verdict(access, core);
        assert!(v.passed());
        assert_eq!(v.route(), "ue3[uesimtun0] -> gnb1 -> upf_cld -> www.google.com");
        assert_eq!(v.core.to_string(), "12/11");
        assert_eq!(
            v.packets,
            PacketCounts {
                observed: Some(12),
                expected: Some(8)
            }
        );
        assert_eq!(
            v.summary(),
            "PASS (access 16/16, core 12/11, observed/expected 12/8, ping 8/8)"
        );
    }

    #[test]
    fn test_failed_capture_is_reported_not_passed() {
        let access = HopReport::failed("gnb1", "gnb1-s1", "container not running");
        let core = HopReport::from_capture(
            &output("upf_cld", "ogstun", &[], SessionState::Expired),
            None,
        );
        let v = verdict(access, core);
        assert!(!v.passed());
        assert_eq!(v.access.to_string(), "capture failed");
        assert_eq!(v.core.outcome, HopOutcome::NoData);
        assert_eq!(v.packets.to_string(), "-/8");
        assert!(v.summary().starts_with("FAIL"));
    }
}

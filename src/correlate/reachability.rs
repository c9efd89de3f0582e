//! ping output.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::{group_number, ParseError};
use crate::probes::ProbeResult;

static SUMMARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+) packets transmitted, (\d+) received").expect("static regex"));

/// Printed by ping when the source interface does not exist.
pub const NOT_BOUND_MARKER: &str = "SO_BINDTODEVICE";

const UNREACHABLE_MARKERS: [&str; 2] = ["Network is unreachable", "Destination Host Unreachable"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PingCounts {
    pub transmitted: u32,
    pub received: u32,
}

pub fn parse_counts(text: &str) -> Result<PingCounts, ParseError> {
    let caps = SUMMARY_RE.captures(text).ok_or(ParseError::MissingPattern {
        what: "ping summary",
    })?;
    Ok(PingCounts {
        transmitted: group_number(&caps, 1, "packets transmitted")?,
        received: group_number(&caps, 2, "packets received")?,
    })
}

/// Reachability verdict. Each failure mode is its own variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Reachability {
    Ratio { received: u32, transmitted: u32 },
    /// The network refused the packets and ping printed no summary.
    Unreachable,
    /// The source interface is not bound on the host.
    NotFound,
    /// Output without a recognizable summary.
    Error { detail: String },
    /// The probe could not be run at all.
    ExecFailed { reason: String },
}

impl Reachability {
    /// Verdict for a completed ping's output.
    pub fn classify(text: &str) -> Self {
        if text.trim().is_empty() {
            return Reachability::Error {
                detail: "empty output".to_string(),
            };
        }
        if text.contains(NOT_BOUND_MARKER) {
            return Reachability::NotFound;
        }
        match parse_counts(text) {
            Ok(c) => Reachability::Ratio {
                received: c.received,
                transmitted: c.transmitted,
            },
            Err(_) if UNREACHABLE_MARKERS.iter().any(|m| text.contains(m)) => {
                Reachability::Unreachable
            }
            Err(e) => Reachability::Error {
                detail: e.to_string(),
            },
        }
    }

    pub fn evaluate(result: &ProbeResult) -> Self {
        match &result.raw {
            Ok(raw) => Self::classify(&raw.text),
            Err(e) => Reachability::ExecFailed {
                reason: e.to_string(),
            },
        }
    }

    /// At least one reply came back.
    pub fn passed(&self) -> bool {
        matches!(self, Reachability::Ratio { received, .. } if *received > 0)
    }

    pub fn transmitted(&self) -> Option<u32> {
        match self {
            Reachability::Ratio { transmitted, .. } => Some(*transmitted),
            _ => None,
        }
    }
}

impl fmt::Display for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reachability::Ratio {
                received,
                transmitted,
            } => write!(f, "{}/{}", received, transmitted),
            Reachability::Unreachable => write!(f, "Unreachable"),
            Reachability::NotFound => write!(f, "Not Found"),
            Reachability::Error { .. } => write!(f, "Error"),
            Reachability::ExecFailed { .. } => write!(f, "Exec failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PING_OK: &str = "\
PING 10.0.3.2 (10.0.3.2) from 10.45.0.2 uesimtun0: 56(84) bytes of data.
64 bytes from 10.0.3.2: icmp_seq=1 ttl=64 time=1.02 ms
64 bytes from 10.0.3.2: icmp_seq=2 ttl=64 time=0.98 ms

--- 10.0.3.2 ping statistics ---
8 packets transmitted, 8 received, 0% packet loss, time 7011ms
rtt min/avg/max/mdev = 0.912/1.004/1.102/0.061 ms
";

    #[test]
    fn test_summary_line_gives_ratio() {
        assert_eq!(
            Reachability::classify("8 packets transmitted, 8 received"),
            Reachability::Ratio {
                received: 8,
                transmitted: 8
            }
        );
        let verdict = Reachability::classify(PING_OK);
        assert_eq!(verdict.to_string(), "8/8");
        assert!(verdict.passed());
    }

    #[test]
    fn test_partial_loss() {
        let v = Reachability::classify("8 packets transmitted, 5 received, 37.5% packet loss");
        assert_eq!(v.to_string(), "5/8");
        assert_eq!(v.transmitted(), Some(8));
    }

    #[test]
    fn test_not_bound_marker_is_not_found() {
        let text = "ping: SO_BINDTODEVICE uesimtun1: No such device\n";
        assert_eq!(Reachability::classify(text), Reachability::NotFound);
        assert_eq!(Reachability::NotFound.to_string(), "Not Found");
    }

    #[test]
    fn test_no_pattern_is_error() {
        let v = Reachability::classify("ping: www.google.com: Temporary failure in name resolution");
        assert!(matches!(v, Reachability::Error { .. }));
        assert!(!v.passed());
        assert!(matches!(Reachability::classify(""), Reachability::Error { .. }));
    }

    #[test]
    fn test_unreachable_without_summary() {
        let v = Reachability::classify("connect: Network is unreachable\n");
        assert_eq!(v, Reachability::Unreachable);
    }

    #[test]
    fn test_summary_wins_over_unreachable_marker() {
        let text = "From 10.45.0.1 icmp_seq=1 Destination Host Unreachable\n\
                    8 packets transmitted, 0 received, +8 errors, 100% packet loss\n";
        assert_eq!(
            Reachability::classify(text),
            Reachability::Ratio {
                received: 0,
                transmitted: 8
            }
        );
    }

    #[test]
    fn test_parse_counts_rejects_overflow() {
        let err = parse_counts("99999999999 packets transmitted, 1 received").unwrap_err();
        assert!(matches!(err, ParseError::BadNumber { .. }));
    }
}

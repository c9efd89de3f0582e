//! tcpdump summary counts.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::{group_number, ParseError};

static CAPTURED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+) packets? captured").expect("static regex"));
static FILTERED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+) packets? received by filter").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaptureCounts {
    pub captured: u64,
    pub filtered: u64,
}

pub fn parse_counts(text: &str) -> Result<CaptureCounts, ParseError> {
    let captured = CAPTURED_RE.captures(text).ok_or(ParseError::MissingPattern {
        what: "packets captured",
    })?;
    let filtered = FILTERED_RE.captures(text).ok_or(ParseError::MissingPattern {
        what: "packets received by filter",
    })?;
    Ok(CaptureCounts {
        captured: group_number(&captured, 1, "packets captured")?,
        filtered: group_number(&filtered, 1, "packets received by filter")?,
    })
}

/// What one capture saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HopOutcome {
    Observed { captured: u64, filtered: u64 },
    /// The capture ran and reported `0/0`.
    NoTraffic,
    /// No summary could be read from the capture.
    NoData,
}

impl HopOutcome {
    pub fn from_text(text: &str) -> Self {
        match parse_counts(text) {
            Ok(CaptureCounts {
                captured: 0,
                filtered: 0,
            }) => HopOutcome::NoTraffic,
            Ok(c) => HopOutcome::Observed {
                captured: c.captured,
                filtered: c.filtered,
            },
            Err(_) => HopOutcome::NoData,
        }
    }

    pub fn from_lines(lines: &[String]) -> Self {
        Self::from_text(&lines.join("\n"))
    }

    pub fn passed(&self) -> bool {
        matches!(self, HopOutcome::Observed { captured, .. } if *captured > 0)
    }
}

impl fmt::Display for HopOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HopOutcome::Observed { captured, filtered } => write!(f, "{}/{}", captured, filtered),
            HopOutcome::NoTraffic => write!(f, "0/0 (no traffic)"),
            HopOutcome::NoData => write!(f, "no data"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_from_summary() {
        let text = "listening on ogstun, link-type RAW (Raw IP), snapshot length 262144 bytes\n\
                    IP 10.45.0.2 > 142.250.184.4: ICMP echo request, id 9, seq 1, length 64\n\
                    12 packets captured\n\
                    11 packets received by filter\n\
                    0 packets dropped by kernel\n";
        let outcome = HopOutcome::from_text(text);
        assert_eq!(
            outcome,
            HopOutcome::Observed {
                captured: 12,
                filtered: 11
            }
        );
        assert_eq!(outcome.to_string(), "12/11");
        assert!(outcome.passed());
    }

    #[test]
    fn test_no_lines_is_no_data() {
        assert_eq!(HopOutcome::from_lines(&[]), HopOutcome::NoData);
        assert!(!HopOutcome::NoData.passed());
    }

    #[test]
    fn test_zero_counts_are_no_traffic_not_a_pass() {
        let text = "0 packets captured\n0 packets received by filter\n";
        let outcome = HopOutcome::from_text(text);
        assert_eq!(outcome, HopOutcome::NoTraffic);
        assert!(!outcome.passed());
        assert_ne!(outcome, HopOutcome::NoData);
    }

    #[test]
    fn test_half_summary_is_no_data() {
        assert_eq!(HopOutcome::from_text("3 packets captured\n"), HopOutcome::NoData);
        assert_eq!(
            parse_counts("3 packets captured\n"),
            Err(ParseError::MissingPattern {
                what: "packets received by filter"
            })
        );
    }

    #[test]
    fn test_singular_packet() {
        let text = "1 packet captured\n1 packet received by filter\n";
        assert!(HopOutcome::from_text(text).passed());
    }
}

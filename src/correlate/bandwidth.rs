//! iperf3 text output.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::ParseError;
use crate::probes::ProbeResult;

static BITRATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s+([KMG]?)bits/sec").expect("static regex"));

/// Header of iperf3's results tables.
pub const TABLE_HEADER: &str = "[ ID]";

/// One bitrate figure as printed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bitrate {
    /// Number exactly as printed, e.g. `"94.6"`.
    pub raw: String,
    pub value: f64,
    /// `""`, `"K"`, `"M"` or `"G"`.
    pub prefix: String,
}

impl Bitrate {
    pub fn bits_per_sec(&self) -> f64 {
        let scale = match self.prefix.as_str() {
            "K" => 1e3,
            "M" => 1e6,
            "G" => 1e9,
            _ => 1.0,
        };
        self.value * scale
    }

    pub fn mbits(&self) -> f64 {
        self.bits_per_sec() / 1e6
    }

    /// Mbits/sec, keeping the printed digits when iperf3 already used Mbits.
    pub fn mbits_label(&self) -> String {
        if self.prefix == "M" {
            self.raw.clone()
        } else {
            format!("{:.2}", self.mbits())
        }
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}bits/sec", self.raw, self.prefix)
    }
}

/// The last results table: from the final header line to the end. The whole
/// text when there is no header.
pub fn results_table(text: &str) -> &str {
    let mut start = None;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.starts_with(TABLE_HEADER) {
            start = Some(offset);
        }
        offset += line.len();
    }
    start.map_or(text, |s| &text[s..])
}

/// All bitrate figures of the last results table, in order.
pub fn extract_bitrates(text: &str) -> Vec<Bitrate> {
    BITRATE_RE
        .captures_iter(results_table(text))
        .filter_map(|caps| {
            let raw = caps.get(1)?.as_str();
            Some(Bitrate {
                raw: raw.to_string(),
                value: raw.parse().ok()?,
                prefix: caps.get(2).map_or("", |m| m.as_str()).to_string(),
            })
        })
        .collect()
}

pub fn parse_bitrates(text: &str) -> Result<Vec<Bitrate>, ParseError> {
    let found = extract_bitrates(text);
    if found.is_empty() {
        return Err(ParseError::MissingPattern { what: "bitrate" });
    }
    Ok(found)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum BandwidthOutcome {
    /// Usually one sender and one receiver figure.
    Figures { bitrates: Vec<Bitrate> },
    /// The client ran but printed no bitrate; `detail` holds its error line.
    NoFigures { detail: Option<String> },
    ExecFailed { reason: String },
}

impl BandwidthOutcome {
    pub fn classify(text: &str) -> Self {
        match parse_bitrates(text) {
            Ok(bitrates) => BandwidthOutcome::Figures { bitrates },
            Err(_) => BandwidthOutcome::NoFigures {
                detail: text
                    .lines()
                    .find(|l| l.contains("error"))
                    .map(|l| l.trim().to_string()),
            },
        }
    }

    pub fn evaluate(result: &ProbeResult) -> Self {
        match &result.raw {
            Ok(raw) => Self::classify(&raw.text),
            Err(e) => BandwidthOutcome::ExecFailed {
                reason: e.to_string(),
            },
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, BandwidthOutcome::Figures { .. })
    }
}

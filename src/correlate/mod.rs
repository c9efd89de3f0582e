//! Result correlator: turns probe and capture text into verdicts.
//!
//! Every pattern matched against tool output lives in this module tree, one
//! file per tool, so it can be tested against literal captures.

pub mod bandwidth;
pub mod capture;
pub mod reachability;
pub mod routing;
pub mod trace;

use regex::Captures;
use thiserror::Error;

pub use bandwidth::{BandwidthOutcome, Bitrate};
pub use capture::{CaptureCounts, HopOutcome};
pub use reachability::Reachability;
pub use routing::{HopReport, PacketCounts, RoutingVerdict};
pub use trace::TraceHop;

/// Expected text missing from tool output.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no {what} in output")]
    MissingPattern { what: &'static str },

    #[error("{what}: {text:?} is not a number")]
    BadNumber { what: &'static str, text: String },
}

/// Parse capture group `index` as a number.
pub(crate) fn group_number<T: std::str::FromStr>(
    caps: &Captures<'_>,
    index: usize,
    what: &'static str,
) -> Result<T, ParseError> {
    let text = caps
        .get(index)
        .map(|m| m.as_str())
        .ok_or(ParseError::MissingPattern { what })?;
    text.parse().map_err(|_| ParseError::BadNumber {
        what,
        text: text.to_string(),
    })
}

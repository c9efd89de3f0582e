//! Lazy, filtered view over a capture's live output.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

/// Line predicate: every needle must appear in the line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineFilter {
    needles: Vec<String>,
}

impl LineFilter {
    pub fn all_of<I, S>(needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            needles: needles.into_iter().map(Into::into).collect(),
        }
    }

    /// Lines mentioning `address` and carried over `protocol`.
    pub fn address_and_protocol(address: impl ToString, protocol: &str) -> Self {
        Self::all_of([address.to_string(), protocol.to_string()])
    }

    pub fn matches(&self, line: &str) -> bool {
        self.needles.iter().all(|n| line.contains(n.as_str()))
    }
}

/// Finite, non-restartable stream of capture lines.
///
/// Ends when the capture ends. With a filter only matching lines are yielded,
/// but every line is still counted.
#[derive(Debug)]
pub struct CaptureStream {
    rx: Option<mpsc::UnboundedReceiver<String>>,
    filter: Option<LineFilter>,
    seen: usize,
    matched: usize,
}

impl CaptureStream {
    pub(crate) fn new(rx: Option<mpsc::UnboundedReceiver<String>>, filter: Option<LineFilter>) -> Self {
        Self {
            rx,
            filter,
            seen: 0,
            matched: 0,
        }
    }

    /// Drive the stream to its end, returning the matching lines.
    pub async fn collect_matching(mut self) -> (Vec<String>, StreamTally) {
        use futures::StreamExt;
        let mut out = Vec::new();
        while let Some(line) = self.next().await {
            out.push(line);
        }
        (out, self.tally())
    }

    pub fn tally(&self) -> StreamTally {
        StreamTally {
            seen: self.seen,
            matched: self.matched,
        }
    }
}

/// Final line counts of a consumed stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StreamTally {
    pub seen: usize,
    pub matched: usize,
}

impl Stream for CaptureStream {
    type Item = String;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        let this = self.get_mut();
        let Some(rx) = this.rx.as_mut() else {
            return Poll::Ready(None);
        };
        loop {
            match rx.poll_recv(cx) {
                Poll::Ready(Some(line)) => {
                    this.seen += 1;
                    let keep = this.filter.as_ref().map_or(true, |f| f.matches(&line));
                    if keep {
                        this.matched += 1;
                        return Poll::Ready(Some(line));
                    }
                }
                Poll::Ready(None) => {
                    this.rx = None;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

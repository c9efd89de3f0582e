//! A single running capture and the task that owns its process.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::stream::{CaptureStream, LineFilter};
use super::SessionState;
use crate::exec::{RemoteCommand, RemoteProcess, SharedExecutor};

pub(crate) struct LaunchParams {
    pub host: String,
    pub interface: String,
    pub window: Duration,
    pub stop_grace: Duration,
    pub drain_timeout: Duration,
    /// Run on the host to make the capture tool exit and print its summary.
    pub interrupt: RemoteCommand,
    pub command_timeout: Duration,
}

/// Everything a capture printed, sealed once the session ended.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureOutput {
    pub host: String,
    pub interface: String,
    pub state: SessionState,
    pub lines: Vec<String>,
}

impl CaptureOutput {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// A running (or finished) capture.
///
/// The process is owned by a background collector task. The session handle
/// reads the append-only output buffer and the state published by that task.
/// Dropping the handle stops the capture.
#[derive(Debug)]
pub struct CaptureSession {
    id: Uuid,
    host: String,
    interface: String,
    state: watch::Receiver<SessionState>,
    buffer: Arc<Mutex<Vec<String>>>,
    stream: Option<mpsc::UnboundedReceiver<String>>,
    cancel: CancellationToken,
}

impl CaptureSession {
    pub(crate) fn launch(
        params: LaunchParams,
        executor: SharedExecutor,
        mut process: RemoteProcess,
    ) -> Self {
        let id = Uuid::new_v4();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (stream_tx, stream_rx) = mpsc::unbounded_channel();
        let lines = process.take_lines().unwrap_or_else(|| {
            // Already taken: behave like a process with no output.
            let (_tx, rx) = mpsc::unbounded_channel();
            rx
        });
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();
        let deadline = Instant::now() + params.window;

        let session = Self {
            id,
            host: params.host.clone(),
            interface: params.interface.clone(),
            state: state_rx,
            buffer: buffer.clone(),
            stream: Some(stream_rx),
            cancel: cancel.clone(),
        };

        transition(&state_tx, id, SessionState::Running);

        let collector = Collector {
            id,
            params,
            executor,
            process,
            lines,
            stream_tx,
            buffer,
            state_tx,
            cancel,
            deadline,
        };
        tokio::spawn(collector.run());

        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Lines captured so far.
    pub fn snapshot(&self) -> Vec<String> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Live view of the output from now on.
    ///
    /// Lines printed before the first call are still delivered. Only the first
    /// call gets the live feed; later calls return an empty stream.
    pub fn read_stream(&mut self, filter: Option<LineFilter>) -> CaptureStream {
        CaptureStream::new(self.stream.take(), filter)
    }

    /// Stop the capture and wait for it to be released. Calling it again, or
    /// on an ended session, returns the ended state and does nothing else.
    pub async fn stop(&self) -> SessionState {
        let current = self.state();
        if current.is_ended() {
            return current;
        }
        debug!(session = %self.id, host = %self.host, interface = %self.interface, "stop requested");
        self.cancel.cancel();
        self.wait_ended().await
    }

    /// Wait for the capture to end on its own (deadline or process exit) and
    /// return its output.
    pub async fn finish(&self) -> CaptureOutput {
        let state = self.wait_ended().await;
        self.sealed(state)
    }

    /// Final output, available once the session has ended.
    pub fn output(&self) -> Option<CaptureOutput> {
        let state = self.state();
        state.is_ended().then(|| self.sealed(state))
    }

    fn sealed(&self, state: SessionState) -> CaptureOutput {
        CaptureOutput {
            host: self.host.clone(),
            interface: self.interface.clone(),
            state,
            lines: self.snapshot(),
        }
    }

    async fn wait_ended(&self) -> SessionState {
        let mut rx = self.state.clone();
        let ended = match rx.wait_for(|s| s.is_ended()).await {
            Ok(state) => *state,
            // Collector is gone without publishing an end state.
            Err(_) => SessionState::Stopped,
        };
        ended
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn transition(tx: &watch::Sender<SessionState>, id: Uuid, next: SessionState) {
    tx.send_if_modified(|state| {
        if state.can_become(next) {
            debug!(session = %id, from = %state, to = %next, "capture state change");
            *state = next;
            true
        } else {
            false
        }
    });
}

// ---------------------------------------------------------------------------
// Collector task
// ---------------------------------------------------------------------------

struct Collector {
    id: Uuid,
    params: LaunchParams,
    executor: SharedExecutor,
    process: RemoteProcess,
    lines: mpsc::UnboundedReceiver<String>,
    stream_tx: mpsc::UnboundedSender<String>,
    buffer: Arc<Mutex<Vec<String>>>,
    state_tx: watch::Sender<SessionState>,
    cancel: CancellationToken,
    deadline: Instant,
}

impl Collector {
    async fn run(mut self) {
        // The remote `timeout` ends the capture at the deadline. The local
        // backstop only fires if that never shows up as end of output.
        let backstop = tokio::time::sleep_until(self.deadline + self.params.drain_timeout);
        tokio::pin!(backstop);

        let mut closed = false;
        let end = loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break SessionState::Stopped,

                _ = &mut backstop => {
                    warn!(session = %self.id, host = %self.params.host, "capture outlived its window");
                    break SessionState::Expired;
                }

                line = self.lines.recv() => match line {
                    Some(line) => self.record(line),
                    None => {
                        closed = true;
                        if Instant::now() >= self.deadline {
                            break SessionState::Expired;
                        }
                        warn!(
                            session = %self.id,
                            host = %self.params.host,
                            interface = %self.params.interface,
                            "capture exited before its deadline"
                        );
                        break SessionState::Stopped;
                    }
                },
            }
        };

        if closed {
            let _ = self.process.terminate(self.params.stop_grace).await;
        } else {
            if end == SessionState::Stopped {
                self.interrupt_remote().await;
                closed = self.drain(self.params.stop_grace).await;
            }
            let _ = self.process.terminate(self.params.stop_grace).await;
            if !closed {
                self.drain(self.params.drain_timeout).await;
            }
        }

        let line_count = self.buffer.lock().map(|b| b.len()).unwrap_or(0);
        info!(
            session = %self.id,
            host = %self.params.host,
            interface = %self.params.interface,
            state = %end,
            lines = line_count,
            "capture ended"
        );
        transition(&self.state_tx, self.id, end);
    }

    fn record(&self, line: String) {
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line.clone());
        // The reader may have gone away; the buffer still has the line.
        let _ = self.stream_tx.send(line);
    }

    /// Collect lines until the output closes or `limit` passes. Returns true
    /// when the output closed.
    async fn drain(&mut self, limit: Duration) -> bool {
        let until = Instant::now() + limit;
        loop {
            match tokio::time::timeout_at(until, self.lines.recv()).await {
                Ok(Some(line)) => self.record(line),
                Ok(None) => return true,
                Err(_) => return false,
            }
        }
    }

    async fn interrupt_remote(&self) {
        match self
            .executor
            .run(&self.params.host, &self.params.interrupt, self.params.command_timeout)
            .await
        {
            Ok(_) => debug!(session = %self.id, host = %self.params.host, "capture interrupted"),
            Err(e) => debug!(session = %self.id, host = %self.params.host, error = %e, "remote interrupt failed"),
        }
    }
}

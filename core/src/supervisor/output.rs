//! Backend output observation
//!
//! Each output stream is drained by its own task in raw chunks. Complete
//! lines go to the tail ring, to `tracing` and to subscribers; stdout (and
//! stderr when configured) is additionally scanned for the readiness marker.

use super::adapters::OutputReader;
use super::SharedState;
use crate::logging::LogRing;
use schema::{BackendEvent, LogStream};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncReadExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Size of each read from a child stream
const READ_CHUNK: usize = 8 * 1024;

/// A line without a newline is flushed once it grows past this many bytes
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Substring search for the readiness marker across chunk boundaries
///
/// The last `marker.len() - 1` bytes of each chunk are carried into the next
/// search, so a marker split between two reads is still found. Matching is
/// on raw bytes, independent of line structure and UTF-8 boundaries.
#[derive(Debug, Clone)]
pub struct MarkerScanner {
    marker: Vec<u8>,
    carry: Vec<u8>,
}

impl MarkerScanner {
    /// Scanner for the given marker text
    pub fn new(marker: &str) -> Self {
        Self {
            marker: marker.as_bytes().to_vec(),
            carry: Vec::new(),
        }
    }

    /// Feed the next chunk; returns true if the marker ends within it
    pub fn feed(&mut self, chunk: &[u8]) -> bool {
        if self.marker.is_empty() {
            return false;
        }

        let mut window = std::mem::take(&mut self.carry);
        window.extend_from_slice(chunk);

        let found = window
            .windows(self.marker.len())
            .any(|candidate| candidate == self.marker.as_slice());

        let keep = self.marker.len() - 1;
        self.carry = window.split_off(window.len().saturating_sub(keep));
        found
    }
}

/// Splits a byte stream into lines
///
/// Invalid UTF-8 is replaced, trailing `\r` is dropped.
#[derive(Debug, Default)]
pub struct OutputObserver {
    pending: Vec<u8>,
}

impl OutputObserver {
    /// Create an empty observer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return the lines it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                lines.push(self.take_line());
            } else {
                self.pending.push(byte);
                if self.pending.len() >= MAX_LINE_BYTES {
                    lines.push(self.take_line());
                }
            }
        }
        lines
    }

    /// Flush a trailing partial line at end of stream
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }

    fn take_line(&mut self) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Everything a stream reader task needs from its process handle
pub(crate) struct ReaderContext {
    pub pid: u32,
    pub generation: u64,
    pub shared: Arc<SharedState>,
    pub ring: Arc<Mutex<LogRing>>,
    pub event_tx: broadcast::Sender<BackendEvent>,
    /// Present when this stream is scanned for the marker
    pub scanner: Option<MarkerScanner>,
    /// Whether the marker flips the backend to ready (false in probe-only mode)
    pub marker_sets_ready: bool,
}

impl ReaderContext {
    fn record(&self, stream: LogStream, line: String) {
        debug!(pid = self.pid, stream = stream.as_str(), "{}", line);

        match self.ring.lock() {
            Ok(mut ring) => ring.push(stream, line.clone()),
            Err(poisoned) => poisoned.into_inner().push(stream, line.clone()),
        }

        let _ = self.event_tx.send(BackendEvent::Output {
            pid: self.pid,
            stream,
            line,
            timestamp: BackendEvent::current_timestamp(),
        });
    }

    fn marker_seen(&self, stream: LogStream) {
        if !self.marker_sets_ready {
            debug!(
                "Readiness marker seen on {} of {}; waiting for probe",
                stream.as_str(),
                self.pid
            );
            return;
        }
        if self.shared.mark_ready(self.generation) {
            info!(
                "Backend process {} reported ready on {}",
                self.pid,
                stream.as_str()
            );
        }
    }
}

/// Spawn a task draining `reader` until EOF or a read error
pub(crate) fn spawn_stream_reader(
    mut ctx: ReaderContext,
    mut reader: OutputReader,
    stream: LogStream,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut observer = OutputObserver::new();
        let mut buf = vec![0u8; READ_CHUNK];

        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    let chunk = &buf[..n];
                    for line in observer.push(chunk) {
                        ctx.record(stream, line);
                    }
                    let matched = ctx
                        .scanner
                        .as_mut()
                        .map(|scanner| scanner.feed(chunk))
                        .unwrap_or(false);
                    if matched {
                        ctx.scanner = None;
                        ctx.marker_seen(stream);
                    }
                }
                Err(e) => {
                    warn!(
                        "Error reading {} of backend process {}: {}",
                        stream.as_str(),
                        ctx.pid,
                        e
                    );
                    break;
                }
            }
        }

        if let Some(line) = observer.finish() {
            ctx.record(stream, line);
        }
        debug!("{} of backend process {} closed", stream.as_str(), ctx.pid);
    })
}

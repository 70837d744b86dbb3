//! Logging utilities: tracing setup and the bounded output ring kept for
//! backend diagnostics

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::info;

/// Initialize tracing for the application
///
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init_tracing(level: &str) -> crate::Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| crate::CoreError::InitializationError(e.to_string()))?;

    info!("Tracing initialized with level: {}", level);
    Ok(())
}

/// A single line captured from the backend's stdout/stderr
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Monotonic sequence number for the entry
    pub seq: u64,
    /// Stream kind (stdout or stderr)
    pub stream: schema::LogStream,
    /// Raw content of the line, without trailing newline
    pub content: String,
    /// Timestamp in RFC3339 format
    pub timestamp: String,
}

/// A bounded-capacity ring buffer holding the most recent output lines.
///
/// - When capacity is exceeded, oldest entries are dropped and `total_dropped` is incremented.
/// - Sequence numbers increase monotonically and are attached to each entry when pushed.
#[derive(Debug)]
pub struct LogRing {
    capacity: usize,
    total_dropped: u64,
    next_seq: u64,
    entries: VecDeque<LogEntry>,
}

impl LogRing {
    /// Create a new `LogRing` with the given capacity (clamped to at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            total_dropped: 0,
            next_seq: 0,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Push a new line into the ring, assigning the next sequence number.
    pub fn push(&mut self, stream: schema::LogStream, content: String) {
        let entry = LogEntry {
            seq: self.next_seq,
            stream,
            content,
            timestamp: schema::BackendEvent::current_timestamp(),
        };
        self.next_seq = self.next_seq.wrapping_add(1);

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.total_dropped = self.total_dropped.saturating_add(1);
        }
        self.entries.push_back(entry);
    }

    /// Current number of entries retained
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ring is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of entries ever dropped due to capacity
    pub fn total_dropped(&self) -> u64 {
        self.total_dropped
    }

    /// Snapshot the retained entries, oldest first
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Last `n` lines of one stream, oldest first
    pub fn tail(&self, stream: schema::LogStream, n: usize) -> Vec<String> {
        let mut lines: Vec<String> = self
            .entries
            .iter()
            .rev()
            .filter(|e| e.stream == stream)
            .take(n)
            .map(|e| e.content.clone())
            .collect();
        lines.reverse();
        lines
    }
}

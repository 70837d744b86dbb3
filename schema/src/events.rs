//! Events emitted by the backend supervisor
//!
//! Events are broadcast to any number of subscribers (launcher UI, logging,
//! tests). Delivery is best-effort: a subscriber that lags or drops its
//! receiver never blocks the supervisor.

use crate::backend::ProcessExit;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Events emitted over the backend lifecycle
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "eventType", rename_all = "camelCase")]
pub enum BackendEvent {
    /// The backend process has been spawned
    ProcessStarted {
        /// Process ID of the spawned backend
        pid: u32,
        /// Program that was executed
        command: String,
        /// Arguments passed to the program
        args: Vec<String>,
        /// Event timestamp in RFC3339 format
        timestamp: String,
    },

    /// A complete line was read from one of the output streams
    Output {
        /// Process ID that produced the line
        pid: u32,
        /// Stream the line came from
        stream: LogStream,
        /// Line content without the trailing newline
        line: String,
        /// Event timestamp in RFC3339 format
        timestamp: String,
    },

    /// The backend reached the ready state
    Ready {
        /// Process ID of the ready backend
        pid: u32,
        /// Milliseconds between spawn and readiness
        elapsed_ms: u64,
        /// Event timestamp in RFC3339 format
        timestamp: String,
    },

    /// Starting the backend failed
    StartFailed {
        /// Failure kind (`missingExecutable`, `timeout`, `processError`)
        kind: String,
        /// Failure description
        message: String,
        /// Event timestamp in RFC3339 format
        timestamp: String,
    },

    /// The backend process exited on its own
    Exited {
        /// Exit information
        exit: ProcessExit,
        /// Whether the backend had reached the ready state
        was_ready: bool,
    },

    /// Termination of the backend process was requested
    StopRequested {
        /// Process ID being terminated
        pid: u32,
        /// Event timestamp in RFC3339 format
        timestamp: String,
    },
}

/// Output stream of the backend process
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum LogStream {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

impl LogStream {
    /// Stream name as used in log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStream::Stdout => "stdout",
            LogStream::Stderr => "stderr",
        }
    }
}

impl BackendEvent {
    /// Process ID the event refers to, if any
    pub fn pid(&self) -> Option<u32> {
        match self {
            BackendEvent::ProcessStarted { pid, .. }
            | BackendEvent::Output { pid, .. }
            | BackendEvent::Ready { pid, .. }
            | BackendEvent::StopRequested { pid, .. } => Some(*pid),
            BackendEvent::Exited { exit, .. } => Some(exit.pid),
            BackendEvent::StartFailed { .. } => None,
        }
    }

    /// Event timestamp
    pub fn timestamp(&self) -> &str {
        match self {
            BackendEvent::ProcessStarted { timestamp, .. }
            | BackendEvent::Output { timestamp, .. }
            | BackendEvent::Ready { timestamp, .. }
            | BackendEvent::StartFailed { timestamp, .. }
            | BackendEvent::StopRequested { timestamp, .. } => timestamp,
            BackendEvent::Exited { exit, .. } => &exit.timestamp,
        }
    }

    /// Current timestamp in RFC3339 format (second precision, UTC)
    pub fn current_timestamp() -> String {
        humantime::format_rfc3339_seconds(SystemTime::now()).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagging() {
        let event = BackendEvent::Ready {
            pid: 42,
            elapsed_ms: 1200,
            timestamp: "2024-01-01T00:00:00Z".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["eventType"], "ready");
        assert_eq!(json["elapsedMs"], 1200);
    }

    #[test]
    fn test_event_pid() {
        let exit = ProcessExit {
            pid: 7,
            exit_code: Some(1),
            signal: None,
            timestamp: "2024-01-01T00:00:00Z".to_string(),
        };
        let exited = BackendEvent::Exited {
            exit,
            was_ready: true,
        };
        assert_eq!(exited.pid(), Some(7));
        assert_eq!(exited.timestamp(), "2024-01-01T00:00:00Z");

        let failed = BackendEvent::StartFailed {
            kind: "timeout".to_string(),
            message: "no marker".to_string(),
            timestamp: BackendEvent::current_timestamp(),
        };
        assert_eq!(failed.pid(), None);
    }

    #[test]
    fn test_current_timestamp_format() {
        let ts = BackendEvent::current_timestamp();
        assert!(ts.ends_with('Z'), "timestamp should be UTC: {ts}");
        assert!(!ts.ends_with("ZZ"));
        assert_eq!(ts.len(), "2024-01-01T00:00:00Z".len());
    }

    #[test]
    fn test_log_stream_names() {
        assert_eq!(LogStream::Stdout.as_str(), "stdout");
        assert_eq!(LogStream::Stderr.as_str(), "stderr");
        assert_eq!(serde_json::to_string(&LogStream::Stderr).unwrap(), "\"stderr\"");
    }
}

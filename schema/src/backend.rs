//! Backend specification and lifecycle state types
//!
//! This module contains the data structures describing how the backend
//! process is launched, how its readiness is detected, and which state the
//! supervisor currently reports for it.
//!
//! ## Backend Lifecycle
//!
//! - `Stopped`: No backend process is owned, or it has exited
//! - `Starting`: The process is running but has not signalled readiness
//! - `Ready`: The readiness marker (or probe) has been observed
//!
//! `Starting` may fall back to `Stopped` directly when the startup wait times
//! out or the process fails before becoming ready.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Marker line printed by uvicorn once the application has started
pub const DEFAULT_READY_MARKER: &str = "Application startup complete";

/// Port the backend HTTP server listens on
pub const DEFAULT_BACKEND_PORT: u16 = 8000;

/// Complete specification for the supervised backend process
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackendSpec {
    /// Run the bundled executable instead of interpreter + script
    #[serde(default)]
    pub packaged: bool,

    /// Interpreter used in unpackaged mode
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Script passed as the single positional argument in unpackaged mode
    #[serde(default = "default_script")]
    pub script: String,

    /// Executable launched in packaged mode, relative to `resourcesDir`
    #[serde(default = "default_executable")]
    pub executable: String,

    /// Base directory for resolving `script` (defaults to the config file's directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<String>,

    /// Resource directory for resolving `executable` (defaults to the launcher's directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources_dir: Option<String>,

    /// Extra arguments appended after the script/executable
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables added to the inherited environment
    #[serde(default)]
    pub environment: HashMap<String, String>,

    /// Working directory for the process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,

    /// Local port reserved for the backend HTTP server
    #[serde(default = "default_port")]
    pub port: u16,

    /// Literal text that signals the backend has finished initializing
    #[serde(default = "default_ready_marker")]
    pub ready_marker: String,

    /// Output stream(s) scanned for the readiness marker
    #[serde(default)]
    pub ready_stream: ReadyStream,

    /// How readiness is detected
    #[serde(default)]
    pub readiness: ReadinessStrategy,

    /// Maximum time to wait for readiness after spawning
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,

    /// Interval at which readiness is rechecked while waiting
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Per-attempt timeout for active readiness probes
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// What happens to the process when the startup wait times out
    #[serde(default)]
    pub timeout_policy: TimeoutPolicy,

    /// Number of output lines retained for diagnostics
    #[serde(default = "default_tail_capacity")]
    pub tail_capacity: usize,
}

impl BackendSpec {
    /// Get the startup timeout as a Duration
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    /// Get the poll interval as a Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get the probe timeout as a Duration
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for BackendSpec {
    fn default() -> Self {
        Self {
            packaged: false,
            interpreter: default_interpreter(),
            script: default_script(),
            executable: default_executable(),
            base_dir: None,
            resources_dir: None,
            args: Vec::new(),
            environment: HashMap::new(),
            working_directory: None,
            port: default_port(),
            ready_marker: default_ready_marker(),
            ready_stream: ReadyStream::default(),
            readiness: ReadinessStrategy::default(),
            startup_timeout_ms: default_startup_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            timeout_policy: TimeoutPolicy::default(),
            tail_capacity: default_tail_capacity(),
        }
    }
}

fn default_interpreter() -> String {
    if cfg!(windows) {
        "python".to_string()
    } else {
        "python3".to_string()
    }
}

fn default_script() -> String {
    "backend/main.py".to_string()
}

fn default_executable() -> String {
    if cfg!(windows) {
        "backend/backend.exe".to_string()
    } else {
        "backend/backend".to_string()
    }
}

const fn default_port() -> u16 {
    DEFAULT_BACKEND_PORT
}

fn default_ready_marker() -> String {
    DEFAULT_READY_MARKER.to_string()
}

const fn default_startup_timeout_ms() -> u64 {
    30_000
}

const fn default_poll_interval_ms() -> u64 {
    500
}

const fn default_probe_timeout_ms() -> u64 {
    2_000
}

const fn default_tail_capacity() -> usize {
    200
}

/// Current state of the backend as reported by the supervisor
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "camelCase")]
pub enum BackendState {
    /// No process, or the process has exited
    #[default]
    Stopped,
    /// Process spawned, readiness not yet observed
    Starting,
    /// Backend is able to accept requests
    Ready,
}

impl BackendState {
    /// Check if the backend is ready to handle requests
    pub fn is_ready(&self) -> bool {
        matches!(self, BackendState::Ready)
    }

    /// Check if a backend process is expected to be alive
    pub fn has_process(&self) -> bool {
        !matches!(self, BackendState::Stopped)
    }
}

/// Which output streams are scanned for the readiness marker
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ReadyStream {
    /// Only standard output
    #[default]
    Stdout,
    /// Standard output and standard error
    Both,
}

/// Strategy for deciding when the backend can accept requests
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum ReadinessStrategy {
    /// Ready when the marker text appears on the scanned output
    #[default]
    Marker,
    /// Ready when an active probe passes; the marker is only logged
    Probe {
        /// Probe run on each poll tick
        check: HealthCheckType,
    },
    /// Ready when either the probe passes or the marker appears
    ProbeOrMarker {
        /// Probe run on each poll tick
        check: HealthCheckType,
    },
}

impl ReadinessStrategy {
    /// Whether observing the marker flips the backend to ready
    pub fn accepts_marker(&self) -> bool {
        !matches!(self, ReadinessStrategy::Probe { .. })
    }

    /// The active probe, if the strategy has one
    pub fn probe(&self) -> Option<&HealthCheckType> {
        match self {
            ReadinessStrategy::Marker => None,
            ReadinessStrategy::Probe { check } | ReadinessStrategy::ProbeOrMarker { check } => {
                Some(check)
            }
        }
    }
}

/// Type of active readiness probe
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HealthCheckType {
    /// TCP connection check
    Tcp {
        /// Port to connect to (defaults to the backend port)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
    },
    /// HTTP GET request
    #[serde(rename_all = "camelCase")]
    Http {
        /// Port for the request (defaults to the backend port)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
        /// Path to request (default: "/health")
        #[serde(default = "default_health_path")]
        path: String,
        /// Accepted HTTP status codes (default: [200])
        #[serde(default = "default_success_codes")]
        success_codes: Vec<u16>,
        /// Text the response body must contain
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body_contains: Option<String>,
    },
}

impl HealthCheckType {
    /// Port the probe targets, falling back to `backend_port`
    pub fn port_or(&self, backend_port: u16) -> u16 {
        match self {
            HealthCheckType::Tcp { port } | HealthCheckType::Http { port, .. } => {
                port.unwrap_or(backend_port)
            }
        }
    }
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_success_codes() -> Vec<u16> {
    vec![200]
}

/// Cleanup policy applied when the startup wait times out
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TimeoutPolicy {
    /// Terminate the process before reporting the timeout
    #[default]
    Kill,
    /// Keep the process alive and owned by the supervisor
    LeaveRunning,
}

/// Information about a backend process exit
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessExit {
    /// Process ID that exited
    pub pid: u32,

    /// Exit code (None if killed by signal)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Signal that killed the process (Unix only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,

    /// Timestamp when the exit was detected
    pub timestamp: String,
}

impl ProcessExit {
    /// Check if this represents a successful exit (code 0)
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Short human-readable description ("exit code 1", "signal 9")
    pub fn describe(&self) -> String {
        match (self.exit_code, self.signal) {
            (Some(code), _) => format!("exit code {}", code),
            (None, Some(signal)) => format!("signal {}", signal),
            (None, None) => "unknown status".to_string(),
        }
    }
}

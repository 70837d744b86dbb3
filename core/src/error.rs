//! Core error types and utilities

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Core-specific error types
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Initialization error: {0}")]
    InitializationError(String),

    #[error("Process spawn error: {0}")]
    ProcessSpawn(String),

    #[error("Process signal error: {0}")]
    ProcessSignal(String),

    #[error("Process wait error: {0}")]
    ProcessWait(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CoreError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::ConfigurationError(_) => "CORE001",
            CoreError::ValidationError(_) => "CORE002",
            CoreError::InitializationError(_) => "CORE003",
            CoreError::ProcessSpawn(_) => "CORE004",
            CoreError::ProcessSignal(_) => "CORE005",
            CoreError::ProcessWait(_) => "CORE006",
            CoreError::IoError(_) => "CORE007",
        }
    }
}

/// Core-specific result type
pub type Result<T> = std::result::Result<T, CoreError>;

/// Distinguishable failure kinds of a backend start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StartupErrorKind {
    /// The resolved executable or script does not exist
    MissingExecutable,
    /// Readiness was not observed within the startup window
    Timeout,
    /// The process failed before becoming ready
    ProcessError,
}

impl StartupErrorKind {
    /// Stable camelCase name, used in events and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            StartupErrorKind::MissingExecutable => "missingExecutable",
            StartupErrorKind::Timeout => "timeout",
            StartupErrorKind::ProcessError => "processError",
        }
    }
}

/// Errors returned by `BackendSupervisor::start`
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("backend executable not found: {}", path.display())]
    MissingExecutable {
        /// Path that was resolved and checked
        path: PathBuf,
    },

    #[error("backend did not become ready within {waited:?}")]
    Timeout {
        /// Length of the startup window
        waited: Duration,
    },

    #[error("backend process failed before becoming ready: {0}")]
    ProcessError(String),
}

impl StartupError {
    /// The failure kind
    pub fn kind(&self) -> StartupErrorKind {
        match self {
            StartupError::MissingExecutable { .. } => StartupErrorKind::MissingExecutable,
            StartupError::Timeout { .. } => StartupErrorKind::Timeout,
            StartupError::ProcessError(_) => StartupErrorKind::ProcessError,
        }
    }

    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self.kind() {
            StartupErrorKind::MissingExecutable => "START001",
            StartupErrorKind::Timeout => "START002",
            StartupErrorKind::ProcessError => "START003",
        }
    }
}

impl From<CoreError> for StartupError {
    fn from(err: CoreError) -> Self {
        StartupError::ProcessError(err.to_string())
    }
}

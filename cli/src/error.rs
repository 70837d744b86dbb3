//! CLI error types

use tether_core::health::HealthError;
use tether_core::{CoreError, StartupError};
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] CoreError),

    #[error("Backend failed to start: {0}")]
    StartFailed(#[from] StartupError),

    #[error("Backend stopped unexpectedly")]
    BackendExited,

    #[error("Probe failed: {0}")]
    ProbeFailed(#[from] HealthError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CliError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CliError::InvalidArgument(_) => "CLI002",
            CliError::ConfigError(_) => "CLI003",
            CliError::StartFailed(e) => e.code(),
            CliError::BackendExited => "CLI005",
            CliError::ProbeFailed(_) => "CLI006",
            CliError::IoError(_) => "CLI008",
        }
    }
}

/// CLI-specific result type
pub type Result<T> = std::result::Result<T, CliError>;

//! Error types for readiness probes

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while probing the backend
#[derive(Error, Debug)]
pub enum HealthError {
    /// The probe timed out
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// TCP connection failed
    #[error("tcp connection failed: {0}")]
    Tcp(#[from] std::io::Error),

    /// HTTP request failed
    #[error("http request failed: {0}")]
    Http(#[from] hyper::Error),

    /// The probe URL could not be parsed
    #[error("invalid probe url: {0}")]
    InvalidUri(#[from] hyper::http::uri::InvalidUri),

    /// The probe request could not be built
    #[error("invalid probe request: {0}")]
    Request(#[from] hyper::http::Error),

    /// The response status did not match the expectation
    #[error("unexpected status code {0}")]
    UnexpectedStatus(u16),

    /// The response body did not contain the expected text
    #[error("response body did not match expectation")]
    BodyMismatch,
}

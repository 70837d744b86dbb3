//! Core types and traits for readiness probing

use super::HealthError;
use async_trait::async_trait;

/// Expectation for HTTP response validation
#[derive(Debug, Clone, PartialEq)]
pub enum Expect {
    /// Accept any 2xx status code (200-299)
    Any2xx,
    /// Require a specific status code
    Status(u16),
    /// Accept any of the listed status codes
    OneOf(Vec<u16>),
    /// Require a 2xx response whose body contains specific text
    BodyContains(String),
}

impl Expect {
    /// Build the expectation for a configured code list and optional body text
    pub fn from_codes(success_codes: &[u16], body_contains: Option<&str>) -> Self {
        if let Some(text) = body_contains {
            return Expect::BodyContains(text.to_string());
        }
        match success_codes {
            [] => Expect::Any2xx,
            [code] => Expect::Status(*code),
            codes => Expect::OneOf(codes.to_vec()),
        }
    }

    /// Check if a status code matches this expectation
    pub fn matches_status(&self, status: u16) -> bool {
        match self {
            Expect::Any2xx | Expect::BodyContains(_) => (200..=299).contains(&status),
            Expect::Status(expected) => status == *expected,
            Expect::OneOf(codes) => codes.contains(&status),
        }
    }

    /// Check if response body matches this expectation
    pub fn matches_body(&self, body: &str) -> bool {
        match self {
            Expect::BodyContains(expected) => body.contains(expected),
            _ => true,
        }
    }
}

/// Trait for readiness probe implementations
///
/// Implemented by the TCP and HTTP probes so the supervisor can run whichever
/// one is configured on each poll tick.
#[async_trait]
pub trait Probe: std::fmt::Debug {
    /// Execute the probe
    ///
    /// Returns `Ok(())` if the check passes, or an error describing what went wrong.
    /// The implementation should respect its configured timeout.
    async fn check(&self) -> Result<(), HealthError>;
}

//! Readiness probing against the backend's network endpoint
//!
//! The supervisor polls one of these probes while waiting for the backend
//! when the readiness strategy is `probe` or `probeOrMarker`.
//!
//! - [`Probe`]: the trait the supervisor drives on each poll tick
//! - [`TcpProbe`]: passes once the port accepts a connection
//! - [`HttpProbe`]: passes once a GET returns an accepted response
//! - [`Expect`]: acceptance criteria for HTTP responses

pub mod error;
pub mod http;
pub mod tcp;
pub mod types;

pub use error::HealthError;
pub use http::HttpProbe;
pub use tcp::TcpProbe;
pub use types::{Expect, Probe};

use schema::HealthCheckType;
use std::time::Duration;

/// Host all probes target; the backend is always local to the launcher
pub const PROBE_HOST: &str = "127.0.0.1";

/// Build a probe for the configured check
///
/// `backend_port` is used when the check does not name its own port.
pub fn create_probe(
    check: &HealthCheckType,
    backend_port: u16,
    timeout: Duration,
) -> Box<dyn Probe + Send + Sync> {
    let port = check.port_or(backend_port);
    match check {
        HealthCheckType::Tcp { .. } => Box::new(TcpProbe::local(port, timeout)),
        HealthCheckType::Http {
            path,
            success_codes,
            body_contains,
            ..
        } => {
            let url = format!("http://{}:{}{}", PROBE_HOST, port, path);
            let expect = Expect::from_codes(success_codes, body_contains.as_deref());
            Box::new(HttpProbe::new(url, expect, timeout))
        }
    }
}

/// Build and run a probe once
pub async fn probe_once(
    check: &HealthCheckType,
    backend_port: u16,
    timeout: Duration,
) -> Result<(), HealthError> {
    create_probe(check, backend_port, timeout).check().await
}

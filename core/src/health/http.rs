//! HTTP readiness probing against the backend's health endpoint

use async_trait::async_trait;
use hyper::{Body, Client, Method, Request, Uri};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

use super::{Expect, HealthError, Probe};

/// HTTP probe that issues GET requests and validates the response
///
/// A passing probe means the backend's HTTP server is accepting requests,
/// which is a stronger signal than the startup marker on its console.
///
/// # Example
///
/// ```rust
/// use tether_core::health::{HttpProbe, Expect, Probe};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let probe = HttpProbe::new(
///     "http://127.0.0.1:8000/health",
///     Expect::Status(200),
///     Duration::from_secs(2),
/// );
///
/// match probe.check().await {
///     Ok(()) => println!("backend is serving"),
///     Err(e) => println!("backend not ready: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpProbe {
    url: String,
    expect: Expect,
    timeout: Duration,
}

impl HttpProbe {
    /// Create a new HTTP probe
    pub fn new(url: impl Into<String>, expect: Expect, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            expect,
            timeout,
        }
    }

    /// Get the target URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get the expected response criteria
    pub fn expect(&self) -> &Expect {
        &self.expect
    }

    async fn request(&self) -> Result<(), HealthError> {
        let uri: Uri = self.url.parse()?;
        let req = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())?;

        let response = Client::new().request(req).await?;
        let status = response.status().as_u16();
        debug!("HTTP probe to {} returned status {}", self.url, status);

        if !self.expect.matches_status(status) {
            return Err(HealthError::UnexpectedStatus(status));
        }

        if let Expect::BodyContains(_) = &self.expect {
            let bytes = hyper::body::to_bytes(response.into_body()).await?;
            let body = String::from_utf8_lossy(&bytes);
            if !self.expect.matches_body(&body) {
                return Err(HealthError::BodyMismatch);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self) -> Result<(), HealthError> {
        debug!("HTTP probe requesting {}", self.url);

        match timeout(self.timeout, self.request()).await {
            Ok(result) => result,
            Err(_elapsed) => {
                debug!("HTTP probe to {} timed out after {:?}", self.url, self.timeout);
                Err(HealthError::Timeout(self.timeout))
            }
        }
    }
}

//! TCP readiness probing
//!
//! The weakest active readiness signal: something accepts connections on the
//! backend port. It is the fallback the launcher's `probe` command uses when
//! no probe strategy is configured.

use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::{HealthError, Probe};

/// Passes once a TCP connection to `addr` can be established
#[derive(Debug, Clone)]
pub struct TcpProbe {
    addr: SocketAddr,
    timeout: Duration,
}

impl TcpProbe {
    /// Probe an arbitrary socket address
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    /// Probe `port` on the loopback interface, where the backend listens
    pub fn local(port: u16, timeout: Duration) -> Self {
        Self::new(SocketAddr::from((Ipv4Addr::LOCALHOST, port)), timeout)
    }

    /// Address the probe connects to
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn check(&self) -> Result<(), HealthError> {
        let connected = timeout(self.timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| HealthError::Timeout(self.timeout))?;
        match connected {
            // Dropping the stream closes the connection again
            Ok(_stream) => Ok(()),
            Err(e) => {
                debug!("Backend port {} not accepting connections: {}", self.addr, e);
                Err(HealthError::Tcp(e))
            }
        }
    }
}

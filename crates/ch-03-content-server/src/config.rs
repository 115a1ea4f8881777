//! Content server configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use shared_types::ServiceRole;

/// Where a content server listens and what it serves.
#[derive(Debug, Clone)]
pub struct ContentServerConfig {
    pub role: ServiceRole,
    pub bind_host: IpAddr,
    /// 0 = ephemeral.
    pub port: u16,
    pub content_root: PathBuf,
    /// Upper bound on waiting for the accept loop to wind down on stop.
    pub stop_timeout: Duration,
}

impl ContentServerConfig {
    /// Loopback listener on an ephemeral port.
    #[must_use]
    pub fn new(role: ServiceRole, content_root: impl Into<PathBuf>) -> Self {
        Self {
            role,
            bind_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            content_root: content_root.into(),
            stop_timeout: Duration::from_secs(2),
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_bind_host(mut self, host: IpAddr) -> Self {
        self.bind_host = host;
        self
    }

    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.port)
    }
}

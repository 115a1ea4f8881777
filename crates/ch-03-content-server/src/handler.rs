//! Connection handling port.

use std::net::SocketAddr;
use std::path::PathBuf;

use async_trait::async_trait;
use shared_types::ServiceRole;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Serves one accepted connection. The real content application plugs in
/// here; the bus only owns the listener.
#[async_trait]
pub trait ConnectionHandler: Send + Sync {
    async fn handle(&self, stream: TcpStream, peer: SocketAddr) -> std::io::Result<()>;
}

/// Answers every request with a short plain-text status page.
#[derive(Debug, Clone)]
pub struct StatusPageHandler {
    role: ServiceRole,
    content_root: PathBuf,
}

impl StatusPageHandler {
    #[must_use]
    pub fn new(role: ServiceRole, content_root: impl Into<PathBuf>) -> Self {
        Self {
            role,
            content_root: content_root.into(),
        }
    }

    fn body(&self) -> String {
        format!(
            "{} content server for {}\n",
            self.role,
            self.content_root.display()
        )
    }
}

#[async_trait]
impl ConnectionHandler for StatusPageHandler {
    async fn handle(&self, mut stream: TcpStream, _peer: SocketAddr) -> std::io::Result<()> {
        // The request itself is irrelevant; read what is there so the
        // client sees a clean close.
        let mut request = [0u8; 1024];
        let _ = stream.read(&mut request).await?;

        let body = self.body();
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await?;
        stream.shutdown().await
    }
}

//! TCP transport

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use punchsync_core::constants::DEFAULT_CONNECT_TIMEOUT;

use crate::{error::*, Connection, Connector};

/// TCP connector for punch-clock terminals
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Create new TCP connector
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT),
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Resolve address to SocketAddr
    async fn resolve_addr(addr: &str, port: u16) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", addr, port);

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(&addr_str)
            .await
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?
            .collect();

        addrs
            .first()
            .copied()
            .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, addr: &str, port: u16) -> Result<Connection> {
        let socket_addr = timeout(self.connect_timeout, Self::resolve_addr(addr, port))
            .await
            .map_err(|_| Error::ConnectionTimeout)??;

        debug!("Connecting to {}...", socket_addr);

        let stream = timeout(self.connect_timeout, TcpStream::connect(socket_addr))
            .await
            .map_err(|_| Error::ConnectionTimeout)?
            .map_err(Error::Io)?;

        // Punch lines are tiny; don't let Nagle hold the SYNC command back
        stream.set_nodelay(true)?;

        debug!("Connected to {}", socket_addr);

        let (reader, writer) = stream.into_split();
        Ok(Connection {
            reader: Box::new(reader),
            writer: Box::new(writer),
            peer: socket_addr.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_connector_invalid_address() {
        let connector = TcpConnector::new()
            .with_connect_timeout(Duration::from_millis(100));

        let result = connector.connect("invalid..address", 4370).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_tcp_connector_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = TcpConnector::new().connect("127.0.0.1", port).await;
        assert!(matches!(result, Err(Error::Io(_)) | Err(Error::ConnectionTimeout)));
    }

    #[tokio::test]
    async fn test_tcp_connector_halves() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let device = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"U1,2024-03-01 08:00:00,1\n").await.unwrap();
            let mut command = [0u8; 5];
            socket.read_exact(&mut command).await.unwrap();
            command
        });

        let mut connection = TcpConnector::new().connect("127.0.0.1", port).await.unwrap();
        assert_eq!(connection.peer, format!("127.0.0.1:{}", port));

        let mut line = vec![0u8; 25];
        connection.reader.read_exact(&mut line).await.unwrap();
        assert_eq!(&line, b"U1,2024-03-01 08:00:00,1\n");

        connection.writer.write_all(b"SYNC\n").await.unwrap();
        assert_eq!(&device.await.unwrap(), b"SYNC\n");
    }
}

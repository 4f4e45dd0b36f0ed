//! Transport layer for punch-clock terminals
//!
//! Opens byte-stream connections to devices. A connection is handed out as
//! independent read and write halves so a link can wait for inbound punches
//! while writing commands.

pub mod error;
pub mod tcp;

pub use error::{Error, Result};
pub use tcp::TcpConnector;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Inbound half of a connection
pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;

/// Outbound half of a connection
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An open connection to one device
pub struct Connection {
    pub reader: BoxReader,
    pub writer: BoxWriter,
    /// Remote address as resolved
    pub peer: String,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("peer", &self.peer).finish()
    }
}

/// Opens connections to devices
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `addr:port`
    async fn connect(&self, addr: &str, port: u16) -> Result<Connection>;
}

//! Per-device connection state
//!
//! The state cell is written only by the link that owns the device's
//! connection. Anyone else holding a clone (the coordinator) only reads it.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Connection state of one device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection and no attempt in progress
    Disconnected,

    /// Connection attempt in progress
    Connecting,

    /// Socket open, punches flowing
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
        }
    }
}

/// Shared connection state cell
///
/// Thread-safe and can be cloned cheaply (Arc internally).
#[derive(Debug, Clone)]
pub struct LinkState {
    inner: Arc<parking_lot::RwLock<ConnectionState>>,
}

impl LinkState {
    /// Create a new disconnected state cell
    pub fn new() -> Self {
        Self {
            inner: Arc::new(parking_lot::RwLock::new(ConnectionState::Disconnected)),
        }
    }

    /// Get current state
    pub fn get(&self) -> ConnectionState {
        *self.inner.read()
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        matches!(self.get(), ConnectionState::Connected)
    }

    /// Claim the cell for a connection attempt
    ///
    /// Returns `false` if an attempt is already running or the device is
    /// connected, so concurrent sweeps never dial the same device twice.
    pub fn begin_connect(&self) -> bool {
        let mut state = self.inner.write();

        if *state != ConnectionState::Disconnected {
            return false;
        }

        *state = ConnectionState::Connecting;
        true
    }

    /// Mark the attempt as successful
    pub fn mark_connected(&self) -> Result<()> {
        let mut state = self.inner.write();

        if *state != ConnectionState::Connecting {
            return Err(Error::InvalidState(
                format!("Cannot mark connected from state: {}", *state)
            ));
        }

        *state = ConnectionState::Connected;
        Ok(())
    }

    /// Connection failed or closed
    pub fn mark_disconnected(&self) {
        *self.inner.write() = ConnectionState::Disconnected;
    }
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new()
    }
}

//! Commands sent from the service to a terminal

use std::fmt;

/// Outbound command
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    /// Ask the terminal to push any punches it has buffered
    Sync,
}

impl Command {
    /// Exact bytes written to the socket
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Sync => b"SYNC\n",
        }
    }

    /// Get command name
    pub fn name(self) -> &'static str {
        match self {
            Self::Sync => "SYNC",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

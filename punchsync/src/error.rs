//! High-level error types

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] punchsync_core::Error),
    
    #[error("Transport error: {0}")]
    Transport(#[from] punchsync_transport::Error),
    
    #[error("Type error: {0}")]
    Types(#[from] punchsync_types::Error),
    
    #[error("Device directory error: {0}")]
    Directory(String),
    
    #[error("Attendance store error: {0}")]
    Store(String),
    
    #[error("Invalid configuration: {0}")]
    Config(String),
    
    #[error("Failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
    
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    
    #[error("Sync coordinator already running")]
    AlreadyRunning,
    
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Device {0} is already connected or connecting")]
    LinkBusy(String),
}

impl Error {
    /// Network-level failure; the next sweep retries it
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

//! Error types for punchsync-core

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Record has fewer fields than the protocol requires
    #[error("Malformed record: expected at least {expected} fields, got {actual}")]
    TooFewFields {
        expected: usize,
        actual: usize,
    },
    
    /// Record has an empty user id
    #[error("Malformed record: empty user id")]
    EmptyUserId,
    
    /// Record bytes are not valid UTF-8
    #[error("Malformed record: not valid UTF-8 ({0})")]
    InvalidEncoding(String),
    
    /// Partial record grew past the framing limit
    #[error("Record too long: {size} bytes (max: {max} bytes)")]
    LineTooLong {
        size: usize,
        max: usize,
    },
    
    /// Invalid connection state transition
    #[error("Invalid connection state: {0}")]
    InvalidState(String),

    /// Field-level error from the data model
    #[error("Malformed record: {0}")]
    Types(#[from] punchsync_types::Error),
}

//! # punchsync-core
//!
//! Core protocol implementation for networked punch-clock terminals.
//!
//! This crate provides the low-level protocol primitives:
//! - Line-oriented punch record decoding
//! - Framing of records split across network reads
//! - Outbound command definitions
//! - Per-device connection state

pub mod command;
pub mod constants;
pub mod decoder;
pub mod error;
pub mod state;

pub use command::Command;
pub use decoder::{decode, decode_line, Decoder, LineBuffer};
pub use error::{Error, Result};
pub use state::{ConnectionState, LinkState};

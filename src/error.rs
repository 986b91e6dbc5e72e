//! Error types for brickbus.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for brickbus operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for brickbus.
#[derive(Error, Debug)]
pub enum Error {
    // Connection errors
    #[error("connect failed to {addr}: {reason}")]
    ConnectFailed { addr: String, reason: String },

    #[error("socket write failed: {0}")]
    WriteFailed(String),

    #[error("socket read failed: {0}")]
    ReadFailed(String),

    #[error("no reply within {0:?}")]
    Timeout(Duration),

    #[error("connection closed")]
    Closed,

    // Correlation errors
    #[error("sequence number {sequence} reused for uid {uid} function {function}")]
    SequenceCollision { uid: u32, function: u8, sequence: u8 },

    // Wire format errors
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Packet framing, encoding and decoding errors.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("truncated frame: need {needed} bytes, have {got}")]
    TruncatedFrame { needed: usize, got: usize },

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("payload exhausted: field needs {needed} bytes, {got} remain")]
    PayloadExhausted { needed: usize, got: usize },

    #[error("invalid UID encoding: {0}")]
    InvalidUid(String),

    // Error codes reported by the device in the response header
    #[error("device reported an invalid parameter")]
    InvalidParameter,

    #[error("device does not support this function")]
    FunctionNotSupported,
}

impl Error {
    /// Check if the error terminates the connection (further sends will fail).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Error::WriteFailed(_) | Error::ReadFailed(_) | Error::Closed
        )
    }
}

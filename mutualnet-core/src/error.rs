//! Mutualnet error types.
//!
//! Comprehensive error handling for transport, wire-format, and overlay
//! operations shared across the mutualnet crates.

use std::io;
use thiserror::Error;

/// Main error type for mutualnet-core operations.
#[derive(Error, Debug)]
pub enum MutualNetError {
    /// IO error during socket operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed or undecodable wire message.
    #[error("wire decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A reply exceeded the 1 KiB bounded recv limit.
    #[error("reply exceeded bounded recv limit ({0} bytes)")]
    ReplyTooLarge(usize),

    /// `send` exhausted its retry budget without success.
    #[error("send to {addr}:{port} failed after {attempts} attempts")]
    SendExhausted {
        addr: String,
        port: u16,
        attempts: u32,
    },

    /// Timer/channel plumbing error (processor FIFO gone away).
    #[error("processor channel closed")]
    ChannelClosed,

    /// Generic protocol violation (unexpected action, missing field, etc).
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Result type alias for mutualnet-core operations.
pub type Result<T> = std::result::Result<T, MutualNetError>;

impl MutualNetError {
    /// Construct a protocol error from any displayable message.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Whether retrying the same operation might succeed (connection-level
    /// hiccups), as opposed to a structural failure.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Whether this failure means "the peer is unreachable" as far as the
    /// overlay's failure-detection policy (election / peer-list pruning)
    /// is concerned.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Io(_) | Self::SendExhausted { .. })
    }
}

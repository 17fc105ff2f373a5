//! Error types for the engine.
//!
//! Connection-level failures are internal to the I/O task: they are
//! caught at the loop boundary and converted into a log event plus a
//! single `Disconnected` event, never a panic across the task boundary.

use thiserror::Error;

/// Errors produced while establishing or driving a connection.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Host resolution failed or produced no usable addresses.
    #[error("cannot resolve {host}:{port}")]
    Resolve {
        /// The hostname that failed to resolve.
        host: String,
        /// The requested port.
        port: u16,
    },

    /// Every resolved address refused the connection.
    #[error("unable to connect to {host}:{port}")]
    Connect {
        /// The target hostname.
        host: String,
        /// The target port.
        port: u16,
    },
}

/// Errors encountered when parsing IRC lines.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageParseError {
    /// Message was empty.
    #[error("empty message")]
    EmptyMessage,

    /// Command token was missing.
    #[error("invalid command")]
    InvalidCommand,
}

//! Error types for PULSE protocol.

use thiserror::Error;

use crate::message::CodecError;

#[cfg(feature = "transport")]
use crate::transport::TransportError;

#[cfg(feature = "client")]
use crate::client::ClientError;

#[cfg(feature = "server")]
use crate::server::ServerError;

/// Top-level PULSE errors.
#[derive(Debug, Error)]
pub enum PulseError {
    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Transport error.
    #[cfg(feature = "transport")]
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Client session error.
    #[cfg(feature = "client")]
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// Server error.
    #[cfg(feature = "server")]
    #[error("server error: {0}")]
    Server(#[from] ServerError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for PULSE operations.
pub type PulseResult<T> = Result<T, PulseError>;

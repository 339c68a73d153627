//! Transport layer error types.

use std::io;

use thiserror::Error;

/// Transport layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not establish the transport (handshake, bind, or association).
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Target address as given by the caller.
        addr: String,
        /// Underlying cause.
        #[source]
        source: io::Error,
    },

    /// Address did not resolve to anything usable.
    #[error("cannot resolve address: {0}")]
    Resolve(String),

    /// I/O error (socket operations).
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// No record arrived before the read deadline.
    #[error("read timed out")]
    ReadTimeout,

    /// Peer closed the connection, or the transport was closed locally.
    #[error("connection closed")]
    Closed,

    /// A stream record exceeded the size limit without a terminator.
    #[error("record exceeds {limit} bytes")]
    RecordTooLarge {
        /// Size limit in bytes.
        limit: usize,
    },
}

impl TransportError {
    /// Check if this error is an expired read deadline.
    ///
    /// Timeouts are routine during the heartbeat retry loop.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::ReadTimeout)
    }

    /// Check if this error is fatal to the transport.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::Closed | TransportError::RecordTooLarge { .. }
        )
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_errors() {
        assert!(TransportError::ReadTimeout.is_timeout());
        assert!(!TransportError::Closed.is_timeout());
        assert!(!TransportError::Io(io::Error::other("test")).is_timeout());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(TransportError::Closed.is_fatal());
        assert!(TransportError::RecordTooLarge { limit: 16 }.is_fatal());

        assert!(!TransportError::ReadTimeout.is_fatal());
        assert!(!TransportError::Io(io::Error::other("test")).is_fatal());
    }

    #[test]
    fn test_connect_error_display() {
        let err = TransportError::Connect {
            addr: "localhost:9000".into(),
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert_eq!(err.to_string(), "failed to connect to localhost:9000: refused");
    }
}

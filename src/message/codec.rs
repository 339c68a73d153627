//! Record framing for stream and datagram transports.
//!
//! Stream transports carry one record per line: the JSON object followed by a
//! single `\n`. Datagram transports carry exactly one record per datagram with
//! no terminator.

use thiserror::Error;

use super::types::{Message, MessageKind};
use crate::core::constants::RECORD_DELIMITER;

/// Message encoding/decoding errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The payload is not a well-formed PULSE record.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The record decoded, but is not the kind the caller expected.
    #[error("unexpected message kind: expected {expected}, got {actual}")]
    UnexpectedKind {
        /// Kind the caller asked for.
        expected: MessageKind,
        /// Kind that arrived.
        actual: MessageKind,
    },

    /// Serialization failed.
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Record boundary convention of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Newline-terminated records on a byte stream (TCP).
    Stream,
    /// One record per datagram, no terminator (UDP).
    Datagram,
}

impl Framing {
    /// Encode a message into one record.
    pub fn encode(&self, msg: &Message) -> Result<Vec<u8>, CodecError> {
        let mut buf = serde_json::to_vec(msg).map_err(|e| CodecError::Encode(e.to_string()))?;
        if *self == Framing::Stream {
            buf.push(RECORD_DELIMITER);
        }
        Ok(buf)
    }

    /// Encode anything convertible into a [`Message`].
    pub fn encode_as(&self, msg: impl Into<Message>) -> Result<Vec<u8>, CodecError> {
        self.encode(&msg.into())
    }

    /// Decode exactly one record.
    ///
    /// On stream framing a single trailing `\n` (or `\r\n`) is stripped first.
    /// Datagram payloads are decoded as-is.
    pub fn decode(&self, data: &[u8]) -> Result<Message, CodecError> {
        let record = match self {
            Framing::Stream => strip_delimiter(data),
            Framing::Datagram => data,
        };

        if record.is_empty() {
            return Err(CodecError::Malformed("empty record".into()));
        }

        serde_json::from_slice(record).map_err(|e| CodecError::Malformed(e.to_string()))
    }

    /// Decode one record and require a specific kind.
    pub fn decode_as<T>(&self, data: &[u8]) -> Result<T, CodecError>
    where
        T: TryFrom<Message, Error = CodecError>,
    {
        T::try_from(self.decode(data)?)
    }
}

fn strip_delimiter(data: &[u8]) -> &[u8] {
    let data = data.strip_suffix(&[RECORD_DELIMITER]).unwrap_or(data);
    data.strip_suffix(b"\r").unwrap_or(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{AckMessage, AckStatus, AuthMessage, TimeMessage};

    #[test]
    fn test_stream_record_ends_with_single_newline() {
        let encoded = Framing::Stream
            .encode_as(AuthMessage::new("alice", "secret"))
            .unwrap();
        assert_eq!(encoded.last(), Some(&b'\n'));
        assert_eq!(encoded.iter().filter(|&&b| b == b'\n').count(), 1);
    }

    #[test]
    fn test_datagram_record_has_no_terminator() {
        let encoded = Framing::Datagram.encode_as(AckMessage::TIME).unwrap();
        assert_ne!(encoded.last(), Some(&b'\n'));
        assert_eq!(encoded, br#"{"kind":"ack","status":"ACK_TIME"}"#);
    }

    #[test]
    fn test_newline_inside_field_is_escaped() {
        let encoded = Framing::Stream
            .encode_as(AuthMessage::new("multi\nline", "pa\nss"))
            .unwrap();
        assert_eq!(encoded.iter().filter(|&&b| b == b'\n').count(), 1);

        let decoded: AuthMessage = Framing::Stream.decode_as(&encoded).unwrap();
        assert_eq!(decoded.username, "multi\nline");
    }

    #[test]
    fn test_stream_accepts_crlf() {
        let decoded = Framing::Stream
            .decode(b"{\"kind\":\"ack\",\"status\":\"OK\"}\r\n")
            .unwrap();
        assert_eq!(decoded, Message::Ack(AckMessage::new(AckStatus::Ok)));
    }

    #[test]
    fn test_decode_rejects_two_records() {
        let mut data = Framing::Stream.encode_as(AckMessage::TIME).unwrap();
        data.extend(Framing::Stream.encode_as(AckMessage::AUTH).unwrap());
        assert!(matches!(
            Framing::Stream.decode(&data),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let err = Framing::Datagram
            .decode(br#"{"kind":"auth","username":"alice"}"#)
            .unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn test_missing_kind_is_malformed() {
        let err = Framing::Datagram
            .decode(br#"{"username":"alice","password":"secret"}"#)
            .unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn test_invalid_timestamp_is_malformed() {
        let err = Framing::Datagram
            .decode(br#"{"kind":"time","timestamp":"yesterday"}"#)
            .unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn test_timestamp_with_offset_normalizes_to_utc() {
        let time: TimeMessage = Framing::Datagram
            .decode_as(br#"{"kind":"time","timestamp":"2024-05-01T14:00:00+02:00"}"#)
            .unwrap();
        assert_eq!(time.timestamp.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_timestamp_without_offset_is_utc() {
        let time: TimeMessage = Framing::Datagram
            .decode_as(br#"{"kind":"time","timestamp":"2024-05-01T12:00:00.5"}"#)
            .unwrap();
        assert_eq!(time.timestamp.to_rfc3339(), "2024-05-01T12:00:00.500+00:00");
    }

    #[test]
    fn test_empty_record_is_malformed() {
        assert!(matches!(
            Framing::Stream.decode(b"\n"),
            Err(CodecError::Malformed(_))
        ));
        assert!(matches!(
            Framing::Datagram.decode(b""),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_as_wrong_kind() {
        let data = Framing::Stream.encode_as(TimeMessage::now()).unwrap();
        let err = Framing::Stream.decode_as::<AuthMessage>(&data).unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedKind { .. }));
    }
}

//! PULSE message types.
//!
//! Every record on the wire is a JSON object carrying an explicit `kind`
//! discriminant next to the variant's own fields:
//!
//! ```text
//! {"kind":"auth","username":"alice","password":"secret"}
//! {"kind":"time","timestamp":"2024-05-01T12:00:00.123456789Z"}
//! {"kind":"ack","status":"ACK_TIME"}
//! ```

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};

use super::codec::CodecError;

/// Credentials sent once at session start.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthMessage {
    /// Account name.
    pub username: String,
    /// Account password (plain text; the wire is not encrypted).
    pub password: String,
}

impl AuthMessage {
    /// Create a new auth message.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for AuthMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthMessage")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Heartbeat report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeMessage {
    /// Instant the heartbeat was produced.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// RFC 3339 with any offset, or a bare local date-time read as UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    raw.parse::<NaiveDateTime>()
        .map(|naive| naive.and_utc())
        .map_err(|e| de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
}

impl TimeMessage {
    /// Create a time message for the given instant.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self { timestamp }
    }

    /// Create a time message stamped with the current instant.
    pub fn now() -> Self {
        Self::new(Utc::now())
    }
}

/// Acknowledgment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AckStatus {
    /// Generic acknowledgment.
    Ok,
    /// Credentials accepted.
    AckAuth,
    /// Heartbeat received.
    AckTime,
}

impl fmt::Display for AckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AckStatus::Ok => "OK",
            AckStatus::AckAuth => "ACK_AUTH",
            AckStatus::AckTime => "ACK_TIME",
        };
        f.write_str(s)
    }
}

/// Server reply to an auth or time message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckMessage {
    /// What is being acknowledged.
    pub status: AckStatus,
}

impl AckMessage {
    /// Acknowledge a successful authentication.
    pub const AUTH: Self = Self {
        status: AckStatus::AckAuth,
    };

    /// Acknowledge a heartbeat.
    pub const TIME: Self = Self {
        status: AckStatus::AckTime,
    };

    /// Create an ack with the given status.
    pub fn new(status: AckStatus) -> Self {
        Self { status }
    }
}

/// Message kind discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// [`AuthMessage`].
    Auth,
    /// [`TimeMessage`].
    Time,
    /// [`AckMessage`].
    Ack,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageKind::Auth => "auth",
            MessageKind::Time => "time",
            MessageKind::Ack => "ack",
        };
        f.write_str(s)
    }
}

/// Any PULSE record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// Client credentials.
    Auth(AuthMessage),
    /// Client heartbeat.
    Time(TimeMessage),
    /// Server acknowledgment.
    Ack(AckMessage),
}

impl Message {
    /// The discriminant of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Auth(_) => MessageKind::Auth,
            Message::Time(_) => MessageKind::Time,
            Message::Ack(_) => MessageKind::Ack,
        }
    }
}

impl From<AuthMessage> for Message {
    fn from(msg: AuthMessage) -> Self {
        Message::Auth(msg)
    }
}

impl From<TimeMessage> for Message {
    fn from(msg: TimeMessage) -> Self {
        Message::Time(msg)
    }
}

impl From<AckMessage> for Message {
    fn from(msg: AckMessage) -> Self {
        Message::Ack(msg)
    }
}

impl TryFrom<Message> for AuthMessage {
    type Error = CodecError;

    fn try_from(msg: Message) -> Result<Self, Self::Error> {
        match msg {
            Message::Auth(auth) => Ok(auth),
            other => Err(CodecError::UnexpectedKind {
                expected: MessageKind::Auth,
                actual: other.kind(),
            }),
        }
    }
}

impl TryFrom<Message> for TimeMessage {
    type Error = CodecError;

    fn try_from(msg: Message) -> Result<Self, Self::Error> {
        match msg {
            Message::Time(time) => Ok(time),
            other => Err(CodecError::UnexpectedKind {
                expected: MessageKind::Time,
                actual: other.kind(),
            }),
        }
    }
}

impl TryFrom<Message> for AckMessage {
    type Error = CodecError;

    fn try_from(msg: Message) -> Result<Self, Self::Error> {
        match msg {
            Message::Ack(ack) => Ok(ack),
            other => Err(CodecError::UnexpectedKind {
                expected: MessageKind::Ack,
                actual: other.kind(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_status_wire_names() {
        let json = serde_json::to_string(&AckStatus::AckTime).unwrap();
        assert_eq!(json, "\"ACK_TIME\"");
        let json = serde_json::to_string(&AckStatus::Ok).unwrap();
        assert_eq!(json, "\"OK\"");
        let status: AckStatus = serde_json::from_str("\"ACK_AUTH\"").unwrap();
        assert_eq!(status, AckStatus::AckAuth);
    }

    #[test]
    fn test_kind_tag_selects_variant() {
        let json = serde_json::json!({"kind": "ack", "status": "ACK_TIME"});
        let msg: Message = serde_json::from_value(json).unwrap();
        assert_eq!(msg, Message::Ack(AckMessage::TIME));

        let json = serde_json::json!({"type": "ack", "status": "ACK_TIME"});
        assert!(serde_json::from_value::<Message>(json).is_err());
    }

    #[test]
    fn test_message_carries_kind_tag() {
        let json = serde_json::to_value(Message::from(AuthMessage::new("alice", "secret"))).unwrap();
        assert_eq!(json["kind"], "auth");
        assert_eq!(json["username"], "alice");
        assert_eq!(json["password"], "secret");

        let json = serde_json::to_value(Message::from(AckMessage::TIME)).unwrap();
        assert_eq!(json["kind"], "ack");
        assert_eq!(json["status"], "ACK_TIME");
    }

    #[test]
    fn test_try_from_wrong_kind() {
        let msg = Message::from(TimeMessage::now());
        let err = AuthMessage::try_from(msg).unwrap_err();
        assert!(matches!(
            err,
            CodecError::UnexpectedKind {
                expected: MessageKind::Auth,
                actual: MessageKind::Time,
            }
        ));
    }

    #[test]
    fn test_auth_debug_redacts_password() {
        let debug = format!("{:?}", AuthMessage::new("alice", "hunter2"));
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
    }
}

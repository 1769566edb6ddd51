//! Message identity, kind and payload types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Protocol tag used when a message does not name one
pub const DEFAULT_PROTOCOL: &str = "a2a";

// ============================================================================
// MessageKind
// ============================================================================

/// The communication intent of a message
///
/// Agents dispatch on this with an exhaustive `match`; the topology itself
/// never inspects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Ask the receiver to do something
    Command,
    /// Ask the receiver for information
    Query,
    /// Tell the receiver something happened
    Event,
    /// Answer to an earlier command or query
    Response,
}

impl MessageKind {
    /// Lowercase name, as used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Command => "command",
            MessageKind::Query => "query",
            MessageKind::Event => "event",
            MessageKind::Response => "response",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// MessageId
// ============================================================================

/// Error type for MessageId validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageIdError {
    /// The provided string is not a valid UUID
    InvalidFormat(String),
}

impl std::fmt::Display for MessageIdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageIdError::InvalidFormat(s) => {
                write!(f, "Invalid MessageId format (expected UUID): '{}'", s)
            }
        }
    }
}

impl std::error::Error for MessageIdError {}

/// Unique identifier for a message (UUID v4)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Create a new random message ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Parse and validate a message ID from a string
    ///
    /// ```
    /// use agentmesh_core::MessageId;
    ///
    /// assert!(MessageId::parse("550e8400-e29b-41d4-a716-446655440000").is_ok());
    /// assert!(MessageId::parse("read-command-1").is_err());
    /// ```
    pub fn parse(id: impl AsRef<str>) -> Result<Self, MessageIdError> {
        let s = id.as_ref();
        Uuid::parse_str(s).map_err(|_| MessageIdError::InvalidFormat(s.to_string()))?;
        Ok(Self(s.to_string()))
    }

    /// Get the message ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// MessagePayload
// ============================================================================

/// Opaque message payload
///
/// Topologies never look inside; the variants only exist so payloads can be
/// serialized without losing their shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MessagePayload {
    /// String payload
    #[serde(rename = "text")]
    Text(String),
    /// JSON payload
    #[serde(rename = "json")]
    Json(serde_json::Value),
    /// Binary payload (base64 encoded in JSON), e.g. pre-encrypted bytes
    #[serde(rename = "binary")]
    #[serde(with = "base64_serde")]
    Binary(Vec<u8>),
}

impl MessagePayload {
    /// Borrow the payload as bytes (text is returned as its UTF-8 bytes)
    ///
    /// JSON payloads have no borrowed byte form and return `None`.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            MessagePayload::Text(s) => Some(s.as_bytes()),
            MessagePayload::Binary(b) => Some(b),
            MessagePayload::Json(_) => None,
        }
    }
}

mod base64_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            bytes,
        ))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        base64::Engine::decode(&base64::engine::general_purpose::STANDARD, s)
            .map_err(serde::de::Error::custom)
    }
}

impl From<String> for MessagePayload {
    fn from(s: String) -> Self {
        MessagePayload::Text(s)
    }
}

impl From<&str> for MessagePayload {
    fn from(s: &str) -> Self {
        MessagePayload::Text(s.to_string())
    }
}

impl From<serde_json::Value> for MessagePayload {
    fn from(v: serde_json::Value) -> Self {
        MessagePayload::Json(v)
    }
}

impl From<Vec<u8>> for MessagePayload {
    fn from(v: Vec<u8>) -> Self {
        MessagePayload::Binary(v)
    }
}

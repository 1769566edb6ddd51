//! The immutable `Message` value passed between agents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{DEFAULT_PROTOCOL, MessageId, MessageKind, MessagePayload};
use crate::types::AgentId;

/// One unit of communication between agents
///
/// Fields are private: once built, a message is never changed. Builder
/// methods consume `self`, so they can only be used while constructing it.
/// A reply is a new message (see [`Message::reply_to`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    sender: AgentId,
    /// `None` means "broadcast to all other participants"
    receiver: Option<AgentId>,
    protocol: String,
    payload: MessagePayload,
    kind: MessageKind,
    timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message addressed to `receiver`, or a broadcast when it is `None`
    pub fn new(
        sender: AgentId,
        receiver: Option<AgentId>,
        kind: MessageKind,
        payload: impl Into<MessagePayload>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            sender,
            receiver,
            protocol: DEFAULT_PROTOCOL.to_string(),
            payload: payload.into(),
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Create a message from one agent to another
    pub fn unicast(
        sender: AgentId,
        receiver: AgentId,
        kind: MessageKind,
        payload: impl Into<MessagePayload>,
    ) -> Self {
        Self::new(sender, Some(receiver), kind, payload)
    }

    /// Create a message for every other participant
    pub fn broadcast(sender: AgentId, kind: MessageKind, payload: impl Into<MessagePayload>) -> Self {
        Self::new(sender, None, kind, payload)
    }

    /// Build the response to `request`: sender and receiver swapped, kind `Response`
    pub fn reply_to(request: &Message, payload: impl Into<MessagePayload>) -> Self {
        let responder = request
            .receiver
            .clone()
            .unwrap_or_else(|| request.sender.clone());
        Self {
            id: MessageId::new(),
            sender: responder,
            receiver: Some(request.sender.clone()),
            protocol: request.protocol.clone(),
            payload: payload.into(),
            kind: MessageKind::Response,
            timestamp: Utc::now(),
        }
    }

    /// Set the protocol tag
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Use a caller-supplied message ID
    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    pub fn sender(&self) -> &AgentId {
        &self.sender
    }

    pub fn receiver(&self) -> Option<&AgentId> {
        self.receiver.as_ref()
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn payload(&self) -> &MessagePayload {
        &self.payload
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// True when the message has no receiver
    pub fn is_broadcast(&self) -> bool {
        self.receiver.is_none()
    }

    /// Serialize message to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize message from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

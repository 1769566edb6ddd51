//! Messages exchanged between agents.
//!
//! - [`Message`]: the immutable value routed by every topology
//! - [`MessageKind`]: command / query / event / response
//! - [`MessageId`]: UUID-validated identifier
//! - [`MessagePayload`]: opaque text, JSON or binary content

mod core;
mod types;

pub use self::core::Message;
pub use types::{DEFAULT_PROTOCOL, MessageId, MessageIdError, MessageKind, MessagePayload};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentId;

    #[test]
    fn test_unicast_and_broadcast() {
        let msg = Message::unicast("s1".into(), "s2".into(), MessageKind::Command, "go");
        assert!(!msg.is_broadcast());
        assert_eq!(msg.sender().as_str(), "s1");
        assert_eq!(msg.receiver().map(AgentId::as_str), Some("s2"));
        assert_eq!(msg.protocol(), DEFAULT_PROTOCOL);

        let all = Message::broadcast("hub".into(), MessageKind::Event, "tick");
        assert!(all.is_broadcast());
        assert_eq!(all.receiver(), None);
    }

    #[test]
    fn test_reply_swaps_route() {
        let request = Message::unicast("gateway".into(), "temp".into(), MessageKind::Query, "read")
            .with_protocol("mcp");
        let reply = Message::reply_to(&request, serde_json::json!({"celsius": 21.5}));

        assert_eq!(reply.kind(), MessageKind::Response);
        assert_eq!(reply.sender().as_str(), "temp");
        assert_eq!(reply.receiver().map(AgentId::as_str), Some("gateway"));
        assert_eq!(reply.protocol(), "mcp");
        assert_ne!(reply.id(), request.id());
    }

    #[test]
    fn test_message_json_shape() {
        let msg = Message::unicast("a".into(), "b".into(), MessageKind::Event, vec![255u8, 0, 128]);
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();

        assert_eq!(value["kind"], "event");
        assert_eq!(value["payload"]["type"], "binary");
        assert_eq!(value["payload"]["data"], "/wCA");

        let back = Message::from_json(&msg.to_json().unwrap()).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_broadcast_receiver_serializes_as_null() {
        let msg = Message::broadcast("hub".into(), MessageKind::Command, "READ");
        let value = serde_json::to_value(&msg).unwrap();
        assert!(value["receiver"].is_null());
    }

    #[test]
    fn test_message_id_validation() {
        let id = MessageId::new();
        assert!(MessageId::parse(id.as_str()).is_ok());
        assert!(MessageId::parse("").is_err());
        assert!(MessageId::parse("550e8400-e29b").is_err());

        let err = MessageIdError::InvalidFormat("bad".to_string());
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn test_payload_bytes() {
        assert_eq!(MessagePayload::from("hi").as_bytes(), Some(&b"hi"[..]));
        assert_eq!(MessagePayload::from(vec![1u8]).as_bytes(), Some(&[1u8][..]));
        assert_eq!(MessagePayload::from(serde_json::json!(1)).as_bytes(), None);
    }
}

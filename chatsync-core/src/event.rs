//! Push-channel payload decoding.
//!
//! The stream carries two JSON shapes and tells them apart only by the
//! presence of a message body:
//!
//! ```text
//! { "id": .., "message": "..", "user": {..}, "room": {..}, "date": ".." }   → Message
//! { "messageId": .., "viewers": [ { "id": .., "username": ".." } ] }        → Viewers
//! ```
//!
//! The decision is made once, here, so everything downstream matches on a
//! tagged variant.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::model::{Message, MessageId, UserInfo};

/// Full viewer set for one message, as pushed by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerUpdate {
    #[serde(rename = "messageId")]
    pub message_id: MessageId,
    #[serde(default)]
    pub viewers: Vec<UserInfo>,
}

/// A decoded push-channel event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A newly created message.
    Message(Message),
    /// Replacement viewer set for a message.
    Viewers(ViewerUpdate),
}

impl StreamEvent {
    /// Decode one event payload.
    pub fn decode(payload: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(payload)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let carries_body = value.get("message").is_some_and(|body| !body.is_null());
        if carries_body {
            Ok(Self::Message(serde_json::from_value(value)?))
        } else {
            Ok(Self::Viewers(serde_json::from_value(value)?))
        }
    }

    /// The message this event concerns.
    pub fn message_id(&self) -> MessageId {
        match self {
            Self::Message(message) => message.id,
            Self::Viewers(update) => update.message_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;

    #[test]
    fn test_decode_message_event() {
        let event = StreamEvent::decode(
            r#"{"id": 4, "message": "hey", "user": {"id": 2, "username": "bob"},
                "room": {"id": 1, "label": "general"}, "date": "2024-10-01T10:00:00"}"#,
        )
        .unwrap();

        match event {
            StreamEvent::Message(message) => {
                assert_eq!(message.id, MessageId(4));
                assert_eq!(message.body, "hey");
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_viewer_event() {
        let event = StreamEvent::decode(
            r#"{"messageId": 5, "viewers": [{"id": 2, "username": "bob"}, {"id": 3, "username": "carol"}]}"#,
        )
        .unwrap();

        assert_eq!(event.message_id(), MessageId(5));
        match event {
            StreamEvent::Viewers(update) => assert_eq!(update.viewers.len(), 2),
            other => panic!("expected viewers, got {other:?}"),
        }
    }

    #[test]
    fn test_null_body_is_not_a_message() {
        let event = StreamEvent::decode(r#"{"messageId": 5, "message": null, "viewers": []}"#).unwrap();
        assert!(matches!(event, StreamEvent::Viewers(_)));
    }

    #[test]
    fn test_empty_body_is_still_a_message() {
        let event = StreamEvent::decode(
            r#"{"id": 6, "message": "", "user": {"id": 2, "username": "bob"},
                "room": {"id": 1}, "date": "2024-10-01T10:00:00"}"#,
        )
        .unwrap();
        assert!(matches!(event, StreamEvent::Message(_)));
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(StreamEvent::decode("not json"), Err(SyncError::Decode(_))));
        // Neither shape: no body and no messageId.
        assert!(matches!(StreamEvent::decode(r#"{"hello": 1}"#), Err(SyncError::Decode(_))));
    }
}

//! Chat data model as it travels over the wire.
//!
//! JSON shape of a message (field names are the remote service's):
//! ```text
//! {
//!   "id": 42,
//!   "message": "hello",
//!   "user": { "id": 7, "username": "alice" },
//!   "room": { "id": 3, "label": "general" },
//!   "date": "2024-10-01T12:34:56.789"
//! }
//! ```

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Server-assigned message identifier. Totally ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user as seen by other users: message authors and viewers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: UserId,
    #[serde(rename = "username")]
    pub display_name: String,
}

impl UserInfo {
    pub fn new(id: i64, display_name: impl Into<String>) -> Self {
        Self {
            id: UserId(id),
            display_name: display_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRef {
    pub id: RoomId,
    #[serde(default)]
    pub label: String,
}

impl RoomRef {
    pub fn new(id: i64, label: impl Into<String>) -> Self {
        Self {
            id: RoomId(id),
            label: label.into(),
        }
    }
}

/// A chat message. Immutable once created; identity is `id`, never position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    #[serde(rename = "user")]
    pub author: UserInfo,
    pub room: RoomRef,
    #[serde(rename = "message")]
    pub body: String,
    #[serde(rename = "date", with = "timestamp")]
    pub created_at: NaiveDateTime,
}

impl Message {
    /// Display ordering key: creation time, id as tie-break.
    pub fn sort_key(&self) -> (NaiveDateTime, MessageId) {
        (self.created_at, self.id)
    }

    pub fn is_authored_by(&self, user: UserId) -> bool {
        self.author.id == user
    }
}

/// Outbound message payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewMessage {
    #[serde(rename = "message")]
    pub body: String,
    #[serde(rename = "user")]
    pub author: UserInfo,
    pub room: RoomRef,
}

impl NewMessage {
    /// Build a send payload. Bodies that are blank after trimming are
    /// rejected before any network call is made.
    pub fn new(body: impl Into<String>, author: UserInfo, room: RoomRef) -> Result<Self> {
        let body = body.into();
        if body.trim().is_empty() {
            return Err(SyncError::EmptyMessage);
        }
        Ok(Self { body, author, room })
    }
}

/// Timestamps arrive either naive (`2024-10-01T12:34:56.789`) or as
/// RFC 3339 with an offset; the latter is normalised to UTC.
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime};
    use serde::{de, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

    pub fn parse(raw: &str) -> Option<NaiveDateTime> {
        if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
            return Some(with_offset.naive_utc());
        }
        NaiveDateTime::parse_from_str(raw, FORMAT).ok()
    }

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp `{raw}`")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const WIRE: &str = r#"{
        "id": 42,
        "message": "hello",
        "user": { "id": 7, "username": "alice" },
        "room": { "id": 3, "label": "general" },
        "date": "2024-10-01T12:34:56.789"
    }"#;

    #[test]
    fn test_message_from_wire() {
        let msg: Message = serde_json::from_str(WIRE).unwrap();
        assert_eq!(msg.id, MessageId(42));
        assert_eq!(msg.author, UserInfo::new(7, "alice"));
        assert_eq!(msg.room, RoomRef::new(3, "general"));
        assert_eq!(msg.body, "hello");
        assert_eq!(
            msg.created_at,
            NaiveDate::from_ymd_opt(2024, 10, 1)
                .unwrap()
                .and_hms_milli_opt(12, 34, 56, 789)
                .unwrap()
        );
    }

    #[test]
    fn test_timestamp_with_offset_normalised() {
        let parsed = timestamp::parse("2024-10-01T14:00:00+02:00").unwrap();
        assert_eq!(parsed, timestamp::parse("2024-10-01T12:00:00").unwrap());
    }

    #[test]
    fn test_timestamp_rejects_garbage() {
        assert!(timestamp::parse("yesterday").is_none());
        let bad = WIRE.replace("2024-10-01T12:34:56.789", "yesterday");
        assert!(serde_json::from_str::<Message>(&bad).is_err());
    }

    #[test]
    fn test_room_label_optional() {
        let room: RoomRef = serde_json::from_str(r#"{"id": 9}"#).unwrap();
        assert_eq!(room, RoomRef::new(9, ""));
    }

    #[test]
    fn test_new_message_rejects_blank_body() {
        let author = UserInfo::new(1, "alice");
        let room = RoomRef::new(1, "general");
        assert_eq!(
            NewMessage::new("   \n", author.clone(), room.clone()),
            Err(SyncError::EmptyMessage)
        );

        let msg = NewMessage::new("hi", author, room).unwrap();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["message"], "hi");
        assert_eq!(json["user"]["username"], "alice");
        assert_eq!(json["room"]["id"], 1);
    }

    #[test]
    fn test_sort_key_tie_breaks_on_id() {
        let a: Message = serde_json::from_str(WIRE).unwrap();
        let mut b = a.clone();
        b.id = MessageId(41);
        assert!(b.sort_key() < a.sort_key());
    }
}

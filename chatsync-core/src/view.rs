//! Rendering-ready snapshot of a room session.
//!
//! Built fresh from a [`RoomSession`] after every state change; the host
//! renders it and never reaches into the session itself.

use chrono::NaiveDateTime;

use crate::error::SyncError;
use crate::model::{MessageId, RoomRef, UserInfo};
use crate::session::{ChannelStatus, Phase, RoomSession, SessionId};

/// Read-receipt affordance shown on the current user's own messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receipt {
    /// Nobody has seen it yet.
    Unread,
    Read { viewers: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageView {
    pub id: MessageId,
    pub author: UserInfo,
    pub body: String,
    pub created_at: NaiveDateTime,
    /// Written by the current user.
    pub own: bool,
    /// Seen by the current user.
    pub seen: bool,
    /// Only set on own messages.
    pub receipt: Option<Receipt>,
}

/// The viewer list the user asked to reveal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerList {
    pub message_id: MessageId,
    pub viewers: Vec<UserInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomView {
    pub session: SessionId,
    pub room: RoomRef,
    pub phase: Phase,
    pub channel: ChannelStatus,
    /// Display order.
    pub messages: Vec<MessageView>,
    /// First unread message of the latest unseen report.
    pub scroll_anchor: Option<MessageId>,
    pub viewer_list: Option<ViewerList>,
    pub unseen: usize,
    pub error: Option<SyncError>,
}

impl RoomView {
    pub fn from_session(session: &RoomSession) -> Self {
        let me = session.me().id;
        let seen = session.seen();
        let presence = session.presence();

        let messages = session
            .store()
            .iter()
            .map(|message| {
                let own = message.is_authored_by(me);
                let receipt = own.then(|| match presence.count(message.id) {
                    0 => Receipt::Unread,
                    viewers => Receipt::Read { viewers },
                });
                MessageView {
                    id: message.id,
                    author: message.author.clone(),
                    body: message.body.clone(),
                    created_at: message.created_at,
                    own,
                    seen: own || !seen.is_unseen(message.id),
                    receipt,
                }
            })
            .collect();

        // Only revealed when a record exists.
        let viewer_list = session.expanded().and_then(|id| {
            presence.get(id).map(|set| ViewerList {
                message_id: id,
                viewers: set.iter().cloned().collect(),
            })
        });

        Self {
            session: session.id(),
            room: session.room().clone(),
            phase: session.phase(),
            channel: session.channel(),
            messages,
            scroll_anchor: seen.scroll_anchor(),
            viewer_list,
            unseen: seen.unseen_len(),
            error: session.error().cloned(),
        }
    }

    pub fn message(&self, id: MessageId) -> Option<&MessageView> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn is_live(&self) -> bool {
        self.phase == Phase::Live
    }
}

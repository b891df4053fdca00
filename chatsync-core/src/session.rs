//! Room session state machine.
//!
//! A [`RoomSession`] owns the store, the seen tracker and the viewer
//! presence for one period of room occupancy. It never performs I/O: every
//! input returns the [`Effect`]s the runtime must carry out, and every
//! finished effect comes back as a [`Completion`] tagged with the session id.
//!
//! ```text
//!            start()                 ChannelOpened(Ok)
//!   Idle ─────────────► Connecting ─────────────────► Live
//!    ▲                       │                         │
//!    │ finish()              │ close()                 │ close()
//!    │                       ▼                         │
//!    └──────────────────  Closing ◄────────────────────┘
//! ```
//!
//! Stream events that arrive before the snapshot has settled are held in a
//! backlog and replayed after it, so the snapshot replace cannot wipe them.

use std::collections::VecDeque;
use std::fmt;

use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::event::StreamEvent;
use crate::model::{Message, MessageId, RoomRef, UserInfo};
use crate::presence::ViewerPresence;
use crate::seen::{AckBatch, SeenTracker};
use crate::store::{Append, MessageStore};
use crate::view::RoomView;

/// Identifies one room session. Results tagged with another id are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    Live,
    Closing,
}

/// State of the push channel as far as the session knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Closed,
    Opening,
    Open,
    /// Was open and ended. Not reconnected.
    Dropped,
    /// Never opened.
    Failed,
}

/// Work the runtime must perform on behalf of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    FetchSnapshot,
    OpenChannel,
    FetchUnseen,
    Acknowledge(AckBatch),
    FetchViewers(MessageId),
    CloseChannel,
    MarkInactive,
}

/// Result of a finished effect (or of a send), fed back into the session.
#[derive(Debug, Clone)]
pub enum Completion {
    Snapshot(Result<Vec<Message>>),
    Unseen(Result<Vec<MessageId>>),
    Acknowledged { batch: AckBatch, result: Result<()> },
    Viewers { message_id: MessageId, result: Result<Vec<UserInfo>> },
    ChannelOpened(Result<()>),
    Sent(Result<()>),
}

impl Completion {
    fn operation(&self) -> &'static str {
        match self {
            Completion::Snapshot(_) => "snapshot fetch",
            Completion::Unseen(_) => "unseen fetch",
            Completion::Acknowledged { .. } => "acknowledge",
            Completion::Viewers { .. } => "viewer fetch",
            Completion::ChannelOpened(_) => "push channel open",
            Completion::Sent(_) => "send",
        }
    }
}

pub struct RoomSession {
    id: SessionId,
    room: RoomRef,
    me: UserInfo,
    phase: Phase,
    channel: ChannelStatus,
    store: MessageStore,
    seen: SeenTracker,
    presence: ViewerPresence,
    snapshot_settled: bool,
    backlog: VecDeque<StreamEvent>,
    expanded: Option<MessageId>,
    error: Option<SyncError>,
}

impl RoomSession {
    pub fn new(room: RoomRef, me: UserInfo) -> Self {
        Self::with_id(SessionId::new(), room, me)
    }

    pub fn with_id(id: SessionId, room: RoomRef, me: UserInfo) -> Self {
        Self {
            id,
            seen: SeenTracker::new(me.id),
            room,
            me,
            phase: Phase::Idle,
            channel: ChannelStatus::Closed,
            store: MessageStore::new(),
            presence: ViewerPresence::new(),
            snapshot_settled: false,
            backlog: VecDeque::new(),
            expanded: None,
            error: None,
        }
    }

    /// Enter the room: fetch the snapshot and open the push channel.
    pub fn start(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Idle {
            warn!("session {} already started", self.id);
            return Vec::new();
        }
        info!("room {}: connecting (session {})", self.room.id, self.id);
        self.phase = Phase::Connecting;
        self.channel = ChannelStatus::Opening;
        vec![Effect::FetchSnapshot, Effect::OpenChannel]
    }

    /// Feed back the result of an effect.
    ///
    /// Results for another session, or arriving after the session started
    /// closing, are dropped without touching any state.
    pub fn complete(&mut self, session: SessionId, completion: Completion) -> Vec<Effect> {
        if session != self.id || !self.is_active() {
            debug!(
                "discarding stale {} result for session {session}",
                completion.operation()
            );
            return Vec::new();
        }

        match completion {
            Completion::Snapshot(Ok(messages)) => self.on_snapshot(messages),
            Completion::Snapshot(Err(err)) => {
                self.record_failure("snapshot fetch", &err);
                self.snapshot_settled = true;
                self.drain_backlog()
            }
            Completion::Unseen(Ok(ids)) => {
                let added = self.seen.record_unseen(ids);
                debug!("room {}: {added} unseen ids recorded", self.room.id);
                self.flush_ready().into_iter().collect()
            }
            Completion::Acknowledged { batch, result } => {
                match result {
                    Ok(()) => self.seen.complete(&batch, true),
                    Err(err) => {
                        if err.is_authorization() {
                            self.seen.reject(&batch);
                        } else {
                            self.seen.complete(&batch, false);
                        }
                        self.record_failure("acknowledge", &err);
                    }
                }
                Vec::new()
            }
            Completion::Viewers { message_id, result: Ok(viewers) } => {
                self.presence.seed(message_id, viewers);
                Vec::new()
            }
            Completion::ChannelOpened(Ok(())) => {
                self.channel = ChannelStatus::Open;
                if self.phase == Phase::Connecting {
                    self.phase = Phase::Live;
                    info!("room {}: live", self.room.id);
                }
                Vec::new()
            }
            Completion::ChannelOpened(Err(err)) => {
                self.channel = ChannelStatus::Failed;
                self.record_failure("push channel open", &err);
                Vec::new()
            }
            Completion::Sent(Ok(())) => Vec::new(),
            Completion::Unseen(Err(err)) => {
                self.record_failure("unseen fetch", &err);
                Vec::new()
            }
            Completion::Viewers { message_id, result: Err(err) } => {
                self.record_failure(&format!("viewer fetch for message {message_id}"), &err);
                Vec::new()
            }
            Completion::Sent(Err(err)) => {
                self.record_failure("send", &err);
                Vec::new()
            }
        }
    }

    /// Route one push-channel event.
    pub fn on_stream_event(&mut self, event: StreamEvent) -> Vec<Effect> {
        if !self.is_active() {
            debug!("room {}: event after close ignored", self.room.id);
            return Vec::new();
        }
        if !self.snapshot_settled {
            self.backlog.push_back(event);
            return Vec::new();
        }
        self.dispatch(event)
    }

    /// The push channel ended. The session keeps its (now stale) state.
    pub fn on_channel_lost(&mut self) {
        if !self.is_active() {
            return;
        }
        self.channel = ChannelStatus::Dropped;
        warn!(
            "room {}: push channel dropped, state is stale until the room is re-entered",
            self.room.id
        );
    }

    /// The host saw the user interact with the room.
    ///
    /// The first signal of a session re-queries unseen messages; every
    /// signal retries acknowledgements that failed earlier.
    pub fn notify_activity(&mut self) -> Vec<Effect> {
        if !self.is_active() {
            return Vec::new();
        }
        let mut effects = Vec::new();
        if self.seen.take_activity_trigger() {
            effects.push(Effect::FetchUnseen);
        }
        effects.extend(self.flush_ready());
        effects
    }

    /// Show the viewer list of a message, or hide it if it is showing.
    pub fn toggle_viewers(&mut self, id: MessageId) {
        self.expanded = if self.expanded == Some(id) { None } else { Some(id) };
    }

    /// Leave the room: close the channel, then tell the service.
    pub fn close(&mut self) -> Vec<Effect> {
        if !self.is_active() {
            return Vec::new();
        }
        info!("room {}: closing (session {})", self.room.id, self.id);
        self.phase = Phase::Closing;
        self.channel = ChannelStatus::Closed;
        self.backlog.clear();
        vec![Effect::CloseChannel, Effect::MarkInactive]
    }

    /// Closing effects are done.
    pub fn finish(&mut self) {
        if self.phase == Phase::Closing {
            self.phase = Phase::Idle;
        }
    }

    pub fn view(&self) -> RoomView {
        RoomView::from_session(self)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn room(&self) -> &RoomRef {
        &self.room
    }

    pub fn me(&self) -> &UserInfo {
        &self.me
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn channel(&self) -> ChannelStatus {
        self.channel
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn seen(&self) -> &SeenTracker {
        &self.seen
    }

    pub fn presence(&self) -> &ViewerPresence {
        &self.presence
    }

    pub fn expanded(&self) -> Option<MessageId> {
        self.expanded
    }

    /// Last authorization failure, if any.
    pub fn error(&self) -> Option<&SyncError> {
        self.error.as_ref()
    }

    /// Events waiting for the snapshot to settle.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, Phase::Connecting | Phase::Live)
    }

    // ─── internals ───────────────────────────────────────────────

    fn on_snapshot(&mut self, messages: Vec<Message>) -> Vec<Effect> {
        self.store.load_snapshot(messages);
        self.snapshot_settled = true;
        info!("room {}: snapshot loaded, {} messages", self.room.id, self.store.len());

        // Unseen marking resolves against the snapshot, so it goes after it.
        let mut effects = vec![Effect::FetchUnseen];
        effects.extend(self.flush_ready());

        let ids: Vec<MessageId> = self.store.ids().collect();
        for id in ids {
            if self.presence.begin_seed(id) {
                effects.push(Effect::FetchViewers(id));
            }
        }

        effects.extend(self.drain_backlog());
        effects
    }

    fn drain_backlog(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        while let Some(event) = self.backlog.pop_front() {
            effects.extend(self.dispatch(event));
        }
        effects
    }

    fn dispatch(&mut self, event: StreamEvent) -> Vec<Effect> {
        match event {
            StreamEvent::Message(message) => {
                let id = message.id;
                let foreign = match self.store.append(message) {
                    Append::Inserted(stored) => {
                        self.seen.note_arrival(stored);
                        !stored.is_authored_by(self.me.id)
                    }
                    Append::Existing(_) => {
                        debug!("room {}: duplicate message {id} ignored", self.room.id);
                        false
                    }
                };

                // A live arrival is acknowledged on its own, even when an
                // earlier unseen report already queued its id.
                let mut effects = Vec::new();
                if foreign {
                    effects.extend(self.seen.take_one(id, &self.store).map(Effect::Acknowledge));
                }
                // New stream activity is also a retry point for failed acks.
                effects.extend(self.flush_ready());
                effects
            }
            StreamEvent::Viewers(update) => {
                self.presence.apply_push_update(update.message_id, update.viewers);
                Vec::new()
            }
        }
    }

    fn flush_ready(&mut self) -> Option<Effect> {
        self.seen.take_ready(&self.store).map(Effect::Acknowledge)
    }

    fn record_failure(&mut self, operation: &str, err: &SyncError) {
        if err.is_authorization() {
            error!("room {}: {operation} rejected: {err}", self.room.id);
            self.error = Some(err.clone());
        } else {
            warn!("room {}: {operation} failed: {err}", self.room.id);
        }
    }
}

//! Read-receipt state for the current user.
//!
//! Lifecycle of an unseen id:
//!
//! ```text
//! record_unseen / note_arrival
//!        │
//!        ▼
//!    pending ──(message not stored yet)──► stays buffered
//!        │
//!   take_ready / take_one   (only ids present in the store)
//!        ▼
//!    in flight ──complete(false)──► pending   (retried on next trigger)
//!        │    └─────reject─────► rejected  (credential refused, never retried)
//!   complete(true)
//!        ▼
//!   acknowledged
//! ```
//!
//! The remote service treats duplicate mark-seen calls as no-ops, so the
//! tracker only has to guarantee it never acknowledges an unknown message
//! and never loses a failed id.

use std::collections::{BTreeSet, HashSet};

use crate::model::{Message, MessageId, UserId};
use crate::store::MessageStore;

/// A mark-seen request, ids ordered oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckBatch {
    ids: Vec<MessageId>,
}

impl AckBatch {
    pub fn ids(&self) -> &[MessageId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.ids.contains(&id)
    }
}

#[derive(Debug, Clone)]
pub struct SeenTracker {
    me: UserId,
    pending: BTreeSet<MessageId>,
    in_flight: HashSet<MessageId>,
    acknowledged: HashSet<MessageId>,
    rejected: HashSet<MessageId>,
    activity_consumed: bool,
    scroll_anchor: Option<MessageId>,
}

impl SeenTracker {
    pub fn new(me: UserId) -> Self {
        Self {
            me,
            pending: BTreeSet::new(),
            in_flight: HashSet::new(),
            acknowledged: HashSet::new(),
            rejected: HashSet::new(),
            activity_consumed: false,
            scroll_anchor: None,
        }
    }

    /// Record ids the remote service reports as unseen, oldest first.
    ///
    /// Ids already acknowledged in this session are skipped. Returns how
    /// many ids became newly pending.
    pub fn record_unseen(&mut self, ids: impl IntoIterator<Item = MessageId>) -> usize {
        let mut added = 0;
        let mut first = None;
        for id in ids {
            if self.acknowledged.contains(&id) {
                continue;
            }
            if first.is_none() {
                first = Some(id);
            }
            if !self.in_flight.contains(&id) && !self.rejected.contains(&id) && self.pending.insert(id) {
                added += 1;
            }
        }
        if first.is_some() {
            self.scroll_anchor = first;
        }
        added
    }

    /// Queue a live arrival for acknowledgement if someone else wrote it.
    pub fn note_arrival(&mut self, message: &Message) -> bool {
        if message.is_authored_by(self.me)
            || self.acknowledged.contains(&message.id)
            || self.in_flight.contains(&message.id)
            || self.rejected.contains(&message.id)
        {
            return false;
        }
        self.pending.insert(message.id)
    }

    /// Every pending id backed by a stored message, oldest first, marked in
    /// flight. `None` when nothing is ready.
    pub fn take_ready(&mut self, store: &MessageStore) -> Option<AckBatch> {
        let mut ready: Vec<_> = self
            .pending
            .iter()
            .filter_map(|id| store.sort_key_of(*id))
            .collect();
        if ready.is_empty() {
            return None;
        }
        ready.sort_unstable();

        let ids: Vec<MessageId> = ready.into_iter().map(|(_, id)| id).collect();
        for id in &ids {
            self.pending.remove(id);
            self.in_flight.insert(*id);
        }
        Some(AckBatch { ids })
    }

    /// Single-id batch for one pending, stored message.
    pub fn take_one(&mut self, id: MessageId, store: &MessageStore) -> Option<AckBatch> {
        if !store.contains(id) || !self.pending.remove(&id) {
            return None;
        }
        self.in_flight.insert(id);
        Some(AckBatch { ids: vec![id] })
    }

    /// Settle a batch. Failed ids go back to pending for the next trigger.
    pub fn complete(&mut self, batch: &AckBatch, acknowledged: bool) {
        for id in batch.ids() {
            if !self.in_flight.remove(id) {
                continue;
            }
            if acknowledged {
                self.acknowledged.insert(*id);
            } else {
                self.pending.insert(*id);
            }
        }
    }

    /// Settle a batch the remote service refused to authorize. Its ids stay
    /// unseen but are never handed out again in this session.
    pub fn reject(&mut self, batch: &AckBatch) {
        for id in batch.ids() {
            if self.in_flight.remove(id) {
                self.rejected.insert(*id);
            }
        }
    }

    /// True exactly once per tracker: the first activity signal of a session.
    pub fn take_activity_trigger(&mut self) -> bool {
        !std::mem::replace(&mut self.activity_consumed, true)
    }

    /// Unseen from the current user's point of view: reported or arrived,
    /// and not yet confirmed by the remote service.
    pub fn is_unseen(&self, id: MessageId) -> bool {
        self.pending.contains(&id) || self.in_flight.contains(&id) || self.rejected.contains(&id)
    }

    pub fn is_acknowledged(&self, id: MessageId) -> bool {
        self.acknowledged.contains(&id)
    }

    pub fn is_in_flight(&self, id: MessageId) -> bool {
        self.in_flight.contains(&id)
    }

    pub fn is_rejected(&self, id: MessageId) -> bool {
        self.rejected.contains(&id)
    }

    /// Number of unseen ids, buffered ones included.
    pub fn unseen_len(&self) -> usize {
        self.pending.len() + self.in_flight.len() + self.rejected.len()
    }

    /// Pending ids whose message has not been stored yet.
    pub fn buffered<'a>(&'a self, store: &'a MessageStore) -> impl Iterator<Item = MessageId> + 'a {
        self.pending.iter().copied().filter(|id| !store.contains(*id))
    }

    /// Oldest id of the latest unseen report; where the view should jump.
    pub fn scroll_anchor(&self) -> Option<MessageId> {
        self.scroll_anchor
    }
}

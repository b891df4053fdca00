//! Ordered, deduplicated message history for one room.
//!
//! Messages are kept in display order `(created_at, id)` and indexed by id.
//! The store is merged from two sources that may overlap:
//!
//! ```text
//! snapshot fetch ──► load_snapshot()  (replace)
//! push channel   ──► append()         (idempotent insert, never overwrite)
//! ```
//!
//! Pure state: no network, no clock.

use std::collections::{btree_map, BTreeMap, HashMap};
use std::iter::FusedIterator;

use chrono::NaiveDateTime;

use crate::model::{Message, MessageId};

type SortKey = (NaiveDateTime, MessageId);

/// Result of [`MessageStore::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Append<'a> {
    /// The id was new and the message is now stored.
    Inserted(&'a Message),
    /// The id was already known; this is the stored entry, unchanged.
    Existing(&'a Message),
}

impl<'a> Append<'a> {
    pub fn is_inserted(&self) -> bool {
        matches!(self, Append::Inserted(_))
    }

    pub fn message(&self) -> &'a Message {
        match self {
            Append::Inserted(message) | Append::Existing(message) => message,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct MessageStore {
    ordered: BTreeMap<SortKey, Message>,
    index: HashMap<MessageId, SortKey>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with a snapshot.
    ///
    /// Duplicate ids inside the snapshot collapse to their first occurrence,
    /// the same rule `append` applies.
    pub fn load_snapshot(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.ordered.clear();
        self.index.clear();
        for message in messages {
            self.append(message);
        }
    }

    /// Insert a message unless its id is already stored.
    ///
    /// A known id returns the existing entry untouched, so a push event can
    /// never rewrite a message already reconciled from the snapshot.
    pub fn append(&mut self, message: Message) -> Append<'_> {
        // The key carries the id, so an occupied slot is the same message.
        let key = match self.index.get(&message.id) {
            Some(key) => *key,
            None => message.sort_key(),
        };
        match self.ordered.entry(key) {
            btree_map::Entry::Occupied(entry) => Append::Existing(entry.into_mut()),
            btree_map::Entry::Vacant(entry) => {
                self.index.insert(message.id, key);
                Append::Inserted(entry.insert(message))
            }
        }
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.index.get(&id).and_then(|key| self.ordered.get(key))
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.index.contains_key(&id)
    }

    /// Display-order position key of a stored message.
    pub fn sort_key_of(&self, id: MessageId) -> Option<(NaiveDateTime, MessageId)> {
        self.index.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Newest message.
    pub fn last(&self) -> Option<&Message> {
        self.ordered.values().next_back()
    }

    /// Messages in display order. Each call starts a fresh pass.
    pub fn iter(&self) -> Messages<'_> {
        Messages {
            inner: self.ordered.values(),
        }
    }

    /// Ids in display order.
    pub fn ids(&self) -> impl Iterator<Item = MessageId> + '_ {
        self.ordered.keys().map(|(_, id)| *id)
    }

    pub fn clear(&mut self) {
        self.ordered.clear();
        self.index.clear();
    }
}

impl<'a> IntoIterator for &'a MessageStore {
    type Item = &'a Message;
    type IntoIter = Messages<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Display-order iterator over a [`MessageStore`].
#[derive(Debug, Clone)]
pub struct Messages<'a> {
    inner: btree_map::Values<'a, SortKey, Message>,
}

impl<'a> Iterator for Messages<'a> {
    type Item = &'a Message;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl DoubleEndedIterator for Messages<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl ExactSizeIterator for Messages<'_> {}

impl FusedIterator for Messages<'_> {}

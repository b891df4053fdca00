//! Per-message viewer presence: who has seen what.
//!
//! Two feeds write into the same record:
//!
//! ```text
//! initial fetch (once per snapshot message) ──► seed()               union
//! push channel viewer update                ──► apply_push_update()  replace
//! ```
//!
//! A push update carries the full current set, so it replaces. A fetched
//! seed may be older than a push that overtook it on the network, so it only
//! ever adds. Records are keyed by message id alone; an update for a message
//! that is not stored yet is kept and shows up once the message does.

use std::collections::{btree_map, BTreeMap, HashMap, HashSet};

use crate::model::{MessageId, UserId, UserInfo};

/// Viewers of one message, ordered by user id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewerSet {
    viewers: BTreeMap<UserId, UserInfo>,
}

impl ViewerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.viewers.contains_key(&user)
    }

    pub fn iter(&self) -> btree_map::Values<'_, UserId, UserInfo> {
        self.viewers.values()
    }

    /// Whether every viewer in `other` is also in `self`.
    pub fn is_superset(&self, other: &ViewerSet) -> bool {
        other.viewers.keys().all(|id| self.viewers.contains_key(id))
    }

    fn insert(&mut self, viewer: UserInfo) -> bool {
        match self.viewers.get(&viewer.id) {
            Some(known) if *known == viewer => false,
            _ => {
                self.viewers.insert(viewer.id, viewer);
                true
            }
        }
    }
}

impl FromIterator<UserInfo> for ViewerSet {
    fn from_iter<I: IntoIterator<Item = UserInfo>>(iter: I) -> Self {
        let mut set = ViewerSet::new();
        for viewer in iter {
            set.insert(viewer);
        }
        set
    }
}

impl<'a> IntoIterator for &'a ViewerSet {
    type Item = &'a UserInfo;
    type IntoIter = btree_map::Values<'a, UserId, UserInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ViewerPresence {
    records: HashMap<MessageId, ViewerSet>,
    seeded: HashSet<MessageId>,
}

impl ViewerPresence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the one initial fetch allowed for a message.
    ///
    /// Returns `true` the first time it is called for `id`, `false` after.
    pub fn begin_seed(&mut self, id: MessageId) -> bool {
        self.seeded.insert(id)
    }

    /// Merge a fetched viewer list. Never removes a viewer.
    ///
    /// Returns `true` if the record changed.
    pub fn seed(&mut self, id: MessageId, viewers: impl IntoIterator<Item = UserInfo>) -> bool {
        let record = self.records.entry(id).or_default();
        let mut changed = false;
        for viewer in viewers {
            changed |= record.insert(viewer);
        }
        changed
    }

    /// Replace the record with a pushed full set.
    ///
    /// Returns `true` if the record changed.
    pub fn apply_push_update(&mut self, id: MessageId, viewers: impl IntoIterator<Item = UserInfo>) -> bool {
        let pushed: ViewerSet = viewers.into_iter().collect();
        match self.records.get(&id) {
            Some(current) if *current == pushed => false,
            _ => {
                if !self.records.get(&id).map_or(true, |current| pushed.is_superset(current)) {
                    log::debug!("viewer push for message {id} drops previously known viewers");
                }
                self.records.insert(id, pushed);
                true
            }
        }
    }

    pub fn get(&self, id: MessageId) -> Option<&ViewerSet> {
        self.records.get(&id)
    }

    pub fn count(&self, id: MessageId) -> usize {
        self.records.get(&id).map_or(0, ViewerSet::len)
    }

    /// Number of messages with a viewer record.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64) -> UserInfo {
        UserInfo::new(id, format!("user{id}"))
    }

    fn ids(set: &ViewerSet) -> Vec<i64> {
        set.iter().map(|v| v.id.0).collect()
    }

    #[test]
    fn test_begin_seed_once_per_message() {
        let mut presence = ViewerPresence::new();
        assert!(presence.begin_seed(MessageId(1)));
        assert!(!presence.begin_seed(MessageId(1)));
        assert!(presence.begin_seed(MessageId(2)));
    }

    #[test]
    fn test_seed_only_grows() {
        let mut presence = ViewerPresence::new();
        let id = MessageId(1);

        assert!(presence.seed(id, [user(2), user(3)]));
        let before = presence.get(id).unwrap().clone();

        // An older fetch result with fewer viewers.
        assert!(!presence.seed(id, [user(2)]));
        let after = presence.get(id).unwrap();
        assert!(after.is_superset(&before));
        assert_eq!(ids(after), vec![2, 3]);
    }

    #[test]
    fn test_push_sequence_of_supersets_is_monotonic() {
        let mut presence = ViewerPresence::new();
        let id = MessageId(1);
        let pushes = [vec![user(2)], vec![user(2), user(3)], vec![user(2), user(3), user(4)]];

        let mut previous = ViewerSet::new();
        for pushed in pushes {
            presence.apply_push_update(id, pushed);
            let current = presence.get(id).unwrap().clone();
            assert!(current.is_superset(&previous));
            previous = current;
        }
        assert_eq!(presence.count(id), 3);
    }

    #[test]
    fn test_push_non_superset_replaces() {
        let mut presence = ViewerPresence::new();
        let id = MessageId(1);
        presence.seed(id, [user(2), user(3)]);

        assert!(presence.apply_push_update(id, [user(4)]));
        assert_eq!(ids(presence.get(id).unwrap()), vec![4]);
    }

    #[test]
    fn test_identical_push_reports_no_change() {
        let mut presence = ViewerPresence::new();
        let id = MessageId(1);
        assert!(presence.apply_push_update(id, [user(2)]));
        assert!(!presence.apply_push_update(id, [user(2)]));
    }

    #[test]
    fn test_seed_after_push_keeps_pushed_viewers() {
        let mut presence = ViewerPresence::new();
        let id = MessageId(1);
        presence.apply_push_update(id, [user(2), user(3)]);
        presence.seed(id, Vec::<UserInfo>::new());
        assert_eq!(presence.count(id), 2);
    }

    #[test]
    fn test_unknown_message_count_is_zero() {
        let presence = ViewerPresence::new();
        assert_eq!(presence.count(MessageId(99)), 0);
        assert!(presence.get(MessageId(99)).is_none());
        assert!(presence.is_empty());
    }

    #[test]
    fn test_renamed_viewer_updates_entry() {
        let mut set = ViewerSet::new();
        assert!(set.insert(user(2)));
        assert!(!set.insert(user(2)));
        assert!(set.insert(UserInfo::new(2, "renamed")));
        assert_eq!(set.len(), 1);
        assert!(set.contains(UserId(2)));
    }
}

//! Live connections indexed by conversation.
//!
//! Owned by the coordinator task; nothing else touches it.

use std::collections::{HashMap, HashSet};

use chatwire_database::ConversationId;

use crate::connection::{ConnectionHandle, ConnectionId};

#[derive(Debug, Default)]
pub struct Registry {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    by_conversation: HashMap<ConversationId, HashSet<ConnectionId>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. A handle with the same id replaces the old one.
    pub fn insert(&mut self, connection: ConnectionHandle) -> Option<ConnectionHandle> {
        let replaced = self.remove(connection.id);

        self.by_conversation
            .entry(connection.conversation_id)
            .or_default()
            .insert(connection.id);
        self.connections.insert(connection.id, connection);

        replaced
    }

    /// Remove a connection. Returns `None` if it was not registered.
    pub fn remove(&mut self, id: ConnectionId) -> Option<ConnectionHandle> {
        let connection = self.connections.remove(&id)?;

        if let Some(members) = self.by_conversation.get_mut(&connection.conversation_id) {
            members.remove(&id);
            if members.is_empty() {
                self.by_conversation.remove(&connection.conversation_id);
            }
        }

        Some(connection)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&ConnectionHandle> {
        self.connections.get(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Connections currently bound to `conversation_id`.
    pub fn members(&self, conversation_id: ConversationId) -> impl Iterator<Item = &ConnectionHandle> + '_ {
        self.by_conversation
            .get(&conversation_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.connections.get(id))
    }

    pub fn member_ids(&self, conversation_id: ConversationId) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.members(conversation_id).map(|c| c.id).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn conversation_count(&self) -> usize {
        self.by_conversation.len()
    }

    /// Remove every connection.
    pub fn drain(&mut self) -> Vec<ConnectionHandle> {
        self.by_conversation.clear();
        self.connections.drain().map(|(_, connection)| connection).collect()
    }

    /// The index must equal `{c : c.conversation_id == k}` for every key.
    #[cfg(test)]
    pub(crate) fn assert_index_consistent(&self) {
        let mut expected: HashMap<ConversationId, HashSet<ConnectionId>> = HashMap::new();
        for connection in self.connections.values() {
            expected
                .entry(connection.conversation_id)
                .or_default()
                .insert(connection.id);
        }
        assert_eq!(expected, self.by_conversation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatwire_auth::Identity;

    fn connection(user_id: i64, conversation_id: ConversationId) -> ConnectionHandle {
        ConnectionHandle::new(Identity::new(user_id, 1), conversation_id, 4).0
    }

    #[test]
    fn index_tracks_inserts_and_removals() {
        let mut registry = Registry::new();
        let a = connection(1, 7);
        let b = connection(2, 7);
        let c = connection(3, 9);
        let (a_id, b_id, c_id) = (a.id, b.id, c.id);

        registry.insert(a);
        registry.insert(b);
        registry.insert(c);
        registry.assert_index_consistent();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.conversation_count(), 2);

        let mut expected = vec![a_id, b_id];
        expected.sort();
        assert_eq!(registry.member_ids(7), expected);
        assert_eq!(registry.member_ids(9), vec![c_id]);
        assert!(registry.member_ids(11).is_empty());

        assert!(registry.remove(a_id).is_some());
        registry.assert_index_consistent();
        assert_eq!(registry.member_ids(7), vec![b_id]);

        assert!(registry.remove(c_id).is_some());
        registry.assert_index_consistent();
        assert_eq!(registry.conversation_count(), 1);
    }

    #[test]
    fn removing_twice_is_a_noop() {
        let mut registry = Registry::new();
        let a = connection(1, 7);
        let id = a.id;
        registry.insert(a);

        assert!(registry.remove(id).is_some());
        assert!(registry.remove(id).is_none());
        assert!(registry.is_empty());
        registry.assert_index_consistent();
    }

    #[test]
    fn same_user_may_hold_several_connections() {
        let mut registry = Registry::new();
        registry.insert(connection(1, 7));
        registry.insert(connection(1, 7));
        registry.insert(connection(1, 8));

        assert_eq!(registry.members(7).count(), 2);
        assert_eq!(registry.members(8).count(), 1);
        registry.assert_index_consistent();
    }

    #[test]
    fn drain_empties_everything() {
        let mut registry = Registry::new();
        registry.insert(connection(1, 7));
        registry.insert(connection(2, 8));

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
        assert_eq!(registry.conversation_count(), 0);
        registry.assert_index_consistent();
    }
}

//! Connection registry.
//!
//! Two-way index between transport connections and characters. A character
//! has at most one bound connection; binding a new one revokes the old, so
//! anything still arriving on the old connection resolves to nothing.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use horde_shared::net::{CharacterId, ConnectionId};

#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    by_connection: HashMap<ConnectionId, CharacterId>,
    by_character: HashMap<CharacterId, ConnectionId>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Binds `connection` to `character`.
    ///
    /// Returns the connection previously bound to `character`, which is now
    /// revoked. If `connection` was bound to some other character, that
    /// binding is dropped as well.
    pub fn bind(&self, connection: ConnectionId, character: &CharacterId) -> Option<ConnectionId> {
        let mut inner = self.lock();

        if let Some(previous) = inner.by_connection.remove(&connection) {
            if previous != *character && inner.by_character.get(&previous) == Some(&connection) {
                inner.by_character.remove(&previous);
            }
        }

        let revoked = inner
            .by_character
            .insert(character.clone(), connection)
            .filter(|old| *old != connection);
        if let Some(old) = revoked {
            inner.by_connection.remove(&old);
        }
        inner.by_connection.insert(connection, character.clone());
        revoked
    }

    pub fn resolve(&self, connection: ConnectionId) -> Option<CharacterId> {
        self.lock().by_connection.get(&connection).cloned()
    }

    pub fn connection_of(&self, character: &CharacterId) -> Option<ConnectionId> {
        self.lock().by_character.get(character).copied()
    }

    /// Removes `connection`'s mapping. Returns the character it was bound to.
    pub fn unbind(&self, connection: ConnectionId) -> Option<CharacterId> {
        let mut inner = self.lock();
        let character = inner.by_connection.remove(&connection)?;
        if inner.by_character.get(&character) == Some(&connection) {
            inner.by_character.remove(&character);
        }
        Some(character)
    }

    pub fn len(&self) -> usize {
        self.lock().by_connection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(id: &str) -> CharacterId {
        CharacterId::from(id)
    }

    #[test]
    fn bind_and_resolve() {
        let reg = ConnectionRegistry::new();
        assert_eq!(reg.bind(ConnectionId(1), &c("c1")), None);
        assert_eq!(reg.resolve(ConnectionId(1)), Some(c("c1")));
        assert_eq!(reg.connection_of(&c("c1")), Some(ConnectionId(1)));
    }

    #[test]
    fn rebinding_a_character_revokes_the_old_connection() {
        let reg = ConnectionRegistry::new();
        reg.bind(ConnectionId(1), &c("c1"));
        assert_eq!(reg.bind(ConnectionId(2), &c("c1")), Some(ConnectionId(1)));

        assert_eq!(reg.resolve(ConnectionId(1)), None);
        assert_eq!(reg.resolve(ConnectionId(2)), Some(c("c1")));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn rebinding_same_pair_is_not_a_revocation() {
        let reg = ConnectionRegistry::new();
        reg.bind(ConnectionId(1), &c("c1"));
        assert_eq!(reg.bind(ConnectionId(1), &c("c1")), None);
        assert_eq!(reg.resolve(ConnectionId(1)), Some(c("c1")));
    }

    #[test]
    fn switching_character_on_one_connection_drops_old_character() {
        let reg = ConnectionRegistry::new();
        reg.bind(ConnectionId(1), &c("c1"));
        reg.bind(ConnectionId(1), &c("c2"));

        assert_eq!(reg.resolve(ConnectionId(1)), Some(c("c2")));
        assert_eq!(reg.connection_of(&c("c1")), None);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn unbind_stale_connection_keeps_live_binding() {
        let reg = ConnectionRegistry::new();
        reg.bind(ConnectionId(1), &c("c1"));
        reg.bind(ConnectionId(2), &c("c1"));

        assert_eq!(reg.unbind(ConnectionId(1)), None);
        assert_eq!(reg.connection_of(&c("c1")), Some(ConnectionId(2)));

        assert_eq!(reg.unbind(ConnectionId(2)), Some(c("c1")));
        assert!(reg.is_empty());
        assert_eq!(reg.unbind(ConnectionId(2)), None);
    }
}

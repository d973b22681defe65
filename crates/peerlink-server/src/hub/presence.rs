use std::collections::{HashMap, HashSet};
use std::future::Future;

use peerlink_shared::{ConnId, UserId};

/// Read-only presence view shared with the HTTP layer.
pub trait OnlineLookup {
    fn is_online(&self, user: &UserId) -> impl Future<Output = bool> + Send;
}

/// User identity -> currently open connections.
///
/// An entry exists only while its set is non-empty.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    users: HashMap<UserId, HashSet<ConnId>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when this is the user's first open connection, i.e. the
    /// user just came online.
    pub fn register_online(&mut self, user: &UserId, conn: ConnId) -> bool {
        let conns = self.users.entry(user.clone()).or_default();
        let first = conns.is_empty();
        conns.insert(conn);
        first
    }

    /// Returns `true` when the last connection went away and the user is now
    /// offline. Unknown users or connections are a no-op.
    pub fn unregister(&mut self, user: &UserId, conn: ConnId) -> bool {
        let Some(conns) = self.users.get_mut(user) else {
            return false;
        };
        if !conns.remove(&conn) {
            return false;
        }
        if conns.is_empty() {
            self.users.remove(user);
            return true;
        }
        false
    }

    pub fn is_online(&self, user: &UserId) -> bool {
        self.users.contains_key(user)
    }

    pub fn connections_for(&self, user: &UserId) -> Vec<ConnId> {
        self.users
            .get(user)
            .map(|conns| conns.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn online_count(&self) -> usize {
        self.users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_and_last_connection_transitions() {
        let mut registry = PresenceRegistry::new();
        let user = UserId::from("u1");
        let (c1, c2) = (ConnId::new(), ConnId::new());

        assert!(registry.register_online(&user, c1));
        assert!(!registry.register_online(&user, c2));
        assert_eq!(registry.connections_for(&user).len(), 2);

        assert!(!registry.unregister(&user, c1));
        assert!(registry.is_online(&user));
        assert!(registry.unregister(&user, c2));
        assert!(!registry.is_online(&user));
        assert_eq!(registry.online_count(), 0);
    }

    #[test]
    fn test_duplicate_registration_is_idempotent() {
        let mut registry = PresenceRegistry::new();
        let user = UserId::from("u1");
        let conn = ConnId::new();

        assert!(registry.register_online(&user, conn));
        assert!(!registry.register_online(&user, conn));
        assert_eq!(registry.connections_for(&user), vec![conn]);
        assert!(registry.unregister(&user, conn));
    }

    #[test]
    fn test_n_registrations_then_n_unregistrations() {
        let mut registry = PresenceRegistry::new();
        let user = UserId::from("u1");
        let conns: Vec<ConnId> = (0..5).map(|_| ConnId::new()).collect();

        let online_events = conns
            .iter()
            .filter(|c| registry.register_online(&user, **c))
            .count();
        let offline_events = conns
            .iter()
            .filter(|c| registry.unregister(&user, **c))
            .count();

        assert_eq!(online_events, 1);
        assert_eq!(offline_events, 1);
        assert!(registry.connections_for(&user).is_empty());
    }

    #[test]
    fn test_double_unregister_is_noop() {
        let mut registry = PresenceRegistry::new();
        let user = UserId::from("u1");
        let conn = ConnId::new();

        assert!(!registry.unregister(&user, conn));
        registry.register_online(&user, conn);
        assert!(registry.unregister(&user, conn));
        assert!(!registry.unregister(&user, conn));
    }
}

//! Presence directory: which user is reachable on which connection.
//!
//! Owned by the registry actor, so plain maps suffice; every mutation is
//! followed by a full-roster rebroadcast (accepted scaling limitation).

use std::collections::HashMap;
use std::fmt;

use signal_protocol::UserId;
use uuid::Uuid;

/// Ephemeral identifier for one live WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Maps each online user to its single live connection.
///
/// A user reconnecting before the old socket is reaped simply overwrites the
/// mapping (last-write-wins); removal matches on the connection id, so the
/// stale socket's eventual disconnect cannot evict the fresh registration.
#[derive(Debug, Default)]
pub struct ConnectionDirectory {
    users: HashMap<UserId, ConnectionId>,
}

impl ConnectionDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `user` on `conn`, returning the connection it replaced, if
    /// any.
    pub fn join(&mut self, user: UserId, conn: ConnectionId) -> Option<ConnectionId> {
        self.users.insert(user, conn).filter(|old| *old != conn)
    }

    /// Resolve a user to its live connection.
    #[must_use]
    pub fn resolve(&self, user: &UserId) -> Option<ConnectionId> {
        self.users.get(user).copied()
    }

    /// Remove the entry whose connection matches `conn`, returning the user
    /// that went offline.
    pub fn remove_connection(&mut self, conn: ConnectionId) -> Option<UserId> {
        let user = self
            .users
            .iter()
            .find_map(|(user, c)| (*c == conn).then(|| user.clone()))?;
        self.users.remove(&user);
        Some(user)
    }

    /// Snapshot of all online user ids, for the roster rebroadcast.
    #[must_use]
    pub fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.users.keys().cloned().collect();
        users.sort();
        users
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn join_then_resolve() {
        let mut directory = ConnectionDirectory::new();
        let conn = ConnectionId::new();

        assert!(directory.join(UserId::from("alice"), conn).is_none());
        assert_eq!(directory.resolve(&UserId::from("alice")), Some(conn));
        assert!(directory.resolve(&UserId::from("bob")).is_none());
    }

    #[test]
    fn reconnect_is_last_write_wins() {
        let mut directory = ConnectionDirectory::new();
        let old = ConnectionId::new();
        let new = ConnectionId::new();

        directory.join(UserId::from("alice"), old);
        let replaced = directory.join(UserId::from("alice"), new);

        assert_eq!(replaced, Some(old));
        assert_eq!(directory.resolve(&UserId::from("alice")), Some(new));
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn stale_connection_removal_keeps_fresh_registration() {
        let mut directory = ConnectionDirectory::new();
        let old = ConnectionId::new();
        let new = ConnectionId::new();

        directory.join(UserId::from("alice"), old);
        directory.join(UserId::from("alice"), new);

        // The stale socket disconnects after the reconnect.
        assert!(directory.remove_connection(old).is_none());
        assert_eq!(directory.resolve(&UserId::from("alice")), Some(new));
    }

    #[test]
    fn remove_connection_reports_the_user() {
        let mut directory = ConnectionDirectory::new();
        let conn = ConnectionId::new();

        directory.join(UserId::from("alice"), conn);
        assert_eq!(
            directory.remove_connection(conn),
            Some(UserId::from("alice"))
        );
        assert!(directory.is_empty());
    }

    #[test]
    fn roster_snapshot_is_sorted() {
        let mut directory = ConnectionDirectory::new();
        directory.join(UserId::from("carol"), ConnectionId::new());
        directory.join(UserId::from("alice"), ConnectionId::new());
        directory.join(UserId::from("bob"), ConnectionId::new());

        let roster = directory.online_users();
        assert_eq!(
            roster,
            vec![
                UserId::from("alice"),
                UserId::from("bob"),
                UserId::from("carol")
            ]
        );
    }
}

//! Collaboration sessions: ephemeral broadcast groups keyed by note slug.

use std::collections::HashMap;

use peerlink_shared::constants::COLLAB_COLORS;
use peerlink_shared::{ConnId, UserId};
use rand::seq::SliceRandom;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMember {
    pub user_id: UserId,
    pub username: String,
    /// Picked at join time, valid for this join only.
    pub color: String,
}

#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<String, HashMap<ConnId, SessionMember>>,
}

fn pick_color() -> String {
    COLLAB_COLORS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("#4363d8")
        .to_string()
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `conn` and return its membership plus everyone now in the session,
    /// the joiner included.
    pub fn join(
        &mut self,
        slug: &str,
        conn: ConnId,
        user_id: UserId,
        username: String,
    ) -> (SessionMember, Vec<ConnId>) {
        let member = SessionMember {
            user_id,
            username,
            color: pick_color(),
        };
        let session = self.sessions.entry(slug.to_string()).or_default();
        session.insert(conn, member.clone());
        (member, session.keys().copied().collect())
    }

    /// Members other than `conn`, or `None` when `conn` has not joined.
    pub fn others(&self, slug: &str, conn: ConnId) -> Option<Vec<ConnId>> {
        let session = self.sessions.get(slug)?;
        if !session.contains_key(&conn) {
            return None;
        }
        Some(session.keys().copied().filter(|c| *c != conn).collect())
    }

    pub fn member(&self, slug: &str, conn: ConnId) -> Option<&SessionMember> {
        self.sessions.get(slug)?.get(&conn)
    }

    /// Remove `conn`; returns the departed member and the members left
    /// behind. Empty sessions are dropped.
    pub fn leave(&mut self, slug: &str, conn: ConnId) -> Option<(SessionMember, Vec<ConnId>)> {
        let session = self.sessions.get_mut(slug)?;
        let member = session.remove(&conn)?;
        let remaining: Vec<ConnId> = session.keys().copied().collect();
        if remaining.is_empty() {
            self.sessions.remove(slug);
        }
        Some((member, remaining))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

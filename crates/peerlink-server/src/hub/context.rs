use peerlink_shared::{ConnId, Role, RoomId, UserId};

/// Per-connection state, created on connect and owned by the connection
/// task. Handlers read and update it; nothing else holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    pub id: ConnId,
    pub user_id: Option<UserId>,
    pub room_id: Option<RoomId>,
    pub role: Option<Role>,
    /// Collaboration session (note slug) last joined.
    pub note_slug: Option<String>,
}

impl ConnectionContext {
    pub fn new(id: ConnId) -> Self {
        Self {
            id,
            user_id: None,
            room_id: None,
            role: None,
            note_slug: None,
        }
    }

    /// Explicit room id from the payload, else the room this connection is in.
    pub fn room_or(&self, explicit: Option<RoomId>) -> Option<RoomId> {
        explicit.or_else(|| self.room_id.clone())
    }

    pub fn enter_room(&mut self, room_id: RoomId, role: Role) {
        self.room_id = Some(room_id);
        self.role = Some(role);
    }
}

//! Signaling relay routing.
//!
//! Offers, answers and ICE candidates are forwarded untouched. A message
//! names either one connection (`to`) or a room; a room fans out to every
//! other current member.

use peerlink_shared::{ConnId, RoomId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayTarget {
    Conn(ConnId),
    Room(RoomId),
}

/// `to` wins over an explicit room, which wins over the sender's current
/// room. `None` means the message has nowhere to go.
pub fn resolve(
    to: Option<ConnId>,
    room_id: Option<RoomId>,
    current_room: Option<&RoomId>,
) -> Option<RelayTarget> {
    if let Some(conn) = to {
        return Some(RelayTarget::Conn(conn));
    }
    room_id
        .or_else(|| current_room.cloned())
        .map(RelayTarget::Room)
}

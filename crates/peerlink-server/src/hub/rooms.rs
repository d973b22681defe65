//! Transfer room state machine.
//!
//! A room id is opaque and chosen by the browser sharing the link. The first
//! connection to touch an unknown id becomes its sender; one receiver may be
//! admitted at a time. Rooms are never removed: after both parties leave the
//! shell (and its password gate) stays so the link can be reused.

use std::collections::HashMap;

use peerlink_shared::protocol::ServerEvent;
use peerlink_shared::{ConnId, Role, RoomId};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("Incorrect password")]
    IncorrectPassword,

    #[error("Room is busy: another receiver is already connected")]
    RoomBusy,

    /// Sender-only action by someone else. Never reported to the caller so
    /// room occupancy does not leak.
    #[error("Not permitted")]
    Unauthorized,
}

impl TransferError {
    /// Event reported back to the requesting connection, if any.
    pub fn to_event(&self) -> Option<ServerEvent> {
        match self {
            TransferError::IncorrectPassword => Some(ServerEvent::TransferError {
                reason: self.to_string(),
                requires_password: Some(true),
            }),
            TransferError::RoomBusy => Some(ServerEvent::TransferError {
                reason: self.to_string(),
                requires_password: None,
            }),
            TransferError::Unauthorized => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferRoom {
    pub sender: Option<ConnId>,
    pub receiver: Option<ConnId>,
    pub approved: bool,
    pub password_hash: Option<String>,
}

impl TransferRoom {
    fn is_member(&self, conn: ConnId) -> bool {
        self.sender == Some(conn) || self.receiver == Some(conn)
    }

    fn others(&self, conn: ConnId) -> Vec<ConnId> {
        [self.sender, self.receiver]
            .into_iter()
            .flatten()
            .filter(|c| *c != conn)
            .collect()
    }

    fn as_sender(&self) -> Joined {
        Joined {
            role: Role::Sender,
            requires_password: self.password_hash.is_some(),
            notify: None,
        }
    }

    fn check_gate(&self, supplied: Option<&str>) -> Result<(), TransferError> {
        match self.password_hash.as_deref() {
            Some(expected) if supplied != Some(expected) => Err(TransferError::IncorrectPassword),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RoomState {
    #[default]
    Empty,
    Active(TransferRoom),
}

/// Successful entry into a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joined {
    pub role: Role,
    pub requires_password: bool,
    /// Sender to notify with `peer-joined` when a receiver was admitted.
    pub notify: Option<ConnId>,
}

/// A member left a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub role: Role,
    /// The member still in the room, who gets `peer-left`.
    pub remaining: Option<ConnId>,
}

/// Public view used by the link-check endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomStatus {
    pub exists: bool,
    pub requires_password: bool,
}

#[derive(Debug, Default)]
pub struct RoomTable {
    rooms: HashMap<RoomId, RoomState>,
}

impl RoomTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// `join-room`.
    ///
    /// `password` distinguishes an absent field (`None`) from an explicit
    /// clear (`Some(None)`); only the sender may change the gate this way.
    pub fn join(
        &mut self,
        room_id: &RoomId,
        conn: ConnId,
        password: Option<Option<String>>,
    ) -> Result<Joined, TransferError> {
        let state = self.rooms.entry(room_id.clone()).or_default();

        let room = match state {
            RoomState::Empty => {
                let room = TransferRoom {
                    sender: Some(conn),
                    password_hash: password.flatten(),
                    ..Default::default()
                };
                let joined = room.as_sender();
                *state = RoomState::Active(room);
                info!(room = %room_id, conn = %conn, "Created transfer room");
                return Ok(joined);
            }
            RoomState::Active(room) => room,
        };

        if room.sender.is_none() || room.sender == Some(conn) {
            room.sender = Some(conn);
            if let Some(hash) = password {
                room.password_hash = hash;
            }
            debug!(room = %room_id, conn = %conn, "Sender (re)claimed room");
            return Ok(room.as_sender());
        }

        let supplied = password.flatten();
        room.check_gate(supplied.as_deref())?;

        match room.receiver {
            Some(existing) if existing != conn => return Err(TransferError::RoomBusy),
            _ => room.receiver = Some(conn),
        }

        info!(room = %room_id, conn = %conn, "Receiver joined transfer room");

        Ok(Joined {
            role: Role::Receiver,
            requires_password: room.password_hash.is_some(),
            notify: room.sender,
        })
    }

    /// `create-room`: claim the sender slot, never the receiver slot.
    pub fn claim_sender(&mut self, room_id: &RoomId, conn: ConnId) -> Result<Joined, TransferError> {
        if let Some(RoomState::Active(room)) = self.rooms.get(room_id) {
            if room.sender.is_some_and(|sender| sender != conn) {
                return Err(TransferError::RoomBusy);
            }
        }
        self.join(room_id, conn, None)
    }

    /// Set or clear the gate. Returns whether the room is now protected.
    pub fn set_password(
        &mut self,
        room_id: &RoomId,
        conn: ConnId,
        password_hash: Option<String>,
    ) -> Result<bool, TransferError> {
        let room = self.sender_room_mut(room_id, conn)?;
        room.password_hash = password_hash;
        Ok(room.password_hash.is_some())
    }

    /// Validate a `transfer-request` and return who should receive it.
    pub fn request(
        &self,
        room_id: &RoomId,
        conn: ConnId,
        password_hash: Option<&str>,
    ) -> Result<Vec<ConnId>, TransferError> {
        let room = self.member_room(room_id, conn)?;
        if room.sender != Some(conn) {
            room.check_gate(password_hash)?;
        }
        Ok(room.others(conn))
    }

    pub fn accept(&mut self, room_id: &RoomId, conn: ConnId) -> Result<Vec<ConnId>, TransferError> {
        let room = self.sender_room_mut(room_id, conn)?;
        room.approved = true;
        Ok(room.others(conn))
    }

    pub fn decline(&mut self, room_id: &RoomId, conn: ConnId) -> Result<Vec<ConnId>, TransferError> {
        let room = self.sender_room_mut(room_id, conn)?;
        room.approved = false;
        Ok(room.others(conn))
    }

    /// Either side may cancel an in-flight transfer.
    pub fn cancel(&mut self, room_id: &RoomId, conn: ConnId) -> Result<Vec<ConnId>, TransferError> {
        let room = match self.rooms.get_mut(room_id) {
            Some(RoomState::Active(room)) if room.is_member(conn) => room,
            _ => return Err(TransferError::Unauthorized),
        };
        room.approved = false;
        Ok(room.others(conn))
    }

    /// Members other than `conn`; empty unless `conn` is itself in the room.
    pub fn others(&self, room_id: &RoomId, conn: ConnId) -> Vec<ConnId> {
        self.member_room(room_id, conn)
            .map(|room| room.others(conn))
            .unwrap_or_default()
    }

    /// Disconnect cleanup. The sender leaving empties both slots; the
    /// receiver leaving frees only its own. The gate always survives.
    pub fn leave(&mut self, room_id: &RoomId, conn: ConnId) -> Option<Departure> {
        let Some(RoomState::Active(room)) = self.rooms.get_mut(room_id) else {
            return None;
        };

        let departure = if room.sender == Some(conn) {
            room.sender = None;
            Departure {
                role: Role::Sender,
                remaining: room.receiver.take(),
            }
        } else if room.receiver == Some(conn) {
            room.receiver = None;
            Departure {
                role: Role::Receiver,
                remaining: room.sender,
            }
        } else {
            return None;
        };
        room.approved = false;

        debug!(
            room = %room_id,
            conn = %conn,
            role = ?departure.role,
            "Member left transfer room"
        );

        Some(departure)
    }

    pub fn status(&self, room_id: &RoomId) -> RoomStatus {
        match self.rooms.get(room_id) {
            Some(RoomState::Active(room)) => RoomStatus {
                exists: true,
                requires_password: room.password_hash.is_some(),
            },
            _ => RoomStatus {
                exists: false,
                requires_password: false,
            },
        }
    }

    pub fn get(&self, room_id: &RoomId) -> Option<&TransferRoom> {
        match self.rooms.get(room_id) {
            Some(RoomState::Active(room)) => Some(room),
            _ => None,
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn member_room(&self, room_id: &RoomId, conn: ConnId) -> Result<&TransferRoom, TransferError> {
        match self.rooms.get(room_id) {
            Some(RoomState::Active(room)) if room.is_member(conn) => Ok(room),
            _ => Err(TransferError::Unauthorized),
        }
    }

    fn sender_room_mut(
        &mut self,
        room_id: &RoomId,
        conn: ConnId,
    ) -> Result<&mut TransferRoom, TransferError> {
        match self.rooms.get_mut(room_id) {
            Some(RoomState::Active(room)) if room.sender == Some(conn) => Ok(room),
            _ => Err(TransferError::Unauthorized),
        }
    }
}

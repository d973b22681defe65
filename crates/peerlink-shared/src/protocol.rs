//! WebSocket event protocol.
//!
//! Every frame is a JSON text message shaped as
//! `{"event": "<name>", "data": { ... }}` in both directions. Payload fields
//! are camelCase. Negotiation blobs (`sdp`, `candidate`), transfer `info` and
//! note content are carried as opaque JSON values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::PeerlinkError;
use crate::types::{ConnId, Role, RoomId, UserId};

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`).
fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Events a browser sends to the hub.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "user-online", rename_all = "camelCase")]
    UserOnline { user_id: UserId },

    #[serde(rename = "create-room", rename_all = "camelCase")]
    CreateRoom { room_id: RoomId },

    #[serde(rename = "join-room", rename_all = "camelCase")]
    JoinRoom {
        room_id: RoomId,
        #[serde(default, deserialize_with = "double_option")]
        password_hash: Option<Option<String>>,
    },

    #[serde(rename = "offer", rename_all = "camelCase")]
    Offer {
        #[serde(default)]
        to: Option<ConnId>,
        #[serde(default)]
        room_id: Option<RoomId>,
        sdp: Value,
    },

    #[serde(rename = "answer", rename_all = "camelCase")]
    Answer { to: ConnId, sdp: Value },

    #[serde(rename = "ice-candidate", rename_all = "camelCase")]
    IceCandidate {
        #[serde(default)]
        to: Option<ConnId>,
        #[serde(default)]
        room_id: Option<RoomId>,
        candidate: Value,
    },

    #[serde(rename = "transfer-request", rename_all = "camelCase")]
    TransferRequest {
        #[serde(default)]
        room_id: Option<RoomId>,
        #[serde(default)]
        info: Value,
        #[serde(default)]
        password_hash: Option<String>,
    },

    #[serde(rename = "set-room-password", rename_all = "camelCase")]
    SetRoomPassword {
        #[serde(default)]
        room_id: Option<RoomId>,
        #[serde(default)]
        password_hash: Option<String>,
    },

    #[serde(rename = "transfer-accepted", rename_all = "camelCase")]
    TransferAccepted {
        #[serde(default)]
        room_id: Option<RoomId>,
    },

    #[serde(rename = "transfer-declined", rename_all = "camelCase")]
    TransferDeclined {
        #[serde(default)]
        room_id: Option<RoomId>,
        #[serde(default)]
        reason: Option<String>,
    },

    #[serde(rename = "transfer-canceled", rename_all = "camelCase")]
    TransferCanceled {
        #[serde(default)]
        room_id: Option<RoomId>,
        #[serde(default)]
        by: Option<String>,
    },

    #[serde(rename = "chat-message")]
    ChatMessage {
        from: UserId,
        to: UserId,
        text: String,
    },

    #[serde(rename = "note:join", rename_all = "camelCase")]
    NoteJoin {
        note_slug: String,
        user_id: UserId,
        username: String,
    },

    #[serde(rename = "note:content-update", rename_all = "camelCase")]
    NoteContentUpdate {
        note_slug: String,
        content: Value,
        user_id: UserId,
    },

    #[serde(rename = "note:cursor-update", rename_all = "camelCase")]
    NoteCursorUpdate {
        note_slug: String,
        user_id: UserId,
        #[serde(default)]
        position: Value,
        #[serde(default)]
        selection: Value,
    },

    #[serde(rename = "note:typing", rename_all = "camelCase")]
    NoteTyping {
        note_slug: String,
        user_id: UserId,
        is_typing: bool,
    },

    #[serde(rename = "note:leave", rename_all = "camelCase")]
    NoteLeave { note_slug: String, user_id: UserId },
}

impl ClientEvent {
    /// Decode a text frame. A missing or `null` `data` member is read as an
    /// empty payload so events whose fields are all optional may omit it.
    pub fn from_json(text: &str) -> Result<Self, PeerlinkError> {
        let mut frame: Value = serde_json::from_str(text)?;
        if let Some(obj) = frame.as_object_mut() {
            let missing = obj.get("data").map_or(true, Value::is_null);
            if missing {
                obj.insert("data".to_string(), Value::Object(Default::default()));
            }
        }
        Ok(serde_json::from_value(frame)?)
    }

    /// Wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::UserOnline { .. } => "user-online",
            Self::CreateRoom { .. } => "create-room",
            Self::JoinRoom { .. } => "join-room",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice-candidate",
            Self::TransferRequest { .. } => "transfer-request",
            Self::SetRoomPassword { .. } => "set-room-password",
            Self::TransferAccepted { .. } => "transfer-accepted",
            Self::TransferDeclined { .. } => "transfer-declined",
            Self::TransferCanceled { .. } => "transfer-canceled",
            Self::ChatMessage { .. } => "chat-message",
            Self::NoteJoin { .. } => "note:join",
            Self::NoteContentUpdate { .. } => "note:content-update",
            Self::NoteCursorUpdate { .. } => "note:cursor-update",
            Self::NoteTyping { .. } => "note:typing",
            Self::NoteLeave { .. } => "note:leave",
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Events the hub pushes to browsers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "connected")]
    Connected { id: ConnId },

    #[serde(rename = "user-status-changed", rename_all = "camelCase")]
    UserStatusChanged { user_id: UserId, online: bool },

    #[serde(rename = "room-joined", rename_all = "camelCase")]
    RoomJoined {
        room_id: RoomId,
        role: Role,
        requires_password: bool,
    },

    #[serde(rename = "room-password-updated", rename_all = "camelCase")]
    RoomPasswordUpdated {
        room_id: RoomId,
        requires_password: bool,
    },

    #[serde(rename = "peer-joined")]
    PeerJoined { id: ConnId },

    #[serde(rename = "peer-left")]
    PeerLeft { id: ConnId },

    #[serde(rename = "transfer-error", rename_all = "camelCase")]
    TransferError {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        requires_password: Option<bool>,
    },

    #[serde(rename = "transfer-request", rename_all = "camelCase")]
    TransferRequest {
        from: ConnId,
        room_id: RoomId,
        info: Value,
    },

    #[serde(rename = "transfer-accepted", rename_all = "camelCase")]
    TransferAccepted { from: ConnId, room_id: RoomId },

    #[serde(rename = "transfer-declined", rename_all = "camelCase")]
    TransferDeclined {
        from: ConnId,
        room_id: RoomId,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    #[serde(rename = "transfer-canceled", rename_all = "camelCase")]
    TransferCanceled {
        from: ConnId,
        room_id: RoomId,
        #[serde(skip_serializing_if = "Option::is_none")]
        by: Option<String>,
    },

    #[serde(rename = "offer")]
    Offer { from: ConnId, sdp: Value },

    #[serde(rename = "answer")]
    Answer { from: ConnId, sdp: Value },

    #[serde(rename = "ice-candidate")]
    IceCandidate { from: ConnId, candidate: Value },

    #[serde(rename = "chat-message")]
    ChatMessage {
        from: UserId,
        to: UserId,
        text: String,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "note:user-joined", rename_all = "camelCase")]
    NoteUserJoined {
        user_id: UserId,
        username: String,
        socket_id: ConnId,
        color: String,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "note:content-changed", rename_all = "camelCase")]
    NoteContentChanged {
        content: Value,
        user_id: UserId,
        socket_id: ConnId,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "note:cursor-changed", rename_all = "camelCase")]
    NoteCursorChanged {
        user_id: UserId,
        socket_id: ConnId,
        position: Value,
        selection: Value,
        color: String,
    },

    #[serde(rename = "note:user-typing", rename_all = "camelCase")]
    NoteUserTyping {
        user_id: UserId,
        socket_id: ConnId,
        is_typing: bool,
    },

    #[serde(rename = "note:user-left", rename_all = "camelCase")]
    NoteUserLeft { user_id: UserId, socket_id: ConnId },
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String, PeerlinkError> {
        Ok(serde_json::to_string(self)?)
    }
}

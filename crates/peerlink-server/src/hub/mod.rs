//! Connection coordination hub.
//!
//! Owns the three shared tables (presence, transfer rooms, note sessions) and
//! the outbound channel of every live connection. Each table sits behind its
//! own lock; handlers mutate a table, release it, and only then push events.
//! Presence is the exception: status changes are queued while the presence
//! guard is held, so the lock order is always presence, then connections.
//! No lock is held across an `.await` on another task.

pub mod context;
pub mod presence;
pub mod rooms;
pub mod sessions;
pub mod signaling;

mod chat;
mod collab;
mod transfer;


use std::collections::HashMap;
use std::sync::Arc;

use peerlink_shared::crypto::ChatCipher;
use peerlink_shared::protocol::{ClientEvent, ServerEvent};
use peerlink_shared::{ConnId, RoomId, UserId};
use peerlink_store::MessageStore;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

pub use context::ConnectionContext;
pub use presence::OnlineLookup;
pub use rooms::RoomStatus;

use chat::ChatPipeline;
use presence::PresenceRegistry;
use rooms::RoomTable;
use sessions::SessionTable;
use transfer::Signal;

struct HubInner {
    connections: RwLock<HashMap<ConnId, mpsc::Sender<ServerEvent>>>,
    presence: RwLock<PresenceRegistry>,
    rooms: RwLock<RoomTable>,
    sessions: RwLock<SessionTable>,
    chat: ChatPipeline,
    outbound_buffer: usize,
}

/// Cheap to clone; every clone shares the same state.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Hub {
    pub fn new(cipher: ChatCipher, store: Arc<dyn MessageStore>, outbound_buffer: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                connections: RwLock::new(HashMap::new()),
                presence: RwLock::new(PresenceRegistry::new()),
                rooms: RwLock::new(RoomTable::new()),
                sessions: RwLock::new(SessionTable::new()),
                chat: ChatPipeline::new(cipher, store),
                outbound_buffer: outbound_buffer.max(1),
            }),
        }
    }

    /// Register a new connection. The returned receiver yields every event
    /// addressed to it, starting with `connected`.
    pub async fn connect(&self) -> (ConnectionContext, mpsc::Receiver<ServerEvent>) {
        let id = ConnId::new();
        let (tx, rx) = mpsc::channel(self.inner.outbound_buffer);

        // Fresh channel with capacity >= 1, cannot be full.
        let _ = tx.try_send(ServerEvent::Connected { id });
        self.inner.connections.write().await.insert(id, tx);

        info!(conn = %id, "Connection opened");
        (ConnectionContext::new(id), rx)
    }

    /// Dispatch one inbound event. Events from a single connection must be
    /// handled in arrival order, which the caller guarantees by awaiting each
    /// call before the next.
    pub async fn handle(&self, ctx: &mut ConnectionContext, event: ClientEvent) {
        debug!(conn = %ctx.id, event = event.name(), "Inbound event");

        match event {
            ClientEvent::UserOnline { user_id } => self.user_online(ctx, user_id).await,
            ClientEvent::CreateRoom { room_id } => self.create_room(ctx, room_id).await,
            ClientEvent::JoinRoom {
                room_id,
                password_hash,
            } => self.join_room(ctx, room_id, password_hash).await,
            ClientEvent::Offer { to, room_id, sdp } => {
                self.relay(ctx, Signal::Offer, to, room_id, sdp).await
            }
            ClientEvent::Answer { to, sdp } => {
                self.relay(ctx, Signal::Answer, Some(to), None, sdp).await
            }
            ClientEvent::IceCandidate {
                to,
                room_id,
                candidate,
            } => {
                self.relay(ctx, Signal::IceCandidate, to, room_id, candidate)
                    .await
            }
            ClientEvent::TransferRequest {
                room_id,
                info,
                password_hash,
            } => {
                self.transfer_request(ctx, room_id, info, password_hash)
                    .await
            }
            ClientEvent::SetRoomPassword {
                room_id,
                password_hash,
            } => self.set_room_password(ctx, room_id, password_hash).await,
            ClientEvent::TransferAccepted { room_id } => self.transfer_accepted(ctx, room_id).await,
            ClientEvent::TransferDeclined { room_id, reason } => {
                self.transfer_declined(ctx, room_id, reason).await
            }
            ClientEvent::TransferCanceled { room_id, by } => {
                self.transfer_canceled(ctx, room_id, by).await
            }
            ClientEvent::ChatMessage { from, to, text } => self.chat_message(from, to, text).await,
            ClientEvent::NoteJoin {
                note_slug,
                user_id,
                username,
            } => self.note_join(ctx, note_slug, user_id, username).await,
            ClientEvent::NoteContentUpdate {
                note_slug,
                content,
                user_id,
            } => {
                self.note_content_update(ctx, note_slug, content, user_id)
                    .await
            }
            ClientEvent::NoteCursorUpdate {
                note_slug,
                user_id,
                position,
                selection,
            } => {
                self.note_cursor_update(ctx, note_slug, user_id, position, selection)
                    .await
            }
            ClientEvent::NoteTyping {
                note_slug,
                user_id,
                is_typing,
            } => self.note_typing(ctx, note_slug, user_id, is_typing).await,
            ClientEvent::NoteLeave { note_slug, .. } => self.note_leave(ctx, note_slug).await,
        }
    }

    /// Tear down everything a connection left behind: its transfer room
    /// slot, its note session and its presence entry.
    pub async fn disconnect(&self, ctx: ConnectionContext) {
        self.inner.connections.write().await.remove(&ctx.id);

        if let Some(room_id) = &ctx.room_id {
            let departure = self.inner.rooms.write().await.leave(room_id, ctx.id);
            if let Some(departure) = departure {
                self.announce_departure(ctx.id, departure).await;
            }
        }

        if let Some(note_slug) = &ctx.note_slug {
            self.leave_session(note_slug, ctx.id).await;
        }

        if let Some(user_id) = ctx.user_id {
            let mut presence = self.inner.presence.write().await;
            if presence.unregister(&user_id, ctx.id) {
                self.announce_presence(user_id, false).await;
            }
        }

        info!(conn = %ctx.id, "Connection closed");
    }

    /// `user-online`. A connection speaks for one user at a time; switching
    /// identity releases the previous one first.
    async fn user_online(&self, ctx: &mut ConnectionContext, user_id: UserId) {
        let previous = ctx.user_id.replace(user_id.clone());

        let mut presence = self.inner.presence.write().await;
        if let Some(prev) = previous.filter(|prev| *prev != user_id) {
            if presence.unregister(&prev, ctx.id) {
                self.announce_presence(prev, false).await;
            }
        }
        if presence.register_online(&user_id, ctx.id) {
            info!(user = %user_id, conn = %ctx.id, "User online");
            self.announce_presence(user_id, true).await;
        }
    }

    /// Callers hold the presence write guard, which keeps one user's status
    /// changes in transition order.
    async fn announce_presence(&self, user_id: UserId, online: bool) {
        if !online {
            info!(user = %user_id, "User offline");
        }
        self.broadcast(ServerEvent::UserStatusChanged { user_id, online })
            .await;
    }

    /// Link-check view of a transfer room.
    pub async fn room_status(&self, room_id: &RoomId) -> RoomStatus {
        self.inner.rooms.read().await.status(room_id)
    }

    pub async fn room_count(&self) -> usize {
        self.inner.rooms.read().await.room_count()
    }

    pub async fn session_count(&self) -> usize {
        self.inner.sessions.read().await.session_count()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }

    pub async fn online_count(&self) -> usize {
        self.inner.presence.read().await.online_count()
    }

    /// Queue an event for one connection. A full or closed queue drops the
    /// event; one slow browser never stalls the others.
    async fn deliver(&self, conn: ConnId, event: ServerEvent) {
        let connections = self.inner.connections.read().await;
        if let Some(tx) = connections.get(&conn) {
            push(conn, tx, event);
        }
    }

    async fn deliver_many(&self, conns: &[ConnId], event: ServerEvent) {
        let connections = self.inner.connections.read().await;
        for conn in conns {
            if let Some(tx) = connections.get(conn) {
                push(*conn, tx, event.clone());
            }
        }
    }

    async fn broadcast(&self, event: ServerEvent) {
        let connections = self.inner.connections.read().await;
        for (conn, tx) in connections.iter() {
            push(*conn, tx, event.clone());
        }
    }
}

fn push(conn: ConnId, tx: &mpsc::Sender<ServerEvent>, event: ServerEvent) {
    match tx.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            debug!(conn = %conn, "Outbound queue full, dropping event");
        }
        Err(TrySendError::Closed(_)) => {
            debug!(conn = %conn, "Connection already closed");
        }
    }
}

impl OnlineLookup for Hub {
    async fn is_online(&self, user: &UserId) -> bool {
        self.inner.presence.read().await.is_online(user)
    }
}

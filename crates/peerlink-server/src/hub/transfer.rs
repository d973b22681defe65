//! Transfer room and signaling handlers.

use peerlink_shared::protocol::ServerEvent;
use peerlink_shared::{ConnId, RoomId};
use serde_json::Value;
use tracing::{debug, info};

use super::context::ConnectionContext;
use super::rooms::{Departure, Joined, RoomTable, TransferError};
use super::signaling::{self, RelayTarget};
use super::Hub;

/// Which negotiation message is being relayed.
#[derive(Debug, Clone, Copy)]
pub(super) enum Signal {
    Offer,
    Answer,
    IceCandidate,
}

impl Signal {
    fn event(self, from: ConnId, payload: Value) -> ServerEvent {
        match self {
            Signal::Offer => ServerEvent::Offer { from, sdp: payload },
            Signal::Answer => ServerEvent::Answer { from, sdp: payload },
            Signal::IceCandidate => ServerEvent::IceCandidate {
                from,
                candidate: payload,
            },
        }
    }
}

impl Hub {
    pub(super) async fn create_room(&self, ctx: &mut ConnectionContext, room_id: RoomId) {
        self.enter_room(ctx, room_id, |rooms, room_id, conn| {
            rooms.claim_sender(room_id, conn)
        })
        .await;
    }

    pub(super) async fn join_room(
        &self,
        ctx: &mut ConnectionContext,
        room_id: RoomId,
        password_hash: Option<Option<String>>,
    ) {
        self.enter_room(ctx, room_id, move |rooms, room_id, conn| {
            rooms.join(room_id, conn, password_hash)
        })
        .await;
    }

    /// Run a join under the room lock. A connection sits in one room at a
    /// time, so a successful join also leaves the previous room.
    async fn enter_room<F>(&self, ctx: &mut ConnectionContext, room_id: RoomId, attempt: F)
    where
        F: FnOnce(&mut RoomTable, &RoomId, ConnId) -> Result<Joined, TransferError>,
    {
        let (result, departed) = {
            let mut rooms = self.inner.rooms.write().await;
            let result = attempt(&mut *rooms, &room_id, ctx.id);
            let departed = match (&result, &ctx.room_id) {
                (Ok(_), Some(previous)) if *previous != room_id => rooms.leave(previous, ctx.id),
                _ => None,
            };
            (result, departed)
        };

        if let Some(departure) = departed {
            self.announce_departure(ctx.id, departure).await;
        }

        match result {
            Ok(joined) => {
                ctx.enter_room(room_id.clone(), joined.role);
                self.deliver(
                    ctx.id,
                    ServerEvent::RoomJoined {
                        room_id,
                        role: joined.role,
                        requires_password: joined.requires_password,
                    },
                )
                .await;
                if let Some(sender) = joined.notify {
                    self.deliver(sender, ServerEvent::PeerJoined { id: ctx.id }).await;
                }
            }
            Err(e) => {
                debug!(room = %room_id, conn = %ctx.id, error = %e, "Room join refused");
                if let Some(event) = e.to_event() {
                    self.deliver(ctx.id, event).await;
                }
            }
        }
    }

    pub(super) async fn announce_departure(&self, conn: ConnId, departure: Departure) {
        if let Some(remaining) = departure.remaining {
            self.deliver(remaining, ServerEvent::PeerLeft { id: conn }).await;
        }
    }

    pub(super) async fn set_room_password(
        &self,
        ctx: &ConnectionContext,
        room_id: Option<RoomId>,
        password_hash: Option<String>,
    ) {
        let Some(room_id) = ctx.room_or(room_id) else {
            debug!(conn = %ctx.id, "set-room-password without a room, dropped");
            return;
        };

        let result = self
            .inner
            .rooms
            .write()
            .await
            .set_password(&room_id, ctx.id, password_hash);

        match result {
            Ok(requires_password) => {
                info!(room = %room_id, requires_password, "Room password updated");
                self.deliver(
                    ctx.id,
                    ServerEvent::RoomPasswordUpdated {
                        room_id,
                        requires_password,
                    },
                )
                .await;
            }
            Err(e) => debug!(room = %room_id, conn = %ctx.id, error = %e, "set-room-password ignored"),
        }
    }

    pub(super) async fn transfer_request(
        &self,
        ctx: &ConnectionContext,
        room_id: Option<RoomId>,
        info: Value,
        password_hash: Option<String>,
    ) {
        let Some(room_id) = ctx.room_or(room_id) else {
            debug!(conn = %ctx.id, "transfer-request without a room, dropped");
            return;
        };

        let result = self
            .inner
            .rooms
            .read()
            .await
            .request(&room_id, ctx.id, password_hash.as_deref());

        match result {
            Ok(targets) => {
                let event = ServerEvent::TransferRequest {
                    from: ctx.id,
                    room_id,
                    info,
                };
                self.deliver_many(&targets, event).await;
            }
            Err(e) => {
                debug!(room = %room_id, conn = %ctx.id, error = %e, "transfer-request refused");
                if let Some(event) = e.to_event() {
                    self.deliver(ctx.id, event).await;
                }
            }
        }
    }

    pub(super) async fn transfer_accepted(&self, ctx: &ConnectionContext, room_id: Option<RoomId>) {
        let Some(room_id) = ctx.room_or(room_id) else {
            return;
        };
        let result = self.inner.rooms.write().await.accept(&room_id, ctx.id);
        match result {
            Ok(targets) => {
                info!(room = %room_id, "Transfer approved");
                let event = ServerEvent::TransferAccepted {
                    from: ctx.id,
                    room_id,
                };
                self.deliver_many(&targets, event).await;
            }
            Err(e) => debug!(room = %room_id, conn = %ctx.id, error = %e, "transfer-accepted ignored"),
        }
    }

    pub(super) async fn transfer_declined(
        &self,
        ctx: &ConnectionContext,
        room_id: Option<RoomId>,
        reason: Option<String>,
    ) {
        let Some(room_id) = ctx.room_or(room_id) else {
            return;
        };
        let result = self.inner.rooms.write().await.decline(&room_id, ctx.id);
        match result {
            Ok(targets) => {
                let event = ServerEvent::TransferDeclined {
                    from: ctx.id,
                    room_id,
                    reason,
                };
                self.deliver_many(&targets, event).await;
            }
            Err(e) => debug!(room = %room_id, conn = %ctx.id, error = %e, "transfer-declined ignored"),
        }
    }

    pub(super) async fn transfer_canceled(
        &self,
        ctx: &ConnectionContext,
        room_id: Option<RoomId>,
        by: Option<String>,
    ) {
        let Some(room_id) = ctx.room_or(room_id) else {
            return;
        };
        let result = self.inner.rooms.write().await.cancel(&room_id, ctx.id);
        match result {
            Ok(targets) => {
                let event = ServerEvent::TransferCanceled {
                    from: ctx.id,
                    room_id,
                    by,
                };
                self.deliver_many(&targets, event).await;
            }
            Err(e) => debug!(room = %room_id, conn = %ctx.id, error = %e, "transfer-canceled ignored"),
        }
    }

    /// Forward an offer, answer or ICE candidate without looking inside it.
    pub(super) async fn relay(
        &self,
        ctx: &ConnectionContext,
        signal: Signal,
        to: Option<ConnId>,
        room_id: Option<RoomId>,
        payload: Value,
    ) {
        let Some(target) = signaling::resolve(to, room_id, ctx.room_id.as_ref()) else {
            debug!(conn = %ctx.id, ?signal, "Signal without a target, dropped");
            return;
        };

        let event = signal.event(ctx.id, payload);
        match target {
            RelayTarget::Conn(conn) => self.deliver(conn, event).await,
            RelayTarget::Room(room_id) => {
                let targets = self.inner.rooms.read().await.others(&room_id, ctx.id);
                self.deliver_many(&targets, event).await;
            }
        }
    }
}

//! WebSocket transport: one task per browser connection.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, Stream, StreamExt};
use peerlink_shared::constants::MAX_FRAME_SIZE;
use peerlink_shared::protocol::ClientEvent;
use peerlink_shared::{ConnId, PeerlinkError};
use tracing::{debug, error, trace};

use crate::api::AppState;
use crate::hub::{ConnectionContext, Hub};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.max_frame_size(MAX_FRAME_SIZE)
        .max_message_size(MAX_FRAME_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, state.hub))
}

async fn handle_socket(socket: WebSocket, hub: Hub) {
    let (mut ws_sender, ws_receiver) = socket.split();
    let (ctx, mut outbound) = hub.connect().await;
    let conn = ctx.id;

    let send_task = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            match event.to_json() {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => error!(conn = %conn, error = %e, "Failed to encode event"),
            }
        }
    });

    receive_loop(&hub, ctx, ws_receiver).await;
    send_task.abort();
}

/// What the receive loop does with one inbound frame.
#[derive(Debug)]
enum Inbound {
    Event(ClientEvent),
    Skip,
    Close,
}

fn classify(conn: ConnId, frame: Result<Message, axum::Error>) -> Inbound {
    let decoded = match frame {
        Ok(Message::Text(text)) => ClientEvent::from_json(text.as_str()),
        Ok(Message::Binary(_)) => Err(PeerlinkError::UnsupportedFrame("binary")),
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
            trace!(conn = %conn, "Keepalive");
            return Inbound::Skip;
        }
        Ok(Message::Close(_)) => return Inbound::Close,
        Err(e) => {
            debug!(conn = %conn, error = %e, "WebSocket error");
            return Inbound::Close;
        }
    };

    match decoded {
        Ok(event) => Inbound::Event(event),
        // Malformed frames are dropped, the connection stays up.
        Err(e) => {
            debug!(conn = %conn, error = %e, "Ignoring frame");
            Inbound::Skip
        }
    }
}

/// Feed frames to the hub in arrival order until the peer goes away, then
/// release everything the connection held.
async fn receive_loop<S>(hub: &Hub, mut ctx: ConnectionContext, mut frames: S)
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(frame) = frames.next().await {
        match classify(ctx.id, frame) {
            Inbound::Event(event) => hub.handle(&mut ctx, event).await,
            Inbound::Skip => {}
            Inbound::Close => break,
        }
    }

    hub.disconnect(ctx).await;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::stream;
    use peerlink_shared::crypto::ChatCipher;
    use peerlink_shared::protocol::ServerEvent;
    use peerlink_shared::UserId;
    use peerlink_store::{Database, SqliteMessageStore};

    use super::*;

    const U1_ONLINE: &str = r#"{"event":"user-online","data":{"userId":"u1"}}"#;

    fn test_hub() -> Hub {
        let store = SqliteMessageStore::new(
            Database::open_in_memory().unwrap(),
            chrono::Duration::hours(1),
        );
        Hub::new(ChatCipher::ephemeral(), Arc::new(store), 16)
    }

    #[test]
    fn test_classify_frames() {
        let conn = ConnId::new();

        assert!(matches!(
            classify(conn, Ok(Message::Binary(vec![1u8, 2, 3].into()))),
            Inbound::Skip
        ));
        assert!(matches!(
            classify(conn, Ok(Message::Text("{not json".into()))),
            Inbound::Skip
        ));
        assert!(matches!(
            classify(conn, Ok(Message::Ping(Default::default()))),
            Inbound::Skip
        ));
        assert!(matches!(
            classify(conn, Ok(Message::Text(U1_ONLINE.into()))),
            Inbound::Event(ClientEvent::UserOnline { .. })
        ));
        assert!(matches!(
            classify(conn, Ok(Message::Close(None))),
            Inbound::Close
        ));
        assert!(matches!(
            classify(conn, Err(axum::Error::new(std::io::Error::other("reset")))),
            Inbound::Close
        ));
    }

    #[tokio::test]
    async fn test_receive_loop_survives_bad_frames_and_cleans_up() {
        let hub = test_hub();
        let (_watcher_ctx, mut watcher) = hub.connect().await;
        let (ctx, _outbound) = hub.connect().await;

        let frames = stream::iter(vec![
            Ok::<_, axum::Error>(Message::Binary(vec![0u8; 4].into())),
            Ok(Message::Text("{not json".into())),
            Ok(Message::Text(U1_ONLINE.into())),
            Ok(Message::Close(None)),
            Ok(Message::Text(
                r#"{"event":"user-online","data":{"userId":"u2"}}"#.into(),
            )),
        ]);
        receive_loop(&hub, ctx, frames).await;

        let mut statuses = Vec::new();
        while let Ok(event) = watcher.try_recv() {
            if let ServerEvent::UserStatusChanged { user_id, online } = event {
                statuses.push((user_id, online));
            }
        }
        assert_eq!(
            statuses,
            vec![(UserId::from("u1"), true), (UserId::from("u1"), false)]
        );
        assert_eq!(hub.connection_count().await, 1);
        assert_eq!(hub.online_count().await, 0);
    }

    #[tokio::test]
    async fn test_stream_end_runs_disconnect() {
        let hub = test_hub();
        let (ctx, _outbound) = hub.connect().await;

        let frames = stream::iter(vec![Ok::<_, axum::Error>(Message::Text(U1_ONLINE.into()))]);
        receive_loop(&hub, ctx, frames).await;

        assert_eq!(hub.connection_count().await, 0);
        assert_eq!(hub.online_count().await, 0);
    }
}

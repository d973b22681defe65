use std::net::SocketAddr;

use axum::{
    extract::{Path, State},
    http::Method,
    middleware,
    routing::get,
    Json, Router,
};
use peerlink_shared::constants::MAX_ID_LENGTH;
use peerlink_shared::{RoomId, UserId};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::ServerError;
use crate::hub::{Hub, OnlineLookup};
use crate::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::ws::ws_handler;

#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub rate_limiter: RateLimiter,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/transfer/{room_id}/check", get(transfer_check))
        .route("/users/{user_id}/online", get(user_online))
        .route("/ws", get(ws_handler))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    connections: usize,
    online_users: usize,
    transfer_rooms: usize,
    note_sessions: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransferCheckResponse {
    exists: bool,
    requires_password: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserOnlineResponse {
    user_id: UserId,
    online: bool,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        connections: state.hub.connection_count().await,
        online_users: state.hub.online_count().await,
        transfer_rooms: state.hub.room_count().await,
        note_sessions: state.hub.session_count().await,
    })
}

fn check_id(kind: &str, id: &str) -> Result<(), ServerError> {
    if id.is_empty() || id.len() > MAX_ID_LENGTH {
        return Err(ServerError::BadRequest(format!(
            "{kind} must be 1 to {MAX_ID_LENGTH} bytes"
        )));
    }
    Ok(())
}

/// Link check before a browser tries to join: does the room exist and does
/// it want a password.
async fn transfer_check(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<TransferCheckResponse>, ServerError> {
    check_id("room id", &room_id)?;

    let status = state.hub.room_status(&RoomId(room_id)).await;
    Ok(Json(TransferCheckResponse {
        exists: status.exists,
        requires_password: status.requires_password,
    }))
}

async fn user_online(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserOnlineResponse>, ServerError> {
    check_id("user id", &user_id)?;

    let user_id = UserId(user_id);
    let online = state.hub.is_online(&user_id).await;
    Ok(Json(UserOnlineResponse { user_id, online }))
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use peerlink_shared::crypto::ChatCipher;
    use peerlink_shared::protocol::ClientEvent;
    use peerlink_store::{Database, SqliteMessageStore};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;

    fn test_state() -> AppState {
        let store = SqliteMessageStore::new(
            Database::open_in_memory().unwrap(),
            chrono::Duration::hours(1),
        );
        AppState {
            hub: Hub::new(ChatCipher::ephemeral(), Arc::new(store), 16),
            rate_limiter: RateLimiter::new(10.0, 30.0),
        }
    }

    async fn get_json(state: &AppState, uri: &str) -> (StatusCode, Value) {
        let response = build_router(state.clone())
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let state = test_state();
        let (status, body) = get_json(&state, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
        assert_eq!(body["transfer_rooms"], 0);
        assert_eq!(body["note_sessions"], 0);
    }

    #[tokio::test]
    async fn test_transfer_check_reflects_room_table() {
        let state = test_state();

        let (status, body) = get_json(&state, "/transfer/abc/check").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"exists": false, "requiresPassword": false}));

        let (mut ctx, _rx) = state.hub.connect().await;
        let join = ClientEvent::from_json(
            r#"{"event":"join-room","data":{"roomId":"abc","passwordHash":"h1"}}"#,
        )
        .unwrap();
        state.hub.handle(&mut ctx, join).await;

        let (_, body) = get_json(&state, "/transfer/abc/check").await;
        assert_eq!(body, json!({"exists": true, "requiresPassword": true}));

        // The room shell and its gate outlive the sender.
        state.hub.disconnect(ctx).await;
        let (_, body) = get_json(&state, "/transfer/abc/check").await;
        assert_eq!(body, json!({"exists": true, "requiresPassword": true}));
    }

    #[tokio::test]
    async fn test_user_online_lookup() {
        let state = test_state();

        let (_, body) = get_json(&state, "/users/u1/online").await;
        assert_eq!(body, json!({"userId": "u1", "online": false}));

        let (mut ctx, _rx) = state.hub.connect().await;
        let online =
            ClientEvent::from_json(r#"{"event":"user-online","data":{"userId":"u1"}}"#).unwrap();
        state.hub.handle(&mut ctx, online).await;

        let (_, body) = get_json(&state, "/users/u1/online").await;
        assert_eq!(body, json!({"userId": "u1", "online": true}));
    }

    #[tokio::test]
    async fn test_oversized_id_is_rejected() {
        let state = test_state();
        let uri = format!("/transfer/{}/check", "x".repeat(MAX_ID_LENGTH + 1));
        let (status, body) = get_json(&state, &uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("room id"));
    }

    #[tokio::test]
    async fn test_rate_limited_client_gets_429() {
        let state = AppState {
            rate_limiter: RateLimiter::new(0.001, 1.0),
            ..test_state()
        };
        let request = || {
            Request::get("/health")
                .header("x-real-ip", "203.0.113.9")
                .body(Body::empty())
                .unwrap()
        };

        let first = build_router(state.clone()).oneshot(request()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let second = build_router(state).oneshot(request()).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}

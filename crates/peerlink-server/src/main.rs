//! # peerlink-server
//!
//! Coordination hub for browser peers.
//!
//! This binary provides:
//! - **Presence**: which users have at least one live connection
//! - **Transfer rooms** with an optional password gate, plus the WebRTC
//!   signaling relay (offer / answer / ICE) between room members
//! - **Note sessions** that fan out content, cursor and typing updates
//! - **Chat delivery**: messages sealed with XChaCha20-Poly1305 and stored in
//!   SQLite, plaintext relayed live to the recipient's open connections
//! - **HTTP API** (axum) for health, room link checks and online lookups,
//!   with per-IP rate limiting

mod api;
mod config;
mod error;
mod hub;
mod rate_limit;
mod ws;

use std::sync::Arc;
use std::time::Duration;

use peerlink_store::{Database, SqliteMessageStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::{ChatKeySource, ServerConfig};
use crate::hub::Hub;
use crate::rate_limit::RateLimiter;

const PURGE_INTERVAL: Duration = Duration::from_secs(600);
const RATE_LIMIT_SWEEP: Duration = Duration::from_secs(300);
const RATE_LIMIT_MAX_IDLE: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Tracing (respects RUST_LOG)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,peerlink_server=debug")),
        )
        .init();

    info!("Starting peerlink server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    if config.chat_key == ChatKeySource::Ephemeral {
        warn!("CHAT_KEY / CHAT_SECRET not set, stored chat messages will be unreadable after restart");
    }
    let cipher = config.chat_key.cipher()?;

    // -----------------------------------------------------------------------
    // 3. Storage and hub
    // -----------------------------------------------------------------------
    let db = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::open_default()?,
    };
    let store = Arc::new(SqliteMessageStore::new(db, config.message_retention()));

    let hub = Hub::new(cipher, store.clone(), config.outbound_buffer);
    let rate_limiter = RateLimiter::from_config(&config);

    let app_state = AppState {
        hub,
        rate_limiter: rate_limiter.clone(),
    };

    // -----------------------------------------------------------------------
    // 4. Background tasks
    // -----------------------------------------------------------------------

    // Expired chat messages
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let store = store.clone();
            match tokio::task::spawn_blocking(move || store.purge_expired()).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(error = %e, "Chat purge failed"),
                Err(e) => warn!(error = %e, "Chat purge task panicked"),
            }
        }
    });

    // Idle rate limit buckets
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RATE_LIMIT_SWEEP);
        loop {
            interval.tick().await;
            rate_limiter.purge_stale(RATE_LIMIT_MAX_IDLE).await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. HTTP + WebSocket server (runs until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}

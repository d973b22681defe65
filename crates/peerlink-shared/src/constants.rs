/// Application name
pub const APP_NAME: &str = "peerlink";

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Maximum inbound WebSocket frame size in bytes (256 KiB)
pub const MAX_FRAME_SIZE: usize = 262_144;

/// Default HTTP / WebSocket port
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default retention window for stored chat messages (30 days)
pub const DEFAULT_MESSAGE_RETENTION_HOURS: i64 = 24 * 30;

/// Longest accepted retention window (ten years)
pub const MAX_MESSAGE_RETENTION_HOURS: i64 = 24 * 365 * 10;

/// Key derivation context for the chat-at-rest key (BLAKE3)
pub const KDF_CONTEXT_CHAT_KEY: &str = "peerlink-chat-key-v1";

/// Display colours handed out to collaborators when they join a note.
pub const COLLAB_COLORS: &[&str] = &[
    "#e6194b", "#3cb44b", "#4363d8", "#f58231", "#911eb4", "#42d4f4", "#f032e6", "#9a6324",
    "#469990", "#800000",
];

/// Longest room or user id accepted on the HTTP API
pub const MAX_ID_LENGTH: usize = 128;

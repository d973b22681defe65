//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use peerlink_shared::constants::{
    DEFAULT_HTTP_PORT, DEFAULT_MESSAGE_RETENTION_HOURS, MAX_MESSAGE_RETENTION_HOURS,
};
use peerlink_shared::crypto::ChatCipher;
use peerlink_shared::CryptoError;

/// Where the chat-at-rest key comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum ChatKeySource {
    /// `CHAT_KEY`: 64 hex characters.
    Hex(String),
    /// `CHAT_SECRET`: passphrase run through the BLAKE3 KDF.
    Passphrase(String),
    /// Neither set. Messages stored by this process cannot be read after a
    /// restart.
    Ephemeral,
}

impl ChatKeySource {
    pub fn cipher(&self) -> Result<ChatCipher, CryptoError> {
        match self {
            ChatKeySource::Hex(hex) => ChatCipher::from_hex(hex),
            ChatKeySource::Passphrase(secret) => Ok(ChatCipher::from_passphrase(secret.as_bytes())),
            ChatKeySource::Ephemeral => Ok(ChatCipher::ephemeral()),
        }
    }
}

// Never print key material.
impl std::fmt::Debug for ChatKeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatKeySource::Hex(_) => f.write_str("Hex(..)"),
            ChatKeySource::Passphrase(_) => f.write_str("Passphrase(..)"),
            ChatKeySource::Ephemeral => f.write_str("Ephemeral"),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP and WebSocket server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite file for chat messages.
    /// Env: `DATABASE_PATH`
    /// Default: `None`, meaning the platform data directory.
    pub database_path: Option<PathBuf>,

    /// Env: `CHAT_KEY` (preferred) or `CHAT_SECRET`
    pub chat_key: ChatKeySource,

    /// How long stored chat messages are kept.
    /// Env: `MESSAGE_RETENTION_HOURS`
    /// Default: 720 (30 days), at most 87600 (ten years)
    pub message_retention_hours: i64,

    /// Per-connection outbound queue length. Events for a full queue are
    /// dropped.
    /// Env: `OUTBOUND_BUFFER`
    /// Default: 256
    pub outbound_buffer: usize,

    /// Token bucket refill rate for the HTTP API, per client IP.
    /// Env: `RATE_LIMIT_PER_SEC`
    /// Default: 10
    pub rate_limit_per_sec: f64,

    /// Env: `RATE_LIMIT_BURST`
    /// Default: 30
    pub rate_limit_burst: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            chat_key: ChatKeySource::Ephemeral,
            message_retention_hours: DEFAULT_MESSAGE_RETENTION_HOURS,
            outbound_buffer: 256,
            rate_limit_per_sec: 10.0,
            rate_limit_burst: 30.0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = var("DATABASE_PATH").filter(|p| !p.is_empty()) {
            config.database_path = Some(PathBuf::from(path));
        }

        if let Some(key) = var("CHAT_KEY").filter(|k| !k.is_empty()) {
            config.chat_key = ChatKeySource::Hex(key);
        } else if let Some(secret) = var("CHAT_SECRET").filter(|s| !s.is_empty()) {
            config.chat_key = ChatKeySource::Passphrase(secret);
        }

        if let Some(val) = var("MESSAGE_RETENTION_HOURS") {
            match val.parse::<i64>() {
                Ok(hours) if (1..=MAX_MESSAGE_RETENTION_HOURS).contains(&hours) => {
                    config.message_retention_hours = hours
                }
                _ => tracing::warn!(value = %val, "Invalid MESSAGE_RETENTION_HOURS, using default"),
            }
        }

        if let Some(val) = var("OUTBOUND_BUFFER") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.outbound_buffer = n,
                _ => tracing::warn!(value = %val, "Invalid OUTBOUND_BUFFER, using default"),
            }
        }

        if let Some(val) = var("RATE_LIMIT_PER_SEC") {
            if let Some(rate) = parse_positive(&val) {
                config.rate_limit_per_sec = rate;
            }
        }

        if let Some(val) = var("RATE_LIMIT_BURST") {
            if let Some(burst) = parse_positive(&val) {
                config.rate_limit_burst = burst;
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }

    pub fn message_retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.message_retention_hours)
    }
}

fn parse_positive(val: &str) -> Option<f64> {
    match val.parse::<f64>() {
        Ok(n) if n.is_finite() && n > 0.0 => Some(n),
        _ => {
            tracing::warn!(value = %val, "Invalid rate limit setting, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.chat_key, ChatKeySource::Ephemeral);
        assert_eq!(config.message_retention(), chrono::Duration::days(30));
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("DATABASE_PATH", "/tmp/peerlink.db"),
            ("MESSAGE_RETENTION_HOURS", "48"),
            ("OUTBOUND_BUFFER", "16"),
            ("RATE_LIMIT_PER_SEC", "2.5"),
        ]);
        assert_eq!(config.http_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/peerlink.db")));
        assert_eq!(config.message_retention_hours, 48);
        assert_eq!(config.outbound_buffer, 16);
        assert_eq!(config.rate_limit_per_sec, 2.5);
        assert_eq!(config.rate_limit_burst, 30.0);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("HTTP_ADDR", "not-an-addr"),
            ("MESSAGE_RETENTION_HOURS", "-1"),
            ("OUTBOUND_BUFFER", "0"),
            ("RATE_LIMIT_BURST", "NaN"),
        ]);
        let defaults = ServerConfig::default();
        assert_eq!(config.http_addr, defaults.http_addr);
        assert_eq!(config.message_retention_hours, defaults.message_retention_hours);
        assert_eq!(config.outbound_buffer, defaults.outbound_buffer);
        assert_eq!(config.rate_limit_burst, defaults.rate_limit_burst);
    }

    #[test]
    fn test_retention_is_capped() {
        let config = config_from(&[("MESSAGE_RETENTION_HOURS", "3000000000")]);
        assert_eq!(config.message_retention_hours, DEFAULT_MESSAGE_RETENTION_HOURS);

        let ten_years = MAX_MESSAGE_RETENTION_HOURS.to_string();
        let config = config_from(&[("MESSAGE_RETENTION_HOURS", ten_years.as_str())]);
        assert_eq!(config.message_retention_hours, MAX_MESSAGE_RETENTION_HOURS);
        assert!(chrono::Utc::now()
            .checked_add_signed(config.message_retention())
            .is_some());
    }

    #[test]
    fn test_chat_key_precedence() {
        let hex = "ab".repeat(32);
        let config = config_from(&[("CHAT_KEY", hex.as_str()), ("CHAT_SECRET", "hunter2")]);
        assert_eq!(config.chat_key, ChatKeySource::Hex(hex));
        assert!(config.chat_key.cipher().is_ok());

        let config = config_from(&[("CHAT_SECRET", "hunter2")]);
        assert_eq!(config.chat_key, ChatKeySource::Passphrase("hunter2".into()));
        assert_eq!(format!("{:?}", config.chat_key), "Passphrase(..)");
    }

    #[test]
    fn test_bad_hex_key_is_rejected() {
        let config = config_from(&[("CHAT_KEY", "abcd")]);
        assert!(matches!(
            config.chat_key.cipher(),
            Err(CryptoError::InvalidKeyLength)
        ));
    }
}

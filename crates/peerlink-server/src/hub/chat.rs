//! Chat delivery: seal for storage, persist, then relay plaintext live.

use std::sync::Arc;

use chrono::Utc;
use peerlink_shared::crypto::ChatCipher;
use peerlink_shared::protocol::ServerEvent;
use peerlink_shared::{CryptoError, UserId};
use peerlink_store::{ChatRecord, MessageStore, StoreError};
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{debug, error};

use super::Hub;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Failed to seal message: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Failed to persist message: {0}")]
    Persistence(#[from] StoreError),

    #[error("Store task failed: {0}")]
    Join(#[from] JoinError),
}

/// Seals message bodies with the process-wide key and hands the ciphertext
/// to the [`MessageStore`]. Plaintext never reaches the store.
pub struct ChatPipeline {
    cipher: ChatCipher,
    store: Arc<dyn MessageStore>,
}

impl ChatPipeline {
    pub fn new(cipher: ChatCipher, store: Arc<dyn MessageStore>) -> Self {
        Self { cipher, store }
    }

    pub async fn persist(&self, from: &UserId, to: &UserId, text: &str) -> Result<ChatRecord, ChatError> {
        let ciphertext = self.cipher.seal(text.as_bytes())?;

        let store = Arc::clone(&self.store);
        let (from, to) = (from.clone(), to.clone());
        let record = tokio::task::spawn_blocking(move || store.create(&from, &to, ciphertext)).await??;

        Ok(record)
    }
}

impl Hub {
    /// `chat-message`. A failed write is logged and live delivery goes ahead.
    pub(super) async fn chat_message(&self, from: UserId, to: UserId, text: String) {
        match self.inner.chat.persist(&from, &to, &text).await {
            Ok(record) => debug!(id = %record.id, from = %from, to = %to, "Chat message stored"),
            Err(e) => error!(error = %e, from = %from, to = %to, "Chat message not stored"),
        }

        let targets = self.inner.presence.read().await.connections_for(&to);
        if targets.is_empty() {
            debug!(to = %to, "Chat recipient offline, no live delivery");
            return;
        }

        self.deliver_many(
            &targets,
            ServerEvent::ChatMessage {
                from,
                to,
                text,
                timestamp: Utc::now(),
            },
        )
        .await;
    }
}

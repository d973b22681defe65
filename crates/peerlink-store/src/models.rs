//! Records persisted in the SQLite database.

use chrono::{DateTime, Utc};
use peerlink_shared::UserId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// A chat message at rest. The body is always ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRecord {
    /// Unique message identifier.
    pub id: Uuid,
    pub sender: UserId,
    pub recipient: UserId,
    /// Sealed message body (`nonce || ciphertext`).
    pub ciphertext: Vec<u8>,
    pub created_at: DateTime<Utc>,
    /// After this instant the record is eligible for purging.
    pub expires_at: DateTime<Utc>,
}

impl ChatRecord {
    /// Build a new record that lives for `retention` from now.
    pub fn new(
        sender: UserId,
        recipient: UserId,
        ciphertext: Vec<u8>,
        retention: chrono::Duration,
    ) -> Result<Self> {
        let created_at = Utc::now();
        let expires_at = created_at
            .checked_add_signed(retention)
            .ok_or(StoreError::RetentionOutOfRange)?;

        Ok(Self {
            id: Uuid::new_v4(),
            sender,
            recipient,
            ciphertext,
            created_at,
            expires_at,
        })
    }
}

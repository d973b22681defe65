//! The storage collaborator consumed by the chat pipeline.

use std::sync::Mutex;

use chrono::Utc;
use peerlink_shared::UserId;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::ChatRecord;

/// Write side of chat persistence.
///
/// Implementations are called from a blocking thread, never from inside the
/// async executor, so they may do synchronous I/O.
pub trait MessageStore: Send + Sync + 'static {
    /// Persist one sealed message and return the stored record.
    fn create(&self, from: &UserId, to: &UserId, ciphertext: Vec<u8>) -> Result<ChatRecord>;
}

/// [`MessageStore`] backed by a single SQLite connection.
pub struct SqliteMessageStore {
    db: Mutex<Database>,
    retention: chrono::Duration,
}

impl SqliteMessageStore {
    pub fn new(db: Database, retention: chrono::Duration) -> Self {
        Self {
            db: Mutex::new(db),
            retention,
        }
    }

    /// Remove every record past its expiry.
    pub fn purge_expired(&self) -> Result<usize> {
        let db = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        let removed = db.purge_expired_messages(Utc::now())?;
        if removed > 0 {
            tracing::info!(removed, "purged expired chat messages");
        }
        Ok(removed)
    }

    pub fn messages_between(&self, a: &UserId, b: &UserId, limit: u32) -> Result<Vec<ChatRecord>> {
        let db = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        db.messages_between(a, b, limit)
    }
}

impl MessageStore for SqliteMessageStore {
    fn create(&self, from: &UserId, to: &UserId, ciphertext: Vec<u8>) -> Result<ChatRecord> {
        let record = ChatRecord::new(from.clone(), to.clone(), ciphertext, self.retention)?;
        let db = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        db.insert_message(&record)?;
        tracing::debug!(id = %record.id, from = %from, to = %to, "stored chat message");
        Ok(record)
    }
}

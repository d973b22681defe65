//! # peerlink-store
//!
//! Persistence for chat messages, backed by SQLite.
//!
//! Message bodies arrive already sealed by the hub, so the store only ever
//! sees ciphertext. Every record carries an expiry; expired rows are removed
//! by [`Database::purge_expired_messages`]. The hub talks to the store through
//! the [`MessageStore`] trait.

pub mod database;
pub mod message_store;
pub mod messages;
pub mod migrations;
pub mod models;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use message_store::{MessageStore, SqliteMessageStore};
pub use models::*;

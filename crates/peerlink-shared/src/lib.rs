//! # peerlink-shared
//!
//! Types shared by the peerlink crates: identifiers, the WebSocket event
//! protocol, at-rest chat encryption and common constants.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::{CryptoError, PeerlinkError};
pub use types::{ConnId, Role, RoomId, UserId};

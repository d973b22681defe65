//! v001 -- Initial schema creation.
//!
//! Creates the `chat_messages` table.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS chat_messages (
    id         TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    sender     TEXT NOT NULL,               -- user id
    recipient  TEXT NOT NULL,               -- user id
    ciphertext BLOB NOT NULL,               -- nonce || XChaCha20-Poly1305 ciphertext
    created_at TEXT NOT NULL,               -- RFC-3339
    expires_at TEXT NOT NULL                -- RFC-3339, purged after this
);

CREATE INDEX IF NOT EXISTS idx_chat_messages_pair_ts
    ON chat_messages(sender, recipient, created_at);

CREATE INDEX IF NOT EXISTS idx_chat_messages_expires
    ON chat_messages(expires_at);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}

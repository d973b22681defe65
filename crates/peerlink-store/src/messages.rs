//! CRUD operations for [`ChatRecord`] rows.

use chrono::{DateTime, SecondsFormat, Utc};
use peerlink_shared::UserId;
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::ChatRecord;

// Fixed-width UTC timestamps so string comparison in SQL is chronological.
fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Database {
    pub fn insert_message(&self, record: &ChatRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO chat_messages (id, sender, recipient, ciphertext, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id.to_string(),
                record.sender.as_str(),
                record.recipient.as_str(),
                record.ciphertext,
                ts(&record.created_at),
                ts(&record.expires_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_message_by_id(&self, id: Uuid) -> Result<ChatRecord> {
        self.conn()
            .query_row(
                "SELECT id, sender, recipient, ciphertext, created_at, expires_at
                 FROM chat_messages WHERE id = ?1",
                params![id.to_string()],
                row_to_record,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Conversation between two users in either direction, oldest first.
    /// Expired rows are skipped even if they have not been purged yet.
    pub fn messages_between(
        &self,
        a: &UserId,
        b: &UserId,
        limit: u32,
    ) -> Result<Vec<ChatRecord>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, sender, recipient, ciphertext, created_at, expires_at
             FROM chat_messages
             WHERE ((sender = ?1 AND recipient = ?2) OR (sender = ?2 AND recipient = ?1))
               AND expires_at > ?3
             ORDER BY created_at ASC
             LIMIT ?4",
        )?;

        let rows = stmt.query_map(
            params![a.as_str(), b.as_str(), ts(&Utc::now()), limit],
            row_to_record,
        )?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Delete every row whose expiry is at or before `now`. Returns the number
    /// of rows removed.
    pub fn purge_expired_messages(&self, now: DateTime<Utc>) -> Result<usize> {
        let removed = self.conn().execute(
            "DELETE FROM chat_messages WHERE expires_at <= ?1",
            params![ts(&now)],
        )?;
        Ok(removed)
    }

    pub fn count_messages(&self) -> Result<u64> {
        let count: i64 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM chat_messages", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatRecord> {
    let id_str: String = row.get(0)?;
    let sender: String = row.get(1)?;
    let recipient: String = row.get(2)?;
    let ciphertext: Vec<u8> = row.get(3)?;
    let created_str: String = row.get(4)?;
    let expires_str: String = row.get(5)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(ChatRecord {
        id,
        sender: UserId(sender),
        recipient: UserId(recipient),
        ciphertext,
        created_at: parse_ts(4, &created_str)?,
        expires_at: parse_ts(5, &expires_str)?,
    })
}

fn parse_ts(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(from: &str, to: &str, body: &[u8], retention: Duration) -> ChatRecord {
        ChatRecord::new(from.into(), to.into(), body.to_vec(), retention).unwrap()
    }

    #[test]
    fn insert_and_fetch() {
        let db = Database::open_in_memory().unwrap();
        let rec = record("u1", "u2", b"\x01\x02\x03", Duration::hours(1));
        db.insert_message(&rec).unwrap();

        let fetched = db.get_message_by_id(rec.id).unwrap();
        assert_eq!(fetched.sender, rec.sender);
        assert_eq!(fetched.recipient, rec.recipient);
        assert_eq!(fetched.ciphertext, rec.ciphertext);
        assert_eq!(
            fetched.expires_at.timestamp_micros(),
            rec.expires_at.timestamp_micros()
        );
    }

    #[test]
    fn missing_message_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.get_message_by_id(Uuid::new_v4()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn conversation_includes_both_directions() {
        let db = Database::open_in_memory().unwrap();
        db.insert_message(&record("u1", "u2", b"a", Duration::hours(1)))
            .unwrap();
        db.insert_message(&record("u2", "u1", b"b", Duration::hours(1)))
            .unwrap();
        db.insert_message(&record("u1", "u3", b"c", Duration::hours(1)))
            .unwrap();

        let convo = db
            .messages_between(&"u1".into(), &"u2".into(), 50)
            .unwrap();
        assert_eq!(convo.len(), 2);
    }

    #[test]
    fn purge_removes_only_expired() {
        let db = Database::open_in_memory().unwrap();
        db.insert_message(&record("u1", "u2", b"old", Duration::seconds(-5)))
            .unwrap();
        db.insert_message(&record("u1", "u2", b"new", Duration::hours(1)))
            .unwrap();

        // Expired rows are already hidden from reads.
        let visible = db
            .messages_between(&"u1".into(), &"u2".into(), 50)
            .unwrap();
        assert_eq!(visible.len(), 1);

        assert_eq!(db.purge_expired_messages(Utc::now()).unwrap(), 1);
        assert_eq!(db.count_messages().unwrap(), 1);
    }
}

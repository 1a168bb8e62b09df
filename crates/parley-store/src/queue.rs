//! Durable ingestion queue.
//!
//! The relay's broadcast path enqueues serialized messages here instead of
//! persisting inline; a background consumer drains the table and inserts the
//! payloads into `messages`.  A row is acknowledged (deleted) only after a
//! successful insert, so a crash in between redelivers the payload.  The
//! payload carries the message id assigned at ingestion, which lets the
//! consumer recognize a redelivered row it already persisted.

use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::QueuedMessage;

impl Database {
    /// Append a payload to the queue.  Returns the queue position.
    pub fn enqueue(&self, exchange: &str, routing_key: &str, payload: &str) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO chat_queue (exchange, routing_key, payload, attempts, enqueued_at)
             VALUES (?1, ?2, ?3, 0, ?4)",
            params![exchange, routing_key, payload, Utc::now().to_rfc3339()],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Hand out the oldest pending row, bumping its attempt counter.
    ///
    /// The row stays in the table until [`Database::ack_queued`] removes it.
    pub fn next_queued(&self) -> Result<Option<QueuedMessage>> {
        let result = self.conn().query_row(
            "SELECT id, exchange, routing_key, payload, attempts, enqueued_at
             FROM chat_queue
             ORDER BY id
             LIMIT 1",
            [],
            row_to_queued_message,
        );

        let mut queued = match result {
            Ok(q) => q,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(StoreError::Sqlite(e)),
        };

        self.conn().execute(
            "UPDATE chat_queue SET attempts = attempts + 1 WHERE id = ?1",
            params![queued.id],
        )?;
        queued.attempts += 1;

        Ok(Some(queued))
    }

    /// Acknowledge a consumed row, removing it from the queue.
    pub fn ack_queued(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM chat_queue WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    /// Number of unacknowledged rows.
    pub fn queue_depth(&self) -> Result<u32> {
        let count: u32 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM chat_queue", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn row_to_queued_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueuedMessage> {
    let id: i64 = row.get(0)?;
    let exchange: String = row.get(1)?;
    let routing_key: String = row.get(2)?;
    let payload: String = row.get(3)?;
    let attempts: u32 = row.get(4)?;
    let ts_str: String = row.get(5)?;

    let enqueued_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(QueuedMessage {
        id,
        exchange,
        routing_key,
        payload,
        attempts,
        enqueued_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_shared::constants::{CHAT_EXCHANGE, CHAT_ROUTING_KEY};

    fn open_test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn enqueue_consume_ack() {
        let (_dir, db) = open_test_db();

        db.enqueue(CHAT_EXCHANGE, CHAT_ROUTING_KEY, r#"{"a":1}"#).unwrap();
        assert_eq!(db.queue_depth().unwrap(), 1);

        let queued = db.next_queued().unwrap().unwrap();
        assert_eq!(queued.payload, r#"{"a":1}"#);
        assert_eq!(queued.exchange, CHAT_EXCHANGE);
        assert_eq!(queued.attempts, 1);

        assert!(db.ack_queued(queued.id).unwrap());
        assert_eq!(db.queue_depth().unwrap(), 0);
        assert!(db.next_queued().unwrap().is_none());
    }

    #[test]
    fn unacked_rows_are_redelivered() {
        let (_dir, db) = open_test_db();
        db.enqueue(CHAT_EXCHANGE, CHAT_ROUTING_KEY, "payload").unwrap();

        let first = db.next_queued().unwrap().unwrap();
        // Not acked; the same row comes back with a higher attempt count.
        let second = db.next_queued().unwrap().unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.attempts, 2);
    }

    #[test]
    fn fifo_order() {
        let (_dir, db) = open_test_db();
        db.enqueue(CHAT_EXCHANGE, CHAT_ROUTING_KEY, "one").unwrap();
        db.enqueue(CHAT_EXCHANGE, CHAT_ROUTING_KEY, "two").unwrap();

        let head = db.next_queued().unwrap().unwrap();
        assert_eq!(head.payload, "one");
        db.ack_queued(head.id).unwrap();

        let next = db.next_queued().unwrap().unwrap();
        assert_eq!(next.payload, "two");
    }
}

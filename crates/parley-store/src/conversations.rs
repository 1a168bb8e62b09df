use chrono::{DateTime, Utc};
use parley_shared::pair::pair_key;
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Conversation;

impl Database {
    /// Order-independent lookup of the conversation between two users.
    pub fn find_conversation(&self, a: &str, b: &str) -> Result<Option<Conversation>> {
        let key = pair_key(a, b);
        let result = self.conn().query_row(
            "SELECT id, user1, user2, created_at FROM conversations WHERE pair_key = ?1",
            params![key],
            row_to_conversation,
        );

        match result {
            Ok(conv) => Ok(Some(conv)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }

    /// Fetch or atomically create the conversation for an unordered pair.
    ///
    /// The insert races through `ON CONFLICT(pair_key) DO NOTHING`, so two
    /// concurrent callers (in either argument order) converge on the same
    /// single row.
    pub fn get_or_create_conversation(&self, a: &str, b: &str) -> Result<Conversation> {
        let key = pair_key(a, b);

        self.conn().execute(
            "INSERT INTO conversations (id, user1, user2, pair_key, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(pair_key) DO NOTHING",
            params![
                Uuid::new_v4().to_string(),
                a,
                b,
                key,
                Utc::now().to_rfc3339(),
            ],
        )?;

        self.conn()
            .query_row(
                "SELECT id, user1, user2, created_at FROM conversations WHERE pair_key = ?1",
                params![key],
                row_to_conversation,
            )
            .map_err(StoreError::Sqlite)
    }

    pub fn get_conversation_by_id(&self, id: Uuid) -> Result<Conversation> {
        self.conn()
            .query_row(
                "SELECT id, user1, user2, created_at FROM conversations WHERE id = ?1",
                params![id.to_string()],
                row_to_conversation,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Delete a conversation; its messages go with it (`ON DELETE CASCADE`).
    pub fn delete_conversation(&self, id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM conversations WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let id_str: String = row.get(0)?;
    let user1: String = row.get(1)?;
    let user2: String = row.get(2)?;
    let ts_str: String = row.get(3)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Conversation {
        id,
        user1,
        user2,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatMessage;

    fn open_test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn get_or_create_is_order_independent() {
        let (_dir, db) = open_test_db();

        let first = db.get_or_create_conversation("alice", "bob").unwrap();
        let second = db.get_or_create_conversation("bob", "alice").unwrap();
        let third = db.get_or_create_conversation("Alice", "BOB").unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.id, third.id);
        assert_eq!(first.user1, "alice");
        assert_eq!(first.user2, "bob");
    }

    #[test]
    fn find_in_either_order() {
        let (_dir, db) = open_test_db();
        let created = db.get_or_create_conversation("alice", "bob").unwrap();

        let found = db.find_conversation("bob", "alice").unwrap().unwrap();
        assert_eq!(found.id, created.id);

        assert!(db.find_conversation("alice", "carol").unwrap().is_none());
    }

    #[test]
    fn delete_cascades_to_messages() {
        let (_dir, db) = open_test_db();
        let conv = db.get_or_create_conversation("alice", "bob").unwrap();

        let msg = ChatMessage {
            id: Uuid::new_v4(),
            sender: "alice".to_string(),
            content: "hi".to_string(),
            timestamp: Utc::now(),
            channel: Some(String::new()),
            conversation_id: Some(conv.id),
        };
        db.insert_message(&msg).unwrap();

        assert!(db.delete_conversation(conv.id).unwrap());
        assert!(db.find_conversation("alice", "bob").unwrap().is_none());
        assert!(matches!(
            db.get_message_by_id(msg.id),
            Err(StoreError::NotFound)
        ));
    }
}

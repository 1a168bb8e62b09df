use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::ChatMessage;

impl Database {
    pub fn insert_message(&self, message: &ChatMessage) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO messages (id, sender, content, timestamp, channel, conversation_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.id.to_string(),
                    message.sender,
                    message.content,
                    message.timestamp.to_rfc3339(),
                    message.channel,
                    message.conversation_id.map(|id| id.to_string()),
                ],
            )
            .map_err(StoreError::from_sqlite)?;
        Ok(())
    }

    /// All messages, most recent first.
    pub fn get_messages(&self, limit: u32, offset: u32) -> Result<Vec<ChatMessage>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, sender, content, timestamp, channel, conversation_id
             FROM messages
             ORDER BY timestamp DESC
             LIMIT ?1 OFFSET ?2",
        )?;

        let rows = stmt.query_map(params![limit, offset], row_to_chat_message)?;
        collect_messages(rows)
    }

    /// Messages for a channel, matched case-insensitively with surrounding
    /// whitespace trimmed on both sides.
    pub fn get_messages_for_channel(
        &self,
        channel: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ChatMessage>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, sender, content, timestamp, channel, conversation_id
             FROM messages
             WHERE LOWER(TRIM(channel)) = LOWER(TRIM(?1))
             ORDER BY timestamp DESC
             LIMIT ?2 OFFSET ?3",
        )?;

        let rows = stmt.query_map(params![channel, limit, offset], row_to_chat_message)?;
        collect_messages(rows)
    }

    pub fn get_messages_for_sender(
        &self,
        sender: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ChatMessage>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, sender, content, timestamp, channel, conversation_id
             FROM messages
             WHERE LOWER(sender) = LOWER(?1)
             ORDER BY timestamp DESC
             LIMIT ?2 OFFSET ?3",
        )?;

        let rows = stmt.query_map(params![sender, limit, offset], row_to_chat_message)?;
        collect_messages(rows)
    }

    /// Conversation history in chronological order.
    pub fn get_messages_for_conversation(
        &self,
        conversation_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ChatMessage>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, sender, content, timestamp, channel, conversation_id
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY timestamp
             LIMIT ?2 OFFSET ?3",
        )?;

        let rows = stmt.query_map(
            params![conversation_id.to_string(), limit, offset],
            row_to_chat_message,
        )?;
        collect_messages(rows)
    }

    pub fn get_message_by_id(&self, id: Uuid) -> Result<ChatMessage> {
        self.conn()
            .query_row(
                "SELECT id, sender, content, timestamp, channel, conversation_id
                 FROM messages WHERE id = ?1",
                params![id.to_string()],
                row_to_chat_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn update_message_content(&self, id: Uuid, content: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET content = ?2 WHERE id = ?1",
            params![id.to_string(), content],
        )?;
        Ok(affected > 0)
    }

    pub fn delete_message(&self, id: Uuid) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM messages WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

fn collect_messages(
    rows: impl Iterator<Item = rusqlite::Result<ChatMessage>>,
) -> Result<Vec<ChatMessage>> {
    let mut messages = Vec::new();
    for row in rows {
        messages.push(row?);
    }
    Ok(messages)
}

fn row_to_chat_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    let id_str: String = row.get(0)?;
    let sender: String = row.get(1)?;
    let content: String = row.get(2)?;
    let ts_str: String = row.get(3)?;
    let channel: Option<String> = row.get(4)?;
    let conversation_id_str: Option<String> = row.get(5)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let conversation_id = match conversation_id_str {
        Some(s) => Some(Uuid::parse_str(&s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?),
        None => None,
    };

    Ok(ChatMessage {
        id,
        sender,
        content,
        timestamp,
        channel,
        conversation_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    fn sample_message(sender: &str, channel: &str) -> ChatMessage {
        ChatMessage {
            id: Uuid::new_v4(),
            sender: sender.to_string(),
            content: "hello".to_string(),
            timestamp: Utc::now(),
            channel: Some(channel.to_string()),
            conversation_id: None,
        }
    }

    #[test]
    fn insert_and_fetch_round_trip() {
        let (_dir, db) = open_test_db();
        let msg = sample_message("alice", "general");

        db.insert_message(&msg).unwrap();
        let fetched = db.get_message_by_id(msg.id).unwrap();

        assert_eq!(fetched.sender, "alice");
        assert_eq!(fetched.content, "hello");
        assert_eq!(fetched.channel.as_deref(), Some("general"));
        assert_eq!(fetched.conversation_id, None);
    }

    #[test]
    fn channel_match_is_case_insensitive_and_trimmed() {
        let (_dir, db) = open_test_db();
        db.insert_message(&sample_message("alice", " General ")).unwrap();

        let found = db.get_messages_for_channel("general", 10, 0).unwrap();
        assert_eq!(found.len(), 1);

        let none = db.get_messages_for_channel("other", 10, 0).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn update_and_delete() {
        let (_dir, db) = open_test_db();
        let msg = sample_message("alice", "general");
        db.insert_message(&msg).unwrap();

        assert!(db.update_message_content(msg.id, "edited").unwrap());
        assert_eq!(db.get_message_by_id(msg.id).unwrap().content, "edited");

        assert!(db.delete_message(msg.id).unwrap());
        assert!(matches!(
            db.get_message_by_id(msg.id),
            Err(StoreError::NotFound)
        ));
    }
}

//! Conversation lookup and history.
//!
//! Conversations are normally created as a side effect of an accepted
//! friend request, but `start` also creates one on demand so clients can
//! open a thread before the first message lands.  Lookup is symmetric:
//! the participant order never matters.

use parley_store::{ChatMessage, Conversation};
use tracing::info;
use uuid::Uuid;

use crate::error::ChatError;
use crate::state::Db;

#[derive(Clone)]
pub struct ConversationService {
    db: Db,
}

impl ConversationService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Look up the conversation between two users, if one exists.
    pub async fn find(&self, user1: &str, user2: &str) -> Result<Option<Conversation>, ChatError> {
        let (user1, user2) = (user1.trim(), user2.trim());
        if user1.is_empty() || user2.is_empty() {
            return Err(ChatError::InvalidInput(
                "both usernames are required".to_string(),
            ));
        }

        let db = self.db.lock().await;
        Ok(db.find_conversation(user1, user2)?)
    }

    /// Fetch the conversation between two users, creating it if missing.
    pub async fn start(&self, user1: &str, user2: &str) -> Result<Conversation, ChatError> {
        let (user1, user2) = (user1.trim(), user2.trim());
        if user1.is_empty() || user2.is_empty() {
            return Err(ChatError::InvalidInput(
                "both usernames are required".to_string(),
            ));
        }

        let conversation = {
            let db = self.db.lock().await;
            db.get_or_create_conversation(user1, user2)?
        };

        info!(
            conversation_id = %conversation.id,
            user1 = %conversation.user1,
            user2 = %conversation.user2,
            "conversation ready"
        );
        Ok(conversation)
    }

    /// Fetch the conversation record by id.
    pub async fn get(&self, id: Uuid) -> Result<Conversation, ChatError> {
        let db = self.db.lock().await;
        db.get_conversation_by_id(id)
            .map_err(|e| match e {
                parley_store::StoreError::NotFound => ChatError::ConversationNotFound(id),
                other => ChatError::Store(other),
            })
    }

    /// Page through a conversation's messages in chronological order.
    pub async fn history(
        &self,
        conversation_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        // Distinguish "no such conversation" from "no messages yet".
        self.get(conversation_id).await?;

        let db = self.db.lock().await;
        Ok(db.get_messages_for_conversation(conversation_id, limit, offset)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parley_store::Database;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn open_test_db() -> (tempfile::TempDir, Db) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, Arc::new(Mutex::new(db)))
    }

    #[tokio::test]
    async fn start_is_idempotent_across_participant_order() {
        let (_dir, db) = open_test_db();
        let service = ConversationService::new(db);

        let first = service.start("alice", "bob").await.unwrap();
        let second = service.start("Bob", "ALICE").await.unwrap();

        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn find_returns_none_before_start() {
        let (_dir, db) = open_test_db();
        let service = ConversationService::new(db);

        assert!(service.find("alice", "bob").await.unwrap().is_none());

        service.start("alice", "bob").await.unwrap();
        assert!(service.find("bob", "alice").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn blank_participant_is_rejected() {
        let (_dir, db) = open_test_db();
        let service = ConversationService::new(db);

        let err = service.start("alice", "  ").await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidInput(_)));

        let err = service.find("", "bob").await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn history_of_unknown_conversation_is_not_found() {
        let (_dir, db) = open_test_db();
        let service = ConversationService::new(db);

        let missing = Uuid::new_v4();
        let err = service.history(missing, 20, 0).await.unwrap_err();
        assert!(matches!(err, ChatError::ConversationNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn history_pages_in_chronological_order() {
        let (_dir, db) = open_test_db();
        let service = ConversationService::new(db.clone());

        let conversation = service.start("alice", "bob").await.unwrap();
        {
            let guard = db.lock().await;
            for i in 0..3 {
                guard
                    .insert_message(&ChatMessage {
                        id: Uuid::new_v4(),
                        sender: "alice".to_string(),
                        content: format!("message {i}"),
                        timestamp: Utc::now() + chrono::Duration::seconds(i),
                        channel: None,
                        conversation_id: Some(conversation.id),
                    })
                    .unwrap();
            }
        }

        let page = service.history(conversation.id, 2, 0).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].content, "message 0");

        let rest = service.history(conversation.id, 2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].content, "message 2");
    }
}

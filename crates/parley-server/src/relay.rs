//! Message relay: ingestion, persistence, and fan-out.
//!
//! Broadcast traffic takes the durable path: the message is appended to
//! the ingestion queue and fanned out to its channel topic right away,
//! while a background consumer drains the queue into the message store.
//! Fan-out latency is therefore independent of storage latency, and a
//! crash between the two leaves the message in the queue for redelivery.
//!
//! Conversation traffic is lower-volume and is persisted synchronously so
//! the caller sees storage failures directly.

use std::time::Duration;

use chrono::Utc;
use parley_broker::Broker;
use parley_shared::constants::{CHAT_EXCHANGE, CHAT_ROUTING_KEY};
use parley_shared::topics::{conversation_topic, message_topic};
use parley_store::{ChatMessage, StoreError};
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::ChatError;
use crate::state::Db;

/// Message payload as submitted by a client.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    pub sender: String,
    pub content: String,
    #[serde(default)]
    pub channel: Option<String>,
}

pub struct MessageRelay {
    db: Db,
    broker: Broker,
}

impl MessageRelay {
    pub fn new(db: Db, broker: Broker) -> Self {
        Self { db, broker }
    }

    /// Accept a broadcast message: enqueue for persistence, fan out now.
    ///
    /// The returned record is what subscribers see; its row appears in the
    /// store once the queue consumer catches up.
    pub async fn send_broadcast(
        &self,
        incoming: IncomingMessage,
    ) -> Result<ChatMessage, ChatError> {
        let message = build_message(incoming, None)?;

        let payload = serde_json::to_string(&message)
            .map_err(|e| ChatError::Internal(format!("failed to serialize message: {e}")))?;

        {
            let db = self.db.lock().await;
            db.enqueue(CHAT_EXCHANGE, CHAT_ROUTING_KEY, &payload)?;
        }
        debug!(message_id = %message.id, "message enqueued for persistence");

        self.publish_message(&message).await;
        Ok(message)
    }

    /// Accept a message and persist it before fanning out.
    pub async fn send_direct(&self, incoming: IncomingMessage) -> Result<ChatMessage, ChatError> {
        let message = build_message(incoming, None)?;

        {
            let db = self.db.lock().await;
            db.insert_message(&message)?;
        }

        self.publish_message(&message).await;
        Ok(message)
    }

    /// Post a message into a conversation.
    ///
    /// The sender must be a participant, and the participants must still
    /// be friends; a removed friendship closes the conversation to new
    /// traffic even if the row is still being torn down.
    pub async fn send_to_conversation(
        &self,
        conversation_id: Uuid,
        incoming: IncomingMessage,
    ) -> Result<ChatMessage, ChatError> {
        let message = {
            let db = self.db.lock().await;

            let conversation = db.get_conversation_by_id(conversation_id).map_err(|e| {
                match e {
                    StoreError::NotFound => ChatError::ConversationNotFound(conversation_id),
                    other => ChatError::Store(other),
                }
            })?;

            let sender = incoming.sender.trim();
            let other = conversation
                .other_participant(sender)
                .ok_or_else(|| {
                    ChatError::Forbidden(format!(
                        "{sender} is not a participant of conversation {conversation_id}"
                    ))
                })?
                .to_string();

            if db.accepted_request_for_pair(sender, &other)?.is_none() {
                return Err(ChatError::NotFriends);
            }

            let message = build_message(incoming, Some(conversation_id))?;
            db.insert_message(&message)?;
            message
        };

        info!(
            conversation_id = %conversation_id,
            message_id = %message.id,
            sender = %message.sender,
            "conversation message stored"
        );
        self.publish_message(&message).await;
        Ok(message)
    }

    /// Replace the content of a message within a conversation.
    pub async fn update_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        content: &str,
    ) -> Result<ChatMessage, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::InvalidInput(
                "message content must not be empty".to_string(),
            ));
        }

        let updated = {
            let db = self.db.lock().await;
            let mut message = self.fetch_in_conversation(&db, conversation_id, message_id)?;
            db.update_message_content(message_id, content)?;
            message.content = content.to_string();
            message
        };

        self.publish_message(&updated).await;
        Ok(updated)
    }

    /// Remove a message from a conversation and announce the removal.
    pub async fn delete_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> Result<(), ChatError> {
        {
            let db = self.db.lock().await;
            self.fetch_in_conversation(&db, conversation_id, message_id)?;
            db.delete_message(message_id)?;
        }

        self.broker
            .publish(&conversation_topic(conversation_id), tombstone(message_id))
            .await;
        Ok(())
    }

    /// Replace the content of a broadcast message.
    pub async fn update_channel_message(
        &self,
        message_id: Uuid,
        content: &str,
    ) -> Result<ChatMessage, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::InvalidInput(
                "message content must not be empty".to_string(),
            ));
        }

        let updated = {
            let db = self.db.lock().await;
            let mut message = db.get_message_by_id(message_id).map_err(|e| match e {
                StoreError::NotFound => ChatError::MessageNotFound(message_id),
                other => ChatError::Store(other),
            })?;
            db.update_message_content(message_id, content)?;
            message.content = content.to_string();
            message
        };

        self.publish_message(&updated).await;
        Ok(updated)
    }

    /// Remove a broadcast message and announce the removal on its channel.
    pub async fn delete_channel_message(&self, message_id: Uuid) -> Result<(), ChatError> {
        let message = {
            let db = self.db.lock().await;
            let message = db.get_message_by_id(message_id).map_err(|e| match e {
                StoreError::NotFound => ChatError::MessageNotFound(message_id),
                other => ChatError::Store(other),
            })?;
            db.delete_message(message_id)?;
            message
        };

        if let Some(channel) = message.channel.as_deref().filter(|c| !c.trim().is_empty()) {
            self.broker
                .publish(&message_topic(channel), tombstone(message_id))
                .await;
        }
        Ok(())
    }

    fn fetch_in_conversation(
        &self,
        db: &parley_store::Database,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> Result<ChatMessage, ChatError> {
        let message = db.get_message_by_id(message_id).map_err(|e| match e {
            StoreError::NotFound => ChatError::MessageNotFound(message_id),
            other => ChatError::Store(other),
        })?;

        if message.conversation_id != Some(conversation_id) {
            return Err(ChatError::MessageNotInConversation(
                message_id,
                conversation_id,
            ));
        }
        Ok(message)
    }

    /// Fan a message out to every topic it belongs to.
    async fn publish_message(&self, message: &ChatMessage) {
        let payload = match serde_json::to_value(message) {
            Ok(p) => p,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "failed to serialize message for fan-out");
                return;
            }
        };

        if let Some(conversation_id) = message.conversation_id {
            self.broker
                .publish(&conversation_topic(conversation_id), payload.clone())
                .await;
        }

        if let Some(channel) = message.channel.as_deref().filter(|c| !c.trim().is_empty()) {
            self.broker.publish(&message_topic(channel), payload).await;
        }
    }
}

fn build_message(
    incoming: IncomingMessage,
    conversation_id: Option<Uuid>,
) -> Result<ChatMessage, ChatError> {
    let sender = incoming.sender.trim();
    if sender.is_empty() {
        return Err(ChatError::InvalidInput(
            "sender must not be empty".to_string(),
        ));
    }

    let content = incoming.content.trim();
    if content.is_empty() {
        return Err(ChatError::InvalidInput(
            "message content must not be empty".to_string(),
        ));
    }

    let channel = incoming
        .channel
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    Ok(ChatMessage {
        id: Uuid::new_v4(),
        sender: sender.to_string(),
        content: content.to_string(),
        timestamp: Utc::now(),
        channel,
        conversation_id,
    })
}

fn tombstone(message_id: Uuid) -> serde_json::Value {
    json!({ "type": "delete", "messageId": message_id })
}

// ---------------------------------------------------------------------------
// Queue consumer
// ---------------------------------------------------------------------------

/// Drain every queued message into the store, acking as we go.
///
/// The queued payload carries the message id assigned at ingestion, so a
/// redelivered entry conflicts with the row it already created and is
/// simply acked again.
pub async fn drain_queue(db: &Db) -> Result<usize, ChatError> {
    let mut drained = 0;

    loop {
        let db = db.lock().await;
        let Some(entry) = db.next_queued()? else {
            break;
        };

        match serde_json::from_str::<ChatMessage>(&entry.payload) {
            Ok(message) => match db.insert_message(&message) {
                Ok(()) => {
                    debug!(message_id = %message.id, queue_id = entry.id, "queued message persisted");
                }
                Err(StoreError::AlreadyExists) => {
                    debug!(message_id = %message.id, queue_id = entry.id, "queued message already persisted");
                }
                Err(e) => {
                    error!(queue_id = entry.id, error = %e, "failed to persist queued message");
                    return Err(e.into());
                }
            },
            Err(e) => {
                // Drop rather than block the queue behind an unreadable row.
                warn!(queue_id = entry.id, attempts = entry.attempts, error = %e, "discarding malformed queue entry");
            }
        }

        db.ack_queued(entry.id)?;
        drained += 1;
    }

    Ok(drained)
}

/// Spawn the background task that drains the ingestion queue forever.
pub fn spawn_queue_consumer(db: Db, poll_interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match drain_queue(&db).await {
                Ok(0) => {}
                Ok(n) => debug!(count = n, "drained ingestion queue"),
                Err(e) => error!(error = %e, "queue consumer pass failed"),
            }
        }
    })
}

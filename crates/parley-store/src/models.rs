//! Domain model structs persisted in the chat database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the HTTP layer and published on push topics as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ChatMessage
// ---------------------------------------------------------------------------

/// A single chat message.
///
/// The timestamp is always assigned by the server at the relay boundary;
/// client-supplied values are discarded before persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Unique message identifier.
    pub id: Uuid,
    /// Username of the sender.
    pub sender: String,
    /// Plain-text message body.
    pub content: String,
    /// Server-assigned send time.
    pub timestamp: DateTime<Utc>,
    /// Legacy channel routing string; may be empty.
    #[serde(default)]
    pub channel: Option<String>,
    /// Owning conversation, if the message was sent over one.
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// A one-to-one conversation between two users.
///
/// `user1` / `user2` keep the order the pair was originally submitted in;
/// lookups go through the normalized pair key, so at most one conversation
/// ever exists per unordered pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Unique conversation identifier.
    pub id: Uuid,
    /// First participant, as originally submitted.
    pub user1: String,
    /// Second participant, as originally submitted.
    pub user2: String,
    /// When the conversation was created.
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// The participant that is not `user`, compared case-insensitively.
    pub fn other_participant(&self, user: &str) -> Option<&str> {
        if self.user1.eq_ignore_ascii_case(user) {
            Some(&self.user2)
        } else if self.user2.eq_ignore_ascii_case(user) {
            Some(&self.user1)
        } else {
            None
        }
    }

}

// ---------------------------------------------------------------------------
// FriendRequest
// ---------------------------------------------------------------------------

/// Lifecycle state of a friend request.
///
/// Transitions are monotonic: `Pending` may move to `Accepted` or
/// `Rejected`, and terminal states never change again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Accepted => "ACCEPTED",
            RequestStatus::Rejected => "REJECTED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(RequestStatus::Pending),
            "ACCEPTED" => Some(RequestStatus::Accepted),
            "REJECTED" => Some(RequestStatus::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A friend request between two users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    /// Unique request identifier.
    pub id: Uuid,
    /// Username of the sender.
    pub from_user: String,
    /// Username of the recipient.
    pub to_user: String,
    /// Current lifecycle state.
    pub status: RequestStatus,
    /// When the request was created.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// QueuedMessage
// ---------------------------------------------------------------------------

/// A row in the durable ingestion queue.
///
/// The payload is an opaque serialized [`ChatMessage`]; a row is removed
/// only once the consumer has persisted it, so redelivery after a crash
/// gives at-least-once semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    /// Monotonic queue position.
    pub id: i64,
    /// Exchange the payload was published to.
    pub exchange: String,
    /// Routing key the payload was published with.
    pub routing_key: String,
    /// Serialized message payload (JSON).
    pub payload: String,
    /// How many times the row has been handed to a consumer.
    pub attempts: u32,
    /// When the row was enqueued.
    pub enqueued_at: DateTime<Utc>,
}

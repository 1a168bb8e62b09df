//! Push-topic naming.
//!
//! Topic strings are part of the client contract and must not change shape.

use uuid::Uuid;

/// Topic carrying every message published to a channel.
pub fn message_topic(channel: &str) -> String {
    format!("topic/messages/{channel}")
}

/// Topic carrying every message, edit, and tombstone for a conversation.
pub fn conversation_topic(conversation_id: Uuid) -> String {
    format!("topic/conversation/{conversation_id}")
}

/// Per-user topic carrying friend-request lifecycle updates and snapshots.
pub fn friend_request_status_topic(username: &str) -> String {
    format!("topic/friend-request-status/{username}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_shapes() {
        let id = Uuid::nil();
        assert_eq!(message_topic("general"), "topic/messages/general");
        assert_eq!(
            conversation_topic(id),
            format!("topic/conversation/{id}")
        );
        assert_eq!(
            friend_request_status_topic("alice"),
            "topic/friend-request-status/alice"
        );
    }
}

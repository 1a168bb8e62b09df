//! Friend graph: the request lifecycle and its side effects.
//!
//! Transitions are monotonic.  A PENDING request moves to ACCEPTED or
//! REJECTED exactly once; re-invoking the transition the record is already
//! in is a harmless no-op that re-emits the notifications, while crossing
//! terminal states is a conflict.  Acceptance guarantees the pair's
//! conversation exists; removing a friendship tears it down again.

use chrono::Utc;
use parley_store::{FriendRequest, RequestStatus, StoreError};
use tracing::info;
use uuid::Uuid;

use crate::error::ChatError;
use crate::identity::UserDirectory;
use crate::notify::Notifier;
use crate::state::Db;

pub struct FriendService<D> {
    db: Db,
    directory: D,
    notifier: Notifier,
}

impl<D: UserDirectory> FriendService<D> {
    pub fn new(db: Db, directory: D, notifier: Notifier) -> Self {
        Self {
            db,
            directory,
            notifier,
        }
    }

    /// Create a PENDING request from one user to another.
    ///
    /// Both usernames must pass the identity gateway check, and at most one
    /// pending request may exist per unordered pair; the store's partial
    /// unique index backs the pre-check, so two concurrent senders cannot
    /// both get through.
    pub async fn send_request(&self, from: &str, to: &str) -> Result<FriendRequest, ChatError> {
        let from = from.trim();
        let to = to.trim();

        if from.is_empty() || to.is_empty() {
            return Err(ChatError::InvalidInput(
                "Both usernames are required".to_string(),
            ));
        }
        if from.eq_ignore_ascii_case(to) {
            return Err(ChatError::InvalidInput(
                "Cannot send a friend request to yourself".to_string(),
            ));
        }

        if !self.directory.user_exists(from).await {
            return Err(ChatError::UserNotFound(from.to_string()));
        }
        if !self.directory.user_exists(to).await {
            return Err(ChatError::UserNotFound(to.to_string()));
        }

        let request = FriendRequest {
            id: Uuid::new_v4(),
            from_user: from.to_string(),
            to_user: to.to_string(),
            status: RequestStatus::Pending,
            created_at: Utc::now(),
        };

        {
            let db = self.db.lock().await;
            if db.pending_request_for_pair(from, to)?.is_some() {
                return Err(ChatError::DuplicatePending);
            }

            match db.insert_friend_request(&request) {
                Err(StoreError::AlreadyExists) => return Err(ChatError::DuplicatePending),
                other => other?,
            }
        }

        info!(from = %from, to = %to, request_id = %request.id, "friend request sent");
        self.notifier.push_request_update(&request).await;
        Ok(request)
    }

    /// Accept a request, ensuring the pair's conversation exists.
    ///
    /// Accepting an already-ACCEPTED request re-emits the notifications
    /// without touching state; accepting a REJECTED one is a conflict.
    pub async fn accept(&self, request_id: Uuid) -> Result<FriendRequest, ChatError> {
        let (request, conversation) = {
            let db = self.db.lock().await;
            let mut request = db.get_friend_request(request_id).map_err(|e| match e {
                StoreError::NotFound => ChatError::RequestNotFound(request_id),
                other => ChatError::Store(other),
            })?;

            match request.status {
                RequestStatus::Rejected => {
                    return Err(ChatError::Conflict(
                        "Request has already been rejected".to_string(),
                    ));
                }
                RequestStatus::Accepted => {
                    // Re-accept: no state change, notifications re-fire below.
                }
                RequestStatus::Pending => {
                    db.set_friend_request_status(request_id, RequestStatus::Accepted)?;
                    request.status = RequestStatus::Accepted;
                }
            }

            let conversation =
                db.get_or_create_conversation(&request.from_user, &request.to_user)?;
            (request, conversation)
        };

        info!(
            request_id = %request.id,
            conversation_id = %conversation.id,
            "friend request accepted"
        );
        self.notifier.push_request_update(&request).await;
        Ok(request)
    }

    /// Reject a request.
    ///
    /// Mirror of [`FriendService::accept`]: re-rejecting re-notifies,
    /// rejecting an ACCEPTED request is a conflict.
    pub async fn reject(&self, request_id: Uuid) -> Result<FriendRequest, ChatError> {
        let request = {
            let db = self.db.lock().await;
            let mut request = db.get_friend_request(request_id).map_err(|e| match e {
                StoreError::NotFound => ChatError::RequestNotFound(request_id),
                other => ChatError::Store(other),
            })?;

            match request.status {
                RequestStatus::Accepted => {
                    return Err(ChatError::Conflict(
                        "Request has already been accepted".to_string(),
                    ));
                }
                RequestStatus::Rejected => {}
                RequestStatus::Pending => {
                    db.set_friend_request_status(request_id, RequestStatus::Rejected)?;
                    request.status = RequestStatus::Rejected;
                }
            }

            request
        };

        info!(request_id = %request.id, "friend request rejected");
        self.notifier.push_request_update(&request).await;
        Ok(request)
    }

    /// Remove an established friendship.
    ///
    /// Deletes the ACCEPTED record and tears down the pair's conversation
    /// together with all of its messages.
    pub async fn remove_friendship(&self, a: &str, b: &str) -> Result<(), ChatError> {
        let a = a.trim();
        let b = b.trim();
        if a.is_empty() || b.is_empty() {
            return Err(ChatError::InvalidInput(
                "Both usernames are required".to_string(),
            ));
        }

        {
            let db = self.db.lock().await;
            let accepted = db
                .accepted_request_for_pair(a, b)?
                .ok_or_else(|| ChatError::FriendshipNotFound(a.to_string(), b.to_string()))?;

            db.delete_friend_request(accepted.id)?;

            if let Some(conversation) = db.find_conversation(a, b)? {
                db.delete_conversation(conversation.id)?;
                info!(
                    conversation_id = %conversation.id,
                    "conversation removed with friendship"
                );
            }
        }

        info!(user1 = %a, user2 = %b, "friendship removed");
        self.notifier.push_snapshot(a).await;
        self.notifier.push_snapshot(b).await;
        Ok(())
    }

    /// Usernames of everyone the user has an ACCEPTED request with.
    pub async fn friends_of(&self, user: &str) -> Result<Vec<String>, ChatError> {
        let db = self.db.lock().await;
        Ok(db.friends_of(user)?)
    }

    /// PENDING requests addressed to the user.
    pub async fn pending_for(&self, user: &str) -> Result<Vec<FriendRequest>, ChatError> {
        let db = self.db.lock().await;
        Ok(db.pending_requests_to(user)?)
    }

    /// PENDING requests the user has sent.
    pub async fn sent_by(&self, user: &str) -> Result<Vec<FriendRequest>, ChatError> {
        let db = self.db.lock().await;
        Ok(db.pending_requests_from(user)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_broker::Broker;
    use parley_store::Database;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;

    struct StaticDirectory(HashSet<String>);

    impl StaticDirectory {
        fn with_users(users: &[&str]) -> Self {
            Self(users.iter().map(|u| u.to_lowercase()).collect())
        }
    }

    impl UserDirectory for StaticDirectory {
        async fn user_exists(&self, username: &str) -> bool {
            self.0.contains(&username.to_lowercase())
        }
    }

    fn service(users: &[&str]) -> (tempfile::TempDir, FriendService<StaticDirectory>, Db) {
        let dir = tempfile::tempdir().unwrap();
        let db: Db = Arc::new(Mutex::new(
            Database::open_at(&dir.path().join("test.db")).unwrap(),
        ));
        let notifier = Notifier::new(db.clone(), Broker::new(), Duration::from_millis(0));
        let service = FriendService::new(db.clone(), StaticDirectory::with_users(users), notifier);
        (dir, service, db)
    }

    #[tokio::test]
    async fn unknown_users_are_rejected() {
        let (_dir, service, _db) = service(&["alice"]);

        let err = service.send_request("alice", "ghost").await.unwrap_err();
        assert!(matches!(err, ChatError::UserNotFound(u) if u == "ghost"));

        let err = service.send_request("ghost", "alice").await.unwrap_err();
        assert!(matches!(err, ChatError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn reverse_direction_request_is_a_duplicate() {
        let (_dir, service, _db) = service(&["alice", "bob"]);

        service.send_request("alice", "bob").await.unwrap();

        let err = service.send_request("bob", "alice").await.unwrap_err();
        assert!(matches!(err, ChatError::DuplicatePending));
    }

    #[tokio::test]
    async fn accept_creates_exactly_one_conversation() {
        let (_dir, service, db) = service(&["alice", "bob"]);

        let request = service.send_request("alice", "bob").await.unwrap();
        let accepted = service.accept(request.id).await.unwrap();
        assert_eq!(accepted.status, RequestStatus::Accepted);

        let guard = db.lock().await;
        let conversation = guard.find_conversation("bob", "alice").unwrap().unwrap();
        assert_eq!(conversation.user1, "alice");
        assert_eq!(conversation.user2, "bob");
    }

    #[tokio::test]
    async fn re_accept_is_a_noop_but_cross_transition_conflicts() {
        let (_dir, service, _db) = service(&["alice", "bob"]);

        let request = service.send_request("alice", "bob").await.unwrap();
        service.accept(request.id).await.unwrap();

        // Accepting again succeeds without changing anything.
        let again = service.accept(request.id).await.unwrap();
        assert_eq!(again.status, RequestStatus::Accepted);

        // Rejecting an accepted request is refused.
        let err = service.reject(request.id).await.unwrap_err();
        assert!(matches!(err, ChatError::Conflict(_)));
    }

    #[tokio::test]
    async fn reject_blocks_later_accept() {
        let (_dir, service, _db) = service(&["alice", "bob"]);

        let request = service.send_request("alice", "bob").await.unwrap();
        let rejected = service.reject(request.id).await.unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);

        let err = service.accept(request.id).await.unwrap_err();
        assert!(matches!(err, ChatError::Conflict(_)));
    }

    #[tokio::test]
    async fn missing_request_is_not_found() {
        let (_dir, service, _db) = service(&["alice", "bob"]);
        let err = service.accept(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ChatError::RequestNotFound(_)));
    }

    #[tokio::test]
    async fn remove_friendship_tears_down_the_conversation() {
        let (_dir, service, db) = service(&["alice", "bob"]);

        let request = service.send_request("alice", "bob").await.unwrap();
        service.accept(request.id).await.unwrap();

        service.remove_friendship("bob", "alice").await.unwrap();

        assert!(service.friends_of("alice").await.unwrap().is_empty());
        let guard = db.lock().await;
        assert!(guard.find_conversation("alice", "bob").unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_without_friendship_is_not_found() {
        let (_dir, service, _db) = service(&["alice", "bob"]);
        let err = service.remove_friendship("alice", "bob").await.unwrap_err();
        assert!(matches!(err, ChatError::FriendshipNotFound(..)));
    }

    #[tokio::test]
    async fn friends_and_pending_listings() {
        let (_dir, service, _db) = service(&["alice", "bob", "carol"]);

        let request = service.send_request("alice", "bob").await.unwrap();
        service.accept(request.id).await.unwrap();
        service.send_request("alice", "carol").await.unwrap();

        assert_eq!(service.friends_of("alice").await.unwrap(), vec!["bob"]);
        assert_eq!(service.sent_by("alice").await.unwrap().len(), 1);
        assert_eq!(service.pending_for("carol").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn self_request_is_invalid() {
        let (_dir, service, _db) = service(&["alice"]);
        let err = service.send_request("alice", "Alice").await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidInput(_)));
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use parley_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Friend request not found: {0}")]
    RequestNotFound(Uuid),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(Uuid),

    #[error("Message not found: {0}")]
    MessageNotFound(Uuid),

    #[error("Message {0} does not belong to conversation {1}")]
    MessageNotInConversation(Uuid, Uuid),

    #[error("No friendship exists between {0} and {1}")]
    FriendshipNotFound(String, String),

    #[error("A pending friend request already exists for this pair")]
    DuplicatePending,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Users are not friends")]
    NotFriends,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ChatError::UserNotFound(_)
            | ChatError::RequestNotFound(_)
            | ChatError::ConversationNotFound(_)
            | ChatError::MessageNotFound(_)
            | ChatError::MessageNotInConversation(..)
            | ChatError::FriendshipNotFound(..) => (StatusCode::NOT_FOUND, self.to_string()),

            ChatError::DuplicatePending | ChatError::Conflict(_) => {
                (StatusCode::CONFLICT, self.to_string())
            }

            ChatError::NotFriends | ChatError::Forbidden(_) => {
                (StatusCode::FORBIDDEN, self.to_string())
            }

            ChatError::InvalidInput(_) => (StatusCode::BAD_REQUEST, self.to_string()),

            ChatError::Store(StoreError::NotFound) => {
                (StatusCode::NOT_FOUND, "Record not found".to_string())
            }
            ChatError::Store(StoreError::AlreadyExists) => {
                (StatusCode::CONFLICT, "Record already exists".to_string())
            }
            ChatError::Store(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage error".to_string())
            }

            ChatError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

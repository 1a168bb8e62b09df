//! HTTP API surface.
//!
//! Routes are grouped by prefix: `/api/chat` for broadcast traffic,
//! `/api/conversation` for private threads, `/api/user` for the friend
//! graph, and `/ws` for the realtime socket.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use parley_shared::constants::{DEFAULT_CHAT_PAGE_SIZE, DEFAULT_CONVERSATION_PAGE_SIZE};
use parley_store::{ChatMessage, Conversation, FriendRequest};

use crate::error::ChatError;
use crate::relay::IncomingMessage;
use crate::state::AppState;
use crate::ws::ws_handler;

pub fn build_router(state: AppState) -> Router {
    let allow_origin = match state.config.cors_origin.as_deref() {
        Some(origin) => match origin.parse::<HeaderValue>() {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "invalid CORS_ORIGIN, allowing any origin");
                AllowOrigin::any()
            }
        },
        None => AllowOrigin::any(),
    };

    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        // Broadcast chat.
        .route("/api/chat/messages", get(chat_messages))
        .route("/api/chat/send", post(chat_send))
        .route("/api/chat/update/:id", put(chat_update))
        .route("/api/chat/delete/:id", delete(chat_delete))
        .route("/api/chat/messages/channel/:channel", get(chat_by_channel))
        .route("/api/chat/messages/sender/:sender", get(chat_by_sender))
        // Conversations.
        .route("/api/conversation/between/:user1/:user2", get(conversation_between))
        .route("/api/conversation/start", post(conversation_start))
        .route("/api/conversation/:id/messages", get(conversation_messages))
        .route("/api/conversation/:id/send", post(conversation_send))
        .route(
            "/api/conversation/:id/update/:message_id",
            put(conversation_update),
        )
        .route(
            "/api/conversation/:id/delete/:message_id",
            delete(conversation_delete),
        )
        // Friend graph.
        .route("/api/user/friend-request/:to", post(friend_request_send))
        .route("/api/user/friend-request/:id/accept", post(friend_request_accept))
        .route("/api/user/friend-request/:id/reject", post(friend_request_reject))
        .route("/api/user/:username/friends", get(friends_list))
        .route("/api/user/:username/friend-requests", get(friend_requests_pending))
        .route(
            "/api/user/:username/friend-requests/sent",
            get(friend_requests_sent),
        )
        .route("/api/user/remove-friend", post(friend_remove))
        // Realtime socket.
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Deserialize)]
struct Pagination {
    page: Option<u32>,
    size: Option<u32>,
}

impl Pagination {
    fn resolve(&self, default_size: u32) -> (u32, u32) {
        let size = self.size.unwrap_or(default_size).max(1);
        let page = self.page.unwrap_or(0);
        (size, page.saturating_mul(size))
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ---------------------------------------------------------------------------
// Broadcast chat
// ---------------------------------------------------------------------------

async fn chat_messages(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Vec<ChatMessage>>, ChatError> {
    let (limit, offset) = pagination.resolve(DEFAULT_CHAT_PAGE_SIZE);
    let db = state.db.lock().await;
    Ok(Json(db.get_messages(limit, offset)?))
}

async fn chat_send(
    State(state): State<AppState>,
    Json(incoming): Json<IncomingMessage>,
) -> Result<Json<ChatMessage>, ChatError> {
    let message = state.relay.send_broadcast(incoming).await?;
    Ok(Json(message))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateMessageRequest {
    content: String,
}

async fn chat_update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateMessageRequest>,
) -> Result<Json<ChatMessage>, ChatError> {
    let updated = state.relay.update_channel_message(id, &req.content).await?;
    Ok(Json(updated))
}

async fn chat_delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ChatError> {
    state.relay.delete_channel_message(id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

async fn chat_by_channel(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Vec<ChatMessage>>, ChatError> {
    let (limit, offset) = pagination.resolve(DEFAULT_CHAT_PAGE_SIZE);
    let db = state.db.lock().await;
    Ok(Json(db.get_messages_for_channel(&channel, limit, offset)?))
}

async fn chat_by_sender(
    State(state): State<AppState>,
    Path(sender): Path<String>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Vec<ChatMessage>>, ChatError> {
    let (limit, offset) = pagination.resolve(DEFAULT_CHAT_PAGE_SIZE);
    let db = state.db.lock().await;
    Ok(Json(db.get_messages_for_sender(&sender, limit, offset)?))
}

// ---------------------------------------------------------------------------
// Conversations
// ---------------------------------------------------------------------------

async fn conversation_between(
    State(state): State<AppState>,
    Path((user1, user2)): Path<(String, String)>,
) -> Result<Json<Option<Conversation>>, ChatError> {
    let conversation = state.conversations.find(&user1, &user2).await?;
    Ok(Json(conversation))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartConversationRequest {
    user1: String,
    user2: String,
}

async fn conversation_start(
    State(state): State<AppState>,
    Json(req): Json<StartConversationRequest>,
) -> Result<Json<Conversation>, ChatError> {
    let conversation = state.conversations.start(&req.user1, &req.user2).await?;
    Ok(Json(conversation))
}

async fn conversation_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Vec<ChatMessage>>, ChatError> {
    let (limit, offset) = pagination.resolve(DEFAULT_CONVERSATION_PAGE_SIZE);
    let messages = state.conversations.history(id, limit, offset).await?;
    Ok(Json(messages))
}

async fn conversation_send(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(incoming): Json<IncomingMessage>,
) -> Result<Json<ChatMessage>, ChatError> {
    let message = state.relay.send_to_conversation(id, incoming).await?;
    Ok(Json(message))
}

async fn conversation_update(
    State(state): State<AppState>,
    Path((id, message_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateMessageRequest>,
) -> Result<Json<ChatMessage>, ChatError> {
    let updated = state.relay.update_message(id, message_id, &req.content).await?;
    Ok(Json(updated))
}

async fn conversation_delete(
    State(state): State<AppState>,
    Path((id, message_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<serde_json::Value>, ChatError> {
    state.relay.delete_message(id, message_id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

// ---------------------------------------------------------------------------
// Friend graph
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendRequestQuery {
    from_username: String,
}

async fn friend_request_send(
    State(state): State<AppState>,
    Path(to): Path<String>,
    Query(query): Query<SendRequestQuery>,
) -> Result<Json<FriendRequest>, ChatError> {
    let request = state.friends.send_request(&query.from_username, &to).await?;
    Ok(Json(request))
}

async fn friend_request_accept(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FriendRequest>, ChatError> {
    let request = state.friends.accept(id).await?;
    Ok(Json(request))
}

async fn friend_request_reject(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FriendRequest>, ChatError> {
    let request = state.friends.reject(id).await?;
    Ok(Json(request))
}

async fn friends_list(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Vec<String>>, ChatError> {
    Ok(Json(state.friends.friends_of(&username).await?))
}

async fn friend_requests_pending(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Vec<FriendRequest>>, ChatError> {
    Ok(Json(state.friends.pending_for(&username).await?))
}

async fn friend_requests_sent(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Vec<FriendRequest>>, ChatError> {
    Ok(Json(state.friends.sent_by(&username).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveFriendQuery {
    username1: String,
    username2: String,
}

async fn friend_remove(
    State(state): State<AppState>,
    Query(query): Query<RemoveFriendQuery>,
) -> Result<Json<serde_json::Value>, ChatError> {
    state
        .friends
        .remove_friendship(&query.username1, &query.username2)
        .await?;
    Ok(Json(serde_json::json!({ "removed": true })))
}

// ---------------------------------------------------------------------------
// Server entry
// ---------------------------------------------------------------------------

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
